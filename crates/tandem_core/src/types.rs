//! Core value types shared by the document, the change tracker, and the
//! sync engine.
//!
//! Offsets throughout the crate are byte offsets into UTF-8 strings. The
//! shared document is created with the byte offset kind, so mirror offsets
//! and CRDT offsets agree without conversion.

use serde::{Deserialize, Serialize};

/// A 0-based line/character pair.
///
/// `character` counts bytes from the line start, matching the offset spaces
/// used everywhere else in the crate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    /// 0-based line number.
    pub line: u32,
    /// 0-based offset from the line start.
    pub character: u32,
}

impl Position {
    /// Create a position from a line/character pair.
    pub fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }
}

/// Which of the two offset spaces a query refers to.
///
/// Native offsets index the editor's string as-is; normalized offsets index
/// the LF-only form stored in the shared text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Space {
    /// The editor-side representation, possibly containing CRLF.
    Native,
    /// The canonical LF-only representation held by the CRDT.
    Normalized,
}

/// A single replacement of the byte range `[start, end)` with `text`.
///
/// A batch of changes is expressed in the coordinates of the text *before*
/// the whole batch; batches are applied in ascending `start` order with a
/// running length delta. Changes within a batch must not overlap.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextChange {
    /// Inclusive start of the replaced range.
    pub start: usize,
    /// Exclusive end of the replaced range.
    pub end: usize,
    /// Replacement text; empty for a pure deletion.
    pub text: String,
}

impl TextChange {
    /// A replacement of `[start, end)` with `text`.
    pub fn replace(start: usize, end: usize, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
        }
    }

    /// An insertion at `at`.
    pub fn insert(at: usize, text: impl Into<String>) -> Self {
        Self::replace(at, at, text)
    }

    /// A deletion of `[start, end)`.
    pub fn delete(start: usize, end: usize) -> Self {
        Self::replace(start, end, String::new())
    }
}

/// One operation of a CRDT-facing delta, applied left to right.
///
/// Retains advance a cursor over the existing sequence; inserts and deletes
/// are emitted relative to the running cursor. Non-text embedded inserts are
/// dropped at the conversion boundary; a plain text type never produces
/// them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeDelta {
    /// Advance the cursor past `n` untouched bytes.
    Retain(usize),
    /// Insert text at the cursor.
    Insert(String),
    /// Delete `n` bytes at the cursor.
    Delete(usize),
}

/// Before/after snapshot of an edit batch in flight between "applied to the
/// editor" and "confirmed back by the editor's own change event".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeSet {
    /// The native text before the batch was applied.
    pub before: String,
    /// The native text after the batch was applied.
    pub after: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_constructors() {
        assert_eq!(
            TextChange::insert(3, "x"),
            TextChange {
                start: 3,
                end: 3,
                text: "x".to_string()
            }
        );
        assert_eq!(
            TextChange::delete(1, 4),
            TextChange {
                start: 1,
                end: 4,
                text: String::new()
            }
        );
    }

    #[test]
    fn test_position_ordering() {
        assert!(Position::new(0, 5) < Position::new(1, 0));
        assert!(Position::new(2, 1) < Position::new(2, 7));
    }
}
