//! Normalized document: a native string mirror of a shared CRDT text.
//!
//! The shared text always holds the canonical LF-only form; the mirror holds
//! whatever the editor shows, CRLF included. `NormalizedDoc` owns the mirror,
//! translates byte offsets and positions between the two spaces through the
//! line-offset index, and performs in-place updates. Every write it makes to
//! the shared text runs inside a single transaction tagged with a reserved
//! local origin, so the text observer can tell the document's own writes
//! apart from remote ones.
//!
//! # Example
//!
//! ```ignore
//! use tandem_core::doc::{DocUpdate, NormalizedDoc};
//! use tandem_core::types::TextChange;
//! use yrs::Doc;
//!
//! let doc = Doc::new();
//! let text = doc.get_or_insert_text("body");
//! let ndoc = NormalizedDoc::new(&doc, text);
//!
//! // Editor typed "\r\n" at offset 1; the shared text receives "\n".
//! ndoc.update(DocUpdate::Edits(vec![TextChange::insert(1, "\r\n")]), true)?;
//! ```

use std::sync::RwLock;

use yrs::updates::decoder::Decode;
use yrs::updates::encoder::Encode;
use yrs::{Doc, GetString, Origin, ReadTxn, StateVector, Text, TextRef, Transact, Update};

use super::line_index::{LineIndex, LineIndexCache};
use super::{LineEnding, normalize_newlines};
use crate::error::{Result, SyncError};
use crate::types::{ChangeDelta, Position, Space, TextChange};

/// Origin attached to every transaction this crate opens for its own writes.
/// The text observer drops events carrying it.
pub(crate) const LOCAL_ORIGIN: &str = "tandem:local";

/// An incoming edit for [`NormalizedDoc::update`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocUpdate {
    /// Replace the whole text.
    Replace(String),
    /// Apply a batch of native-offset changes.
    Edits(Vec<TextChange>),
}

/// A native string mirror of one shared text, plus the offset translation
/// between the editor's representation and the canonical LF-only form.
pub struct NormalizedDoc {
    doc: Doc,
    text_ref: TextRef,
    mirror: RwLock<String>,
    index: LineIndexCache,
}

impl NormalizedDoc {
    /// Create a mirror of `text_ref`, seeded from the shared text's current
    /// string.
    pub fn new(doc: &Doc, text_ref: TextRef) -> Self {
        let initial = {
            let txn = doc.transact();
            text_ref.get_string(&txn)
        };
        Self {
            doc: doc.clone(),
            text_ref,
            mirror: RwLock::new(initial),
            index: LineIndexCache::new(),
        }
    }

    // ==================== Content ====================

    /// The current native text, equal to what the editor shows after every
    /// public operation returns.
    pub fn text(&self) -> String {
        self.mirror.read().unwrap().clone()
    }

    /// The shared text's current string (always LF-only).
    pub fn crdt_string(&self) -> String {
        let txn = self.doc.transact();
        self.text_ref.get_string(&txn)
    }

    /// The newline style of the current mirror.
    pub fn line_ending(&self) -> LineEnding {
        LineEnding::of(&self.mirror.read().unwrap())
    }

    /// The line-offset table for the current mirror, computing it on first
    /// call after an invalidation.
    pub fn line_index(&self) -> std::sync::Arc<LineIndex> {
        self.index.get(&self.mirror.read().unwrap())
    }

    // ==================== Offset translation ====================

    /// Map a normalized offset to the native space.
    pub fn original_offset(&self, normalized: usize) -> usize {
        let index = self.line_index();
        let n = normalized.min(index.normalized_len());
        let (_, entry) = index.find_line(n, Space::Normalized);
        (entry.native + (n - entry.normalized)).min(index.native_len())
    }

    /// Map a native offset to the normalized space.
    ///
    /// Positions inside a stripped `\r` are not representable; they clamp to
    /// the line end in normalized space.
    pub fn normalized_offset(&self, native: usize) -> usize {
        let index = self.line_index();
        let o = native.min(index.native_len());
        let (line, entry) = index.find_line(o, Space::Native);
        let line_end = index
            .entries()
            .get(line + 1)
            .map(|e| e.normalized)
            .unwrap_or(index.normalized_len());
        (entry.normalized + (o - entry.native)).min(line_end)
    }

    /// The native offset of a line/character pair.
    pub fn original_offset_at(&self, pos: Position) -> usize {
        self.line_index().offset_at(pos, Space::Native)
    }

    /// The normalized offset of a line/character pair.
    pub fn normalized_offset_at(&self, pos: Position) -> usize {
        self.line_index().offset_at(pos, Space::Normalized)
    }

    /// The line/character pair for a native offset.
    pub fn position_at(&self, native: usize) -> Position {
        self.line_index().position_at(native)
    }

    /// The line/character pair for a normalized offset.
    pub fn position_at_normalized(&self, normalized: usize) -> Position {
        let native = self.original_offset(normalized);
        self.line_index().position_at(native)
    }

    // ==================== Updates ====================

    /// Apply an incoming edit to the mirror and, when `push_to_crdt` is set,
    /// to the shared text inside one transaction.
    ///
    /// Change batches are validated up front (ordering, overlap, bounds,
    /// character boundaries); on failure nothing is mutated.
    pub fn update(&self, update: DocUpdate, push_to_crdt: bool) -> Result<()> {
        self.index.invalidate();
        match update {
            DocUpdate::Replace(new_text) => self.replace_all(new_text, push_to_crdt),
            DocUpdate::Edits(changes) => self.apply_edits(changes, push_to_crdt),
        }
    }

    fn replace_all(&self, new_text: String, push_to_crdt: bool) -> Result<()> {
        let mut mirror = self.mirror.write().unwrap();
        if push_to_crdt {
            let normalized = normalize_newlines(&new_text, LineEnding::Lf);
            let mut txn = self.doc.transact_mut_with(LOCAL_ORIGIN);
            let len = self.text_ref.len(&txn);
            if len > 0 {
                self.text_ref.remove_range(&mut txn, 0, len);
            }
            if !normalized.is_empty() {
                self.text_ref.insert(&mut txn, 0, &normalized);
            }
        }
        *mirror = new_text;
        Ok(())
    }

    fn apply_edits(&self, mut changes: Vec<TextChange>, push_to_crdt: bool) -> Result<()> {
        if changes.is_empty() {
            return Ok(());
        }
        let mut mirror = self.mirror.write().unwrap();
        changes.sort_by_key(|c| c.start);
        validate_changes(&changes, &mirror)?;

        let mut txn = push_to_crdt.then(|| self.doc.transact_mut_with(LOCAL_ORIGIN));
        let mut delta = 0isize;
        for change in &changes {
            let start = (change.start as isize + delta) as usize;
            let end = (change.end as isize + delta) as usize;
            if let Some(txn) = txn.as_mut() {
                // The offsets cache was invalidated above, so the normalized
                // span is recovered by a direct scan of the current mirror.
                let (ns, ne) = normalized_span(&mirror, start, end);
                if ne > ns {
                    self.text_ref.remove_range(txn, ns as u32, (ne - ns) as u32);
                }
                if !change.text.is_empty() {
                    let insert = normalize_newlines(&change.text, LineEnding::Lf);
                    self.text_ref.insert(txn, ns as u32, &insert);
                }
            }
            mirror.replace_range(start..end, &change.text);
            delta += change.text.len() as isize - (end - start) as isize;
        }
        Ok(())
    }

    // ==================== Sync I/O ====================

    /// Encode the current state vector for sync.
    pub fn encode_state_vector(&self) -> Vec<u8> {
        let txn = self.doc.transact();
        txn.state_vector().encode_v1()
    }

    /// Encode the full state as an update.
    pub fn encode_state_as_update(&self) -> Vec<u8> {
        let txn = self.doc.transact();
        txn.encode_state_as_update_v1(&Default::default())
    }

    /// Encode the diff between the current state and a remote state vector.
    pub fn encode_diff(&self, remote_state_vector: &[u8]) -> Result<Vec<u8>> {
        let sv = StateVector::decode_v1(remote_state_vector).map_err(|e| {
            SyncError::CrdtTransactionFailed(format!("failed to decode state vector: {}", e))
        })?;
        let txn = self.doc.transact();
        Ok(txn.encode_state_as_update_v1(&sv))
    }

    /// Apply an update received from a remote peer.
    ///
    /// The transaction carries no origin, so the text observer sees the
    /// resulting event as remote.
    pub fn apply_remote_update(&self, update: &[u8]) -> Result<()> {
        let decoded = Update::decode_v1(update).map_err(|e| {
            SyncError::CrdtTransactionFailed(format!("failed to decode update: {}", e))
        })?;
        let mut txn = self.doc.transact_mut();
        txn.apply_update(decoded)
            .map_err(|e| SyncError::CrdtTransactionFailed(format!("failed to apply update: {}", e)))
    }

    // ==================== Internal ====================

    /// Translate normalized-space changes into the editor's space, rewriting
    /// inserted text to the mirror's current newline style.
    pub(crate) fn to_native_changes(&self, normalized: &[TextChange]) -> Vec<TextChange> {
        let ending = self.line_ending();
        normalized
            .iter()
            .map(|c| TextChange {
                start: self.original_offset(c.start),
                end: self.original_offset(c.end),
                text: normalize_newlines(&c.text, ending),
            })
            .collect()
    }

    pub(crate) fn is_local_origin(origin: Option<&Origin>) -> bool {
        origin == Some(&Origin::from(LOCAL_ORIGIN))
    }
}

impl std::fmt::Debug for NormalizedDoc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NormalizedDoc")
            .field("native_len", &self.mirror.read().unwrap().len())
            .finish_non_exhaustive()
    }
}

/// Convert a CRDT delta into a list of normalized-offset changes.
///
/// The cumulative retain advances a cursor over the old sequence; inserts
/// and deletes are emitted relative to it, in ascending order.
pub(crate) fn changes_from_delta(delta: &[ChangeDelta]) -> Vec<TextChange> {
    let mut changes = Vec::new();
    let mut cursor = 0;
    for op in delta {
        match op {
            ChangeDelta::Retain(n) => cursor += n,
            ChangeDelta::Insert(text) => changes.push(TextChange::insert(cursor, text.clone())),
            ChangeDelta::Delete(n) => {
                changes.push(TextChange::delete(cursor, cursor + n));
                cursor += n;
            }
        }
    }
    changes
}

/// Check a sorted batch for overlap, bounds, and character-boundary
/// violations before anything is mutated.
fn validate_changes(changes: &[TextChange], text: &str) -> Result<()> {
    let mut prev_end = 0;
    for (i, change) in changes.iter().enumerate() {
        if change.start > change.end
            || change.end > text.len()
            || !text.is_char_boundary(change.start)
            || !text.is_char_boundary(change.end)
        {
            return Err(SyncError::InvalidEditRange {
                start: change.start,
                end: change.end,
                len: text.len(),
            });
        }
        if i > 0 && change.start < prev_end {
            return Err(SyncError::OverlappingEdit {
                start: change.start,
                prev_end,
            });
        }
        prev_end = change.end;
    }
    Ok(())
}

/// The normalized offsets spanning native `[start, end)` in `text`, found by
/// one left-to-right scan counting bytes that are not the `\r` of a CRLF
/// pair.
fn normalized_span(text: &str, start: usize, end: usize) -> (usize, usize) {
    debug_assert!(start <= end && end <= text.len());
    let bytes = text.as_bytes();
    let mut count = 0;
    let mut ns = usize::MAX;
    for (i, &b) in bytes.iter().enumerate() {
        if i == start {
            ns = count;
        }
        if i == end {
            return (ns, count);
        }
        if !(b == b'\r' && bytes.get(i + 1) == Some(&b'\n')) {
            count += 1;
        }
    }
    if ns == usize::MAX {
        ns = count;
    }
    (ns, count)
}
