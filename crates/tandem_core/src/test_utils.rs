//! Test utilities for tandem_core.
//!
//! This module provides shared testing infrastructure, chiefly an in-memory
//! editor with scriptable rejections for exercising the engine's retry
//! paths.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use crate::editor::{BoxFuture, Editor};
use crate::tracker::ChangeTracker;
use crate::types::TextChange;

/// Drive a future to completion on the test thread.
pub fn block_on_test<F: Future>(f: F) -> F::Output {
    futures_lite::future::block_on(f)
}

/// An in-memory editor buffer.
///
/// Applies edits by splicing them into a string, records every accepted
/// batch, and can be told to reject the next N `apply_edit` calls to
/// simulate a buffer whose version keeps advancing.
pub struct MockEditor {
    buffer: Mutex<String>,
    reject_next: AtomicU32,
    applied: Mutex<Vec<Vec<TextChange>>>,
}

impl MockEditor {
    /// A mock editor holding `initial`.
    pub fn new(initial: &str) -> Arc<Self> {
        Arc::new(Self {
            buffer: Mutex::new(initial.to_string()),
            reject_next: AtomicU32::new(0),
            applied: Mutex::new(Vec::new()),
        })
    }

    /// Reject the next `n` calls to `apply_edit`.
    pub fn reject_next(&self, n: u32) {
        self.reject_next.store(n, Ordering::SeqCst);
    }

    /// Overwrite the buffer without telling anyone, simulating out-of-band
    /// drift.
    pub fn force_set_text(&self, text: &str) {
        *self.buffer.lock().unwrap() = text.to_string();
    }

    /// Number of accepted edit batches.
    pub fn applied_batches(&self) -> usize {
        self.applied.lock().unwrap().len()
    }

    /// The accepted edit batches, in order.
    pub fn applied(&self) -> Vec<Vec<TextChange>> {
        self.applied.lock().unwrap().clone()
    }
}

impl Editor for MockEditor {
    fn text(&self) -> String {
        self.buffer.lock().unwrap().clone()
    }

    fn apply_edit<'a>(&'a self, edits: &'a [TextChange]) -> BoxFuture<'a, bool> {
        Box::pin(async move {
            let remaining = self.reject_next.load(Ordering::SeqCst);
            if remaining > 0 {
                self.reject_next.store(remaining - 1, Ordering::SeqCst);
                return false;
            }
            let mut buffer = self.buffer.lock().unwrap();
            match ChangeTracker::apply_text_changes(&buffer, edits) {
                Ok(updated) => {
                    *buffer = updated;
                    self.applied.lock().unwrap().push(edits.to_vec());
                    true
                }
                // A batch that does not fit the buffer is what a version
                // conflict looks like from the outside.
                Err(_) => false,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_editor_applies_edits() {
        let editor = MockEditor::new("hello");
        let ok = block_on_test(editor.apply_edit(&[TextChange::insert(5, " world")]));
        assert!(ok);
        assert_eq!(editor.text(), "hello world");
        assert_eq!(editor.applied_batches(), 1);
    }

    #[test]
    fn test_mock_editor_scripted_rejections() {
        let editor = MockEditor::new("x");
        editor.reject_next(2);
        assert!(!block_on_test(editor.apply_edit(&[TextChange::insert(0, "a")])));
        assert!(!block_on_test(editor.apply_edit(&[TextChange::insert(0, "a")])));
        assert!(block_on_test(editor.apply_edit(&[TextChange::insert(0, "a")])));
        assert_eq!(editor.text(), "ax");
    }

    #[test]
    fn test_mock_editor_rejects_out_of_bounds() {
        let editor = MockEditor::new("ab");
        assert!(!block_on_test(
            editor.apply_edit(&[TextChange::delete(0, 10)])
        ));
        assert_eq!(editor.text(), "ab");
    }
}
