use thiserror::Error;

/// Unified error type for tandem_core operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A change batch contained a change that starts before the previous
    /// change ends.
    ///
    /// Callers must submit non-overlapping change batches, expressed in the
    /// coordinates of the text before the batch. This is a programmer error
    /// and is surfaced synchronously, before any mutation takes place.
    #[error("overlapping edit: change at offset {start} begins before the previous change ends at {prev_end}")]
    OverlappingEdit {
        /// Start offset of the offending change.
        start: usize,
        /// End offset of the change preceding it.
        prev_end: usize,
    },

    /// A change referenced a byte range that is out of bounds for the
    /// current text, or that does not fall on a character boundary.
    ///
    /// Like [`SyncError::OverlappingEdit`], this is detected up front and
    /// leaves both the mirror and the shared text untouched.
    #[error("invalid edit range {start}..{end} for text of length {len}")]
    InvalidEditRange {
        /// Start offset of the offending change.
        start: usize,
        /// End offset of the offending change.
        end: usize,
        /// Length of the text the change was applied against.
        len: usize,
    },

    /// A CRDT-side operation failed (undecodable update, failed apply).
    ///
    /// The surrounding transaction is abandoned and the local mirror is left
    /// unchanged. The error is propagated to the caller; CRDT writes are
    /// never retried.
    #[error("CRDT transaction failed: {0}")]
    CrdtTransactionFailed(String),

    /// The editor rejected an edit on every attempt.
    ///
    /// Remote edits are retried with freshly recomputed coordinates up to
    /// `max_edit_retries` times; exhaustion on that path schedules a resync
    /// instead of raising. This error only escapes from the resync path
    /// itself, where there is no further fallback.
    #[error("editor rejected edit after {0} attempts")]
    EditorRejectedEdit(u32),

    /// The document binding has been disposed.
    ///
    /// Public operations fail with this immediately once the CRDT observer
    /// has been unsubscribed.
    #[error("document observer has been disposed")]
    ObserverDisposed,
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SyncError>;
