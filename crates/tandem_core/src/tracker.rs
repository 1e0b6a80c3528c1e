//! Change tracking and echo suppression.
//!
//! An editor cannot tell which of its change events originated from a remote
//! edit the core just applied and which came from the user. The tracker
//! answers that question by recording each in-flight remote batch as a
//! `ChangeSet { before, after }` and comparing candidate editor changes by
//! *resulting text*: editors coalesce and reorder adjacent edits
//! unpredictably, and equality of result is the only invariant that survives
//! that fusion.
//!
//! Entry lifecycle: an entry is pushed just before the remote edit is handed
//! to the editor. If the editor rejects the edit or the apply fails, the
//! entry is removed immediately, so the tracker cannot wrongly suppress
//! future user edits. If the edit lands, the entry stays until the editor's
//! own change event for it is matched (and consumed) by
//! [`ChangeTracker::should_apply`]; lingering entries are cleared by the
//! engine's periodic reconciliation.

use std::future::Future;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::doc::NormalizedDoc;
use crate::doc::normalized::changes_from_delta;
use crate::error::{Result, SyncError};
use crate::types::{ChangeDelta, ChangeSet, TextChange};

/// Records locally applied remote edit batches and classifies incoming
/// editor changes as echoes or genuine edits.
#[derive(Debug, Default)]
pub struct ChangeTracker {
    pending: Mutex<Vec<(u64, ChangeSet)>>,
    next_id: AtomicU64,
}

impl ChangeTracker {
    /// An empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of change sets currently in flight.
    pub fn pending_len(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    /// Drop every pending change set.
    pub fn clear(&self) {
        self.pending.lock().unwrap().clear();
    }

    /// Drop change sets that can no longer be confirmed by the editor.
    ///
    /// A set whose `after` still equals the current editor text may yet see
    /// its echo; anything else describes a transition the editor has moved
    /// past, and keeping it would risk suppressing a genuine future edit.
    pub fn prune_stale(&self, current_text: &str) {
        let mut pending = self.pending.lock().unwrap();
        let before = pending.len();
        pending.retain(|(_, set)| set.after == current_text);
        let dropped = before - pending.len();
        if dropped > 0 {
            log::debug!("[Tracker] pruned {dropped} unconfirmed change sets");
        }
    }

    /// Decide whether a candidate batch of editor changes is a genuine edit
    /// (`true`) or the echo of a recorded remote edit (`false`).
    ///
    /// The matched change set, if any, is consumed.
    pub fn should_apply(&self, changes: &[TextChange]) -> bool {
        let mut sorted = changes.to_vec();
        sorted.sort_by_key(|c| c.start);

        let mut pending = self.pending.lock().unwrap();
        for i in 0..pending.len() {
            match Self::apply_text_changes(&pending[i].1.before, &sorted) {
                Ok(result) if result == pending[i].1.after => {
                    log::debug!(
                        "[Tracker] editor batch reproduces a pending remote edit; suppressing echo"
                    );
                    pending.remove(i);
                    return false;
                }
                _ => {}
            }
        }
        true
    }

    /// Splice a batch of changes into `text`, in order, with a running
    /// length delta.
    ///
    /// # Errors
    ///
    /// [`SyncError::OverlappingEdit`] if a change starts before the previous
    /// one ends; [`SyncError::InvalidEditRange`] for out-of-bounds or
    /// non-boundary ranges. The batch must already be sorted by start.
    pub fn apply_text_changes(text: &str, changes: &[TextChange]) -> Result<String> {
        let mut out = text.to_string();
        let mut delta = 0isize;
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
            let start = (change.start as isize + delta) as usize;
            let end = (change.end as isize + delta) as usize;
            out.replace_range(start..end, &change.text);
            delta += change.text.len() as isize - (end - start) as isize;
            prev_end = change.end;
        }
        Ok(out)
    }

    /// Record `changes` against `doc`'s current text and run `apply_fn` with
    /// them.
    ///
    /// Returns `apply_fn`'s verdict: `Ok(true)` when the editor accepted the
    /// edit (the change set stays pending until its echo is consumed),
    /// `Ok(false)` or `Err` otherwise (the change set is removed right
    /// away).
    pub async fn apply_changes<F, Fut>(
        &self,
        doc: &NormalizedDoc,
        changes: &[TextChange],
        apply_fn: F,
    ) -> Result<bool>
    where
        F: FnOnce(Vec<TextChange>) -> Fut,
        Fut: Future<Output = Result<bool>>,
    {
        let mut sorted = changes.to_vec();
        sorted.sort_by_key(|c| c.start);

        let before = doc.text();
        let after = Self::apply_text_changes(&before, &sorted)?;
        let id = self.push(ChangeSet { before, after });

        let result = apply_fn(sorted).await;
        if !matches!(result, Ok(true)) {
            self.remove(id);
        }
        result
    }

    /// Convert a CRDT delta into native-space changes for `doc` and apply
    /// them through [`ChangeTracker::apply_changes`].
    ///
    /// Returns `Ok(true)` without calling `apply_fn` when the delta carries
    /// no text effect.
    pub async fn apply_delta<F, Fut>(
        &self,
        doc: &NormalizedDoc,
        delta: &[ChangeDelta],
        apply_fn: F,
    ) -> Result<bool>
    where
        F: FnOnce(Vec<TextChange>) -> Fut,
        Fut: Future<Output = Result<bool>>,
    {
        let normalized = changes_from_delta(delta);
        if normalized.is_empty() {
            return Ok(true);
        }
        let native = doc.to_native_changes(&normalized);
        self.apply_changes(doc, &native, apply_fn).await
    }

    fn push(&self, change_set: ChangeSet) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.pending.lock().unwrap().push((id, change_set));
        id
    }

    fn remove(&self, id: u64) {
        self.pending.lock().unwrap().retain(|(i, _)| *i != id);
    }
}
