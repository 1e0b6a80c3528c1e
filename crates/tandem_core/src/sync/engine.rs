//! Sync engine: binds one editor buffer to one shared CRDT text.
//!
//! The engine owns the document mirror and a change tracker, and routes
//! edits in both directions:
//!
//! - **Local edit** (from the editor): deduplicated against the tracker,
//!   then written into the shared text inside one transaction tagged with
//!   the crate's local origin. The text observer sees the origin and drops
//!   the resulting event.
//! - **Remote edit** (text observer, foreign origin): converted to a delta
//!   batch and queued; [`SyncEngine::pump`] drains the queue in event order,
//!   translates each batch into the editor's coordinate space, and applies
//!   it to the buffer with a bounded retry loop.
//!
//! Drift between the buffer and the shared text is repaired by a debounced
//! reconciliation pass that replaces the editor content from the CRDT with
//! a single tracked edit, without writing the CRDT.
//!
//! The engine is cooperative: the host drives it from one task per
//! document, forwarding editor change notifications to
//! [`SyncEngine::handle_editor_change`], feeding provider bytes to
//! [`SyncEngine::apply_remote_update`], and calling [`SyncEngine::tick`]
//! from its event loop.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use yrs::types::Delta;
use yrs::{Doc, Observable, Subscription};

use super::debounce::ResyncSchedule;
use crate::config::SyncConfig;
use crate::doc::{DocUpdate, LineEnding, NormalizedDoc, normalize_newlines};
use crate::editor::Editor;
use crate::error::{Result, SyncError};
use crate::tracker::ChangeTracker;
use crate::types::{ChangeDelta, TextChange};

/// Where a bound document currently is in its edit cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// No pending remote or local edit.
    Idle,
    /// A remote batch is being applied to the editor.
    ApplyingRemote,
    /// A local batch is being written into the shared text.
    ApplyingLocal,
    /// The editor buffer is being replaced from the shared text.
    Resyncing,
}

/// Binds one editor buffer to one shared text and keeps them convergent.
pub struct SyncEngine<E: Editor> {
    doc: Arc<NormalizedDoc>,
    editor: Arc<E>,
    tracker: ChangeTracker,
    config: SyncConfig,
    /// Remote delta batches queued by the text observer, in event order.
    inbox: Arc<Mutex<VecDeque<Vec<ChangeDelta>>>>,
    state: Mutex<EngineState>,
    schedule: Mutex<ResyncSchedule>,
    /// Set when a reconciliation should run at the next tick regardless of
    /// the debounce (retry exhaustion, drift detected at bind time).
    resync_pending: AtomicBool,
    /// Serializes the resync critical section.
    resync_in_flight: AtomicBool,
    /// Guards against re-entrant pumping from inside an editor callback.
    pumping: AtomicBool,
    disposed: AtomicBool,
    subscription: Mutex<Option<Subscription>>,
}

impl<E: Editor> SyncEngine<E> {
    /// Bind `editor` to the shared text named `name` in `doc`.
    ///
    /// If the editor and the shared text already agree (up to line endings),
    /// the mirror adopts the editor's text verbatim so its newline style is
    /// preserved; otherwise an immediate reconciliation is scheduled for the
    /// next [`SyncEngine::tick`].
    pub fn bind(doc: &Doc, name: &str, editor: Arc<E>, config: SyncConfig) -> Result<Arc<Self>> {
        let text_ref = doc.get_or_insert_text(name);
        let ndoc = Arc::new(NormalizedDoc::new(doc, text_ref.clone()));

        let editor_text = editor.text();
        let crdt = ndoc.crdt_string();
        let needs_resync = if normalize_newlines(&editor_text, LineEnding::Lf) == crdt {
            if editor_text != crdt {
                ndoc.update(DocUpdate::Replace(editor_text), false)?;
            }
            false
        } else {
            log::debug!("[Engine] editor and shared text differ at bind; scheduling resync");
            true
        };

        let inbox: Arc<Mutex<VecDeque<Vec<ChangeDelta>>>> = Arc::new(Mutex::new(VecDeque::new()));
        let subscription = {
            let inbox = Arc::clone(&inbox);
            text_ref.observe(move |txn, event| {
                if NormalizedDoc::is_local_origin(txn.origin()) {
                    return;
                }
                let mut batch = Vec::new();
                for op in event.delta(txn) {
                    match op {
                        Delta::Retain(n, _) => batch.push(ChangeDelta::Retain(*n as usize)),
                        Delta::Deleted(n) => batch.push(ChangeDelta::Delete(*n as usize)),
                        Delta::Inserted(value, _) => match value.clone().cast::<String>() {
                            Ok(text) => batch.push(ChangeDelta::Insert(text)),
                            Err(_) => {
                                log::warn!("[Engine] ignoring non-text insert in remote delta")
                            }
                        },
                    }
                }
                if !batch.is_empty() {
                    inbox.lock().unwrap().push_back(batch);
                }
            })
        };

        Ok(Arc::new(Self {
            doc: ndoc,
            editor,
            tracker: ChangeTracker::new(),
            schedule: Mutex::new(ResyncSchedule::new(config.clone(), Instant::now())),
            config,
            inbox,
            state: Mutex::new(EngineState::Idle),
            resync_pending: AtomicBool::new(needs_resync),
            resync_in_flight: AtomicBool::new(false),
            pumping: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
            subscription: Mutex::new(Some(subscription)),
        }))
    }

    // ==================== Accessors ====================

    /// The bound document mirror.
    pub fn doc(&self) -> &NormalizedDoc {
        &self.doc
    }

    /// The current engine state.
    pub fn state(&self) -> EngineState {
        *self.state.lock().unwrap()
    }

    /// Whether the binding has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    // ==================== Local edits ====================

    /// Handle a change notification from the editor.
    ///
    /// Queued remote batches are drained first so edits stay serialized,
    /// then the batch is checked against the tracker: echoes of remote edits
    /// the engine just applied are dropped, everything else is written into
    /// the shared text inside one transaction.
    pub async fn handle_editor_change(&self, changes: Vec<TextChange>) -> Result<()> {
        self.ensure_live()?;
        self.pump().await?;
        if changes.is_empty() {
            return Ok(());
        }
        if !self.tracker.should_apply(&changes) {
            log::debug!(
                "[Engine] dropped echoed editor change ({} edits)",
                changes.len()
            );
            return Ok(());
        }

        self.set_state(EngineState::ApplyingLocal);
        let result = self.doc.update(DocUpdate::Edits(changes), true);
        self.set_state(EngineState::Idle);
        self.note_activity();
        result
    }

    // ==================== Remote edits ====================

    /// Apply an update received from a sync provider, then drain the
    /// resulting remote batches into the editor.
    pub async fn apply_remote_update(&self, update: &[u8]) -> Result<()> {
        self.ensure_live()?;
        self.doc.apply_remote_update(update)?;
        self.pump().await
    }

    /// Drain queued remote batches into the editor, in the order their
    /// events fired.
    pub async fn pump(&self) -> Result<()> {
        self.ensure_live()?;
        if self.pumping.swap(true, Ordering::SeqCst) {
            // Re-entered from inside an editor callback; the outer drain
            // loop picks up whatever is queued.
            return Ok(());
        }
        let result = self.pump_inner().await;
        self.pumping.store(false, Ordering::SeqCst);
        result
    }

    async fn pump_inner(&self) -> Result<()> {
        loop {
            // Once a reconciliation is owed, queued batches are stale: they
            // were measured against a buffer state the editor no longer
            // has. The resync re-reads the full shared text anyway.
            if self.resync_pending.load(Ordering::SeqCst) {
                let dropped = {
                    let mut inbox = self.inbox.lock().unwrap();
                    let n = inbox.len();
                    inbox.clear();
                    n
                };
                if dropped > 0 {
                    log::debug!("[Engine] discarded {dropped} remote batches pending resync");
                }
                return Ok(());
            }
            let batch = self.inbox.lock().unwrap().pop_front();
            let Some(batch) = batch else { return Ok(()) };
            self.apply_remote_batch(&batch).await?;
        }
    }

    async fn apply_remote_batch(&self, delta: &[ChangeDelta]) -> Result<()> {
        self.set_state(EngineState::ApplyingRemote);
        let result = self.apply_remote_batch_inner(delta).await;
        self.set_state(EngineState::Idle);
        self.note_activity();
        result
    }

    async fn apply_remote_batch_inner(&self, delta: &[ChangeDelta]) -> Result<()> {
        let max = self.config.max_edit_retries.max(1);
        for attempt in 1..=max {
            // Translation runs against the current mirror on every attempt:
            // a rejected edit is recomputed from a fresh snapshot while the
            // normalized changes are preserved.
            let applied = self
                .tracker
                .apply_delta(&self.doc, delta, |changes| {
                    let editor = Arc::clone(&self.editor);
                    let doc = Arc::clone(&self.doc);
                    async move {
                        let ok = editor.apply_edit(&changes).await;
                        if ok {
                            doc.update(DocUpdate::Edits(changes), false)?;
                        }
                        Ok(ok)
                    }
                })
                .await?;
            if applied {
                return Ok(());
            }
            log::debug!("[Engine] editor rejected remote edit (attempt {attempt}/{max})");
        }
        log::warn!("[Engine] abandoning remote edit after {max} attempts; resync scheduled");
        self.resync_pending.store(true, Ordering::SeqCst);
        Ok(())
    }

    // ==================== Reconciliation ====================

    /// Run due maintenance: drain remote batches, then reconcile the editor
    /// against the shared text if the debounce, the forced interval, or a
    /// pending request says so.
    pub async fn tick(&self) -> Result<()> {
        self.ensure_live()?;
        self.pump().await?;
        let due = self.resync_pending.swap(false, Ordering::SeqCst)
            || self.schedule.lock().unwrap().is_due(Instant::now());
        if !due {
            return Ok(());
        }
        self.reconcile().await
    }

    async fn reconcile(&self) -> Result<()> {
        let editor_text = self.editor.text();
        let crdt = self.doc.crdt_string();
        self.schedule.lock().unwrap().mark_reconciled(Instant::now());

        if normalize_newlines(&editor_text, LineEnding::Lf) == crdt {
            // In agreement. Repair the mirror if it lagged behind the
            // editor and drop change sets that can no longer be confirmed.
            if self.doc.text() != editor_text {
                self.doc.update(DocUpdate::Replace(editor_text.clone()), false)?;
            }
            self.tracker.prune_stale(&editor_text);
            return Ok(());
        }

        log::warn!("[Engine] editor and shared text diverged; replacing editor buffer");
        self.resync().await
    }

    /// Replace the editor buffer with the shared text's content, converted
    /// to the editor's newline style. Never writes the CRDT.
    async fn resync(&self) -> Result<()> {
        if self.resync_in_flight.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.set_state(EngineState::Resyncing);
        let result = self.resync_inner().await;
        self.set_state(EngineState::Idle);
        self.resync_in_flight.store(false, Ordering::SeqCst);
        result
    }

    async fn resync_inner(&self) -> Result<()> {
        let crdt = self.doc.crdt_string();
        self.tracker.clear();
        let max = self.config.max_edit_retries.max(1);
        for attempt in 1..=max {
            let editor_text = self.editor.text();
            if normalize_newlines(&editor_text, LineEnding::Lf) == crdt {
                self.doc.update(DocUpdate::Replace(editor_text), false)?;
                return Ok(());
            }
            let native = normalize_newlines(&crdt, LineEnding::of(&editor_text));
            // The mirror adopts the last observed editor text first, so the
            // recorded change set describes the transition the editor will
            // actually report back.
            self.doc
                .update(DocUpdate::Replace(editor_text.clone()), false)?;
            let replace = vec![TextChange::replace(0, editor_text.len(), native)];
            let applied = self
                .tracker
                .apply_changes(&self.doc, &replace, |changes| {
                    let editor = Arc::clone(&self.editor);
                    let doc = Arc::clone(&self.doc);
                    async move {
                        let ok = editor.apply_edit(&changes).await;
                        if ok {
                            let text = changes
                                .into_iter()
                                .next()
                                .map(|c| c.text)
                                .unwrap_or_default();
                            doc.update(DocUpdate::Replace(text), false)?;
                        }
                        Ok(ok)
                    }
                })
                .await?;
            if applied {
                log::info!("[Engine] resync complete ({} bytes)", crdt.len());
                return Ok(());
            }
            log::debug!("[Engine] editor rejected resync replace (attempt {attempt}/{max})");
        }
        self.resync_pending.store(true, Ordering::SeqCst);
        Err(SyncError::EditorRejectedEdit(max))
    }

    // ==================== Sync I/O ====================

    /// Encode the current state vector for sync.
    pub fn encode_state_vector(&self) -> Result<Vec<u8>> {
        self.ensure_live()?;
        Ok(self.doc.encode_state_vector())
    }

    /// Encode the full state as an update.
    pub fn encode_state_as_update(&self) -> Result<Vec<u8>> {
        self.ensure_live()?;
        Ok(self.doc.encode_state_as_update())
    }

    /// Encode the diff between the current state and a remote state vector.
    pub fn encode_diff(&self, remote_state_vector: &[u8]) -> Result<Vec<u8>> {
        self.ensure_live()?;
        self.doc.encode_diff(remote_state_vector)
    }

    // ==================== Lifecycle ====================

    /// Unsubscribe the text observer and drop all pending work.
    ///
    /// Idempotent. Every later public operation fails with
    /// [`SyncError::ObserverDisposed`].
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        *self.subscription.lock().unwrap() = None;
        self.inbox.lock().unwrap().clear();
        self.tracker.clear();
        log::debug!("[Engine] disposed");
    }

    fn ensure_live(&self) -> Result<()> {
        if self.is_disposed() {
            return Err(SyncError::ObserverDisposed);
        }
        Ok(())
    }

    fn set_state(&self, state: EngineState) {
        *self.state.lock().unwrap() = state;
    }

    fn note_activity(&self) {
        self.schedule.lock().unwrap().note_activity(Instant::now());
    }
}

impl<E: Editor> Drop for SyncEngine<E> {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl<E: Editor> std::fmt::Debug for SyncEngine<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("state", &self.state())
            .field("disposed", &self.is_disposed())
            .field("pending_changes", &self.tracker.pending_len())
            .finish_non_exhaustive()
    }
}
