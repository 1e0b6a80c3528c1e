//! Editor capability surface.
//!
//! The core never talks to a concrete editor. Hosts implement [`Editor`] for
//! whatever buffer they own (an LSP-connected client, a local TUI widget, a
//! webview) and forward the editor's change notifications to
//! [`SyncEngine::handle_editor_change`](crate::sync::SyncEngine::handle_editor_change).
//!
//! ## Object safety
//!
//! `Editor` is designed to be object-safe so engines can hold
//! `Arc<dyn Editor>` when hosts need heterogeneous buffers. To enable this,
//! the awaitable method returns a boxed future.
//!
//! ## Notification contract
//!
//! Editors deliver the change events caused by an [`Editor::apply_edit`]
//! call before the returned future resolves, or at any later point through
//! the host's normal notification path; the engine's change tracker matches
//! them by resulting text either way.

use std::future::Future;
use std::pin::Pin;

use crate::types::TextChange;

/// A boxed future for object-safe async methods.
///
/// On native targets, futures are `Send` for compatibility with
/// multi-threaded runtimes. On WASM, there's no `Send` requirement since
/// JavaScript is single-threaded.
#[cfg(not(target_arch = "wasm32"))]
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A boxed future for object-safe async methods.
///
/// WASM version without `Send` requirement.
#[cfg(target_arch = "wasm32")]
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a>>;

/// The buffer surface the core consumes from a host editor.
#[cfg(not(target_arch = "wasm32"))]
pub trait Editor: Send + Sync {
    /// The full current buffer content, in the editor's native form.
    fn text(&self) -> String;

    /// Apply a batch of replacements to the buffer.
    ///
    /// Changes are expressed against the buffer content the engine last
    /// observed. Returns `false` if the buffer moved underneath the edit
    /// (for example because its version advanced); the engine retries with
    /// freshly recomputed coordinates.
    fn apply_edit<'a>(&'a self, edits: &'a [TextChange]) -> BoxFuture<'a, bool>;
}

/// The buffer surface the core consumes from a host editor.
///
/// WASM version without `Send + Sync` bounds.
#[cfg(target_arch = "wasm32")]
pub trait Editor {
    /// The full current buffer content, in the editor's native form.
    fn text(&self) -> String;

    /// Apply a batch of replacements to the buffer.
    fn apply_edit<'a>(&'a self, edits: &'a [TextChange]) -> BoxFuture<'a, bool>;
}
