//! Synchronization between an editor buffer and the shared text.
//!
//! [`engine`] binds one buffer to one text; [`manager`] coordinates many
//! bindings over a single shared doc.

mod debounce;
pub mod engine;
pub mod manager;

pub use engine::{EngineState, SyncEngine};
pub use manager::EngineManager;
