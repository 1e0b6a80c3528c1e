//! Manager for multiple bound documents.
//!
//! One shared `yrs::Doc` can carry many independent texts (one per open
//! buffer); `EngineManager` coordinates a [`SyncEngine`] per text. It
//! handles lazy creation, lookup, and unbinding, and lets the host drive
//! reconciliation across every bound document with a single call. Writes to
//! each text are serialized by the shared doc's own transaction mechanism;
//! across documents there is no ordering guarantee.
//!
//! # Example
//!
//! ```ignore
//! use tandem_core::config::SyncConfig;
//! use tandem_core::sync::EngineManager;
//!
//! let manager = EngineManager::new(SyncConfig::default());
//! let engine = manager.bind("notes.md", editor)?;
//!
//! // From the host's event loop:
//! manager.tick_all().await?;
//! ```

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use yrs::Doc;

use super::engine::SyncEngine;
use crate::config::SyncConfig;
use crate::editor::Editor;
use crate::error::Result;

/// Coordinates one [`SyncEngine`] per named text of a shared doc.
pub struct EngineManager<E: Editor> {
    doc: Doc,
    config: SyncConfig,
    engines: RwLock<HashMap<String, Arc<SyncEngine<E>>>>,
}

impl<E: Editor> EngineManager<E> {
    /// A manager over a fresh shared doc.
    pub fn new(config: SyncConfig) -> Self {
        Self::with_doc(Doc::new(), config)
    }

    /// A manager over an existing shared doc (for example one a sync
    /// provider is already attached to).
    pub fn with_doc(doc: Doc, config: SyncConfig) -> Self {
        Self {
            doc,
            config,
            engines: RwLock::new(HashMap::new()),
        }
    }

    /// The shared doc every bound document lives in.
    pub fn doc(&self) -> &Doc {
        &self.doc
    }

    /// Bind `editor` to the text named `name`, creating the binding on
    /// first use.
    ///
    /// If the name is already bound, the existing engine is returned and
    /// `editor` is ignored.
    pub fn bind(&self, name: &str, editor: Arc<E>) -> Result<Arc<SyncEngine<E>>> {
        {
            let engines = self.engines.read().unwrap();
            if let Some(engine) = engines.get(name) {
                return Ok(Arc::clone(engine));
            }
        }

        let mut engines = self.engines.write().unwrap();
        // Double-check: another caller may have bound while we waited.
        if let Some(engine) = engines.get(name) {
            return Ok(Arc::clone(engine));
        }
        let engine = SyncEngine::bind(&self.doc, name, editor, self.config.clone())?;
        engines.insert(name.to_string(), Arc::clone(&engine));
        log::debug!("[Manager] bound document: {name}");
        Ok(engine)
    }

    /// The engine for `name`, if bound.
    pub fn get(&self, name: &str) -> Option<Arc<SyncEngine<E>>> {
        self.engines.read().unwrap().get(name).map(Arc::clone)
    }

    /// Dispose and remove the binding for `name`. Returns whether one
    /// existed.
    pub fn unbind(&self, name: &str) -> bool {
        let engine = self.engines.write().unwrap().remove(name);
        match engine {
            Some(engine) => {
                engine.dispose();
                log::debug!("[Manager] unbound document: {name}");
                true
            }
            None => false,
        }
    }

    /// Names of every bound document.
    pub fn names(&self) -> Vec<String> {
        self.engines.read().unwrap().keys().cloned().collect()
    }

    /// Run [`SyncEngine::tick`] on every bound document.
    pub async fn tick_all(&self) -> Result<()> {
        let engines: Vec<_> = self.engines.read().unwrap().values().cloned().collect();
        for engine in engines {
            engine.tick().await?;
        }
        Ok(())
    }

    /// Dispose every binding.
    pub fn dispose_all(&self) {
        let mut engines = self.engines.write().unwrap();
        for (name, engine) in engines.drain() {
            engine.dispose();
            log::debug!("[Manager] unbound document: {name}");
        }
    }
}

impl<E: Editor> std::fmt::Debug for EngineManager<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineManager")
            .field("bound", &self.engines.read().unwrap().len())
            .finish_non_exhaustive()
    }
}
