//! In-memory configuration store for tests.

use crate::registry::domain::RegistryConfigFile;
use crate::registry::ports::{ConfigStoreResult, ServerConfigStore};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct StoreState {
    config: Option<RegistryConfigFile>,
    saves: usize,
}

/// Configuration store keeping the document in memory. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct InMemoryConfigStore {
    state: Arc<Mutex<StoreState>>,
}

impl InMemoryConfigStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store already holding `config`.
    #[must_use]
    pub fn with_config(config: RegistryConfigFile) -> Self {
        let store = Self::default();
        store.lock().config = Some(config);
        store
    }

    /// Returns the stored document.
    #[must_use]
    pub fn stored(&self) -> Option<RegistryConfigFile> {
        self.lock().config.clone()
    }

    /// Returns how many times the document was saved.
    #[must_use]
    pub fn save_count(&self) -> usize {
        self.lock().saves
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ServerConfigStore for InMemoryConfigStore {
    async fn load(&self) -> ConfigStoreResult<Option<RegistryConfigFile>> {
        Ok(self.stored())
    }

    async fn save(&self, config: &RegistryConfigFile) -> ConfigStoreResult<()> {
        let mut state = self.lock();
        state.config = Some(config.clone());
        state.saves = state.saves.saturating_add(1);
        Ok(())
    }
}
