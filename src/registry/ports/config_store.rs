//! Persistence port for the registry configuration file.

use crate::registry::domain::RegistryConfigFile;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for configuration store operations.
pub type ConfigStoreResult<T> = Result<T, ConfigStoreError>;

/// Loads and saves the registry configuration.
#[async_trait]
pub trait ServerConfigStore: Send + Sync {
    /// Loads the stored configuration. `None` means nothing has been stored
    /// yet.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigStoreError`] when the configuration exists but cannot
    /// be read or parsed.
    async fn load(&self) -> ConfigStoreResult<Option<RegistryConfigFile>>;

    /// Replaces the stored configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigStoreError`] when the configuration cannot be written.
    async fn save(&self, config: &RegistryConfigFile) -> ConfigStoreResult<()>;
}

/// Errors returned by configuration stores.
#[derive(Debug, Clone, Error)]
pub enum ConfigStoreError {
    /// The stored document is not valid configuration JSON.
    #[error("malformed registry configuration: {0}")]
    Malformed(String),

    /// Reading or writing the backing storage failed.
    #[error("configuration storage error: {0}")]
    Io(Arc<dyn std::error::Error + Send + Sync>),
}

impl ConfigStoreError {
    /// Wraps a storage failure.
    pub fn io(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Io(Arc::new(err))
    }
}
