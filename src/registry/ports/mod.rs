//! Registry ports.

mod config_store;

pub use config_store::{ConfigStoreError, ConfigStoreResult, ServerConfigStore};
