//! Server registry: configured MCP servers, their clients, health monitors
//! and the agent-facing routing checks.
//!
//! Configuration is loaded and persisted through the [`ServerConfigStore`]
//! port. The [`ServerRegistry`] owns one client per connected server and is
//! the single path agents take to reach any of them.

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;

pub use adapters::{InMemoryConfigStore, JsonFileConfigStore};
pub use domain::{
    REGISTRY_CONFIG_VERSION, RegistryConfigFile, RegistryDomainError, ServerConfig,
    ServerConfigRecord, ServerHealth, ServerHealthSnapshot, ServerName, ServerStatus,
    TransportKind,
};
pub use ports::{ConfigStoreError, ConfigStoreResult, ServerConfigStore};
pub use services::{
    RegistryError, RegistryResult, RegistrySettings, ServerRegistry, ServerResource, ServerTool,
};
