//! Shared world state for server registry BDD scenarios.

use rstest::fixture;
use std::sync::Arc;
use switchboard::client::{InMemoryMcpServer, InMemoryTransportFactory};
use switchboard::protocol::CallToolResult;
use switchboard::registry::{
    InMemoryConfigStore, RegistryError, RegistrySettings, ServerConfig, ServerRegistry,
};

/// Scenario world for registry behaviour tests.
pub struct RegistryWorld {
    pub factory: InMemoryTransportFactory,
    pub registry: Arc<ServerRegistry>,
    pub backend: Option<InMemoryMcpServer>,
    pub pending_config: Option<ServerConfig>,
    pub last_registration_error: Option<RegistryError>,
    pub last_call: Option<Result<CallToolResult, RegistryError>>,
}

impl RegistryWorld {
    /// Creates a world with an empty registry.
    #[must_use]
    pub fn new() -> Self {
        let factory = InMemoryTransportFactory::new();
        let registry = Arc::new(ServerRegistry::new(
            Arc::new(InMemoryConfigStore::new()),
            Arc::new(factory.clone()),
            RegistrySettings::default(),
        ));
        Self {
            factory,
            registry,
            backend: None,
            pending_config: None,
            last_registration_error: None,
            last_call: None,
        }
    }

    /// Returns the configuration built by the given steps.
    pub fn pending_config(&self) -> Result<ServerConfig, eyre::Report> {
        self.pending_config
            .clone()
            .ok_or_else(|| eyre::eyre!("missing pending server configuration"))
    }

    /// Returns the in-memory server behind the configuration.
    pub fn backend(&self) -> Result<&InMemoryMcpServer, eyre::Report> {
        self.backend
            .as_ref()
            .ok_or_else(|| eyre::eyre!("missing in-memory server"))
    }
}

impl Default for RegistryWorld {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixture that creates a new scenario world.
#[fixture]
pub fn world() -> RegistryWorld {
    RegistryWorld::default()
}

/// Runs an async operation within sync step definitions.
pub fn run_async<T>(future: impl std::future::Future<Output = T>) -> T {
    tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(future))
}
