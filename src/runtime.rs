//! Explicitly constructed runtime context bundling the MCP services.

use crate::agent::{AgentGateway, GatewaySettings};
use crate::client::{DefaultTransportFactory, Recoverer, TransportFactory};
use crate::clock::{SharedClock, system_clock};
use crate::registry::{RegistryResult, RegistrySettings, ServerConfigStore, ServerRegistry};
use crate::security::{SecurityConfig, SecurityManager};
use std::sync::Arc;

/// Settings for every service in an [`McpRuntime`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeSettings {
    /// Security manager settings.
    pub security: SecurityConfig,
    /// Settings applied to every client the registry creates.
    pub registry: RegistrySettings,
    /// Agent gateway settings.
    pub gateway: GatewaySettings,
}

/// Security manager, server registry and agent gateway wired together.
///
/// Each runtime is independent, so tests can build as many isolated
/// instances as they need.
pub struct McpRuntime {
    security: Arc<SecurityManager>,
    registry: Arc<ServerRegistry>,
    gateway: Arc<AgentGateway>,
}

impl McpRuntime {
    /// Builds a runtime using the child-process and HTTP transports and the
    /// system clock.
    #[must_use]
    pub fn new(store: Arc<dyn ServerConfigStore>, settings: RuntimeSettings) -> Self {
        RuntimeBuilder::new(store, settings).build()
    }

    /// Starts a builder for runtimes with custom collaborators.
    #[must_use]
    pub fn builder(store: Arc<dyn ServerConfigStore>, settings: RuntimeSettings) -> RuntimeBuilder {
        RuntimeBuilder::new(store, settings)
    }

    /// Returns the security manager.
    #[must_use]
    pub const fn security(&self) -> &Arc<SecurityManager> {
        &self.security
    }

    /// Returns the server registry.
    #[must_use]
    pub const fn registry(&self) -> &Arc<ServerRegistry> {
        &self.registry
    }

    /// Returns the agent gateway.
    #[must_use]
    pub const fn gateway(&self) -> &Arc<AgentGateway> {
        &self.gateway
    }

    /// Starts security maintenance and the registry. Returns how many
    /// servers connected.
    ///
    /// # Errors
    ///
    /// Returns the registry's configuration error; maintenance is stopped
    /// again in that case.
    pub async fn start(&self) -> RegistryResult<usize> {
        self.security.start();
        match self.registry.start().await {
            Ok(connected) => {
                tracing::info!(connected, "MCP runtime started");
                Ok(connected)
            }
            Err(err) => {
                tracing::error!(error = %err, "MCP runtime failed to start");
                self.security.shutdown().await;
                Err(err)
            }
        }
    }

    /// Stops the registry, then security maintenance, draining the audit
    /// writer.
    pub async fn stop(&self) {
        self.registry.stop().await;
        self.security.shutdown().await;
        tracing::info!("MCP runtime stopped");
    }
}

/// Builder for [`McpRuntime`] with replaceable collaborators.
pub struct RuntimeBuilder {
    store: Arc<dyn ServerConfigStore>,
    settings: RuntimeSettings,
    factory: Arc<dyn TransportFactory>,
    recoverer: Option<Arc<dyn Recoverer>>,
    clock: SharedClock,
}

impl RuntimeBuilder {
    fn new(store: Arc<dyn ServerConfigStore>, settings: RuntimeSettings) -> Self {
        Self {
            store,
            settings,
            factory: Arc::new(DefaultTransportFactory),
            recoverer: None,
            clock: system_clock(),
        }
    }

    /// Opens transports through `factory`.
    #[must_use]
    pub fn transport_factory(mut self, factory: Arc<dyn TransportFactory>) -> Self {
        self.factory = factory;
        self
    }

    /// Installs a recovery hook on every client.
    #[must_use]
    pub fn recoverer(mut self, recoverer: Arc<dyn Recoverer>) -> Self {
        self.recoverer = Some(recoverer);
        self
    }

    /// Reads time from `clock` in every service.
    #[must_use]
    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// Wires the services together.
    #[must_use]
    pub fn build(self) -> McpRuntime {
        let security = Arc::new(SecurityManager::with_clock(
            self.settings.security,
            Arc::clone(&self.clock),
        ));
        let base = ServerRegistry::new(self.store, self.factory, self.settings.registry)
            .with_security(Arc::clone(&security))
            .with_clock(Arc::clone(&self.clock));
        let registry = Arc::new(match self.recoverer {
            Some(recoverer) => base.with_recoverer(recoverer),
            None => base,
        });
        let gateway = Arc::new(
            AgentGateway::new(Arc::clone(&registry), self.settings.gateway)
                .with_security(Arc::clone(&security))
                .with_clock(self.clock),
        );
        McpRuntime {
            security,
            registry,
            gateway,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{InMemoryMcpServer, InMemoryTransportFactory, TransportConfig};
    use crate::protocol::{CallToolResult, ToolDescriptor};
    use crate::registry::{InMemoryConfigStore, RegistryConfigFile, ServerConfig, ServerName};
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[tokio::test]
    async fn runtime_routes_agent_calls_end_to_end() {
        let server = InMemoryMcpServer::new("echo").with_tool(
            ToolDescriptor::new("ping", "Replies pong", json!({"type": "object"})),
            CallToolResult::text("pong"),
        );
        let factory = InMemoryTransportFactory::new();
        factory.add("echo-server", server.clone());
        let config = ServerConfig::new(
            ServerName::new("echo").expect("valid name"),
            TransportConfig::stdio(["echo-server"]).expect("valid argv"),
        )
        .with_auto_reconnect(false);
        let store = InMemoryConfigStore::with_config(RegistryConfigFile::from_configs([&config]));
        let runtime = McpRuntime::builder(Arc::new(store), RuntimeSettings::default())
            .transport_factory(Arc::new(factory))
            .build();

        let connected = runtime.start().await.expect("runtime starts");
        let result = runtime
            .gateway()
            .call_tool("planner", "ping", json!({}), None)
            .await
            .expect("call should succeed");
        runtime.stop().await;

        assert_eq!(connected, 1);
        assert_eq!(result, CallToolResult::text("pong"));
        assert!(!runtime.registry().statuses().values().any(|status| status.connected()));
    }
}
