//! Server registry: configured servers, their clients and health monitors.

use crate::circuit_breaker::CircuitBreakerConfig;
use crate::client::{
    McpClient, McpClientError, McpClientOptions, NoopRecoverer, Recoverer, TransportFactory,
};
use crate::clock::{SharedClock, system_clock};
use crate::protocol::{
    CallToolResult, ImplementationInfo, ReadResourceResult, ResourceDescriptor, ToolDescriptor,
};
use crate::registry::domain::{
    RegistryConfigFile, RegistryDomainError, ServerConfig, ServerHealthSnapshot, ServerName,
    ServerStatus,
};
use crate::registry::ports::{ConfigStoreError, ServerConfigStore};
use crate::security::SecurityManager;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Errors returned by the registry.
#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    /// Configuration failed validation.
    #[error(transparent)]
    Domain(#[from] RegistryDomainError),

    /// The configuration store failed.
    #[error(transparent)]
    Store(#[from] ConfigStoreError),

    /// No server with this name is registered.
    #[error("MCP server '{0}' is not registered")]
    UnknownServer(String),

    /// A server with this name is already registered.
    #[error("MCP server '{0}' is already registered")]
    DuplicateServer(ServerName),

    /// The server's allow-list does not include the agent.
    #[error("agent '{agent}' is not allowed to use MCP server '{server}'")]
    AgentNotAllowed {
        /// Server name.
        server: ServerName,
        /// Rejected agent.
        agent: String,
    },

    /// The server has no live connection.
    #[error("MCP server '{0}' is not connected")]
    NotConnected(ServerName),

    /// The server was disconnected while the connect was in flight.
    #[error("connect to MCP server '{0}' was superseded by a disconnect")]
    ConnectSuperseded(ServerName),

    /// The client call failed.
    #[error(transparent)]
    Client(Box<McpClientError>),
}

impl From<McpClientError> for RegistryError {
    fn from(err: McpClientError) -> Self {
        Self::Client(Box::new(err))
    }
}

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Settings applied to every client the registry creates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrySettings {
    /// Identity announced during handshakes.
    pub client_info: ImplementationInfo,
    /// Breaker thresholds for each client.
    pub breaker: CircuitBreakerConfig,
    /// Deadline for the `shutdown` request on disconnect.
    pub shutdown_timeout: Duration,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        let defaults = McpClientOptions::default();
        Self {
            client_info: defaults.client_info,
            breaker: defaults.breaker,
            shutdown_timeout: defaults.shutdown_timeout,
        }
    }
}

/// Tool advertised by a server, tagged with the server name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerTool {
    /// Server advertising the tool.
    pub server: ServerName,
    /// Tool descriptor.
    pub tool: ToolDescriptor,
}

/// Resource advertised by a server, tagged with the server name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerResource {
    /// Server advertising the resource.
    pub server: ServerName,
    /// Resource descriptor.
    pub resource: ResourceDescriptor,
}

struct Monitor {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

struct ServerEntry {
    config: ServerConfig,
    client: Option<Arc<McpClient>>,
    status: ServerStatus,
    monitor: Option<Monitor>,
    /// Bumped on every disconnect; a connect only attaches its client when
    /// the generation it started under is still current.
    generation: u64,
}

impl ServerEntry {
    const fn new(config: ServerConfig, status: ServerStatus) -> Self {
        Self {
            config,
            client: None,
            status,
            monitor: None,
            generation: 0,
        }
    }

    /// Detaches the client and monitor, cancelling the monitor before the
    /// entry lock is released.
    fn detach(&mut self) -> (Option<Arc<McpClient>>, Option<Monitor>) {
        self.generation = self.generation.wrapping_add(1);
        self.status.mark_disconnected();
        let monitor = self.monitor.take();
        if let Some(running) = &monitor {
            running.cancel.cancel();
        }
        (self.client.take(), monitor)
    }
}

enum Attach {
    Attached(Option<Arc<McpClient>>),
    AlreadyConnected,
    Superseded,
    Missing,
}

/// Owns every configured server and routes agent calls to them.
///
/// Each entry pairs a configuration with its status and, while connected,
/// its client. Servers with `auto_reconnect` get a health monitor that
/// replaces the client when probes fail. The entry map is never locked
/// across an `.await`.
pub struct ServerRegistry {
    store: Arc<dyn ServerConfigStore>,
    factory: Arc<dyn TransportFactory>,
    settings: RegistrySettings,
    security: Option<Arc<SecurityManager>>,
    recoverer: Arc<dyn Recoverer>,
    clock: SharedClock,
    entries: Mutex<BTreeMap<ServerName, ServerEntry>>,
    lifecycle: Mutex<CancellationToken>,
}

impl ServerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new(
        store: Arc<dyn ServerConfigStore>,
        factory: Arc<dyn TransportFactory>,
        settings: RegistrySettings,
    ) -> Self {
        Self {
            store,
            factory,
            settings,
            security: None,
            recoverer: Arc::new(NoopRecoverer),
            clock: system_clock(),
            entries: Mutex::new(BTreeMap::new()),
            lifecycle: Mutex::new(CancellationToken::new()),
        }
    }

    /// Passes `security` to every client so token-bearing calls are gated.
    #[must_use]
    pub fn with_security(mut self, security: Arc<SecurityManager>) -> Self {
        self.security = Some(security);
        self
    }

    /// Installs the recovery hook handed to every client.
    #[must_use]
    pub fn with_recoverer(mut self, recoverer: Arc<dyn Recoverer>) -> Self {
        self.recoverer = recoverer;
        self
    }

    /// Reads timestamps from `clock`.
    #[must_use]
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// Loads the configuration, writing the default file when none exists.
    ///
    /// Known servers keep their status and client; their configuration is
    /// replaced.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Store`] when the store fails and
    /// [`RegistryError::Domain`] when an entry is invalid.
    pub async fn load_config(&self) -> RegistryResult<usize> {
        let file = if let Some(stored) = self.store.load().await? {
            stored
        } else {
            let defaults = RegistryConfigFile::default_config();
            self.store.save(&defaults).await?;
            tracing::info!("no registry configuration found, wrote defaults");
            defaults
        };
        let configs = file.to_configs()?;
        let count = configs.len();
        let now = self.now();
        let mut entries = self.lock_entries();
        for config in configs {
            if let Some(entry) = entries.get_mut(config.name()) {
                entry.config = config;
            } else {
                entries.insert(
                    config.name().clone(),
                    ServerEntry::new(config, ServerStatus::new(now)),
                );
            }
        }
        Ok(count)
    }

    /// Persists every registered configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Store`] when the store fails.
    pub async fn save_config(&self) -> RegistryResult<()> {
        let file = {
            let entries = self.lock_entries();
            RegistryConfigFile::from_configs(entries.values().map(|entry| &entry.config))
        };
        self.store.save(&file).await?;
        Ok(())
    }

    /// Adds a server and persists the configuration, optionally connecting
    /// straight away. A failed connect is recorded on the returned status.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateServer`] without changing anything
    /// when the name is taken, or [`RegistryError::Store`] when persisting
    /// fails, in which case the registration is rolled back.
    pub async fn register_server(
        self: &Arc<Self>,
        config: ServerConfig,
        connect: bool,
    ) -> RegistryResult<ServerStatus> {
        let name = config.name().clone();
        {
            let mut entries = self.lock_entries();
            if entries.contains_key(&name) {
                return Err(RegistryError::DuplicateServer(name));
            }
            entries.insert(
                name.clone(),
                ServerEntry::new(config, ServerStatus::new(self.now())),
            );
        }
        if let Err(err) = self.save_config().await {
            self.lock_entries().remove(&name);
            return Err(err);
        }
        tracing::info!(server = %name, "registered MCP server");

        if connect && let Err(err) = self.connect_server(&name).await {
            tracing::warn!(server = %name, error = %err, "connect after registration failed");
        }
        self.server_status(name.as_str())
            .ok_or_else(|| RegistryError::UnknownServer(name.to_string()))
    }

    /// Disconnects and removes a server, then persists the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownServer`] when no such server exists
    /// or [`RegistryError::Store`] when persisting fails.
    pub async fn unregister_server(&self, server: &str) -> RegistryResult<()> {
        let name = self.resolve(server)?;
        let detached = self
            .lock_entries()
            .remove(&name)
            .map(|mut entry| entry.detach());
        if let Some((client, monitor)) = detached {
            release(&name, client, monitor).await;
        }
        self.save_config().await?;
        tracing::info!(server = %name, "unregistered MCP server");
        Ok(())
    }

    /// Loads the configuration and connects every enabled server
    /// concurrently. Individual failures are recorded on the server status
    /// and do not affect the others. Returns how many servers connected.
    ///
    /// # Errors
    ///
    /// Returns the error of [`ServerRegistry::load_config`].
    pub async fn start(self: &Arc<Self>) -> RegistryResult<usize> {
        {
            let mut lifecycle = self.lock_lifecycle();
            if lifecycle.is_cancelled() {
                *lifecycle = CancellationToken::new();
            }
        }
        self.load_config().await?;
        let enabled: Vec<ServerName> = self
            .lock_entries()
            .values()
            .filter(|entry| entry.config.enabled())
            .map(|entry| entry.config.name().clone())
            .collect();
        let outcomes = join_all(enabled.iter().map(|name| self.connect_server(name))).await;
        let connected = outcomes.iter().filter(|outcome| outcome.is_ok()).count();
        tracing::info!(
            enabled = enabled.len(),
            connected,
            "server registry started"
        );
        Ok(connected)
    }

    /// Cancels every health monitor and disconnects every client.
    pub async fn stop(&self) {
        self.lock_lifecycle().cancel();
        let names = self.server_names();
        join_all(names.iter().map(|name| self.disconnect_server(name))).await;
        tracing::info!(servers = names.len(), "server registry stopped");
    }

    /// Connects a registered server with a fresh client, caches its
    /// capabilities and, with `auto_reconnect`, starts its health monitor.
    /// Connecting a connected server is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownServer`] for unknown servers or
    /// [`RegistryError::Client`] when the connect fails; the failure is
    /// also recorded on the status. Returns
    /// [`RegistryError::ConnectSuperseded`] when the server is disconnected
    /// before the connect completes; the new client is then closed.
    pub async fn connect_server(self: &Arc<Self>, name: &ServerName) -> RegistryResult<()> {
        self.connect_guarded(name, None).await
    }

    /// Stops the health monitor and disconnects the client of a server.
    ///
    /// A connect still in flight for this server will not attach its client.
    pub async fn disconnect_server(&self, name: &ServerName) {
        let detached = self.lock_entries().get_mut(name).map(ServerEntry::detach);
        if let Some((client, monitor)) = detached {
            release(name, client, monitor).await;
        }
    }

    /// Re-runs capability introspection against the live server. Returns the
    /// number of tools and resources now cached.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownServer`] or
    /// [`RegistryError::NotConnected`], or the client error of the listing
    /// calls.
    pub async fn refresh_capabilities(&self, server: &str) -> RegistryResult<(usize, usize)> {
        let name = self.resolve(server)?;
        let client = self.connected_client(&name)?;
        let tools = client.list_tools().await?;
        let resources = client.list_resources().await?;
        let counts = (tools.len(), resources.len());
        if let Some(entry) = self.lock_entries().get_mut(&name) {
            entry.status.cache_capabilities(tools, resources);
        }
        Ok(counts)
    }

    /// Calls a tool on behalf of `agent`.
    ///
    /// The server must be registered, admit the agent and be connected
    /// before anything is sent. Request counters are updated whatever the
    /// outcome of the call.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownServer`],
    /// [`RegistryError::AgentNotAllowed`], [`RegistryError::NotConnected`],
    /// or [`RegistryError::Client`] with the failure of the call.
    pub async fn call_tool(
        &self,
        server: &str,
        tool: &str,
        arguments: Value,
        agent: &str,
    ) -> RegistryResult<CallToolResult> {
        self.call_tool_with_token(server, tool, arguments, agent, None)
            .await
    }

    /// Like [`ServerRegistry::call_tool`], presenting `token` to the
    /// client's security gate.
    ///
    /// # Errors
    ///
    /// As [`ServerRegistry::call_tool`]; security rejections surface as
    /// [`RegistryError::Client`].
    pub async fn call_tool_with_token(
        &self,
        server: &str,
        tool: &str,
        arguments: Value,
        agent: &str,
        token: Option<&str>,
    ) -> RegistryResult<CallToolResult> {
        let (name, client) = self.route(server, agent)?;
        let started = Instant::now();
        let outcome = client.call_tool(tool, arguments, token).await;
        self.record_request(&name, started.elapsed(), outcome.as_ref().err());
        Ok(outcome?)
    }

    /// Reads a resource on behalf of `agent`, with the same checks and
    /// accounting as [`ServerRegistry::call_tool`].
    ///
    /// # Errors
    ///
    /// As [`ServerRegistry::call_tool`].
    pub async fn read_resource(
        &self,
        server: &str,
        uri: &str,
        agent: &str,
    ) -> RegistryResult<ReadResourceResult> {
        let (name, client) = self.route(server, agent)?;
        let started = Instant::now();
        let outcome = client.read_resource(uri).await;
        self.record_request(&name, started.elapsed(), outcome.as_ref().err());
        Ok(outcome?)
    }

    /// Returns the cached tools of connected servers, optionally restricted
    /// to one server. Never contacts a server.
    #[must_use]
    pub fn list_tools(&self, server_filter: Option<&str>) -> Vec<ServerTool> {
        self.connected_entries(server_filter)
            .into_iter()
            .flat_map(|(server, status)| {
                status.tools().to_vec().into_iter().map(move |tool| ServerTool {
                    server: server.clone(),
                    tool,
                })
            })
            .collect()
    }

    /// Returns the cached resources of connected servers, optionally
    /// restricted to one server. Never contacts a server.
    #[must_use]
    pub fn list_resources(&self, server_filter: Option<&str>) -> Vec<ServerResource> {
        self.connected_entries(server_filter)
            .into_iter()
            .flat_map(|(server, status)| {
                status
                    .resources()
                    .to_vec()
                    .into_iter()
                    .map(move |resource| ServerResource {
                        server: server.clone(),
                        resource,
                    })
            })
            .collect()
    }

    /// Returns a copy of a server's status.
    #[must_use]
    pub fn server_status(&self, server: &str) -> Option<ServerStatus> {
        let name = ServerName::new(server).ok()?;
        self.lock_entries()
            .get(&name)
            .map(|entry| entry.status.clone())
    }

    /// Returns a copy of every server's status.
    #[must_use]
    pub fn statuses(&self) -> BTreeMap<ServerName, ServerStatus> {
        self.lock_entries()
            .iter()
            .map(|(name, entry)| (name.clone(), entry.status.clone()))
            .collect()
    }

    /// Returns a server's configuration.
    #[must_use]
    pub fn server_config(&self, server: &str) -> Option<ServerConfig> {
        let name = ServerName::new(server).ok()?;
        self.lock_entries()
            .get(&name)
            .map(|entry| entry.config.clone())
    }

    /// Returns the registered server names in order.
    #[must_use]
    pub fn server_names(&self) -> Vec<ServerName> {
        self.lock_entries().keys().cloned().collect()
    }

    /// Connects `name`, giving up when `monitor` is cancelled before the
    /// attempt starts or the server is disconnected before it finishes.
    async fn connect_guarded(
        self: &Arc<Self>,
        name: &ServerName,
        monitor: Option<&CancellationToken>,
    ) -> RegistryResult<()> {
        let (config, generation) = {
            let mut entries = self.lock_entries();
            let entry = entries
                .get_mut(name)
                .ok_or_else(|| RegistryError::UnknownServer(name.to_string()))?;
            if monitor.is_some_and(CancellationToken::is_cancelled) {
                return Err(RegistryError::ConnectSuperseded(name.clone()));
            }
            if entry.client.as_ref().is_some_and(|client| client.is_connected()) {
                return Ok(());
            }
            entry.status.record_attempt();
            (entry.config.clone(), entry.generation)
        };

        let client = Arc::new(self.build_client(&config));
        if let Err(err) = client.connect().await {
            tracing::warn!(server = %name, error = %err, "failed to connect MCP server");
            if let Some(entry) = self.lock_entries().get_mut(name) {
                entry.status.record_error(self.now(), err.to_string());
            }
            return Err(err.into());
        }
        let (tools, resources) = introspect(&client).await;

        let outcome = {
            let mut entries = self.lock_entries();
            match entries.get_mut(name) {
                None => Attach::Missing,
                Some(entry) if entry.generation != generation => Attach::Superseded,
                Some(entry)
                    if entry
                        .client
                        .as_ref()
                        .is_some_and(|current| current.is_connected()) =>
                {
                    Attach::AlreadyConnected
                }
                Some(entry) => {
                    let replaced = entry.client.replace(Arc::clone(&client));
                    entry.status.mark_connected(self.now());
                    entry.status.cache_capabilities(tools, resources);
                    if config.auto_reconnect() && entry.monitor.is_none() {
                        entry.monitor = self.spawn_monitor(name, config.health_check_interval());
                    }
                    Attach::Attached(replaced)
                }
            }
        };
        match outcome {
            Attach::Attached(replaced) => {
                if let Some(stale) = replaced {
                    stale.disconnect().await;
                }
                tracing::info!(server = %name, "connected MCP server");
                Ok(())
            }
            Attach::AlreadyConnected => {
                tracing::debug!(server = %name, "server connected concurrently, dropping extra client");
                client.disconnect().await;
                Ok(())
            }
            Attach::Superseded => {
                tracing::info!(server = %name, "server disconnected during connect, dropping client");
                client.disconnect().await;
                Err(RegistryError::ConnectSuperseded(name.clone()))
            }
            Attach::Missing => {
                client.disconnect().await;
                Err(RegistryError::UnknownServer(name.to_string()))
            }
        }
    }

    fn build_client(&self, config: &ServerConfig) -> McpClient {
        let options = McpClientOptions {
            request_timeout: config.timeout(),
            shutdown_timeout: self.settings.shutdown_timeout,
            breaker: self.settings.breaker,
            client_info: self.settings.client_info.clone(),
        };
        let client = McpClient::new(
            config.name().as_str(),
            config.transport().clone(),
            Arc::clone(&self.factory),
            options,
        )
        .with_recoverer(Arc::clone(&self.recoverer));
        match &self.security {
            Some(security) => client.with_security(Arc::clone(security)),
            None => client,
        }
    }

    fn spawn_monitor(self: &Arc<Self>, name: &ServerName, interval: Duration) -> Option<Monitor> {
        let parent = self.lock_lifecycle().clone();
        if parent.is_cancelled() {
            return None;
        }
        let cancel = parent.child_token();
        let handle = tokio::spawn(monitor_health(
            Arc::downgrade(self),
            name.clone(),
            interval,
            cancel.clone(),
        ));
        Some(Monitor { cancel, handle })
    }

    async fn run_health_check(self: &Arc<Self>, name: &ServerName, cancel: &CancellationToken) {
        let Some((client, auto_reconnect)) = self.lock_entries().get(name).map(|entry| {
            (entry.client.clone(), entry.config.auto_reconnect())
        }) else {
            return;
        };
        let healthy = match &client {
            Some(connected) => connected.health_check().await,
            None => false,
        };
        let snapshot = if healthy {
            ServerHealthSnapshot::healthy(self.now())
        } else if client.is_some() {
            ServerHealthSnapshot::unhealthy(self.now(), "health check failed")
        } else {
            ServerHealthSnapshot::unhealthy(self.now(), "not connected")
        };
        if let Some(entry) = self.lock_entries().get_mut(name) {
            entry.status.record_health(snapshot);
        }
        if healthy {
            tracing::debug!(server = %name, "health check passed");
            return;
        }
        tracing::warn!(server = %name, "health check failed");
        if auto_reconnect {
            self.reconnect(name, cancel).await;
        }
    }

    async fn reconnect(self: &Arc<Self>, name: &ServerName, cancel: &CancellationToken) {
        let stale = {
            let mut entries = self.lock_entries();
            let Some(entry) = entries.get_mut(name) else {
                return;
            };
            if cancel.is_cancelled() {
                return;
            }
            entry.status.mark_disconnected();
            entry.status.record_reconnect();
            entry.client.take()
        };
        if let Some(client) = stale {
            client.disconnect().await;
        }
        tracing::info!(server = %name, "reconnecting MCP server");
        match self.connect_guarded(name, Some(cancel)).await {
            Ok(())
            | Err(RegistryError::ConnectSuperseded(_) | RegistryError::UnknownServer(_)) => {}
            Err(err) => {
                tracing::warn!(server = %name, error = %err, "reconnect failed, will retry");
            }
        }
    }

    fn route(&self, server: &str, agent: &str) -> RegistryResult<(ServerName, Arc<McpClient>)> {
        let name = self.resolve(server)?;
        let entries = self.lock_entries();
        let entry = entries
            .get(&name)
            .ok_or_else(|| RegistryError::UnknownServer(server.to_owned()))?;
        if !entry.config.admits(agent) {
            tracing::warn!(server = %name, agent, "agent not on server allow-list");
            return Err(RegistryError::AgentNotAllowed {
                server: name,
                agent: agent.to_owned(),
            });
        }
        let client = entry
            .client
            .as_ref()
            .filter(|client| client.is_connected())
            .cloned()
            .ok_or_else(|| RegistryError::NotConnected(name.clone()))?;
        Ok((name, client))
    }

    fn connected_client(&self, name: &ServerName) -> RegistryResult<Arc<McpClient>> {
        self.lock_entries()
            .get(name)
            .and_then(|entry| entry.client.clone())
            .filter(|client| client.is_connected())
            .ok_or_else(|| RegistryError::NotConnected(name.clone()))
    }

    fn connected_entries(&self, server_filter: Option<&str>) -> Vec<(ServerName, ServerStatus)> {
        let wanted = server_filter.map(ServerName::new);
        self.lock_entries()
            .iter()
            .filter(|(name, entry)| {
                entry.status.connected()
                    && wanted
                        .as_ref()
                        .is_none_or(|filter| filter.as_ref().is_ok_and(|only| only == *name))
            })
            .map(|(name, entry)| (name.clone(), entry.status.clone()))
            .collect()
    }

    fn record_request(
        &self,
        name: &ServerName,
        latency: Duration,
        failure: Option<&McpClientError>,
    ) {
        if let Some(entry) = self.lock_entries().get_mut(name) {
            entry.status.record_request(latency, failure.is_none());
            if let Some(err) = failure {
                entry.status.record_error(self.now(), err.to_string());
            }
        }
    }

    fn resolve(&self, server: &str) -> RegistryResult<ServerName> {
        ServerName::new(server)
            .ok()
            .filter(|name| self.lock_entries().contains_key(name))
            .ok_or_else(|| RegistryError::UnknownServer(server.to_owned()))
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.utc()
    }

    fn lock_entries(&self) -> MutexGuard<'_, BTreeMap<ServerName, ServerEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_lifecycle(&self) -> MutexGuard<'_, CancellationToken> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn release(name: &ServerName, client: Option<Arc<McpClient>>, monitor: Option<Monitor>) {
    if let Some(running) = monitor
        && let Err(err) = running.handle.await
    {
        tracing::warn!(server = %name, error = %err, "health monitor failed");
    }
    if let Some(connected) = client {
        connected.disconnect().await;
    }
}

async fn introspect(client: &McpClient) -> (Vec<ToolDescriptor>, Vec<ResourceDescriptor>) {
    let tools = client.list_tools().await.unwrap_or_else(|err| {
        tracing::warn!(server = client.server(), error = %err, "tool introspection failed");
        Vec::new()
    });
    let resources = client.list_resources().await.unwrap_or_else(|err| {
        tracing::debug!(server = client.server(), error = %err, "resource introspection failed");
        Vec::new()
    });
    (tools, resources)
}

async fn monitor_health(
    registry: Weak<ServerRegistry>,
    name: ServerName,
    interval: Duration,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(interval) => {}
        }
        let Some(live) = registry.upgrade() else {
            break;
        };
        live.run_health_check(&name, &cancel).await;
    }
    tracing::debug!(server = %name, "health monitor stopped");
}
