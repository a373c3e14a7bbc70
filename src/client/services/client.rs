//! MCP client: one logical connection to one server.

use crate::circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitSnapshot,
};
use crate::client::domain::{McpClientError, McpClientResult, TransportConfig};
use crate::client::ports::{McpTransport, NoopRecoverer, Recoverer, TransportFactory};
use crate::protocol::{
    CallToolParams, CallToolResult, ImplementationInfo, InitializeParams, JsonRpcRequest,
    ListResourcesResult, ListToolsResult, McpMethod, ReadResourceParams, ReadResourceResult,
    RequestId, ResourceDescriptor, ServerInfo, ToolDescriptor, WireFormat,
};
use crate::security::{Action, SecurityError, SecurityLevel, SecurityManager};
use serde_json::Value;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Tunables for an [`McpClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct McpClientOptions {
    /// Deadline applied to every request.
    pub request_timeout: Duration,
    /// Deadline for the best-effort `shutdown` request on disconnect.
    pub shutdown_timeout: Duration,
    /// Breaker thresholds around tool calls.
    pub breaker: CircuitBreakerConfig,
    /// Identity announced during the handshake.
    pub client_info: ImplementationInfo,
}

impl Default for McpClientOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(1),
            breaker: CircuitBreakerConfig::for_tool_calls(),
            client_info: ImplementationInfo::new(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
        }
    }
}

impl McpClientOptions {
    /// Overrides the request deadline.
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Overrides the breaker thresholds.
    #[must_use]
    pub const fn with_breaker(mut self, breaker: CircuitBreakerConfig) -> Self {
        self.breaker = breaker;
        self
    }
}

/// Client speaking JSON-RPC 2.0 to a single MCP server.
///
/// The transport is opened by [`McpClient::connect`] and torn down by
/// [`McpClient::disconnect`]. Tool calls pass through the optional security
/// gate and the circuit breaker; read paths only use the transport.
pub struct McpClient {
    server: String,
    transport_config: TransportConfig,
    options: McpClientOptions,
    factory: Arc<dyn TransportFactory>,
    transport: Mutex<Option<Arc<dyn McpTransport>>>,
    server_info: Mutex<Option<ServerInfo>>,
    next_id: AtomicI64,
    breaker: CircuitBreaker,
    security: Option<Arc<SecurityManager>>,
    recoverer: Arc<dyn Recoverer>,
}

impl McpClient {
    /// Creates a disconnected client.
    #[must_use]
    pub fn new(
        server: impl Into<String>,
        transport_config: TransportConfig,
        factory: Arc<dyn TransportFactory>,
        options: McpClientOptions,
    ) -> Self {
        let name = server.into();
        let breaker = CircuitBreaker::new(format!("mcp:{name}"), options.breaker);
        Self {
            server: name,
            transport_config,
            options,
            factory,
            transport: Mutex::new(None),
            server_info: Mutex::new(None),
            next_id: AtomicI64::new(1),
            breaker,
            security: None,
            recoverer: Arc::new(NoopRecoverer),
        }
    }

    /// Gates token-bearing tool calls through `security`.
    #[must_use]
    pub fn with_security(mut self, security: Arc<SecurityManager>) -> Self {
        self.security = Some(security);
        self
    }

    /// Installs the recovery hook consulted after transport failures.
    #[must_use]
    pub fn with_recoverer(mut self, recoverer: Arc<dyn Recoverer>) -> Self {
        self.recoverer = recoverer;
        self
    }

    /// Returns the server name.
    #[must_use]
    pub fn server(&self) -> &str {
        &self.server
    }

    /// Returns the transport configuration.
    #[must_use]
    pub const fn transport_config(&self) -> &TransportConfig {
        &self.transport_config
    }

    /// Returns the handshake result of the current connection.
    #[must_use]
    pub fn server_info(&self) -> Option<ServerInfo> {
        lock(&self.server_info).clone()
    }

    /// Returns whether an open transport is attached.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        lock(&self.transport)
            .as_ref()
            .is_some_and(|transport| transport.is_open())
    }

    /// Returns the breaker counters.
    #[must_use]
    pub fn circuit_snapshot(&self) -> CircuitSnapshot {
        self.breaker.snapshot()
    }

    /// Opens the transport and performs the `initialize` handshake.
    ///
    /// Connecting an already connected client returns the existing server
    /// info.
    ///
    /// # Errors
    ///
    /// Returns [`McpClientError::Connection`] when the transport cannot be
    /// opened, [`McpClientError::Remote`] when the server rejects the
    /// handshake, or [`McpClientError::Protocol`] when its answer is
    /// malformed.
    pub async fn connect(&self) -> McpClientResult<ServerInfo> {
        if self.is_connected()
            && let Some(info) = self.server_info()
        {
            return Ok(info);
        }

        let transport = self
            .factory
            .open(&self.server, &self.transport_config)
            .await?;
        match self.handshake(transport.as_ref()).await {
            Ok(info) => {
                tracing::info!(
                    server = %self.server,
                    remote = %info.server_info.name,
                    protocol_version = %info.protocol_version,
                    "MCP handshake complete"
                );
                *lock(&self.transport) = Some(transport);
                *lock(&self.server_info) = Some(info.clone());
                Ok(info)
            }
            Err(err) => {
                tracing::warn!(server = %self.server, error = %err, "MCP handshake failed");
                transport.close().await;
                Err(err)
            }
        }
    }

    async fn handshake(&self, transport: &dyn McpTransport) -> McpClientResult<ServerInfo> {
        let params = InitializeParams::new(self.options.client_info.clone())
            .to_wire()
            .map_err(|violation| McpClientError::protocol(&self.server, violation))?;
        let request = JsonRpcRequest::new(self.allocate_id(), McpMethod::Initialize, Some(params));
        let response = transport
            .request(request, self.options.request_timeout)
            .await?;
        let result = response.into_result().map_err(|error| McpClientError::Remote {
            server: self.server.clone(),
            error,
        })?;
        let info = ServerInfo::from_wire(result)
            .map_err(|violation| McpClientError::protocol(&self.server, violation))?;
        transport
            .notify(JsonRpcRequest::notification(McpMethod::Initialized, None))
            .await?;
        Ok(info)
    }

    /// Sends a best-effort `shutdown` request and closes the transport.
    /// Requests still in flight fail with a connection error.
    pub async fn disconnect(&self) {
        let detached = lock(&self.transport).take();
        *lock(&self.server_info) = None;
        let Some(transport) = detached else {
            return;
        };
        if transport.is_open() {
            let request = JsonRpcRequest::new(self.allocate_id(), McpMethod::Shutdown, None);
            if let Err(err) = transport
                .request(request, self.options.shutdown_timeout)
                .await
            {
                tracing::debug!(server = %self.server, error = %err, "shutdown request failed");
            }
        }
        transport.close().await;
        tracing::info!(server = %self.server, "disconnected from MCP server");
    }

    /// Invokes a tool.
    ///
    /// With a `token`, the call must first pass authentication,
    /// authorization and rate limiting; a rejected call never reaches the
    /// server. The exchange runs through the circuit breaker, and after a
    /// transport failure the recoverer gets one chance to heal the server
    /// before a single retry.
    ///
    /// # Errors
    ///
    /// Returns [`McpClientError::Security`] when the gate rejects the call
    /// (including a token presented to a client without a security
    /// manager), [`McpClientError::CircuitOpen`] while the breaker is open,
    /// or the transport, protocol or remote error of the exchange.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Value,
        token: Option<&str>,
    ) -> McpClientResult<CallToolResult> {
        if let Some(raw_token) = token {
            let security = self.security.as_ref().ok_or(SecurityError::NotConfigured)?;
            security.check_access(
                raw_token,
                Action::CallTool,
                &format!("tool:{name}"),
                SecurityLevel::User,
            )?;
        }

        let params = CallToolParams {
            name: name.to_owned(),
            arguments,
        }
        .to_wire()
        .map_err(|violation| McpClientError::protocol(&self.server, violation))?;

        let result = match self.guarded(McpMethod::ToolsCall, params.clone()).await {
            Err(err) if err.is_transport_failure() => {
                if !self.recoverer.attempt(&self.server, &err).await {
                    return Err(err);
                }
                tracing::info!(server = %self.server, tool = name, "recoverer healed server, retrying");
                self.guarded(McpMethod::ToolsCall, params).await?
            }
            outcome => outcome?,
        };
        CallToolResult::from_wire(result)
            .map_err(|violation| McpClientError::protocol(&self.server, violation))
    }

    /// Reads a resource by URI.
    ///
    /// # Errors
    ///
    /// Returns the transport, protocol or remote error of the exchange.
    pub async fn read_resource(&self, uri: &str) -> McpClientResult<ReadResourceResult> {
        let params = ReadResourceParams {
            uri: uri.to_owned(),
        }
        .to_wire()
        .map_err(|violation| McpClientError::protocol(&self.server, violation))?;
        let result = self.rpc(McpMethod::ResourcesRead, Some(params)).await?;
        self.decode(result)
    }

    /// Lists the tools the server advertises.
    ///
    /// # Errors
    ///
    /// Returns the transport, protocol or remote error of the exchange.
    pub async fn list_tools(&self) -> McpClientResult<Vec<ToolDescriptor>> {
        let result = self.rpc(McpMethod::ToolsList, None).await?;
        self.decode::<ListToolsResult>(result)
            .map(|listing| listing.tools)
    }

    /// Lists the resources the server advertises.
    ///
    /// # Errors
    ///
    /// Returns the transport, protocol or remote error of the exchange.
    pub async fn list_resources(&self) -> McpClientResult<Vec<ResourceDescriptor>> {
        let result = self.rpc(McpMethod::ResourcesList, None).await?;
        self.decode::<ListResourcesResult>(result)
            .map(|listing| listing.resources)
    }

    /// Probes liveness by listing tools.
    pub async fn health_check(&self) -> bool {
        match self.list_tools().await {
            Ok(_) => true,
            Err(err) => {
                tracing::debug!(server = %self.server, error = %err, "health check failed");
                false
            }
        }
    }

    async fn guarded(&self, method: McpMethod, params: Value) -> McpClientResult<Value> {
        self.breaker
            .call_counting(
                || self.rpc(method, Some(params)),
                McpClientError::is_transport_failure,
            )
            .await
            .map_err(|err| match err {
                CircuitBreakerError::Open { retry_after, .. } => McpClientError::CircuitOpen {
                    server: self.server.clone(),
                    retry_after,
                },
                CircuitBreakerError::Inner(inner) => inner,
            })
    }

    async fn rpc(&self, method: McpMethod, params: Option<Value>) -> McpClientResult<Value> {
        let transport = self.current_transport()?;
        let request = JsonRpcRequest::new(self.allocate_id(), method, params);
        let response = transport
            .request(request, self.options.request_timeout)
            .await?;
        response.into_result().map_err(|error| McpClientError::Remote {
            server: self.server.clone(),
            error,
        })
    }

    fn decode<T: WireFormat>(&self, value: Value) -> McpClientResult<T> {
        T::from_wire(value).map_err(|violation| McpClientError::protocol(&self.server, violation))
    }

    fn current_transport(&self) -> McpClientResult<Arc<dyn McpTransport>> {
        lock(&self.transport)
            .as_ref()
            .filter(|transport| transport.is_open())
            .cloned()
            .ok_or_else(|| McpClientError::connection(&self.server, "not connected"))
    }

    fn allocate_id(&self) -> RequestId {
        RequestId::from(self.next_id.fetch_add(1, Ordering::Relaxed))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit_breaker::CircuitState;
    use crate::client::adapters::{InMemoryMcpServer, InMemoryTransportFactory};
    use crate::client::ports::MockRecoverer;
    use crate::protocol::JsonRpcError;
    use crate::security::{Permission, PrincipalId, PrincipalKind, SecurityConfig};
    use rstest::{fixture, rstest};
    use serde_json::json;

    const PROGRAM: &str = "echo-server";

    struct Harness {
        server: InMemoryMcpServer,
        factory: Arc<InMemoryTransportFactory>,
    }

    impl Harness {
        fn client(&self) -> McpClient {
            McpClient::new(
                "echo",
                TransportConfig::stdio([PROGRAM]).expect("valid argv"),
                Arc::clone(&self.factory) as Arc<dyn TransportFactory>,
                McpClientOptions::default().with_request_timeout(Duration::from_millis(200)),
            )
        }
    }

    #[fixture]
    fn harness() -> Harness {
        let server = InMemoryMcpServer::new("echo")
            .with_tool(
                ToolDescriptor::new("ping", "Replies pong", json!({"type": "object"})),
                CallToolResult::text("pong"),
            )
            .with_failing_tool(
                ToolDescriptor::new("explode", "Always fails", json!({})),
                JsonRpcError::invalid_params("boom"),
            )
            .with_hanging_tool(ToolDescriptor::new("hang", "Never replies", json!({})))
            .with_resource(
                ResourceDescriptor::new("mem://notes", "notes").with_mime_type("text/plain"),
                "hello",
            );
        let factory = Arc::new(InMemoryTransportFactory::new());
        factory.add(PROGRAM, server.clone());
        Harness { server, factory }
    }

    #[rstest]
    #[tokio::test]
    async fn connect_performs_handshake(harness: Harness) {
        let client = harness.client();
        let info = client.connect().await.expect("handshake should succeed");

        assert_eq!(info.server_info.name, "echo");
        assert!(client.is_connected());
        assert_eq!(
            harness.server.requests(),
            vec![McpMethod::Initialize, McpMethod::Initialized]
        );
    }

    #[rstest]
    #[tokio::test]
    async fn connect_fails_when_server_unreachable(harness: Harness) {
        harness.server.set_reachable(false);
        let client = harness.client();

        let outcome = client.connect().await;
        assert!(matches!(outcome, Err(McpClientError::Connection { .. })));
        assert!(!client.is_connected());
    }

    #[rstest]
    #[tokio::test]
    async fn lists_and_reads_through_the_transport(harness: Harness) {
        let client = harness.client();
        client.connect().await.expect("handshake should succeed");

        let tools = client.list_tools().await.expect("tools should list");
        let names: Vec<&str> = tools.iter().map(|tool| tool.name.as_str()).collect();
        assert_eq!(names, vec!["explode", "hang", "ping"]);

        let read = client
            .read_resource("mem://notes")
            .await
            .expect("resource should read");
        assert_eq!(
            read.contents.first().and_then(|entry| entry.text.as_deref()),
            Some("hello")
        );
        assert!(client.health_check().await);
    }

    #[rstest]
    #[tokio::test]
    async fn requests_fail_before_connect(harness: Harness) {
        let client = harness.client();
        let outcome = client.list_tools().await;
        assert!(matches!(outcome, Err(McpClientError::Connection { .. })));
    }

    #[rstest]
    #[tokio::test]
    async fn remote_errors_do_not_trip_the_breaker(harness: Harness) {
        let client = harness.client();
        client.connect().await.expect("handshake should succeed");

        for _ in 0..5 {
            let outcome = client.call_tool("explode", json!({}), None).await;
            assert!(matches!(outcome, Err(McpClientError::Remote { .. })));
        }
        assert_eq!(client.circuit_snapshot().state, CircuitState::Closed);
        assert_eq!(client.circuit_snapshot().failure_count, 0);
    }

    #[rstest]
    #[tokio::test]
    async fn breaker_opens_after_repeated_transport_failures(harness: Harness) {
        let client = harness.client();
        client.connect().await.expect("handshake should succeed");
        harness.server.set_reachable(false);

        for _ in 0..3 {
            let outcome = client.call_tool("ping", json!({}), None).await;
            assert!(matches!(outcome, Err(McpClientError::Connection { .. })));
        }
        let rejected = client.call_tool("ping", json!({}), None).await;

        assert!(matches!(rejected, Err(McpClientError::CircuitOpen { .. })));
        assert_eq!(client.circuit_snapshot().state, CircuitState::Open);
        assert_eq!(client.circuit_snapshot().rejected_count, 1);
    }

    #[rstest]
    #[tokio::test]
    async fn hanging_tool_times_out(harness: Harness) {
        let client = harness.client();
        client.connect().await.expect("handshake should succeed");

        let outcome = client.call_tool("hang", json!({}), None).await;
        assert!(matches!(outcome, Err(McpClientError::Timeout { .. })));
    }

    #[rstest]
    #[tokio::test]
    async fn recoverer_heals_once_and_call_is_retried(harness: Harness) {
        let backend = harness.server.clone();
        let mut recoverer = MockRecoverer::new();
        recoverer
            .expect_attempt()
            .withf(|_, error| error.is_transport_failure())
            .times(1)
            .returning(move |_, _| {
                backend.set_reachable(true);
                true
            });
        let client = harness.client().with_recoverer(Arc::new(recoverer));
        client.connect().await.expect("handshake should succeed");
        harness.server.set_reachable(false);

        let result = client
            .call_tool("ping", json!({"n": 1}), None)
            .await
            .expect("retry should succeed");
        assert_eq!(result, CallToolResult::text("pong"));
        assert_eq!(harness.server.tool_calls().len(), 1);
    }

    #[rstest]
    #[tokio::test]
    async fn unhealed_failure_propagates_original_error(harness: Harness) {
        let mut recoverer = MockRecoverer::new();
        recoverer.expect_attempt().times(1).returning(|_, _| false);
        let client = harness.client().with_recoverer(Arc::new(recoverer));
        client.connect().await.expect("handshake should succeed");
        harness.server.set_reachable(false);

        let outcome = client.call_tool("ping", json!({}), None).await;
        assert!(matches!(outcome, Err(McpClientError::Connection { .. })));
    }

    #[rstest]
    #[tokio::test]
    async fn token_without_security_manager_fails_closed(harness: Harness) {
        let client = harness.client();
        client.connect().await.expect("handshake should succeed");

        let outcome = client.call_tool("ping", json!({}), Some("token")).await;
        assert_eq!(
            outcome,
            Err(McpClientError::Security(SecurityError::NotConfigured))
        );
        assert!(harness.server.tool_calls().is_empty());
    }

    #[rstest]
    #[tokio::test]
    async fn security_gate_blocks_before_the_network(harness: Harness) {
        let security = Arc::new(SecurityManager::new(SecurityConfig::default()));
        let reader = PrincipalId::new("reader").expect("valid id");
        security
            .create_principal(
                reader.clone(),
                "Reader",
                PrincipalKind::Agent,
                SecurityLevel::User,
                [Permission::ReadTools],
            )
            .expect("principal should register");
        let issued = security
            .create_token(&reader, None, None)
            .expect("token should issue");
        let client = harness.client().with_security(Arc::clone(&security));
        client.connect().await.expect("handshake should succeed");

        let outcome = client
            .call_tool("ping", json!({}), Some(issued.token()))
            .await;
        assert!(matches!(
            outcome,
            Err(McpClientError::Security(SecurityError::PermissionDenied { .. }))
        ));
        assert!(harness.server.tool_calls().is_empty());
    }

    #[rstest]
    #[tokio::test]
    async fn authorised_token_reaches_the_server(harness: Harness) {
        let security = Arc::new(SecurityManager::new(SecurityConfig::default()));
        let caller = PrincipalId::new("caller").expect("valid id");
        security
            .create_principal(
                caller.clone(),
                "Caller",
                PrincipalKind::Agent,
                SecurityLevel::User,
                [Permission::CallTools],
            )
            .expect("principal should register");
        let issued = security
            .create_token(&caller, None, None)
            .expect("token should issue");
        let client = harness.client().with_security(security);
        client.connect().await.expect("handshake should succeed");

        let result = client
            .call_tool("ping", json!({}), Some(issued.token()))
            .await
            .expect("call should pass the gate");
        assert_eq!(result, CallToolResult::text("pong"));
    }

    #[rstest]
    #[tokio::test]
    async fn disconnect_fails_in_flight_requests(harness: Harness) {
        let client = Arc::new(harness.client());
        client.connect().await.expect("handshake should succeed");

        let caller = Arc::clone(&client);
        let in_flight =
            tokio::spawn(async move { caller.call_tool("hang", json!({}), None).await });
        tokio::task::yield_now().await;
        client.disconnect().await;

        let outcome = in_flight.await.expect("task should join");
        assert!(matches!(outcome, Err(McpClientError::Connection { .. })));
        assert!(!client.is_connected());
        assert!(harness.server.requests().contains(&McpMethod::Shutdown));
    }
}
