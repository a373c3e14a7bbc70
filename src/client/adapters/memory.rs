//! In-process MCP server and transport for tests and embedding.

use crate::client::domain::{McpClientError, McpClientResult, TransportConfig};
use crate::client::ports::{McpTransport, TransportFactory};
use crate::protocol::{
    CallToolParams, CallToolResult, ImplementationInfo, JsonRpcError, JsonRpcRequest,
    JsonRpcResponse, ListResourcesResult, ListToolsResult, MCP_PROTOCOL_VERSION, McpMethod,
    ReadResourceParams, ReadResourceResult, ResourceContents, ResourceDescriptor, ServerInfo,
    ToolDescriptor, WireFormat,
};
use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
enum ToolBehavior {
    Respond(CallToolResult),
    Fail(JsonRpcError),
    Hang,
}

#[derive(Debug)]
struct ServerState {
    name: String,
    tools: BTreeMap<String, (ToolDescriptor, ToolBehavior)>,
    resources: BTreeMap<String, (ResourceDescriptor, String)>,
    reachable: bool,
    latency: Duration,
    requests: Vec<McpMethod>,
    tool_calls: Vec<(String, Value)>,
    connections: u32,
}

/// Scripted MCP server living in the current process.
///
/// Cloning yields another handle to the same server, so tests can keep one
/// handle to reconfigure the server while the registry talks to it.
#[derive(Debug, Clone)]
pub struct InMemoryMcpServer {
    state: Arc<Mutex<ServerState>>,
}

impl InMemoryMcpServer {
    /// Creates a reachable server with no tools or resources.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            state: Arc::new(Mutex::new(ServerState {
                name: name.into(),
                tools: BTreeMap::new(),
                resources: BTreeMap::new(),
                reachable: true,
                latency: Duration::ZERO,
                requests: Vec::new(),
                tool_calls: Vec::new(),
                connections: 0,
            })),
        }
    }

    /// Adds a tool answering every call with `result`.
    #[must_use]
    pub fn with_tool(self, tool: ToolDescriptor, result: CallToolResult) -> Self {
        self.insert_tool(tool, ToolBehavior::Respond(result));
        self
    }

    /// Adds a tool answering every call with a JSON-RPC error.
    #[must_use]
    pub fn with_failing_tool(self, tool: ToolDescriptor, error: JsonRpcError) -> Self {
        self.insert_tool(tool, ToolBehavior::Fail(error));
        self
    }

    /// Adds a tool that never answers.
    #[must_use]
    pub fn with_hanging_tool(self, tool: ToolDescriptor) -> Self {
        self.insert_tool(tool, ToolBehavior::Hang);
        self
    }

    /// Adds a text resource.
    #[must_use]
    pub fn with_resource(self, resource: ResourceDescriptor, text: impl Into<String>) -> Self {
        let uri = resource.uri.clone();
        self.lock().resources.insert(uri, (resource, text.into()));
        self
    }

    /// Simulates the server going away or coming back. While unreachable,
    /// connects fail and requests on open transports fail with a connection
    /// error.
    pub fn set_reachable(&self, reachable: bool) {
        self.lock().reachable = reachable;
    }

    /// Delays every response by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.lock().latency = latency;
    }

    /// Returns whether the server is reachable.
    #[must_use]
    pub fn is_reachable(&self) -> bool {
        self.lock().reachable
    }

    /// Returns the methods received, in arrival order.
    #[must_use]
    pub fn requests(&self) -> Vec<McpMethod> {
        self.lock().requests.clone()
    }

    /// Returns the tool calls received, in arrival order.
    #[must_use]
    pub fn tool_calls(&self) -> Vec<(String, Value)> {
        self.lock().tool_calls.clone()
    }

    /// Returns how many transports have been opened to this server.
    #[must_use]
    pub fn connection_count(&self) -> u32 {
        self.lock().connections
    }

    fn insert_tool(&self, tool: ToolDescriptor, behavior: ToolBehavior) {
        let name = tool.name.clone();
        self.lock().tools.insert(name, (tool, behavior));
    }

    fn lock(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record_connection(&self) {
        let mut state = self.lock();
        state.connections = state.connections.saturating_add(1);
    }

    /// Computes the reply to `request`. `None` means the server stays silent,
    /// either because the message is a notification or the tool hangs.
    fn handle(&self, request: &JsonRpcRequest) -> Option<JsonRpcResponse> {
        let mut state = self.lock();
        state.requests.push(request.method());
        let id = request.id()?.clone();
        let outcome = match request.method() {
            McpMethod::Initialize => encode(&ServerInfo {
                protocol_version: MCP_PROTOCOL_VERSION.to_owned(),
                capabilities: capabilities(),
                server_info: ImplementationInfo::new(state.name.clone(), env!("CARGO_PKG_VERSION")),
            }),
            McpMethod::ToolsList => encode(&ListToolsResult {
                tools: state.tools.values().map(|(tool, _)| tool.clone()).collect(),
            }),
            McpMethod::ToolsCall => call_tool(&mut state, request)?,
            McpMethod::ResourcesList => encode(&ListResourcesResult {
                resources: state
                    .resources
                    .values()
                    .map(|(resource, _)| resource.clone())
                    .collect(),
            }),
            McpMethod::ResourcesRead => read_resource(&state, request),
            McpMethod::Ping | McpMethod::Shutdown => Ok(json!({})),
            McpMethod::Initialized => return None,
        };
        Some(match outcome {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(error) => JsonRpcResponse::failure(Some(id), error),
        })
    }
}

/// Runs a tool call. The outer `None` marks a hanging tool.
fn call_tool(
    state: &mut ServerState,
    request: &JsonRpcRequest,
) -> Option<Result<Value, JsonRpcError>> {
    let call = match decode_params::<CallToolParams>(request) {
        Ok(call) => call,
        Err(error) => return Some(Err(error)),
    };
    state
        .tool_calls
        .push((call.name.clone(), call.arguments.clone()));
    match state.tools.get(&call.name) {
        None => Some(Err(JsonRpcError::tool_not_found(&call.name))),
        Some((_, ToolBehavior::Hang)) => None,
        Some((_, ToolBehavior::Fail(error))) => Some(Err(error.clone())),
        Some((_, ToolBehavior::Respond(result))) => Some(encode(result)),
    }
}

fn read_resource(state: &ServerState, request: &JsonRpcRequest) -> Result<Value, JsonRpcError> {
    let read = decode_params::<ReadResourceParams>(request)?;
    let (resource, text) = state
        .resources
        .get(&read.uri)
        .ok_or_else(|| JsonRpcError::resource_not_found(&read.uri))?;
    encode(&ReadResourceResult {
        contents: vec![ResourceContents {
            uri: resource.uri.clone(),
            mime_type: resource.mime_type.clone(),
            text: Some(text.clone()),
            blob: None,
        }],
    })
}

fn encode<T: WireFormat>(payload: &T) -> Result<Value, JsonRpcError> {
    payload.to_wire().map_err(|violation| {
        JsonRpcError::new(
            crate::protocol::error_codes::INTERNAL_ERROR,
            violation.to_string(),
        )
    })
}

fn capabilities() -> Map<String, Value> {
    let mut map = Map::new();
    map.insert("tools".to_owned(), json!({}));
    map.insert("resources".to_owned(), json!({}));
    map
}

fn decode_params<T: WireFormat>(request: &JsonRpcRequest) -> Result<T, JsonRpcError> {
    let params = request.params().cloned().unwrap_or(Value::Null);
    T::from_wire(params).map_err(|violation| JsonRpcError::invalid_params(violation.to_string()))
}

/// Transport connected to an [`InMemoryMcpServer`].
#[derive(Debug)]
pub struct InMemoryTransport {
    server: String,
    backend: InMemoryMcpServer,
    open: AtomicBool,
    closed: CancellationToken,
}

impl InMemoryTransport {
    /// Opens a transport to `backend`.
    ///
    /// # Errors
    ///
    /// Returns [`McpClientError::Connection`] when the backend is
    /// unreachable.
    pub fn connect(server: &str, backend: InMemoryMcpServer) -> McpClientResult<Self> {
        if !backend.is_reachable() {
            return Err(McpClientError::connection(server, "server unreachable"));
        }
        backend.record_connection();
        Ok(Self {
            server: server.to_owned(),
            backend,
            open: AtomicBool::new(true),
            closed: CancellationToken::new(),
        })
    }

    fn ensure_usable(&self) -> McpClientResult<()> {
        if !self.is_open() {
            return Err(McpClientError::connection(&self.server, "transport closed"));
        }
        if !self.backend.is_reachable() {
            return Err(McpClientError::connection(&self.server, "server unreachable"));
        }
        Ok(())
    }

    async fn exchange(&self, request: &JsonRpcRequest) -> McpClientResult<JsonRpcResponse> {
        let latency = self.backend.lock().latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        self.ensure_usable()?;
        match self.backend.handle(request) {
            Some(response) => Ok(response),
            None => std::future::pending().await,
        }
    }
}

#[async_trait]
impl McpTransport for InMemoryTransport {
    async fn request(
        &self,
        request: JsonRpcRequest,
        timeout: Duration,
    ) -> McpClientResult<JsonRpcResponse> {
        self.ensure_usable()?;
        let exchange = tokio::time::timeout(timeout, self.exchange(&request));
        tokio::select! {
            outcome = exchange => outcome.unwrap_or_else(|_| Err(McpClientError::Timeout {
                server: self.server.clone(),
                method: request.method().as_str().to_owned(),
                timeout,
            })),
            () = self.closed.cancelled() => {
                Err(McpClientError::connection(&self.server, "transport closed"))
            }
        }
    }

    async fn notify(&self, notification: JsonRpcRequest) -> McpClientResult<()> {
        self.ensure_usable()?;
        self.backend.handle(&notification);
        Ok(())
    }

    async fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
        self.closed.cancel();
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

/// Factory resolving transports to registered in-memory servers.
///
/// STDIO configurations are matched by program name and HTTP configurations
/// by base URL.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTransportFactory {
    servers: Arc<Mutex<HashMap<String, InMemoryMcpServer>>>,
    refused: Arc<Mutex<BTreeSet<String>>>,
}

impl InMemoryTransportFactory {
    /// Creates an empty factory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `server` reachable under `key`.
    pub fn add(&self, key: impl Into<String>, server: InMemoryMcpServer) {
        lock(&self.servers).insert(key.into(), server);
    }

    /// Returns the server registered under `key`.
    #[must_use]
    pub fn server(&self, key: &str) -> Option<InMemoryMcpServer> {
        lock(&self.servers).get(key).cloned()
    }

    /// Makes every open attempt for `key` fail.
    pub fn refuse(&self, key: impl Into<String>) {
        lock(&self.refused).insert(key.into());
    }

    fn key(config: &TransportConfig) -> &str {
        match config {
            TransportConfig::Stdio(stdio) => stdio.program(),
            TransportConfig::Http(http) => http.base_url(),
        }
    }
}

#[async_trait]
impl TransportFactory for InMemoryTransportFactory {
    async fn open(
        &self,
        server: &str,
        config: &TransportConfig,
    ) -> McpClientResult<Arc<dyn McpTransport>> {
        let key = Self::key(config);
        if lock(&self.refused).contains(key) {
            return Err(McpClientError::connection(server, "connection refused"));
        }
        let backend = self.server(key).ok_or_else(|| {
            McpClientError::connection(server, format!("no in-memory server registered for '{key}'"))
        })?;
        Ok(Arc::new(InMemoryTransport::connect(server, backend)?))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::RequestId;

    fn echo_server() -> InMemoryMcpServer {
        InMemoryMcpServer::new("echo")
            .with_tool(
                ToolDescriptor::new("ping", "Replies pong", json!({"type": "object"})),
                CallToolResult::text("pong"),
            )
            .with_hanging_tool(ToolDescriptor::new("hang", "Never replies", json!({})))
    }

    fn call(id: i64, tool: &str) -> JsonRpcRequest {
        JsonRpcRequest::new(
            RequestId::from(id),
            McpMethod::ToolsCall,
            Some(json!({"name": tool, "arguments": {}})),
        )
    }

    #[tokio::test]
    async fn answers_tool_calls_and_records_them() {
        let server = echo_server();
        let transport = InMemoryTransport::connect("echo", server.clone()).expect("reachable");
        let response = transport
            .request(call(1, "ping"), Duration::from_secs(1))
            .await
            .expect("call should succeed");
        let result = CallToolResult::from_wire(response.into_result().expect("success"))
            .expect("decodable result");
        assert_eq!(result, CallToolResult::text("pong"));
        assert_eq!(server.tool_calls().len(), 1);
    }

    #[tokio::test]
    async fn unknown_tool_yields_tool_not_found() {
        let transport = InMemoryTransport::connect("echo", echo_server()).expect("reachable");
        let response = transport
            .request(call(2, "missing"), Duration::from_secs(1))
            .await
            .expect("server should answer");
        assert_eq!(
            response.error().map(|error| error.code),
            Some(crate::protocol::error_codes::TOOL_NOT_FOUND)
        );
    }

    #[tokio::test]
    async fn close_fails_hanging_request() {
        let transport =
            Arc::new(InMemoryTransport::connect("echo", echo_server()).expect("reachable"));
        let caller = Arc::clone(&transport);
        let in_flight = tokio::spawn(async move {
            caller
                .request(call(3, "hang"), Duration::from_secs(30))
                .await
        });
        tokio::task::yield_now().await;
        transport.close().await;

        let outcome = in_flight.await.expect("task should join");
        assert!(matches!(outcome, Err(McpClientError::Connection { .. })));
    }

    #[tokio::test]
    async fn factory_refuses_unreachable_servers() {
        let factory = InMemoryTransportFactory::new();
        let server = echo_server();
        server.set_reachable(false);
        factory.add("echo-server", server);
        let config = TransportConfig::stdio(["echo-server"]).expect("valid argv");

        let outcome = factory.open("echo", &config).await;
        assert!(matches!(outcome, Err(McpClientError::Connection { .. })));
    }
}
