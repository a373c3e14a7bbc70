//! Transport port: the byte-level channel a client speaks JSON-RPC over.

use crate::client::domain::{McpClientResult, TransportConfig};
use crate::protocol::{JsonRpcRequest, JsonRpcResponse};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Open connection to one MCP server.
///
/// Implementations correlate responses to requests by id and must resolve
/// every outstanding request with a connection error when closed.
#[async_trait]
pub trait McpTransport: Send + Sync {
    /// Sends `request` and waits up to `timeout` for its response.
    async fn request(
        &self,
        request: JsonRpcRequest,
        timeout: Duration,
    ) -> McpClientResult<JsonRpcResponse>;

    /// Sends a notification; no response is expected.
    async fn notify(&self, notification: JsonRpcRequest) -> McpClientResult<()>;

    /// Tears the transport down and fails outstanding requests.
    async fn close(&self);

    /// Returns whether the transport can still carry requests.
    fn is_open(&self) -> bool;
}

/// Opens transports from configuration.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    /// Establishes a transport to `server`.
    async fn open(
        &self,
        server: &str,
        config: &TransportConfig,
    ) -> McpClientResult<Arc<dyn McpTransport>>;
}
