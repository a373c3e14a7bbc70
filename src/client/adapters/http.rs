//! HTTP transport: one POST per JSON-RPC exchange.

use crate::client::domain::{HttpTransportConfig, McpClientError, McpClientResult};
use crate::client::ports::McpTransport;
use crate::protocol::{JsonRpcRequest, JsonRpcResponse};
use async_trait::async_trait;
use reqwest::StatusCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Deadline for the liveness probe performed on connect.
const HEALTH_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Transport to a server exposing `POST {base}/rpc` and `GET {base}/health`.
///
/// There is no persistent reader: each request is a self-contained round
/// trip, so correlation reduces to checking the response id. Closing the
/// transport fails requests still in flight.
pub struct HttpTransport {
    server: String,
    config: HttpTransportConfig,
    client: reqwest::Client,
    open: AtomicBool,
    closed: CancellationToken,
}

impl HttpTransport {
    /// Builds the HTTP client and probes `GET {base}/health`.
    ///
    /// # Errors
    ///
    /// Returns [`McpClientError::Connection`] when the client cannot be built
    /// or the liveness probe fails.
    pub async fn connect(server: &str, config: &HttpTransportConfig) -> McpClientResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(HEALTH_PROBE_TIMEOUT)
            .build()
            .map_err(|err| {
                McpClientError::connection(server, format!("failed to build HTTP client: {err}"))
            })?;
        let transport = Self {
            server: server.to_owned(),
            config: config.clone(),
            client,
            open: AtomicBool::new(true),
            closed: CancellationToken::new(),
        };
        transport.probe().await?;
        tracing::info!(server, base_url = config.base_url(), "connected to HTTP server");
        Ok(transport)
    }

    /// Performs the liveness probe.
    ///
    /// # Errors
    ///
    /// Returns [`McpClientError::Connection`] when the endpoint is
    /// unreachable or answers with a non-success status.
    pub async fn probe(&self) -> McpClientResult<()> {
        let response = self
            .client
            .get(self.config.health_url())
            .timeout(HEALTH_PROBE_TIMEOUT)
            .send()
            .await
            .map_err(|err| {
                McpClientError::connection(&self.server, format!("health probe failed: {err}"))
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(McpClientError::connection(
                &self.server,
                format!("health probe returned {status}"),
            ));
        }
        Ok(())
    }

    async fn post(
        &self,
        message: &JsonRpcRequest,
        timeout: Duration,
    ) -> McpClientResult<reqwest::Response> {
        if !self.is_open() {
            return Err(McpClientError::connection(&self.server, "transport closed"));
        }
        let response = self
            .client
            .post(self.config.rpc_url())
            .timeout(timeout)
            .json(message)
            .send()
            .await
            .map_err(|err| self.classify_send_error(&err, message, timeout))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        Err(self.classify_status(status))
    }

    fn classify_send_error(
        &self,
        err: &reqwest::Error,
        message: &JsonRpcRequest,
        timeout: Duration,
    ) -> McpClientError {
        if err.is_timeout() {
            return McpClientError::Timeout {
                server: self.server.clone(),
                method: message.method().as_str().to_owned(),
                timeout,
            };
        }
        McpClientError::connection(&self.server, format!("HTTP request failed: {err}"))
    }

    fn classify_status(&self, status: StatusCode) -> McpClientError {
        if status.is_server_error() {
            return McpClientError::connection(&self.server, format!("server error {status}"));
        }
        McpClientError::protocol(&self.server, format!("request rejected with {status}"))
    }

    async fn exchange(
        &self,
        request: &JsonRpcRequest,
        timeout: Duration,
    ) -> McpClientResult<JsonRpcResponse> {
        let Some(expected_id) = request.id() else {
            return Err(McpClientError::protocol(
                &self.server,
                "requests must carry an id",
            ));
        };
        let response = self.post(request, timeout).await?;
        let body = response.text().await.map_err(|err| {
            McpClientError::connection(&self.server, format!("failed to read response body: {err}"))
        })?;
        let decoded = JsonRpcResponse::parse(&body)
            .map_err(|violation| McpClientError::protocol(&self.server, violation))?;

        match decoded.id() {
            Some(id) if id == expected_id => Ok(decoded),
            None if decoded.error().is_some() => Ok(decoded),
            other => Err(McpClientError::protocol(
                &self.server,
                format!("response id {other:?} does not match request id {expected_id}"),
            )),
        }
    }
}

#[async_trait]
impl McpTransport for HttpTransport {
    async fn request(
        &self,
        request: JsonRpcRequest,
        timeout: Duration,
    ) -> McpClientResult<JsonRpcResponse> {
        tokio::select! {
            outcome = self.exchange(&request, timeout) => outcome,
            () = self.closed.cancelled() => {
                Err(McpClientError::connection(&self.server, "transport closed"))
            }
        }
    }

    async fn notify(&self, notification: JsonRpcRequest) -> McpClientResult<()> {
        self.post(&notification, HEALTH_PROBE_TIMEOUT).await?;
        Ok(())
    }

    async fn close(&self) {
        self.closed.cancel();
        if self.open.swap(false, Ordering::SeqCst) {
            tracing::info!(server = %self.server, "closed HTTP transport");
        }
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}
