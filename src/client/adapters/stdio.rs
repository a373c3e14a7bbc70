//! Child-process transport speaking newline-delimited JSON-RPC.

use super::pending::PendingRequests;
use crate::client::domain::{McpClientError, McpClientResult, StdioTransportConfig};
use crate::client::ports::McpTransport;
use crate::protocol::{IncomingMessage, JsonRpcRequest, JsonRpcResponse};
use async_trait::async_trait;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, ChildStderr, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Time a child gets to exit after its stdin closes before it is killed.
pub const STDIO_SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Transport over a spawned server process.
///
/// A background reader drains stdout and resolves pending requests; a second
/// task forwards stderr lines to `tracing`. Both are cancelled and joined on
/// close.
pub struct StdioTransport {
    server: String,
    stdin: tokio::sync::Mutex<Option<ChildStdin>>,
    child: tokio::sync::Mutex<Option<Child>>,
    pending: Arc<PendingRequests>,
    open: Arc<AtomicBool>,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    grace: Duration,
}

impl StdioTransport {
    /// Spawns the configured command and starts the reader tasks.
    ///
    /// # Errors
    ///
    /// Returns [`McpClientError::Connection`] when the process cannot be
    /// spawned or its pipes are unavailable.
    pub fn spawn(server: &str, config: &StdioTransportConfig) -> McpClientResult<Self> {
        let mut command = Command::new(config.program());
        command
            .args(config.args())
            .envs(config.env())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(directory) = config.working_directory() {
            command.current_dir(directory);
        }

        let mut child = command.spawn().map_err(|err| {
            McpClientError::connection(server, format!("failed to spawn '{}': {err}", config.program()))
        })?;
        let missing_pipe = || McpClientError::connection(server, "child process pipes unavailable");
        let stdin = child.stdin.take().ok_or_else(missing_pipe)?;
        let stdout = child.stdout.take().ok_or_else(missing_pipe)?;
        let stderr = child.stderr.take().ok_or_else(missing_pipe)?;
        tracing::info!(server, program = config.program(), pid = ?child.id(), "spawned stdio server");

        let pending = Arc::new(PendingRequests::new(server));
        let open = Arc::new(AtomicBool::new(true));
        let cancel = CancellationToken::new();
        let reader = tokio::spawn(read_stdout(
            server.to_owned(),
            stdout,
            Arc::clone(&pending),
            Arc::clone(&open),
            cancel.clone(),
        ));
        let errors = tokio::spawn(forward_stderr(server.to_owned(), stderr, cancel.clone()));

        Ok(Self {
            server: server.to_owned(),
            stdin: tokio::sync::Mutex::new(Some(stdin)),
            child: tokio::sync::Mutex::new(Some(child)),
            pending,
            open,
            cancel,
            tasks: Mutex::new(vec![reader, errors]),
            grace: STDIO_SHUTDOWN_GRACE,
        })
    }

    /// Overrides the shutdown grace period.
    #[must_use]
    pub const fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    async fn write_line(&self, message: &JsonRpcRequest) -> McpClientResult<()> {
        let mut line = serde_json::to_string(message)
            .map_err(|err| McpClientError::protocol(&self.server, err))?;
        line.push('\n');

        let mut guard = self.stdin.lock().await;
        let Some(stdin) = guard.as_mut() else {
            return Err(McpClientError::connection(&self.server, "transport closed"));
        };
        let written = match stdin.write_all(line.as_bytes()).await {
            Ok(()) => stdin.flush().await,
            Err(err) => Err(err),
        };
        written.map_err(|err| {
            self.open.store(false, Ordering::SeqCst);
            McpClientError::connection(&self.server, format!("write failed: {err}"))
        })
    }
}

#[async_trait]
impl McpTransport for StdioTransport {
    async fn request(
        &self,
        request: JsonRpcRequest,
        timeout: Duration,
    ) -> McpClientResult<JsonRpcResponse> {
        let Some(id) = request.id().cloned() else {
            return Err(McpClientError::protocol(
                &self.server,
                "requests must carry an id",
            ));
        };
        if !self.is_open() {
            return Err(McpClientError::connection(&self.server, "transport closed"));
        }

        let receiver = self.pending.register(id.clone())?;
        if let Err(err) = self.write_line(&request).await {
            self.pending.forget(&id);
            return Err(err);
        }
        tracing::debug!(server = %self.server, method = %request.method(), request_id = %id, "request sent");
        self.pending
            .wait(&id, receiver, request.method().as_str(), timeout)
            .await
    }

    async fn notify(&self, notification: JsonRpcRequest) -> McpClientResult<()> {
        if !self.is_open() {
            return Err(McpClientError::connection(&self.server, "transport closed"));
        }
        self.write_line(&notification).await
    }

    async fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
        self.cancel.cancel();
        self.pending.fail_all("transport closed");
        drop(self.stdin.lock().await.take());

        let spawned = self.child.lock().await.take();
        if let Some(mut child) = spawned {
            match tokio::time::timeout(self.grace, child.wait()).await {
                Ok(Ok(status)) => {
                    tracing::info!(server = %self.server, %status, "stdio server exited");
                }
                Ok(Err(err)) => {
                    tracing::warn!(server = %self.server, error = %err, "failed to reap stdio server");
                }
                Err(_) => {
                    tracing::warn!(server = %self.server, grace = ?self.grace, "stdio server ignored shutdown, killing");
                    if let Err(err) = child.kill().await {
                        tracing::warn!(server = %self.server, error = %err, "failed to kill stdio server");
                    }
                }
            }
        }

        let tasks: Vec<JoinHandle<()>> = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for task in tasks {
            if let Err(err) = task.await {
                tracing::warn!(server = %self.server, error = %err, "stdio background task failed");
            }
        }
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

async fn read_stdout(
    server: String,
    stdout: ChildStdout,
    pending: Arc<PendingRequests>,
    open: Arc<AtomicBool>,
    cancel: CancellationToken,
) {
    let mut lines = BufReader::new(stdout).lines();
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            next = lines.next_line() => match next {
                Ok(Some(line)) => dispatch_line(&server, &pending, &line),
                Ok(None) => {
                    tracing::info!(server = %server, "stdio server closed its output");
                    break;
                }
                Err(err) => {
                    tracing::warn!(server = %server, error = %err, "failed reading stdio server output");
                    break;
                }
            },
        }
    }
    open.store(false, Ordering::SeqCst);
    pending.fail_all("server connection closed");
}

fn dispatch_line(server: &str, pending: &PendingRequests, line: &str) {
    if line.trim().is_empty() {
        return;
    }
    match IncomingMessage::parse(line) {
        Ok(IncomingMessage::Response(response)) => {
            pending.resolve(response);
        }
        Ok(IncomingMessage::Request(request)) => {
            tracing::debug!(server, method = %request.method(), "ignoring server-initiated message");
        }
        Err(violation) => {
            tracing::warn!(server, error = %violation, "discarding malformed line from server");
        }
    }
}

async fn forward_stderr(server: String, stderr: ChildStderr, cancel: CancellationToken) {
    let mut lines = BufReader::new(stderr).lines();
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            next = lines.next_line() => match next {
                Ok(Some(line)) => tracing::debug!(server = %server, line = %line, "stdio server stderr"),
                Ok(None) | Err(_) => break,
            },
        }
    }
}
