//! Table of requests awaiting a response.

use crate::client::domain::{McpClientError, McpClientResult};
use crate::protocol::{JsonRpcResponse, RequestId};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;

type Waiter = oneshot::Sender<McpClientResult<JsonRpcResponse>>;

#[derive(Default)]
struct PendingState {
    waiters: HashMap<RequestId, Waiter>,
    closed: Option<String>,
}

/// Correlates responses with outstanding requests by id.
///
/// Entries are registered before the request is written and removed when the
/// response arrives, the wait times out, or the transport closes. A response
/// whose entry is gone is stale and gets dropped.
pub(crate) struct PendingRequests {
    server: String,
    state: Mutex<PendingState>,
}

impl PendingRequests {
    pub(crate) fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            state: Mutex::new(PendingState::default()),
        }
    }

    /// Registers `id`, failing when the table has been closed.
    pub(crate) fn register(
        &self,
        id: RequestId,
    ) -> McpClientResult<oneshot::Receiver<McpClientResult<JsonRpcResponse>>> {
        let mut state = self.lock();
        if let Some(reason) = &state.closed {
            return Err(McpClientError::connection(&self.server, reason));
        }
        let (sender, receiver) = oneshot::channel();
        state.waiters.insert(id, sender);
        Ok(receiver)
    }

    /// Delivers `response` to its waiter. Returns `false` for stale or
    /// uncorrelatable responses.
    pub(crate) fn resolve(&self, response: JsonRpcResponse) -> bool {
        let Some(id) = response.id().cloned() else {
            tracing::warn!(server = %self.server, error = ?response.error(), "response without id dropped");
            return false;
        };
        let waiter = self.lock().waiters.remove(&id);
        match waiter {
            Some(sender) => sender.send(Ok(response)).is_ok(),
            None => {
                tracing::debug!(server = %self.server, request_id = %id, "stale response dropped");
                false
            }
        }
    }

    /// Removes `id` without resolving it.
    pub(crate) fn forget(&self, id: &RequestId) {
        self.lock().waiters.remove(id);
    }

    /// Closes the table and fails every outstanding request.
    pub(crate) fn fail_all(&self, reason: &str) {
        let drained: Vec<Waiter> = {
            let mut state = self.lock();
            if state.closed.is_none() {
                state.closed = Some(reason.to_owned());
            }
            state.waiters.drain().map(|(_, sender)| sender).collect()
        };
        for sender in drained {
            if sender
                .send(Err(McpClientError::connection(&self.server, reason)))
                .is_err()
            {
                tracing::trace!(server = %self.server, "pending caller already gone");
            }
        }
    }

    /// Waits for the response registered under `id`.
    pub(crate) async fn wait(
        &self,
        id: &RequestId,
        receiver: oneshot::Receiver<McpClientResult<JsonRpcResponse>>,
        method: &str,
        timeout: Duration,
    ) -> McpClientResult<JsonRpcResponse> {
        match tokio::time::timeout(timeout, receiver).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(McpClientError::connection(
                &self.server,
                "transport dropped pending request",
            )),
            Err(_) => {
                self.forget(id);
                tracing::warn!(server = %self.server, method, request_id = %id, ?timeout, "request timed out");
                Err(McpClientError::Timeout {
                    server: self.server.clone(),
                    method: method.to_owned(),
                    timeout,
                })
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.lock().waiters.len()
    }

    fn lock(&self) -> MutexGuard<'_, PendingState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
