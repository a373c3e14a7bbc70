//! Batch tool invocation requests and outcomes.

use super::AgentApiResult;
use crate::protocol::CallToolResult;
use serde_json::Value;

/// One call in a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchToolCall {
    /// Tool to call.
    pub tool: String,
    /// Tool arguments.
    pub arguments: Value,
    /// Server to call; resolved from the catalog when absent.
    pub server: Option<String>,
}

impl BatchToolCall {
    /// Creates a call resolved against the catalog.
    #[must_use]
    pub fn new(tool: impl Into<String>, arguments: Value) -> Self {
        Self {
            tool: tool.into(),
            arguments,
            server: None,
        }
    }

    /// Pins the call to `server`.
    #[must_use]
    pub fn on_server(mut self, server: impl Into<String>) -> Self {
        self.server = Some(server.into());
        self
    }
}

/// Outcome of one call in a batch, in input order.
#[derive(Debug, Clone)]
pub struct BatchCallOutcome {
    /// Tool that was called.
    pub tool: String,
    /// Result of the call.
    pub result: AgentApiResult<CallToolResult>,
}

impl BatchCallOutcome {
    /// Returns whether the call succeeded.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}
