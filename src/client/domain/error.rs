//! Errors surfaced by MCP clients and transports.

use crate::protocol::JsonRpcError;
use crate::security::SecurityError;
use std::time::Duration;
use thiserror::Error;

/// Coarse classification of a client failure, for callers choosing a
/// remediation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The transport is unreachable or closed.
    Connection,
    /// The exchange was malformed or the server returned an RPC error.
    Protocol,
    /// No response arrived before the deadline.
    Timeout,
    /// Authentication or authorization failed.
    Permission,
    /// A rate-limit bucket was exhausted.
    RateLimit,
    /// The circuit breaker rejected the call.
    CircuitOpen,
}

/// Errors returned by [`crate::client::McpClient`] and transports.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum McpClientError {
    /// The transport could not be established or was closed.
    #[error("connection to MCP server '{server}' failed: {reason}")]
    Connection {
        /// Server name.
        server: String,
        /// Failure description.
        reason: String,
    },

    /// The exchange violated JSON-RPC or MCP expectations.
    #[error("protocol error from MCP server '{server}': {reason}")]
    Protocol {
        /// Server name.
        server: String,
        /// Failure description.
        reason: String,
    },

    /// The server answered with a JSON-RPC error object.
    #[error("MCP server '{server}' returned error: {error}")]
    Remote {
        /// Server name.
        server: String,
        /// Error object returned by the server.
        error: JsonRpcError,
    },

    /// No response arrived before the deadline.
    #[error("MCP server '{server}' did not answer '{method}' within {timeout:?}")]
    Timeout {
        /// Server name.
        server: String,
        /// Method that timed out.
        method: String,
        /// Deadline that elapsed.
        timeout: Duration,
    },

    /// The circuit breaker is open.
    #[error("circuit for MCP server '{server}' is open, retry after {retry_after:?}")]
    CircuitOpen {
        /// Server name.
        server: String,
        /// Remaining cooldown.
        retry_after: Duration,
    },

    /// The security gate rejected the call before it was sent.
    #[error(transparent)]
    Security(#[from] SecurityError),
}

impl McpClientError {
    /// Builds a connection error.
    pub fn connection(server: impl Into<String>, reason: impl ToString) -> Self {
        Self::Connection {
            server: server.into(),
            reason: reason.to_string(),
        }
    }

    /// Builds a protocol error.
    pub fn protocol(server: impl Into<String>, reason: impl ToString) -> Self {
        Self::Protocol {
            server: server.into(),
            reason: reason.to_string(),
        }
    }

    /// Returns the error classification.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Connection { .. } => ErrorKind::Connection,
            Self::Protocol { .. } | Self::Remote { .. } => ErrorKind::Protocol,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::CircuitOpen { .. } => ErrorKind::CircuitOpen,
            Self::Security(SecurityError::RateLimited { .. }) => ErrorKind::RateLimit,
            Self::Security(_) => ErrorKind::Permission,
        }
    }

    /// Returns whether the failure indicates an unhealthy transport. Only
    /// these failures count against the circuit breaker.
    #[must_use]
    pub const fn is_transport_failure(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Timeout { .. })
    }
}

/// Result type for client operations.
pub type McpClientResult<T> = Result<T, McpClientError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::PrincipalId;
    use rstest::rstest;

    #[rstest]
    #[case(McpClientError::connection("fs", "refused"), ErrorKind::Connection, true)]
    #[case(McpClientError::protocol("fs", "bad id"), ErrorKind::Protocol, false)]
    #[case(
        McpClientError::Timeout { server: "fs".to_owned(), method: "tools/call".to_owned(), timeout: Duration::from_secs(1) },
        ErrorKind::Timeout,
        true
    )]
    #[case(
        McpClientError::Security(SecurityError::RateLimited {
            principal: PrincipalId::new("a").expect("valid id"),
            rule: "tool_calls".to_owned(),
            retry_after: Duration::from_secs(1),
        }),
        ErrorKind::RateLimit,
        false
    )]
    #[case(
        McpClientError::Security(SecurityError::NotConfigured),
        ErrorKind::Permission,
        false
    )]
    fn classifies_errors(
        #[case] error: McpClientError,
        #[case] kind: ErrorKind,
        #[case] transport_failure: bool,
    ) {
        assert_eq!(error.kind(), kind);
        assert_eq!(error.is_transport_failure(), transport_failure);
    }
}
