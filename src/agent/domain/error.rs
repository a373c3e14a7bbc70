//! Errors surfaced through the agent-facing API.

use super::SessionId;
use crate::registry::RegistryError;
use crate::security::{ArgumentViolation, SecurityError};
use thiserror::Error;

/// Errors returned by the [`crate::agent::AgentGateway`].
#[derive(Debug, Clone, Error)]
pub enum AgentApiError {
    /// The agent name is empty after trimming.
    #[error("agent name must not be empty")]
    EmptyAgentName,

    /// No connected server visible to the agent advertises the tool.
    #[error("no connected MCP server advertises tool '{0}'")]
    ToolNotFound(String),

    /// No connected server visible to the agent advertises the resource.
    #[error("no connected MCP server advertises resource '{0}'")]
    ResourceNotFound(String),

    /// The session does not exist or was closed.
    #[error("unknown agent session: {0}")]
    UnknownSession(SessionId),

    /// Tool arguments failed input hardening.
    #[error("rejected tool arguments: {0}")]
    InvalidArguments(#[from] ArgumentViolation),

    /// Authentication of the session token failed.
    #[error(transparent)]
    Security(#[from] SecurityError),

    /// The registry rejected or failed the call.
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Result type for agent-facing operations.
pub type AgentApiResult<T> = Result<T, AgentApiError>;
