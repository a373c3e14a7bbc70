//! Error types for registry domain validation.

use crate::client::TransportConfigError;
use thiserror::Error;

/// Errors returned while constructing registry domain values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryDomainError {
    /// The server name is empty after trimming.
    #[error("MCP server name must not be empty")]
    EmptyServerName,

    /// The server name contains characters outside `[a-z0-9_-]`.
    #[error(
        "MCP server name '{0}' contains invalid characters (only lowercase alphanumeric, '_' and '-' allowed)"
    )]
    InvalidServerName(String),

    /// The server name exceeds 100 characters.
    #[error("MCP server name exceeds 100 character limit: {0}")]
    ServerNameTooLong(String),

    /// A `stdio` entry has no `command`.
    #[error("server '{0}' uses the stdio transport but has no command")]
    MissingCommand(String),

    /// An `http` entry has no `url`.
    #[error("server '{0}' uses the http transport but has no url")]
    MissingUrl(String),

    /// The transport settings are invalid.
    #[error("server '{server}' has an invalid transport: {source}")]
    Transport {
        /// Server name as written in the configuration.
        server: String,
        /// Underlying validation failure.
        #[source]
        source: TransportConfigError,
    },

    /// A duration setting is zero.
    #[error("server '{server}' must have a non-zero {field}")]
    ZeroDuration {
        /// Server name as written in the configuration.
        server: String,
        /// Offending field.
        field: &'static str,
    },

    /// The configuration file declares an unsupported format version.
    #[error("unsupported registry configuration version {0}")]
    UnsupportedVersion(u32),
}
