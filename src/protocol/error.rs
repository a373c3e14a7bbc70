//! Error types for JSON-RPC wire validation.

use thiserror::Error;

/// Violations of the JSON-RPC 2.0 envelope rules detected while decoding.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProtocolViolation {
    /// The payload is not valid JSON or does not match the expected shape.
    #[error("malformed JSON-RPC payload: {0}")]
    Malformed(String),

    /// The payload is valid JSON but not an object.
    #[error("JSON-RPC message must be an object")]
    NotAnObject,

    /// The `jsonrpc` member is missing or not `"2.0"`.
    #[error("unsupported JSON-RPC version: {0}")]
    UnsupportedVersion(String),

    /// A request has no string `method` member.
    #[error("JSON-RPC request is missing a string method")]
    MissingMethod,

    /// The method string is not part of the supported MCP method set.
    #[error("unknown MCP method: {0}")]
    UnknownMethod(String),

    /// A response has no `id` member.
    #[error("JSON-RPC response is missing an id")]
    MissingId,

    /// The `id` member is neither a string, an integer nor null.
    #[error("invalid JSON-RPC id: {0}")]
    InvalidId(String),

    /// A response carries both `result` and `error`.
    #[error("JSON-RPC response carries both result and error")]
    BothResultAndError,

    /// A response carries neither `result` nor `error`.
    #[error("JSON-RPC response carries neither result nor error")]
    NeitherResultNorError,

    /// The `error` member lacks a numeric code or string message.
    #[error("invalid JSON-RPC error object: {0}")]
    InvalidErrorObject(String),
}

impl From<serde_json::Error> for ProtocolViolation {
    fn from(err: serde_json::Error) -> Self {
        Self::Malformed(err.to_string())
    }
}
