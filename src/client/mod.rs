//! MCP client: transports, request correlation and the per-server client.
//!
//! An [`McpClient`] owns one transport to one server. Transports are opened
//! through the [`TransportFactory`] port so tests and embedders can swap the
//! child-process and HTTP adapters for the in-memory one.

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;

pub use adapters::{
    DefaultTransportFactory, HttpTransport, InMemoryMcpServer, InMemoryTransport,
    InMemoryTransportFactory, STDIO_SHUTDOWN_GRACE, StdioTransport,
};
pub use domain::{
    ErrorKind, HttpTransportConfig, McpClientError, McpClientResult, StdioTransportConfig,
    TransportConfig, TransportConfigError,
};
pub use ports::{McpTransport, NoopRecoverer, Recoverer, TransportFactory};
pub use services::{McpClient, McpClientOptions};
