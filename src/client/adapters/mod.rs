//! Transport adapters.

mod factory;
mod http;
mod memory;
mod pending;
mod stdio;

pub use factory::DefaultTransportFactory;
pub use http::HttpTransport;
pub use memory::{InMemoryMcpServer, InMemoryTransport, InMemoryTransportFactory};
pub use stdio::{STDIO_SHUTDOWN_GRACE, StdioTransport};
