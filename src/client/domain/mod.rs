//! Client domain: transport configuration and error taxonomy.

mod error;
mod transport;

pub use error::{ErrorKind, McpClientError, McpClientResult};
pub use transport::{
    HttpTransportConfig, StdioTransportConfig, TransportConfig, TransportConfigError,
};
