//! Transport factory for real servers.

use super::{HttpTransport, StdioTransport};
use crate::client::domain::{McpClientResult, TransportConfig};
use crate::client::ports::{McpTransport, TransportFactory};
use async_trait::async_trait;
use std::sync::Arc;

/// Spawns child processes for STDIO configurations and connects over HTTP
/// otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultTransportFactory;

#[async_trait]
impl TransportFactory for DefaultTransportFactory {
    async fn open(
        &self,
        server: &str,
        config: &TransportConfig,
    ) -> McpClientResult<Arc<dyn McpTransport>> {
        match config {
            TransportConfig::Stdio(stdio) => Ok(Arc::new(StdioTransport::spawn(server, stdio)?)),
            TransportConfig::Http(http) => Ok(Arc::new(HttpTransport::connect(server, http).await?)),
        }
    }
}
