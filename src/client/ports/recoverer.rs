//! Recovery hook consulted once after a transport failure.

use crate::client::domain::McpClientError;
use async_trait::async_trait;

/// External collaborator that may repair a failing component, for example
/// by restarting a sidecar or refreshing credentials.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Recoverer: Send + Sync {
    /// Tries to heal `component_id` after `error`. Returns whether a retry
    /// is worthwhile.
    async fn attempt(&self, component_id: &str, error: &McpClientError) -> bool;
}

/// Recoverer that never heals anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRecoverer;

#[async_trait]
impl Recoverer for NoopRecoverer {
    async fn attempt(&self, _component_id: &str, _error: &McpClientError) -> bool {
        false
    }
}
