//! Runtime status of a configured server.

use super::ServerHealthSnapshot;
use crate::protocol::{ResourceDescriptor, ToolDescriptor};
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Point-in-time view of a server as tracked by the registry.
///
/// Only the registry mutates status; callers receive copies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerStatus {
    connected: bool,
    connected_since: Option<DateTime<Utc>>,
    health: ServerHealthSnapshot,
    connection_attempts: u32,
    reconnect_count: u32,
    last_error: Option<String>,
    tools: Vec<ToolDescriptor>,
    resources: Vec<ResourceDescriptor>,
    request_count: u64,
    failure_count: u64,
    latency_total: Duration,
    latency_samples: u32,
}

impl ServerStatus {
    pub(crate) const fn new(now: DateTime<Utc>) -> Self {
        Self {
            connected: false,
            connected_since: None,
            health: ServerHealthSnapshot::unknown(now),
            connection_attempts: 0,
            reconnect_count: 0,
            last_error: None,
            tools: Vec::new(),
            resources: Vec::new(),
            request_count: 0,
            failure_count: 0,
            latency_total: Duration::ZERO,
            latency_samples: 0,
        }
    }

    /// Returns whether a live client is attached.
    #[must_use]
    pub const fn connected(&self) -> bool {
        self.connected
    }

    /// Returns when the current connection was established.
    #[must_use]
    pub const fn connected_since(&self) -> Option<DateTime<Utc>> {
        self.connected_since
    }

    /// Returns the latest health snapshot.
    #[must_use]
    pub const fn health(&self) -> &ServerHealthSnapshot {
        &self.health
    }

    /// Returns how many connects have been attempted.
    #[must_use]
    pub const fn connection_attempts(&self) -> u32 {
        self.connection_attempts
    }

    /// Returns how many reconnects the health monitor has performed.
    #[must_use]
    pub const fn reconnect_count(&self) -> u32 {
        self.reconnect_count
    }

    /// Returns the most recent connection or call error.
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Returns the tools cached at the last introspection.
    #[must_use]
    pub fn tools(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    /// Returns the resources cached at the last introspection.
    #[must_use]
    pub fn resources(&self) -> &[ResourceDescriptor] {
        &self.resources
    }

    /// Returns how many calls were routed to the server.
    #[must_use]
    pub const fn request_count(&self) -> u64 {
        self.request_count
    }

    /// Returns how many routed calls failed.
    #[must_use]
    pub const fn failure_count(&self) -> u64 {
        self.failure_count
    }

    /// Returns the mean latency of routed calls.
    #[must_use]
    pub fn average_latency(&self) -> Duration {
        self.latency_total
            .checked_div(self.latency_samples)
            .unwrap_or_default()
    }

    pub(crate) const fn record_attempt(&mut self) {
        self.connection_attempts = self.connection_attempts.saturating_add(1);
    }

    pub(crate) const fn record_reconnect(&mut self) {
        self.reconnect_count = self.reconnect_count.saturating_add(1);
    }

    pub(crate) fn mark_connected(&mut self, now: DateTime<Utc>) {
        self.connected = true;
        self.connected_since = Some(now);
        self.last_error = None;
        self.health = ServerHealthSnapshot::healthy(now);
    }

    pub(crate) const fn mark_disconnected(&mut self) {
        self.connected = false;
        self.connected_since = None;
    }

    pub(crate) fn record_error(&mut self, now: DateTime<Utc>, error: impl Into<String>) {
        let message = error.into();
        self.health = ServerHealthSnapshot::unhealthy(now, message.clone());
        self.last_error = Some(message);
    }

    pub(crate) fn record_health(&mut self, snapshot: ServerHealthSnapshot) {
        self.health = snapshot;
    }

    pub(crate) fn cache_capabilities(
        &mut self,
        tools: Vec<ToolDescriptor>,
        resources: Vec<ResourceDescriptor>,
    ) {
        self.tools = tools;
        self.resources = resources;
    }

    pub(crate) const fn record_request(&mut self, latency: Duration, succeeded: bool) {
        self.request_count = self.request_count.saturating_add(1);
        if !succeeded {
            self.failure_count = self.failure_count.saturating_add(1);
        }
        self.latency_total = self.latency_total.saturating_add(latency);
        self.latency_samples = self.latency_samples.saturating_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_request_counters_and_mean_latency() {
        let mut status = ServerStatus::new(Utc::now());
        status.record_request(Duration::from_millis(10), true);
        status.record_request(Duration::from_millis(30), false);

        assert_eq!(status.request_count(), 2);
        assert_eq!(status.failure_count(), 1);
        assert_eq!(status.average_latency(), Duration::from_millis(20));
    }

    #[test]
    fn connecting_clears_previous_error() {
        let now = Utc::now();
        let mut status = ServerStatus::new(now);
        status.record_error(now, "refused");
        assert_eq!(status.last_error(), Some("refused"));

        status.mark_connected(now);
        assert!(status.connected());
        assert_eq!(status.last_error(), None);
    }

    #[test]
    fn average_latency_is_zero_without_samples() {
        assert_eq!(
            ServerStatus::new(Utc::now()).average_latency(),
            Duration::ZERO
        );
    }
}
