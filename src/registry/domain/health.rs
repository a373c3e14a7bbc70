//! Health snapshots recorded by the registry's health monitor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of the most recent health check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerHealth {
    /// No check has run yet.
    Unknown,
    /// The server answered the probe.
    Healthy,
    /// The probe failed or the server is disconnected.
    Unhealthy,
}

impl ServerHealth {
    /// Returns the canonical string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Healthy => "healthy",
            Self::Unhealthy => "unhealthy",
        }
    }
}

impl fmt::Display for ServerHealth {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Timestamped health snapshot for a server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerHealthSnapshot {
    health: ServerHealth,
    checked_at: DateTime<Utc>,
    message: Option<String>,
}

impl ServerHealthSnapshot {
    /// Creates a snapshot.
    #[must_use]
    pub const fn new(health: ServerHealth, checked_at: DateTime<Utc>) -> Self {
        Self {
            health,
            checked_at,
            message: None,
        }
    }

    /// Creates an `unknown` snapshot.
    #[must_use]
    pub const fn unknown(checked_at: DateTime<Utc>) -> Self {
        Self::new(ServerHealth::Unknown, checked_at)
    }

    /// Creates a `healthy` snapshot.
    #[must_use]
    pub const fn healthy(checked_at: DateTime<Utc>) -> Self {
        Self::new(ServerHealth::Healthy, checked_at)
    }

    /// Creates an `unhealthy` snapshot with details.
    #[must_use]
    pub fn unhealthy(checked_at: DateTime<Utc>, message: impl Into<String>) -> Self {
        Self::new(ServerHealth::Unhealthy, checked_at).with_message(message)
    }

    /// Adds an explanatory message. Blank messages are ignored.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        let normalized = message.into().trim().to_owned();
        if !normalized.is_empty() {
            self.message = Some(normalized);
        }
        self
    }

    /// Returns the health outcome.
    #[must_use]
    pub const fn health(&self) -> ServerHealth {
        self.health
    }

    /// Returns when the check ran.
    #[must_use]
    pub const fn checked_at(&self) -> DateTime<Utc> {
        self.checked_at
    }

    /// Returns the detail message.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unhealthy_keeps_trimmed_message() {
        let snapshot = ServerHealthSnapshot::unhealthy(Utc::now(), "  probe timed out ");
        assert_eq!(snapshot.health(), ServerHealth::Unhealthy);
        assert_eq!(snapshot.message(), Some("probe timed out"));
    }

    #[test]
    fn blank_message_is_dropped() {
        let snapshot = ServerHealthSnapshot::healthy(Utc::now()).with_message("   ");
        assert_eq!(snapshot.message(), None);
    }
}
