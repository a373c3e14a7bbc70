//! Circuit breaker configuration, states and snapshots.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Thresholds controlling when a breaker opens and probes recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive counted failures that open the circuit.
    pub failure_threshold: u32,
    /// Cooldown after the last failure before a probe call is allowed.
    pub recovery_timeout: Duration,
}

impl CircuitBreakerConfig {
    /// Creates a configuration. A zero threshold is raised to one.
    #[must_use]
    pub fn new(failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            recovery_timeout,
        }
    }

    /// Stricter preset used around tool calls.
    #[must_use]
    pub fn for_tool_calls() -> Self {
        Self::new(3, Duration::from_secs(30))
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(30))
    }
}

/// State of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Calls pass through.
    Closed,
    /// Calls are rejected until the recovery timeout elapses.
    Open,
    /// A single probe call is in flight.
    HalfOpen,
}

impl CircuitState {
    /// Returns the canonical string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Point-in-time view of a breaker's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitSnapshot {
    /// Current state.
    pub state: CircuitState,
    /// Consecutive counted failures since the last success.
    pub failure_count: u32,
    /// Total successful calls.
    pub success_count: u64,
    /// Total calls rejected while open.
    pub rejected_count: u64,
    /// Time elapsed since the last counted failure.
    pub since_last_failure: Option<Duration>,
}
