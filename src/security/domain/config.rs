//! Security manager settings.

use super::rate_limit::RateLimitRule;
use super::permission::{DEFAULT_RULE, RESOURCE_ACCESS_RULE, SERVER_MANAGEMENT_RULE, TOOL_CALLS_RULE};
use camino::Utf8PathBuf;
use std::time::Duration;

const ONE_MINUTE: Duration = Duration::from_secs(60);

/// Settings for [`crate::security::SecurityManager`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityConfig {
    /// Rate-limit rules; actions map to rules by name.
    pub rate_limits: Vec<RateLimitRule>,
    /// Token lifetime when none is requested.
    pub default_token_ttl: Duration,
    /// JSON-lines audit file. `None` keeps the audit trail in memory only.
    pub audit_log_path: Option<Utf8PathBuf>,
    /// Number of recent events retained for retrieval.
    pub recent_event_capacity: usize,
    /// Interval between sweeps of expired tokens and replenished
    /// rate-limit state.
    pub sweep_interval: Duration,
}

impl SecurityConfig {
    /// Returns the built-in rate-limit rules.
    #[must_use]
    pub fn default_rate_limits() -> Vec<RateLimitRule> {
        vec![
            RateLimitRule::new(TOOL_CALLS_RULE, 60, ONE_MINUTE),
            RateLimitRule::new(RESOURCE_ACCESS_RULE, 120, ONE_MINUTE),
            RateLimitRule::new(SERVER_MANAGEMENT_RULE, 10, ONE_MINUTE),
            RateLimitRule::new(DEFAULT_RULE, 100, ONE_MINUTE),
        ]
    }

    /// Replaces or adds a rule by name.
    #[must_use]
    pub fn with_rule(mut self, rule: RateLimitRule) -> Self {
        self.rate_limits.retain(|existing| existing.name() != rule.name());
        self.rate_limits.push(rule);
        self
    }

    /// Sets the audit file path.
    #[must_use]
    pub fn with_audit_log(mut self, path: impl Into<Utf8PathBuf>) -> Self {
        self.audit_log_path = Some(path.into());
        self
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            rate_limits: Self::default_rate_limits(),
            default_token_ttl: Duration::from_secs(3600),
            audit_log_path: None,
            recent_event_capacity: 10_000,
            sweep_interval: ONE_MINUTE,
        }
    }
}
