//! Rate-limit rules and the decisions they produce.

use std::time::Duration;

/// Smallest window a rule may use.
const MIN_WINDOW: Duration = Duration::from_millis(1);

/// Named rate-limit rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitRule {
    name: String,
    max_requests: u32,
    window: Duration,
    burst_limit: Option<u32>,
    cooldown: Duration,
}

impl RateLimitRule {
    /// Creates a rule allowing `max_requests` per `window`.
    ///
    /// `max_requests` is raised to at least one and `window` to at least one
    /// millisecond.
    #[must_use]
    pub fn new(name: impl Into<String>, max_requests: u32, window: Duration) -> Self {
        Self {
            name: name.into(),
            max_requests: max_requests.max(1),
            window: window.max(MIN_WINDOW),
            burst_limit: None,
            cooldown: Duration::ZERO,
        }
    }

    /// Sets the burst capacity independently of `max_requests`.
    #[must_use]
    pub fn with_burst_limit(mut self, burst_limit: u32) -> Self {
        self.burst_limit = Some(burst_limit.max(1));
        self
    }

    /// Blocks a principal for `cooldown` after each denial.
    #[must_use]
    pub const fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// Returns the rule name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of requests refilled per window.
    #[must_use]
    pub const fn max_requests(&self) -> u32 {
        self.max_requests
    }

    /// Returns the refill window.
    #[must_use]
    pub const fn window(&self) -> Duration {
        self.window
    }

    /// Returns the optional burst capacity.
    #[must_use]
    pub const fn burst_limit(&self) -> Option<u32> {
        self.burst_limit
    }

    /// Returns the post-denial cooldown.
    #[must_use]
    pub const fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Returns how many permits may be spent at once.
    #[must_use]
    pub fn capacity(&self) -> u32 {
        self.burst_limit.unwrap_or(self.max_requests)
    }
}

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    /// Whether the request may proceed.
    pub allowed: bool,
    /// Whole permits left after this request.
    pub remaining: u32,
    /// Time until the next permit when denied.
    pub retry_after: Option<Duration>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(RateLimitRule::new("calls", 0, Duration::ZERO), 1, Duration::from_millis(1))]
    #[case(RateLimitRule::new("calls", 30, Duration::from_secs(60)), 30, Duration::from_secs(60))]
    fn rules_clamp_degenerate_limits(
        #[case] rule: RateLimitRule,
        #[case] max_requests: u32,
        #[case] window: Duration,
    ) {
        assert_eq!(rule.max_requests(), max_requests);
        assert_eq!(rule.window(), window);
        assert_eq!(rule.capacity(), max_requests);
    }

    #[test]
    fn burst_limit_overrides_capacity() {
        let rule = RateLimitRule::new("calls", 10, Duration::from_secs(60)).with_burst_limit(0);
        assert_eq!(rule.burst_limit(), Some(1));
        assert_eq!(rule.capacity(), 1);
    }
}
