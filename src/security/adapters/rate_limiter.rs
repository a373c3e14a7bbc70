//! Per-rule rate limiters backed by `governor`, plus the post-denial
//! cooldown layer.

use crate::clock::SharedClock;
use crate::security::domain::{PrincipalId, RateLimitDecision, RateLimitRule};
use chrono::{DateTime, TimeDelta, Utc};
use governor::clock::Clock as GovernorClock;
use governor::middleware::StateInformationMiddleware;
use governor::state::keyed::HashMapStateStore;
use governor::{Quota, RateLimiter};
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Smallest replenish interval handed to `governor`.
const MIN_PERIOD: Duration = Duration::from_nanos(1);

/// Monotonic view of a [`SharedClock`] for `governor`.
///
/// Readings are the elapsed wall time since construction, projected onto a
/// fixed [`Instant`]. A clock that moves backwards reads as the origin.
#[derive(Clone)]
pub struct RateClock {
    clock: SharedClock,
    origin: Instant,
    origin_utc: DateTime<Utc>,
}

impl RateClock {
    /// Anchors `clock` at the current instant.
    #[must_use]
    pub fn new(clock: SharedClock) -> Self {
        let origin_utc = clock.utc();
        Self {
            clock,
            origin: Instant::now(),
            origin_utc,
        }
    }

    /// Returns the injected clock's wall time.
    #[must_use]
    pub fn utc(&self) -> DateTime<Utc> {
        self.clock.utc()
    }
}

impl GovernorClock for RateClock {
    type Instant = Instant;

    fn now(&self) -> Self::Instant {
        let elapsed = (self.clock.utc() - self.origin_utc)
            .to_std()
            .unwrap_or(Duration::ZERO);
        self.origin.checked_add(elapsed).unwrap_or(self.origin)
    }
}

impl std::fmt::Debug for RateClock {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("RateClock")
            .field("origin_utc", &self.origin_utc)
            .finish_non_exhaustive()
    }
}

type KeyedLimiter =
    RateLimiter<PrincipalId, HashMapStateStore<PrincipalId>, RateClock, StateInformationMiddleware>;

/// Rate limiter enforcing one [`RateLimitRule`] for every principal.
///
/// `max_requests` permits replenish evenly across the window and up to
/// `capacity` may be spent at once. A denial under a rule with a cooldown
/// blocks that principal until the cooldown ends, even once permits return.
pub struct RuleLimiter {
    rule: RateLimitRule,
    limiter: KeyedLimiter,
    clock: RateClock,
    cooldowns: Mutex<HashMap<PrincipalId, DateTime<Utc>>>,
}

impl RuleLimiter {
    /// Builds the limiter for `rule`, reading time from `clock`.
    #[must_use]
    pub fn new(rule: RateLimitRule, clock: SharedClock) -> Self {
        let clock = RateClock::new(clock);
        let limiter = RateLimiter::hashmap_with_clock(quota_for(&rule), clock.clone())
            .with_middleware::<StateInformationMiddleware>();
        Self {
            rule,
            limiter,
            clock,
            cooldowns: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the rule this limiter enforces.
    #[must_use]
    pub const fn rule(&self) -> &RateLimitRule {
        &self.rule
    }

    /// Spends one permit for `principal`.
    pub fn check(&self, principal: &PrincipalId) -> RateLimitDecision {
        let now = self.clock.utc();
        {
            let mut cooldowns = lock(&self.cooldowns);
            match cooldowns.get(principal).copied() {
                Some(until) if until > now => {
                    return denied((until - now).to_std().unwrap_or(self.rule.cooldown()));
                }
                Some(_) => {
                    cooldowns.remove(principal);
                }
                None => {}
            }
        }

        match self.limiter.check_key(principal) {
            Ok(snapshot) => RateLimitDecision {
                allowed: true,
                remaining: snapshot.remaining_burst_capacity(),
                retry_after: None,
            },
            Err(not_until) => {
                let wait = not_until.wait_time_from(GovernorClock::now(&self.clock));
                let cooldown = self.rule.cooldown();
                if let Some(until) = cooldown_end(now, cooldown) {
                    lock(&self.cooldowns).insert(principal.clone(), until);
                }
                denied(wait.max(cooldown))
            }
        }
    }

    /// Forgets cooldown state held for `principal`.
    pub fn forget(&self, principal: &PrincipalId) {
        lock(&self.cooldowns).remove(principal);
    }

    /// Drops principals whose permits have fully replenished, along with
    /// ended cooldowns. Returns how many limiter entries were released.
    pub fn retain_recent(&self) -> usize {
        let before = self.len();
        self.limiter.retain_recent();
        let now = self.clock.utc();
        lock(&self.cooldowns).retain(|_, until| *until > now);
        before.saturating_sub(self.len())
    }

    /// Returns how many principals currently hold limiter state.
    #[must_use]
    pub fn len(&self) -> usize {
        self.limiter.len()
    }

    /// Returns whether no principal holds limiter state.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for RuleLimiter {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("RuleLimiter")
            .field("rule", &self.rule)
            .field("tracked", &self.len())
            .finish_non_exhaustive()
    }
}

fn quota_for(rule: &RateLimitRule) -> Quota {
    let period = rule
        .window()
        .checked_div(rule.max_requests())
        .unwrap_or(rule.window())
        .max(MIN_PERIOD);
    let burst = NonZeroU32::new(rule.capacity()).unwrap_or(NonZeroU32::MIN);
    Quota::with_period(period)
        .unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN))
        .allow_burst(burst)
}

fn cooldown_end(now: DateTime<Utc>, cooldown: Duration) -> Option<DateTime<Utc>> {
    if cooldown.is_zero() {
        return None;
    }
    TimeDelta::from_std(cooldown)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
}

const fn denied(retry_after: Duration) -> RateLimitDecision {
    RateLimitDecision {
        allowed: false,
        remaining: 0,
        retry_after: Some(retry_after),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use rstest::{fixture, rstest};
    use std::sync::Arc;

    struct Harness {
        clock: Arc<ManualClock>,
        principal: PrincipalId,
    }

    impl Harness {
        fn limiter(&self, rule: RateLimitRule) -> RuleLimiter {
            RuleLimiter::new(rule, self.clock.clone())
        }
    }

    #[fixture]
    fn harness() -> Harness {
        Harness {
            clock: Arc::new(ManualClock::default()),
            principal: PrincipalId::new("planner").expect("valid id"),
        }
    }

    fn rule() -> RateLimitRule {
        RateLimitRule::new("tool_calls", 5, Duration::from_secs(10))
    }

    #[rstest]
    fn allows_max_requests_then_denies(harness: Harness) {
        let limiter = harness.limiter(rule());

        for expected_remaining in (0..5).rev() {
            let decision = limiter.check(&harness.principal);
            assert!(decision.allowed);
            assert_eq!(decision.remaining, expected_remaining);
        }
        let denied = limiter.check(&harness.principal);
        assert!(!denied.allowed);
        assert_eq!(denied.retry_after, Some(Duration::from_secs(2)));
    }

    #[rstest]
    fn refills_fully_after_one_window_and_caps_at_capacity(harness: Harness) {
        let limiter = harness.limiter(rule());
        for _ in 0..5 {
            assert!(limiter.check(&harness.principal).allowed);
        }

        harness.clock.advance(Duration::from_secs(30));
        let decision = limiter.check(&harness.principal);
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 4);
    }

    #[rstest]
    #[case(Duration::from_secs(1), false)]
    #[case(Duration::from_secs(2), true)]
    fn refill_is_continuous(harness: Harness, #[case] wait: Duration, #[case] allowed: bool) {
        let limiter = harness.limiter(rule());
        for _ in 0..5 {
            assert!(limiter.check(&harness.principal).allowed);
        }
        harness.clock.advance(wait);
        assert_eq!(limiter.check(&harness.principal).allowed, allowed);
    }

    #[rstest]
    fn burst_limit_bounds_capacity(harness: Harness) {
        let limiter = harness.limiter(rule().with_burst_limit(2));
        assert!(limiter.check(&harness.principal).allowed);
        assert!(limiter.check(&harness.principal).allowed);
        assert!(!limiter.check(&harness.principal).allowed);
    }

    #[rstest]
    fn cooldown_blocks_after_denial(harness: Harness) {
        let limiter = harness.limiter(
            RateLimitRule::new("strict", 1, Duration::from_secs(1))
                .with_cooldown(Duration::from_secs(5)),
        );
        assert!(limiter.check(&harness.principal).allowed);
        assert!(!limiter.check(&harness.principal).allowed);

        harness.clock.advance(Duration::from_secs(2));
        let refilled_but_cooling = limiter.check(&harness.principal);
        assert!(!refilled_but_cooling.allowed);
        assert_eq!(refilled_but_cooling.retry_after, Some(Duration::from_secs(3)));

        harness.clock.advance(Duration::from_secs(4));
        assert!(limiter.check(&harness.principal).allowed);
    }

    #[rstest]
    fn principals_draw_from_separate_buckets(harness: Harness) {
        let limiter = harness.limiter(rule().with_burst_limit(1));
        let other = PrincipalId::new("critic").expect("valid id");
        assert!(limiter.check(&harness.principal).allowed);
        assert!(!limiter.check(&harness.principal).allowed);
        assert!(limiter.check(&other).allowed);
        assert_eq!(limiter.len(), 2);
    }

    #[rstest]
    fn retain_recent_releases_replenished_principals(harness: Harness) {
        let limiter = harness.limiter(rule());
        assert!(limiter.check(&harness.principal).allowed);
        assert_eq!(limiter.retain_recent(), 0);
        assert_eq!(limiter.len(), 1);

        harness.clock.advance(Duration::from_secs(10));
        assert_eq!(limiter.retain_recent(), 1);
        assert!(limiter.is_empty());
    }
}
