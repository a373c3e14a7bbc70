//! Circuit breaker state machine.

use super::{CircuitBreakerConfig, CircuitSnapshot, CircuitState};
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

/// Error returned by calls wrapped in a [`CircuitBreaker`].
#[derive(Debug, Error)]
pub enum CircuitBreakerError<E> {
    /// The circuit is open and the call was not attempted.
    #[error("circuit '{name}' is open, retry after {retry_after:?}")]
    Open {
        /// Breaker name.
        name: String,
        /// Remaining cooldown before a probe is allowed.
        retry_after: Duration,
    },
    /// The wrapped operation failed.
    #[error("{0}")]
    Inner(E),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Normal,
    Probe,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    success_count: u64,
    rejected_count: u64,
    last_failure: Option<Instant>,
}

/// Failure-isolation wrapper around fallible async operations.
///
/// Admission and state transitions happen inside one critical section, so
/// exactly one concurrent caller becomes the half-open probe.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerState>,
}

/// Settles a probe as failed when its future is dropped before completing.
struct ProbeGuard<'a> {
    breaker: &'a CircuitBreaker,
    admission: Admission,
    settled: bool,
}

impl ProbeGuard<'_> {
    fn settle(mut self, counted_failure: bool) {
        self.settled = true;
        if counted_failure {
            self.breaker.record_failure(self.admission);
        } else {
            self.breaker.record_success(self.admission);
        }
    }
}

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        if !self.settled && self.admission == Admission::Probe {
            tracing::debug!(breaker = %self.breaker.name, "probe cancelled, reopening circuit");
            self.breaker.record_failure(self.admission);
        }
    }
}

impl CircuitBreaker {
    /// Creates a closed breaker.
    #[must_use]
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                rejected_count: 0,
                last_failure: None,
            }),
        }
    }

    /// Returns the breaker name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> CircuitBreakerConfig {
        self.config
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Returns a snapshot of the counters.
    #[must_use]
    pub fn snapshot(&self) -> CircuitSnapshot {
        let inner = self.lock();
        CircuitSnapshot {
            state: inner.state,
            failure_count: inner.failure_count,
            success_count: inner.success_count,
            rejected_count: inner.rejected_count,
            since_last_failure: inner.last_failure.map(|at| at.elapsed()),
        }
    }

    /// Forces the breaker back to `closed` and clears the failure counter.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
        inner.last_failure = None;
    }

    /// Runs `operation` through the breaker, counting every error.
    ///
    /// # Errors
    ///
    /// Returns [`CircuitBreakerError::Open`] without invoking the operation
    /// while the circuit is open, or [`CircuitBreakerError::Inner`] with the
    /// operation's own error.
    pub async fn call<F, Fut, T, E>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.call_counting(operation, |_| true).await
    }

    /// Runs `operation` through the breaker, counting only the errors
    /// accepted by `counts`. Uncounted errors settle the call like a success
    /// because the dependency did respond.
    ///
    /// # Errors
    ///
    /// Returns [`CircuitBreakerError::Open`] without invoking the operation
    /// while the circuit is open, or [`CircuitBreakerError::Inner`] with the
    /// operation's own error.
    pub async fn call_counting<F, Fut, T, E, P>(
        &self,
        operation: F,
        counts: P,
    ) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
    {
        let admission = self.admit().map_err(|retry_after| CircuitBreakerError::Open {
            name: self.name.clone(),
            retry_after,
        })?;
        let guard = ProbeGuard {
            breaker: self,
            admission,
            settled: false,
        };

        match operation().await {
            Ok(value) => {
                guard.settle(false);
                Ok(value)
            }
            Err(err) => {
                guard.settle(counts(&err));
                Err(CircuitBreakerError::Inner(err))
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn admit(&self) -> Result<Admission, Duration> {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => Ok(Admission::Normal),
            CircuitState::HalfOpen => {
                inner.rejected_count += 1;
                Err(self.config.recovery_timeout)
            }
            CircuitState::Open => {
                let elapsed = inner
                    .last_failure
                    .map_or(self.config.recovery_timeout, |at| at.elapsed());
                if elapsed >= self.config.recovery_timeout {
                    tracing::info!(breaker = %self.name, "recovery timeout elapsed, probing");
                    inner.state = CircuitState::HalfOpen;
                    return Ok(Admission::Probe);
                }
                inner.rejected_count += 1;
                Err(self.config.recovery_timeout.saturating_sub(elapsed))
            }
        }
    }

    fn record_success(&self, admission: Admission) {
        let mut inner = self.lock();
        inner.success_count += 1;
        inner.failure_count = 0;
        if admission == Admission::Probe {
            tracing::info!(breaker = %self.name, "probe succeeded, closing circuit");
            inner.state = CircuitState::Closed;
        }
    }

    fn record_failure(&self, admission: Admission) {
        let mut inner = self.lock();
        inner.last_failure = Some(Instant::now());
        if admission == Admission::Probe {
            tracing::warn!(breaker = %self.name, "probe failed, reopening circuit");
            inner.state = CircuitState::Open;
            return;
        }

        inner.failure_count = inner.failure_count.saturating_add(1);
        if inner.state == CircuitState::Closed
            && inner.failure_count >= self.config.failure_threshold
        {
            tracing::warn!(
                breaker = %self.name,
                failures = inner.failure_count,
                threshold = self.config.failure_threshold,
                "failure threshold reached, opening circuit"
            );
            inner.state = CircuitState::Open;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn breaker(threshold: u32) -> CircuitBreaker {
        CircuitBreaker::new(
            "test",
            CircuitBreakerConfig::new(threshold, Duration::from_secs(10)),
        )
    }

    async fn fail(breaker: &CircuitBreaker) {
        let result = breaker
            .call(|| async { Err::<(), _>("boom".to_owned()) })
            .await;
        assert!(result.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn opens_after_threshold_consecutive_failures() {
        let breaker = breaker(3);
        fail(&breaker).await;
        fail(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::Closed);

        fail(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(breaker.snapshot().failure_count, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn success_resets_consecutive_failures() {
        let breaker = breaker(2);
        fail(&breaker).await;
        breaker
            .call(|| async { Ok::<_, String>(()) })
            .await
            .expect("call should pass");
        fail(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn open_circuit_rejects_without_invoking() {
        let breaker = breaker(1);
        fail(&breaker).await;

        let invocations = AtomicU32::new(0);
        let result = breaker
            .call(|| async {
                invocations.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>(())
            })
            .await;

        assert!(matches!(result, Err(CircuitBreakerError::Open { .. })));
        assert_eq!(invocations.load(Ordering::SeqCst), 0);
        assert_eq!(breaker.snapshot().rejected_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn probe_runs_half_open_and_success_closes() {
        let breaker = breaker(1);
        fail(&breaker).await;
        tokio::time::advance(Duration::from_secs(11)).await;

        let observed = breaker
            .call(|| async { Ok::<_, String>(breaker.state()) })
            .await
            .expect("probe should be admitted");

        assert_eq!(observed, CircuitState::HalfOpen);
        let snapshot = breaker.snapshot();
        assert_eq!(snapshot.state, CircuitState::Closed);
        assert_eq!(snapshot.failure_count, 0);
        assert_eq!(snapshot.success_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_probe_reopens() {
        let breaker = breaker(1);
        fail(&breaker).await;
        tokio::time::advance(Duration::from_secs(11)).await;

        fail(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::Open);

        let rejected = breaker.call(|| async { Ok::<_, String>(()) }).await;
        assert!(matches!(rejected, Err(CircuitBreakerError::Open { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn only_one_concurrent_probe_is_admitted() {
        let breaker = Arc::new(breaker(1));
        fail(&breaker).await;
        tokio::time::advance(Duration::from_secs(11)).await;

        let (release, hold) = tokio::sync::oneshot::channel::<()>();
        let probe_breaker = Arc::clone(&breaker);
        let probe = tokio::spawn(async move {
            probe_breaker
                .call(|| async move {
                    hold.await.ok();
                    Ok::<_, String>("probe")
                })
                .await
        });
        tokio::task::yield_now().await;

        let second = breaker.call(|| async { Ok::<_, String>("second") }).await;
        assert!(matches!(second, Err(CircuitBreakerError::Open { .. })));

        release.send(()).expect("probe should be waiting");
        let outcome = probe.await.expect("probe task should join");
        assert_eq!(outcome.expect("probe should succeed"), "probe");
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn uncounted_errors_do_not_open() {
        let breaker = breaker(1);
        let result = breaker
            .call_counting(|| async { Err::<(), _>("remote said no") }, |_| false)
            .await;
        assert!(matches!(result, Err(CircuitBreakerError::Inner(_))));
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_probe_reopens_circuit() {
        let breaker = breaker(1);
        fail(&breaker).await;
        tokio::time::advance(Duration::from_secs(11)).await;

        let probe = breaker.call(|| async {
            std::future::pending::<()>().await;
            Ok::<_, String>(())
        });
        let timed_out = tokio::time::timeout(Duration::from_millis(5), probe).await;
        assert!(timed_out.is_err());
        assert_eq!(breaker.state(), CircuitState::Open);
    }
}
