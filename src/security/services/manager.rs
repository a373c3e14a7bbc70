//! Security manager: principals, tokens, authorization, rate limiting and
//! the audit trail.

use crate::clock::{SharedClock, system_clock};
use crate::security::adapters::{AuditTrail, RuleLimiter};
use crate::security::domain::{
    AccessToken, Action, AuditAction, AuditEvent, AuditQuery, AuthenticatedPrincipal,
    DEFAULT_RULE, IssuedToken, Permission, PrincipalId, PrincipalKind, RateLimitDecision,
    SecurityConfig, SecurityError, SecurityLevel, SecurityPrincipal, SecurityResult,
    TokenDigest, generate_token,
};
use chrono::{DateTime, TimeDelta, Utc};
use serde_json::json;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Point-in-time counters describing the security manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecurityStats {
    /// Registered principals.
    pub principals: usize,
    /// Tokens that have not expired.
    pub active_tokens: usize,
    /// Principals holding rate-limit state, summed across rules.
    pub rate_limit_buckets: usize,
    /// Requests denied by rate limiting since creation.
    pub rate_limited_requests: u64,
    /// Audit events recorded since creation.
    pub audit_events: u64,
}

struct Maintenance {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Gatekeeper for authenticated access to servers.
///
/// Principals, tokens and each rule's limiter sit behind their own locks
/// and no method holds two of them at once. Expired tokens are evicted eagerly when
/// presented and swept periodically once [`SecurityManager::start`] has run.
pub struct SecurityManager {
    config: SecurityConfig,
    limiters: HashMap<String, RuleLimiter>,
    principals: Mutex<HashMap<PrincipalId, SecurityPrincipal>>,
    tokens: Mutex<HashMap<TokenDigest, AccessToken>>,
    rate_limited: AtomicU64,
    audit: AuditTrail,
    clock: SharedClock,
    maintenance: Mutex<Option<Maintenance>>,
}

impl SecurityManager {
    /// Creates a manager using the system clock.
    #[must_use]
    pub fn new(config: SecurityConfig) -> Self {
        Self::with_clock(config, system_clock())
    }

    /// Creates a manager reading time from `clock`.
    #[must_use]
    pub fn with_clock(config: SecurityConfig, clock: SharedClock) -> Self {
        let limiters = config
            .rate_limits
            .iter()
            .map(|rule| {
                let limiter = RuleLimiter::new(rule.clone(), Arc::clone(&clock));
                (rule.name().to_owned(), limiter)
            })
            .collect();
        let audit = config.audit_log_path.as_ref().map_or_else(
            || AuditTrail::in_memory(config.recent_event_capacity),
            |path| AuditTrail::with_file(config.recent_event_capacity, path.clone()),
        );
        Self {
            config,
            limiters,
            principals: Mutex::new(HashMap::new()),
            tokens: Mutex::new(HashMap::new()),
            rate_limited: AtomicU64::new(0),
            audit,
            clock,
            maintenance: Mutex::new(None),
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &SecurityConfig {
        &self.config
    }

    /// Registers a principal.
    ///
    /// # Errors
    ///
    /// Returns [`SecurityError::DuplicatePrincipal`] when the identifier is
    /// already taken.
    pub fn create_principal(
        &self,
        id: PrincipalId,
        display_name: impl Into<String>,
        kind: PrincipalKind,
        level: SecurityLevel,
        permissions: impl IntoIterator<Item = Permission>,
    ) -> SecurityResult<SecurityPrincipal> {
        let now = self.now();
        let principal =
            SecurityPrincipal::new(id.clone(), display_name, kind, level, permissions, now);
        {
            let mut principals = lock(&self.principals);
            if principals.contains_key(&id) {
                return Err(SecurityError::DuplicatePrincipal(id));
            }
            principals.insert(id.clone(), principal.clone());
        }
        self.record(
            AuditEvent::new(now, Some(id), AuditAction::PrincipalCreated, "principal", true)
                .with_details(json!({
                    "kind": kind.as_str(),
                    "level": level.as_str(),
                    "permissions": principal.permissions(),
                })),
        );
        Ok(principal)
    }

    /// Returns a copy of the principal with this identifier.
    #[must_use]
    pub fn principal(&self, id: &PrincipalId) -> Option<SecurityPrincipal> {
        lock(&self.principals).get(id).cloned()
    }

    /// Removes a principal and revokes every token it holds.
    ///
    /// # Errors
    ///
    /// Returns [`SecurityError::UnknownPrincipal`] when no such principal
    /// exists.
    pub fn remove_principal(&self, id: &PrincipalId) -> SecurityResult<()> {
        if lock(&self.principals).remove(id).is_none() {
            return Err(SecurityError::UnknownPrincipal(id.clone()));
        }
        let revoked = {
            let mut tokens = lock(&self.tokens);
            let before = tokens.len();
            tokens.retain(|_, token| token.principal_id() != id);
            before.saturating_sub(tokens.len())
        };
        for limiter in self.limiters.values() {
            limiter.forget(id);
        }
        self.record(
            AuditEvent::new(
                self.now(),
                Some(id.clone()),
                AuditAction::PrincipalRemoved,
                "principal",
                true,
            )
            .with_details(json!({ "revoked_tokens": revoked })),
        );
        Ok(())
    }

    /// Issues a token for `principal_id`.
    ///
    /// `ttl` defaults to the configured token lifetime; `permissions`
    /// defaults to everything the principal holds.
    ///
    /// # Errors
    ///
    /// Returns [`SecurityError::UnknownPrincipal`] when the principal does
    /// not exist, or [`SecurityError::PermissionEscalation`] when the
    /// requested scope exceeds the principal's permissions.
    pub fn create_token(
        &self,
        principal_id: &PrincipalId,
        ttl: Option<Duration>,
        permissions: Option<BTreeSet<Permission>>,
    ) -> SecurityResult<IssuedToken> {
        let principal = self
            .principal(principal_id)
            .ok_or_else(|| SecurityError::UnknownPrincipal(principal_id.clone()))?;
        let scope = permissions.unwrap_or_else(|| principal.permissions().clone());
        let excess: Vec<Permission> = scope.difference(principal.permissions()).copied().collect();
        let now = self.now();
        if !excess.is_empty() {
            self.record(
                AuditEvent::new(
                    now,
                    Some(principal_id.clone()),
                    AuditAction::TokenCreated,
                    "token",
                    false,
                )
                .with_details(json!({ "reason": "permission escalation", "excess": excess })),
            );
            return Err(SecurityError::PermissionEscalation {
                principal: principal_id.clone(),
                excess,
            });
        }

        let lifetime = ttl.unwrap_or(self.config.default_token_ttl);
        let expires_at = TimeDelta::from_std(lifetime)
            .ok()
            .and_then(|delta| now.checked_add_signed(delta))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let raw = generate_token();
        lock(&self.tokens).insert(
            TokenDigest::of(&raw),
            AccessToken::new(principal_id.clone(), scope.clone(), now, expires_at),
        );
        self.record(
            AuditEvent::new(
                now,
                Some(principal_id.clone()),
                AuditAction::TokenCreated,
                "token",
                true,
            )
            .with_details(json!({ "expires_at": expires_at, "permissions": scope })),
        );
        Ok(IssuedToken::new(raw, principal_id.clone(), scope, expires_at))
    }

    /// Revokes a token. Returns whether it existed.
    pub fn revoke_token(&self, raw_token: &str) -> bool {
        let removed = lock(&self.tokens).remove(&TokenDigest::of(raw_token));
        let revoked = removed.is_some();
        self.record(AuditEvent::new(
            self.now(),
            removed.map(|token| token.principal_id().clone()),
            AuditAction::TokenRevoked,
            "token",
            revoked,
        ));
        revoked
    }

    /// Resolves a bearer token to its principal.
    ///
    /// The returned permissions are the intersection of the token scope and
    /// the principal's current permissions. An expired token is evicted.
    ///
    /// # Errors
    ///
    /// Returns [`SecurityError::AuthenticationFailed`] for unknown, expired
    /// or orphaned tokens.
    pub fn authenticate(&self, raw_token: &str) -> SecurityResult<AuthenticatedPrincipal> {
        let digest = TokenDigest::of(raw_token);
        let now = self.now();
        let token = lock(&self.tokens).get(&digest).cloned();
        let Some(record) = token else {
            return Err(self.authentication_failure(None, "unknown token"));
        };

        if record.is_expired(now) {
            lock(&self.tokens).remove(&digest);
            self.record(AuditEvent::new(
                now,
                Some(record.principal_id().clone()),
                AuditAction::TokenExpired,
                "token",
                true,
            ));
            return Err(self.authentication_failure(Some(record.principal_id()), "token expired"));
        }

        let principal = {
            let mut principals = lock(&self.principals);
            principals.get_mut(record.principal_id()).map(|principal| {
                principal.touch(now);
                principal.scoped(record.permissions())
            })
        };
        let Some(authenticated) = principal else {
            lock(&self.tokens).remove(&digest);
            return Err(self.authentication_failure(
                Some(record.principal_id()),
                "principal no longer exists",
            ));
        };

        self.record(AuditEvent::new(
            now,
            Some(record.principal_id().clone()),
            AuditAction::Authenticate,
            "token",
            true,
        ));
        Ok(authenticated)
    }

    /// Checks that `principal` may perform `action` on `resource`.
    ///
    /// # Errors
    ///
    /// Returns [`SecurityError::InsufficientLevel`] when the principal's
    /// level is below `min_level`, or [`SecurityError::PermissionDenied`]
    /// when the action's required permission is missing.
    pub fn authorize(
        &self,
        principal: &AuthenticatedPrincipal,
        action: Action,
        resource: &str,
        min_level: SecurityLevel,
    ) -> SecurityResult<()> {
        let required = action.required_permission();
        let outcome = if principal.level() < min_level {
            Err(SecurityError::InsufficientLevel {
                principal: principal.principal_id().clone(),
                actual: principal.level(),
                required: min_level,
            })
        } else if principal.has_permission(required) {
            Ok(())
        } else {
            Err(SecurityError::PermissionDenied {
                principal: principal.principal_id().clone(),
                action: action.as_str().to_owned(),
                resource: resource.to_owned(),
                reason: format!("missing permission {required}"),
            })
        };

        let details = outcome.as_ref().err().map_or_else(
            || json!({ "action": action.as_str() }),
            |err| json!({ "action": action.as_str(), "reason": err.to_string() }),
        );
        if let Err(err) = &outcome {
            tracing::warn!(principal = %principal.principal_id(), %action, resource, error = %err, "authorization denied");
        }
        self.record(
            AuditEvent::new(
                self.now(),
                Some(principal.principal_id().clone()),
                AuditAction::Authorize,
                resource,
                outcome.is_ok(),
            )
            .with_details(details),
        );
        outcome
    }

    /// Spends one permit from the rule governing `action` for `principal`.
    ///
    /// Actions whose rule is not configured fall back to the `default` rule;
    /// with no `default` rule they are unlimited.
    pub fn check_rate_limit(&self, principal: &PrincipalId, action: Action) -> RateLimitDecision {
        let Some(limiter) = self
            .limiters
            .get(action.rate_limit_rule())
            .or_else(|| self.limiters.get(DEFAULT_RULE))
        else {
            return RateLimitDecision {
                allowed: true,
                remaining: u32::MAX,
                retry_after: None,
            };
        };

        let rule = limiter.rule();
        let decision = limiter.check(principal);
        if !decision.allowed {
            self.rate_limited.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(%principal, rule = rule.name(), retry_after = ?decision.retry_after, "rate limit exceeded");
            let retry_after_ms = decision
                .retry_after
                .map(|wait| u64::try_from(wait.as_millis()).unwrap_or(u64::MAX));
            self.record(
                AuditEvent::new(
                    self.now(),
                    Some(principal.clone()),
                    AuditAction::RateLimit,
                    action.as_str(),
                    false,
                )
                .with_details(json!({ "rule": rule.name(), "retry_after_ms": retry_after_ms })),
            );
        }
        decision
    }

    /// Like [`SecurityManager::check_rate_limit`], but turns a denial into
    /// an error.
    ///
    /// # Errors
    ///
    /// Returns [`SecurityError::RateLimited`] when no permit is available.
    pub fn enforce_rate_limit(
        &self,
        principal: &PrincipalId,
        action: Action,
    ) -> SecurityResult<RateLimitDecision> {
        let decision = self.check_rate_limit(principal, action);
        if decision.allowed {
            return Ok(decision);
        }
        Err(SecurityError::RateLimited {
            principal: principal.clone(),
            rule: action.rate_limit_rule().to_owned(),
            retry_after: decision.retry_after.unwrap_or_default(),
        })
    }

    /// Runs the full gate for a token-bearing request: authenticate,
    /// authorize, then rate-limit.
    ///
    /// # Errors
    ///
    /// Returns the first [`SecurityError`] raised by any stage.
    pub fn check_access(
        &self,
        raw_token: &str,
        action: Action,
        resource: &str,
        min_level: SecurityLevel,
    ) -> SecurityResult<AuthenticatedPrincipal> {
        let principal = self.authenticate(raw_token)?;
        self.authorize(&principal, action, resource, min_level)?;
        self.enforce_rate_limit(principal.principal_id(), action)?;
        Ok(principal)
    }

    /// Drops expired tokens. Returns how many were removed.
    pub fn purge_expired_tokens(&self) -> usize {
        let now = self.now();
        let expired: Vec<AccessToken> = {
            let mut tokens = lock(&self.tokens);
            let digests: Vec<TokenDigest> = tokens
                .iter()
                .filter(|(_, token)| token.is_expired(now))
                .map(|(digest, _)| digest.clone())
                .collect();
            digests
                .iter()
                .filter_map(|digest| tokens.remove(digest))
                .collect()
        };
        for token in &expired {
            self.record(AuditEvent::new(
                now,
                Some(token.principal_id().clone()),
                AuditAction::TokenExpired,
                "token",
                true,
            ));
        }
        if !expired.is_empty() {
            tracing::debug!(count = expired.len(), "purged expired tokens");
        }
        expired.len()
    }

    /// Drops rate-limit state for principals whose permits have fully
    /// replenished. Returns how many entries were released.
    pub fn cleanup_idle_buckets(&self) -> usize {
        self.limiters.values().map(RuleLimiter::retain_recent).sum()
    }

    /// Returns audit events matching `query`, most recent first.
    #[must_use]
    pub fn audit_events(&self, query: &AuditQuery) -> Vec<AuditEvent> {
        self.audit.query(query)
    }

    /// Returns current counters.
    #[must_use]
    pub fn stats(&self) -> SecurityStats {
        let now = self.now();
        let principals = lock(&self.principals).len();
        let active_tokens = lock(&self.tokens)
            .values()
            .filter(|token| !token.is_expired(now))
            .count();
        let rate_limit_buckets: usize = self.limiters.values().map(RuleLimiter::len).sum();
        SecurityStats {
            principals,
            active_tokens,
            rate_limit_buckets,
            rate_limited_requests: self.rate_limited.load(Ordering::Relaxed),
            audit_events: self.audit.emitted(),
        }
    }

    /// Waits until the audit file holds every event recorded so far.
    pub async fn flush_audit(&self) {
        self.audit.flush().await;
    }

    /// Starts the audit writer and the periodic maintenance sweep.
    ///
    /// Must be called from within a Tokio runtime. Calling it again while
    /// running has no effect.
    pub fn start(self: &Arc<Self>) {
        self.audit.start();
        let mut maintenance = lock(&self.maintenance);
        if maintenance.is_some() {
            return;
        }
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_maintenance(
            Arc::downgrade(self),
            cancel.clone(),
            self.config.sweep_interval,
        ));
        *maintenance = Some(Maintenance { cancel, handle });
    }

    /// Stops the maintenance sweep and drains the audit writer.
    pub async fn shutdown(&self) {
        let running = lock(&self.maintenance).take();
        if let Some(Maintenance { cancel, handle }) = running {
            cancel.cancel();
            if let Err(err) = handle.await {
                tracing::error!(error = %err, "security maintenance task failed");
            }
        }
        self.audit.shutdown().await;
    }

    fn authentication_failure(&self, principal: Option<&PrincipalId>, reason: &str) -> SecurityError {
        tracing::warn!(principal = ?principal, reason, "authentication failed");
        self.record(
            AuditEvent::new(
                self.now(),
                principal.cloned(),
                AuditAction::Authenticate,
                "token",
                false,
            )
            .with_details(json!({ "reason": reason })),
        );
        SecurityError::AuthenticationFailed(reason.to_owned())
    }

    fn record(&self, event: AuditEvent) {
        self.audit.record(event);
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.utc()
    }
}

impl std::fmt::Debug for SecurityManager {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("SecurityManager")
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn run_maintenance(manager: Weak<SecurityManager>, cancel: CancellationToken, interval: Duration) {
    let period = interval.max(Duration::from_millis(10));
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(period) => {
                let Some(strong) = manager.upgrade() else {
                    break;
                };
                let purged = strong.purge_expired_tokens();
                let dropped = strong.cleanup_idle_buckets();
                tracing::trace!(purged, dropped, "security maintenance sweep");
            }
        }
    }
}
