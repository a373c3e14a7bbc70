//! Audit events emitted for security decisions and lifecycle changes.

use super::PrincipalId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of audited decision or lifecycle change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// A token was presented.
    Authenticate,
    /// An action was checked against a principal's level and permissions.
    Authorize,
    /// A rate-limit bucket was consulted and denied the request.
    RateLimit,
    /// A principal was created.
    PrincipalCreated,
    /// A principal was removed.
    PrincipalRemoved,
    /// A token was issued.
    TokenCreated,
    /// A token was revoked.
    TokenRevoked,
    /// A token expired and was purged.
    TokenExpired,
}

impl AuditAction {
    /// Returns the canonical string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Authenticate => "authenticate",
            Self::Authorize => "authorize",
            Self::RateLimit => "rate_limit",
            Self::PrincipalCreated => "principal_created",
            Self::PrincipalRemoved => "principal_removed",
            Self::TokenCreated => "token_created",
            Self::TokenRevoked => "token_revoked",
            Self::TokenExpired => "token_expired",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Immutable record of one security decision, written as one JSON line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// When the decision was made.
    pub timestamp: DateTime<Utc>,
    /// Principal involved, when known.
    pub principal_id: Option<PrincipalId>,
    /// Kind of decision.
    pub action: AuditAction,
    /// Resource the decision concerned.
    pub resource: String,
    /// Whether the decision allowed the request.
    pub success: bool,
    /// Structured context such as denial reasons.
    #[serde(default)]
    pub details: serde_json::Value,
}

impl AuditEvent {
    /// Creates an event with empty details.
    #[must_use]
    pub fn new(
        timestamp: DateTime<Utc>,
        principal_id: Option<PrincipalId>,
        action: AuditAction,
        resource: impl Into<String>,
        success: bool,
    ) -> Self {
        Self {
            timestamp,
            principal_id,
            action,
            resource: resource.into(),
            success,
            details: serde_json::Value::Null,
        }
    }

    /// Attaches structured details.
    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

/// Filter for audit retrieval. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditQuery {
    /// Only events for this principal.
    pub principal: Option<PrincipalId>,
    /// Only events of this kind.
    pub action: Option<AuditAction>,
    /// At most this many events.
    pub limit: Option<usize>,
}

impl AuditQuery {
    /// Returns whether `event` passes the principal and action filters.
    #[must_use]
    pub fn matches(&self, event: &AuditEvent) -> bool {
        let principal_matches = self
            .principal
            .as_ref()
            .is_none_or(|wanted| event.principal_id.as_ref() == Some(wanted));
        let action_matches = self.action.is_none_or(|wanted| event.action == wanted);
        principal_matches && action_matches
    }
}
