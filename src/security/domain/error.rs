//! Error types for authentication, authorization and rate limiting.

use super::{Permission, PrincipalId, SecurityLevel};
use std::time::Duration;
use thiserror::Error;

/// Errors returned by the security manager.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SecurityError {
    /// The principal identifier failed validation.
    #[error("invalid principal id: '{0}'")]
    InvalidPrincipalId(String),

    /// No principal with this identifier exists.
    #[error("unknown principal: {0}")]
    UnknownPrincipal(PrincipalId),

    /// A principal with this identifier already exists.
    #[error("principal already exists: {0}")]
    DuplicatePrincipal(PrincipalId),

    /// The token was unknown, expired or revoked.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The principal lacks the level or permission for an action.
    #[error("principal {principal} may not {action} on '{resource}': {reason}")]
    PermissionDenied {
        /// Principal that was denied.
        principal: PrincipalId,
        /// Action in canonical string form.
        action: String,
        /// Resource the action targeted.
        resource: String,
        /// Human-readable denial reason.
        reason: String,
    },

    /// The principal exhausted its bucket for a rule.
    #[error("principal {principal} is rate limited by rule '{rule}', retry after {retry_after:?}")]
    RateLimited {
        /// Principal that was limited.
        principal: PrincipalId,
        /// Rule that denied the request.
        rule: String,
        /// Time until a permit is available.
        retry_after: Duration,
    },

    /// A token was requested with permissions the principal does not hold.
    #[error("token for {principal} cannot carry permissions beyond its principal: {excess:?}")]
    PermissionEscalation {
        /// Principal the token was requested for.
        principal: PrincipalId,
        /// Requested permissions the principal lacks.
        excess: Vec<Permission>,
    },

    /// The principal's level is below the level the action requires.
    #[error("principal {principal} has level {actual}, {required} required")]
    InsufficientLevel {
        /// Principal that was denied.
        principal: PrincipalId,
        /// Level the principal holds.
        actual: SecurityLevel,
        /// Level the action requires.
        required: SecurityLevel,
    },

    /// A token was supplied but no security manager is configured.
    #[error("authenticated access requested but no security manager is configured")]
    NotConfigured,
}

/// Result type for security operations.
pub type SecurityResult<T> = Result<T, SecurityError>;
