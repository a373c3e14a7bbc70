//! Authentication, authorization, rate limiting and audit logging for
//! access to MCP servers.
//!
//! Callers opt into authenticated access by presenting a bearer token; the
//! [`SecurityManager`] resolves it to a principal, checks the action against
//! the principal's level and permissions, and spends a permit from the
//! principal's rate limit. Every decision is audited.

pub mod adapters;
pub mod domain;
pub mod hardening;
pub mod services;

pub use adapters::{AuditTrail, RuleLimiter};
pub use domain::{
    AccessToken, Action, AuditAction, AuditEvent, AuditQuery, AuthenticatedPrincipal,
    IssuedToken, Permission, PrincipalId, PrincipalKind, RateLimitDecision, RateLimitRule,
    SecurityConfig, SecurityError, SecurityLevel, SecurityPrincipal, SecurityResult,
};
pub use hardening::{
    ArgumentPolicy, ArgumentViolation, detect_sql_injection, is_path_within,
    is_uri_scheme_allowed, strip_control_characters,
};
pub use services::{SecurityManager, SecurityStats};
