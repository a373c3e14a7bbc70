//! Domain model for principals, tokens, permissions and rate limits.

mod audit;
mod config;
mod error;
mod ids;
mod permission;
mod principal;
mod rate_limit;
mod token;

pub use audit::{AuditAction, AuditEvent, AuditQuery};
pub use config::SecurityConfig;
pub use error::{SecurityError, SecurityResult};
pub use ids::PrincipalId;
pub use permission::{
    Action, DEFAULT_RULE, Permission, RESOURCE_ACCESS_RULE, SERVER_MANAGEMENT_RULE,
    SecurityLevel, TOOL_CALLS_RULE,
};
pub use principal::{AuthenticatedPrincipal, PrincipalKind, SecurityPrincipal};
pub use rate_limit::{RateLimitDecision, RateLimitRule};
pub use token::{AccessToken, IssuedToken, TOKEN_LENGTH, TokenDigest, generate_token};
