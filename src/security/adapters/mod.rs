//! Adapters backing the security manager.

mod audit_trail;
mod rate_limiter;

pub use audit_trail::AuditTrail;
pub use rate_limiter::{RateClock, RuleLimiter};
