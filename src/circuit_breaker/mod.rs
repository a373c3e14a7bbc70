//! Generic failure-isolation primitive.
//!
//! A breaker starts `closed`, opens after a configured number of consecutive
//! failures, lets a single probe through once the recovery timeout has
//! elapsed (`half_open`), and closes again when that probe succeeds.

mod breaker;
mod state;

pub use breaker::{CircuitBreaker, CircuitBreakerError};
pub use state::{CircuitBreakerConfig, CircuitSnapshot, CircuitState};
