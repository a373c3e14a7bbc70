//! Security services.

mod manager;

pub use manager::{SecurityManager, SecurityStats};
