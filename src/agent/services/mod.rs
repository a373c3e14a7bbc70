//! Agent services.

mod gateway;

pub use gateway::{AgentGateway, GatewaySettings};
