//! Agent integration layer: the only surface external agents touch.
//!
//! The [`AgentGateway`] resolves tools and resources to servers, caches
//! discovery results, hardens tool arguments, runs batches and keeps
//! per-agent usage. Every call is routed through the
//! [`crate::registry::ServerRegistry`], so allow-lists and connection checks
//! apply unchanged.

pub mod domain;
pub mod services;

pub use domain::{
    AgentApiError, AgentApiResult, AgentSession, AgentUsage, BatchCallOutcome, BatchToolCall,
    SessionId,
};
pub use services::{AgentGateway, GatewaySettings};
