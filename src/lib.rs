//! Switchboard: a Model Context Protocol runtime for multi-agent systems.
//!
//! The crate speaks JSON-RPC 2.0 to MCP servers over child-process stdio or
//! HTTP, keeps a registry of configured servers with health monitoring and
//! automatic reconnection, and gates access with authentication,
//! authorization, rate limiting and an audit trail.
//!
//! # Architecture
//!
//! Each bounded context follows hexagonal architecture principles:
//!
//! - **Domain**: Pure types and state machines with no I/O
//! - **Ports**: Abstract trait interfaces for transports, storage and recovery
//! - **Adapters**: Concrete implementations of ports (stdio, HTTP, files)
//! - **Services**: Orchestration over domain and ports
//!
//! # Modules
//!
//! - [`protocol`]: JSON-RPC envelopes and MCP payloads
//! - [`circuit_breaker`]: Failure isolation for remote calls
//! - [`client`]: Per-server MCP client and its transports
//! - [`security`]: Principals, tokens, rate limits and auditing
//! - [`registry`]: Configured servers, health monitoring and routing
//! - [`agent`]: Agent-facing API with discovery and batching
//! - [`runtime`]: Context object wiring the services together

pub mod agent;
pub mod circuit_breaker;
pub mod client;
pub mod clock;
pub mod protocol;
pub mod registry;
pub mod runtime;
pub mod security;

pub use runtime::{McpRuntime, RuntimeBuilder, RuntimeSettings};
