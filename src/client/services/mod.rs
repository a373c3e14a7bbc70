//! Client services.

mod client;

pub use client::{McpClient, McpClientOptions};
