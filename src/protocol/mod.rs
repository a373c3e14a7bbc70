//! JSON-RPC 2.0 wire format and MCP payload types.
//!
//! This module has no dependencies on the rest of the crate. It defines the
//! request/response envelopes with their validation rules, the fixed set of
//! MCP methods, and the capability descriptors exchanged during discovery.

mod capabilities;
mod error;
mod jsonrpc;

pub use capabilities::{
    CallToolParams, CallToolResult, ImplementationInfo, InitializeParams, ListResourcesResult,
    ListToolsResult, MCP_PROTOCOL_VERSION, ReadResourceParams, ReadResourceResult,
    ResourceContents, ResourceDescriptor, ServerInfo, ToolDescriptor, WireFormat,
};
pub use error::ProtocolViolation;
pub use jsonrpc::{
    IncomingMessage, JSONRPC_VERSION, JsonRpcError, JsonRpcRequest, JsonRpcResponse, McpMethod,
    RequestId, ResponseOutcome, error_codes,
};
