//! MCP capability descriptors and method payloads.
//!
//! Every type here converts losslessly to and from its JSON form through
//! [`WireFormat`]: decoding the encoding of a value yields the same value.

use super::ProtocolViolation;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// MCP protocol revision announced during the handshake.
pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

/// Lossless conversion between a payload type and its JSON form.
pub trait WireFormat: Serialize + DeserializeOwned {
    /// Encodes the value as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolViolation::Malformed`] when encoding fails.
    fn to_wire(&self) -> Result<Value, ProtocolViolation> {
        Ok(serde_json::to_value(self)?)
    }

    /// Decodes the value from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolViolation::Malformed`] when the JSON does not have
    /// the expected shape.
    fn from_wire(value: Value) -> Result<Self, ProtocolViolation> {
        Ok(serde_json::from_value(value)?)
    }
}

/// Tool exposed by an MCP server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Tool name, unique per server.
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// JSON schema for the tool arguments.
    #[serde(rename = "inputSchema", default = "empty_object_schema")]
    pub input_schema: Value,
}

fn empty_object_schema() -> Value {
    serde_json::json!({"type": "object"})
}

impl ToolDescriptor {
    /// Creates a tool descriptor.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }
}

impl WireFormat for ToolDescriptor {}

/// Resource exposed by an MCP server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    /// Resource URI.
    pub uri: String,
    /// Resource display name.
    pub name: String,
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Optional MIME type.
    #[serde(rename = "mimeType", default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

impl ResourceDescriptor {
    /// Creates a resource descriptor without optional members.
    #[must_use]
    pub fn new(uri: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            name: name.into(),
            description: None,
            mime_type: None,
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the MIME type.
    #[must_use]
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }
}

impl WireFormat for ResourceDescriptor {}

/// Name and version of a protocol participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImplementationInfo {
    /// Implementation name.
    pub name: String,
    /// Implementation version.
    pub version: String,
}

impl ImplementationInfo {
    /// Creates implementation info.
    #[must_use]
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

impl WireFormat for ImplementationInfo {}

/// Parameters of the `initialize` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitializeParams {
    /// Protocol revision requested by the client.
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    /// Client capabilities.
    #[serde(default)]
    pub capabilities: Map<String, Value>,
    /// Client identity.
    #[serde(rename = "clientInfo")]
    pub client_info: ImplementationInfo,
}

impl InitializeParams {
    /// Creates handshake parameters for the current protocol revision.
    #[must_use]
    pub fn new(client_info: ImplementationInfo) -> Self {
        Self {
            protocol_version: MCP_PROTOCOL_VERSION.to_owned(),
            capabilities: Map::new(),
            client_info,
        }
    }
}

impl WireFormat for InitializeParams {}

/// Result of the `initialize` request describing the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    /// Protocol revision selected by the server.
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    /// Server capabilities.
    #[serde(default)]
    pub capabilities: Map<String, Value>,
    /// Server identity.
    #[serde(rename = "serverInfo")]
    pub server_info: ImplementationInfo,
}

impl ServerInfo {
    /// Returns whether the server advertises the named capability.
    #[must_use]
    pub fn supports(&self, capability: &str) -> bool {
        self.capabilities.contains_key(capability)
    }
}

impl WireFormat for ServerInfo {}

/// Result of `tools/list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListToolsResult {
    /// Advertised tools.
    pub tools: Vec<ToolDescriptor>,
}

impl WireFormat for ListToolsResult {}

/// Result of `resources/list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListResourcesResult {
    /// Advertised resources.
    pub resources: Vec<ResourceDescriptor>,
}

impl WireFormat for ListResourcesResult {}

/// Parameters of `tools/call`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallToolParams {
    /// Tool name.
    pub name: String,
    /// Tool arguments.
    #[serde(default)]
    pub arguments: Value,
}

impl WireFormat for CallToolParams {}

/// Result of `tools/call`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallToolResult {
    /// Content blocks produced by the tool.
    #[serde(default)]
    pub content: Vec<Value>,
    /// Whether the tool reported a failure.
    #[serde(rename = "isError", default)]
    pub is_error: bool,
}

impl CallToolResult {
    /// Creates a successful single-text result.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![serde_json::json!({"type": "text", "text": text.into()})],
            is_error: false,
        }
    }
}

impl WireFormat for CallToolResult {}

/// Parameters of `resources/read`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadResourceParams {
    /// Resource URI.
    pub uri: String,
}

impl WireFormat for ReadResourceParams {}

/// One content entry returned by `resources/read`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceContents {
    /// Resource URI.
    pub uri: String,
    /// MIME type of the content.
    #[serde(rename = "mimeType", default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// Text content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Base64-encoded binary content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blob: Option<String>,
}

impl WireFormat for ResourceContents {}

/// Result of `resources/read`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadResourceResult {
    /// Content entries.
    pub contents: Vec<ResourceContents>,
}

impl WireFormat for ReadResourceResult {}
