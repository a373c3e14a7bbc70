//! Minimal MCP server speaking newline-delimited JSON-RPC over stdio.
//!
//! Usage:
//!
//! ```text
//! mcp_echo_server
//! ```
//!
//! The server advertises a single tool, `ping`, which answers `pong`, and a
//! single text resource, `echo://readme`. A `tools/call` for the unlisted
//! tool `hang` is accepted and never answered, so callers can hold a
//! request in flight. Unknown methods are answered with `-32601`; a
//! `shutdown` request is acknowledged and ends the process.

use serde::Serialize;
use serde_json::{Map, Value, json};
use std::io::{self, BufRead, Write};
use switchboard::protocol::{
    CallToolParams, CallToolResult, ImplementationInfo, JsonRpcError, JsonRpcRequest,
    JsonRpcResponse, ListResourcesResult, ListToolsResult, MCP_PROTOCOL_VERSION, McpMethod,
    ProtocolViolation, ReadResourceParams, ReadResourceResult, RequestId, ResourceContents,
    ResourceDescriptor, ServerInfo, ToolDescriptor, error_codes,
};

const SERVER_NAME: &str = "mcp-echo-server";
const README_URI: &str = "echo://readme";
const README_TEXT: &str = "Echo server for exercising MCP clients.";
const HANG_TOOL: &str = "hang";

enum Reply {
    Respond(JsonRpcResponse),
    Silent,
    Exit(JsonRpcResponse),
}

fn main() -> io::Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout().lock();
    for line in stdin.lock().lines() {
        let text = line?;
        if text.trim().is_empty() {
            continue;
        }
        match handle_line(&text) {
            Reply::Respond(response) => write_response(&mut stdout, &response)?,
            Reply::Silent => {}
            Reply::Exit(response) => {
                write_response(&mut stdout, &response)?;
                break;
            }
        }
    }
    Ok(())
}

fn write_response(out: &mut impl Write, response: &JsonRpcResponse) -> io::Result<()> {
    let encoded = serde_json::to_string(response).map_err(io::Error::other)?;
    writeln!(out, "{encoded}")?;
    out.flush()
}

fn handle_line(text: &str) -> Reply {
    let value: Value = match serde_json::from_str(text) {
        Ok(decoded) => decoded,
        Err(err) => {
            return Reply::Respond(JsonRpcResponse::failure(
                None,
                JsonRpcError::new(error_codes::PARSE_ERROR, err.to_string()),
            ));
        }
    };
    let raw_id = value
        .get("id")
        .cloned()
        .and_then(|raw| serde_json::from_value::<RequestId>(raw).ok());
    match JsonRpcRequest::from_value(value) {
        Ok(request) => dispatch(&request),
        Err(violation) => reject(raw_id, &violation),
    }
}

fn reject(id: Option<RequestId>, violation: &ProtocolViolation) -> Reply {
    let error = match violation {
        ProtocolViolation::UnknownMethod(method) => JsonRpcError::method_not_found(method),
        other => JsonRpcError::new(error_codes::INVALID_REQUEST, other.to_string()),
    };
    // Notifications never get a reply, not even an error.
    if id.is_none() && matches!(violation, ProtocolViolation::UnknownMethod(_)) {
        return Reply::Silent;
    }
    Reply::Respond(JsonRpcResponse::failure(id, error))
}

fn dispatch(request: &JsonRpcRequest) -> Reply {
    let Some(id) = request.id().cloned() else {
        return Reply::Silent;
    };
    let outcome = match request.method() {
        McpMethod::Initialize => encode(&server_info()),
        McpMethod::Initialized | McpMethod::Ping => Ok(json!({})),
        McpMethod::ToolsList => encode(&ListToolsResult {
            tools: vec![ping_tool()],
        }),
        McpMethod::ResourcesList => encode(&ListResourcesResult {
            resources: vec![readme()],
        }),
        McpMethod::ToolsCall => match call_tool(request.params()) {
            Some(result) => result,
            None => return Reply::Silent,
        },
        McpMethod::ResourcesRead => read_resource(request.params()),
        McpMethod::Shutdown => {
            return Reply::Exit(JsonRpcResponse::success(id, json!({})));
        }
    };
    Reply::Respond(outcome.map_or_else(
        |error| JsonRpcResponse::failure(Some(id.clone()), error),
        |result| JsonRpcResponse::success(id.clone(), result),
    ))
}

/// Returns `None` for calls that must never be answered.
fn call_tool(params: Option<&Value>) -> Option<Result<Value, JsonRpcError>> {
    let call: CallToolParams = match decode(params) {
        Ok(decoded) => decoded,
        Err(error) => return Some(Err(error)),
    };
    match call.name.as_str() {
        "ping" => Some(encode(&CallToolResult::text("pong"))),
        HANG_TOOL => None,
        other => Some(Err(JsonRpcError::tool_not_found(other))),
    }
}

fn read_resource(params: Option<&Value>) -> Result<Value, JsonRpcError> {
    let read: ReadResourceParams = decode(params)?;
    if read.uri != README_URI {
        return Err(JsonRpcError::resource_not_found(&read.uri));
    }
    encode(&ReadResourceResult {
        contents: vec![ResourceContents {
            uri: read.uri,
            mime_type: Some("text/plain".to_owned()),
            text: Some(README_TEXT.to_owned()),
            blob: None,
        }],
    })
}

fn server_info() -> ServerInfo {
    let mut capabilities = Map::new();
    capabilities.insert("tools".to_owned(), json!({}));
    capabilities.insert("resources".to_owned(), json!({}));
    ServerInfo {
        protocol_version: MCP_PROTOCOL_VERSION.to_owned(),
        capabilities,
        server_info: ImplementationInfo::new(SERVER_NAME, env!("CARGO_PKG_VERSION")),
    }
}

fn ping_tool() -> ToolDescriptor {
    ToolDescriptor::new(
        "ping",
        "Replies with pong",
        json!({"type": "object", "properties": {}}),
    )
}

fn readme() -> ResourceDescriptor {
    ResourceDescriptor::new(README_URI, "readme")
        .with_description("About this server")
        .with_mime_type("text/plain")
}

fn encode(value: &impl Serialize) -> Result<Value, JsonRpcError> {
    serde_json::to_value(value)
        .map_err(|err| JsonRpcError::new(error_codes::INTERNAL_ERROR, err.to_string()))
}

fn decode<T: serde::de::DeserializeOwned>(params: Option<&Value>) -> Result<T, JsonRpcError> {
    let raw = params.cloned().unwrap_or(Value::Null);
    serde_json::from_value(raw).map_err(|err| JsonRpcError::invalid_params(err.to_string()))
}
