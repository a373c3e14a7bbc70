//! JSON-RPC 2.0 envelope types.
//!
//! Requests and responses are validated when decoded from JSON: a request
//! must carry `jsonrpc == "2.0"` and a known MCP method, and a response must
//! carry an `id` plus exactly one of `result` or `error`. The response type
//! makes the "exactly one" rule unrepresentable to violate once decoded.

use super::ProtocolViolation;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;

/// JSON-RPC protocol version carried by every message.
pub const JSONRPC_VERSION: &str = "2.0";

/// Standard and MCP-specific JSON-RPC error codes.
pub mod error_codes {
    /// Invalid JSON was received.
    pub const PARSE_ERROR: i64 = -32700;
    /// The JSON sent is not a valid request object.
    pub const INVALID_REQUEST: i64 = -32600;
    /// The method does not exist or is not available.
    pub const METHOD_NOT_FOUND: i64 = -32601;
    /// Invalid method parameters.
    pub const INVALID_PARAMS: i64 = -32602;
    /// Internal JSON-RPC error.
    pub const INTERNAL_ERROR: i64 = -32603;
    /// The requested resource does not exist.
    pub const RESOURCE_NOT_FOUND: i64 = -32001;
    /// The requested tool does not exist.
    pub const TOOL_NOT_FOUND: i64 = -32002;
    /// The caller lacks permission for the operation.
    pub const PERMISSION_DENIED: i64 = -32003;
    /// The operation did not complete within its deadline.
    pub const TIMEOUT: i64 = -32004;
    /// The caller exceeded its rate limit.
    pub const RATE_LIMITED: i64 = -32005;
}

/// Identifier correlating a request with its response.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Integer identifier.
    Number(i64),
    /// String identifier.
    String(String),
}

impl RequestId {
    fn from_json(value: &Value) -> Result<Self, ProtocolViolation> {
        match value {
            Value::Number(number) => number
                .as_i64()
                .map(Self::Number)
                .ok_or_else(|| ProtocolViolation::InvalidId(number.to_string())),
            Value::String(text) => Ok(Self::String(text.clone())),
            other => Err(ProtocolViolation::InvalidId(other.to_string())),
        }
    }
}

impl From<i64> for RequestId {
    fn from(value: i64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for RequestId {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(number) => write!(formatter, "{number}"),
            Self::String(text) => formatter.write_str(text),
        }
    }
}

/// MCP methods understood by this runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum McpMethod {
    /// Opens a session and exchanges identities.
    Initialize,
    /// Client notification sent after a successful handshake.
    Initialized,
    /// Lists tools exposed by the server.
    ToolsList,
    /// Invokes a tool.
    ToolsCall,
    /// Lists resources exposed by the server.
    ResourcesList,
    /// Reads a resource by URI.
    ResourcesRead,
    /// Liveness ping.
    Ping,
    /// Asks the server to shut down.
    Shutdown,
}

impl McpMethod {
    /// Returns the wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Initialize => "initialize",
            Self::Initialized => "notifications/initialized",
            Self::ToolsList => "tools/list",
            Self::ToolsCall => "tools/call",
            Self::ResourcesList => "resources/list",
            Self::ResourcesRead => "resources/read",
            Self::Ping => "ping",
            Self::Shutdown => "shutdown",
        }
    }

    /// Returns whether the method is sent as a notification.
    #[must_use]
    pub const fn is_notification(self) -> bool {
        matches!(self, Self::Initialized)
    }
}

impl fmt::Display for McpMethod {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl TryFrom<&str> for McpMethod {
    type Error = ProtocolViolation;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "initialize" => Ok(Self::Initialize),
            "notifications/initialized" => Ok(Self::Initialized),
            "tools/list" => Ok(Self::ToolsList),
            "tools/call" => Ok(Self::ToolsCall),
            "resources/list" => Ok(Self::ResourcesList),
            "resources/read" => Ok(Self::ResourcesRead),
            "ping" => Ok(Self::Ping),
            "shutdown" => Ok(Self::Shutdown),
            _ => Err(ProtocolViolation::UnknownMethod(value.to_owned())),
        }
    }
}

impl Serialize for McpMethod {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for McpMethod {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::try_from(raw.as_str()).map_err(serde::de::Error::custom)
    }
}

/// Error object carried by a failed JSON-RPC response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Numeric error code.
    pub code: i64,
    /// Human-readable message.
    pub message: String,
    /// Optional opaque details. An explicit `null` is kept as
    /// `Some(Value::Null)`; only an absent member decodes as `None`.
    #[serde(
        default,
        deserialize_with = "present_value",
        skip_serializing_if = "Option::is_none"
    )]
    pub data: Option<Value>,
}

fn present_value<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

impl JsonRpcError {
    /// Creates an error object without data.
    #[must_use]
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Attaches opaque details.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Error for an unsupported method.
    #[must_use]
    pub fn method_not_found(method: &str) -> Self {
        Self::new(
            error_codes::METHOD_NOT_FOUND,
            format!("method not found: {method}"),
        )
    }

    /// Error for invalid parameters.
    #[must_use]
    pub fn invalid_params(reason: impl Into<String>) -> Self {
        Self::new(error_codes::INVALID_PARAMS, reason)
    }

    /// Error for an unknown tool.
    #[must_use]
    pub fn tool_not_found(tool: &str) -> Self {
        Self::new(error_codes::TOOL_NOT_FOUND, format!("tool not found: {tool}"))
    }

    /// Error for an unknown resource.
    #[must_use]
    pub fn resource_not_found(uri: &str) -> Self {
        Self::new(
            error_codes::RESOURCE_NOT_FOUND,
            format!("resource not found: {uri}"),
        )
    }

    fn from_json(value: Value) -> Result<Self, ProtocolViolation> {
        serde_json::from_value(value)
            .map_err(|err| ProtocolViolation::InvalidErrorObject(err.to_string()))
    }
}

impl fmt::Display for JsonRpcError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "[{}] {}", self.code, self.message)
    }
}

fn into_object(value: Value) -> Result<Map<String, Value>, ProtocolViolation> {
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(ProtocolViolation::NotAnObject),
    }
}

fn check_version(map: &Map<String, Value>) -> Result<(), ProtocolViolation> {
    match map.get("jsonrpc") {
        Some(Value::String(version)) if version == JSONRPC_VERSION => Ok(()),
        Some(other) => Err(ProtocolViolation::UnsupportedVersion(other.to_string())),
        None => Err(ProtocolViolation::UnsupportedVersion("<missing>".to_owned())),
    }
}

/// JSON-RPC request or, when `id` is absent, notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonRpcRequest {
    id: Option<RequestId>,
    method: McpMethod,
    params: Option<Value>,
}

impl JsonRpcRequest {
    /// Creates a request expecting a response.
    #[must_use]
    pub const fn new(id: RequestId, method: McpMethod, params: Option<Value>) -> Self {
        Self {
            id: Some(id),
            method,
            params,
        }
    }

    /// Creates a notification, which never receives a response.
    #[must_use]
    pub const fn notification(method: McpMethod, params: Option<Value>) -> Self {
        Self {
            id: None,
            method,
            params,
        }
    }

    /// Returns the request identifier, absent for notifications.
    #[must_use]
    pub const fn id(&self) -> Option<&RequestId> {
        self.id.as_ref()
    }

    /// Returns the method.
    #[must_use]
    pub const fn method(&self) -> McpMethod {
        self.method
    }

    /// Returns the parameters.
    #[must_use]
    pub const fn params(&self) -> Option<&Value> {
        self.params.as_ref()
    }

    /// Returns whether this message is a notification.
    #[must_use]
    pub const fn is_notification(&self) -> bool {
        self.id.is_none()
    }

    /// Decodes and validates a request from a JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolViolation`] when the envelope is invalid or the
    /// method is unknown.
    pub fn from_value(value: Value) -> Result<Self, ProtocolViolation> {
        let mut map = into_object(value)?;
        check_version(&map)?;

        let method = match map.get("method") {
            Some(Value::String(method)) => McpMethod::try_from(method.as_str())?,
            _ => return Err(ProtocolViolation::MissingMethod),
        };
        let id = match map.remove("id") {
            None | Some(Value::Null) => None,
            Some(raw) => Some(RequestId::from_json(&raw)?),
        };
        let params = map.remove("params");

        Ok(Self { id, method, params })
    }

    /// Decodes and validates a request from a single JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolViolation`] when the text is not a valid request.
    pub fn parse(text: &str) -> Result<Self, ProtocolViolation> {
        Self::from_value(serde_json::from_str(text)?)
    }
}

impl Serialize for JsonRpcRequest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("jsonrpc", JSONRPC_VERSION)?;
        if let Some(id) = &self.id {
            map.serialize_entry("id", id)?;
        }
        map.serialize_entry("method", &self.method)?;
        if let Some(params) = &self.params {
            map.serialize_entry("params", params)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for JsonRpcRequest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(value).map_err(serde::de::Error::custom)
    }
}

/// Outcome carried by a JSON-RPC response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseOutcome {
    /// The call succeeded with the given result.
    Success(Value),
    /// The call failed with the given error object.
    Failure(JsonRpcError),
}

/// JSON-RPC response holding exactly one of result or error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonRpcResponse {
    id: Option<RequestId>,
    outcome: ResponseOutcome,
}

impl JsonRpcResponse {
    /// Creates a successful response.
    #[must_use]
    pub const fn success(id: RequestId, result: Value) -> Self {
        Self {
            id: Some(id),
            outcome: ResponseOutcome::Success(result),
        }
    }

    /// Creates a failed response. `id` is `None` only when the request id
    /// could not be determined.
    #[must_use]
    pub const fn failure(id: Option<RequestId>, error: JsonRpcError) -> Self {
        Self {
            id,
            outcome: ResponseOutcome::Failure(error),
        }
    }

    /// Returns the response identifier.
    #[must_use]
    pub const fn id(&self) -> Option<&RequestId> {
        self.id.as_ref()
    }

    /// Returns the outcome.
    #[must_use]
    pub const fn outcome(&self) -> &ResponseOutcome {
        &self.outcome
    }

    /// Returns the result for successful responses.
    #[must_use]
    pub const fn result(&self) -> Option<&Value> {
        match &self.outcome {
            ResponseOutcome::Success(result) => Some(result),
            ResponseOutcome::Failure(_) => None,
        }
    }

    /// Returns the error for failed responses.
    #[must_use]
    pub const fn error(&self) -> Option<&JsonRpcError> {
        match &self.outcome {
            ResponseOutcome::Success(_) => None,
            ResponseOutcome::Failure(error) => Some(error),
        }
    }

    /// Converts the response into a `Result`.
    ///
    /// # Errors
    ///
    /// Returns the carried [`JsonRpcError`] for failed responses.
    pub fn into_result(self) -> Result<Value, JsonRpcError> {
        match self.outcome {
            ResponseOutcome::Success(result) => Ok(result),
            ResponseOutcome::Failure(error) => Err(error),
        }
    }

    /// Decodes and validates a response from a JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolViolation`] when the envelope is invalid, the id is
    /// missing, or the response does not carry exactly one of result/error.
    pub fn from_value(value: Value) -> Result<Self, ProtocolViolation> {
        let mut map = into_object(value)?;
        check_version(&map)?;

        let id = match map.remove("id") {
            None => return Err(ProtocolViolation::MissingId),
            Some(Value::Null) => None,
            Some(raw) => Some(RequestId::from_json(&raw)?),
        };

        let outcome = match (map.remove("result"), map.remove("error")) {
            (Some(_), Some(_)) => return Err(ProtocolViolation::BothResultAndError),
            (None, None) => return Err(ProtocolViolation::NeitherResultNorError),
            (Some(result), None) => ResponseOutcome::Success(result),
            (None, Some(error)) => ResponseOutcome::Failure(JsonRpcError::from_json(error)?),
        };

        Ok(Self { id, outcome })
    }

    /// Decodes and validates a response from a single JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolViolation`] when the text is not a valid response.
    pub fn parse(text: &str) -> Result<Self, ProtocolViolation> {
        Self::from_value(serde_json::from_str(text)?)
    }
}

impl Serialize for JsonRpcResponse {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(3))?;
        map.serialize_entry("jsonrpc", JSONRPC_VERSION)?;
        map.serialize_entry("id", &self.id)?;
        match &self.outcome {
            ResponseOutcome::Success(result) => map.serialize_entry("result", result)?,
            ResponseOutcome::Failure(error) => map.serialize_entry("error", error)?,
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for JsonRpcResponse {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(value).map_err(serde::de::Error::custom)
    }
}

/// A decoded inbound message on a bidirectional transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncomingMessage {
    /// A response to one of our requests.
    Response(JsonRpcResponse),
    /// A server-initiated request or notification.
    Request(JsonRpcRequest),
}

impl IncomingMessage {
    /// Classifies and validates one line of JSON text.
    ///
    /// Messages carrying a `method` member are requests; all others are
    /// treated as responses.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolViolation`] when the message is not valid JSON-RPC.
    pub fn parse(text: &str) -> Result<Self, ProtocolViolation> {
        let value: Value = serde_json::from_str(text)?;
        if value.get("method").is_some() {
            return Ok(Self::Request(JsonRpcRequest::from_value(value)?));
        }
        Ok(Self::Response(JsonRpcResponse::from_value(value)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case(json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"}), false)]
    #[case(json!({"jsonrpc": "2.0", "method": "notifications/initialized"}), true)]
    #[case(json!({"jsonrpc": "2.0", "id": null, "method": "ping"}), true)]
    fn request_notification_detection(#[case] raw: Value, #[case] is_notification: bool) {
        let request = JsonRpcRequest::from_value(raw).expect("request should decode");
        assert_eq!(request.is_notification(), is_notification);
    }

    #[rstest]
    #[case(json!({"jsonrpc": "1.0", "id": 1, "method": "ping"}))]
    #[case(json!({"id": 1, "method": "ping"}))]
    fn request_requires_version_two(#[case] raw: Value) {
        assert!(matches!(
            JsonRpcRequest::from_value(raw),
            Err(ProtocolViolation::UnsupportedVersion(_))
        ));
    }

    #[test]
    fn request_requires_string_method() {
        let result = JsonRpcRequest::from_value(json!({"jsonrpc": "2.0", "id": 1, "method": 7}));
        assert_eq!(result, Err(ProtocolViolation::MissingMethod));
    }

    #[test]
    fn unknown_method_is_rejected() {
        let result = JsonRpcRequest::parse(r#"{"jsonrpc":"2.0","id":1,"method":"tools/delete"}"#);
        assert_eq!(
            result,
            Err(ProtocolViolation::UnknownMethod("tools/delete".to_owned()))
        );
    }

    #[test]
    fn request_serializes_without_absent_members() {
        let request = JsonRpcRequest::notification(McpMethod::Initialized, None);
        let encoded = serde_json::to_value(&request).expect("request should encode");
        assert_eq!(
            encoded,
            json!({"jsonrpc": "2.0", "method": "notifications/initialized"})
        );
    }

    #[rstest]
    #[case(json!({"jsonrpc": "2.0", "id": 1, "result": {}, "error": {"code": -1, "message": "x"}}), ProtocolViolation::BothResultAndError)]
    #[case(json!({"jsonrpc": "2.0", "id": 1}), ProtocolViolation::NeitherResultNorError)]
    #[case(json!({"jsonrpc": "2.0", "result": {}}), ProtocolViolation::MissingId)]
    fn response_invariants(#[case] raw: Value, #[case] expected: ProtocolViolation) {
        assert_eq!(JsonRpcResponse::from_value(raw), Err(expected));
    }

    #[test]
    fn null_result_is_a_present_result() {
        let response = JsonRpcResponse::from_value(json!({"jsonrpc": "2.0", "id": 3, "result": null}))
            .expect("null result is valid");
        assert_eq!(response.result(), Some(&Value::Null));
    }

    #[rstest]
    #[case(json!({"code": "bad", "message": "x"}))]
    #[case(json!({"code": -32000}))]
    #[case(json!({"message": "x"}))]
    fn error_object_requires_code_and_message(#[case] error: Value) {
        let result =
            JsonRpcResponse::from_value(json!({"jsonrpc": "2.0", "id": 1, "error": error}));
        assert!(matches!(
            result,
            Err(ProtocolViolation::InvalidErrorObject(_))
        ));
    }

    #[test]
    fn error_response_keeps_opaque_data() {
        let response = JsonRpcResponse::parse(
            r#"{"jsonrpc":"2.0","id":"a","error":{"code":-32002,"message":"tool not found: x","data":[1,2]}}"#,
        )
        .expect("error response should decode");
        let error = response.error().expect("error should be present");
        assert_eq!(error.code, error_codes::TOOL_NOT_FOUND);
        assert_eq!(error.data, Some(json!([1, 2])));
        assert_eq!(response.id(), Some(&RequestId::from("a")));
    }

    #[rstest]
    #[case(json!({"code": -32603, "message": "x", "data": null}), Some(Value::Null))]
    #[case(json!({"code": -32603, "message": "x"}), None)]
    fn error_data_distinguishes_null_from_absent(
        #[case] raw: Value,
        #[case] expected: Option<Value>,
    ) {
        let error = JsonRpcError::from_json(raw).expect("error object should decode");
        assert_eq!(error.data, expected);
    }

    #[test]
    fn fractional_ids_are_rejected() {
        let result = JsonRpcResponse::from_value(json!({"jsonrpc": "2.0", "id": 1.5, "result": 1}));
        assert!(matches!(result, Err(ProtocolViolation::InvalidId(_))));
    }

    #[test]
    fn incoming_message_classification() {
        let request = IncomingMessage::parse(r#"{"jsonrpc":"2.0","method":"ping","id":9}"#)
            .expect("request should parse");
        assert!(matches!(request, IncomingMessage::Request(_)));

        let response = IncomingMessage::parse(r#"{"jsonrpc":"2.0","id":9,"result":{}}"#)
            .expect("response should parse");
        assert!(matches!(response, IncomingMessage::Response(_)));
    }

    #[rstest]
    #[case(JsonRpcRequest::new(RequestId::Number(4), McpMethod::ToolsCall, Some(json!({"name": "ping", "arguments": {}}))))]
    #[case(JsonRpcRequest::new(RequestId::from("req-1"), McpMethod::ResourcesRead, Some(json!({"uri": "file:///a"}))))]
    #[case(JsonRpcRequest::notification(McpMethod::Initialized, None))]
    fn request_round_trip(#[case] request: JsonRpcRequest) {
        let encoded = serde_json::to_value(&request).expect("request should encode");
        assert_eq!(JsonRpcRequest::from_value(encoded), Ok(request));
    }

    #[rstest]
    #[case(JsonRpcResponse::success(RequestId::Number(1), json!({"tools": []})))]
    #[case(JsonRpcResponse::failure(Some(RequestId::from("x")), JsonRpcError::tool_not_found("nope")))]
    #[case(JsonRpcResponse::failure(None, JsonRpcError::new(error_codes::PARSE_ERROR, "bad json")))]
    #[case(JsonRpcResponse::failure(Some(RequestId::Number(9)), JsonRpcError::new(error_codes::INTERNAL_ERROR, "boom").with_data(Value::Null)))]
    fn response_round_trip(#[case] response: JsonRpcResponse) {
        let encoded = serde_json::to_value(&response).expect("response should encode");
        assert_eq!(JsonRpcResponse::from_value(encoded), Ok(response));
    }
}
