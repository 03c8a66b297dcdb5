//! JSON-RPC 2.0 message types used by the MCP endpoint

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;

#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn parse_error(detail: impl std::fmt::Display) -> Self {
        Self::new(PARSE_ERROR, format!("Parse error: {detail}"))
    }

    pub fn invalid_request(detail: impl std::fmt::Display) -> Self {
        Self::new(INVALID_REQUEST, format!("Invalid request: {detail}"))
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(METHOD_NOT_FOUND, format!("Method not found: {method}"))
    }

    pub fn invalid_params(detail: impl std::fmt::Display) -> Self {
        Self::new(INVALID_PARAMS, format!("Invalid params: {detail}"))
    }

    pub fn internal(detail: impl std::fmt::Display) -> Self {
        Self::new(INTERNAL_ERROR, format!("Internal error: {detail}"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Value, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            result: None,
            error: Some(error),
        }
    }
}

/// What an inbound message turned out to be
#[derive(Debug)]
pub enum Incoming {
    /// Call expecting a response
    Request { id: Value, method: String, params: Option<Value> },
    /// Call without an id; never answered
    Notification { method: String },
    /// A response sent by the client; acknowledged and dropped
    ClientResponse,
    /// Malformed message, answered with the given error
    Invalid(JsonRpcResponse),
}

/// Classify a single JSON value received on the endpoint
pub fn classify(message: Value) -> Incoming {
    let Value::Object(ref object) = message else {
        return Incoming::Invalid(JsonRpcResponse::failure(
            Value::Null,
            JsonRpcError::invalid_request("message must be an object"),
        ));
    };

    if !object.contains_key("method") {
        if object.contains_key("result") || object.contains_key("error") {
            return Incoming::ClientResponse;
        }
        let id = object.get("id").cloned().unwrap_or(Value::Null);
        return Incoming::Invalid(JsonRpcResponse::failure(
            id,
            JsonRpcError::invalid_request("missing 'method'"),
        ));
    }

    let has_id = object.contains_key("id");
    let id = object.get("id").cloned().unwrap_or(Value::Null);
    let request: JsonRpcRequest = match serde_json::from_value(message) {
        Ok(request) => request,
        Err(e) => {
            return Incoming::Invalid(JsonRpcResponse::failure(
                id,
                JsonRpcError::invalid_request(e),
            ));
        }
    };

    if request.jsonrpc != JSONRPC_VERSION {
        return Incoming::Invalid(JsonRpcResponse::failure(
            id,
            JsonRpcError::invalid_request("'jsonrpc' must be \"2.0\""),
        ));
    }

    // serde maps an explicit null id to None, so presence is checked on the raw object
    match (request.id, has_id) {
        (Some(id), _) => Incoming::Request {
            id,
            method: request.method,
            params: request.params,
        },
        (None, true) => Incoming::Invalid(JsonRpcResponse::failure(
            Value::Null,
            JsonRpcError::invalid_request("'id' must not be null"),
        )),
        (None, false) => Incoming::Notification {
            method: request.method,
        },
    }
}
