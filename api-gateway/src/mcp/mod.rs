//! MCP endpoint: tool discovery and invocation over JSON-RPC
//!
//! Implements the request/response half of the streamable-HTTP transport:
//! clients POST JSON-RPC messages (single or batched) to `/mcp` and get
//! JSON back. Notifications and client responses are acknowledged with 202.
//! No server-initiated stream is offered, so GET is not routed.

pub mod jsonrpc;

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use mailbridge_tools::registry::{ToolCallError, ToolRegistry};
use mailbridge_tools::schema::parse_arguments;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::routes::{ResponseDoc, RouteEntry, SchemaDoc};
use jsonrpc::{Incoming, JsonRpcError, JsonRpcResponse};

pub const MCP_PATH: &str = "/mcp";

/// Protocol revisions this server can speak, newest first
pub const SUPPORTED_PROTOCOL_VERSIONS: [&str; 3] = ["2025-06-18", "2025-03-26", "2024-11-05"];

/// Result of handling one inbound message
#[derive(Debug)]
pub enum Reply {
    Response(JsonRpcResponse),
    Rejected(JsonRpcResponse),
    Accepted,
}

#[derive(Debug, Deserialize)]
struct CallToolParams {
    name: String,
    #[serde(default)]
    arguments: Option<Value>,
}

/// MCP server owning the tool registry
pub struct McpServer {
    name: String,
    version: String,
    registry: ToolRegistry,
}

impl McpServer {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            registry: ToolRegistry::new(),
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Mutable access for startup registration
    pub fn registry_mut(&mut self) -> &mut ToolRegistry {
        &mut self.registry
    }

    /// Routes this handler contributes to the application
    pub fn route_entries() -> Vec<RouteEntry> {
        vec![RouteEntry {
            path: MCP_PATH,
            method: Method::POST,
            summary: "MCP JSON-RPC endpoint",
            operation_id: "mcp_jsonrpc",
            tag: Some("MCP"),
            request_body: Some(SchemaDoc::new("JsonRpcMessage", jsonrpc_message_schema())),
            responses: vec![
                ResponseDoc::new(200, "JSON-RPC response", None),
                ResponseDoc::new(202, "Notification accepted", None),
                ResponseDoc::new(400, "Malformed JSON-RPC message", None),
            ],
            requires_auth: true,
        }]
    }

    /// Axum router serving [`MCP_PATH`]
    pub fn router<S>(self: Arc<Self>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        Router::new()
            .route(MCP_PATH, post(handle_post))
            .with_state(self)
    }

    /// Handle one JSON-RPC message
    pub async fn handle_message(&self, message: Value) -> Reply {
        match jsonrpc::classify(message) {
            Incoming::Request { id, method, params } => {
                let response = match self.dispatch(&method, params).await {
                    Ok(result) => JsonRpcResponse::success(id, result),
                    Err(error) => {
                        debug!("MCP {method} failed: {}", error.message);
                        JsonRpcResponse::failure(id, error)
                    }
                };
                Reply::Response(response)
            }
            Incoming::Notification { method } => {
                debug!("MCP notification: {method}");
                Reply::Accepted
            }
            Incoming::ClientResponse => Reply::Accepted,
            Incoming::Invalid(response) => Reply::Rejected(response),
        }
    }

    async fn dispatch(&self, method: &str, params: Option<Value>) -> Result<Value, JsonRpcError> {
        match method {
            "initialize" => Ok(self.initialize(params.as_ref())),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(json!({ "tools": self.registry.list_tools() })),
            "tools/call" => self.call_tool(params).await,
            other => Err(JsonRpcError::method_not_found(other)),
        }
    }

    fn initialize(&self, params: Option<&Value>) -> Value {
        let requested = params
            .and_then(|p| p.get("protocolVersion"))
            .and_then(Value::as_str);
        let version = negotiate_protocol_version(requested);
        info!(
            "MCP client initialized (requested protocol {}, using {version})",
            requested.unwrap_or("none")
        );

        json!({
            "protocolVersion": version,
            "capabilities": { "tools": { "listChanged": false } },
            "serverInfo": { "name": self.name, "version": self.version }
        })
    }

    async fn call_tool(&self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let params: CallToolParams = serde_json::from_value(params.unwrap_or(Value::Null))
            .map_err(JsonRpcError::invalid_params)?;

        info!("MCP tools/call: {}", params.name);
        let reply = self
            .registry
            .invoke(&params.name, parse_arguments(params.arguments))
            .await
            .map_err(|e| match e {
                ToolCallError::UnknownTool(_) | ToolCallError::InvalidArguments { .. } => {
                    JsonRpcError::invalid_params(e)
                }
                ToolCallError::Output { .. } => JsonRpcError::internal(e),
            })?;

        Ok(json!({
            "content": [{ "type": "text", "text": reply.payload.to_string() }],
            "structuredContent": reply.payload,
            "isError": reply.is_error
        }))
    }
}

/// Pick the protocol revision to answer `initialize` with
pub fn negotiate_protocol_version(requested: Option<&str>) -> &'static str {
    requested
        .and_then(|r| SUPPORTED_PROTOCOL_VERSIONS.iter().find(|v| **v == r))
        .copied()
        .unwrap_or(SUPPORTED_PROTOCOL_VERSIONS[0])
}

fn jsonrpc_message_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "jsonrpc": { "type": "string", "enum": ["2.0"] },
            "id": { "type": ["string", "integer"] },
            "method": { "type": "string" },
            "params": { "type": "object" }
        },
        "required": ["jsonrpc", "method"]
    })
}

async fn handle_post(State(server): State<Arc<McpServer>>, body: Bytes) -> Response {
    let message: Value = match serde_json::from_slice(&body) {
        Ok(message) => message,
        Err(e) => {
            let response = JsonRpcResponse::failure(Value::Null, JsonRpcError::parse_error(e));
            return (StatusCode::BAD_REQUEST, Json(response)).into_response();
        }
    };

    match message {
        Value::Array(batch) => {
            if batch.is_empty() {
                let response = JsonRpcResponse::failure(
                    Value::Null,
                    JsonRpcError::invalid_request("empty batch"),
                );
                return (StatusCode::BAD_REQUEST, Json(response)).into_response();
            }

            let mut responses = Vec::with_capacity(batch.len());
            for item in batch {
                match server.handle_message(item).await {
                    Reply::Response(r) | Reply::Rejected(r) => responses.push(r),
                    Reply::Accepted => {}
                }
            }

            if responses.is_empty() {
                StatusCode::ACCEPTED.into_response()
            } else {
                Json(responses).into_response()
            }
        }
        single => match server.handle_message(single).await {
            Reply::Response(r) => Json(r).into_response(),
            Reply::Rejected(r) => (StatusCode::BAD_REQUEST, Json(r)).into_response(),
            Reply::Accepted => StatusCode::ACCEPTED.into_response(),
        },
    }
}
