//! Route composition
//!
//! Every route is recorded in a [`RouteTable`] next to being mounted on the
//! axum router. The table feeds the OpenAPI document and is checked at
//! startup against the auth allow-list.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use mailbridge_tools::email::{self, email_request_schema, EmailRequest, MailSender, SendResult};
use mailbridge_tools::registry::ToolFn;
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::auth::{self, BearerAuth};
use crate::config::GatewayConfig;
use crate::mcp::McpServer;
use crate::openapi::ApiDocs;

pub const SEND_EMAIL_PATH: &str = "/send_email";

/// Server name announced to MCP clients
pub const MCP_SERVER_NAME: &str = "365-email-server";

/// Named JSON schema used in the API document
#[derive(Debug, Clone)]
pub struct SchemaDoc {
    pub name: &'static str,
    pub schema: Value,
}

impl SchemaDoc {
    pub fn new(name: &'static str, schema: Value) -> Self {
        Self { name, schema }
    }
}

#[derive(Debug, Clone)]
pub struct ResponseDoc {
    pub status: u16,
    pub description: &'static str,
    pub schema: Option<SchemaDoc>,
}

impl ResponseDoc {
    pub fn new(status: u16, description: &'static str, schema: Option<SchemaDoc>) -> Self {
        Self {
            status,
            description,
            schema,
        }
    }
}

/// One reachable endpoint
#[derive(Debug, Clone)]
pub struct RouteEntry {
    pub path: &'static str,
    pub method: Method,
    pub summary: &'static str,
    pub operation_id: &'static str,
    pub tag: Option<&'static str>,
    pub request_body: Option<SchemaDoc>,
    pub responses: Vec<ResponseDoc>,
    pub requires_auth: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum RouteTableError {
    #[error("route {method} {path} is registered twice")]
    Duplicate { method: Method, path: &'static str },
    #[error("route {path} is marked public but is not on the auth allow-list")]
    PublicNotAllowListed { path: &'static str },
    #[error("route {path} requires auth but its path is on the auth allow-list")]
    ProtectedOnAllowList { path: &'static str },
}

/// Ordered list of every endpoint the application serves
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    entries: Vec<RouteEntry>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry, rejecting duplicates and entries that disagree with the allow-list
    pub fn push(&mut self, entry: RouteEntry) -> Result<(), RouteTableError> {
        if self
            .entries
            .iter()
            .any(|e| e.path == entry.path && e.method == entry.method)
        {
            return Err(RouteTableError::Duplicate {
                method: entry.method,
                path: entry.path,
            });
        }

        match (entry.requires_auth, auth::is_public_path(entry.path)) {
            (false, false) => {
                return Err(RouteTableError::PublicNotAllowListed { path: entry.path })
            }
            (true, true) => {
                return Err(RouteTableError::ProtectedOnAllowList { path: entry.path })
            }
            _ => {}
        }

        self.entries.push(entry);
        Ok(())
    }

    pub fn extend(
        &mut self,
        entries: impl IntoIterator<Item = RouteEntry>,
    ) -> Result<(), RouteTableError> {
        for entry in entries {
            self.push(entry)?;
        }
        Ok(())
    }

    pub fn entries(&self) -> &[RouteEntry] {
        &self.entries
    }
}

/// State for the REST route
#[derive(Clone)]
struct AppState {
    send_email: ToolFn<EmailRequest, SendResult>,
}

fn send_email_entry() -> RouteEntry {
    RouteEntry {
        path: SEND_EMAIL_PATH,
        method: Method::POST,
        summary: "Send Email",
        operation_id: "send_email_route",
        tag: Some("MCP Tools"),
        request_body: Some(SchemaDoc::new("EmailInput", email_request_schema())),
        responses: vec![
            ResponseDoc::new(
                200,
                "Email sent",
                Some(SchemaDoc::new(
                    "SendSuccess",
                    json!({
                        "type": "object",
                        "properties": { "status": { "type": "string", "const": "Email sent" } },
                        "required": ["status"]
                    }),
                )),
            ),
            ResponseDoc::new(
                422,
                "Malformed request body",
                Some(SchemaDoc::new(
                    "HTTPError",
                    json!({
                        "type": "object",
                        "properties": { "detail": { "type": "string" } },
                        "required": ["detail"]
                    }),
                )),
            ),
            ResponseDoc::new(
                500,
                "Delivery failed",
                Some(SchemaDoc::new(
                    "SendFailure",
                    json!({
                        "type": "object",
                        "properties": { "error": { "type": "string" } },
                        "required": ["error"]
                    }),
                )),
            ),
        ],
        requires_auth: true,
    }
}

async fn send_email_route(
    State(state): State<AppState>,
    payload: Result<Json<EmailRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            return (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({ "detail": rejection.body_text() })),
            )
                .into_response();
        }
    };

    let result = state.send_email.call(request).await;
    let status = if result.is_success() {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(result)).into_response()
}

async fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(json!({ "detail": "Not Found" }))).into_response()
}

fn cors_layer(origins: &[String]) -> Result<CorsLayer> {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    if origins.iter().any(|o| o == "*") {
        return Ok(layer.allow_origin(Any));
    }

    let origins = origins
        .iter()
        .map(|o| {
            HeaderValue::from_str(o).with_context(|| format!("Invalid CORS origin: {o}"))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(layer.allow_origin(origins))
}

/// Every route the application mounts, in mount order
pub fn route_table() -> Result<RouteTable, RouteTableError> {
    let mut table = RouteTable::new();
    table.push(send_email_entry())?;
    table.extend(McpServer::route_entries())?;
    table.extend(ApiDocs::route_entries())?;
    Ok(table)
}

/// Compose the full application.
///
/// Registers the email tool once, mounts the REST route on the returned
/// handle, merges the MCP and docs routers, and wraps everything in the
/// bearer gate.
pub fn build_app(config: &GatewayConfig, sender: MailSender) -> Result<Router> {
    let mut mcp = McpServer::new(MCP_SERVER_NAME, env!("CARGO_PKG_VERSION"));
    let send_email = email::register_tools(mcp.registry_mut(), sender)
        .context("Failed to register email tools")?;

    let table = route_table()?;
    info!(
        "Route table: {} routes, {} tools",
        table.entries().len(),
        mcp.registry().tool_count()
    );

    let docs = Arc::new(ApiDocs::new(table));
    let auth = BearerAuth::new(&config.auth.bearer_token);

    let app = Router::new()
        .route(SEND_EMAIL_PATH, post(send_email_route))
        .merge(Arc::new(mcp).router())
        .merge(docs.router())
        .fallback(not_found)
        .with_state(AppState { send_email })
        .layer(middleware::from_fn_with_state(auth, auth::require_bearer))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid));

    if config.server.cors_allow_origins.is_empty() {
        Ok(app)
    } else {
        // Outside the gate so pre-flight requests are answered without a token
        Ok(app.layer(cors_layer(&config.server.cors_allow_origins)?))
    }
}
