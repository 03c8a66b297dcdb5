//! API description document and interactive docs pages
//!
//! The OpenAPI document is generated from the route table the first time it
//! is requested and reused for the rest of the process lifetime. It declares
//! a single HTTP bearer security scheme applied globally.

use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

use axum::{
    extract::State,
    http::Method,
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::routes::{RouteEntry, RouteTable};

pub const OPENAPI_PATH: &str = "/openapi.json";
pub const DOCS_PATH: &str = "/docs";
pub const OAUTH2_REDIRECT_PATH: &str = "/docs/oauth2-redirect";

pub const API_TITLE: &str = "365-sacu-email-server";
pub const API_DESCRIPTION: &str =
    "Email tool secured via bearer authentication, reachable over REST and MCP.";
pub const SECURITY_SCHEME: &str = "bearerAuth";

/// Lazily built, process-lifetime API document
pub struct ApiDocs {
    routes: RouteTable,
    document: OnceLock<Value>,
}

impl ApiDocs {
    pub fn new(routes: RouteTable) -> Self {
        Self {
            routes,
            document: OnceLock::new(),
        }
    }

    /// The document, built on first use
    pub fn document(&self) -> &Value {
        self.document.get_or_init(|| {
            debug!("Generating OpenAPI document");
            build_document(&self.routes)
        })
    }

    /// Documentation routes, all of them public
    pub fn route_entries() -> Vec<RouteEntry> {
        [
            (OPENAPI_PATH, "OpenAPI document", "openapi"),
            (DOCS_PATH, "Swagger UI", "swagger_ui"),
            (OAUTH2_REDIRECT_PATH, "Swagger UI OAuth2 redirect", "swagger_ui_redirect"),
        ]
        .into_iter()
        .map(|(path, summary, operation_id)| RouteEntry {
            path,
            method: Method::GET,
            summary,
            operation_id,
            tag: None,
            request_body: None,
            responses: Vec::new(),
            requires_auth: false,
        })
        .collect()
    }

    pub fn router<S>(self: Arc<Self>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        Router::new()
            .route(OPENAPI_PATH, get(openapi_json))
            .route(DOCS_PATH, get(swagger_ui))
            .route(OAUTH2_REDIRECT_PATH, get(swagger_ui_redirect))
            .with_state(self)
    }
}

/// Build the OpenAPI 3.1 document for every authenticated route
pub fn build_document(routes: &RouteTable) -> Value {
    let mut paths: BTreeMap<&str, Map<String, Value>> = BTreeMap::new();
    let mut schemas = Map::new();

    for entry in routes.entries().iter().filter(|e| e.requires_auth) {
        let mut operation = Map::new();
        operation.insert("summary".into(), json!(entry.summary));
        operation.insert("operationId".into(), json!(entry.operation_id));
        if let Some(tag) = entry.tag {
            operation.insert("tags".into(), json!([tag]));
        }

        if let Some(body) = &entry.request_body {
            schemas.insert(body.name.to_string(), body.schema.clone());
            operation.insert(
                "requestBody".into(),
                json!({
                    "required": true,
                    "content": { "application/json": { "schema": schema_ref(body.name) } }
                }),
            );
        }

        let mut responses = Map::new();
        for response in &entry.responses {
            let mut doc = Map::new();
            doc.insert("description".into(), json!(response.description));
            if let Some(schema) = &response.schema {
                schemas.insert(schema.name.to_string(), schema.schema.clone());
                doc.insert(
                    "content".into(),
                    json!({ "application/json": { "schema": schema_ref(schema.name) } }),
                );
            }
            responses.insert(response.status.to_string(), Value::Object(doc));
        }
        responses.insert(
            "401".into(),
            json!({ "description": "Missing or invalid bearer token" }),
        );
        operation.insert("responses".into(), Value::Object(responses));

        paths
            .entry(entry.path)
            .or_default()
            .insert(entry.method.as_str().to_ascii_lowercase(), Value::Object(operation));
    }

    json!({
        "openapi": "3.1.0",
        "info": {
            "title": API_TITLE,
            "version": env!("CARGO_PKG_VERSION"),
            "description": API_DESCRIPTION
        },
        "paths": paths,
        "components": {
            "schemas": schemas,
            "securitySchemes": {
                SECURITY_SCHEME: { "type": "http", "scheme": "bearer" }
            }
        },
        "security": [{ SECURITY_SCHEME: [] }]
    })
}

fn schema_ref(name: &str) -> Value {
    json!({ "$ref": format!("#/components/schemas/{name}") })
}

async fn openapi_json(State(docs): State<Arc<ApiDocs>>) -> Response {
    Json(docs.document().clone()).into_response()
}

async fn swagger_ui() -> Html<String> {
    Html(format!(
        r#"<!DOCTYPE html>
<html>
<head>
<link type="text/css" rel="stylesheet" href="https://cdn.jsdelivr.net/npm/swagger-ui-dist@5/swagger-ui.css">
<title>{API_TITLE} - Swagger UI</title>
</head>
<body>
<div id="swagger-ui"></div>
<script src="https://cdn.jsdelivr.net/npm/swagger-ui-dist@5/swagger-ui-bundle.js"></script>
<script>
const ui = SwaggerUIBundle({{
    url: '{OPENAPI_PATH}',
    dom_id: '#swagger-ui',
    layout: 'BaseLayout',
    deepLinking: true,
    showExtensions: true,
    showCommonExtensions: true,
    oauth2RedirectUrl: window.location.origin + '{OAUTH2_REDIRECT_PATH}',
    presets: [SwaggerUIBundle.presets.apis, SwaggerUIBundle.SwaggerUIStandalonePreset],
}})
</script>
</body>
</html>"#
    ))
}

async fn swagger_ui_redirect() -> Html<&'static str> {
    Html(OAUTH2_REDIRECT_HTML)
}

const OAUTH2_REDIRECT_HTML: &str = r#"<!doctype html>
<html lang="en-US">
<head>
    <title>Swagger UI: OAuth2 Redirect</title>
</head>
<body>
<script>
    'use strict';
    function run () {
        var oauth2 = window.opener.swaggerUIRedirectOauth2;
        var sentState = oauth2.state;
        var redirectUrl = oauth2.redirectUrl;
        var isValid, qp, arr;

        if (/code|token|error/.test(window.location.hash)) {
            qp = window.location.hash.substring(1).replace('?', '&');
        } else {
            qp = location.search.substring(1);
        }

        arr = qp.split("&");
        arr.forEach(function (v,i,_arr) { _arr[i] = '"' + v.replace('=', '":"') + '"';});
        qp = qp ? JSON.parse('{' + arr.join() + '}',
                function (key, value) {
                    return key === "" ? value : decodeURIComponent(value);
                }
        ) : {};

        isValid = qp.state === sentState;

        if ((
          oauth2.auth.schema.get("flow") === "accessCode" ||
          oauth2.auth.schema.get("flow") === "authorizationCode" ||
          oauth2.auth.schema.get("flow") === "authorization_code"
        ) && !oauth2.auth.code) {
            if (!isValid) {
                oauth2.errCb({
                    authId: oauth2.auth.name,
                    source: "auth",
                    level: "warning",
                    message: "Authorization may be unsafe, passed state was changed in server. The passed state wasn't returned from auth server."
                });
            }

            if (qp.code) {
                delete oauth2.state;
                oauth2.auth.code = qp.code;
                oauth2.callback({auth: oauth2.auth, redirectUrl: redirectUrl});
            } else {
                let oauthErrorMsg;
                if (qp.error) {
                    oauthErrorMsg = "["+qp.error+"]: " +
                        (qp.error_description ? qp.error_description+ ". " : "no accessCode received from the server. ") +
                        (qp.error_uri ? "More info: "+qp.error_uri : "");
                }

                oauth2.errCb({
                    authId: oauth2.auth.name,
                    source: "auth",
                    level: "error",
                    message: oauthErrorMsg || "[Authorization failed]: no accessCode received from the server."
                });
            }
        } else {
            oauth2.callback({auth: oauth2.auth, token: qp, isValid: isValid, redirectUrl: redirectUrl});
        }
        window.close();
    }

    if (document.readyState !== 'loading') {
        run();
    } else {
        document.addEventListener('DOMContentLoaded', function () {
            run();
        });
    }
</script>
</body>
</html>"#;
