//! End-to-end tests against the composed application, with a fake transport
//! standing in for the SMTP relay.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::Router;
use mailbridge_gateway::routes::route_table;
use mailbridge_gateway::{build_app, GatewayConfig};
use mailbridge_tools::{EmailRequest, MailError, MailSender, MailTransport};
use serde_json::{json, Value};
use tower::ServiceExt;

const TOKEN: &str = "secret123";

#[derive(Default)]
struct FakeTransport {
    calls: AtomicUsize,
    fail_with: Option<String>,
}

impl FakeTransport {
    fn failing(message: &str) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_with: Some(message.to_string()),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl MailTransport for FakeTransport {
    fn deliver(&self, _request: &EmailRequest) -> Result<(), MailError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.fail_with {
            Some(message) => Err(MailError::Unavailable(message.clone())),
            None => Ok(()),
        }
    }
}

fn app_with(transport: Arc<FakeTransport>, cors: &[&str]) -> Router {
    let mut config = GatewayConfig::default();
    config.auth.bearer_token = TOKEN.to_string();
    config.server.cors_allow_origins = cors.iter().map(|o| o.to_string()).collect();
    build_app(&config, MailSender::new(transport)).unwrap()
}

fn app() -> (Router, Arc<FakeTransport>) {
    let transport = Arc::new(FakeTransport::default());
    (app_with(Arc::clone(&transport), &[]), transport)
}

fn post_json(path: &str, auth: Option<&str>, body: &Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(auth) = auth {
        builder = builder.header(header::AUTHORIZATION, auth);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(path: &str, auth: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(Method::GET).uri(path);
    if let Some(auth) = auth {
        builder = builder.header(header::AUTHORIZATION, auth);
    }
    builder.body(Body::empty()).unwrap()
}

fn bearer() -> Option<&'static str> {
    Some("Bearer secret123")
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, HeaderMap, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, headers, body)
}

fn email() -> Value {
    json!({ "to": "a@b.com", "subject": "Hi", "body": "Hello" })
}

fn tools_call(id: u64, arguments: Value) -> Value {
    json!({
        "jsonrpc": "2.0", "id": id, "method": "tools/call",
        "params": { "name": "send_email", "arguments": arguments }
    })
}

#[tokio::test]
async fn rest_send_with_valid_token() {
    let (app, transport) = app();
    let (status, headers, body) = send(&app, post_json("/send_email", bearer(), &email())).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "Email sent" }));
    assert_eq!(transport.calls(), 1);
    assert!(headers.contains_key("x-request-id"));
}

#[tokio::test]
async fn rest_send_with_wrong_token_never_sends() {
    let (app, transport) = app();
    let (status, headers, body) =
        send(&app, post_json("/send_email", Some("Bearer wrong"), &email())).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(headers.get(header::WWW_AUTHENTICATE).unwrap(), "Bearer");
    assert_eq!(body["detail"], "Invalid Bearer token");
    assert_eq!(transport.calls(), 0);
}

#[tokio::test]
async fn mcp_call_with_wrong_token_never_sends() {
    let (app, transport) = app();
    let (status, headers, body) =
        send(&app, post_json("/mcp", Some("Bearer wrong"), &tools_call(1, email()))).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(headers.get(header::WWW_AUTHENTICATE).unwrap(), "Bearer");
    assert_eq!(body["detail"], "Invalid Bearer token");
    assert_eq!(transport.calls(), 0);
}

#[tokio::test]
async fn padded_token_does_not_match() {
    let (app, transport) = app();

    for auth in ["Bearer secret123 ", "Bearer  secret123"] {
        let (status, _, _) = send(&app, post_json("/send_email", Some(auth), &email())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{auth:?}");
    }
    assert_eq!(transport.calls(), 0);
}

#[tokio::test]
async fn every_table_route_is_mounted() {
    let (app, transport) = app();

    for entry in route_table().unwrap().entries() {
        let request = if entry.method == Method::POST {
            post_json(entry.path, bearer(), &json!({}))
        } else {
            let mut request = get(entry.path, bearer());
            *request.method_mut() = entry.method.clone();
            request
        };
        let (status, _, _) = send(&app, request).await;
        assert_ne!(status, StatusCode::NOT_FOUND, "{} {}", entry.method, entry.path);
        assert_ne!(status, StatusCode::METHOD_NOT_ALLOWED, "{} {}", entry.method, entry.path);
    }
    assert_eq!(transport.calls(), 0);
}

#[tokio::test]
async fn every_non_public_path_requires_a_token() {
    let (app, transport) = app();

    let requests = vec![
        post_json("/send_email", None, &email()),
        post_json("/mcp", None, &tools_call(1, email())),
        get("/mcp", None),
        get("/send_email", None),
        get("/no/such/path", None),
        get("/docs/", None),
        post_json("/send_email", Some("Basic c2VjcmV0MTIz"), &email()),
    ];
    for request in requests {
        let uri = request.uri().clone();
        let (status, headers, _) = send(&app, request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri}");
        assert!(headers.contains_key(header::WWW_AUTHENTICATE), "{uri}");
    }
    assert_eq!(transport.calls(), 0);
}

#[tokio::test]
async fn documentation_is_public() {
    let (app, _) = app();

    let (status, _, doc) = send(&app, get("/openapi.json", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(doc["info"]["title"], "365-sacu-email-server");

    for path in ["/docs", "/docs/oauth2-redirect"] {
        let (status, _, body) = send(&app, get(path, None)).await;
        assert_eq!(status, StatusCode::OK, "{path}");
        assert!(body.as_str().unwrap().contains("<html"), "{path}");
    }
}

#[tokio::test]
async fn openapi_declares_one_global_bearer_scheme() {
    let (app, _) = app();
    let (_, _, doc) = send(&app, get("/openapi.json", None)).await;

    let schemes = doc["components"]["securitySchemes"].as_object().unwrap();
    assert_eq!(schemes.len(), 1);
    let scheme = schemes.values().next().unwrap();
    assert_eq!(scheme["type"], "http");
    assert_eq!(scheme["scheme"], "bearer");
    assert_eq!(doc["security"].as_array().unwrap().len(), 1);

    let mut paths: Vec<&String> = doc["paths"].as_object().unwrap().keys().collect();
    paths.sort();
    assert_eq!(paths, vec!["/mcp", "/send_email"]);
    assert_eq!(doc["paths"]["/send_email"]["post"]["tags"], json!(["MCP Tools"]));
}

#[tokio::test]
async fn rest_and_mcp_report_the_same_outcome() {
    let (app, transport) = app();

    let (_, _, rest) = send(&app, post_json("/send_email", bearer(), &email())).await;
    let (status, _, mcp) = send(&app, post_json("/mcp", bearer(), &tools_call(1, email()))).await;

    assert_eq!(status, StatusCode::OK);
    let result = &mcp["result"];
    assert_eq!(result["isError"], false);
    assert_eq!(result["structuredContent"], rest);
    let text: Value = serde_json::from_str(result["content"][0]["text"].as_str().unwrap()).unwrap();
    assert_eq!(text, rest);
    assert_eq!(transport.calls(), 2);
}

#[tokio::test]
async fn delivery_failure_is_signalled_on_both_surfaces() {
    let transport = Arc::new(FakeTransport::failing("relay refused connection"));
    let app = app_with(Arc::clone(&transport), &[]);

    let (status, _, rest) = send(&app, post_json("/send_email", bearer(), &email())).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        rest,
        json!({ "error": "Mail transport unavailable: relay refused connection" })
    );

    let (status, _, mcp) = send(&app, post_json("/mcp", bearer(), &tools_call(9, email()))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(mcp["id"], 9);
    assert_eq!(mcp["result"]["isError"], true);
    assert_eq!(mcp["result"]["structuredContent"], rest);
    assert_eq!(transport.calls(), 2);
}

#[tokio::test]
async fn identical_requests_send_twice() {
    let (app, transport) = app();

    let (_, _, first) = send(&app, post_json("/send_email", bearer(), &email())).await;
    let (_, _, second) = send(&app, post_json("/send_email", bearer(), &email())).await;

    assert_eq!(first, second);
    assert_eq!(transport.calls(), 2);
}

#[tokio::test]
async fn malformed_rest_body_is_rejected_before_sending() {
    let (app, transport) = app();
    let (status, _, body) = send(
        &app,
        post_json("/send_email", bearer(), &json!({ "to": "a@b.com" })),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["detail"].is_string());
    assert_eq!(transport.calls(), 0);
}

#[tokio::test]
async fn authenticated_unknown_path_is_not_found() {
    let (app, _) = app();
    let (status, _, body) = send(&app, get("/no/such/path", bearer())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({ "detail": "Not Found" }));

    let (status, _, _) = send(&app, get("/mcp", bearer())).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn mcp_handshake_and_listing() {
    let (app, _) = app();

    let (status, _, init) = send(
        &app,
        post_json(
            "/mcp",
            bearer(),
            &json!({
                "jsonrpc": "2.0", "id": 1, "method": "initialize",
                "params": { "protocolVersion": "2025-03-26", "capabilities": {},
                            "clientInfo": { "name": "it", "version": "1" } }
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(init["result"]["protocolVersion"], "2025-03-26");
    assert_eq!(init["result"]["serverInfo"]["name"], "365-email-server");

    let (status, _, body) = send(
        &app,
        post_json(
            "/mcp",
            bearer(),
            &json!({ "jsonrpc": "2.0", "method": "notifications/initialized" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body, Value::Null);

    let (_, _, list) = send(
        &app,
        post_json("/mcp", bearer(), &json!({ "jsonrpc": "2.0", "id": 2, "method": "tools/list" })),
    )
    .await;
    let tools = list["result"]["tools"].as_array().unwrap();
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0]["name"], "send_email");
    assert_eq!(tools[0]["inputSchema"]["required"], json!(["to", "subject", "body"]));
}

#[tokio::test]
async fn mcp_protocol_errors() {
    let (app, transport) = app();

    let (status, _, body) = send(
        &app,
        Request::builder()
            .method(Method::POST)
            .uri("/mcp")
            .header(header::AUTHORIZATION, "Bearer secret123")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], -32700);

    let (_, _, body) = send(
        &app,
        post_json(
            "/mcp",
            bearer(),
            &json!({ "jsonrpc": "2.0", "id": 3, "method": "prompts/list" }),
        ),
    )
    .await;
    assert_eq!(body["error"]["code"], -32601);

    let (_, _, body) = send(
        &app,
        post_json("/mcp", bearer(), &tools_call(4, json!({ "to": "a@b.com", "subject": "Hi" }))),
    )
    .await;
    assert_eq!(body["id"], 4);
    assert_eq!(body["error"]["code"], -32602);
    assert_eq!(transport.calls(), 0);
}

#[tokio::test]
async fn mcp_null_id_is_rejected() {
    let (app, _) = app();
    let (status, _, body) = send(
        &app,
        post_json("/mcp", bearer(), &json!({ "jsonrpc": "2.0", "id": null, "method": "ping" })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["id"], Value::Null);
    assert_eq!(body["error"]["code"], -32600);
}

#[tokio::test]
async fn mcp_batch_answers_requests_only() {
    let (app, transport) = app();
    let batch = json!([
        { "jsonrpc": "2.0", "id": 1, "method": "ping" },
        { "jsonrpc": "2.0", "method": "notifications/initialized" },
        tools_call(2, email())
    ]);

    let (status, _, body) = send(&app, post_json("/mcp", bearer(), &batch)).await;
    assert_eq!(status, StatusCode::OK);
    let responses = body.as_array().unwrap();
    assert_eq!(responses.len(), 2);
    assert_eq!(responses[0]["id"], 1);
    assert_eq!(responses[1]["result"]["isError"], false);
    assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn cors_preflight_skips_the_token_check() {
    let transport = Arc::new(FakeTransport::default());
    let app = app_with(transport, &["http://localhost:3000"]);

    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/send_email")
        .header(header::ORIGIN, "http://localhost:3000")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "authorization,content-type")
        .body(Body::empty())
        .unwrap();
    let (status, headers, _) = send(&app, request).await;

    assert!(status.is_success());
    assert_eq!(
        headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
        "http://localhost:3000"
    );
}
