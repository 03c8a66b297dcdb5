//! mailbridge gateway
//!
//! Serves the email tool over two surfaces sharing one registration: a REST
//! route and an MCP JSON-RPC endpoint. A single bearer-token layer guards
//! both; only the API documentation pages are public.

pub mod auth;
pub mod config;
pub mod mcp;
pub mod openapi;
pub mod routes;

pub use config::GatewayConfig;
pub use routes::{build_app, MCP_SERVER_NAME};
