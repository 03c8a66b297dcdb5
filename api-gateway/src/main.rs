//! mailbridge gateway binary
//!
//! Loads and validates configuration, then serves the REST and MCP surfaces
//! until SIGINT or SIGTERM.

use std::sync::Arc;

use anyhow::{Context, Result};
use mailbridge_gateway::config::{self, GatewayConfig, LogFormat, ServerConfig};
use mailbridge_tools::{MailSender, SmtpMailer};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("FATAL: mailbridge gateway failed to start: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let config_path = config::config_path();
    let config: GatewayConfig = config::load_config_from(&config_path, |key| {
        std::env::var(key).ok()
    })
    .context("Invalid configuration")?;

    init_logging(&config.server)?;
    info!("mailbridge gateway v{} starting...", env!("CARGO_PKG_VERSION"));
    if !config_path.exists() {
        warn!(
            "Config file not found at {}, using defaults and environment",
            config_path.display()
        );
    }
    info!(
        "SMTP relay {}:{} as {}",
        config.mail.host,
        config.mail.port,
        config.mail.sender_address()
    );

    let sender = MailSender::new(Arc::new(SmtpMailer::new(config.mail.clone())));
    let app = mailbridge_gateway::build_app(&config, sender)?;

    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Gateway listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Gateway server failed")?;

    info!("mailbridge gateway stopped");
    Ok(())
}

fn init_logging(server: &ServerConfig) -> Result<()> {
    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&server.log_level))
        .with_context(|| format!("Invalid log level '{}'", server.log_level))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true);

    match server.log_format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Json => builder.json().try_init(),
    }
    .map_err(|e| anyhow::anyhow!("Failed to set tracing subscriber: {e}"))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for SIGINT: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("Shutdown signal received, draining connections");
}
