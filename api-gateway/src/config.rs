//! Gateway configuration loading and validation
//!
//! Settings are read from a TOML file (`$MAILBRIDGE_CONFIG`, default
//! /etc/mailbridge/config.toml) and then overridden from the environment.
//! Everything is validated once at startup; a missing secret is fatal.

use std::fmt;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use mailbridge_tools::SmtpSettings;
use serde::Deserialize;

const DEFAULT_CONFIG_PATH: &str = "/etc/mailbridge/config.toml";

pub const ENV_CONFIG_PATH: &str = "MAILBRIDGE_CONFIG";
pub const ENV_BIND: &str = "MAILBRIDGE_BIND";
pub const ENV_BEARER_TOKEN: &str = "MCP_BEARER_TOKEN";
pub const ENV_MAIL_SERVER: &str = "MAIL_SERVER";
pub const ENV_MAIL_PORT: &str = "MAIL_PORT";
pub const ENV_MAIL_USERNAME: &str = "MAIL_USERNAME";
pub const ENV_MAIL_PASSWORD: &str = "MAIL_PASSWORD";
pub const ENV_MAIL_FROM: &str = "MAIL_FROM";

/// Root configuration structure
#[derive(Debug, Default, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub mail: SmtpSettings,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
    /// Origins allowed to call the gateway from a browser; empty disables CORS
    #[serde(default)]
    pub cors_allow_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            log_level: default_log_level(),
            log_format: LogFormat::default(),
            cors_allow_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

#[derive(Clone, Default, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub bearer_token: String,
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("bearer_token", &"<redacted>")
            .finish()
    }
}

fn default_bind() -> String { "0.0.0.0:8000".into() }
fn default_log_level() -> String { "info".into() }

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required setting '{0}'")]
    Missing(&'static str),
    #[error("invalid value for '{key}': {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl GatewayConfig {
    /// Apply environment overrides on top of file settings
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup(ENV_BIND) {
            self.server.bind = v;
        }
        if let Some(v) = lookup(ENV_BEARER_TOKEN) {
            self.auth.bearer_token = v;
        }
        if let Some(v) = lookup(ENV_MAIL_SERVER) {
            self.mail.host = v;
        }
        if let Some(v) = lookup(ENV_MAIL_PORT) {
            self.mail.port = v.trim().parse().map_err(|e| ConfigError::Invalid {
                key: ENV_MAIL_PORT,
                reason: format!("{e}"),
            })?;
        }
        if let Some(v) = lookup(ENV_MAIL_USERNAME) {
            self.mail.username = v;
        }
        if let Some(v) = lookup(ENV_MAIL_PASSWORD) {
            self.mail.password = v;
        }
        if let Some(v) = lookup(ENV_MAIL_FROM) {
            self.mail.from_address = v;
        }
        Ok(())
    }

    /// Check that every required setting is present
    pub fn validate(&self) -> Result<(), ConfigError> {
        let token = &self.auth.bearer_token;
        if token.trim().is_empty() {
            return Err(ConfigError::Missing("auth.bearer_token"));
        }
        if token.trim() != token {
            return Err(ConfigError::Invalid {
                key: "auth.bearer_token",
                reason: "token must not have leading or trailing whitespace".into(),
            });
        }
        if self.mail.host.is_empty() {
            return Err(ConfigError::Missing("mail.host"));
        }
        if self.mail.username.is_empty() {
            return Err(ConfigError::Missing("mail.username"));
        }
        if self.mail.password.is_empty() {
            return Err(ConfigError::Missing("mail.password"));
        }
        if self.mail.port == 0 {
            return Err(ConfigError::Invalid {
                key: "mail.port",
                reason: "port must be non-zero".into(),
            });
        }
        self.bind_addr()?;
        Ok(())
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.server.bind.parse().map_err(|e| ConfigError::Invalid {
            key: "server.bind",
            reason: format!("{e}"),
        })
    }
}

/// Config file location, `$MAILBRIDGE_CONFIG` or the default path
pub fn config_path() -> PathBuf {
    std::env::var_os(ENV_CONFIG_PATH)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Load configuration from a file path and an environment lookup.
///
/// A missing file is not an error; the environment alone may supply every
/// required setting.
pub fn load_config_from<F>(path: &Path, lookup: F) -> Result<GatewayConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = if path.exists() {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        toml::from_str::<GatewayConfig>(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))?
    } else {
        GatewayConfig::default()
    };

    config.apply_env(lookup)?;
    config.validate()?;
    Ok(config)
}
