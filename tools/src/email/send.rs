//! Deliver one email over an authenticated SMTP session
//!
//! Every call opens its own session (STARTTLS, or implicit TLS on port 465),
//! authenticates, transmits and closes. Sessions are never pooled.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use lettre::address::AddressError;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, Message, SmtpTransport, Transport};
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::{EmailRequest, SendResult};

/// SMTP relay settings
#[derive(Clone, Deserialize)]
pub struct SmtpSettings {
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Sender address; falls back to `username` when empty
    #[serde(default)]
    pub from_address: String,
    #[serde(default)]
    pub from_name: Option<String>,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

fn default_port() -> u16 {
    587
}

fn default_timeout() -> u64 {
    30
}

impl Default for SmtpSettings {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_port(),
            username: String::new(),
            password: String::new(),
            from_address: String::new(),
            from_name: None,
            timeout_seconds: default_timeout(),
        }
    }
}

impl fmt::Debug for SmtpSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("from_address", &self.from_address)
            .field("from_name", &self.from_name)
            .field("timeout_seconds", &self.timeout_seconds)
            .finish()
    }
}

impl SmtpSettings {
    /// Address used in the `From` header
    pub fn sender_address(&self) -> &str {
        if self.from_address.is_empty() {
            &self.username
        } else {
            &self.from_address
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("Invalid '{field}' address: {source}")]
    Address {
        field: &'static str,
        #[source]
        source: AddressError,
    },
    #[error("Failed to build email message: {0}")]
    Build(#[from] lettre::error::Error),
    #[error("SMTP send failed: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
    #[error("Mail transport unavailable: {0}")]
    Unavailable(String),
}

/// Blocking mail transport; one call is one complete delivery attempt
pub trait MailTransport: Send + Sync + 'static {
    fn deliver(&self, request: &EmailRequest) -> Result<(), MailError>;
}

/// Build the plain-text message for a request
pub fn build_message(from: Mailbox, request: &EmailRequest) -> Result<Message, MailError> {
    let to: Mailbox = request
        .to
        .parse()
        .map_err(|source| MailError::Address { field: "to", source })?;

    let message = Message::builder()
        .from(from)
        .to(to)
        .subject(request.subject.clone())
        .header(ContentType::TEXT_PLAIN)
        .body(request.body.clone())?;

    Ok(message)
}

/// SMTP transport backed by lettre
pub struct SmtpMailer {
    settings: SmtpSettings,
}

impl SmtpMailer {
    pub fn new(settings: SmtpSettings) -> Self {
        Self { settings }
    }

    fn sender_mailbox(&self) -> Result<Mailbox, MailError> {
        let address: Address = self
            .settings
            .sender_address()
            .parse()
            .map_err(|source| MailError::Address { field: "from", source })?;
        Ok(Mailbox::new(self.settings.from_name.clone(), address))
    }

    fn open_transport(&self) -> Result<SmtpTransport, MailError> {
        let creds = Credentials::new(
            self.settings.username.clone(),
            self.settings.password.clone(),
        );

        let builder = if self.settings.port == 465 {
            // Implicit TLS (SMTPS on port 465)
            SmtpTransport::relay(&self.settings.host)?
        } else {
            SmtpTransport::starttls_relay(&self.settings.host)?
        };

        Ok(builder
            .port(self.settings.port)
            .credentials(creds)
            .timeout(Some(Duration::from_secs(self.settings.timeout_seconds)))
            .build())
    }
}

impl MailTransport for SmtpMailer {
    fn deliver(&self, request: &EmailRequest) -> Result<(), MailError> {
        let message = build_message(self.sender_mailbox()?, request)?;

        // The transport lives only for this call; the session closes when it drops
        let transport = self.open_transport()?;
        let response = transport.send(&message)?;

        debug!(
            "SMTP server accepted message: {} {}",
            response.code(),
            response.message().collect::<Vec<&str>>().join(" ")
        );
        Ok(())
    }
}

/// Async front for a [`MailTransport`], turning every failure into a [`SendResult`]
#[derive(Clone)]
pub struct MailSender {
    transport: Arc<dyn MailTransport>,
}

impl MailSender {
    pub fn new(transport: Arc<dyn MailTransport>) -> Self {
        Self { transport }
    }

    pub async fn send(&self, request: EmailRequest) -> SendResult {
        let transport = Arc::clone(&self.transport);
        let recipient = request.to.clone();

        let outcome = tokio::task::spawn_blocking(move || transport.deliver(&request))
            .await
            .unwrap_or_else(|e| Err(MailError::Unavailable(e.to_string())));

        match outcome {
            Ok(()) => {
                info!("Email sent to {recipient}");
                SendResult::Success
            }
            Err(e) => {
                warn!("Email to {recipient} failed: {e}");
                SendResult::Failure(e.to_string())
            }
        }
    }
}
