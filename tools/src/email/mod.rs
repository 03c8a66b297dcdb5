//! Email tools. Send emails via SMTP.
//!
//! The `send_email` tool is registered once; the handle returned by the
//! registry backs the REST route while the registry itself serves the
//! tool-calling protocol.

pub mod send;

use std::sync::Arc;

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{json, Value};

use crate::registry::{RegistryError, ToolDescriptor, ToolFn, ToolOutput, ToolRegistry};

pub use send::{MailError, MailSender, MailTransport, SmtpMailer, SmtpSettings};

/// Tool name under which the mail-send operation is registered
pub const SEND_EMAIL_TOOL: &str = "send_email";

const SEND_EMAIL_DESCRIPTION: &str =
    "Send a plain-text email via SMTP. Input: {\"to\": \"recipient@email.com\", \"subject\": \"Subject line\", \"body\": \"Email body text\"}.";

/// A single email to transmit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailRequest {
    /// Recipient email address
    pub to: String,
    /// Email subject line
    pub subject: String,
    /// Email body (plain text)
    pub body: String,
}

/// Outcome of one send attempt.
///
/// Serializes as `{"status": "Email sent"}` or `{"error": "<message>"}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendResult {
    Success,
    Failure(String),
}

impl SendResult {
    pub fn is_success(&self) -> bool {
        matches!(self, SendResult::Success)
    }
}

impl Serialize for SendResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        match self {
            SendResult::Success => map.serialize_entry("status", "Email sent")?,
            SendResult::Failure(message) => map.serialize_entry("error", message)?,
        }
        map.end()
    }
}

impl ToolOutput for SendResult {
    fn is_error(&self) -> bool {
        !self.is_success()
    }
}

/// JSON Schema of [`EmailRequest`], shared by the tool listing and the API document
pub fn email_request_schema() -> Value {
    json!({
        "title": "EmailInput",
        "type": "object",
        "properties": {
            "to": { "title": "To", "type": "string" },
            "subject": { "title": "Subject", "type": "string" },
            "body": { "title": "Body", "type": "string" }
        },
        "required": ["to", "subject", "body"]
    })
}

/// Register email tools with the registry, returning the `send_email` handle
pub fn register_tools(
    reg: &mut ToolRegistry,
    sender: MailSender,
) -> Result<ToolFn<EmailRequest, SendResult>, RegistryError> {
    let sender = Arc::new(sender);
    reg.register(
        ToolDescriptor::new(SEND_EMAIL_TOOL, SEND_EMAIL_DESCRIPTION, email_request_schema()),
        move |request: EmailRequest| {
            let sender = Arc::clone(&sender);
            async move { sender.send(request).await }
        },
    )
}
