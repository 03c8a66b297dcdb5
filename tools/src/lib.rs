//! mailbridge tools: tool registration and the email tool
//!
//! Tools are registered once into a [`registry::ToolRegistry`]. The registry
//! serves protocol dispatch (JSON in, JSON out) and hands back a typed handle
//! for conventional callers, so a tool has exactly one implementation.

pub mod email;
pub mod registry;
pub mod schema;

pub use email::{
    EmailRequest, MailError, MailSender, MailTransport, SendResult, SmtpMailer, SmtpSettings,
};
pub use registry::{
    RegistryError, ToolCallError, ToolDescriptor, ToolFn, ToolOutput, ToolRegistry, ToolReply,
};
