//! Tool Registry: stores tool definitions and dispatches calls to them
//!
//! A tool is registered once, as a descriptor plus a typed async handler.
//! The registry keeps a type-erased wrapper around that handler for
//! protocol dispatch (JSON arguments in, JSON payload out) and hands the
//! typed handler back to the caller, so both entry points run the same code.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use jsonschema::Validator;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::schema;

/// Boxed future returned by tool handlers
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// Outcome type produced by a tool handler
pub trait ToolOutput: Serialize {
    /// Whether the outcome represents a failed execution
    fn is_error(&self) -> bool;
}

/// Tool definition as advertised to protocol clients
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

impl ToolDescriptor {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }
}

/// Serialized result of a protocol-dispatched call
#[derive(Debug, Clone, PartialEq)]
pub struct ToolReply {
    pub payload: Value,
    pub is_error: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("tool '{0}' is already registered")]
    Duplicate(String),
    #[error("tool '{name}' has an invalid input schema: {reason}")]
    InvalidSchema { name: String, reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum ToolCallError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),
    #[error("Invalid arguments for tool '{name}': {reason}")]
    InvalidArguments { name: String, reason: String },
    #[error("Tool '{name}' returned an unserializable result: {reason}")]
    Output { name: String, reason: String },
}

type TypedHandler<I, O> = Arc<dyn Fn(I) -> BoxFuture<O> + Send + Sync>;
type ErasedHandler =
    Arc<dyn Fn(Value) -> BoxFuture<Result<ToolReply, ToolCallError>> + Send + Sync>;

/// Typed handle to a registered tool, callable outside protocol dispatch
pub struct ToolFn<I, O> {
    name: Arc<str>,
    handler: TypedHandler<I, O>,
}

impl<I, O> Clone for ToolFn<I, O> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            handler: Arc::clone(&self.handler),
        }
    }
}

impl<I, O> fmt::Debug for ToolFn<I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolFn").field("name", &self.name).finish()
    }
}

impl<I, O> ToolFn<I, O> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the tool's handler directly
    pub async fn call(&self, input: I) -> O {
        (self.handler)(input).await
    }
}

struct RegisteredTool {
    descriptor: ToolDescriptor,
    validator: Validator,
    handler: ErasedHandler,
}

/// In-memory tool registry, populated at startup and read-only afterwards
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, RegisteredTool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool and return a typed handle to its handler.
    ///
    /// Names are unique: a second registration under the same name is
    /// rejected and leaves the first one in place.
    pub fn register<I, O, F, Fut>(
        &mut self,
        descriptor: ToolDescriptor,
        handler: F,
    ) -> Result<ToolFn<I, O>, RegistryError>
    where
        I: DeserializeOwned + Send + 'static,
        O: ToolOutput + Send + 'static,
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = O> + Send + 'static,
    {
        if self.tools.contains_key(&descriptor.name) {
            return Err(RegistryError::Duplicate(descriptor.name));
        }

        let validator = schema::compile_schema(&descriptor.input_schema).map_err(|reason| {
            RegistryError::InvalidSchema {
                name: descriptor.name.clone(),
                reason,
            }
        })?;

        let name: Arc<str> = Arc::from(descriptor.name.as_str());
        let typed: TypedHandler<I, O> = Arc::new(move |input: I| -> BoxFuture<O> {
            Box::pin(handler(input))
        });
        let handler = erase(Arc::clone(&name), Arc::clone(&typed));

        info!("Registered tool: {}", descriptor.name);
        self.tools.insert(
            descriptor.name.clone(),
            RegisteredTool {
                descriptor,
                validator,
                handler,
            },
        );

        Ok(ToolFn { name, handler: typed })
    }

    /// Get a tool definition by name
    pub fn get_tool(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.get(name).map(|t| &t.descriptor)
    }

    /// List all tool definitions, ordered by name
    pub fn list_tools(&self) -> Vec<&ToolDescriptor> {
        self.tools.values().map(|t| &t.descriptor).collect()
    }

    pub fn tool_count(&self) -> usize {
        self.tools.len()
    }

    /// Validate JSON arguments against the tool's schema and run it
    pub async fn invoke(&self, name: &str, arguments: Value) -> Result<ToolReply, ToolCallError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ToolCallError::UnknownTool(name.to_string()))?;

        schema::validate_input(&tool.validator, &arguments).map_err(|reason| {
            ToolCallError::InvalidArguments {
                name: name.to_string(),
                reason,
            }
        })?;

        debug!(tool = name, "Dispatching tool call");
        (tool.handler)(arguments).await
    }
}

/// Wrap a typed handler so it accepts and returns JSON
fn erase<I, O>(name: Arc<str>, typed: TypedHandler<I, O>) -> ErasedHandler
where
    I: DeserializeOwned + Send + 'static,
    O: ToolOutput + Send + 'static,
{
    Arc::new(move |arguments: Value| -> BoxFuture<Result<ToolReply, ToolCallError>> {
        let name = Arc::clone(&name);
        let typed = Arc::clone(&typed);
        Box::pin(async move {
            let input: I = serde_json::from_value(arguments).map_err(|e| {
                ToolCallError::InvalidArguments {
                    name: name.to_string(),
                    reason: e.to_string(),
                }
            })?;

            let output = typed(input).await;
            let is_error = output.is_error();
            let payload = serde_json::to_value(&output).map_err(|e| ToolCallError::Output {
                name: name.to_string(),
                reason: e.to_string(),
            })?;

            Ok(ToolReply { payload, is_error })
        })
    })
}
