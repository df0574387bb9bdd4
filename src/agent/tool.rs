//! Tools and the registry the agent picks them from.
//!
//! A [`Tool`] takes a plain string and returns a plain string. Tools are registered once into
//! a [`ToolRegistry`] and looked up by exact name; the registry never exposes a way to add or
//! remove tools afterwards.
//!
//! ```rust
//! use groundwork::agent::{FunctionTool, ToolRegistry};
//!
//! # async fn demo() -> groundwork::error::Result<()> {
//! let registry = ToolRegistry::builder()
//!     .register(FunctionTool::new("shout", "Upper-case the input.", |input: &str| {
//!         Ok(input.to_uppercase())
//!     }))?
//!     .build();
//!
//! assert_eq!(registry.invoke("shout", "hi").await, "HI");
//! assert!(registry.invoke("Shout", "hi").await.starts_with("Error:"));
//! # Ok(()) }
//! ```

use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::HashSet;
use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::error::{Error, Result};

/// Why a tool call failed. Rendered into the observation the model sees.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("could not parse the page: {0}")]
    Parse(String),

    #[error("no results: {0}")]
    EmptyResult(String),

    #[error("{0}")]
    Failed(String),
}

/// A named capability the agent can call.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name the model uses in `Action:` lines.
    fn name(&self) -> &str;

    /// One or two sentences telling the model when to use the tool.
    fn description(&self) -> &str;

    /// JSON schema of the expected input; a bare string by default.
    fn input_schema(&self) -> Value {
        json!({"type": "string"})
    }

    async fn invoke(&self, input: &str) -> std::result::Result<String, ToolError>;
}

/// Immutable set of tools, in registration order.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

#[derive(Default)]
pub struct ToolRegistryBuilder {
    tools: Vec<Arc<dyn Tool>>,
    names: HashSet<String>,
}

impl ToolRegistryBuilder {
    /// # Errors
    /// [`Error::Config`] if a tool with the same name is already registered.
    pub fn register(self, tool: impl Tool + 'static) -> Result<Self> {
        self.register_arc(Arc::new(tool))
    }

    pub fn register_arc(mut self, tool: Arc<dyn Tool>) -> Result<Self> {
        let name = tool.name().to_string();
        if name.trim().is_empty() {
            return Err(Error::Config("tool names must not be empty".into()));
        }
        if !self.names.insert(name.clone()) {
            return Err(Error::Config(format!("tool `{name}` is registered twice")));
        }
        self.tools.push(tool);
        Ok(self)
    }

    pub fn build(self) -> ToolRegistry {
        ToolRegistry { tools: self.tools }
    }
}

impl ToolRegistry {
    pub fn builder() -> ToolRegistryBuilder {
        ToolRegistryBuilder::default()
    }

    /// Exact, case-sensitive lookup.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|tool| tool.name() == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|tool| tool.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Tool list as shown to the model.
    pub fn describe(&self) -> String {
        self.tools
            .iter()
            .map(|tool| {
                format!(
                    "- {}: {} Input: {}",
                    tool.name(),
                    tool.description(),
                    tool.input_schema()
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Run `name` on `input` and return the observation.
    ///
    /// Never fails: an unknown tool or a tool error becomes an `Error: ...` observation so the
    /// model can correct itself.
    pub async fn invoke(&self, name: &str, input: &str) -> String {
        let Some(tool) = self.get(name) else {
            warn!("Model asked for unknown tool {:?}", name);
            return format!(
                "Error: no such tool `{name}`. Available tools: {}",
                self.names().join(", ")
            );
        };

        info!("Invoking tool {} with {:?}", name, input);
        match tool.invoke(input).await {
            Ok(output) => output,
            Err(err) => {
                warn!("Tool {} failed: {}", name, err);
                format!("Error: {err}")
            }
        }
    }
}

/// A tool backed by a synchronous closure.
pub struct FunctionTool<F> {
    name: String,
    description: String,
    schema: Value,
    func: F,
}

impl<F> FunctionTool<F>
where
    F: Fn(&str) -> std::result::Result<String, ToolError> + Send + Sync,
{
    pub fn new(name: impl Into<String>, description: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            schema: json!({"type": "string"}),
            func,
        }
    }

    pub fn with_schema(mut self, schema: Value) -> Self {
        self.schema = schema;
        self
    }
}

#[async_trait]
impl<F> Tool for FunctionTool<F>
where
    F: Fn(&str) -> std::result::Result<String, ToolError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn input_schema(&self) -> Value {
        self.schema.clone()
    }

    async fn invoke(&self, input: &str) -> std::result::Result<String, ToolError> {
        (self.func)(input)
    }
}
