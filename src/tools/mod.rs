//! Tools the model may call during a turn.
//!
//! A tool is one [`ToolDescriptor`] plus one handler, bundled behind the
//! [`Tool`] trait and registered in a [`ToolRegistry`]. The [`ToolInvoker`]
//! turns model tool-call requests into observations and never fails.

mod invoker;
mod knowledge;
mod registry;
mod web;

pub use invoker::ToolInvoker;
pub use knowledge::KnowledgeSearchTool;
pub use registry::ToolRegistry;
pub use web::SearchWebTool;

#[cfg(test)]
pub(crate) use registry::testing;

use crate::error::{ParleyError, Result};
use async_openai::types::{ChatCompletionTool, ChatCompletionToolType, FunctionObject};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Name, description and JSON-schema parameters the model sees for a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }

    /// Convert to the OpenAI function tool definition.
    pub fn to_openai(&self) -> ChatCompletionTool {
        ChatCompletionTool {
            r#type: ChatCompletionToolType::Function,
            function: FunctionObject {
                name: self.name.clone(),
                description: Some(self.description.clone()),
                parameters: Some(self.parameters.clone()),
                strict: None,
            },
        }
    }
}

/// A callable tool: descriptor plus handler.
#[async_trait]
pub trait Tool: Send + Sync {
    fn descriptor(&self) -> ToolDescriptor;

    /// Run the tool with already-decoded JSON arguments.
    ///
    /// Arguments that don't match the expected shape should be reported as
    /// [`ParleyError::InvalidArguments`] (see [`parse_args`]).
    async fn call(&self, args: Value) -> Result<Value>;
}

/// Deserialize tool arguments into a typed struct.
pub fn parse_args<T: DeserializeOwned>(args: Value) -> Result<T> {
    serde_json::from_value(args).map_err(|e| ParleyError::InvalidArguments(e.to_string()))
}
