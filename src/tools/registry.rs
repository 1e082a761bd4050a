//! Registry of tools offered to the model.

use super::{Tool, ToolDescriptor};
use crate::error::{ParleyError, Result};
use std::sync::Arc;

/// Ordered set of tools, validated at registration time.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Empty and duplicate names are rejected.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<()> {
        let name = tool.descriptor().name;
        if name.trim().is_empty() {
            return Err(ParleyError::InvalidInput("tool name must not be empty".to_string()));
        }
        if self.get(&name).is_some() {
            return Err(ParleyError::DuplicateTool(name));
        }
        self.tools.push(tool);
        Ok(())
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, tool: Arc<dyn Tool>) -> Result<Self> {
        self.register(tool)?;
        Ok(self)
    }

    /// Descriptors in registration order.
    pub fn list_tools(&self) -> Vec<ToolDescriptor> {
        self.tools.iter().map(|t| t.descriptor()).collect()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools
            .iter()
            .find(|t| t.descriptor().name == name)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self.tools.iter().map(|t| t.descriptor().name).collect();
        f.debug_struct("ToolRegistry").field("tools", &names).finish()
    }
}
