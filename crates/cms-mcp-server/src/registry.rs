//! Explicit tool registry, populated at startup

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use cms_mcp_protocol::{McpError, McpResult, Tool, methods};

use crate::tool::{McpTool, TypedTool, TypedToolAdapter};

/// Names owned by the engine; a tool may not shadow them
fn is_reserved(name: &str) -> bool {
    matches!(
        name,
        methods::INITIALIZE | methods::PING | methods::TOOLS_LIST | methods::TOOLS_CALL
    ) || name.starts_with("notifications/")
}

/// Tools keyed by name, listed in name order
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn McpTool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: McpTool + 'static>(&mut self, tool: T) -> McpResult<()> {
        self.register_arc(Arc::new(tool))
    }

    pub fn register_typed<T: TypedTool>(&mut self, tool: T) -> McpResult<()> {
        self.register(TypedToolAdapter::new(tool))
    }

    pub fn register_arc(&mut self, tool: Arc<dyn McpTool>) -> McpResult<()> {
        let name = tool.name().to_string();
        if name.is_empty() {
            return Err(McpError::ConfigurationError(
                "Tool name cannot be empty".to_string(),
            ));
        }
        if is_reserved(&name) {
            return Err(McpError::ConfigurationError(format!(
                "Tool name '{}' is reserved",
                name
            )));
        }
        if self.tools.contains_key(&name) {
            return Err(McpError::ConfigurationError(format!(
                "Tool '{}' is already registered",
                name
            )));
        }
        debug!("Registered tool {}", name);
        self.tools.insert(name, tool);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn McpTool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    pub fn descriptors(&self) -> Vec<Tool> {
        self.tools.values().map(|t| t.to_descriptor()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
