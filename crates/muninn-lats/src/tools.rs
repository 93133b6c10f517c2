//! The tool registry: a thread-safe name→`Tool` map shared by the expander,
//! simulator, and capability matcher.
//!
//! Generalized from the RLM gateway's `ToolRegistry`/`Tool` pair: dropped the
//! Anthropic `ToolDefinition` conversion (no external API surface here) and
//! the internal/external split (LATS has no MCP-facing tool set), kept the
//! registration and lookup shape.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{LatsError, Result};

/// The outcome of executing a tool: the simulator turns this into an
/// `Observation`.
#[derive(Debug, Clone)]
pub struct ToolResult {
    pub output: String,
    pub success: bool,
    pub tokens: u64,
}

impl ToolResult {
    pub fn ok(output: impl Into<String>, tokens: u64) -> Self {
        Self {
            output: output.into(),
            success: true,
            tokens,
        }
    }

    pub fn failed(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            success: false,
            tokens: 0,
        }
    }
}

/// A callable tool action the expander may propose and the simulator executes.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object"})
    }
    async fn execute(&self, input: serde_json::Value) -> Result<ToolResult>;
}

/// Thread-safe name→`Tool` map.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        let name = tool.name().to_string();
        self.tools.insert(name, Arc::new(tool));
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Execute a registered tool by name. Unknown tool names are an error,
    /// never a silent no-op.
    pub async fn execute(&self, name: &str, input: serde_json::Value) -> Result<ToolResult> {
        match self.tools.get(name) {
            Some(tool) => tool.execute(input).await,
            None => Err(LatsError::UnknownTool(name.to_string())),
        }
    }

    /// A human-readable listing of every registered tool, one line each.
    pub fn describe(&self) -> String {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
            .into_iter()
            .map(|name| {
                let tool = &self.tools[name];
                format!("- {}: {}", tool.name(), tool.description())
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    pub fn count(&self) -> usize {
        self.tools.len()
    }
}
