//! Built-in `muninn-lats` tools wired by the CLI: REPL execution, a
//! memory-search wrapper, and the sentinel `final_answer` tool the terminal
//! policy looks for in an observation's result text.

use std::sync::Arc;

use async_trait::async_trait;
use muninn_lats::{LatsError, Result as LatsResult, Tool, ToolResult};
use muninn_memory::{NodeStore, Tier};

pub struct MemorySearchTool {
    store: Arc<dyn NodeStore>,
}

impl MemorySearchTool {
    pub fn new(store: Arc<dyn NodeStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for MemorySearchTool {
    fn name(&self) -> &str {
        "memory_search"
    }

    fn description(&self) -> &str {
        "Search session-tier memory for nodes relevant to a query."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": { "type": "string" },
                "limit": { "type": "integer" }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, input: serde_json::Value) -> LatsResult<ToolResult> {
        let query = input
            .get("query")
            .and_then(|v| v.as_str())
            .ok_or_else(|| LatsError::ToolExecution("missing 'query' parameter".to_string()))?;
        let limit = input.get("limit").and_then(|v| v.as_u64()).unwrap_or(5) as usize;

        let results = self
            .store
            .search(Tier::Session, query, limit)
            .map_err(|e| LatsError::ToolExecution(e.to_string()))?;

        if results.is_empty() {
            return Ok(ToolResult::ok("no matching memory nodes", 0));
        }

        let summary = results
            .iter()
            .map(|(node, score)| format!("- [{score:.2}] {}", node.content))
            .collect::<Vec<_>>()
            .join("\n");
        Ok(ToolResult::ok(summary, 0))
    }
}

/// The expander's sentinel terminal action: proposing it always yields a
/// successful, non-empty observation containing `final_answer`, which the
/// default terminal policy (`Observation::signals_terminal`) recognizes.
pub struct FinalAnswerTool;

#[async_trait]
impl Tool for FinalAnswerTool {
    fn name(&self) -> &str {
        "final_answer"
    }

    fn description(&self) -> &str {
        "Declare the final answer to the query and terminate the search."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": { "text": { "type": "string" } },
            "required": ["text"]
        })
    }

    async fn execute(&self, input: serde_json::Value) -> LatsResult<ToolResult> {
        let text = input
            .get("text")
            .and_then(|v| v.as_str())
            .ok_or_else(|| LatsError::ToolExecution("missing 'text' parameter".to_string()))?;
        Ok(ToolResult::ok(format!("final_answer: {text}"), 0))
    }
}
