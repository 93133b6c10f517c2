//! Adapts a `muninn-repl` supervisor into a LATS `Tool`, so `execute_python`
//! can appear in the tool registry alongside any other action the expander
//! might propose.

use std::sync::Arc;

use async_trait::async_trait;
use muninn_repl::{CancellationToken, ReplSupervisor};

use crate::error::{LatsError, Result};
use crate::tools::{Tool, ToolResult};

pub struct ReplExecuteTool {
    supervisor: Arc<ReplSupervisor>,
}

impl ReplExecuteTool {
    pub fn new(supervisor: Arc<ReplSupervisor>) -> Self {
        Self { supervisor }
    }
}

#[async_trait]
impl Tool for ReplExecuteTool {
    fn name(&self) -> &str {
        "execute_python"
    }

    fn description(&self) -> &str {
        "Execute Python code in the sandboxed REPL and return its stdout and return value."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "code": { "type": "string", "description": "Python source to execute" }
            },
            "required": ["code"]
        })
    }

    async fn execute(&self, input: serde_json::Value) -> Result<ToolResult> {
        let code = input
            .get("code")
            .and_then(|v| v.as_str())
            .ok_or_else(|| LatsError::ToolExecution("missing 'code' parameter".to_string()))?;

        let outcome = self
            .supervisor
            .execute(CancellationToken::new(), code)
            .await
            .map_err(|e| LatsError::ToolExecution(e.to_string()))?;

        if let Some(error) = outcome.error_repr {
            return Ok(ToolResult::failed(error));
        }

        let body = match outcome.return_repr {
            Some(repr) if !outcome.output.is_empty() => format!("{}\n{}", outcome.output, repr),
            Some(repr) => repr,
            None => outcome.output,
        };
        Ok(ToolResult::ok(body, 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use muninn_repl::SandboxConfig;

    #[test]
    fn tool_metadata_is_descriptive() {
        let supervisor = ReplSupervisor::new(SandboxConfig::default());
        let tool = ReplExecuteTool::new(supervisor);
        assert_eq!(tool.name(), "execute_python");
        assert!(tool.parameters_schema()["required"].as_array().unwrap().contains(&serde_json::json!("code")));
    }
}
