//! Proposes candidate actions for a selected leaf.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use regex::Regex;

use crate::action::Action;
use crate::error::Result;
use crate::oracle::LlmOracle;
use crate::tools::ToolRegistry;
use crate::tree::MctsNode;

#[async_trait]
pub trait Expander: Send + Sync {
    /// Produce zero or more child action templates for `node`. An empty
    /// result marks `node` terminal in the caller's tree.
    async fn expand(&self, node: &MctsNode) -> Result<Vec<Action>>;
}

/// Prompts the oracle for a structured list of candidate actions and parses
/// lines of the form `[Action N] Tool: <name> Input: <json> Reasoning: <text>`.
/// Actions referencing an unregistered tool are dropped rather than passed
/// through to the simulator.
pub struct LlmExpander {
    oracle: Arc<dyn LlmOracle>,
    registry: Arc<ToolRegistry>,
    branching_factor: usize,
    action_pattern: Regex,
}

impl LlmExpander {
    pub fn new(oracle: Arc<dyn LlmOracle>, registry: Arc<ToolRegistry>, branching_factor: usize) -> Self {
        Self {
            oracle,
            registry,
            branching_factor,
            action_pattern: Regex::new(
                r"(?m)^\s*\[Action\s+\d+\]\s*Tool:\s*(\S+)\s*Input:\s*(\{.*?\})\s*Reasoning:\s*(.*)$",
            )
            .expect("valid regex"),
        }
    }

    fn render_prompt(&self, node: &MctsNode) -> String {
        let mut prompt = format!(
            "Query: {}\n\nAvailable tools:\n{}\n\nHistory:\n",
            node.state.query,
            self.registry.describe()
        );
        for (action, observation) in &node.state.history {
            prompt.push_str(&format!("- {} -> {}\n", action.tool, observation.result));
        }
        prompt.push_str(&format!(
            "\nPropose up to {} candidate next actions, one per line, in the form:\n\
             [Action N] Tool: <tool name> Input: <json object> Reasoning: <why>",
            self.branching_factor
        ));
        prompt
    }

    fn parse_actions(&self, text: &str) -> Vec<Action> {
        self.action_pattern
            .captures_iter(text)
            .filter_map(|cap| {
                let tool = cap.get(1)?.as_str().to_string();
                if !self.registry.has(&tool) {
                    return None;
                }
                let input: serde_json::Value = serde_json::from_str(cap.get(2)?.as_str()).ok()?;
                let reasoning = cap.get(3).map(|m| m.as_str().trim().to_string());
                let mut action = Action::new(tool, input);
                if let Some(reasoning) = reasoning {
                    action = action.with_reasoning(reasoning);
                }
                Some(action)
            })
            .take(self.branching_factor)
            .collect()
    }
}

#[async_trait]
impl Expander for LlmExpander {
    async fn expand(&self, node: &MctsNode) -> Result<Vec<Action>> {
        let prompt = self.render_prompt(node);
        let (text, _tokens) = self.oracle.complete(&prompt, 512).await?;
        Ok(self.parse_actions(&text))
    }
}

/// Round-robins over a fixed tool list, ignoring node state. Useful for
/// deterministic tests and for exercising the search loop without an oracle.
pub struct MockExpander {
    tools: Vec<String>,
    cursor: Mutex<usize>,
}

impl MockExpander {
    pub fn new(tools: Vec<String>) -> Self {
        Self {
            tools,
            cursor: Mutex::new(0),
        }
    }
}

#[async_trait]
impl Expander for MockExpander {
    async fn expand(&self, _node: &MctsNode) -> Result<Vec<Action>> {
        if self.tools.is_empty() {
            return Ok(Vec::new());
        }
        let mut cursor = self.cursor.lock().unwrap();
        let tool = self.tools[*cursor % self.tools.len()].clone();
        *cursor += 1;
        Ok(vec![Action::new(tool, serde_json::json!({}))])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::AgentState;
    use crate::oracle::test_support::FixedOracle;
    use chrono::Utc;

    fn leaf() -> MctsNode {
        MctsNode {
            id: 0,
            parent: None,
            children: vec![],
            depth: 0,
            action: None,
            observation: None,
            state: AgentState::root("what is the capital of France?"),
            visits: 0,
            total_value: 0.0,
            terminal: false,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn mock_expander_round_robins() {
        let expander = MockExpander::new(vec!["search".to_string(), "calc".to_string()]);
        let first = expander.expand(&leaf()).await.unwrap();
        let second = expander.expand(&leaf()).await.unwrap();
        let third = expander.expand(&leaf()).await.unwrap();
        assert_eq!(first[0].tool, "search");
        assert_eq!(second[0].tool, "calc");
        assert_eq!(third[0].tool, "search");
    }

    #[tokio::test]
    async fn llm_expander_parses_well_formed_actions() {
        let mut registry = ToolRegistry::new();
        struct Noop;
        #[async_trait]
        impl crate::tools::Tool for Noop {
            fn name(&self) -> &str {
                "search"
            }
            fn description(&self) -> &str {
                "search the web"
            }
            async fn execute(&self, _input: serde_json::Value) -> Result<crate::tools::ToolResult> {
                Ok(crate::tools::ToolResult::ok("ok", 1))
            }
        }
        registry.register(Noop);

        let reply = "[Action 1] Tool: search Input: {\"query\": \"capital of France\"} Reasoning: look it up";
        let oracle = Arc::new(FixedOracle::new(reply, 20));
        let expander = LlmExpander::new(oracle, Arc::new(registry), 3);

        let actions = expander.expand(&leaf()).await.unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].tool, "search");
        assert_eq!(actions[0].input["query"], "capital of France");
    }

    #[tokio::test]
    async fn llm_expander_drops_unknown_tools() {
        let registry = ToolRegistry::new();
        let reply = "[Action 1] Tool: ghost Input: {} Reasoning: nope";
        let oracle = Arc::new(FixedOracle::new(reply, 5));
        let expander = LlmExpander::new(oracle, Arc::new(registry), 3);

        let actions = expander.expand(&leaf()).await.unwrap();
        assert!(actions.is_empty());
    }
}
