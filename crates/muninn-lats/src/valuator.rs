//! Turns a simulated node into a scalar value in [0, 1] for backpropagation.

use async_trait::async_trait;
use regex::Regex;

use crate::error::{LatsError, Result};
use crate::oracle::LlmOracle;
use crate::tree::MctsNode;

#[async_trait]
pub trait Valuator: Send + Sync {
    async fn value(&self, node: &MctsNode) -> Result<f64>;
}

/// Starts at 0.5, rewards successful observations, penalizes failed ones and
/// depth, clamps to [0, 1].
pub struct HeuristicValuator {
    pub success_bonus: f64,
    pub failure_penalty: f64,
    pub depth_penalty: f64,
}

impl Default for HeuristicValuator {
    fn default() -> Self {
        Self {
            success_bonus: 0.15,
            failure_penalty: 0.2,
            depth_penalty: 0.02,
        }
    }
}

#[async_trait]
impl Valuator for HeuristicValuator {
    async fn value(&self, node: &MctsNode) -> Result<f64> {
        let successes = node.state.successful_steps() as f64;
        let failures = node.state.failed_steps() as f64;
        let value = 0.5 + self.success_bonus * successes - self.failure_penalty * failures
            - self.depth_penalty * node.depth as f64;
        Ok(value.clamp(0.0, 1.0))
    }
}

/// Renders the node's history and asks the oracle for a single number.
pub struct LlmValuator {
    oracle: std::sync::Arc<dyn LlmOracle>,
    number_pattern: Regex,
}

impl LlmValuator {
    pub fn new(oracle: std::sync::Arc<dyn LlmOracle>) -> Self {
        Self {
            oracle,
            number_pattern: Regex::new(r"(?:0?\.\d+|1(?:\.0+)?|0|1)").expect("valid regex"),
        }
    }

    fn render_prompt(node: &MctsNode) -> String {
        let mut prompt = format!("Query: {}\n\nHistory:\n", node.state.query);
        for (action, observation) in &node.state.history {
            prompt.push_str(&format!(
                "- {} -> {} (success={})\n",
                action.tool, observation.result, observation.success
            ));
        }
        prompt.push_str("\nRate the progress toward answering the query as a single number in [0, 1].");
        prompt
    }
}

#[async_trait]
impl Valuator for LlmValuator {
    async fn value(&self, node: &MctsNode) -> Result<f64> {
        let prompt = Self::render_prompt(node);
        let (text, _tokens) = self.oracle.complete(&prompt, 16).await?;
        let matched = self
            .number_pattern
            .find(&text)
            .ok_or_else(|| LatsError::Valuation(format!("no numeric value found in: {text}")))?;
        let parsed: f64 = matched
            .as_str()
            .parse()
            .map_err(|_| LatsError::Valuation(format!("unparseable numeric value: {text}")))?;
        Ok(parsed.clamp(0.0, 1.0))
    }
}
