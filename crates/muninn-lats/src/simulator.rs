//! Executes a freshly expanded child's action and scores the result.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use crate::action::Observation;
use crate::error::Result;
use crate::tools::ToolRegistry;
use crate::tree::MctsNode;
use crate::valuator::Valuator;

/// What a simulation produces: the observation to fold into the child's
/// state, whether the child is now terminal, the backprop value, and the
/// tokens spent.
#[derive(Debug, Clone)]
pub struct SimulationOutcome {
    pub observation: Observation,
    pub terminal: bool,
    pub value: f64,
    pub tokens: u64,
}

#[async_trait]
pub trait Simulator: Send + Sync {
    async fn simulate(&self, node: &MctsNode) -> Result<SimulationOutcome>;
}

/// The default simulator: looks up the node's action in the tool registry,
/// executes it, and scores the resulting state with a `Valuator`.
///
/// On a tool execution error the node still gets an observation (so the tree
/// stays consistent) but the value/tokens default to a fixed fallback
/// (0.3, 0) rather than invoking the valuator.
pub struct RealSimulator {
    registry: Arc<ToolRegistry>,
    valuator: Arc<dyn Valuator>,
    max_depth: u32,
}

impl RealSimulator {
    pub fn new(registry: Arc<ToolRegistry>, valuator: Arc<dyn Valuator>, max_depth: u32) -> Self {
        Self {
            registry,
            valuator,
            max_depth,
        }
    }

    fn is_terminal(&self, depth: u32, observation: &Observation) -> bool {
        depth >= self.max_depth || observation.signals_terminal()
    }
}

#[async_trait]
impl Simulator for RealSimulator {
    async fn simulate(&self, node: &MctsNode) -> Result<SimulationOutcome> {
        let action = node
            .action
            .clone()
            .expect("simulate is only called on expanded children, which always carry an action");

        let started = Instant::now();
        match self.registry.execute(&action.tool, action.input.clone()).await {
            Ok(tool_result) => {
                let observation = Observation {
                    result: tool_result.output,
                    success: tool_result.success,
                    tokens: tool_result.tokens,
                    duration_ms: started.elapsed().as_millis() as u64,
                };
                let terminal = self.is_terminal(node.depth, &observation);

                let mut scored_node = node.clone();
                scored_node.state = node.state.with_step(action, observation.clone());
                scored_node.terminal = terminal;

                let value = self.valuator.value(&scored_node).await.unwrap_or(0.3);
                Ok(SimulationOutcome {
                    observation,
                    terminal,
                    value,
                    tokens: tool_result.tokens,
                })
            }
            Err(e) => {
                let observation = Observation {
                    result: e.to_string(),
                    success: false,
                    tokens: 0,
                    duration_ms: started.elapsed().as_millis() as u64,
                };
                let terminal = self.is_terminal(node.depth, &observation);
                Ok(SimulationOutcome {
                    observation,
                    terminal,
                    value: 0.3,
                    tokens: 0,
                })
            }
        }
    }
}

/// Deterministic simulator for tests: always returns the configured value
/// and a successful observation, never touches a registry.
pub struct MockSimulator {
    pub value: f64,
    pub tokens: u64,
    pub result: String,
}

impl MockSimulator {
    pub fn new(value: f64, tokens: u64, result: impl Into<String>) -> Self {
        Self {
            value,
            tokens,
            result: result.into(),
        }
    }
}

#[async_trait]
impl Simulator for MockSimulator {
    async fn simulate(&self, _node: &MctsNode) -> Result<SimulationOutcome> {
        Ok(SimulationOutcome {
            observation: Observation {
                result: self.result.clone(),
                success: true,
                tokens: self.tokens,
                duration_ms: 0,
            },
            terminal: false,
            value: self.value,
            tokens: self.tokens,
        })
    }
}
