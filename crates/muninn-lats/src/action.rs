//! The unit of search: a tool invocation, its observation, and the agent
//! state threaded along a root-to-leaf path.

use serde::{Deserialize, Serialize};

/// A candidate tool invocation proposed by an expander.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub tool: String,
    pub input: serde_json::Value,
    #[serde(default)]
    pub reasoning: Option<String>,
}

impl Action {
    pub fn new(tool: impl Into<String>, input: serde_json::Value) -> Self {
        Self {
            tool: tool.into(),
            input,
            reasoning: None,
        }
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }
}

/// The result of simulating an `Action` against the tool registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    pub result: String,
    pub success: bool,
    pub tokens: u64,
    pub duration_ms: u64,
}

impl Observation {
    /// Whether this observation's result text signals a terminal answer,
    /// per the `final_answer` / `task_complete` / `solution:` markers.
    pub fn signals_terminal(&self) -> bool {
        let lower = self.result.to_lowercase();
        lower.contains("final_answer") || lower.contains("task_complete") || lower.contains("solution:")
    }

    /// Whether this observation qualifies its node as a solution: success
    /// and a non-empty result.
    pub fn is_solution(&self) -> bool {
        self.success && !self.result.trim().is_empty()
    }
}

/// State carried by a node: the original query plus the (action, observation)
/// history accumulated along the path from the root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentState {
    pub query: String,
    pub history: Vec<(Action, Observation)>,
}

impl AgentState {
    pub fn root(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            history: Vec::new(),
        }
    }

    pub fn with_step(&self, action: Action, observation: Observation) -> Self {
        let mut history = self.history.clone();
        history.push((action, observation));
        Self {
            query: self.query.clone(),
            history,
        }
    }

    pub fn last_observation(&self) -> Option<&Observation> {
        self.history.last().map(|(_, obs)| obs)
    }

    pub fn successful_steps(&self) -> usize {
        self.history.iter().filter(|(_, obs)| obs.success).count()
    }

    pub fn failed_steps(&self) -> usize {
        self.history.iter().filter(|(_, obs)| !obs.success).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solution_requires_success_and_nonempty_result() {
        let obs = Observation {
            result: "".to_string(),
            success: true,
            tokens: 0,
            duration_ms: 0,
        };
        assert!(!obs.is_solution());

        let obs = Observation {
            result: "42".to_string(),
            success: true,
            tokens: 0,
            duration_ms: 0,
        };
        assert!(obs.is_solution());
    }

    #[test]
    fn detects_terminal_markers_case_insensitively() {
        let obs = Observation {
            result: "FINAL_ANSWER: 42".to_string(),
            success: true,
            tokens: 0,
            duration_ms: 0,
        };
        assert!(obs.signals_terminal());
    }

    #[test]
    fn state_with_step_appends_without_mutating_parent() {
        let root = AgentState::root("what is 2+2?");
        let action = Action::new("calc", serde_json::json!({"expr": "2+2"}));
        let observation = Observation {
            result: "4".to_string(),
            success: true,
            tokens: 10,
            duration_ms: 0,
        };
        let child = root.with_step(action, observation);
        assert_eq!(root.history.len(), 0);
        assert_eq!(child.history.len(), 1);
        assert_eq!(child.successful_steps(), 1);
    }
}
