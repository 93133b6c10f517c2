//! The select → expand → simulate → backpropagate loop.

use std::sync::Arc;

use muninn_repl::CancellationToken;
use muninn_tracing::{end_span_error, end_span_ok, record_event, start_span_with_data};
use serde::Serialize;

use crate::action::{Action, AgentState, Observation};
use crate::budget::{BudgetBreach, BudgetTracker, LatsConfig};
use crate::expander::Expander;
use crate::simulator::{SimulationOutcome, Simulator};
use crate::trace::{IterationTraceData, SearchCompletionTraceData, SearchStartTraceData};
use crate::tree::Tree;

/// Why the search loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    SolutionFound,
    BudgetExhausted,
    MaxIterations,
    Timeout,
    TreeExhausted,
}

/// The best root-to-terminal path found, plus solve statistics.
#[derive(Debug, Clone)]
pub struct Solution {
    pub path: Vec<(Action, Observation)>,
    pub final_answer: String,
    pub total_tokens: u64,
    pub termination_reason: TerminationReason,
    pub iterations: u32,
    pub tree_size: usize,
}

pub struct LatsController {
    config: LatsConfig,
}

impl LatsController {
    pub fn new(config: LatsConfig) -> Self {
        Self { config }
    }

    /// Run the search to completion, or until budget/cancellation stops it.
    pub async fn solve(
        &self,
        query: &str,
        expander: Arc<dyn Expander>,
        simulator: Arc<dyn Simulator>,
        cancel: CancellationToken,
    ) -> Solution {
        let mut tree = Tree::new(AgentState::root(query));
        let mut budget = BudgetTracker::new(self.config.clone());

        start_span_with_data(
            "lats_search",
            SearchStartTraceData {
                query: query.to_string(),
                max_iterations: self.config.max_iterations,
                max_depth: self.config.max_depth,
                token_budget: self.config.token_budget,
            },
        );

        let reason = loop {
            if cancel.is_cancelled() {
                break TerminationReason::Timeout;
            }
            if let Some(breach) = budget.check() {
                break match breach {
                    BudgetBreach::Tokens => TerminationReason::BudgetExhausted,
                    BudgetBreach::Time => TerminationReason::Timeout,
                    BudgetBreach::Iterations => TerminationReason::MaxIterations,
                };
            }

            budget.record_iteration();

            let leaf_id = tree.select(self.config.exploration_constant);
            let leaf = tree.node(leaf_id).expect("selected node always exists").clone();

            if leaf.terminal {
                if leaf.is_solution() {
                    break TerminationReason::SolutionFound;
                }
                if tree.exhausted() {
                    break TerminationReason::TreeExhausted;
                }
                continue;
            }

            if leaf.depth >= self.config.max_depth {
                tree.expand(leaf_id, Vec::new());
                continue;
            }

            let actions = expander.expand(&leaf).await.unwrap_or_default();
            let children = tree.expand(leaf_id, actions);
            if children.is_empty() {
                continue;
            }

            let first_child_id = children[0];
            let first_child = tree.node(first_child_id).expect("just created").clone();
            let outcome = simulator.simulate(&first_child).await.unwrap_or(SimulationOutcome {
                observation: Observation {
                    result: String::new(),
                    success: false,
                    tokens: 0,
                    duration_ms: 0,
                },
                terminal: false,
                value: 0.3,
                tokens: 0,
            });

            budget.record_tokens(outcome.tokens);
            tree.apply_simulation(first_child_id, outcome.observation, outcome.terminal);
            tree.backpropagate(first_child_id, outcome.value, self.config.gamma);

            record_event(
                "iteration",
                Some(IterationTraceData {
                    iteration: budget.iterations(),
                    selected_node: first_child_id,
                    selected_depth: first_child.depth,
                    children_created: children.len(),
                    simulated_value: Some(outcome.value),
                    tokens_spent: outcome.tokens,
                }),
            );
        };

        let solution = Self::finalize(tree, &budget, reason);
        record_event(
            "completion",
            Some(SearchCompletionTraceData {
                termination_reason: format!("{reason:?}"),
                iterations_run: solution.iterations,
                tree_size: solution.tree_size,
                tokens_used: solution.total_tokens,
                duration_ms: budget.elapsed().as_millis() as u64,
                has_solution: reason == TerminationReason::SolutionFound,
            }),
        );
        match reason {
            TerminationReason::SolutionFound => end_span_ok(),
            _ => end_span_error(format!("{reason:?}")),
        }

        solution
    }

    fn finalize(tree: Tree, budget: &BudgetTracker, reason: TerminationReason) -> Solution {
        let chosen_id = match reason {
            TerminationReason::SolutionFound => tree.best_solution(),
            _ => tree.best_terminal(),
        }
        .or_else(|| tree.best_leaf());

        let (final_answer, path) = match chosen_id.and_then(|id| tree.node(id)) {
            Some(node) => {
                let answer = node.observation.as_ref().map(|o| o.result.clone()).unwrap_or_default();
                (answer, node.state.history.clone())
            }
            None => (String::new(), Vec::new()),
        };

        Solution {
            path,
            final_answer,
            total_tokens: budget.tokens_used(),
            termination_reason: reason,
            iterations: budget.iterations(),
            tree_size: tree.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expander::MockExpander;
    use crate::simulator::MockSimulator;
    use std::time::Duration;

    #[tokio::test]
    async fn terminates_on_budget_exhaustion_within_few_iterations() {
        let config = LatsConfig::new()
            .with_max_iterations(100)
            .with_token_budget(50);
        let controller = LatsController::new(config);
        let expander = Arc::new(MockExpander::new(vec!["tool".to_string()]));
        let simulator = Arc::new(MockSimulator::new(0.5, 10, "ok"));

        let solution = controller
            .solve("do something", expander, simulator, CancellationToken::new())
            .await;

        assert_eq!(solution.termination_reason, TerminationReason::BudgetExhausted);
        assert!(solution.iterations <= 5);
    }

    #[tokio::test]
    async fn terminates_on_max_iterations_when_budget_is_generous() {
        let config = LatsConfig::new()
            .with_max_iterations(3)
            .with_token_budget(1_000_000)
            .with_wall_clock_timeout(Duration::from_secs(60));
        let controller = LatsController::new(config);
        let expander = Arc::new(MockExpander::new(vec!["tool".to_string()]));
        let simulator = Arc::new(MockSimulator::new(0.5, 1, "ok"));

        let solution = controller
            .solve("do something", expander, simulator, CancellationToken::new())
            .await;

        assert_eq!(solution.termination_reason, TerminationReason::MaxIterations);
        assert_eq!(solution.iterations, 3);
    }

    #[tokio::test]
    async fn cancellation_terminates_with_timeout() {
        let config = LatsConfig::new().with_max_iterations(1000);
        let controller = LatsController::new(config);
        let expander = Arc::new(MockExpander::new(vec!["tool".to_string()]));
        let simulator = Arc::new(MockSimulator::new(0.5, 1, "ok"));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let solution = controller.solve("do something", expander, simulator, cancel).await;
        assert_eq!(solution.termination_reason, TerminationReason::Timeout);
        assert_eq!(solution.iterations, 0);
    }

    #[tokio::test]
    async fn empty_expansion_leads_to_tree_exhausted() {
        let config = LatsConfig::new().with_max_iterations(10);
        let controller = LatsController::new(config);
        let expander = Arc::new(MockExpander::new(vec![]));
        let simulator = Arc::new(MockSimulator::new(0.5, 1, "ok"));

        let solution = controller
            .solve("do something", expander, simulator, CancellationToken::new())
            .await;

        assert_eq!(solution.termination_reason, TerminationReason::TreeExhausted);
    }
}
