//! Trace data structures captured during a search, written through
//! `muninn-tracing`'s structured event sink.

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct SearchStartTraceData {
    pub query: String,
    pub max_iterations: u32,
    pub max_depth: u32,
    pub token_budget: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct IterationTraceData {
    pub iteration: u32,
    pub selected_node: u64,
    pub selected_depth: u32,
    pub children_created: usize,
    pub simulated_value: Option<f64>,
    pub tokens_spent: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchCompletionTraceData {
    pub termination_reason: String,
    pub iterations_run: u32,
    pub tree_size: usize,
    pub tokens_used: u64,
    pub duration_ms: u64,
    pub has_solution: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_trace_serializes() {
        let data = SearchCompletionTraceData {
            termination_reason: "solution_found".to_string(),
            iterations_run: 12,
            tree_size: 40,
            tokens_used: 3200,
            duration_ms: 900,
            has_solution: true,
        };
        let json = serde_json::to_string(&data).unwrap();
        assert!(json.contains("solution_found"));
    }
}
