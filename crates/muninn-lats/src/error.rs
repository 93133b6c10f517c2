//! Error types for the LATS orchestrator.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, LatsError>;

#[derive(Debug, Error)]
pub enum LatsError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("tool execution error: {0}")]
    ToolExecution(String),

    #[error("expansion error: {0}")]
    Expansion(String),

    #[error("simulation error: {0}")]
    Simulation(String),

    #[error("valuation error: {0}")]
    Valuation(String),

    #[error("oracle error: {0}")]
    Oracle(String),

    #[error("search cancelled")]
    Cancelled,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for LatsError {
    fn from(e: serde_json::Error) -> Self {
        LatsError::Internal(e.to_string())
    }
}

impl From<muninn_repl::ReplError> for LatsError {
    fn from(e: muninn_repl::ReplError) -> Self {
        LatsError::ToolExecution(e.to_string())
    }
}
