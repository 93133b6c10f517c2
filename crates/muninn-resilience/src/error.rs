use thiserror::Error;

pub type Result<T> = std::result::Result<T, ResilienceError>;

#[derive(Debug, Error)]
pub enum ResilienceError {
    #[error("circuit-open")]
    CircuitOpen,

    #[error("verification program failed: {0}")]
    Verification(String),

    #[error("verification timed out")]
    Timeout,

    #[error(transparent)]
    Repl(#[from] muninn_repl::ReplError),

    #[error("malformed solver output: {0}")]
    MalformedOutput(#[from] serde_json::Error),
}
