use thiserror::Error;

pub type Result<T> = std::result::Result<T, BenchError>;

#[derive(Debug, Error)]
pub enum BenchError {
    #[error("unknown generator kind: {0}")]
    UnknownGenerator(String),

    #[error("executor failed: {0}")]
    Executor(String),

    #[error("task timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("run cancelled")]
    Cancelled,

    #[error("invalid task configuration: {0}")]
    InvalidConfig(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_detail() {
        let err = BenchError::UnknownGenerator("frobnicate".to_string());
        assert!(err.to_string().contains("frobnicate"));
    }
}
