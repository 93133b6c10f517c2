//! Error taxonomy for the REPL supervisor.

use thiserror::Error;

use crate::protocol::ErrorCode;

pub type Result<T> = std::result::Result<T, ReplError>;

#[derive(Debug, Error)]
pub enum ReplError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("REPL is not running")]
    NotRunning,

    #[error("REPL process exited unexpectedly: {0}")]
    ProcessExited(String),

    #[error("execution timed out after {0}ms")]
    Timeout(u64),

    #[error("sandbox violation: {0}")]
    SandboxViolation(String),

    #[error("resource limit reached: {0}")]
    ResourceLimit(String),

    #[error("unknown callback: {0}")]
    UnknownCallback(String),

    #[error("unknown plugin function: {0}")]
    UnknownPlugin(String),

    #[error("failed to start REPL: {0}")]
    Start(String),

    #[error("REPL did not become ready in time")]
    ReadyTimeout,

    #[error("bootstrap error: {0}")]
    Bootstrap(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ReplError {
    /// Map this error to the JSON-RPC-style code table, for
    /// callers that need to surface a numeric code alongside the message.
    pub fn code(&self) -> i32 {
        match self {
            ReplError::Validation(_) => ErrorCode::InvalidParams.code(),
            ReplError::NotRunning | ReplError::ProcessExited(_) => ErrorCode::Internal.code(),
            ReplError::Timeout(_) => ErrorCode::ExecutionTimeout.code(),
            ReplError::SandboxViolation(_) => ErrorCode::SandboxViolation.code(),
            ReplError::ResourceLimit(_) => ErrorCode::MemoryLimit.code(),
            ReplError::UnknownCallback(_) => ErrorCode::MethodNotFound.code(),
            ReplError::UnknownPlugin(_) => ErrorCode::MethodNotFound.code(),
            ReplError::Start(_) | ReplError::ReadyTimeout | ReplError::Bootstrap(_) => {
                ErrorCode::Internal.code()
            }
            ReplError::Internal(_) => ErrorCode::Internal.code(),
        }
    }
}

impl From<std::io::Error> for ReplError {
    fn from(e: std::io::Error) -> Self {
        ReplError::Internal(e.to_string())
    }
}

impl From<serde_json::Error> for ReplError {
    fn from(e: serde_json::Error) -> Self {
        ReplError::Internal(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_match_spec_table() {
        assert_eq!(ReplError::Validation("x".into()).code(), -32602);
        assert_eq!(ReplError::Timeout(30_000).code(), -32000);
        assert_eq!(ReplError::SandboxViolation("x".into()).code(), -32001);
        assert_eq!(ReplError::ResourceLimit("x".into()).code(), -32002);
    }
}
