//! Cross-cutting resilience primitives: per-tier circuit breakers and a
//! REPL-backed constraint verifier.

pub mod circuit_breaker;
pub mod error;
pub mod verification;

pub use circuit_breaker::{BreakerConfig, BreakerRegistry, CircuitBreaker, CircuitState};
pub use error::{ResilienceError, Result};
pub use verification::{
    extract_constraints, extract_variables, render_solver_program, verify, verify_with_timeout,
    Constraint, ConstraintKind, Verdict, VariableDecl, VariableSort, VerificationResult,
    DEFAULT_SOLVER_TIMEOUT,
};
