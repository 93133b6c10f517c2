//! End-to-end exercises against a real `python3` child process.
//!
//! These spawn an actual subprocess per test and so are slower than the
//! unit tests in `src/`; they validate the wire protocol and supervisor
//! lifecycle against the real bootstrap script rather than a mock.

use muninn_repl::{CancellationToken, ReplSupervisor, SandboxConfig};

fn test_config() -> SandboxConfig {
    // Relax the sandbox for test speed: no memory/cpu rlimits, short
    // execution timeout so a hung child fails the test quickly rather than
    // stalling the suite.
    SandboxConfig::new()
        .without_sandbox()
        .with_timeout(10)
}

#[tokio::test]
async fn execute_returns_expression_value() {
    let supervisor = ReplSupervisor::new(test_config());
    supervisor.start(CancellationToken::new()).await.expect("python3 must be on PATH");

    let outcome = supervisor
        .execute(CancellationToken::new(), "1 + 1")
        .await
        .expect("execute should succeed");

    assert_eq!(outcome.return_repr.as_deref(), Some("2"));
    assert!(outcome.error_repr.is_none());

    supervisor.stop().await.expect("stop should succeed");
}

#[tokio::test]
async fn execute_captures_stdout_separately_from_return_value() {
    let supervisor = ReplSupervisor::new(test_config());
    supervisor.start(CancellationToken::new()).await.expect("python3 must be on PATH");

    let outcome = supervisor
        .execute(CancellationToken::new(), "print('hello from sandbox')\n'ok'")
        .await
        .expect("execute should succeed");

    assert!(outcome.output.contains("hello from sandbox"));
    assert_eq!(outcome.return_repr.as_deref(), Some("'ok'"));

    supervisor.stop().await.expect("stop should succeed");
}

#[tokio::test]
async fn execute_surfaces_python_exceptions_without_killing_the_child() {
    let supervisor = ReplSupervisor::new(test_config());
    supervisor.start(CancellationToken::new()).await.expect("python3 must be on PATH");

    let outcome = supervisor
        .execute(CancellationToken::new(), "1 / 0")
        .await
        .expect("execute call itself should succeed even though the code raised");
    assert!(outcome.error_repr.is_some());

    // The process survives a Python-level exception; a second call on the
    // same supervisor still round-trips normally.
    let second = supervisor
        .execute(CancellationToken::new(), "40 + 2")
        .await
        .expect("execute should succeed after a prior exception");
    assert_eq!(second.return_repr.as_deref(), Some("42"));

    supervisor.stop().await.expect("stop should succeed");
}

#[tokio::test]
async fn set_get_and_list_vars_round_trip() {
    let supervisor = ReplSupervisor::new(test_config());
    supervisor.start(CancellationToken::new()).await.expect("python3 must be on PATH");

    supervisor.set_var("greeting", "hello world").await.expect("set_var should succeed");

    let value = supervisor.get_var("greeting", 0, 0).await.expect("get_var should succeed");
    assert_eq!(value.value, "hello world");
    assert_eq!(value.total_length, "hello world".len());

    let names = supervisor.list_vars().await.expect("list_vars should succeed");
    assert!(names.iter().any(|n| n == "greeting"));

    supervisor.stop().await.expect("stop should succeed");
}

#[tokio::test]
async fn get_var_slices_by_start_and_end() {
    let supervisor = ReplSupervisor::new(test_config());
    supervisor.start(CancellationToken::new()).await.expect("python3 must be on PATH");

    supervisor.set_var("alphabet", "abcdefghij").await.expect("set_var should succeed");
    let slice = supervisor.get_var("alphabet", 2, 5).await.expect("get_var should succeed");
    assert_eq!(slice.value, "cde");

    supervisor.stop().await.expect("stop should succeed");
}

#[tokio::test]
async fn status_reports_running_after_start() {
    let supervisor = ReplSupervisor::new(test_config());
    supervisor.start(CancellationToken::new()).await.expect("python3 must be on PATH");

    let status = supervisor.status().await;
    assert!(status.running);

    supervisor.stop().await.expect("stop should succeed");
}

#[tokio::test]
async fn ensure_started_is_idempotent_and_lazy() {
    let supervisor = ReplSupervisor::new(test_config());
    assert!(!supervisor.is_running());

    let outcome = supervisor
        .execute(CancellationToken::new(), "7 * 6")
        .await
        .expect("execute should lazily start the supervisor");
    assert_eq!(outcome.return_repr.as_deref(), Some("42"));
    assert!(supervisor.is_running());

    supervisor.stop().await.expect("stop should succeed");
}

#[tokio::test]
async fn stop_is_graceful_and_idempotent() {
    let supervisor = ReplSupervisor::new(test_config());
    supervisor.start(CancellationToken::new()).await.expect("python3 must be on PATH");

    supervisor.stop().await.expect("first stop should succeed");
    assert!(!supervisor.is_running());

    // A second stop on an already-stopped supervisor is a no-op, not an error.
    supervisor.stop().await.expect("second stop should also succeed");
}

#[tokio::test]
async fn execution_timeout_is_enforced() {
    let supervisor = ReplSupervisor::new(test_config().with_timeout(1));
    supervisor.start(CancellationToken::new()).await.expect("python3 must be on PATH");

    let result = supervisor
        .execute(CancellationToken::new(), "import time\ntime.sleep(5)")
        .await;
    assert!(result.is_err(), "a call exceeding the execution timeout must return an error");

    // The child is still finishing its sleep; stop() waits out the grace
    // period rather than leaving it orphaned.
    supervisor.stop().await.expect("stop should still succeed after a timed-out call");
}
