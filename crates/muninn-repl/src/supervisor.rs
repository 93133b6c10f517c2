//! The REPL supervisor: owns one Python subprocess per session.
//!
//! A persistent child process, not a one-shot `python3 -c` invocation per
//! call: a buffered stdout line reader drives a classify-then-dispatch loop
//! (callback vs. response). The single-outstanding-`Execute` invariant uses
//! `tokio::sync::Mutex`, mirroring the "one writer" discipline elsewhere in
//! the workspace.

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin};
use tokio::time::timeout;

use crate::bootstrap::BOOTSTRAP_SCRIPT;
use crate::callback::{CallbackHandler, CallbackParams, MemoryHandler, decode_callback};
use crate::cancel::CancellationToken;
use crate::error::{ReplError, Result};
use crate::plugin::PluginManager;
use crate::protocol::{CallbackResponse, IncomingLine, Request, classify_line};
use crate::sandbox::{ResourceEvent, ResourceMonitor, ResourceSample, SandboxConfig};

const READY_TIMEOUT: Duration = Duration::from_secs(10);
const STOP_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Result of a successful `Execute` call.
#[derive(Debug, Clone)]
pub struct ExecuteOutcome {
    pub output: String,
    pub return_repr: Option<String>,
    pub error_repr: Option<String>,
    pub duration_ms: u64,
}

/// A named REPL variable peek.
#[derive(Debug, Clone)]
pub struct VarValue {
    pub value: String,
    pub total_length: usize,
    pub type_name: String,
}

/// A snapshot of supervisor health, never blocks on a hung child.
#[derive(Debug, Clone)]
pub struct Status {
    pub running: bool,
    pub memory_mb: f64,
    pub uptime_secs: f64,
    pub exec_count: u64,
    pub cpu_ms: f64,
}

type ResourceCallback = dyn Fn(ResourceEvent) + Send + Sync;

/// Owns one Python subprocess and its stdin/stdout; never shared outside the
/// supervisor that spawned it.
struct ChildHandle {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<tokio::process::ChildStdout>,
}

pub struct ReplSupervisor {
    sandbox_config: SandboxConfig,
    running: AtomicBool,
    next_request_id: AtomicI64,
    exec_count: AtomicU64,
    started_at: RwLock<Option<Instant>>,
    exit_error: RwLock<Option<String>>,
    child: tokio::sync::Mutex<Option<ChildHandle>>,
    callback_handler: RwLock<Option<Arc<dyn CallbackHandler>>>,
    memory_handler: RwLock<Option<Arc<dyn MemoryHandler>>>,
    plugin_manager: RwLock<Option<Arc<PluginManager>>>,
    resource_callback: RwLock<Option<Box<ResourceCallback>>>,
    resource_baseline: RwLock<ResourceSample>,
    system: tokio::sync::Mutex<sysinfo::System>,
}

impl ReplSupervisor {
    pub fn new(sandbox_config: SandboxConfig) -> Arc<Self> {
        Arc::new(Self {
            sandbox_config,
            running: AtomicBool::new(false),
            next_request_id: AtomicI64::new(1),
            exec_count: AtomicU64::new(0),
            started_at: RwLock::new(None),
            exit_error: RwLock::new(None),
            child: tokio::sync::Mutex::new(None),
            callback_handler: RwLock::new(None),
            memory_handler: RwLock::new(None),
            plugin_manager: RwLock::new(None),
            resource_callback: RwLock::new(None),
            resource_baseline: RwLock::new(ResourceSample::default()),
            system: tokio::sync::Mutex::new(sysinfo::System::new()),
        })
    }

    pub fn set_callback_handler(&self, handler: Arc<dyn CallbackHandler>) {
        *self.callback_handler.write().unwrap() = Some(handler);
    }

    pub fn set_memory_handler(&self, handler: Arc<dyn MemoryHandler>) {
        *self.memory_handler.write().unwrap() = Some(handler);
    }

    pub fn set_plugin_manager(&self, manager: Arc<PluginManager>) {
        *self.plugin_manager.write().unwrap() = Some(manager);
    }

    pub fn set_resource_callback<F>(&self, callback: F)
    where
        F: Fn(ResourceEvent) + Send + Sync + 'static,
    {
        *self.resource_callback.write().unwrap() = Some(Box::new(callback));
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Spawn the child, convey sandbox env vars, and wait for the ready line.
    ///
    /// The startup `CancellationToken` only gates the handshake: cancelling
    /// it after `Start` returns must not kill the child (the REPL outlives
    /// the startup context).
    pub async fn start(&self, cancel: CancellationToken) -> Result<()> {
        if self.is_running() {
            return Ok(());
        }

        let mut cmd = tokio::process::Command::new("python3");
        cmd.arg("-u").arg("-c").arg(BOOTSTRAP_SCRIPT);
        for (key, value) in self.sandbox_config.env_vars() {
            cmd.env(key, value);
        }
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .map_err(|e| ReplError::Start(format!("failed to spawn python3: {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ReplError::Start("child has no stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ReplError::Start("child has no stdout".to_string()))?;
        let mut reader = BufReader::new(stdout);

        let ready = tokio::select! {
            line = read_ready_line(&mut reader) => line,
            _ = tokio::time::sleep(READY_TIMEOUT) => Err(ReplError::ReadyTimeout),
            _ = cancel.cancelled() => Err(ReplError::Start("startup cancelled".to_string())),
        };

        match ready {
            Ok(()) => {}
            Err(e) => {
                let _ = child.start_kill();
                return Err(e);
            }
        }

        if let Some(pid) = child.id() {
            let mut system = self.system.lock().await;
            system.refresh_all();
            let sample = sample_resources(&mut system, pid);
            *self.resource_baseline.write().unwrap() = sample;
        }

        *self.child.lock().await = Some(ChildHandle {
            child,
            stdin,
            stdout: reader,
        });
        self.running.store(true, Ordering::SeqCst);
        *self.started_at.write().unwrap() = Some(Instant::now());
        *self.exit_error.write().unwrap() = None;
        Ok(())
    }

    async fn ensure_started(&self) -> Result<()> {
        if self.is_running() {
            return Ok(());
        }
        let cancel = CancellationToken::new();
        // lazy start, bounded by the ready-line timeout
        timeout(READY_TIMEOUT, self.start(cancel))
            .await
            .map_err(|_| ReplError::ReadyTimeout)??;
        Ok(())
    }

    /// Idempotent: send `shutdown`, close stdin, wait, else SIGKILL.
    ///
    /// Marks the supervisor not-running *before* the polite path so
    /// re-entrant callers observe a consistent state immediately.
    pub async fn stop(&self) -> Result<()> {
        if !self.is_running() {
            return Ok(());
        }
        self.running.store(false, Ordering::SeqCst);

        let mut guard = self.child.lock().await;
        let Some(mut handle) = guard.take() else {
            return Ok(());
        };

        let id = self.next_request_id.fetch_add(1, Ordering::SeqCst);
        let request = Request::new(id, "shutdown", serde_json::json!({}));
        if let Ok(line) = serde_json::to_string(&request) {
            let _ = handle.stdin.write_all(format!("{line}\n").as_bytes()).await;
        }
        let _ = handle.stdin.shutdown().await;
        drop(handle.stdin);

        match timeout(STOP_GRACE_PERIOD, handle.child.wait()).await {
            Ok(_) => {}
            Err(_) => {
                let _ = handle.child.start_kill();
                let _ = handle.child.wait().await;
            }
        }
        Ok(())
    }

    fn record_process_exit(&self, reason: String) {
        self.running.store(false, Ordering::SeqCst);
        *self.exit_error.write().unwrap() = Some(reason);
    }

    /// Execute code; serialized by the per-supervisor child mutex (exactly
    /// one outstanding `Execute`). Callbacks arriving mid-call are serviced
    /// without extending the deadline.
    pub async fn execute(&self, cancel: CancellationToken, code: &str) -> Result<ExecuteOutcome> {
        self.ensure_started().await?;

        let request_timeout = Duration::from_secs(self.sandbox_config.execution_timeout_secs.max(1));
        let deadline = Instant::now() + request_timeout;

        let mut guard = self.child.lock().await;
        let Some(handle) = guard.as_mut() else {
            return Err(ReplError::NotRunning);
        };

        let start = Instant::now();
        let id = self.next_request_id.fetch_add(1, Ordering::SeqCst);
        let request = Request::new(id, "execute", serde_json::json!({ "code": code }));
        let line = serde_json::to_string(&request)?;
        handle
            .stdin
            .write_all(format!("{line}\n").as_bytes())
            .await?;

        let result = self.read_until_response(handle, id, &cancel, deadline).await;

        match &result {
            Ok(_) => {
                self.exec_count.fetch_add(1, Ordering::SeqCst);
                if let Some(pid) = handle.child.id() {
                    let mut system = self.system.lock().await;
                    system.refresh_all();
                    let sample = sample_resources(&mut system, pid);
                    self.emit_resource_events(sample);
                }
            }
            Err(ReplError::ProcessExited(reason)) => {
                self.record_process_exit(reason.clone());
            }
            _ => {}
        }
        drop(guard);

        let response = result?;
        let duration_ms = start.elapsed().as_millis() as u64;

        if let Some(error) = response.get("error_repr").and_then(|v| v.as_str()) {
            return Ok(ExecuteOutcome {
                output: response
                    .get("output")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string(),
                return_repr: None,
                error_repr: Some(error.to_string()),
                duration_ms,
            });
        }

        Ok(ExecuteOutcome {
            output: response
                .get("output")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            return_repr: response
                .get("return_repr")
                .and_then(|v| v.as_str())
                .map(String::from),
            error_repr: None,
            duration_ms,
        })
    }

    /// Read loop bounded by `deadline`: classify each line as a callback
    /// (dispatch and continue) or the matching response (return it).
    async fn read_until_response(
        &self,
        handle: &mut ChildHandle,
        request_id: i64,
        cancel: &CancellationToken,
        deadline: Instant,
    ) -> Result<serde_json::Value> {
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(ReplError::Timeout(
                    self.sandbox_config.execution_timeout_secs * 1000,
                ));
            }

            let mut line = String::new();
            let read_result = tokio::select! {
                res = handle.stdout.read_line(&mut line) => Some(res),
                _ = tokio::time::sleep(remaining) => None,
                _ = cancel.cancelled() => {
                    return Err(ReplError::Internal("execution cancelled".to_string()));
                }
            };

            let Some(read_result) = read_result else {
                return Err(ReplError::Timeout(
                    self.sandbox_config.execution_timeout_secs * 1000,
                ));
            };

            let bytes_read = read_result?;
            if bytes_read == 0 {
                let exit = handle.child.wait().await;
                let reason = match exit {
                    Ok(status) => format!("exited with {status}"),
                    Err(e) => format!("wait failed: {e}"),
                };
                return Err(ReplError::ProcessExited(reason));
            }

            match classify_line(line.trim_end()) {
                IncomingLine::Response(resp) if resp.id == request_id => {
                    if let Some(err) = resp.error {
                        return Err(ReplError::Internal(err.message));
                    }
                    return Ok(resp.result.unwrap_or(serde_json::Value::Null));
                }
                IncomingLine::Response(_) => {
                    // Response for a stale id; protocol guarantees exactly
                    // one outstanding Execute, so this should not occur, but
                    // we do not treat it as fatal.
                    continue;
                }
                IncomingLine::Callback(cb) => {
                    let response = self.dispatch_callback(cb.callback, cb.callback_id, cb.params).await;
                    let reply_line = serde_json::to_string(&response)?;
                    handle
                        .stdin
                        .write_all(format!("{reply_line}\n").as_bytes())
                        .await?;
                }
                IncomingLine::Malformed(_) => continue,
            }
        }
    }

    async fn dispatch_callback(
        &self,
        name: String,
        callback_id: i64,
        params: serde_json::Value,
    ) -> CallbackResponse {
        let decoded = match decode_callback(&name, params) {
            Ok(d) => d,
            Err(e) => return CallbackResponse::err(callback_id, e.to_string()),
        };

        match self.run_callback(decoded).await {
            Ok(response) => response_with_id(callback_id, response),
            Err(e) => CallbackResponse::err(callback_id, e.to_string()),
        }
    }

    async fn run_callback(&self, params: CallbackParams) -> Result<CallbackOutput> {
        match params {
            CallbackParams::LlmCall { prompt, context, model } => {
                let handler = self.require_callback_handler()?;
                let text = handler.llm_call(&prompt, &context, model.as_deref()).await?;
                Ok(CallbackOutput::One(text))
            }
            CallbackParams::LlmBatch { prompts, contexts, model } => {
                let handler = self.require_callback_handler()?;
                let results = handler.llm_batch(&prompts, &contexts, model.as_deref()).await?;
                Ok(CallbackOutput::Many(results))
            }
            CallbackParams::MemoryQuery { query, limit } => {
                let handler = self.require_memory_handler()?;
                let results = handler.query(&query, limit).await?;
                Ok(CallbackOutput::Many(results))
            }
            CallbackParams::MemoryAddFact { content, confidence } => {
                let handler = self.require_memory_handler()?;
                let id = handler.add_fact(&content, confidence).await?;
                Ok(CallbackOutput::One(id))
            }
            CallbackParams::MemoryAddExperience(p) => {
                let handler = self.require_memory_handler()?;
                let id = handler.add_experience(p).await?;
                Ok(CallbackOutput::One(id))
            }
            CallbackParams::MemoryGetContext { limit } => {
                let handler = self.require_memory_handler()?;
                let results = handler.get_context(limit).await?;
                Ok(CallbackOutput::Many(results))
            }
            CallbackParams::MemoryRelate { label, subject_id, object_id } => {
                let handler = self.require_memory_handler()?;
                let id = handler.relate(&label, &subject_id, &object_id).await?;
                Ok(CallbackOutput::One(id))
            }
            CallbackParams::PluginCall { function, args } => {
                let manager = self.require_plugin_manager()?;
                let result = manager.call(&function, &args).await?;
                Ok(CallbackOutput::One(result))
            }
            CallbackParams::PluginList {} => {
                let manager = self.require_plugin_manager()?;
                Ok(CallbackOutput::Many(manager.list()))
            }
        }
    }

    fn require_callback_handler(&self) -> Result<Arc<dyn CallbackHandler>> {
        self.callback_handler
            .read()
            .unwrap()
            .clone()
            .ok_or_else(|| ReplError::Internal("no callback handler configured".to_string()))
    }

    fn require_memory_handler(&self) -> Result<Arc<dyn MemoryHandler>> {
        self.memory_handler
            .read()
            .unwrap()
            .clone()
            .ok_or_else(|| ReplError::Internal("no memory handler configured".to_string()))
    }

    fn require_plugin_manager(&self) -> Result<Arc<PluginManager>> {
        self.plugin_manager
            .read()
            .unwrap()
            .clone()
            .ok_or_else(|| ReplError::Internal("no plugin manager configured".to_string()))
    }

    fn emit_resource_events(&self, sample: ResourceSample) {
        let monitor = ResourceMonitor::new(self.sandbox_config.clone(), *self.resource_baseline.read().unwrap());
        let events = monitor.classify(sample);
        if events.is_empty() {
            return;
        }
        let callback = self.resource_callback.read().unwrap();
        if let Some(cb) = callback.as_ref() {
            for event in events {
                cb(event);
            }
        }
    }

    pub async fn set_var(&self, name: &str, value: &str) -> Result<()> {
        self.call_method(
            "set_var",
            serde_json::json!({ "name": name, "value": value }),
        )
        .await?;
        Ok(())
    }

    pub async fn get_var(&self, name: &str, start: usize, end: usize) -> Result<VarValue> {
        let result = self
            .call_method(
                "get_var",
                serde_json::json!({ "name": name, "start": start, "end": end }),
            )
            .await?;
        Ok(VarValue {
            value: result
                .get("value")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            total_length: result
                .get("total_length")
                .and_then(|v| v.as_u64())
                .unwrap_or(0) as usize,
            type_name: result
                .get("type_name")
                .and_then(|v| v.as_str())
                .unwrap_or("str")
                .to_string(),
        })
    }

    pub async fn list_vars(&self) -> Result<Vec<String>> {
        let result = self.call_method("list_vars", serde_json::json!({})).await?;
        Ok(result
            .get("names")
            .and_then(|v| v.as_array())
            .map(|arr| arr.iter().filter_map(|v| v.as_str().map(String::from)).collect())
            .unwrap_or_default())
    }

    /// Never blocks on a hung REPL; returns `running=false` immediately if
    /// the supervisor flag says so.
    pub async fn status(&self) -> Status {
        if !self.is_running() {
            return Status {
                running: false,
                memory_mb: 0.0,
                uptime_secs: 0.0,
                exec_count: self.exec_count.load(Ordering::SeqCst),
                cpu_ms: 0.0,
            };
        }

        let uptime = self
            .started_at
            .read()
            .unwrap()
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0);

        let result = timeout(
            Duration::from_millis(500),
            self.call_method("status", serde_json::json!({})),
        )
        .await;

        match result {
            Ok(Ok(value)) => Status {
                running: true,
                memory_mb: value.get("memory_mb").and_then(|v| v.as_f64()).unwrap_or(0.0),
                uptime_secs: uptime,
                exec_count: value
                    .get("exec_count")
                    .and_then(|v| v.as_u64())
                    .unwrap_or_else(|| self.exec_count.load(Ordering::SeqCst)),
                cpu_ms: value.get("cpu_ms").and_then(|v| v.as_f64()).unwrap_or(0.0),
            },
            _ => Status {
                running: self.is_running(),
                memory_mb: 0.0,
                uptime_secs: uptime,
                exec_count: self.exec_count.load(Ordering::SeqCst),
                cpu_ms: 0.0,
            },
        }
    }

    pub fn exit_reason(&self) -> Option<String> {
        self.exit_error.read().unwrap().clone()
    }

    async fn call_method(&self, method: &str, params: serde_json::Value) -> Result<serde_json::Value> {
        self.ensure_started().await?;
        let deadline = Instant::now() + Duration::from_secs(self.sandbox_config.execution_timeout_secs.max(1));
        let mut guard = self.child.lock().await;
        let Some(handle) = guard.as_mut() else {
            return Err(ReplError::NotRunning);
        };

        let id = self.next_request_id.fetch_add(1, Ordering::SeqCst);
        let request = Request::new(id, method, params);
        let line = serde_json::to_string(&request)?;
        handle.stdin.write_all(format!("{line}\n").as_bytes()).await?;

        let cancel = CancellationToken::new();
        let result = self.read_until_response(handle, id, &cancel, deadline).await;
        if let Err(ReplError::ProcessExited(reason)) = &result {
            self.record_process_exit(reason.clone());
        }
        result
    }
}

enum CallbackOutput {
    One(String),
    Many(Vec<String>),
}

fn response_with_id(callback_id: i64, output: CallbackOutput) -> CallbackResponse {
    match output {
        CallbackOutput::One(s) => CallbackResponse::ok(callback_id, s),
        CallbackOutput::Many(v) => CallbackResponse::ok_many(callback_id, v),
    }
}

async fn read_ready_line(reader: &mut BufReader<tokio::process::ChildStdout>) -> Result<()> {
    let mut line = String::new();
    let n = reader.read_line(&mut line).await?;
    if n == 0 {
        return Err(ReplError::ReadyTimeout);
    }
    match classify_line(line.trim_end()) {
        IncomingLine::Response(resp) if resp.error.is_none() => Ok(()),
        _ => Err(ReplError::Bootstrap(format!("unexpected ready line: {line}"))),
    }
}

fn sample_resources(system: &mut sysinfo::System, pid: u32) -> ResourceSample {
    use sysinfo::Pid;
    if let Some(process) = system.process(Pid::from_u32(pid)) {
        ResourceSample {
            cpu_ms: (process.run_time() * 1000) as u64,
            peak_rss_mb: process.memory() / (1024 * 1024),
        }
    } else {
        ResourceSample::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn status_on_unstarted_supervisor_does_not_block() {
        let supervisor = ReplSupervisor::new(SandboxConfig::default());
        let status = supervisor.status().await;
        assert!(!status.running);
        assert_eq!(status.exec_count, 0);
    }

    #[tokio::test]
    async fn stop_on_unstarted_supervisor_is_a_no_op() {
        let supervisor = ReplSupervisor::new(SandboxConfig::default());
        supervisor.stop().await.unwrap();
        supervisor.stop().await.unwrap();
        assert!(!supervisor.is_running());
    }
}
