//! Sandbox configuration and resource accounting.
//!
//! Generalized from `ProcessSandbox`/`SandboxConfig`'s one-shot timeout/output-cap
//! model to an environment-variable scheme (`RECURSE_*`) and per-call
//! rusage deltas.

use std::collections::HashMap;

/// Sandbox/resource configuration for the REPL child process.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Engage filesystem/network restrictions in the bootstrap script.
    pub sandbox_enabled: bool,
    /// Allow the child to open sockets.
    pub allow_network: bool,
    /// Soft/hard memory cap in MB (`RLIMIT_AS`-style).
    pub memory_limit_mb: Option<u64>,
    /// CPU-time cap in seconds.
    pub cpu_limit_secs: Option<u64>,
    /// Paths the sandbox may read.
    pub read_paths: Vec<String>,
    /// The single path the sandbox may write to.
    pub write_path: Option<String>,
    /// Execution timeout in seconds, applied per `Execute` call.
    pub execution_timeout_secs: u64,
    /// Fraction of `memory_limit_mb` that triggers a soft `ResourceEvent`.
    pub warn_threshold: f64,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            sandbox_enabled: true,
            allow_network: false,
            memory_limit_mb: Some(512),
            cpu_limit_secs: Some(30),
            read_paths: Vec::new(),
            write_path: None,
            execution_timeout_secs: 30,
            warn_threshold: 0.8,
        }
    }
}

impl SandboxConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.execution_timeout_secs = secs;
        self
    }

    pub fn with_memory_limit_mb(mut self, mb: u64) -> Self {
        self.memory_limit_mb = Some(mb);
        self
    }

    pub fn with_cpu_limit_secs(mut self, secs: u64) -> Self {
        self.cpu_limit_secs = Some(secs);
        self
    }

    pub fn allow_network(mut self, allow: bool) -> Self {
        self.allow_network = allow;
        self
    }

    pub fn without_sandbox(mut self) -> Self {
        self.sandbox_enabled = false;
        self
    }

    /// Environment variables conveyed to the child.
    pub fn env_vars(&self) -> HashMap<String, String> {
        let mut env = HashMap::new();
        if self.sandbox_enabled {
            env.insert("RECURSE_SANDBOX".to_string(), "1".to_string());
        }
        if self.allow_network {
            env.insert("RECURSE_NETWORK".to_string(), "1".to_string());
        }
        if let Some(mb) = self.memory_limit_mb {
            env.insert("RECURSE_MEMORY_LIMIT_MB".to_string(), mb.to_string());
        }
        if let Some(secs) = self.cpu_limit_secs {
            env.insert("RECURSE_CPU_LIMIT_SEC".to_string(), secs.to_string());
        }
        env
    }
}

/// Soft or hard breach of a configured resource cap, surfaced to the caller's
/// policy (termination itself is delegated).
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceEvent {
    /// Peak RSS crossed `warn_threshold` of the memory limit.
    SoftMemory { peak_mb: u64, limit_mb: u64 },
    /// Peak RSS crossed the memory limit outright.
    HardMemory { peak_mb: u64, limit_mb: u64 },
    /// CPU time for this call crossed the configured cap.
    HardCpu { cpu_ms: u64, limit_secs: u64 },
}

/// Rusage-style deltas captured before/after a single `Execute` call.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResourceSample {
    pub cpu_ms: u64,
    pub peak_rss_mb: u64,
}

/// Tracks a resource baseline and classifies deltas against `SandboxConfig`.
pub struct ResourceMonitor {
    config: SandboxConfig,
    baseline: ResourceSample,
}

impl ResourceMonitor {
    pub fn new(config: SandboxConfig, baseline: ResourceSample) -> Self {
        Self { config, baseline }
    }

    pub fn baseline(&self) -> ResourceSample {
        self.baseline
    }

    /// Classify a post-call sample against the configured caps, returning
    /// events in severity order (a hard breach does not suppress a lesser one).
    pub fn classify(&self, sample: ResourceSample) -> Vec<ResourceEvent> {
        let mut events = Vec::new();

        if let Some(limit_mb) = self.config.memory_limit_mb {
            if sample.peak_rss_mb > limit_mb {
                events.push(ResourceEvent::HardMemory {
                    peak_mb: sample.peak_rss_mb,
                    limit_mb,
                });
            } else if (sample.peak_rss_mb as f64) > (limit_mb as f64) * self.config.warn_threshold
            {
                events.push(ResourceEvent::SoftMemory {
                    peak_mb: sample.peak_rss_mb,
                    limit_mb,
                });
            }
        }

        if let Some(limit_secs) = self.config.cpu_limit_secs {
            let delta_cpu_ms = sample.cpu_ms.saturating_sub(self.baseline.cpu_ms);
            if delta_cpu_ms > limit_secs * 1000 {
                events.push(ResourceEvent::HardCpu {
                    cpu_ms: delta_cpu_ms,
                    limit_secs,
                });
            }
        }

        events
    }
}
