//! Minimal configuration surface for the `muninn` CLI.
//!
//! Configuration loading is explicitly out of scope as a rich product
//! feature: there is no project-wide discovery/validation tree here. This
//! is a typed `.muninn/config.toml` wiring the four subsystems' budgets,
//! provider selection, and sandbox limits, kept small on purpose.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// The muninn data directory name (session logs, memory database).
pub const MUNINN_DIR: &str = ".muninn";
/// The config file name within the muninn directory.
pub const CONFIG_FILE: &str = "config.toml";

/// Top-level configuration, one section per subsystem.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct Config {
    pub project: ProjectConfig,
    pub sandbox: SandboxSettings,
    pub lats: LatsSettings,
    pub memory: MemorySettings,
    pub bench: BenchSettings,
    pub provider: ProviderSettings,
}

/// Project root, used to resolve relative paths (memory DB, plugin dirs).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProjectConfig {
    pub root: PathBuf,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
        }
    }
}

/// REPL sandbox defaults, mapped onto `RECURSE_*` child environment
/// variables by `muninn_repl::SandboxConfig`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SandboxSettings {
    pub enabled: bool,
    pub allow_network: bool,
    pub memory_limit_mb: u64,
    pub cpu_limit_secs: u64,
    pub execution_timeout_secs: u64,
}

impl Default for SandboxSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            allow_network: false,
            memory_limit_mb: 512,
            cpu_limit_secs: 30,
            execution_timeout_secs: 30,
        }
    }
}

/// LATS search budget defaults.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LatsSettings {
    pub max_iterations: u32,
    pub max_depth: u32,
    pub exploration_constant: f64,
    pub token_budget: u64,
    pub wall_clock_timeout_secs: u64,
    pub gamma: f64,
}

impl Default for LatsSettings {
    fn default() -> Self {
        let defaults = muninn_lats::LatsConfig::default();
        Self {
            max_iterations: defaults.max_iterations,
            max_depth: defaults.max_depth,
            exploration_constant: defaults.exploration_constant,
            token_budget: defaults.token_budget,
            wall_clock_timeout_secs: defaults.wall_clock_timeout.as_secs(),
            gamma: defaults.gamma,
        }
    }
}

impl LatsSettings {
    pub fn to_lats_config(&self) -> muninn_lats::LatsConfig {
        muninn_lats::LatsConfig {
            max_iterations: self.max_iterations,
            max_depth: self.max_depth,
            exploration_constant: self.exploration_constant,
            token_budget: self.token_budget,
            simulation_depth: 1,
            wall_clock_timeout: std::time::Duration::from_secs(self.wall_clock_timeout_secs),
            gamma: self.gamma,
        }
    }
}

/// Memory substrate tier capacities and database path.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MemorySettings {
    pub path: PathBuf,
    pub task_capacity: usize,
    pub session_capacity: usize,
    pub long_term_capacity: usize,
}

impl Default for MemorySettings {
    fn default() -> Self {
        let defaults = muninn_memory::TierLimits::default();
        Self {
            path: PathBuf::from("memory.db"),
            task_capacity: defaults.task,
            session_capacity: defaults.session,
            long_term_capacity: defaults.long_term,
        }
    }
}

impl MemorySettings {
    pub fn to_tier_limits(&self) -> muninn_memory::TierLimits {
        muninn_memory::TierLimits {
            task: self.task_capacity,
            session: self.session_capacity,
            long_term: self.long_term_capacity,
        }
    }
}

/// Benchmark harness defaults.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BenchSettings {
    pub default_seed: u64,
    pub per_task_timeout_secs: u64,
}

impl Default for BenchSettings {
    fn default() -> Self {
        Self {
            default_seed: 42,
            per_task_timeout_secs: 30,
        }
    }
}

/// Which LLM oracle the CLI wires up, and with which model.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProviderSettings {
    /// "anthropic" or "mock".
    pub backend: String,
    pub model: String,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            backend: "mock".to_string(),
            model: "claude-sonnet-4-5".to_string(),
        }
    }
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Search `.muninn/config.toml` starting at `start` and walking up to
    /// parent directories. Returns the config and the `.muninn` dir it was
    /// found in.
    pub fn find_and_load_from(start: &Path) -> Result<Option<(Self, PathBuf)>> {
        let mut dir = start.to_path_buf();
        loop {
            let muninn_dir = dir.join(MUNINN_DIR);
            let config_path = muninn_dir.join(CONFIG_FILE);
            if config_path.exists() {
                return Ok(Some((Self::from_file(&config_path)?, muninn_dir)));
            }
            if !dir.pop() {
                break;
            }
        }
        Ok(None)
    }

    pub fn load_or_default(start: &Path) -> Self {
        match Self::find_and_load_from(start) {
            Ok(Some((config, path))) => {
                tracing::info!("loaded config from {}", path.display());
                config
            }
            Ok(None) => {
                tracing::debug!("no .muninn/config.toml found, using defaults");
                Self::default()
            }
            Err(e) => {
                tracing::warn!("failed to load config: {e}, using defaults");
                Self::default()
            }
        }
    }

    /// Resolve `memory.path` relative to the `.muninn` directory.
    pub fn resolve_memory_path(&self, muninn_dir: Option<&Path>) -> PathBuf {
        if self.memory.path.is_absolute() {
            self.memory.path.clone()
        } else if let Some(dir) = muninn_dir {
            dir.join(&self.memory.path)
        } else {
            PathBuf::from(MUNINN_DIR).join(&self.memory.path)
        }
    }
}
