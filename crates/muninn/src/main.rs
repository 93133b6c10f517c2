//! muninn: recursive language model agent runtime.
//!
//! A REPL-driven LATS controller over a tiered memory substrate, with a
//! synthetic long-context benchmark harness for evaluating the whole stack.

mod callbacks;
mod config;
mod oracle;
mod session;
mod tools_builtin;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use muninn_bench::{generate_suite, AggregationGenerator, ContextRotAnalyzer, CountingGenerator, Executor,
    ExecutorOutput, MultiGenerator, NeedleGenerator, PairingGenerator, Runner, RunnerConfig, TaskGenerator};
use muninn_lats::{Expander, HeuristicValuator, LatsController, LlmExpander, LlmOracle, RealSimulator,
    ReplExecuteTool, Simulator, ToolRegistry};
use muninn_memory::{GraphStore, NodeStore, Tier};
use muninn_repl::{CancellationToken, ReplSupervisor, SandboxConfig};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use callbacks::{HostCallbackHandler, HostMemoryHandler};
use config::Config;
use oracle::{AnthropicOracle, MockOracle};
use session::{session_dir, SessionId, SessionMetadata};
use tools_builtin::{FinalAnswerTool, MemorySearchTool};

/// Recursive language model agent runtime.
#[derive(Parser)]
#[command(name = "muninn")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Project root (default: search upward for .muninn/config.toml from cwd)
    #[arg(long, global = true)]
    workdir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a .muninn directory with a default config file.
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },

    /// Execute a single snippet of Python in the sandboxed REPL.
    Repl {
        /// Python source to execute. Reads stdin if omitted.
        #[arg(long)]
        code: Option<String>,
    },

    /// Run a LATS tree search to answer a query.
    Solve {
        /// The question or task to solve.
        query: String,

        /// Override the configured max iterations.
        #[arg(long)]
        max_iterations: Option<u32>,
    },

    /// Inspect and populate the tiered memory substrate.
    #[command(subcommand)]
    Memory(MemoryCommand),

    /// Run the synthetic long-context benchmark harness.
    Bench {
        /// Which generator to draw tasks from.
        #[arg(long, default_value = "counting")]
        generator: String,

        /// Number of tasks to generate.
        #[arg(long, default_value_t = 10)]
        count: usize,

        /// Approximate prompt length in whitespace-split tokens.
        #[arg(long, default_value_t = 2_000)]
        context_tokens: usize,

        /// Base seed; task i is seeded with `seed + i`.
        #[arg(long)]
        seed: Option<u64>,
    },
}

#[derive(Subcommand)]
enum MemoryCommand {
    /// Record a fact node.
    AddFact {
        content: String,
        #[arg(long)]
        confidence: Option<f32>,
        #[arg(long, default_value = "session")]
        tier: String,
    },
    /// Record an entity node.
    AddEntity {
        content: String,
        #[arg(long)]
        subtype: String,
        #[arg(long, default_value = "session")]
        tier: String,
    },
    /// Search a tier's nodes by relevance to a query.
    Search {
        query: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        #[arg(long, default_value = "session")]
        tier: String,
    },
    /// List the most recent nodes in a tier.
    Context {
        #[arg(long, default_value_t = 10)]
        limit: usize,
        #[arg(long, default_value = "session")]
        tier: String,
    },
    /// Walk relations out from a node.
    Related {
        node_id: String,
        #[arg(long, default_value_t = 2)]
        depth: usize,
    },
    /// Print per-tier node/edge counts.
    Stats,
}

fn parse_tier(s: &str) -> Tier {
    match s.to_lowercase().as_str() {
        "task" => Tier::Task,
        "long_term" | "long-term" | "longterm" => Tier::LongTerm,
        _ => Tier::Session,
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();
}

fn project_root(cli_workdir: Option<&PathBuf>) -> PathBuf {
    cli_workdir
        .cloned()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
}

fn build_oracle(config: &Config) -> Arc<dyn LlmOracle> {
    if config.provider.backend == "anthropic" {
        if let Ok(key) = std::env::var("ANTHROPIC_API_KEY") {
            return Arc::new(AnthropicOracle::new(key, config.provider.model.clone()));
        }
        tracing::warn!("provider.backend = \"anthropic\" but ANTHROPIC_API_KEY is unset, falling back to mock");
    }
    Arc::new(MockOracle)
}

fn open_memory_store(config: &Config, muninn_dir: Option<&std::path::Path>) -> Result<GraphStore> {
    let path = config.resolve_memory_path(muninn_dir);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    GraphStore::with_tier_limits(&path, config.memory.to_tier_limits())
        .with_context(|| format!("failed to open memory database at {}", path.display()))
}

fn build_tool_registry(supervisor: Arc<ReplSupervisor>, store: Arc<dyn NodeStore>) -> Arc<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    registry.register(ReplExecuteTool::new(supervisor));
    registry.register(MemorySearchTool::new(store));
    registry.register(FinalAnswerTool);
    Arc::new(registry)
}

async fn start_supervisor(
    config: &Config,
    oracle: Arc<dyn LlmOracle>,
    store: Arc<dyn NodeStore>,
) -> Result<Arc<ReplSupervisor>> {
    let mut sandbox = SandboxConfig::new()
        .with_timeout(config.sandbox.execution_timeout_secs)
        .with_memory_limit_mb(config.sandbox.memory_limit_mb)
        .with_cpu_limit_secs(config.sandbox.cpu_limit_secs)
        .allow_network(config.sandbox.allow_network);
    if !config.sandbox.enabled {
        sandbox = sandbox.without_sandbox();
    }

    let supervisor = ReplSupervisor::new(sandbox);
    supervisor.set_callback_handler(Arc::new(HostCallbackHandler::new(oracle)));
    supervisor.set_memory_handler(Arc::new(HostMemoryHandler::new(store)));
    supervisor.start(CancellationToken::new()).await?;
    Ok(supervisor)
}

async fn run_init(root: &PathBuf, force: bool) -> Result<()> {
    let muninn_dir = root.join(config::MUNINN_DIR);
    std::fs::create_dir_all(&muninn_dir)?;
    let config_path = muninn_dir.join(config::CONFIG_FILE);
    if config_path.exists() && !force {
        println!("{} already exists (use --force to overwrite)", config_path.display());
        return Ok(());
    }
    let default_config = Config::default();
    let toml = toml::to_string_pretty(&default_config)?;
    std::fs::write(&config_path, toml)?;
    println!("wrote {}", config_path.display());
    Ok(())
}

async fn run_repl(config: &Config, code: Option<String>) -> Result<()> {
    let oracle = build_oracle(config);
    let store: Arc<dyn NodeStore> = Arc::new(open_memory_store(config, None)?);
    let supervisor = start_supervisor(config, oracle, store).await?;

    let source = match code {
        Some(c) => c,
        None => {
            use std::io::Read;
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };

    let outcome = supervisor.execute(CancellationToken::new(), &source).await?;
    if !outcome.output.is_empty() {
        print!("{}", outcome.output);
    }
    if let Some(repr) = &outcome.return_repr {
        println!("{repr}");
    }
    if let Some(error) = &outcome.error_repr {
        eprintln!("{error}");
    }
    supervisor.stop().await?;
    Ok(())
}

async fn run_solve(config: &Config, query: &str, max_iterations: Option<u32>) -> Result<()> {
    let oracle = build_oracle(config);
    let store: Arc<dyn NodeStore> = Arc::new(open_memory_store(config, None)?);
    let supervisor = start_supervisor(config, oracle.clone(), store.clone()).await?;
    let registry = build_tool_registry(supervisor.clone(), store);

    let mut lats_config = config.lats.to_lats_config();
    if let Some(n) = max_iterations {
        lats_config = lats_config.with_max_iterations(n);
    }

    let expander: Arc<dyn Expander> = Arc::new(LlmExpander::new(oracle.clone(), registry.clone(), 3));
    let valuator = Arc::new(HeuristicValuator::default());
    let simulator: Arc<dyn Simulator> = Arc::new(RealSimulator::new(registry, valuator, lats_config.max_depth));

    let controller = LatsController::new(lats_config);
    let solution = controller.solve(query, expander, simulator, CancellationToken::new()).await;

    info!(
        iterations = solution.iterations,
        tree_size = solution.tree_size,
        tokens = solution.total_tokens,
        reason = ?solution.termination_reason,
        "search finished"
    );
    println!("{}", solution.final_answer);

    supervisor.stop().await?;
    Ok(())
}

async fn run_memory(config: &Config, command: MemoryCommand) -> Result<()> {
    let store = open_memory_store(config, None)?;
    match command {
        MemoryCommand::AddFact { content, confidence, tier } => {
            let (node, warning) = store.add_fact(parse_tier(&tier), &content, confidence)?;
            println!("{}", node.id);
            if let Some(w) = warning {
                eprintln!("warning: {w}");
            }
        }
        MemoryCommand::AddEntity { content, subtype, tier } => {
            let (node, warning) = store.add_entity(parse_tier(&tier), &content, &subtype)?;
            println!("{}", node.id);
            if let Some(w) = warning {
                eprintln!("warning: {w}");
            }
        }
        MemoryCommand::Search { query, limit, tier } => {
            for (node, score) in store.search(parse_tier(&tier), &query, limit)? {
                println!("[{score:.2}] {} ({})", node.content, node.id);
            }
        }
        MemoryCommand::Context { limit, tier } => {
            for node in store.get_context(parse_tier(&tier), limit)? {
                println!("{} ({})", node.content, node.id);
            }
        }
        MemoryCommand::Related { node_id, depth } => {
            for (node, hops) in store.get_related(&node_id, depth)? {
                println!("{hops} hop(s): {} ({})", node.content, node.id);
            }
        }
        MemoryCommand::Stats => {
            let stats = store.stats()?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
    }
    Ok(())
}

struct LatsExecutor {
    oracle: Arc<dyn LlmOracle>,
    registry: Arc<ToolRegistry>,
    lats_config: muninn_lats::LatsConfig,
}

#[async_trait::async_trait]
impl Executor for LatsExecutor {
    async fn run(
        &self,
        task: &muninn_bench::Task,
        cancel: CancellationToken,
    ) -> std::result::Result<ExecutorOutput, String> {
        let expander: Arc<dyn Expander> = Arc::new(LlmExpander::new(self.oracle.clone(), self.registry.clone(), 3));
        let valuator = Arc::new(HeuristicValuator::default());
        let simulator: Arc<dyn Simulator> =
            Arc::new(RealSimulator::new(self.registry.clone(), valuator, self.lats_config.max_depth));
        let controller = LatsController::new(self.lats_config.clone());
        let solution = controller.solve(&task.prompt, expander, simulator, cancel).await;
        Ok(ExecutorOutput {
            answer: solution.final_answer,
            tokens: solution.total_tokens,
            iterations: solution.iterations,
        })
    }
}

fn generator_for(name: &str) -> Box<dyn TaskGenerator> {
    match name.to_lowercase().as_str() {
        "needle" => Box::new(NeedleGenerator),
        "pairing" => Box::new(PairingGenerator),
        "aggregation" => Box::new(AggregationGenerator),
        "multi" => Box::new(MultiGenerator::new()),
        _ => Box::new(CountingGenerator),
    }
}

async fn run_bench(
    config: &Config,
    generator: &str,
    count: usize,
    context_tokens: usize,
    seed: Option<u64>,
) -> Result<()> {
    let oracle = build_oracle(config);
    let store: Arc<dyn NodeStore> = Arc::new(open_memory_store(config, None)?);
    let supervisor = start_supervisor(config, oracle.clone(), store.clone()).await?;
    let registry = build_tool_registry(supervisor.clone(), store);

    let gen = generator_for(generator);
    let base_seed = seed.unwrap_or(config.bench.default_seed);
    let tasks = generate_suite(gen.as_ref(), base_seed, context_tokens, count);

    let executor = LatsExecutor {
        oracle,
        registry,
        lats_config: config.lats.to_lats_config(),
    };

    let runner_config = RunnerConfig {
        per_task_timeout: std::time::Duration::from_secs(config.bench.per_task_timeout_secs),
    };
    let runner = Runner::new(runner_config);
    let report = runner.run_suite(&tasks, &executor, CancellationToken::new()).await;

    println!(
        "{}/{} correct ({:.1}% accuracy), mean score {:.3}, {} tokens, {}ms total",
        report.summary.correct_count,
        report.summary.task_count,
        report.summary.accuracy * 100.0,
        report.summary.mean_score,
        report.summary.total_tokens,
        report.total_duration_ms,
    );

    let rot = ContextRotAnalyzer::new().analyze(&report.results);
    println!("context-rot slope: {:.6}", rot.degradation_slope);

    supervisor.stop().await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let root = project_root(cli.workdir.as_ref());
    let config = match config::Config::find_and_load_from(&root)? {
        Some((config, _dir)) => config,
        None => Config::load_or_default(&root),
    };

    let session_id = SessionId::generate();
    let metadata = SessionMetadata::new(&session_id, root.clone());
    let dir = session_dir(&root.join(config::MUNINN_DIR), &session_id);
    if std::fs::create_dir_all(&dir).is_ok() {
        let _ = session::write_metadata(&dir, &metadata);
    }

    match cli.command {
        Commands::Init { force } => run_init(&root, force).await,
        Commands::Repl { code } => run_repl(&config, code).await,
        Commands::Solve { query, max_iterations } => run_solve(&config, &query, max_iterations).await,
        Commands::Memory(command) => run_memory(&config, command).await,
        Commands::Bench { generator, count, context_tokens, seed } => {
            run_bench(&config, &generator, count, context_tokens, seed).await
        }
    }
}
