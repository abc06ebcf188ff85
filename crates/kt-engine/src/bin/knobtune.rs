//! knobtune - tune database knobs against the sandbox DBMS.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use crossbeam_channel::unbounded;
use tracing::{info, warn};

use kt_engine::{SandboxDatabase, StrategyKind, TunerConfig, TuningEngine, TuningEvent};
use kt_types::KnobRecord;

#[derive(Parser)]
#[command(name = "knobtune")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Closed-loop configuration search for database knobs", long_about = None)]
struct Cli {
    /// Tuner config (JSON). Without one, a built-in PostgreSQL knob set is tuned.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Optimizer: bo, rl or liquid-rl
    #[arg(short, long)]
    strategy: Option<StrategyKind>,

    /// Trials after the baseline
    #[arg(short, long)]
    trials: Option<usize>,

    #[arg(long)]
    seed: Option<u64>,

    /// Search in a random linear embedding of this many dimensions
    #[arg(long)]
    target_dim: Option<usize>,

    /// Quantize numeric knobs into at most this many buckets
    #[arg(long)]
    quantization_factor: Option<u64>,

    /// Probability of proposing a knob's special value
    #[arg(long)]
    bias_prob: Option<f64>,

    /// Directory for history.json
    #[arg(long)]
    results_dir: Option<PathBuf>,
}

fn demo_knobs() -> anyhow::Result<Vec<KnobRecord>> {
    let records = serde_json::json!([
        { "name": "shared_buffers", "vartype": "integer", "min_val": 128,
          "max_val": 1048576, "reset_val": 16384 },
        { "name": "effective_cache_size", "vartype": "integer", "min_val": 1,
          "max_val": 2097152, "reset_val": 524288 },
        { "name": "work_mem", "vartype": "integer", "min_val": 64,
          "max_val": 1048576, "reset_val": 4096 },
        { "name": "max_parallel_workers_per_gather", "vartype": "integer", "min_val": 0,
          "max_val": 64, "reset_val": 2 },
        { "name": "bgwriter_lru_maxpages", "vartype": "integer", "min_val": -1,
          "max_val": 1073741823, "reset_val": 100, "special_value": -1 },
        { "name": "effective_io_concurrency", "vartype": "integer", "min_val": 0,
          "max_val": 1000, "reset_val": 1, "special_value": 0 },
        { "name": "random_page_cost", "vartype": "real", "min_val": 0.0,
          "max_val": 10.0, "reset_val": 4.0 },
        { "name": "checkpoint_completion_target", "vartype": "real", "min_val": 0.0,
          "max_val": 1.0, "reset_val": 0.9 },
        { "name": "wal_compression", "vartype": "bool", "reset_val": "off" },
        { "name": "synchronous_commit", "vartype": "enum",
          "enumvals": ["local", "remote_write", "remote_apply", "on", "off"], "reset_val": "on" }
    ]);
    Ok(serde_json::from_value(records)?)
}

/// Wait for the progress listener. Returns `false` if it panicked.
fn join_listener(handle: std::thread::JoinHandle<()>) -> bool {
    match handle.join() {
        Ok(()) => true,
        Err(_) => {
            warn!("Progress listener panicked");
            false
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "knobtune=info,kt_engine=info,kt_optimizer=info".into()),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => TunerConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => TunerConfig::new(demo_knobs()?),
    };
    if let Some(strategy) = cli.strategy {
        config.strategy = strategy;
    }
    if let Some(trials) = cli.trials {
        config.trials = trials;
    }
    if let Some(seed) = cli.seed {
        config.seed = seed;
    }
    if let Some(dim) = cli.target_dim {
        config.adapters.target_dim = Some(dim);
    }
    if let Some(factor) = cli.quantization_factor {
        config.adapters.quantization_factor = Some(factor);
    }
    if let Some(prob) = cli.bias_prob {
        config.adapters.bias_prob = Some(prob);
    }
    if let Some(dir) = cli.results_dir {
        config.results_dir = Some(dir);
    }

    let space = config.knob_space().context("building knob space")?;
    let database = SandboxDatabase::new(space, config.sandbox.clone());

    let (tx, rx) = unbounded();
    let progress = std::thread::spawn(move || {
        for event in rx {
            if let TuningEvent::NewBest {
                trial_number,
                performance,
                improvement,
            } = event
            {
                info!(trial = trial_number, performance, improvement, "Progress");
            }
        }
    });

    let mut engine = TuningEngine::new(config, Box::new(database.dbms()), Box::new(database.workload()))?
        .with_events(tx);
    let result = engine.run();
    drop(engine);
    join_listener(progress);

    let best = result.context("tuning run failed")?;
    println!("{}", serde_json::to_string_pretty(&best)?);
    Ok(())
}
