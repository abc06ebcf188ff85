//! # kt-engine
//!
//! The closed-loop tuning engine for knobtune.
//!
//! Measures the default configuration, hands the search to the configured
//! optimizer, records every trial in the experiment state and exports the
//! history. The database and the benchmark harness sit behind the
//! [`DbmsDriver`] and [`WorkloadRunner`] traits; an in-process sandbox
//! implementation of both ships for development and tests.

pub mod config;
pub mod context;
pub mod engine;
pub mod events;
pub mod interface;
pub mod sandbox;

pub use config::{StrategyKind, TunerConfig};
pub use context::ExperimentContext;
pub use engine::{TuningEngine, HISTORY_FILE};
pub use events::{EventSink, TuningEvent};
pub use interface::{DbmsDriver, DbmsStats, WorkloadMetrics, WorkloadRunner};
pub use sandbox::{SandboxConfig, SandboxDatabase, SandboxDbms, SandboxWorkload, SANDBOX_STAT_NAMES};
