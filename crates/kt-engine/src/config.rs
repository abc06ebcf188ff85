//! Run configuration loaded from JSON.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::info;

use kt_optimizer::{BoConfig, RlConfig};
use kt_space::AdapterConfig;
use kt_types::{config_error, KnobRecord, KnobSpace, KtResult, TargetMetric};

use crate::sandbox::SandboxConfig;

/// Which optimizer drives the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    Bo,
    Rl,
    LiquidRl,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Bo => "bo",
            StrategyKind::Rl => "rl",
            StrategyKind::LiquidRl => "liquid-rl",
        }
    }
}

impl Default for StrategyKind {
    fn default() -> Self {
        StrategyKind::Bo
    }
}

impl FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bo" => Ok(StrategyKind::Bo),
            "rl" | "ddpg" => Ok(StrategyKind::Rl),
            "liquid-rl" | "liquid_rl" | "liquid" => Ok(StrategyKind::LiquidRl),
            other => Err(format!("unknown strategy '{other}', expected bo, rl or liquid-rl")),
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a tuning run needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TunerConfig {
    /// Inline knob records.
    pub knobs: Vec<KnobRecord>,
    /// JSON array of knob records, appended to `knobs`. Relative paths
    /// resolve against the config file's directory.
    pub knob_file: Option<PathBuf>,
    pub ignored_knobs: Vec<String>,
    pub seed: u64,
    pub target_metric: TargetMetric,
    pub strategy: StrategyKind,
    /// Trials after the baseline.
    pub trials: usize,
    pub adapters: AdapterConfig,
    pub bo: BoConfig,
    pub rl: RlConfig,
    pub sandbox: SandboxConfig,
    /// Where `history.json` is written. Nothing is written when unset.
    pub results_dir: Option<PathBuf>,
}

impl Default for TunerConfig {
    fn default() -> Self {
        Self {
            knobs: Vec::new(),
            knob_file: None,
            ignored_knobs: Vec::new(),
            seed: 42,
            target_metric: TargetMetric::default(),
            strategy: StrategyKind::default(),
            trials: 50,
            adapters: AdapterConfig::default(),
            bo: BoConfig::default(),
            rl: RlConfig::default(),
            sandbox: SandboxConfig::default(),
            results_dir: None,
        }
    }
}

impl TunerConfig {
    pub fn new(knobs: Vec<KnobRecord>) -> Self {
        Self {
            knobs,
            ..Self::default()
        }
    }

    /// Load from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> KtResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| config_error!("cannot read {}: {}", path.display(), e))?;
        let mut config: TunerConfig = serde_json::from_str(&text)?;

        if let (Some(file), Some(dir)) = (&config.knob_file, path.parent()) {
            if file.is_relative() {
                config.knob_file = Some(dir.join(file));
            }
        }
        info!(path = %path.display(), strategy = %config.strategy, "Loaded tuner config");
        Ok(config)
    }

    pub fn with_strategy(mut self, strategy: StrategyKind) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_trials(mut self, trials: usize) -> Self {
        self.trials = trials;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_target_metric(mut self, target: TargetMetric) -> Self {
        self.target_metric = target;
        self
    }

    pub fn with_adapters(mut self, adapters: AdapterConfig) -> Self {
        self.adapters = adapters;
        self
    }

    pub fn with_bo(mut self, bo: BoConfig) -> Self {
        self.bo = bo;
        self
    }

    pub fn with_rl(mut self, rl: RlConfig) -> Self {
        self.rl = rl;
        self
    }

    pub fn with_sandbox(mut self, sandbox: SandboxConfig) -> Self {
        self.sandbox = sandbox;
        self
    }

    pub fn with_ignored_knobs(mut self, names: Vec<String>) -> Self {
        self.ignored_knobs = names;
        self
    }

    pub fn with_results_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.results_dir = Some(dir.into());
        self
    }

    pub fn validate(&self) -> KtResult<()> {
        if self.trials == 0 {
            return Err(config_error!("trials must be positive"));
        }
        if self.knobs.is_empty() && self.knob_file.is_none() {
            return Err(config_error!("no knobs configured"));
        }
        self.bo.validate()?;
        self.rl.validate()?;
        Ok(())
    }

    /// Build the knob space from the inline records and the knob file.
    pub fn knob_space(&self) -> KtResult<KnobSpace> {
        let mut records = self.knobs.clone();
        if let Some(path) = &self.knob_file {
            let text = std::fs::read_to_string(path)
                .map_err(|e| config_error!("cannot read knob file {}: {}", path.display(), e))?;
            let file_records: Vec<KnobRecord> = serde_json::from_str(&text)?;
            records.extend(file_records);
        }
        Ok(KnobSpace::build(&records, &self.ignored_knobs)?)
    }
}
