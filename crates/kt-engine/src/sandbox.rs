//! In-process stand-ins for the database and the benchmark harness.
//!
//! Both handles share one [`SandboxDatabase`]. Performance follows a smooth
//! synthetic surface over the knobs with a hidden optimum derived from the
//! seed, and the faults a real deployment produces (refused applies, missing
//! result files, garbage metrics) can be injected on a chosen trial.

use std::sync::Arc;

use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use kt_types::{Configuration, DbmsError, KnobSpace, KtResult, WorkloadError};

use crate::interface::{DbmsDriver, DbmsStats, WorkloadMetrics, WorkloadRunner};

/// Counters reported by [`SandboxDbms::stats`], in state-vector order.
pub const SANDBOX_STAT_NAMES: [&str; 8] = [
    "xact_commit",
    "xact_rollback",
    "blks_read",
    "blks_hit",
    "tup_returned",
    "tup_fetched",
    "buffers_alloc",
    "checkpoints_req",
];

/// Simulated run length in seconds; scales the cumulative counters.
const RUN_SECONDS: f64 = 60.0;

/// Width of the performance peak around the optimum, in unit coordinates.
const PEAK_WIDTH: f64 = 0.3;

/// Configuration for the sandbox database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Seed for the hidden optimum and the measurement noise.
    pub seed: u64,
    /// Relative standard deviation of multiplicative measurement noise.
    pub noise: f64,
    /// Throughput at the optimum, requests per second.
    pub peak_throughput: f64,
    /// p95 latency at the optimum, microseconds.
    pub peak_latency_us: f64,
    /// Refuse the apply of this trial number (0 is the baseline).
    pub fail_apply_on: Option<usize>,
    /// Produce no metrics for this trial number.
    pub drop_metrics_on: Option<usize>,
    /// Report NaN metrics for this trial number.
    pub nan_metrics_on: Option<usize>,
    /// Make `reset_to_default` fail.
    pub fail_reset: bool,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            seed: 7,
            noise: 0.0,
            peak_throughput: 2_000.0,
            peak_latency_us: 15_000.0,
            fail_apply_on: None,
            drop_metrics_on: None,
            nan_metrics_on: None,
            fail_reset: false,
        }
    }
}

impl SandboxConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_noise(mut self, noise: f64) -> Self {
        self.noise = noise;
        self
    }

    pub fn with_apply_failure(mut self, trial: usize) -> Self {
        self.fail_apply_on = Some(trial);
        self
    }

    pub fn with_missing_metrics(mut self, trial: usize) -> Self {
        self.drop_metrics_on = Some(trial);
        self
    }

    pub fn with_nan_metrics(mut self, trial: usize) -> Self {
        self.nan_metrics_on = Some(trial);
        self
    }

    pub fn with_reset_failure(mut self) -> Self {
        self.fail_reset = true;
        self
    }
}

#[derive(Debug)]
struct SandboxState {
    config: SandboxConfig,
    space: KnobSpace,
    /// Hidden optimum in unit coordinates, one per knob.
    optimum: Vec<f64>,
    current: Configuration,
    /// Apply calls so far; the latest apply belongs to trial `applies - 1`.
    applies: usize,
    ran: bool,
    metrics: Option<WorkloadMetrics>,
    stats: Option<DbmsStats>,
    noise_rng: ChaCha8Rng,
}

impl SandboxState {
    fn trial(&self) -> usize {
        self.applies.saturating_sub(1)
    }

    /// Closeness of `config` to the hidden optimum, in `(0, 1]`.
    fn quality(&self, config: &Configuration) -> f64 {
        let knobs = self.space.knobs();
        if knobs.is_empty() {
            return 1.0;
        }
        let encoded = self.space.encode(config);
        let total: f64 = knobs
            .iter()
            .zip(encoded.iter().zip(&self.optimum))
            .map(|(knob, (u, best))| {
                if knob.is_numeric() {
                    (-((u - best) / PEAK_WIDTH).powi(2)).exp()
                } else if (u - best).abs() < 1e-9 {
                    1.0
                } else {
                    0.8
                }
            })
            .sum();
        total / knobs.len() as f64
    }

    fn noise_factor(&mut self) -> f64 {
        if self.config.noise <= 0.0 {
            return 1.0;
        }
        let z: f64 = self.noise_rng.sample(StandardNormal);
        (1.0 + self.config.noise * z).max(0.05)
    }

    fn run_workload(&mut self) {
        let trial = self.trial();
        let quality = self.quality(&self.current);
        let factor = self.noise_factor();

        let mut throughput = self.config.peak_throughput * (0.2 + quality) / 1.2 * factor;
        let mut latency_p95 = self.config.peak_latency_us * 1.2 / (0.2 + quality) * factor;
        if self.config.nan_metrics_on == Some(trial) {
            warn!(trial, "Sandbox reporting NaN metrics");
            throughput = f64::NAN;
            latency_p95 = f64::NAN;
        }

        self.ran = true;
        self.stats = Some(synthetic_stats(throughput, quality));
        self.metrics = if self.config.drop_metrics_on == Some(trial) {
            warn!(trial, "Sandbox dropping workload metrics");
            None
        } else {
            Some(WorkloadMetrics {
                throughput: Some(throughput),
                latency_p95: Some(latency_p95),
                latency_p50: Some(latency_p95 * 0.55),
                extra: json!({ "quality": quality }),
            })
        };
        debug!(trial, quality, throughput, latency_p95, "Sandbox workload finished");
    }
}

fn synthetic_stats(throughput: f64, quality: f64) -> DbmsStats {
    let commits = throughput * RUN_SECONDS;
    let blocks = commits * 20.0;
    let values = [
        commits,
        commits * 0.01 * (1.2 - quality),
        blocks * (1.0 - quality) + 1.0,
        blocks * quality,
        commits * 50.0,
        commits * 12.0,
        (blocks * (1.0 - quality) + 1.0) * 0.8,
        (4.0 * (1.0 - quality)).round(),
    ];

    let mut database = Map::new();
    let mut bgwriter = Map::new();
    for (name, value) in SANDBOX_STAT_NAMES.iter().zip(values) {
        let view = if name.starts_with("buffers") || name.starts_with("checkpoints") {
            &mut bgwriter
        } else {
            &mut database
        };
        view.insert(name.to_string(), json!(value));
    }

    DbmsStats {
        numeric: values.to_vec(),
        raw: json!({
            "pg_stat_database": Value::Object(database),
            "pg_stat_bgwriter": Value::Object(bgwriter),
        }),
    }
}

/// Shared state behind a sandbox DBMS and its workload.
#[derive(Debug, Clone)]
pub struct SandboxDatabase {
    inner: Arc<Mutex<SandboxState>>,
}

impl SandboxDatabase {
    pub fn new(space: KnobSpace, config: SandboxConfig) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        let optimum: Vec<f64> = space
            .knobs()
            .iter()
            .map(|knob| {
                let u = rng.gen_range(0.1..0.9);
                // snap categorical axes onto a choice
                knob.encode(&knob.decode(u))
            })
            .collect();
        let noise_rng = ChaCha8Rng::seed_from_u64(config.seed.wrapping_add(1));

        info!(knobs = space.len(), seed = config.seed, "Created sandbox database");
        Self {
            inner: Arc::new(Mutex::new(SandboxState {
                config,
                current: space.sample_default(),
                space,
                optimum,
                applies: 0,
                ran: false,
                metrics: None,
                stats: None,
                noise_rng,
            })),
        }
    }

    pub fn dbms(&self) -> SandboxDbms {
        SandboxDbms {
            inner: Arc::clone(&self.inner),
        }
    }

    pub fn workload(&self) -> SandboxWorkload {
        SandboxWorkload {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Configuration currently in effect.
    pub fn current(&self) -> Configuration {
        self.inner.lock().current.clone()
    }

    /// The configuration with the highest expected performance.
    pub fn optimum(&self) -> Configuration {
        let state = self.inner.lock();
        state.space.decode(&state.optimum)
    }

    /// Noise-free quality of `config` in `(0, 1]`.
    pub fn quality(&self, config: &Configuration) -> f64 {
        self.inner.lock().quality(config)
    }

    pub fn applies(&self) -> usize {
        self.inner.lock().applies
    }
}

/// DBMS handle of a [`SandboxDatabase`].
#[derive(Debug, Clone)]
pub struct SandboxDbms {
    inner: Arc<Mutex<SandboxState>>,
}

impl DbmsDriver for SandboxDbms {
    fn apply(&mut self, config: &Configuration) -> KtResult<bool> {
        let mut state = self.inner.lock();
        let trial = state.applies;
        state.applies += 1;

        if state.config.fail_apply_on == Some(trial) {
            warn!(trial, "Sandbox refusing configuration");
            return Ok(false);
        }
        if let Err(e) = state.space.validate(config) {
            warn!(trial, error = %e, "Sandbox rejected invalid configuration");
            return Ok(false);
        }

        state.current = config.clone();
        state.ran = false;
        state.metrics = None;
        state.stats = None;
        Ok(true)
    }

    fn stats(&mut self) -> KtResult<DbmsStats> {
        let state = self.inner.lock();
        state.stats.clone().ok_or_else(|| {
            DbmsError::StatsUnavailable {
                reason: "no workload has run since the last apply".to_string(),
            }
            .into()
        })
    }

    fn reset_to_default(&mut self) -> KtResult<bool> {
        let mut state = self.inner.lock();
        if state.config.fail_reset {
            return Ok(false);
        }
        state.current = state.space.sample_default();
        state.ran = false;
        state.metrics = None;
        state.stats = None;
        Ok(true)
    }

    fn name(&self) -> &str {
        "sandbox"
    }
}

/// Workload handle of a [`SandboxDatabase`].
#[derive(Debug, Clone)]
pub struct SandboxWorkload {
    inner: Arc<Mutex<SandboxState>>,
}

impl WorkloadRunner for SandboxWorkload {
    fn run(&mut self) -> KtResult<()> {
        self.inner.lock().run_workload();
        Ok(())
    }

    fn metrics(&self) -> KtResult<WorkloadMetrics> {
        let state = self.inner.lock();
        if !state.ran {
            return Err(WorkloadError::NotRun.into());
        }
        state.metrics.clone().ok_or_else(|| {
            WorkloadError::MetricUnavailable {
                metric: "summary".to_string(),
            }
            .into()
        })
    }

    fn name(&self) -> &str {
        "sandbox"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kt_types::{KnobSpec, KtError, TargetMetric};

    fn space() -> KnobSpace {
        KnobSpace::from_specs(vec![
            KnobSpec::integer("shared_buffers", 128, 1_048_576, 16_384),
            KnobSpec::real("random_page_cost", 0.5, 8.0, 4.0),
            KnobSpec::categorical("wal_compression", vec!["on", "off"], "off"),
        ])
        .unwrap()
    }

    fn measure(db: &SandboxDatabase, config: &Configuration) -> WorkloadMetrics {
        let mut dbms = db.dbms();
        let mut workload = db.workload();
        assert!(dbms.apply(config).unwrap());
        workload.run().unwrap();
        workload.metrics().unwrap()
    }

    #[test]
    fn optimum_beats_default() {
        let db = SandboxDatabase::new(space(), SandboxConfig::default());
        let default = measure(&db, &space().sample_default());
        let best = measure(&db, &db.optimum());
        assert!(best.throughput > default.throughput);
        assert!(best.latency_p95 < default.latency_p95);
        assert!((db.quality(&db.optimum()) - 1.0).abs() < 1e-3);
    }

    #[test]
    fn optimum_depends_on_seed() {
        let a = SandboxDatabase::new(space(), SandboxConfig::default().with_seed(1));
        let b = SandboxDatabase::new(space(), SandboxConfig::default().with_seed(2));
        assert_ne!(a.optimum(), b.optimum());
    }

    #[test]
    fn handles_share_state() {
        let db = SandboxDatabase::new(space(), SandboxConfig::default());
        let target = space().decode(&[0.9, 0.1, 0.0]);
        db.dbms().apply(&target).unwrap();
        assert_eq!(db.current(), target);
        assert_eq!(db.applies(), 1);
    }

    #[test]
    fn stats_follow_the_run() {
        let db = SandboxDatabase::new(space(), SandboxConfig::default());
        let mut dbms = db.dbms();
        assert!(dbms.stats().is_err());

        measure(&db, &space().sample_default());
        let stats = dbms.stats().unwrap();
        assert_eq!(stats.numeric.len(), SANDBOX_STAT_NAMES.len());
        assert!(stats.raw["pg_stat_database"]["xact_commit"].as_f64().unwrap() > 0.0);
        assert!(stats.raw["pg_stat_bgwriter"].get("buffers_alloc").is_some());
    }

    #[test]
    fn metrics_before_run_are_an_error() {
        let db = SandboxDatabase::new(space(), SandboxConfig::default());
        assert!(matches!(
            db.workload().metrics(),
            Err(KtError::Workload(WorkloadError::NotRun))
        ));
    }

    #[test]
    fn injected_faults_hit_the_chosen_trial() {
        let config = SandboxConfig::default()
            .with_apply_failure(2)
            .with_missing_metrics(1)
            .with_nan_metrics(3);
        let db = SandboxDatabase::new(space(), config);
        let mut dbms = db.dbms();
        let mut workload = db.workload();
        let default = space().sample_default();

        // trial 0
        assert!(dbms.apply(&default).unwrap());
        workload.run().unwrap();
        assert!(workload.metrics().is_ok());

        // trial 1
        assert!(dbms.apply(&default).unwrap());
        workload.run().unwrap();
        assert!(matches!(
            workload.metrics(),
            Err(KtError::Workload(WorkloadError::MetricUnavailable { .. }))
        ));

        // trial 2
        assert!(!dbms.apply(&default).unwrap());

        // trial 3
        assert!(dbms.apply(&default).unwrap());
        workload.run().unwrap();
        let metrics = workload.metrics().unwrap();
        assert!(metrics.metric(TargetMetric::Throughput).unwrap().is_nan());
    }

    #[test]
    fn noise_is_seeded() {
        let run = || {
            let db = SandboxDatabase::new(space(), SandboxConfig::default().with_noise(0.1));
            (0..5)
                .map(|_| measure(&db, &space().sample_default()).throughput.unwrap_or_default())
                .collect::<Vec<_>>()
        };
        let first = run();
        assert_eq!(first, run());
        assert!(first.windows(2).any(|w| w[0] != w[1]));
    }

    #[test]
    fn reset_restores_defaults() {
        let db = SandboxDatabase::new(space(), SandboxConfig::default());
        let mut dbms = db.dbms();
        dbms.apply(&space().decode(&[1.0, 1.0, 1.0])).unwrap();
        assert!(dbms.reset_to_default().unwrap());
        assert_eq!(db.current(), space().sample_default());

        let failing = SandboxDatabase::new(space(), SandboxConfig::default().with_reset_failure());
        assert!(!failing.dbms().reset_to_default().unwrap());
    }

    #[test]
    fn invalid_configuration_is_refused() {
        let db = SandboxDatabase::new(space(), SandboxConfig::default());
        let other = KnobSpace::from_specs(vec![KnobSpec::integer("work_mem", 64, 1024, 64)]).unwrap();
        assert!(!db.dbms().apply(&other.sample_default()).unwrap());
    }

    #[test]
    fn categorical_knobs_move_quality() {
        let db = SandboxDatabase::new(space(), SandboxConfig::default());
        let best = db.optimum();
        let encoded = space().encode(&best);
        let flipped = space().decode(&[encoded[0], encoded[1], 1.0 - encoded[2]]);
        assert!(db.quality(&flipped) < db.quality(&best));
    }
}
