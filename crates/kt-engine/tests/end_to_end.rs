//! Actor-critic search against a one-knob quadratic cost surface, compared
//! with plain random sampling.

use std::sync::Arc;

use parking_lot::Mutex;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde_json::{json, Value};

use kt_engine::{DbmsDriver, DbmsStats, StrategyKind, TunerConfig, TuningEngine, WorkloadMetrics, WorkloadRunner};
use kt_optimizer::RlConfig;
use kt_types::{Configuration, KnobRecord, KnobValue, KtResult, TargetMetric};

const OPTIMUM: f64 = 65_536.0;
const DEFAULT: i64 = 16_384;

fn cost(shared_buffers: i64) -> f64 {
    (shared_buffers as f64 - OPTIMUM).powi(2)
}

fn records() -> Vec<KnobRecord> {
    serde_json::from_value(json!([
        { "name": "shared_buffers", "vartype": "integer", "min_val": 128,
          "max_val": 1048576, "reset_val": DEFAULT }
    ]))
    .unwrap()
}

fn shared_buffers(config: &Configuration) -> i64 {
    match config.get("shared_buffers") {
        Some(KnobValue::Int(v)) => *v,
        _ => DEFAULT,
    }
}

struct QuadraticDbms {
    current: Arc<Mutex<i64>>,
}

impl DbmsDriver for QuadraticDbms {
    fn apply(&mut self, config: &Configuration) -> KtResult<bool> {
        *self.current.lock() = shared_buffers(config);
        Ok(true)
    }

    fn stats(&mut self) -> KtResult<DbmsStats> {
        let sb = *self.current.lock();
        Ok(DbmsStats {
            numeric: vec![sb as f64 / 1_048_576.0, cost(sb).sqrt() / 1_048_576.0],
            raw: Value::Null,
        })
    }

    fn reset_to_default(&mut self) -> KtResult<bool> {
        *self.current.lock() = DEFAULT;
        Ok(true)
    }

    fn name(&self) -> &str {
        "quadratic"
    }
}

struct QuadraticWorkload {
    current: Arc<Mutex<i64>>,
}

impl WorkloadRunner for QuadraticWorkload {
    fn run(&mut self) -> KtResult<()> {
        Ok(())
    }

    fn metrics(&self) -> KtResult<WorkloadMetrics> {
        Ok(WorkloadMetrics {
            throughput: None,
            latency_p95: Some(cost(*self.current.lock())),
            latency_p50: None,
            extra: Value::Null,
        })
    }

    fn name(&self) -> &str {
        "quadratic"
    }
}

fn rl_best_cost(seed: u64) -> f64 {
    let current = Arc::new(Mutex::new(DEFAULT));
    let rl = RlConfig::default()
        .with_n_init(8)
        .with_batch_size(8)
        .with_epochs(8)
        .with_hidden(vec![32, 32], vec![32, 32])
        .with_learning_rates(0.01, 0.01)
        .with_tau(0.1)
        .with_noise(0.15, 1.0)
        .with_exploitation(0.9, 0.1);
    let config = TunerConfig::new(records())
        .with_strategy(StrategyKind::Rl)
        .with_target_metric(TargetMetric::Latency)
        .with_trials(30)
        .with_seed(seed)
        .with_rl(rl);

    let mut engine = TuningEngine::new(
        config,
        Box::new(QuadraticDbms {
            current: Arc::clone(&current),
        }),
        Box::new(QuadraticWorkload { current }),
    )
    .unwrap();
    let best = engine.run().unwrap();
    assert_eq!(engine.history().iteration, 30);
    best.performance
}

fn random_best_cost(seed: u64, samples: usize) -> f64 {
    let space = TunerConfig::new(records()).knob_space().unwrap();
    let mut rng = ChaCha8Rng::seed_from_u64(seed.wrapping_add(10_000));
    (0..samples)
        .map(|_| cost(shared_buffers(&space.sample_random(&mut rng))))
        .fold(f64::INFINITY, f64::min)
}

#[test]
fn actor_critic_beats_random_sampling() {
    let seeds = 20;
    let mut wins = 0;
    for seed in 0..seeds {
        let rl = rl_best_cost(seed);
        let random = random_best_cost(seed, 20);
        assert!(rl <= cost(DEFAULT));
        if rl < random {
            wins += 1;
        }
    }
    assert!(wins >= 18, "actor-critic won {wins} of {seeds} seeds");
}
