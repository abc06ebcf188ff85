//! Search strategies over a knob space, used by the black-box optimizer.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use kt_types::{Configuration, KnobKind, KnobSpace, KnobValue};

/// Common trait for all search strategies.
pub trait SearchStrategy: Send + Sync {
    /// Generate the next batch of configurations to evaluate.
    fn suggest(&mut self, count: usize) -> Vec<Configuration>;

    /// Report an evaluated configuration's cost (lower is better) so adaptive
    /// strategies can learn.
    fn report(&mut self, _config: &Configuration, _cost: f64) {}

    /// Human-readable strategy name.
    fn name(&self) -> &str;
}

// ---- Grid search ----

/// Exhaustive grid over the space. Discrete axes with at most `steps` values
/// are enumerated fully, everything else is sampled at `steps` evenly spaced
/// points.
#[derive(Debug, Clone)]
pub struct GridSearch {
    space: KnobSpace,
    axes: Vec<Vec<KnobValue>>,
    cursor: usize,
    total: usize,
}

impl GridSearch {
    pub fn new(space: KnobSpace, steps: usize) -> Self {
        let steps = steps.max(2);
        let axes: Vec<Vec<KnobValue>> = space
            .knobs()
            .iter()
            .map(|knob| match &knob.kind {
                KnobKind::Categorical { choices } => {
                    choices.iter().cloned().map(KnobValue::Choice).collect()
                }
                KnobKind::Integer { low, high } if knob.cardinality().map_or(false, |c| c <= steps as u64) => {
                    (*low..=*high).map(KnobValue::Int).collect()
                }
                _ => {
                    let mut values: Vec<KnobValue> = (0..steps)
                        .map(|i| knob.decode(i as f64 / (steps - 1) as f64))
                        .collect();
                    values.dedup();
                    values
                }
            })
            .collect();

        let total = axes
            .iter()
            .try_fold(1usize, |acc, axis| acc.checked_mul(axis.len()))
            .unwrap_or(usize::MAX);

        Self {
            space,
            axes,
            cursor: 0,
            total,
        }
    }

    pub fn len(&self) -> usize {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Point `index` of the grid, last axis varying fastest.
    fn point(&self, mut index: usize) -> Configuration {
        let mut values = Vec::with_capacity(self.axes.len());
        for (knob, axis) in self.space.knobs().iter().zip(&self.axes).rev() {
            values.push((knob.name.clone(), axis[index % axis.len()].clone()));
            index /= axis.len();
        }
        self.space.coerce(values)
    }
}

impl SearchStrategy for GridSearch {
    fn suggest(&mut self, count: usize) -> Vec<Configuration> {
        let end = self.cursor.saturating_add(count).min(self.total);
        let batch = (self.cursor..end).map(|i| self.point(i)).collect();
        self.cursor = end;
        batch
    }

    fn name(&self) -> &str {
        "grid"
    }
}

// ---- Random search ----

/// Independent random sampling across the search space.
#[derive(Debug, Clone)]
pub struct RandomSearch {
    space: KnobSpace,
    rng: ChaCha8Rng,
}

impl RandomSearch {
    pub fn new(space: KnobSpace, seed: u64) -> Self {
        Self {
            space,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }
}

impl SearchStrategy for RandomSearch {
    fn suggest(&mut self, count: usize) -> Vec<Configuration> {
        (0..count).map(|_| self.space.sample_random(&mut self.rng)).collect()
    }

    fn name(&self) -> &str {
        "random"
    }
}

// ---- Bayesian search (surrogate-model stub) ----

/// Explore/exploit heuristic standing in for a surrogate model.
///
/// With probability `exploration_weight` (and always before the first
/// report) a uniform sample is proposed. Otherwise the lowest-cost
/// configuration seen so far is perturbed by up to ±10% of each numeric
/// axis; categorical knobs are resampled.
#[derive(Debug, Clone)]
pub struct BayesianSearch {
    space: KnobSpace,
    observations: Vec<(Configuration, f64)>,
    exploration_weight: f64,
    rng: ChaCha8Rng,
}

impl BayesianSearch {
    pub fn new(space: KnobSpace, exploration_weight: f64, seed: u64) -> Self {
        Self {
            space,
            observations: Vec::new(),
            exploration_weight,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    fn explore(&mut self) -> Configuration {
        self.space.sample_random(&mut self.rng)
    }

    /// Exploitation: perturb the best-known point.
    fn exploit(&mut self) -> Configuration {
        let best = self
            .observations
            .iter()
            .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(config, _)| config.clone());

        let base = match best {
            Some(config) => config,
            None => return self.explore(),
        };

        let encoded = self.space.encode(&base);
        let point: Vec<f64> = self
            .space
            .knobs()
            .iter()
            .zip(encoded)
            .map(|(knob, u)| {
                if knob.is_numeric() {
                    u + self.rng.gen_range(-0.1..0.1)
                } else {
                    self.rng.gen::<f64>()
                }
            })
            .collect();
        self.space.decode(&point)
    }
}

impl SearchStrategy for BayesianSearch {
    fn suggest(&mut self, count: usize) -> Vec<Configuration> {
        (0..count)
            .map(|_| {
                if self.observations.is_empty() || self.rng.gen::<f64>() < self.exploration_weight {
                    self.explore()
                } else {
                    self.exploit()
                }
            })
            .collect()
    }

    fn report(&mut self, config: &Configuration, cost: f64) {
        self.observations.push((config.clone(), cost));
    }

    fn name(&self) -> &str {
        "bayesian"
    }
}
