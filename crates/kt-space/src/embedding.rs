//! Random linear embeddings of a high-dimensional knob space into a small
//! search space.

use ndarray::{Array1, Array2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;
use tracing::debug;

use kt_types::{AdapterError, Configuration, KnobSpace, KnobSpec};

use crate::adapter::{ProjectionKind, SpaceAdapter};

/// Target space of `k` real knobs on `[-1, 1]`. A target point `y` maps to
/// the input unit cube through `(M·y + 1) / 2`, clipped, then decoded axis by
/// axis with the input space's codec.
#[derive(Debug, Clone)]
pub struct LinearEmbedding {
    input: KnobSpace,
    target: KnobSpace,
    projection: ProjectionKind,
    /// `d × k` projection matrix, fixed at construction.
    matrix: Array2<f64>,
}

impl LinearEmbedding {
    pub fn new(
        input: KnobSpace,
        target_dim: usize,
        projection: ProjectionKind,
        seed: u64,
    ) -> Result<Self, AdapterError> {
        let input_dim = input.len();
        if target_dim == 0 {
            return Err(AdapterError::InvalidConfig {
                message: "target dimension must be positive".to_string(),
            });
        }
        if target_dim >= input_dim {
            return Err(AdapterError::TargetDimTooLarge {
                target_dim,
                input_dim,
            });
        }

        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let matrix = match projection {
            ProjectionKind::Hesbo => {
                let mut m = Array2::zeros((input_dim, target_dim));
                for i in 0..input_dim {
                    let j = rng.gen_range(0..target_dim);
                    let sign = if rng.gen_bool(0.5) { 1.0 } else { -1.0 };
                    m[[i, j]] = sign;
                }
                m
            }
            ProjectionKind::Rembo => {
                let scale = 1.0 / (target_dim as f64).sqrt();
                Array2::from_shape_fn((input_dim, target_dim), |_| {
                    let z: f64 = rng.sample(StandardNormal);
                    z * scale
                })
            }
        };

        let knobs = (0..target_dim)
            .map(|i| KnobSpec::real(format!("embedding_{i}"), -1.0, 1.0, 0.0))
            .collect();
        let target = KnobSpace::from_specs(knobs).map_err(|e| AdapterError::InvalidConfig {
            message: e.to_string(),
        })?;

        Ok(Self {
            input,
            target,
            projection,
            matrix,
        })
    }

    pub fn projection(&self) -> ProjectionKind {
        self.projection
    }

    pub fn matrix(&self) -> &Array2<f64> {
        &self.matrix
    }
}

impl SpaceAdapter for LinearEmbedding {
    fn name(&self) -> &str {
        "linear-embedding"
    }

    fn input_space(&self) -> &KnobSpace {
        &self.input
    }

    fn target_space(&self) -> &KnobSpace {
        &self.target
    }

    fn unproject(&self, target: &Configuration) -> Configuration {
        let y: Array1<f64> = self
            .target
            .knobs()
            .iter()
            .map(|knob| {
                target
                    .get_f64(&knob.name)
                    .filter(|v| v.is_finite())
                    .unwrap_or(0.0)
                    .clamp(-1.0, 1.0)
            })
            .collect();

        let x = self.matrix.dot(&y);
        let mut clipped = 0usize;
        let point: Vec<f64> = x
            .iter()
            .map(|xi| {
                let u = (xi + 1.0) / 2.0;
                if !(0.0..=1.0).contains(&u) {
                    clipped += 1;
                }
                u.clamp(0.0, 1.0)
            })
            .collect();
        if clipped > 0 {
            debug!(clipped, "Clipped embedded point into the unit cube");
        }

        self.input.decode(&point)
    }
}
