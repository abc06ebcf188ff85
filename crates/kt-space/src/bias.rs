//! Special-value biasing.
//!
//! Many knobs reserve one value with a meaning of its own (`-1` disables a
//! feature, `0` means "auto"). Uniform search almost never hits it, so this
//! adapter reserves the bottom `p` of each such knob's unit axis for the
//! special value and stretches the remaining `1 - p` over the rest of the
//! domain.

use rand::{Rng, RngCore};
use tracing::debug;

use kt_types::{AdapterError, Configuration, KnobKind, KnobSpace, KnobSpec, KnobValue};

use crate::adapter::SpaceAdapter;

#[derive(Debug, Clone)]
pub struct BiasedSampler {
    input: KnobSpace,
    prob: f64,
}

impl BiasedSampler {
    pub fn new(input: KnobSpace, prob: f64) -> Result<Self, AdapterError> {
        if !(prob > 0.0 && prob < 1.0) {
            return Err(AdapterError::InvalidConfig {
                message: format!("bias probability must lie in (0, 1), got {prob}"),
            });
        }
        Ok(Self { input, prob })
    }

    pub fn prob(&self) -> f64 {
        self.prob
    }

    /// Draw a configuration directly: each knob with a special value takes it
    /// with probability `p`, otherwise a uniform value from the rest of its
    /// domain.
    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> Configuration {
        let base = self.input.sample_random(rng);
        let values = self
            .input
            .knobs()
            .iter()
            .map(|knob| {
                let value = match (knob.is_numeric(), &knob.special_value) {
                    (true, Some(special)) => {
                        if rng.gen::<f64>() < self.prob {
                            special.clone()
                        } else {
                            decode_remainder(knob, special, rng.gen::<f64>())
                        }
                    }
                    _ => base.get(&knob.name).cloned().unwrap_or_else(|| knob.default.clone()),
                };
                (knob.name.clone(), value)
            })
            .collect::<Vec<_>>();
        self.input.coerce(values)
    }

    fn unproject_knob(&self, knob: &KnobSpec, value: Option<&KnobValue>) -> KnobValue {
        let value = match value {
            Some(v) => v,
            None => return knob.default.clone(),
        };
        if !knob.contains(value) {
            debug!(knob = %knob.name, value = %value, "Clamping out-of-domain value");
        }
        match (knob.is_numeric(), &knob.special_value) {
            (true, Some(special)) => {
                let u = knob.encode(value);
                if u < self.prob {
                    special.clone()
                } else {
                    decode_remainder(knob, special, (u - self.prob) / (1.0 - self.prob))
                }
            }
            _ => knob.clamp(value),
        }
    }
}

/// Decode `r` in `[0, 1]` over the knob's domain with the special value
/// removed.
fn decode_remainder(knob: &KnobSpec, special: &KnobValue, r: f64) -> KnobValue {
    let r = r.clamp(0.0, 1.0);
    match (&knob.kind, special) {
        (KnobKind::Integer { low, high }, KnobValue::Int(s)) => {
            if low == high {
                return KnobValue::Int(*low);
            }
            let (lo, hi) = if s == low {
                (*low + 1, *high)
            } else if s == high {
                (*low, *high - 1)
            } else {
                (*low, *high)
            };
            let v = (lo as f64 + r * (hi as f64 - lo as f64)).round() as i64;
            let mut v = v.clamp(lo, hi);
            if v == *s {
                // special value in the interior: step to a neighbour
                v = if v < *high { v + 1 } else { v - 1 };
            }
            KnobValue::Int(v)
        }
        _ => knob.decode(r),
    }
}

impl SpaceAdapter for BiasedSampler {
    fn name(&self) -> &str {
        "biased-sampler"
    }

    fn input_space(&self) -> &KnobSpace {
        &self.input
    }

    /// Bounds and cardinalities are unchanged; only decoding is biased.
    fn target_space(&self) -> &KnobSpace {
        &self.input
    }

    fn unproject(&self, target: &Configuration) -> Configuration {
        let values = self
            .input
            .knobs()
            .iter()
            .map(|knob| (knob.name.clone(), self.unproject_knob(knob, target.get(&knob.name))))
            .collect::<Vec<_>>();
        self.input.coerce(values)
    }

    fn sample_target(&self, rng: &mut dyn RngCore) -> Configuration {
        self.input.sample_random(rng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn space() -> KnobSpace {
        KnobSpace::from_specs(vec![
            KnobSpec::integer("autovacuum_work_mem", -1, 2_097_152, 65_536)
                .with_special(KnobValue::Int(-1)),
            KnobSpec::real("vacuum_cost_delay", 0.0, 100.0, 2.0).with_special(KnobValue::Float(0.0)),
            KnobSpec::integer("max_wal_senders", 0, 100, 10),
        ])
        .unwrap()
    }

    fn special_frequency(configs: &[Configuration], knob: &str, special: &KnobValue) -> f64 {
        let hits = configs.iter().filter(|c| c.get(knob) == Some(special)).count();
        hits as f64 / configs.len() as f64
    }

    #[test]
    fn draw_hits_special_value_at_bias_rate() {
        let sampler = BiasedSampler::new(space(), 0.3).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(2024);
        let draws: Vec<_> = (0..10_000).map(|_| sampler.draw(&mut rng)).collect();

        let freq = special_frequency(&draws, "autovacuum_work_mem", &KnobValue::Int(-1));
        assert!((freq - 0.3).abs() <= 0.02, "frequency {freq}");
        let freq = special_frequency(&draws, "vacuum_cost_delay", &KnobValue::Float(0.0));
        assert!((freq - 0.3).abs() <= 0.02, "frequency {freq}");
    }

    #[test]
    fn unprojected_uniform_samples_hit_special_value_at_bias_rate() {
        let sampler = BiasedSampler::new(space(), 0.3).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let configs: Vec<_> = (0..10_000)
            .map(|_| sampler.unproject(&sampler.sample_target(&mut rng)))
            .collect();

        let freq = special_frequency(&configs, "autovacuum_work_mem", &KnobValue::Int(-1));
        assert!((freq - 0.3).abs() <= 0.02, "frequency {freq}");
    }

    #[test]
    fn remainder_skips_special_value() {
        let sampler = BiasedSampler::new(space(), 0.3).unwrap();
        let top = space().decode(&[0.5, 1.0, 0.0]);
        let config = sampler.unproject(&top);
        assert_ne!(config.get("autovacuum_work_mem"), Some(&KnobValue::Int(-1)));
        assert_eq!(config.get("vacuum_cost_delay"), Some(&KnobValue::Float(100.0)));
        // knobs without a special value pass through
        assert_eq!(config.get("max_wal_senders"), Some(&KnobValue::Int(0)));

        let interior = KnobSpec::integer("k", 0, 2, 1).with_special(KnobValue::Int(1));
        assert_eq!(decode_remainder(&interior, &KnobValue::Int(1), 0.5), KnobValue::Int(2));
    }

    #[test]
    fn target_space_matches_input() {
        let sampler = BiasedSampler::new(space(), 0.1).unwrap();
        assert_eq!(sampler.target_space(), sampler.input_space());
        assert!(BiasedSampler::new(space(), 0.0).is_err());
        assert!(BiasedSampler::new(space(), 1.0).is_err());
    }
}
