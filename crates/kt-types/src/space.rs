//! The knob space and the configuration value type.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use crate::errors::KnobError;
use crate::knob::{KnobKind, KnobRecord, KnobSpec, KnobValue};

/// A full assignment of values to the knobs of one space.
///
/// Only [`KnobSpace`] decode paths construct configurations, so every value
/// lies within its knob's domain.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Configuration {
    values: BTreeMap<String, KnobValue>,
}

impl Configuration {
    pub fn get(&self, name: &str) -> Option<&KnobValue> {
        self.values.get(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &KnobValue)> {
        self.values.iter()
    }

    /// Numeric value of a knob, `None` if absent or categorical.
    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.values.get(name).and_then(KnobValue::as_f64)
    }
}

impl std::fmt::Display for Configuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        for (i, (name, value)) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name}={value}")?;
        }
        write!(f, "}}")
    }
}

/// Ordered, name-unique collection of knobs. The order defines the axis
/// order of encoded vectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnobSpace {
    knobs: Vec<KnobSpec>,
}

impl KnobSpace {
    /// Build a space from raw records, skipping `ignored` knob names.
    pub fn build(records: &[KnobRecord], ignored: &[String]) -> Result<Self, KnobError> {
        let specs = records
            .iter()
            .filter(|r| !ignored.contains(&r.name))
            .map(|r| r.clone().into_spec())
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_specs(specs)
    }

    pub fn from_specs(knobs: Vec<KnobSpec>) -> Result<Self, KnobError> {
        let mut seen = HashSet::new();
        for knob in &knobs {
            if !seen.insert(knob.name.as_str()) {
                return Err(KnobError::DuplicateName {
                    knob: knob.name.clone(),
                });
            }
            knob.check()?;
        }
        Ok(Self { knobs })
    }

    pub fn knobs(&self) -> &[KnobSpec] {
        &self.knobs
    }

    /// Number of axes.
    pub fn len(&self) -> usize {
        self.knobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.knobs.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&KnobSpec> {
        self.knobs.iter().find(|k| k.name == name)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.knobs.iter().position(|k| k.name == name)
    }

    pub fn sample_default(&self) -> Configuration {
        Configuration {
            values: self
                .knobs
                .iter()
                .map(|k| (k.name.clone(), k.default.clone()))
                .collect(),
        }
    }

    /// Independent uniform draw per knob.
    pub fn sample_random<R: Rng + ?Sized>(&self, rng: &mut R) -> Configuration {
        let values = self
            .knobs
            .iter()
            .map(|knob| {
                let value = match &knob.kind {
                    KnobKind::Categorical { choices } => {
                        KnobValue::Choice(choices[rng.gen_range(0..choices.len())].clone())
                    }
                    KnobKind::Integer { low, high } => KnobValue::Int(rng.gen_range(*low..=*high)),
                    KnobKind::Real { low, high } => {
                        if low == high {
                            KnobValue::Float(*low)
                        } else {
                            KnobValue::Float(rng.gen_range(*low..=*high))
                        }
                    }
                };
                (knob.name.clone(), value)
            })
            .collect();
        Configuration { values }
    }

    /// Check that `config` assigns an in-domain value to exactly this
    /// space's knobs.
    pub fn validate(&self, config: &Configuration) -> Result<(), KnobError> {
        for name in config.values.keys() {
            if self.get(name).is_none() {
                return Err(KnobError::UnknownKnob { knob: name.clone() });
            }
        }
        for knob in &self.knobs {
            let value = config.get(&knob.name).ok_or_else(|| KnobError::MissingKnob {
                knob: knob.name.clone(),
            })?;
            if knob.contains(value) {
                continue;
            }
            let kind_matches = matches!(
                (&knob.kind, value),
                (KnobKind::Categorical { .. }, KnobValue::Choice(_))
                    | (KnobKind::Integer { .. }, KnobValue::Int(_))
                    | (KnobKind::Real { .. }, KnobValue::Float(_))
            );
            return Err(if kind_matches {
                KnobError::OutOfBounds {
                    knob: knob.name.clone(),
                    value: value.to_string(),
                }
            } else {
                KnobError::KindMismatch {
                    knob: knob.name.clone(),
                    expected: knob.kind.name().to_string(),
                }
            });
        }
        Ok(())
    }

    /// Encode into `[0,1]^d` in axis order. Missing knobs encode their default.
    pub fn encode(&self, config: &Configuration) -> Vec<f64> {
        self.knobs
            .iter()
            .map(|knob| knob.encode(config.get(&knob.name).unwrap_or(&knob.default)))
            .collect()
    }

    /// Decode a point of `[0,1]^d`. Never fails: coordinates are clamped and
    /// missing trailing axes take the knob default.
    pub fn decode(&self, point: &[f64]) -> Configuration {
        let values = self
            .knobs
            .iter()
            .enumerate()
            .map(|(i, knob)| {
                let value = match point.get(i) {
                    Some(u) => knob.decode(*u),
                    None => knob.default.clone(),
                };
                (knob.name.clone(), value)
            })
            .collect();
        Configuration { values }
    }

    /// Assemble a configuration from arbitrary typed values, clamping each
    /// into its knob's domain. Unknown names are dropped, missing knobs take
    /// their default.
    pub fn coerce<I>(&self, values: I) -> Configuration
    where
        I: IntoIterator<Item = (String, KnobValue)>,
    {
        let mut raw: BTreeMap<String, KnobValue> = values.into_iter().collect();
        let values = self
            .knobs
            .iter()
            .map(|knob| {
                let value = match raw.remove(&knob.name) {
                    Some(v) => knob.clamp(&v),
                    None => knob.default.clone(),
                };
                (knob.name.clone(), value)
            })
            .collect();
        Configuration { values }
    }

    /// Total number of grid points (returns `None` if any knob is
    /// continuous).
    pub fn grid_size(&self) -> Option<usize> {
        let mut total: usize = 1;
        for knob in &self.knobs {
            let dim_size = match &knob.kind {
                KnobKind::Real { .. } => return None,
                _ => usize::try_from(knob.cardinality()?).ok()?,
            };
            total = total.checked_mul(dim_size)?;
        }
        Some(total)
    }

    /// Every point of a fully discrete space, in odometer order with the last
    /// axis varying fastest. Empty if the space has a continuous knob.
    pub fn grid_points(&self) -> Vec<Configuration> {
        if self.grid_size().is_none() {
            return Vec::new();
        }

        let axes: Vec<Vec<KnobValue>> = self
            .knobs
            .iter()
            .map(|knob| match &knob.kind {
                KnobKind::Categorical { choices } => {
                    choices.iter().cloned().map(KnobValue::Choice).collect()
                }
                KnobKind::Integer { low, high } => (*low..=*high).map(KnobValue::Int).collect(),
                KnobKind::Real { .. } => Vec::new(),
            })
            .collect();

        // Cartesian product
        let mut result: Vec<BTreeMap<String, KnobValue>> = vec![BTreeMap::new()];
        for (knob, axis) in self.knobs.iter().zip(&axes) {
            let mut next = Vec::with_capacity(result.len() * axis.len());
            for existing in &result {
                for value in axis {
                    let mut combo = existing.clone();
                    combo.insert(knob.name.clone(), value.clone());
                    next.push(combo);
                }
            }
            result = next;
        }

        result.into_iter().map(|values| Configuration { values }).collect()
    }
}
