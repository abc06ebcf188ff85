//! Bucket quantization of numeric knobs.

use tracing::debug;

use kt_types::{AdapterError, Configuration, KnobKind, KnobSpace, KnobSpec, KnobValue};

use crate::adapter::SpaceAdapter;

/// Replaces each numeric knob by an integer bucket knob `[0, nb - 1]` with
/// `nb = min(factor, cardinality)`. Categorical knobs pass through.
#[derive(Debug, Clone)]
pub struct Quantizer {
    input: KnobSpace,
    target: KnobSpace,
    factor: u64,
}

impl Quantizer {
    pub fn new(input: KnobSpace, factor: u64) -> Result<Self, AdapterError> {
        if factor < 2 {
            return Err(AdapterError::InvalidConfig {
                message: format!("quantization factor must be at least 2, got {factor}"),
            });
        }

        let knobs = input
            .knobs()
            .iter()
            .map(|knob| match &knob.kind {
                KnobKind::Categorical { .. } => knob.clone(),
                _ => {
                    let nb = bucket_count(knob, factor);
                    let default = bucket_of(knob, &knob.default, nb);
                    KnobSpec::integer(knob.name.clone(), 0, nb as i64 - 1, default as i64)
                }
            })
            .collect();
        let target = KnobSpace::from_specs(knobs).map_err(|e| AdapterError::InvalidConfig {
            message: e.to_string(),
        })?;

        Ok(Self {
            input,
            target,
            factor,
        })
    }

    pub fn factor(&self) -> u64 {
        self.factor
    }

    /// Bucket index of an input-space value for `knob`.
    pub fn bucket_of(&self, knob: &str, value: &KnobValue) -> Option<u64> {
        let spec = self.input.get(knob)?;
        if !spec.is_numeric() {
            return None;
        }
        Some(bucket_of(spec, value, bucket_count(spec, self.factor)))
    }

    /// Representative input-space value of bucket `bucket` of `knob`.
    pub fn representative(&self, knob: &str, bucket: u64) -> Option<KnobValue> {
        let spec = self.input.get(knob)?;
        if !spec.is_numeric() {
            return None;
        }
        Some(representative(spec, bucket, bucket_count(spec, self.factor)))
    }
}

fn bucket_count(knob: &KnobSpec, factor: u64) -> u64 {
    match knob.cardinality() {
        Some(card) => factor.min(card),
        None => factor,
    }
}

fn bucket_of(knob: &KnobSpec, value: &KnobValue, nb: u64) -> u64 {
    match (&knob.kind, knob.clamp(value)) {
        (KnobKind::Integer { low, high }, KnobValue::Int(v)) => {
            let card = *high as i128 - *low as i128 + 1;
            let offset = v as i128 - *low as i128;
            ((offset * nb as i128) / card) as u64
        }
        (KnobKind::Real { low, high }, KnobValue::Float(v)) => {
            if high <= low {
                return 0;
            }
            let b = ((v - low) / (high - low) * nb as f64).floor();
            (b.max(0.0) as u64).min(nb - 1)
        }
        _ => 0,
    }
}

fn representative(knob: &KnobSpec, bucket: u64, nb: u64) -> KnobValue {
    let bucket = bucket.min(nb - 1);
    match &knob.kind {
        KnobKind::Integer { low, high } => {
            let card = *high as i128 - *low as i128 + 1;
            let (b, n) = (bucket as i128, nb as i128);
            // bucket b holds offsets [ceil(b·card/n), ceil((b+1)·card/n))
            let start = (b * card + n - 1) / n;
            let end = ((b + 1) * card + n - 1) / n;
            let mid = (start + end - 1) / 2;
            KnobValue::Int((*low as i128 + mid) as i64)
        }
        KnobKind::Real { low, high } => {
            let width = (high - low) / nb as f64;
            KnobValue::Float((low + (bucket as f64 + 0.5) * width).clamp(*low, *high))
        }
        KnobKind::Categorical { .. } => knob.default.clone(),
    }
}

impl SpaceAdapter for Quantizer {
    fn name(&self) -> &str {
        "quantizer"
    }

    fn input_space(&self) -> &KnobSpace {
        &self.input
    }

    fn target_space(&self) -> &KnobSpace {
        &self.target
    }

    fn unproject(&self, target: &Configuration) -> Configuration {
        let values = self
            .input
            .knobs()
            .iter()
            .zip(self.target.knobs())
            .map(|(knob, bucket_knob)| {
                let raw = target.get(&knob.name).unwrap_or(&bucket_knob.default);
                if !bucket_knob.contains(raw) {
                    debug!(knob = %knob.name, value = %raw, "Clamping out-of-domain bucket");
                }
                let value = match &knob.kind {
                    KnobKind::Categorical { .. } => knob.clamp(raw),
                    _ => match bucket_knob.clamp(raw) {
                        KnobValue::Int(b) => {
                            representative(knob, b.max(0) as u64, bucket_count(knob, self.factor))
                        }
                        _ => knob.default.clone(),
                    },
                };
                (knob.name.clone(), value)
            })
            .collect::<Vec<_>>();
        self.input.coerce(values)
    }
}
