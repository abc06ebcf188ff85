//! Knob specifications and the per-axis codec between typed knob values and
//! coordinates in `[0, 1]`.

use serde::{Deserialize, Serialize};

use crate::errors::KnobError;

/// A concrete knob value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KnobValue {
    Int(i64),
    Float(f64),
    Choice(String),
}

impl KnobValue {
    /// Numeric view of the value, `None` for categorical choices.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::Choice(_) => None,
        }
    }
}

impl std::fmt::Display for KnobValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Choice(v) => write!(f, "{v}"),
        }
    }
}

/// Domain of a knob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum KnobKind {
    Categorical { choices: Vec<String> },
    Integer { low: i64, high: i64 },
    Real { low: f64, high: f64 },
}

impl KnobKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Categorical { .. } => "categorical",
            Self::Integer { .. } => "integer",
            Self::Real { .. } => "real",
        }
    }
}

/// A single tunable knob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnobSpec {
    pub name: String,
    pub kind: KnobKind,
    pub default: KnobValue,
    /// Sentinel value with special meaning to the DBMS (e.g. `-1` = disabled).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub special_value: Option<KnobValue>,
}

impl KnobSpec {
    pub fn integer(name: impl Into<String>, low: i64, high: i64, default: i64) -> Self {
        Self {
            name: name.into(),
            kind: KnobKind::Integer { low, high },
            default: KnobValue::Int(default),
            special_value: None,
        }
    }

    pub fn real(name: impl Into<String>, low: f64, high: f64, default: f64) -> Self {
        Self {
            name: name.into(),
            kind: KnobKind::Real { low, high },
            default: KnobValue::Float(default),
            special_value: None,
        }
    }

    pub fn categorical<S: Into<String>>(
        name: impl Into<String>,
        choices: Vec<S>,
        default: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: KnobKind::Categorical {
                choices: choices.into_iter().map(Into::into).collect(),
            },
            default: KnobValue::Choice(default.into()),
            special_value: None,
        }
    }

    pub fn with_special(mut self, value: KnobValue) -> Self {
        self.special_value = Some(value);
        self
    }

    pub fn is_numeric(&self) -> bool {
        !matches!(self.kind, KnobKind::Categorical { .. })
    }

    /// Number of distinct values, `None` for continuous knobs.
    pub fn cardinality(&self) -> Option<u64> {
        match &self.kind {
            KnobKind::Categorical { choices } => Some(choices.len() as u64),
            KnobKind::Integer { low, high } => Some((*high as i128 - *low as i128 + 1) as u64),
            KnobKind::Real { .. } => None,
        }
    }

    /// Check bounds, choices, default and special value.
    pub fn check(&self) -> Result<(), KnobError> {
        let invalid = |message: String| KnobError::InvalidSpec {
            knob: self.name.clone(),
            message,
        };

        match &self.kind {
            KnobKind::Categorical { choices } => {
                if choices.is_empty() {
                    return Err(invalid("no choices".to_string()));
                }
            }
            KnobKind::Integer { low, high } => {
                if low > high {
                    return Err(invalid(format!("lower bound {low} above upper bound {high}")));
                }
            }
            KnobKind::Real { low, high } => {
                if !low.is_finite() || !high.is_finite() || low > high {
                    return Err(invalid(format!("bad bounds [{low}, {high}]")));
                }
            }
        }

        if !self.contains(&self.default) {
            return Err(invalid(format!("default {} outside the domain", self.default)));
        }

        if let Some(special) = &self.special_value {
            if !self.is_numeric() {
                return Err(invalid("special values are only supported on numeric knobs".into()));
            }
            if !self.contains(special) {
                return Err(invalid(format!("special value {special} outside the domain")));
            }
        }

        Ok(())
    }

    /// Whether `value` has the right type and lies inside the domain.
    pub fn contains(&self, value: &KnobValue) -> bool {
        match (&self.kind, value) {
            (KnobKind::Categorical { choices }, KnobValue::Choice(c)) => choices.contains(c),
            (KnobKind::Integer { low, high }, KnobValue::Int(v)) => low <= v && v <= high,
            (KnobKind::Real { low, high }, KnobValue::Float(v)) => {
                v.is_finite() && *low <= *v && *v <= *high
            }
            _ => false,
        }
    }

    /// Coerce any value into the domain: numbers are converted and clamped,
    /// unknown choices fall back to the default.
    pub fn clamp(&self, value: &KnobValue) -> KnobValue {
        match &self.kind {
            KnobKind::Categorical { choices } => match value {
                KnobValue::Choice(c) if choices.contains(c) => value.clone(),
                _ => self.default.clone(),
            },
            KnobKind::Integer { low, high } => match value.as_f64() {
                Some(v) if !v.is_nan() => {
                    KnobValue::Int(v.round().clamp(*low as f64, *high as f64) as i64)
                }
                _ => self.default.clone(),
            },
            KnobKind::Real { low, high } => match value.as_f64() {
                Some(v) if !v.is_nan() => KnobValue::Float(v.clamp(*low, *high)),
                _ => self.default.clone(),
            },
        }
    }

    /// Position of `value` on this knob's unit axis.
    pub fn encode(&self, value: &KnobValue) -> f64 {
        let value = self.clamp(value);
        match (&self.kind, &value) {
            (KnobKind::Categorical { choices }, KnobValue::Choice(c)) => {
                if choices.len() == 1 {
                    return 0.5;
                }
                let index = choices.iter().position(|x| x == c).unwrap_or(0);
                index as f64 / (choices.len() - 1) as f64
            }
            (KnobKind::Integer { low, high }, KnobValue::Int(v)) => {
                if low == high {
                    0.5
                } else {
                    (*v as f64 - *low as f64) / (*high as f64 - *low as f64)
                }
            }
            (KnobKind::Real { low, high }, KnobValue::Float(v)) => {
                if low == high {
                    0.5
                } else {
                    (v - low) / (high - low)
                }
            }
            _ => 0.5,
        }
    }

    /// Value at unit-axis position `u`. Out-of-range positions are clamped
    /// and `NaN` decodes to the default.
    pub fn decode(&self, u: f64) -> KnobValue {
        if u.is_nan() {
            return self.default.clone();
        }
        let u = u.clamp(0.0, 1.0);
        match &self.kind {
            KnobKind::Categorical { choices } => {
                let index = (u * (choices.len() - 1) as f64).round() as usize;
                KnobValue::Choice(choices[index.min(choices.len() - 1)].clone())
            }
            KnobKind::Integer { low, high } => {
                let v = *low as f64 + u * (*high as f64 - *low as f64);
                KnobValue::Int((v.round() as i64).clamp(*low, *high))
            }
            KnobKind::Real { low, high } => KnobValue::Float((low + u * (high - low)).clamp(*low, *high)),
        }
    }
}

/// A raw knob record as found in DBMS knob files.
///
/// Field aliases accept the PostgreSQL catalog layout
/// (`vartype`, `min_val`, `max_val`, `enumvals`, `reset_val`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnobRecord {
    pub name: String,
    #[serde(alias = "vartype")]
    pub kind: String,
    #[serde(default, alias = "min_val")]
    pub min: Option<serde_json::Value>,
    #[serde(default, alias = "max_val")]
    pub max: Option<serde_json::Value>,
    #[serde(default, alias = "enumvals")]
    pub choices: Option<Vec<String>>,
    #[serde(alias = "reset_val")]
    pub default: serde_json::Value,
    #[serde(default)]
    pub special_value: Option<serde_json::Value>,
}

impl KnobRecord {
    /// Convert into a typed spec. Unknown kinds are rejected.
    pub fn into_spec(self) -> Result<KnobSpec, KnobError> {
        let name = self.name.clone();
        let invalid = |message: &str| KnobError::InvalidSpec {
            knob: name.clone(),
            message: message.to_string(),
        };

        let spec = match self.kind.as_str() {
            "enum" | "categorical" => {
                let choices = self.choices.clone().ok_or_else(|| invalid("missing choices"))?;
                let default = json_to_string(&self.default).ok_or_else(|| invalid("bad default"))?;
                KnobSpec::categorical(self.name, choices, default)
            }
            "bool" => {
                let default = match &self.default {
                    serde_json::Value::Bool(true) => "on".to_string(),
                    serde_json::Value::Bool(false) => "off".to_string(),
                    other => json_to_string(other).ok_or_else(|| invalid("bad default"))?,
                };
                KnobSpec::categorical(self.name, vec!["on", "off"], default)
            }
            "integer" => {
                let low = self.min.as_ref().and_then(json_to_f64).ok_or_else(|| invalid("missing min"))?;
                let high = self.max.as_ref().and_then(json_to_f64).ok_or_else(|| invalid("missing max"))?;
                let default = json_to_f64(&self.default).ok_or_else(|| invalid("bad default"))?;
                let mut spec = KnobSpec::integer(self.name, low as i64, high as i64, default as i64);
                if let Some(special) = self.special_value.as_ref().and_then(json_to_f64) {
                    spec.special_value = Some(KnobValue::Int(special as i64));
                }
                spec
            }
            "real" => {
                let low = self.min.as_ref().and_then(json_to_f64).ok_or_else(|| invalid("missing min"))?;
                let high = self.max.as_ref().and_then(json_to_f64).ok_or_else(|| invalid("missing max"))?;
                let default = json_to_f64(&self.default).ok_or_else(|| invalid("bad default"))?;
                let mut spec = KnobSpec::real(self.name, low, high, default);
                if let Some(special) = self.special_value.as_ref().and_then(json_to_f64) {
                    spec.special_value = Some(KnobValue::Float(special));
                }
                spec
            }
            other => {
                return Err(KnobError::UnsupportedKind {
                    knob: self.name,
                    kind: other.to_string(),
                })
            }
        };

        Ok(spec)
    }
}

// Knob catalogs store numbers as JSON numbers or as strings.
fn json_to_f64(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn json_to_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn integer_codec_hits_bounds() {
        let spec = KnobSpec::integer("shared_buffers", 128, 1_048_576, 16_384);
        assert_eq!(spec.decode(0.0), KnobValue::Int(128));
        assert_eq!(spec.decode(1.0), KnobValue::Int(1_048_576));
        assert_eq!(spec.decode(7.5), KnobValue::Int(1_048_576));
        assert_eq!(spec.decode(-3.0), KnobValue::Int(128));
        assert_eq!(spec.decode(f64::NAN), KnobValue::Int(16_384));

        let u = spec.encode(&KnobValue::Int(16_384));
        assert_eq!(spec.decode(u), KnobValue::Int(16_384));
    }

    #[test]
    fn categorical_codec_rounds_to_index() {
        let spec = KnobSpec::categorical("huge_pages", vec!["on", "off", "try"], "try");
        assert_eq!(spec.decode(0.0), KnobValue::Choice("on".into()));
        assert_eq!(spec.decode(0.49), KnobValue::Choice("off".into()));
        assert_eq!(spec.decode(0.9), KnobValue::Choice("try".into()));
        assert_eq!(spec.encode(&KnobValue::Choice("off".into())), 0.5);
    }

    #[test]
    fn clamp_coerces_types() {
        let spec = KnobSpec::real("checkpoint_completion_target", 0.0, 1.0, 0.5);
        assert_eq!(spec.clamp(&KnobValue::Int(3)), KnobValue::Float(1.0));
        assert_eq!(spec.clamp(&KnobValue::Choice("x".into())), KnobValue::Float(0.5));
        assert!(!spec.contains(&KnobValue::Int(0)));
    }

    #[test]
    fn check_rejects_bad_specs() {
        assert!(KnobSpec::integer("a", 10, 1, 5).check().is_err());
        assert!(KnobSpec::integer("a", 1, 10, 50).check().is_err());
        assert!(KnobSpec::integer("a", 1, 10, 5)
            .with_special(KnobValue::Int(11))
            .check()
            .is_err());
        assert!(KnobSpec::categorical("b", Vec::<String>::new(), "x").check().is_err());
        assert!(KnobSpec::integer("a", -1, 10, 5)
            .with_special(KnobValue::Int(-1))
            .check()
            .is_ok());
    }

    #[test]
    fn record_parses_catalog_layout() {
        let record: KnobRecord = serde_json::from_value(json!({
            "name": "work_mem",
            "vartype": "integer",
            "min_val": "64",
            "max_val": "2147483647",
            "reset_val": "4096"
        }))
        .unwrap();
        let spec = record.into_spec().unwrap();
        assert_eq!(spec.kind, KnobKind::Integer { low: 64, high: 2_147_483_647 });
        assert_eq!(spec.default, KnobValue::Int(4096));
    }

    #[test]
    fn record_parses_bool_as_categorical() {
        let record: KnobRecord = serde_json::from_value(json!({
            "name": "jit",
            "vartype": "bool",
            "reset_val": "on"
        }))
        .unwrap();
        let spec = record.into_spec().unwrap();
        assert_eq!(spec.cardinality(), Some(2));
        assert!(spec.check().is_ok());
    }

    #[test]
    fn record_rejects_unknown_kind() {
        let record: KnobRecord = serde_json::from_value(json!({
            "name": "search_path",
            "vartype": "string",
            "reset_val": "public"
        }))
        .unwrap();
        match record.into_spec() {
            Err(KnobError::UnsupportedKind { kind, .. }) => assert_eq!(kind, "string"),
            other => panic!("expected UnsupportedKind, got {other:?}"),
        }
    }
}
