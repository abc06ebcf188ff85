//! Collaborator interfaces: the database under tuning and the benchmark
//! harness that drives load against it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use kt_types::{Configuration, KtResult, TargetMetric, WorkloadError};

/// Internal statistics read from the DBMS after a workload run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DbmsStats {
    /// Numeric counters in a fixed order, fed to the RL state.
    pub numeric: Vec<f64>,
    /// Everything the driver read, keyed by view.
    pub raw: Value,
}

/// Metrics reported by one workload run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkloadMetrics {
    /// Requests per second.
    pub throughput: Option<f64>,
    /// 95th percentile latency, microseconds.
    pub latency_p95: Option<f64>,
    /// Median latency, microseconds.
    pub latency_p50: Option<f64>,
    #[serde(default)]
    pub extra: Value,
}

const THROUGHPUT_KEY: &str = "Throughput (requests/second)";
const LATENCY_KEY: &str = "Latency Distribution";
const P95_KEY: &str = "95th Percentile Latency (microseconds)";
const P50_KEY: &str = "Median Latency (microseconds)";

impl WorkloadMetrics {
    /// Parse a BenchBase `*.summary.json` document.
    pub fn from_benchbase_summary(summary: &Value) -> Result<Self, WorkloadError> {
        let object = summary.as_object().ok_or_else(|| WorkloadError::MetricUnavailable {
            metric: "summary is not a JSON object".to_string(),
        })?;

        let latency = object.get(LATENCY_KEY);
        Ok(Self {
            throughput: object.get(THROUGHPUT_KEY).and_then(number),
            latency_p95: latency.and_then(|l| l.get(P95_KEY)).and_then(number),
            latency_p50: latency.and_then(|l| l.get(P50_KEY)).and_then(number),
            extra: summary.clone(),
        })
    }

    /// The value of `target`, or `MetricUnavailable` when the run did not
    /// report it.
    pub fn metric(&self, target: TargetMetric) -> Result<f64, WorkloadError> {
        let value = match target {
            TargetMetric::Throughput => self.throughput,
            TargetMetric::Latency => self.latency_p95,
        };
        value.ok_or_else(|| WorkloadError::MetricUnavailable {
            metric: target.to_string(),
        })
    }
}

/// BenchBase writes some numbers as strings.
fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Controls the database instance being tuned.
pub trait DbmsDriver: Send {
    /// Apply a configuration and restart if needed. `Ok(false)` means the
    /// DBMS refused it.
    fn apply(&mut self, config: &Configuration) -> KtResult<bool>;

    /// Cumulative statistics since the last apply.
    fn stats(&mut self) -> KtResult<DbmsStats>;

    /// Drop every override and restart with the shipped defaults.
    fn reset_to_default(&mut self) -> KtResult<bool>;

    fn name(&self) -> &str;
}

/// Runs the benchmark against the database. `run` blocks until the workload
/// finishes; `metrics` reads the result of the last run.
pub trait WorkloadRunner: Send {
    fn run(&mut self) -> KtResult<()>;

    fn metrics(&self) -> KtResult<WorkloadMetrics>;

    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_benchbase_summary() {
        let summary = json!({
            "Benchmark Type": "tpcc",
            "Throughput (requests/second)": 1523.7,
            "Goodput (requests/second)": 1490.1,
            "Latency Distribution": {
                "95th Percentile Latency (microseconds)": 48210,
                "Median Latency (microseconds)": "12034",
                "Maximum Latency (microseconds)": 391002
            }
        });
        let metrics = WorkloadMetrics::from_benchbase_summary(&summary).unwrap();
        assert_eq!(metrics.throughput, Some(1523.7));
        assert_eq!(metrics.latency_p95, Some(48210.0));
        assert_eq!(metrics.latency_p50, Some(12034.0));
        assert_eq!(metrics.extra["Benchmark Type"], "tpcc");
        assert_eq!(metrics.metric(TargetMetric::Latency).unwrap(), 48210.0);
    }

    #[test]
    fn missing_metric_is_reported() {
        let summary = json!({ "Throughput (requests/second)": 10.0 });
        let metrics = WorkloadMetrics::from_benchbase_summary(&summary).unwrap();
        assert_eq!(metrics.metric(TargetMetric::Throughput).unwrap(), 10.0);
        assert!(matches!(
            metrics.metric(TargetMetric::Latency),
            Err(WorkloadError::MetricUnavailable { .. })
        ));
    }

    #[test]
    fn rejects_non_object_summary() {
        assert!(WorkloadMetrics::from_benchbase_summary(&json!([1, 2, 3])).is_err());
    }
}
