use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use kt_types::{ExperimentState, TargetMetric};

/// Identity and running state of one tuning run.
#[derive(Debug, Clone, Serialize)]
pub struct ExperimentContext {
    pub run_id: Uuid,
    pub seed: u64,
    pub started_at: DateTime<Utc>,
    pub state: ExperimentState,
}

impl ExperimentContext {
    pub fn new(seed: u64, target: TargetMetric) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            seed,
            started_at: Utc::now(),
            state: ExperimentState::new(target),
        }
    }

    pub fn elapsed_ms(&self) -> i64 {
        (Utc::now() - self.started_at).num_milliseconds()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kt_types::ObjectiveDirection;

    #[test]
    fn starts_empty() {
        let context = ExperimentContext::new(9, TargetMetric::Latency);
        assert_eq!(context.seed, 9);
        assert_eq!(context.state.direction, ObjectiveDirection::Minimize);
        assert!(context.state.trials.is_empty());
        assert!(context.elapsed_ms() >= 0);
        assert_ne!(context.run_id, ExperimentContext::new(9, TargetMetric::Latency).run_id);
    }
}
