//! The evaluation seam between optimizers and the tuning engine.

use kt_types::{Configuration, ExperimentState, KtResult};

/// Result of evaluating one configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    /// Target metric, already sanitized.
    pub performance: f64,
    /// Internal DBMS statistics observed during the run.
    pub stats: Vec<f64>,
}

/// Evaluates configurations of the original knob space. Implementations
/// record every trial in the experiment state before returning.
pub trait Objective {
    fn evaluate(&mut self, config: &Configuration) -> KtResult<Evaluation>;

    fn state(&self) -> &ExperimentState;

    /// Attach the reward computed for the last evaluation.
    fn record_reward(&mut self, _reward: f64) {}
}
