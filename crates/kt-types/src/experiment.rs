//! Experiment bookkeeping: target metric, objective direction, trials and the
//! running best/worst record shared between the engine and the optimizers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::space::Configuration;

/// Whether we are maximizing or minimizing the objective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ObjectiveDirection {
    Maximize,
    Minimize,
}

impl Default for ObjectiveDirection {
    fn default() -> Self {
        Self::Maximize
    }
}

impl ObjectiveDirection {
    /// Strict improvement of `candidate` over `incumbent`.
    pub fn is_better(&self, candidate: f64, incumbent: f64) -> bool {
        match self {
            Self::Maximize => candidate > incumbent,
            Self::Minimize => candidate < incumbent,
        }
    }

    /// Strict regression of `candidate` relative to `incumbent`.
    pub fn is_worse(&self, candidate: f64, incumbent: f64) -> bool {
        match self {
            Self::Maximize => candidate < incumbent,
            Self::Minimize => candidate > incumbent,
        }
    }

    /// Cost to minimize for a black-box optimizer.
    pub fn to_cost(&self, performance: f64) -> f64 {
        match self {
            Self::Maximize => -performance,
            Self::Minimize => performance,
        }
    }

    /// Relative gain of `performance` over `base`; positive means better.
    /// Zero when `base` is zero or not finite.
    pub fn gain(&self, performance: f64, base: f64) -> f64 {
        if base == 0.0 || !base.is_finite() {
            return 0.0;
        }
        match self {
            Self::Maximize => (performance - base) / base,
            Self::Minimize => (base - performance) / base,
        }
    }

    /// Worst possible value, substituted for degenerate measurements.
    pub fn sentinel(&self) -> f64 {
        match self {
            Self::Maximize => 0.0,
            Self::Minimize => f64::MAX,
        }
    }

    /// Replace NaN/infinite measurements with the sentinel. The flag tells
    /// whether a substitution happened.
    pub fn sanitize(&self, performance: f64) -> (f64, bool) {
        if performance.is_finite() {
            (performance, false)
        } else {
            (self.sentinel(), true)
        }
    }
}

/// Metric the tuner optimizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetMetric {
    /// Requests per second.
    Throughput,
    /// 95th percentile latency.
    Latency,
}

impl Default for TargetMetric {
    fn default() -> Self {
        Self::Throughput
    }
}

impl TargetMetric {
    pub fn direction(&self) -> ObjectiveDirection {
        match self {
            Self::Throughput => ObjectiveDirection::Maximize,
            Self::Latency => ObjectiveDirection::Minimize,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Throughput => "throughput",
            Self::Latency => "latency",
        }
    }
}

impl FromStr for TargetMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "throughput" => Ok(Self::Throughput),
            "latency" => Ok(Self::Latency),
            other => Err(format!("unknown target metric '{other}'")),
        }
    }
}

impl std::fmt::Display for TargetMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrialStatus {
    Running,
    Completed,
    Failed,
}

/// A single evaluation of one configuration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trial {
    pub id: Uuid,
    pub trial_number: usize,
    /// Configuration in the original knob space.
    pub configuration: Configuration,
    pub status: TrialStatus,
    pub performance: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<Vec<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reward: Option<f64>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
}

impl Trial {
    pub fn new(trial_number: usize, configuration: Configuration) -> Self {
        Self {
            id: Uuid::new_v4(),
            trial_number,
            configuration,
            status: TrialStatus::Running,
            performance: None,
            stats: None,
            reward: None,
            error: None,
            started_at: Utc::now(),
            finished_at: None,
            duration_ms: None,
        }
    }

    pub fn mark_completed(&mut self, performance: f64, stats: Option<Vec<f64>>) {
        self.status = TrialStatus::Completed;
        self.performance = Some(performance);
        self.stats = stats;
        self.finish();
    }

    pub fn mark_failed(&mut self, error: String) {
        self.status = TrialStatus::Failed;
        self.error = Some(error);
        self.finish();
    }

    fn finish(&mut self) {
        let now = Utc::now();
        self.duration_ms = Some((now - self.started_at).num_milliseconds());
        self.finished_at = Some(now);
    }
}

/// Outcome of recording a trial.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordOutcome {
    pub new_best: bool,
    pub new_worst: bool,
}

/// Best configuration found by a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BestResult {
    pub configuration: Configuration,
    pub performance: f64,
    pub default_performance: Option<f64>,
    /// Relative gain over the default, direction-aware.
    pub improvement: f64,
    pub trials: usize,
}

/// Running record of an experiment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExperimentState {
    pub target: TargetMetric,
    pub direction: ObjectiveDirection,
    pub default_perf: Option<f64>,
    pub default_conf: Option<Configuration>,
    pub best_perf: Option<f64>,
    pub best_conf: Option<Configuration>,
    pub worst_perf: Option<f64>,
    pub worst_conf: Option<Configuration>,
    /// Trials recorded after the baseline.
    pub iteration: usize,
    pub trials: Vec<Trial>,
}

impl ExperimentState {
    pub fn new(target: TargetMetric) -> Self {
        Self {
            target,
            direction: target.direction(),
            default_perf: None,
            default_conf: None,
            best_perf: None,
            best_conf: None,
            worst_perf: None,
            worst_conf: None,
            iteration: 0,
            trials: Vec::new(),
        }
    }

    pub fn next_trial_number(&self) -> usize {
        self.trials.len()
    }

    /// Record the default configuration's measurement. Seeds best and worst.
    pub fn record_baseline(&mut self, trial: Trial) -> RecordOutcome {
        if let (TrialStatus::Completed, Some(perf)) = (trial.status, trial.performance) {
            self.default_perf = Some(perf);
            self.default_conf = Some(trial.configuration.clone());
        }
        let outcome = self.track(&trial);
        self.trials.push(trial);
        outcome
    }

    /// Record a trial. Best and worst move only on strict improvement or
    /// strict regression; failed trials are kept in the history only.
    pub fn record(&mut self, trial: Trial) -> RecordOutcome {
        let outcome = self.track(&trial);
        self.trials.push(trial);
        self.iteration += 1;
        outcome
    }

    fn track(&mut self, trial: &Trial) -> RecordOutcome {
        let mut outcome = RecordOutcome::default();
        let perf = match (trial.status, trial.performance) {
            (TrialStatus::Completed, Some(perf)) => perf,
            _ => return outcome,
        };

        let improves = self.best_perf.map_or(true, |best| self.direction.is_better(perf, best));
        if improves {
            self.best_perf = Some(perf);
            self.best_conf = Some(trial.configuration.clone());
            outcome.new_best = true;
        }

        let regresses = self.worst_perf.map_or(true, |worst| self.direction.is_worse(perf, worst));
        if regresses {
            self.worst_perf = Some(perf);
            self.worst_conf = Some(trial.configuration.clone());
            outcome.new_worst = true;
        }

        outcome
    }

    /// Attach the RL reward to the most recent trial.
    pub fn set_last_reward(&mut self, reward: f64) {
        if let Some(trial) = self.trials.last_mut() {
            trial.reward = Some(reward);
        }
    }

    pub fn last_trial(&self) -> Option<&Trial> {
        self.trials.last()
    }

    pub fn completed_trials(&self) -> impl Iterator<Item = &Trial> {
        self.trials.iter().filter(|t| t.status == TrialStatus::Completed)
    }

    pub fn failed_count(&self) -> usize {
        self.trials.iter().filter(|t| t.status == TrialStatus::Failed).count()
    }

    pub fn best_result(&self) -> Option<BestResult> {
        let performance = self.best_perf?;
        let configuration = self.best_conf.clone()?;
        let improvement = self
            .default_perf
            .map_or(0.0, |base| self.direction.gain(performance, base));
        Some(BestResult {
            configuration,
            performance,
            default_performance: self.default_perf,
            improvement,
            trials: self.trials.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knob::KnobSpec;
    use crate::space::KnobSpace;

    fn space() -> KnobSpace {
        KnobSpace::from_specs(vec![KnobSpec::integer("work_mem", 64, 65_536, 4_096)]).unwrap()
    }

    fn completed(state: &ExperimentState, u: f64, perf: f64) -> Trial {
        let mut trial = Trial::new(state.next_trial_number(), space().decode(&[u]));
        trial.mark_completed(perf, None);
        trial
    }

    #[test]
    fn direction_conventions() {
        let max = ObjectiveDirection::Maximize;
        let min = ObjectiveDirection::Minimize;
        assert!(max.is_better(2.0, 1.0));
        assert!(!max.is_better(1.0, 1.0));
        assert!(min.is_better(1.0, 2.0));
        assert_eq!(max.to_cost(5.0), -5.0);
        assert_eq!(min.to_cost(5.0), 5.0);
        assert!((max.gain(110.0, 100.0) - 0.1).abs() < 1e-12);
        assert!((min.gain(90.0, 100.0) - 0.1).abs() < 1e-12);
        assert_eq!(max.gain(10.0, 0.0), 0.0);
        assert_eq!(min.gain(10.0, f64::INFINITY), 0.0);
    }

    #[test]
    fn sanitize_uses_sentinels() {
        assert_eq!(ObjectiveDirection::Maximize.sanitize(f64::NAN), (0.0, true));
        assert_eq!(ObjectiveDirection::Minimize.sanitize(f64::INFINITY), (f64::MAX, true));
        assert_eq!(ObjectiveDirection::Minimize.sanitize(3.0), (3.0, false));
    }

    #[test]
    fn target_metric_parsing() {
        assert_eq!("latency".parse::<TargetMetric>().unwrap(), TargetMetric::Latency);
        assert_eq!(TargetMetric::Latency.direction(), ObjectiveDirection::Minimize);
        assert!("iops".parse::<TargetMetric>().is_err());
    }

    #[test]
    fn best_updates_only_on_strict_improvement() {
        let mut state = ExperimentState::new(TargetMetric::Throughput);
        let baseline = completed(&state, 0.1, 100.0);
        let outcome = state.record_baseline(baseline);
        assert!(outcome.new_best && outcome.new_worst);

        let tie = completed(&state, 0.9, 100.0);
        let outcome = state.record(tie);
        assert!(!outcome.new_best && !outcome.new_worst);
        assert_eq!(state.best_conf, Some(space().decode(&[0.1])));
        assert_eq!(state.worst_conf, Some(space().decode(&[0.1])));

        let better = completed(&state, 0.5, 120.0);
        assert!(state.record(better).new_best);
        assert_eq!(state.best_perf, Some(120.0));
        assert_eq!(state.worst_perf, Some(100.0));

        let worse = completed(&state, 0.7, 80.0);
        let outcome = state.record(worse);
        assert!(!outcome.new_best && outcome.new_worst);
        assert_eq!(state.best_perf, Some(120.0));
        assert_eq!(state.worst_perf, Some(80.0));
        assert_eq!(state.iteration, 3);
    }

    #[test]
    fn minimize_tracks_latency() {
        let mut state = ExperimentState::new(TargetMetric::Latency);
        let baseline = completed(&state, 0.1, 500.0);
        state.record_baseline(baseline);
        let faster = completed(&state, 0.2, 400.0);
        state.record(faster);
        let slower = completed(&state, 0.3, 900.0);
        state.record(slower);

        assert_eq!(state.best_perf, Some(400.0));
        assert_eq!(state.worst_perf, Some(900.0));
        let best = state.best_result().unwrap();
        assert!((best.improvement - 0.2).abs() < 1e-12);
    }

    #[test]
    fn failed_trials_do_not_move_records() {
        let mut state = ExperimentState::new(TargetMetric::Throughput);
        let baseline = completed(&state, 0.1, 100.0);
        state.record_baseline(baseline);

        let mut failed = Trial::new(state.next_trial_number(), space().decode(&[0.4]));
        failed.mark_failed("metric unavailable".to_string());
        let outcome = state.record(failed);

        assert_eq!(outcome, RecordOutcome::default());
        assert_eq!(state.failed_count(), 1);
        assert_eq!(state.completed_trials().count(), 1);
        assert!(state.last_trial().unwrap().duration_ms.is_some());
    }
}
