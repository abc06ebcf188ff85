//! The closed tuning loop: baseline, optimizer delegation, trial bookkeeping
//! and history export.

use std::time::Instant;

use crossbeam_channel::Sender;
use tracing::{error, info, warn};

use kt_optimizer::{BoOptimizer, Evaluation, Objective, Optimizer, RlOptimizer};
use kt_space::AdapterChain;
use kt_types::{
    BestResult, Configuration, DbmsError, ExperimentState, KnobSpace, KtError, KtResult, Trial,
};

use crate::config::{StrategyKind, TunerConfig};
use crate::context::ExperimentContext;
use crate::events::{EventSink, TuningEvent};
use crate::interface::{DbmsDriver, WorkloadRunner};

/// File name of the exported trial history.
pub const HISTORY_FILE: &str = "history.json";

/// Owns one tuning run end to end.
pub struct TuningEngine {
    config: TunerConfig,
    space: KnobSpace,
    context: ExperimentContext,
    optimizer: Optimizer,
    dbms: Box<dyn DbmsDriver>,
    workload: Box<dyn WorkloadRunner>,
    events: EventSink,
}

impl std::fmt::Debug for TuningEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TuningEngine")
            .field("run_id", &self.context.run_id)
            .field("optimizer", &self.optimizer.name())
            .field("dbms", &self.dbms.name())
            .field("workload", &self.workload.name())
            .field("knobs", &self.space.len())
            .finish()
    }
}

impl TuningEngine {
    pub fn new(
        config: TunerConfig,
        dbms: Box<dyn DbmsDriver>,
        workload: Box<dyn WorkloadRunner>,
    ) -> KtResult<Self> {
        config.validate()?;
        let space = config.knob_space()?;
        let chain = AdapterChain::build(space.clone(), &config.adapters, config.seed)?;
        let optimizer = build_optimizer(&config, chain)?;

        info!(
            strategy = %config.strategy,
            optimizer = optimizer.name(),
            knobs = space.len(),
            trials = config.trials,
            target = %config.target_metric,
            "Initialized tuning engine"
        );

        Ok(Self {
            context: ExperimentContext::new(config.seed, config.target_metric),
            config,
            space,
            optimizer,
            dbms,
            workload,
            events: EventSink::default(),
        })
    }

    /// Emit progress on `tx` while running.
    pub fn with_events(mut self, tx: Sender<TuningEvent>) -> Self {
        self.events = EventSink::new(tx);
        self
    }

    pub fn config(&self) -> &TunerConfig {
        &self.config
    }

    pub fn space(&self) -> &KnobSpace {
        &self.space
    }

    pub fn context(&self) -> &ExperimentContext {
        &self.context
    }

    pub fn history(&self) -> &ExperimentState {
        &self.context.state
    }

    pub fn optimizer_name(&self) -> &str {
        self.optimizer.name()
    }

    /// Reset the DBMS and measure the default configuration.
    pub fn baseline(&mut self) -> KtResult<f64> {
        match self.dbms.reset_to_default() {
            Ok(true) => {}
            Ok(false) => {
                error!("DBMS reset to defaults failed");
                return Err(DbmsError::RestartFailed {
                    reason: "reset_to_default returned false".to_string(),
                }
                .into());
            }
            Err(e) => {
                error!(error = %e, "DBMS reset to defaults failed");
                return Err(DbmsError::RestartFailed {
                    reason: e.to_string(),
                }
                .into());
            }
        }

        let default = self.space.sample_default();
        let mut runner = TrialRunner {
            space: &self.space,
            state: &mut self.context.state,
            dbms: self.dbms.as_mut(),
            workload: self.workload.as_mut(),
            events: &mut self.events,
        };
        let evaluation = runner.run_trial(&default, true)?;

        info!(
            run_id = %self.context.run_id,
            performance = evaluation.performance,
            "Measured default configuration"
        );
        self.events.emit(TuningEvent::Baseline {
            run_id: self.context.run_id,
            performance: evaluation.performance,
        });
        Ok(evaluation.performance)
    }

    /// Baseline, search, report. The history is exported even when the run
    /// aborts.
    pub fn run(&mut self) -> KtResult<BestResult> {
        let outcome = self.search();
        let exported = self.export_history();

        match &outcome {
            Ok(best) => {
                info!(
                    best_performance = best.performance,
                    worst_performance = ?self.context.state.worst_perf,
                    default_performance = ?best.default_performance,
                    improvement = best.improvement,
                    trials = best.trials,
                    elapsed_ms = self.context.elapsed_ms(),
                    "Tuning finished"
                );
                info!(configuration = %best.configuration, "Best configuration");
                self.events.emit(TuningEvent::Finished {
                    run_id: self.context.run_id,
                    best_performance: best.performance,
                    improvement: best.improvement,
                    trials: best.trials,
                });
            }
            Err(e) => error!(error = %e, trials = self.context.state.trials.len(), "Tuning aborted"),
        }

        exported?;
        outcome
    }

    fn search(&mut self) -> KtResult<BestResult> {
        self.baseline()?;

        let mut runner = TrialRunner {
            space: &self.space,
            state: &mut self.context.state,
            dbms: self.dbms.as_mut(),
            workload: self.workload.as_mut(),
            events: &mut self.events,
        };
        self.optimizer.execute(&mut runner)
    }

    /// Write `history.json` into the results directory, if one is configured.
    pub fn export_history(&self) -> KtResult<()> {
        let dir = match &self.config.results_dir {
            Some(dir) => dir,
            None => return Ok(()),
        };
        std::fs::create_dir_all(dir)?;
        let path = dir.join(HISTORY_FILE);
        let json = serde_json::to_string_pretty(&self.context)?;
        std::fs::write(&path, json)?;
        info!(path = %path.display(), "Exported trial history");
        Ok(())
    }
}

fn build_optimizer(config: &TunerConfig, chain: AdapterChain) -> KtResult<Optimizer> {
    let optimizer = match config.strategy {
        StrategyKind::Bo => Optimizer::Bo(BoOptimizer::from_config(
            chain,
            &config.bo,
            config.trials,
            config.seed,
        )?),
        StrategyKind::Rl => Optimizer::Rl(RlOptimizer::new(
            chain,
            config.rl.clone(),
            config.trials,
            config.seed,
            false,
        )?),
        StrategyKind::LiquidRl => Optimizer::LiquidRl(RlOptimizer::new(
            chain,
            config.rl.clone(),
            config.trials,
            config.seed,
            true,
        )?),
    };
    Ok(optimizer)
}

/// Evaluates configurations against the collaborators and records every
/// trial, successful or not, before returning.
struct TrialRunner<'a> {
    space: &'a KnobSpace,
    state: &'a mut ExperimentState,
    dbms: &'a mut dyn DbmsDriver,
    workload: &'a mut dyn WorkloadRunner,
    events: &'a mut EventSink,
}

impl TrialRunner<'_> {
    fn run_trial(&mut self, config: &Configuration, baseline: bool) -> KtResult<Evaluation> {
        let trial_number = self.state.next_trial_number();
        let mut trial = Trial::new(trial_number, config.clone());
        let started = Instant::now();

        let evaluation = match self.measure(config, trial_number) {
            Ok(evaluation) => evaluation,
            Err(e) => {
                error!(trial = trial_number, error = %e, "Trial failed");
                trial.mark_failed(e.to_string());
                self.record(trial, baseline);
                self.events.emit(TuningEvent::TrialFailed {
                    trial_number,
                    error: e.to_string(),
                });
                return Err(e);
            }
        };

        trial.mark_completed(evaluation.performance, Some(evaluation.stats.clone()));
        let new_best = self.record(trial, baseline);

        info!(
            trial = trial_number,
            performance = evaluation.performance,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Trial completed"
        );
        self.events.emit(TuningEvent::TrialCompleted {
            trial_number,
            performance: evaluation.performance,
        });
        if new_best && !baseline {
            let improvement = self
                .state
                .best_result()
                .map_or(0.0, |best| best.improvement);
            info!(trial = trial_number, performance = evaluation.performance, improvement, "New best configuration");
            self.events.emit(TuningEvent::NewBest {
                trial_number,
                performance: evaluation.performance,
                improvement,
            });
        }
        Ok(evaluation)
    }

    fn record(&mut self, trial: Trial, baseline: bool) -> bool {
        let outcome = if baseline {
            self.state.record_baseline(trial)
        } else {
            self.state.record(trial)
        };
        outcome.new_best
    }

    fn measure(&mut self, config: &Configuration, trial_number: usize) -> KtResult<Evaluation> {
        self.space.validate(config)?;

        match self.dbms.apply(config) {
            Ok(true) => {}
            Ok(false) => {
                return Err(DbmsError::ApplyFailed {
                    reason: format!("{} refused the configuration", self.dbms.name()),
                }
                .into())
            }
            Err(KtError::Dbms(e @ DbmsError::ApplyFailed { .. })) => return Err(e.into()),
            Err(e) => {
                return Err(DbmsError::ApplyFailed {
                    reason: e.to_string(),
                }
                .into())
            }
        }

        self.workload.run()?;
        let metrics = self.workload.metrics()?;
        let raw = metrics.metric(self.state.target)?;

        let (performance, degenerate) = self.state.direction.sanitize(raw);
        if degenerate {
            warn!(
                trial = trial_number,
                raw,
                sentinel = performance,
                "Degenerate metric replaced by the worst sentinel"
            );
        }

        let stats = self.dbms.stats()?.numeric;
        Ok(Evaluation { performance, stats })
    }
}

impl Objective for TrialRunner<'_> {
    fn evaluate(&mut self, config: &Configuration) -> KtResult<Evaluation> {
        self.run_trial(config, false)
    }

    fn state(&self) -> &ExperimentState {
        &*self.state
    }

    fn record_reward(&mut self, reward: f64) {
        self.state.set_last_reward(reward);
    }
}
