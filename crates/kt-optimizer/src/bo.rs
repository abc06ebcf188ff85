//! The black-box optimizer contract and its wiring to the experiment.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use kt_space::AdapterChain;
use kt_types::{BestResult, Configuration, KnobSpace, KtResult, OptimizerError};

use crate::objective::Objective;
use crate::search::{BayesianSearch, GridSearch, RandomSearch, SearchStrategy};

/// A black box minimizing `cost_fn` over `space` within `budget` evaluations.
pub trait BlackBoxOptimizer: Send {
    fn optimize(
        &mut self,
        space: &KnobSpace,
        budget: usize,
        cost_fn: &mut dyn FnMut(&Configuration) -> KtResult<f64>,
    ) -> KtResult<Option<(Configuration, f64)>>;

    fn name(&self) -> &str;
}

/// Drives a [`SearchStrategy`] one suggestion at a time.
#[derive(Debug, Clone)]
pub struct StrategyOptimizer<S: SearchStrategy> {
    strategy: S,
}

impl<S: SearchStrategy> StrategyOptimizer<S> {
    pub fn new(strategy: S) -> Self {
        Self { strategy }
    }

    pub fn strategy(&self) -> &S {
        &self.strategy
    }
}

impl<S: SearchStrategy> BlackBoxOptimizer for StrategyOptimizer<S> {
    fn optimize(
        &mut self,
        space: &KnobSpace,
        budget: usize,
        cost_fn: &mut dyn FnMut(&Configuration) -> KtResult<f64>,
    ) -> KtResult<Option<(Configuration, f64)>> {
        let mut best: Option<(Configuration, f64)> = None;

        for evaluated in 0..budget {
            let config = match self.strategy.suggest(1).pop() {
                Some(config) => config,
                None => {
                    debug!(evaluated, "Search strategy exhausted");
                    break;
                }
            };
            space.validate(&config)?;

            let cost = cost_fn(&config)?;
            self.strategy.report(&config, cost);

            if best.as_ref().map_or(true, |(_, incumbent)| cost < *incumbent) {
                best = Some((config, cost));
            }
        }

        Ok(best)
    }

    fn name(&self) -> &str {
        self.strategy.name()
    }
}

/// Search strategy behind the shipped black box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoStrategy {
    Grid,
    Random,
    Bayesian,
}

/// Black-box optimizer settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoConfig {
    pub strategy: BoStrategy,
    /// Exploration weight for Bayesian search (ignored for grid/random).
    pub exploration_weight: f64,
    /// Number of steps per non-enumerable dimension for grid search.
    pub grid_steps: usize,
}

impl Default for BoConfig {
    fn default() -> Self {
        Self {
            strategy: BoStrategy::Bayesian,
            exploration_weight: 0.3,
            grid_steps: 5,
        }
    }
}

impl BoConfig {
    pub fn with_strategy(mut self, strategy: BoStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_exploration_weight(mut self, weight: f64) -> Self {
        self.exploration_weight = weight;
        self
    }

    pub fn validate(&self) -> Result<(), OptimizerError> {
        if !(0.0..=1.0).contains(&self.exploration_weight) {
            return Err(OptimizerError::InvalidConfig {
                message: format!(
                    "exploration weight must lie in [0, 1], got {}",
                    self.exploration_weight
                ),
            });
        }
        Ok(())
    }

    /// Build the configured black box over `space`.
    pub fn build(&self, space: &KnobSpace, seed: u64) -> Box<dyn BlackBoxOptimizer> {
        match self.strategy {
            BoStrategy::Grid => Box::new(StrategyOptimizer::new(GridSearch::new(
                space.clone(),
                self.grid_steps,
            ))),
            BoStrategy::Random => {
                Box::new(StrategyOptimizer::new(RandomSearch::new(space.clone(), seed)))
            }
            BoStrategy::Bayesian => Box::new(StrategyOptimizer::new(BayesianSearch::new(
                space.clone(),
                self.exploration_weight,
                seed,
            ))),
        }
    }
}

/// Runs a black box over the adapter chain's search space. Every candidate
/// is unprojected to the original space, evaluated (which records the trial)
/// and converted to a cost before the black box sees it.
pub struct BoOptimizer {
    chain: AdapterChain,
    black_box: Box<dyn BlackBoxOptimizer>,
    budget: usize,
}

impl std::fmt::Debug for BoOptimizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoOptimizer")
            .field("chain", &self.chain)
            .field("black_box", &self.black_box.name())
            .field("budget", &self.budget)
            .finish()
    }
}

impl BoOptimizer {
    pub fn new(chain: AdapterChain, black_box: Box<dyn BlackBoxOptimizer>, budget: usize) -> Self {
        Self {
            chain,
            black_box,
            budget,
        }
    }

    pub fn from_config(
        chain: AdapterChain,
        config: &BoConfig,
        budget: usize,
        seed: u64,
    ) -> Result<Self, OptimizerError> {
        config.validate()?;
        let black_box = config.build(chain.search_space(), seed);
        Ok(Self::new(chain, black_box, budget))
    }

    pub fn name(&self) -> &str {
        self.black_box.name()
    }

    pub fn chain(&self) -> &AdapterChain {
        &self.chain
    }

    pub fn execute(&mut self, objective: &mut dyn Objective) -> KtResult<BestResult> {
        let budget = self.budget;
        let direction = objective.state().direction;
        let chain = &self.chain;
        info!(strategy = self.black_box.name(), budget, "Starting black-box search");

        let mut cost_fn = |search: &Configuration| -> KtResult<f64> {
            let config = chain.unproject(search);
            let evaluation = objective.evaluate(&config)?;
            Ok(direction.to_cost(evaluation.performance))
        };
        let best = self
            .black_box
            .optimize(chain.search_space(), budget, &mut cost_fn)?;

        if let Some((config, cost)) = &best {
            debug!(cost, best = %config, "Black box finished");
        }

        objective
            .state()
            .best_result()
            .ok_or_else(|| OptimizerError::MissingBaseline.into())
    }
}
