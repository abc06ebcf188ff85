use kt_types::{BestResult, KtResult};

use crate::bo::BoOptimizer;
use crate::objective::Objective;
use crate::rl::RlOptimizer;

/// The strategy a tuning run delegates to.
#[derive(Debug)]
pub enum Optimizer {
    Bo(BoOptimizer),
    Rl(RlOptimizer),
    /// Actor-critic with a liquid reservoir state.
    LiquidRl(RlOptimizer),
}

impl Optimizer {
    pub fn execute(&mut self, objective: &mut dyn Objective) -> KtResult<BestResult> {
        match self {
            Optimizer::Bo(optimizer) => optimizer.execute(objective),
            Optimizer::Rl(optimizer) | Optimizer::LiquidRl(optimizer) => optimizer.execute(objective),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Optimizer::Bo(optimizer) => optimizer.name(),
            Optimizer::Rl(_) => "rl",
            Optimizer::LiquidRl(_) => "liquid-rl",
        }
    }
}
