//! # kt-optimizer
//!
//! Optimizers that drive a tuning run over an adapter chain's search space.
//!
//! Provides the grid, random and Bayesian-heuristic search strategies, the
//! black-box optimizer contract with its strategy-driven implementation, and
//! an actor-critic optimizer (optionally with a liquid reservoir state) built
//! on `ndarray` networks, Ornstein-Uhlenbeck exploration noise and a
//! prioritized replay memory.

mod bo;
mod network;
mod noise;
mod objective;
mod optimizer;
mod replay;
mod reward;
mod rl;
mod search;

pub use bo::{BlackBoxOptimizer, BoConfig, BoOptimizer, BoStrategy, StrategyOptimizer};
pub use network::{Activation, Actor, Adam, Critic, FunctionApproximator, Mlp, Reservoir};
pub use noise::OuProcess;
pub use objective::{Evaluation, Objective};
pub use optimizer::Optimizer;
pub use replay::{PrioritizedReplayMemory, ReplayBatch, Transition};
pub use reward::reward;
pub use rl::{RlConfig, RlOptimizer, RlPhase};
pub use search::{BayesianSearch, GridSearch, RandomSearch, SearchStrategy};
