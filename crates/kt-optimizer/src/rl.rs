//! Actor-critic search with prioritized experience replay.
//!
//! A run bootstraps with a random initial design, then lets the actor
//! propose every further configuration from the statistics observed on the
//! previous trial. Rewards compare each measurement against the default and
//! the previous one (see [`reward`](crate::reward::reward)).

use ndarray::Array1;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use kt_space::AdapterChain;
use kt_types::{BestResult, Configuration, KtResult, ObjectiveDirection, OptimizerError};

use crate::network::{Actor, Critic, FunctionApproximator, Reservoir};
use crate::noise::OuProcess;
use crate::objective::Objective;
use crate::replay::{PrioritizedReplayMemory, Transition};
use crate::reward::reward;

/// Actor-critic hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RlConfig {
    /// Random configurations evaluated before the actor takes over.
    pub n_init: usize,
    pub batch_size: usize,
    /// Learning steps per guided iteration.
    pub n_epochs: usize,
    pub gamma: f64,
    pub tau: f64,
    pub actor_lr: f64,
    pub critic_lr: f64,
    pub weight_decay: f64,
    pub actor_hidden: Vec<usize>,
    pub critic_hidden: Vec<usize>,
    pub memory_capacity: usize,
    pub noise_theta: f64,
    pub noise_mu: f64,
    pub noise_sigma: f64,
    /// Multiplies the noise scale after every guided iteration. `1.0`
    /// disables annealing.
    pub noise_decay: f64,
    /// Probability that a guided iteration evaluates a random configuration.
    pub random_fraction: f64,
    /// Probability that a guided iteration searches around the best action
    /// seen so far instead of asking the actor.
    pub exploit_fraction: f64,
    /// Initial step length of the search around the best action, in unit
    /// coordinates.
    pub exploit_radius: f64,
    pub reservoir_size: usize,
    pub reservoir_leak: f64,
}

impl Default for RlConfig {
    fn default() -> Self {
        Self {
            n_init: 10,
            batch_size: 32,
            n_epochs: 2,
            gamma: 0.9,
            tau: 0.002,
            actor_lr: 0.001,
            critic_lr: 0.001,
            weight_decay: 1e-5,
            actor_hidden: vec![128, 128, 64],
            critic_hidden: vec![128, 256, 64],
            memory_capacity: 100_000,
            noise_theta: 0.15,
            noise_mu: 0.0,
            noise_sigma: 0.1,
            noise_decay: 1.0,
            random_fraction: 0.0,
            exploit_fraction: 0.5,
            exploit_radius: 0.1,
            reservoir_size: 32,
            reservoir_leak: 0.3,
        }
    }
}

impl RlConfig {
    pub fn with_n_init(mut self, n: usize) -> Self {
        self.n_init = n;
        self
    }

    pub fn with_batch_size(mut self, n: usize) -> Self {
        self.batch_size = n;
        self
    }

    pub fn with_epochs(mut self, n: usize) -> Self {
        self.n_epochs = n;
        self
    }

    pub fn with_learning_rates(mut self, actor_lr: f64, critic_lr: f64) -> Self {
        self.actor_lr = actor_lr;
        self.critic_lr = critic_lr;
        self
    }

    pub fn with_hidden(mut self, actor: Vec<usize>, critic: Vec<usize>) -> Self {
        self.actor_hidden = actor;
        self.critic_hidden = critic;
        self
    }

    pub fn with_noise(mut self, sigma: f64, decay: f64) -> Self {
        self.noise_sigma = sigma;
        self.noise_decay = decay;
        self
    }

    pub fn with_tau(mut self, tau: f64) -> Self {
        self.tau = tau;
        self
    }

    pub fn with_random_fraction(mut self, fraction: f64) -> Self {
        self.random_fraction = fraction;
        self
    }

    pub fn with_exploitation(mut self, fraction: f64, radius: f64) -> Self {
        self.exploit_fraction = fraction;
        self.exploit_radius = radius;
        self
    }

    pub fn validate(&self) -> Result<(), OptimizerError> {
        let invalid = |message: String| Err(OptimizerError::InvalidConfig { message });
        if self.batch_size == 0 {
            return invalid("batch size must be positive".to_string());
        }
        if self.memory_capacity < self.batch_size {
            return invalid(format!(
                "memory capacity {} is smaller than the batch size {}",
                self.memory_capacity, self.batch_size
            ));
        }
        if !(self.tau > 0.0 && self.tau <= 1.0) {
            return invalid(format!("tau must lie in (0, 1], got {}", self.tau));
        }
        if !(0.0..=1.0).contains(&self.gamma) {
            return invalid(format!("gamma must lie in [0, 1], got {}", self.gamma));
        }
        if !(0.0..=1.0).contains(&self.random_fraction) {
            return invalid(format!("random fraction must lie in [0, 1], got {}", self.random_fraction));
        }
        if !(0.0..=1.0).contains(&self.exploit_fraction) {
            return invalid(format!("exploit fraction must lie in [0, 1], got {}", self.exploit_fraction));
        }
        if !(self.exploit_radius > 0.0 && self.exploit_radius.is_finite()) {
            return invalid(format!("exploit radius must be positive, got {}", self.exploit_radius));
        }
        if !(self.noise_decay > 0.0 && self.noise_decay <= 1.0) {
            return invalid(format!("noise decay must lie in (0, 1], got {}", self.noise_decay));
        }
        if !(self.reservoir_leak > 0.0 && self.reservoir_leak <= 1.0) {
            return invalid(format!("reservoir leak must lie in (0, 1], got {}", self.reservoir_leak));
        }
        Ok(())
    }
}

/// Where the loop is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RlPhase {
    Bootstrap,
    Guided,
    Done,
}

/// Pattern search around the incumbent action. A failed step is retried in
/// the mirrored direction; when both fail the radius halves.
#[derive(Debug, Clone)]
struct LocalSearch {
    radius: f64,
    direction: Vec<f64>,
    retry: bool,
}

impl LocalSearch {
    fn new(radius: f64) -> Self {
        Self {
            radius,
            direction: Vec::new(),
            retry: false,
        }
    }

    fn propose(&mut self, center: &[f64], rng: &mut ChaCha8Rng) -> Vec<f64> {
        let sign = if self.retry && self.direction.len() == center.len() {
            -1.0
        } else {
            self.retry = false;
            self.direction = random_direction(center.len(), rng);
            1.0
        };
        center
            .iter()
            .zip(&self.direction)
            .map(|(c, d)| (c + sign * self.radius * d).clamp(0.0, 1.0))
            .collect()
    }

    fn feedback(&mut self, improved: bool) {
        if improved {
            self.retry = false;
        } else if self.retry {
            self.retry = false;
            self.radius *= 0.5;
        } else {
            self.retry = true;
        }
    }
}

/// Uniformly distributed unit vector.
fn random_direction(dim: usize, rng: &mut ChaCha8Rng) -> Vec<f64> {
    let v: Vec<f64> = (0..dim).map(|_| rng.sample::<f64, _>(StandardNormal)).collect();
    let norm = v.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm > 0.0 {
        v.into_iter().map(|x| x / norm).collect()
    } else {
        v
    }
}

/// Networks and exploration state, built once the state dimension is known.
#[derive(Debug, Clone)]
struct Agent {
    actor: Actor,
    actor_target: Actor,
    critic: Critic,
    critic_target: Critic,
    noise: OuProcess,
    reservoir: Option<Reservoir>,
    hidden: Array1<f64>,
}

impl Agent {
    fn new(obs_dim: usize, action_dim: usize, liquid: bool, config: &RlConfig, rng: &mut ChaCha8Rng) -> Self {
        let reservoir = liquid.then(|| Reservoir::new(obs_dim, config.reservoir_size, config.reservoir_leak, rng));
        let hidden = reservoir
            .as_ref()
            .map_or_else(|| Array1::zeros(0), Reservoir::initial_state);
        let state_dim = obs_dim + hidden.len();

        let actor = Actor::new(
            state_dim,
            action_dim,
            &config.actor_hidden,
            config.actor_lr,
            config.weight_decay,
            rng,
        );
        let critic = Critic::new(
            state_dim,
            action_dim,
            &config.critic_hidden,
            config.critic_lr,
            config.weight_decay,
            rng,
        );

        Self {
            actor_target: actor.clone(),
            critic_target: critic.clone(),
            actor,
            critic,
            noise: OuProcess::new(action_dim, config.noise_theta, config.noise_mu, config.noise_sigma),
            reservoir,
            hidden,
        }
    }

    /// Network input for an observation; advances the reservoir.
    fn perceive(&mut self, observation: &[f64]) -> Vec<f64> {
        match &self.reservoir {
            Some(reservoir) => {
                self.hidden = reservoir.step(&self.hidden, observation);
                observation.iter().chain(self.hidden.iter()).copied().collect()
            }
            None => observation.to_vec(),
        }
    }

    /// Noisy actor output, clipped to the unit cube.
    fn propose(&mut self, state: &[f64], rng: &mut ChaCha8Rng) -> Vec<f64> {
        let action = self.actor.act(state);
        let noise = self.noise.sample(rng);
        action
            .iter()
            .zip(noise)
            .map(|(a, n)| (a + n).clamp(0.0, 1.0))
            .collect()
    }

    fn td_error(&self, transition: &Transition, gamma: f64) -> f64 {
        let next_action = self.actor_target.act(&transition.next_state);
        let target = transition.reward + gamma * self.critic_target.q_single(&transition.next_state, &next_action);
        (self.critic.q_single(&transition.state, &transition.action) - target).abs()
    }

    fn learn(&mut self, memory: &mut PrioritizedReplayMemory, rng: &mut ChaCha8Rng, config: &RlConfig) {
        let batch = memory.sample(config.batch_size, rng);
        if batch.is_empty() {
            return;
        }
        let states = batch.states();
        let actions = batch.actions();
        let next_states = batch.next_states();

        let next_actions = self.actor_target.forward(&next_states);
        let next_q = self.critic_target.q(&next_states, &next_actions);
        let targets = batch.rewards() + next_q * config.gamma;

        let current = self.critic.q(&states, &actions);
        for (k, index) in batch.indices.iter().enumerate() {
            memory.update(*index, current[k] - targets[k]);
        }

        let critic_loss = self.critic.train_step(&states, &actions, &targets);
        let actor_loss = self.actor.train_step(&states, &self.critic);
        self.critic_target.soft_update(&self.critic, config.tau);
        self.actor_target.soft_update(&self.actor, config.tau);
        debug!(critic_loss, actor_loss, "Learning step");
    }
}

/// Actor-critic optimizer over the adapter chain's search space. The
/// liquid variant feeds a fixed recurrent reservoir's state to both networks
/// alongside the observation.
#[derive(Debug)]
pub struct RlOptimizer {
    config: RlConfig,
    chain: AdapterChain,
    n_total: usize,
    liquid: bool,
    rng: ChaCha8Rng,
    memory: PrioritizedReplayMemory,
    agent: Option<Agent>,
    phase: RlPhase,
    /// Per-axis divisor applied to observed statistics.
    stats_scale: Vec<f64>,
    /// Best action evaluated so far and its performance.
    incumbent: Option<(Vec<f64>, f64)>,
    local: LocalSearch,
}

impl RlOptimizer {
    pub fn new(
        chain: AdapterChain,
        config: RlConfig,
        n_total: usize,
        seed: u64,
        liquid: bool,
    ) -> Result<Self, OptimizerError> {
        config.validate()?;
        Ok(Self {
            memory: PrioritizedReplayMemory::new(config.memory_capacity),
            local: LocalSearch::new(config.exploit_radius),
            config,
            chain,
            n_total,
            liquid,
            rng: ChaCha8Rng::seed_from_u64(seed),
            agent: None,
            phase: RlPhase::Bootstrap,
            stats_scale: Vec::new(),
            incumbent: None,
        })
    }

    pub fn phase(&self) -> RlPhase {
        self.phase
    }

    pub fn is_liquid(&self) -> bool {
        self.liquid
    }

    pub fn memory(&self) -> &PrioritizedReplayMemory {
        &self.memory
    }

    pub fn chain(&self) -> &AdapterChain {
        &self.chain
    }

    /// Observation vector for a measurement: the statistics scaled by the
    /// baseline's magnitudes, or the relative gain when no statistics are
    /// reported.
    fn observe(
        &self,
        stats: &[f64],
        direction: ObjectiveDirection,
        perf: f64,
        default: f64,
    ) -> Result<Vec<f64>, OptimizerError> {
        if self.stats_scale.is_empty() {
            return Ok(vec![direction.gain(perf, default)]);
        }
        if stats.len() != self.stats_scale.len() {
            return Err(OptimizerError::DimensionMismatch {
                expected: self.stats_scale.len(),
                actual: stats.len(),
            });
        }
        Ok(stats
            .iter()
            .zip(&self.stats_scale)
            .map(|(s, scale)| if s.is_finite() { s / scale } else { 0.0 })
            .collect())
    }

    /// Make `action` the incumbent if it beat every earlier action.
    fn track(&mut self, action: &[f64], perf: f64, direction: ObjectiveDirection) -> bool {
        let improved = match &self.incumbent {
            Some((_, best)) => direction.is_better(perf, *best),
            None => true,
        };
        if improved {
            self.incumbent = Some((action.to_vec(), perf));
        }
        improved
    }

    fn remember(&mut self, transition: Transition) {
        let error = match &self.agent {
            Some(agent) => agent.td_error(&transition, self.config.gamma),
            None => 0.0,
        };
        self.memory.add(error, transition);
    }

    /// Run `n_total` trials and report the best configuration found.
    pub fn execute(&mut self, objective: &mut dyn Objective) -> KtResult<BestResult> {
        let direction = objective.state().direction;
        let default_perf = objective
            .state()
            .default_perf
            .ok_or(OptimizerError::MissingBaseline)?;
        let baseline_stats = objective
            .state()
            .trials
            .first()
            .and_then(|t| t.stats.clone())
            .unwrap_or_default();
        self.stats_scale = baseline_stats.iter().map(|v| v.abs().max(1.0)).collect();
        self.incumbent = None;
        self.local = LocalSearch::new(self.config.exploit_radius);

        let observation = self.observe(&baseline_stats, direction, default_perf, default_perf)?;
        let action_dim = self.chain.search_space().len();
        let mut agent = Agent::new(observation.len(), action_dim, self.liquid, &self.config, &mut self.rng);
        let mut prev_state = agent.perceive(&observation);
        self.agent = Some(agent);
        let mut prev_perf = default_perf;

        let n_init = self.config.n_init.min(self.n_total);
        info!(
            n_init,
            n_total = self.n_total,
            liquid = self.liquid,
            search_dim = action_dim,
            "Starting actor-critic search"
        );

        // Bootstrap: random initial design
        self.phase = RlPhase::Bootstrap;
        let mut last: Option<Transition> = None;
        for _ in 0..n_init {
            let search = self.chain.sample(&mut self.rng);
            let action = self.chain.search_space().encode(&search);
            let config = self.chain.unproject(&search);
            let (state, perf, r) = self.step(objective, &config, direction, default_perf, prev_perf)?;
            self.track(&action, perf, direction);

            let transition = Transition {
                state: prev_state,
                action,
                reward: r,
                next_state: state.clone(),
            };
            self.remember(transition.clone());
            last = Some(transition);
            prev_state = state;
            prev_perf = perf;
        }
        if let Some(last) = last {
            self.remember(Transition {
                state: last.next_state.clone(),
                ..last
            });
        }

        // Guided search
        self.phase = RlPhase::Guided;
        for _ in n_init..self.n_total {
            let random = self.rng.gen::<f64>() < self.config.random_fraction;
            let exploit = match &self.incumbent {
                Some((center, _)) if !random && self.rng.gen::<f64>() < self.config.exploit_fraction => {
                    Some(self.local.propose(center, &mut self.rng))
                }
                _ => None,
            };
            let local_step = exploit.is_some();
            let action = if random {
                let search = self.chain.sample(&mut self.rng);
                self.chain.search_space().encode(&search)
            } else if let Some(action) = exploit {
                debug!(radius = self.local.radius, "Searching around the incumbent");
                action
            } else {
                match self.agent.as_mut() {
                    Some(agent) => agent.propose(&prev_state, &mut self.rng),
                    None => return Err(OptimizerError::MissingBaseline.into()),
                }
            };
            let (_, config) = self.chain.decode(&action);
            let (state, perf, r) = self.step(objective, &config, direction, default_perf, prev_perf)?;
            let improved = self.track(&action, perf, direction);
            if local_step {
                self.local.feedback(improved);
            }

            self.remember(Transition {
                state: prev_state,
                action,
                reward: r,
                next_state: state.clone(),
            });
            prev_state = state;
            prev_perf = perf;

            if let Some(agent) = self.agent.as_mut() {
                if self.memory.len() >= self.config.batch_size {
                    for _ in 0..self.config.n_epochs {
                        agent.learn(&mut self.memory, &mut self.rng, &self.config);
                    }
                }
                if self.config.noise_decay < 1.0 {
                    agent.noise.scale_sigma(self.config.noise_decay);
                }
            }
        }
        self.phase = RlPhase::Done;

        let best = objective
            .state()
            .best_result()
            .ok_or(OptimizerError::MissingBaseline)?;
        info!(
            best_performance = best.performance,
            improvement = best.improvement,
            replay_size = self.memory.len(),
            "Actor-critic search finished"
        );
        Ok(best)
    }

    /// Evaluate one configuration and turn the measurement into the next
    /// network state and a reward.
    fn step(
        &mut self,
        objective: &mut dyn Objective,
        config: &Configuration,
        direction: ObjectiveDirection,
        default_perf: f64,
        prev_perf: f64,
    ) -> KtResult<(Vec<f64>, f64, f64)> {
        let evaluation = objective.evaluate(config)?;
        let perf = evaluation.performance;
        let worst = objective.state().worst_perf;
        let r = reward(direction, perf, default_perf, prev_perf, worst);
        objective.record_reward(r);

        let observation = self.observe(&evaluation.stats, direction, perf, default_perf)?;
        let state = match self.agent.as_mut() {
            Some(agent) => agent.perceive(&observation),
            None => observation,
        };

        info!(
            trial = objective.state().iteration,
            phase = ?self.phase,
            performance = perf,
            reward = r,
            "Evaluated configuration"
        );
        Ok((state, perf, r))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objective::Evaluation;
    use kt_types::{ExperimentState, KnobSpace, KnobSpec, TargetMetric, Trial};

    /// Throughput peaks at `x = 0.3` of the unit range.
    struct Peak {
        space: KnobSpace,
        state: ExperimentState,
        rewards: Vec<f64>,
        with_stats: bool,
    }

    impl Peak {
        fn new(with_stats: bool) -> Self {
            let space = KnobSpace::from_specs(vec![
                KnobSpec::real("x", 0.0, 1.0, 0.9),
                KnobSpec::real("y", 0.0, 1.0, 0.5),
            ])
            .unwrap();
            let mut state = ExperimentState::new(TargetMetric::Throughput);
            let default = space.sample_default();
            let mut peak = Self {
                space,
                state: ExperimentState::new(TargetMetric::Throughput),
                rewards: Vec::new(),
                with_stats,
            };
            let (perf, stats) = peak.measure(&default);
            let mut trial = Trial::new(0, default);
            trial.mark_completed(perf, stats);
            state.record_baseline(trial);
            peak.state = state;
            peak
        }

        fn measure(&self, config: &Configuration) -> (f64, Option<Vec<f64>>) {
            let x = config.get_f64("x").unwrap_or(0.0);
            let perf = 100.0 / (1.0 + 10.0 * (x - 0.3).abs());
            let stats = self.with_stats.then(|| vec![perf * 10.0, x]);
            (perf, stats)
        }
    }

    impl Objective for Peak {
        fn evaluate(&mut self, config: &Configuration) -> KtResult<Evaluation> {
            self.space.validate(config)?;
            let (performance, stats) = self.measure(config);
            let mut trial = Trial::new(self.state.next_trial_number(), config.clone());
            trial.mark_completed(performance, stats.clone());
            self.state.record(trial);
            Ok(Evaluation {
                performance,
                stats: stats.unwrap_or_default(),
            })
        }

        fn state(&self) -> &ExperimentState {
            &self.state
        }

        fn record_reward(&mut self, reward: f64) {
            self.rewards.push(reward);
            self.state.set_last_reward(reward);
        }
    }

    fn small_config() -> RlConfig {
        RlConfig::default()
            .with_n_init(4)
            .with_batch_size(4)
            .with_epochs(3)
            .with_hidden(vec![8], vec![8])
    }

    #[test]
    fn runs_every_trial_and_fills_memory() {
        let mut objective = Peak::new(true);
        let chain = AdapterChain::identity(objective.space.clone());
        let mut optimizer = RlOptimizer::new(chain, small_config(), 12, 1, false).unwrap();
        assert_eq!(optimizer.phase(), RlPhase::Bootstrap);

        let best = optimizer.execute(&mut objective).unwrap();
        assert_eq!(optimizer.phase(), RlPhase::Done);
        assert_eq!(objective.state.iteration, 12);
        assert_eq!(objective.rewards.len(), 12);
        // one transition per trial plus the closing bootstrap transition
        assert_eq!(optimizer.memory().len(), 13);
        assert_eq!(Some(best.performance), objective.state.best_perf);
        assert!(objective.state.trials.iter().skip(1).all(|t| t.reward.is_some()));
    }

    #[test]
    fn liquid_variant_extends_the_state() {
        let mut objective = Peak::new(true);
        let chain = AdapterChain::identity(objective.space.clone());
        let config = small_config();
        let reservoir = config.reservoir_size;
        let mut optimizer = RlOptimizer::new(chain, config, 8, 2, true).unwrap();
        optimizer.execute(&mut objective).unwrap();

        assert!(optimizer.is_liquid());
        for transition in optimizer.memory().iter() {
            assert_eq!(transition.state.len(), 2 + reservoir);
            assert_eq!(transition.next_state.len(), 2 + reservoir);
        }
    }

    #[test]
    fn works_without_statistics() {
        let mut objective = Peak::new(false);
        let chain = AdapterChain::identity(objective.space.clone());
        let mut optimizer = RlOptimizer::new(chain, small_config(), 6, 3, false).unwrap();
        optimizer.execute(&mut objective).unwrap();
        for transition in optimizer.memory().iter() {
            assert_eq!(transition.state.len(), 1);
        }
    }

    #[test]
    fn same_seed_same_trajectory() {
        let run = |seed: u64| {
            let mut objective = Peak::new(true);
            let chain = AdapterChain::identity(objective.space.clone());
            let mut optimizer = RlOptimizer::new(chain, small_config(), 10, seed, false).unwrap();
            optimizer.execute(&mut objective).unwrap();
            objective
                .state
                .trials
                .iter()
                .map(|t| t.performance.unwrap_or_default())
                .collect::<Vec<_>>()
        };
        assert_eq!(run(7), run(7));
    }

    #[test]
    fn annealing_keeps_the_noise_state() {
        let mut objective = Peak::new(true);
        let chain = AdapterChain::identity(objective.space.clone());
        let config = small_config().with_noise(0.1, 0.5).with_exploitation(0.0, 0.1);
        let mut optimizer = RlOptimizer::new(chain, config, 10, 4, false).unwrap();
        optimizer.execute(&mut objective).unwrap();

        let noise = &optimizer.agent.as_ref().unwrap().noise;
        assert!((noise.sigma() - 0.1 * 0.5f64.powi(6)).abs() < 1e-12);
        assert!(noise.current().iter().any(|x| *x != 0.0));
    }

    #[test]
    fn local_search_mirrors_then_shrinks() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let mut local = LocalSearch::new(0.2);
        let center = [0.5, 0.5];

        let first = local.propose(&center, &mut rng);
        local.feedback(false);
        let second = local.propose(&center, &mut rng);
        for k in 0..2 {
            assert!((first[k] - 0.5 + second[k] - 0.5).abs() < 1e-12);
        }
        let step: f64 = first.iter().map(|x| (x - 0.5).powi(2)).sum::<f64>().sqrt();
        assert!((step - 0.2).abs() < 1e-12);

        local.feedback(false);
        assert_eq!(local.radius, 0.1);
        local.propose(&center, &mut rng);
        local.feedback(true);
        assert_eq!(local.radius, 0.1);
        assert!(!local.retry);
    }

    #[test]
    fn local_search_closes_in_on_a_minimum() {
        let mut rng = ChaCha8Rng::seed_from_u64(6);
        let mut local = LocalSearch::new(0.1);
        let target = 0.0624;
        let mut best = vec![0.5];
        for _ in 0..40 {
            let candidate = local.propose(&best, &mut rng);
            let improved = (candidate[0] - target).abs() < (best[0] - target).abs();
            if improved {
                best = candidate;
            }
            local.feedback(improved);
        }
        assert!((best[0] - target).abs() < 0.005, "ended at {}", best[0]);
    }

    #[test]
    fn incumbent_tracks_the_best_action() {
        let mut objective = Peak::new(true);
        let chain = AdapterChain::identity(objective.space.clone());
        let mut optimizer = RlOptimizer::new(chain, small_config(), 12, 8, false).unwrap();
        optimizer.execute(&mut objective).unwrap();

        let (action, perf) = optimizer.incumbent.clone().unwrap();
        assert_eq!(action.len(), 2);
        let baseline = objective.state.default_perf.unwrap();
        let best = objective.state.best_perf.unwrap();
        assert!(perf == best || best == baseline);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let config: RlConfig = serde_json::from_value(serde_json::json!({
            "n_init": 3,
            "noise_decay": 0.9,
            "actor_hidden": [16, 16]
        }))
        .unwrap();
        assert_eq!(config.n_init, 3);
        assert_eq!(config.actor_hidden, vec![16, 16]);
        assert_eq!(config.critic_hidden, vec![128, 256, 64]);
        assert_eq!(config.batch_size, 32);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_invalid_config() {
        let space = Peak::new(true).space;
        let config = RlConfig::default().with_tau(0.0);
        assert!(RlOptimizer::new(AdapterChain::identity(space.clone()), config, 10, 0, false).is_err());
        let config = RlConfig::default().with_exploitation(1.5, 0.1);
        assert!(RlOptimizer::new(AdapterChain::identity(space), config, 10, 0, false).is_err());
    }

    #[test]
    fn requires_a_baseline() {
        let space = KnobSpace::from_specs(vec![KnobSpec::real("x", 0.0, 1.0, 0.5)]).unwrap();
        let mut objective = Peak::new(true);
        objective.state = ExperimentState::new(TargetMetric::Throughput);
        let mut optimizer =
            RlOptimizer::new(AdapterChain::identity(space), small_config(), 3, 0, false).unwrap();
        assert!(optimizer.execute(&mut objective).is_err());
    }
}
