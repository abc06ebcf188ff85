//! Reward shaping for the actor-critic loop.

use kt_types::ObjectiveDirection;

/// Reward for measuring `perf` after `prev` on an experiment whose default
/// configuration measured `default`.
///
/// Gains are relative and direction-aware. Measuring the worst value seen so
/// far earns nothing, and a positive reward is withheld when the step
/// regressed relative to the previous measurement.
pub fn reward(
    direction: ObjectiveDirection,
    perf: f64,
    default: f64,
    prev: f64,
    worst: Option<f64>,
) -> f64 {
    if worst == Some(perf) {
        return 0.0;
    }

    let delta_default = direction.gain(perf, default);
    let delta_prev = direction.gain(perf, prev);

    let reward = if delta_default > 0.0 {
        ((1.0 + delta_default).powi(2) - 1.0) * (1.0 + delta_prev).abs()
    } else {
        -((1.0 - delta_default).powi(2) - 1.0) * (1.0 - delta_prev).abs()
    };

    if reward > 0.0 && delta_prev < 0.0 {
        0.0
    } else {
        reward
    }
}
