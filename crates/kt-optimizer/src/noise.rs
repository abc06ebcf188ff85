//! Ornstein-Uhlenbeck exploration noise.

use rand::Rng;
use rand_distr::StandardNormal;

/// Time-correlated noise added to actor outputs during guided search.
#[derive(Debug, Clone)]
pub struct OuProcess {
    theta: f64,
    mu: f64,
    sigma: f64,
    current: Vec<f64>,
}

impl OuProcess {
    pub fn new(dim: usize, theta: f64, mu: f64, sigma: f64) -> Self {
        Self {
            theta,
            mu,
            sigma,
            current: vec![mu; dim],
        }
    }

    pub fn sigma(&self) -> f64 {
        self.sigma
    }

    /// Advance one step and return the new noise value.
    pub fn sample<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Vec<f64> {
        for x in self.current.iter_mut() {
            let z: f64 = rng.sample(StandardNormal);
            *x += self.theta * (self.mu - *x) + self.sigma * z;
        }
        self.current.clone()
    }

    /// Multiply the noise scale by `factor`, keeping the process state.
    pub fn scale_sigma(&mut self, factor: f64) {
        self.sigma *= factor;
    }

    pub fn current(&self) -> &[f64] {
        &self.current
    }

    /// Return the state to `mu`. Zero arguments keep the current parameter.
    pub fn reset(&mut self, sigma: f64, theta: f64) {
        self.current.iter_mut().for_each(|x| *x = self.mu);
        if sigma != 0.0 {
            self.sigma = sigma;
        }
        if theta != 0.0 {
            self.theta = theta;
        }
    }
}
