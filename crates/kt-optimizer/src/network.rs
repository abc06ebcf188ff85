//! Dense networks on `ndarray` used as the actor and critic of the RL loop,
//! plus the fixed random reservoir of the liquid variant.

use ndarray::{s, Array1, Array2, Axis};
use rand::Rng;
use rand_distr::StandardNormal;

/// Activation function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    Tanh,
    Sigmoid,
    Linear,
}

impl Activation {
    fn apply(&self, z: &Array2<f64>) -> Array2<f64> {
        match self {
            Self::Tanh => z.mapv(f64::tanh),
            Self::Sigmoid => z.mapv(|v| 1.0 / (1.0 + (-v).exp())),
            Self::Linear => z.clone(),
        }
    }

    /// Derivative expressed through the activation output `a`.
    fn derivative(&self, a: &Array2<f64>) -> Array2<f64> {
        match self {
            Self::Tanh => a.mapv(|v| 1.0 - v * v),
            Self::Sigmoid => a.mapv(|v| v * (1.0 - v)),
            Self::Linear => Array2::ones(a.raw_dim()),
        }
    }
}

/// Common interface of the learned function approximators.
pub trait FunctionApproximator {
    /// Batched evaluation, one row per sample.
    fn forward(&self, input: &Array2<f64>) -> Array2<f64>;

    /// All parameters flattened, layer by layer.
    fn parameters(&self) -> Vec<f64>;

    /// `θ ← τ·θ_source + (1 − τ)·θ`.
    fn soft_update(&mut self, source: &Self, tau: f64)
    where
        Self: Sized;
}

/// Per-layer weight and bias gradients.
pub type Gradients = Vec<(Array2<f64>, Array1<f64>)>;

/// Intermediate values of a forward pass, kept for backpropagation.
#[derive(Debug, Clone)]
pub struct ForwardCache {
    /// Input followed by every layer's output.
    activations: Vec<Array2<f64>>,
}

impl ForwardCache {
    pub fn output(&self) -> &Array2<f64> {
        &self.activations[self.activations.len() - 1]
    }
}

/// Multi-layer perceptron with one activation for hidden layers and one for
/// the output layer.
#[derive(Debug, Clone)]
pub struct Mlp {
    weights: Vec<Array2<f64>>,
    biases: Vec<Array1<f64>>,
    hidden: Activation,
    output: Activation,
}

impl Mlp {
    /// `sizes` lists every layer width, input first and output last.
    pub fn new<R: Rng + ?Sized>(
        sizes: &[usize],
        hidden: Activation,
        output: Activation,
        rng: &mut R,
    ) -> Self {
        let mut weights = Vec::new();
        let mut biases = Vec::new();

        for pair in sizes.windows(2) {
            let (n_in, n_out) = (pair[0], pair[1]);
            // Xavier/Glorot initialization
            let scale = (2.0 / (n_in + n_out).max(1) as f64).sqrt();
            weights.push(Array2::from_shape_fn((n_in, n_out), |_| {
                rng.gen::<f64>() * 2.0 * scale - scale
            }));
            biases.push(Array1::zeros(n_out));
        }

        Self {
            weights,
            biases,
            hidden,
            output,
        }
    }

    pub fn input_dim(&self) -> usize {
        self.weights.first().map_or(0, |w| w.nrows())
    }

    pub fn output_dim(&self) -> usize {
        self.weights.last().map_or(0, |w| w.ncols())
    }

    fn activation_for(&self, layer: usize) -> Activation {
        if layer + 1 == self.weights.len() {
            self.output
        } else {
            self.hidden
        }
    }

    pub fn forward_cached(&self, x: &Array2<f64>) -> ForwardCache {
        let mut activations = vec![x.clone()];
        for (i, (w, b)) in self.weights.iter().zip(&self.biases).enumerate() {
            let z = activations[i].dot(w) + b;
            activations.push(self.activation_for(i).apply(&z));
        }
        ForwardCache { activations }
    }

    /// Backpropagate `grad_output` (dL/d output, one row per sample). Returns
    /// parameter gradients and the gradient with respect to the input.
    pub fn backward(&self, cache: &ForwardCache, grad_output: &Array2<f64>) -> (Gradients, Array2<f64>) {
        let n_layers = self.weights.len();
        let mut gradients = Vec::with_capacity(n_layers);
        let mut delta =
            grad_output * &self.activation_for(n_layers - 1).derivative(&cache.activations[n_layers]);
        let mut grad_input = Array2::zeros(cache.activations[0].raw_dim());

        for i in (0..n_layers).rev() {
            let grad_w = cache.activations[i].t().dot(&delta);
            let grad_b = delta.sum_axis(Axis(0));
            gradients.push((grad_w, grad_b));

            let back = delta.dot(&self.weights[i].t());
            if i > 0 {
                delta = back * self.activation_for(i - 1).derivative(&cache.activations[i]);
            } else {
                grad_input = back;
            }
        }

        gradients.reverse();
        (gradients, grad_input)
    }
}

impl FunctionApproximator for Mlp {
    fn forward(&self, input: &Array2<f64>) -> Array2<f64> {
        self.forward_cached(input).output().clone()
    }

    fn parameters(&self) -> Vec<f64> {
        self.weights
            .iter()
            .zip(&self.biases)
            .flat_map(|(w, b)| w.iter().chain(b.iter()).copied().collect::<Vec<_>>())
            .collect()
    }

    fn soft_update(&mut self, source: &Self, tau: f64) {
        for (target, src) in self.weights.iter_mut().zip(&source.weights) {
            target.zip_mut_with(src, |t, s| *t = tau * s + (1.0 - tau) * *t);
        }
        for (target, src) in self.biases.iter_mut().zip(&source.biases) {
            target.zip_mut_with(src, |t, s| *t = tau * s + (1.0 - tau) * *t);
        }
    }
}

/// Adam with L2 weight decay folded into the gradient.
#[derive(Debug, Clone)]
pub struct Adam {
    lr: f64,
    beta1: f64,
    beta2: f64,
    eps: f64,
    weight_decay: f64,
    t: i32,
    m_w: Vec<Array2<f64>>,
    v_w: Vec<Array2<f64>>,
    m_b: Vec<Array1<f64>>,
    v_b: Vec<Array1<f64>>,
}

impl Adam {
    pub fn new(net: &Mlp, lr: f64, weight_decay: f64) -> Self {
        Self {
            lr,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
            weight_decay,
            t: 0,
            m_w: net.weights.iter().map(|w| Array2::zeros(w.raw_dim())).collect(),
            v_w: net.weights.iter().map(|w| Array2::zeros(w.raw_dim())).collect(),
            m_b: net.biases.iter().map(|b| Array1::zeros(b.raw_dim())).collect(),
            v_b: net.biases.iter().map(|b| Array1::zeros(b.raw_dim())).collect(),
        }
    }

    pub fn step(&mut self, net: &mut Mlp, gradients: Gradients) {
        self.t += 1;
        let (b1, b2, eps, lr, wd) = (self.beta1, self.beta2, self.eps, self.lr, self.weight_decay);
        let c1 = 1.0 - b1.powi(self.t);
        let c2 = 1.0 - b2.powi(self.t);

        for (i, (grad_w, grad_b)) in gradients.into_iter().enumerate() {
            let grad_w = grad_w + &(&net.weights[i] * wd);
            self.m_w[i] = &self.m_w[i] * b1 + &grad_w * (1.0 - b1);
            self.v_w[i] = &self.v_w[i] * b2 + &grad_w.mapv(|g| g * g) * (1.0 - b2);
            let update = ndarray::Zip::from(&self.m_w[i])
                .and(&self.v_w[i])
                .map_collect(|m, v| lr * (m / c1) / ((v / c2).sqrt() + eps));
            net.weights[i] -= &update;

            let grad_b = grad_b + &(&net.biases[i] * wd);
            self.m_b[i] = &self.m_b[i] * b1 + &grad_b * (1.0 - b1);
            self.v_b[i] = &self.v_b[i] * b2 + &grad_b.mapv(|g| g * g) * (1.0 - b2);
            let update = ndarray::Zip::from(&self.m_b[i])
                .and(&self.v_b[i])
                .map_collect(|m, v| lr * (m / c1) / ((v / c2).sqrt() + eps));
            net.biases[i] -= &update;
        }
    }
}

fn row(values: &[f64]) -> Array2<f64> {
    Array2::from_shape_fn((1, values.len()), |(_, j)| values[j])
}

/// Policy network: state to action, every coordinate in `[0, 1]`.
#[derive(Debug, Clone)]
pub struct Actor {
    net: Mlp,
    optimizer: Adam,
}

impl Actor {
    pub fn new<R: Rng + ?Sized>(
        state_dim: usize,
        action_dim: usize,
        hidden: &[usize],
        lr: f64,
        weight_decay: f64,
        rng: &mut R,
    ) -> Self {
        let mut sizes = vec![state_dim];
        sizes.extend_from_slice(hidden);
        sizes.push(action_dim);
        let net = Mlp::new(&sizes, Activation::Tanh, Activation::Sigmoid, rng);
        let optimizer = Adam::new(&net, lr, weight_decay);
        Self { net, optimizer }
    }

    /// Action for a single state.
    pub fn act(&self, state: &[f64]) -> Vec<f64> {
        self.net.forward(&row(state)).iter().copied().collect()
    }

    /// One gradient-ascent step on `mean Q(s, μ(s))`. Returns the policy loss
    /// `−mean Q`.
    pub fn train_step(&mut self, states: &Array2<f64>, critic: &Critic) -> f64 {
        let cache = self.net.forward_cached(states);
        let actions = cache.output();
        let q = critic.q(states, actions);
        let loss = -q.mean().unwrap_or(0.0);

        let n = states.nrows().max(1) as f64;
        let grad = critic.action_gradient(states, actions) * (-1.0 / n);
        let (gradients, _) = self.net.backward(&cache, &grad);
        self.optimizer.step(&mut self.net, gradients);
        loss
    }
}

impl FunctionApproximator for Actor {
    fn forward(&self, input: &Array2<f64>) -> Array2<f64> {
        self.net.forward(input)
    }

    fn parameters(&self) -> Vec<f64> {
        self.net.parameters()
    }

    fn soft_update(&mut self, source: &Self, tau: f64) {
        self.net.soft_update(&source.net, tau);
    }
}

/// Q-function network over the concatenation of state and action.
#[derive(Debug, Clone)]
pub struct Critic {
    net: Mlp,
    optimizer: Adam,
    state_dim: usize,
}

impl Critic {
    pub fn new<R: Rng + ?Sized>(
        state_dim: usize,
        action_dim: usize,
        hidden: &[usize],
        lr: f64,
        weight_decay: f64,
        rng: &mut R,
    ) -> Self {
        let mut sizes = vec![state_dim + action_dim];
        sizes.extend_from_slice(hidden);
        sizes.push(1);
        let net = Mlp::new(&sizes, Activation::Tanh, Activation::Linear, rng);
        let optimizer = Adam::new(&net, lr, weight_decay);
        Self {
            net,
            optimizer,
            state_dim,
        }
    }

    fn join(&self, states: &Array2<f64>, actions: &Array2<f64>) -> Array2<f64> {
        let sd = self.state_dim;
        Array2::from_shape_fn((states.nrows(), sd + actions.ncols()), |(i, j)| {
            if j < sd {
                states[[i, j]]
            } else {
                actions[[i, j - sd]]
            }
        })
    }

    /// Q-values, one per row.
    pub fn q(&self, states: &Array2<f64>, actions: &Array2<f64>) -> Array1<f64> {
        self.net.forward(&self.join(states, actions)).column(0).to_owned()
    }

    pub fn q_single(&self, state: &[f64], action: &[f64]) -> f64 {
        self.q(&row(state), &row(action))[0]
    }

    /// `∂Q/∂a` for every row.
    pub fn action_gradient(&self, states: &Array2<f64>, actions: &Array2<f64>) -> Array2<f64> {
        let cache = self.net.forward_cached(&self.join(states, actions));
        let ones = Array2::ones((states.nrows(), 1));
        let (_, grad_input) = self.net.backward(&cache, &ones);
        grad_input.slice(s![.., self.state_dim..]).to_owned()
    }

    /// One MSE regression step toward `targets`. Returns the loss.
    pub fn train_step(&mut self, states: &Array2<f64>, actions: &Array2<f64>, targets: &Array1<f64>) -> f64 {
        let cache = self.net.forward_cached(&self.join(states, actions));
        let diff = cache.output() - &targets.view().insert_axis(Axis(1));
        let loss = diff.mapv(|d| d * d).mean().unwrap_or(0.0);

        let n = states.nrows().max(1) as f64;
        let grad = diff * (2.0 / n);
        let (gradients, _) = self.net.backward(&cache, &grad);
        self.optimizer.step(&mut self.net, gradients);
        loss
    }
}

impl FunctionApproximator for Critic {
    fn forward(&self, input: &Array2<f64>) -> Array2<f64> {
        self.net.forward(input)
    }

    fn parameters(&self) -> Vec<f64> {
        self.net.parameters()
    }

    fn soft_update(&mut self, source: &Self, tau: f64) {
        self.net.soft_update(&source.net, tau);
    }
}

/// Fixed random leaky-integrator recurrent reservoir:
/// `h' = (1 − λ)·h + λ·tanh(W_in·s + W_rec·h)`.
#[derive(Debug, Clone)]
pub struct Reservoir {
    w_in: Array2<f64>,
    w_rec: Array2<f64>,
    leak: f64,
}

impl Reservoir {
    pub fn new<R: Rng + ?Sized>(state_dim: usize, units: usize, leak: f64, rng: &mut R) -> Self {
        let w_in = Array2::from_shape_fn((units, state_dim), |_| rng.gen_range(-1.0..1.0));
        // recurrent weights scaled for a spectral radius just under one
        let scale = 0.9 / (units.max(1) as f64).sqrt();
        let w_rec = Array2::from_shape_fn((units, units), |_| {
            let z: f64 = rng.sample(StandardNormal);
            z * scale
        });
        Self { w_in, w_rec, leak }
    }

    pub fn units(&self) -> usize {
        self.w_rec.nrows()
    }

    pub fn initial_state(&self) -> Array1<f64> {
        Array1::zeros(self.units())
    }

    pub fn step(&self, hidden: &Array1<f64>, state: &[f64]) -> Array1<f64> {
        let s = Array1::from(state.to_vec());
        let drive = (self.w_in.dot(&s) + self.w_rec.dot(hidden)).mapv(f64::tanh);
        hidden * (1.0 - self.leak) + drive * self.leak
    }
}
