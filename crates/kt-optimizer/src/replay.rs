//! Prioritized experience replay backed by a sum tree.

use ndarray::{Array1, Array2};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// One `(state, action, reward, next_state)` step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub state: Vec<f64>,
    pub action: Vec<f64>,
    pub reward: f64,
    pub next_state: Vec<f64>,
}

/// Binary tree whose internal nodes hold the sum of their children's
/// priorities. Leaves are written in FIFO order.
#[derive(Debug, Clone)]
struct SumTree {
    capacity: usize,
    nodes: Vec<f64>,
    data: Vec<Option<Transition>>,
    cursor: usize,
    len: usize,
}

impl SumTree {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            nodes: vec![0.0; 2 * capacity - 1],
            data: vec![None; capacity],
            cursor: 0,
            len: 0,
        }
    }

    fn total(&self) -> f64 {
        self.nodes[0]
    }

    fn leaf(&self, slot: usize) -> usize {
        slot + self.capacity - 1
    }

    fn add(&mut self, priority: f64, transition: Transition) {
        let slot = self.cursor;
        self.data[slot] = Some(transition);
        self.update(slot, priority);
        self.cursor = (self.cursor + 1) % self.capacity;
        self.len = (self.len + 1).min(self.capacity);
    }

    fn update(&mut self, slot: usize, priority: f64) {
        let mut node = self.leaf(slot);
        let change = priority - self.nodes[node];
        self.nodes[node] = priority;
        while node > 0 {
            node = (node - 1) / 2;
            self.nodes[node] += change;
        }
    }

    /// Slot whose cumulative priority range contains `value`.
    fn find(&self, mut value: f64) -> usize {
        let mut node = 0;
        loop {
            let left = 2 * node + 1;
            if left >= self.nodes.len() {
                break;
            }
            if value <= self.nodes[left] || self.nodes[left + 1] <= 0.0 {
                node = left;
            } else {
                value -= self.nodes[left];
                node = left + 1;
            }
        }
        node + 1 - self.capacity
    }
}

/// A sampled minibatch and the slots it came from.
#[derive(Debug, Clone)]
pub struct ReplayBatch {
    pub transitions: Vec<Transition>,
    pub indices: Vec<usize>,
}

impl ReplayBatch {
    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }

    pub fn states(&self) -> Array2<f64> {
        stack(self.transitions.iter().map(|t| t.state.as_slice()))
    }

    pub fn actions(&self) -> Array2<f64> {
        stack(self.transitions.iter().map(|t| t.action.as_slice()))
    }

    pub fn next_states(&self) -> Array2<f64> {
        stack(self.transitions.iter().map(|t| t.next_state.as_slice()))
    }

    pub fn rewards(&self) -> Array1<f64> {
        self.transitions.iter().map(|t| t.reward).collect()
    }
}

fn stack<'a>(rows: impl Iterator<Item = &'a [f64]>) -> Array2<f64> {
    let rows: Vec<&[f64]> = rows.collect();
    let width = rows.first().map_or(0, |r| r.len());
    Array2::from_shape_fn((rows.len(), width), |(i, j)| rows[i].get(j).copied().unwrap_or(0.0))
}

/// Replay memory sampling transitions in proportion to `(|error| + ε)^α`.
/// When full, inserting evicts the oldest entry regardless of priority.
#[derive(Debug, Clone)]
pub struct PrioritizedReplayMemory {
    tree: SumTree,
    alpha: f64,
    epsilon: f64,
}

impl PrioritizedReplayMemory {
    pub fn new(capacity: usize) -> Self {
        Self {
            tree: SumTree::new(capacity.max(1)),
            alpha: 0.6,
            epsilon: 0.01,
        }
    }

    pub fn len(&self) -> usize {
        self.tree.len
    }

    pub fn is_empty(&self) -> bool {
        self.tree.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.tree.capacity
    }

    pub fn priority(&self, error: f64) -> f64 {
        let error = if error.is_finite() { error.abs() } else { 0.0 };
        (error + self.epsilon).powf(self.alpha)
    }

    pub fn add(&mut self, error: f64, transition: Transition) {
        let priority = self.priority(error);
        self.tree.add(priority, transition);
    }

    /// Stratified draw: the total priority mass is split into `batch_size`
    /// equal segments and one transition is drawn from each.
    pub fn sample<R: Rng + ?Sized>(&self, batch_size: usize, rng: &mut R) -> ReplayBatch {
        let mut batch = ReplayBatch {
            transitions: Vec::with_capacity(batch_size),
            indices: Vec::with_capacity(batch_size),
        };
        if self.is_empty() || batch_size == 0 {
            return batch;
        }

        let segment = self.tree.total() / batch_size as f64;
        for i in 0..batch_size {
            let (low, high) = (segment * i as f64, segment * (i + 1) as f64);
            let value = if high > low { rng.gen_range(low..high) } else { low };
            let mut slot = self.tree.find(value);
            // rounding can land on an unwritten leaf
            if slot >= self.tree.len {
                slot = self.tree.len - 1;
            }
            if let Some(transition) = &self.tree.data[slot] {
                batch.transitions.push(transition.clone());
                batch.indices.push(slot);
            }
        }
        batch
    }

    pub fn update(&mut self, index: usize, error: f64) {
        if index < self.tree.len {
            let priority = self.priority(error);
            self.tree.update(index, priority);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Transition> {
        self.tree.data.iter().flatten()
    }
}
