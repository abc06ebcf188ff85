//! The adapter contract and the fixed-order adapter chain.

use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::info;

use kt_types::{AdapterError, Configuration, KnobSpace};

use crate::bias::BiasedSampler;
use crate::embedding::LinearEmbedding;
use crate::quantize::Quantizer;

/// A reversible transform from an input knob space to a target space.
///
/// The target space is computed once at construction. `unproject` is called
/// on every trial and must be deterministic and infallible: anything that
/// falls outside the input domain is clamped.
pub trait SpaceAdapter: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &str;

    fn input_space(&self) -> &KnobSpace;

    fn target_space(&self) -> &KnobSpace;

    /// Map a configuration of the target space back to the input space.
    fn unproject(&self, target: &Configuration) -> Configuration;

    /// Random point of the target space.
    fn sample_target(&self, rng: &mut dyn RngCore) -> Configuration {
        self.target_space().sample_random(rng)
    }
}

/// Projection family used by [`LinearEmbedding`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectionKind {
    /// Hashing-enhanced subspace embedding: each input axis copies one target
    /// axis with a random sign.
    Hesbo,
    /// Dense Gaussian random embedding.
    Rembo,
}

impl Default for ProjectionKind {
    fn default() -> Self {
        Self::Hesbo
    }
}

/// Which adapters to stack. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    pub target_dim: Option<usize>,
    pub quantization_factor: Option<u64>,
    pub bias_prob: Option<f64>,
    pub projection: ProjectionKind,
}

impl AdapterConfig {
    pub fn with_target_dim(mut self, target_dim: usize) -> Self {
        self.target_dim = Some(target_dim);
        self
    }

    pub fn with_quantization_factor(mut self, factor: u64) -> Self {
        self.quantization_factor = Some(factor);
        self
    }

    pub fn with_bias_prob(mut self, prob: f64) -> Self {
        self.bias_prob = Some(prob);
        self
    }

    pub fn with_projection(mut self, projection: ProjectionKind) -> Self {
        self.projection = projection;
        self
    }

    pub fn is_identity(&self) -> bool {
        self.target_dim.is_none() && self.quantization_factor.is_none() && self.bias_prob.is_none()
    }
}

/// Adapters applied in order, input side first. Each stage's target space is
/// the next stage's input space.
#[derive(Debug)]
pub struct AdapterChain {
    original: KnobSpace,
    stages: Vec<Box<dyn SpaceAdapter>>,
}

impl AdapterChain {
    /// Chain with no stages: the search space is the original space.
    pub fn identity(space: KnobSpace) -> Self {
        Self {
            original: space,
            stages: Vec::new(),
        }
    }

    /// Build the chain described by `config`. Stage order is fixed:
    /// biased sampling, quantization, linear embedding.
    pub fn build(space: KnobSpace, config: &AdapterConfig, seed: u64) -> Result<Self, AdapterError> {
        let mut stages: Vec<Box<dyn SpaceAdapter>> = Vec::new();
        let mut current = space.clone();

        if let Some(prob) = config.bias_prob {
            let adapter = BiasedSampler::new(current, prob)?;
            current = adapter.target_space().clone();
            stages.push(Box::new(adapter));
        }

        if let Some(factor) = config.quantization_factor {
            let adapter = Quantizer::new(current, factor)?;
            current = adapter.target_space().clone();
            stages.push(Box::new(adapter));
        }

        if let Some(target_dim) = config.target_dim {
            let adapter = LinearEmbedding::new(current, target_dim, config.projection, seed)?;
            stages.push(Box::new(adapter));
        }

        let chain = Self {
            original: space,
            stages,
        };
        info!(
            stages = ?chain.stage_names(),
            input_dim = chain.original.len(),
            search_dim = chain.search_space().len(),
            "Built adapter chain"
        );
        Ok(chain)
    }

    pub fn original_space(&self) -> &KnobSpace {
        &self.original
    }

    /// The space search strategies operate in.
    pub fn search_space(&self) -> &KnobSpace {
        self.stages
            .last()
            .map_or(&self.original, |stage| stage.target_space())
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub fn is_identity(&self) -> bool {
        self.stages.is_empty()
    }

    /// Map a search-space configuration back to the original space.
    pub fn unproject(&self, search: &Configuration) -> Configuration {
        let mut config = search.clone();
        for stage in self.stages.iter().rev() {
            config = stage.unproject(&config);
        }
        config
    }

    /// Decode a unit-cube point of the search space and unproject it.
    pub fn decode(&self, point: &[f64]) -> (Configuration, Configuration) {
        let search = self.search_space().decode(point);
        let original = self.unproject(&search);
        (search, original)
    }

    /// Random point of the search space.
    pub fn sample(&self, rng: &mut dyn RngCore) -> Configuration {
        match self.stages.last() {
            Some(stage) => stage.sample_target(rng),
            None => self.original.sample_random(rng),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kt_types::{KnobSpec, KnobValue};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn pg_space() -> KnobSpace {
        KnobSpace::from_specs(vec![
            KnobSpec::integer("shared_buffers", 128, 1_048_576, 16_384),
            KnobSpec::integer("bgwriter_lru_maxpages", -1, 1_000, 100).with_special(KnobValue::Int(-1)),
            KnobSpec::real("random_page_cost", 0.0, 10.0, 4.0),
            KnobSpec::real("seq_page_cost", 0.0, 10.0, 1.0),
            KnobSpec::categorical("wal_compression", vec!["on", "off"], "off"),
            KnobSpec::integer("effective_io_concurrency", 0, 1_000, 1)
                .with_special(KnobValue::Int(0)),
        ])
        .unwrap()
    }

    #[test]
    fn identity_chain_is_passthrough() {
        let chain = AdapterChain::build(pg_space(), &AdapterConfig::default(), 1).unwrap();
        assert!(chain.is_identity());
        let default = pg_space().sample_default();
        assert_eq!(chain.unproject(&default), default);
    }

    #[test]
    fn stages_follow_fixed_order() {
        let config = AdapterConfig::default()
            .with_target_dim(3)
            .with_quantization_factor(10)
            .with_bias_prob(0.2);
        let chain = AdapterChain::build(pg_space(), &config, 42).unwrap();
        assert_eq!(chain.stage_names(), vec!["biased-sampler", "quantizer", "linear-embedding"]);
        assert_eq!(chain.search_space().len(), 3);
    }

    #[test]
    fn every_chain_decodes_into_original_bounds() {
        let configs = vec![
            AdapterConfig::default().with_bias_prob(0.3),
            AdapterConfig::default().with_quantization_factor(4),
            AdapterConfig::default().with_target_dim(2),
            AdapterConfig::default()
                .with_target_dim(4)
                .with_projection(ProjectionKind::Rembo),
            AdapterConfig::default()
                .with_target_dim(2)
                .with_quantization_factor(16)
                .with_bias_prob(0.25),
        ];
        let space = pg_space();
        let mut rng = ChaCha8Rng::seed_from_u64(3);

        for config in configs {
            let chain = AdapterChain::build(space.clone(), &config, 9).unwrap();
            for _ in 0..300 {
                let search = chain.sample(&mut rng);
                chain.search_space().validate(&search).unwrap();
                space.validate(&chain.unproject(&search)).unwrap();
            }
            for corner in [0.0, 1.0, -5.0, 5.0, f64::NAN] {
                let point = vec![corner; chain.search_space().len()];
                let (_, original) = chain.decode(&point);
                space.validate(&original).unwrap();
            }
        }
    }

    #[test]
    fn invalid_configuration_is_rejected() {
        let bad_bias = AdapterConfig::default().with_bias_prob(1.5);
        assert!(AdapterChain::build(pg_space(), &bad_bias, 0).is_err());

        let bad_dim = AdapterConfig::default().with_target_dim(6);
        assert!(matches!(
            AdapterChain::build(pg_space(), &bad_dim, 0),
            Err(AdapterError::TargetDimTooLarge { .. })
        ));
    }
}
