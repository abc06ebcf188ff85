//! # kt-space
//!
//! Space adapters that reshape a knob space before it reaches a search
//! strategy, and map proposed points back to configurations of the original
//! space.
//!
//! Adapters compose in a fixed order (special-value biasing, then
//! quantization, then a low-dimensional linear embedding) through
//! [`AdapterChain`].

mod adapter;
mod bias;
mod embedding;
mod quantize;

pub use adapter::{AdapterChain, AdapterConfig, ProjectionKind, SpaceAdapter};
pub use bias::BiasedSampler;
pub use embedding::LinearEmbedding;
pub use quantize::Quantizer;
