pub mod errors;
pub mod experiment;
pub mod knob;
pub mod space;

pub use errors::*;
pub use experiment::*;
pub use knob::*;
pub use space::*;
