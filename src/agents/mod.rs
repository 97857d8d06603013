//! Agent implementations shipped with the engine

pub mod reference;

pub use reference::{GenomeAgent, GenomeState};
