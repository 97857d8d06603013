//! Common utilities: configuration and error types

pub mod config;
pub mod errors;

pub use config::{AgentConfig, EngineConfig, ObservabilityConfig, RuntimeConfig};
pub use errors::{EngineError, Result};
