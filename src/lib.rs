//! Evolab Engine Library
//!
//! This library runs populations of agents through repeated generations of
//! simulated play and evolves them by fitness-proportionate crossover.
//!
//! # Architecture
//!
//! The engine is structured into several key modules:
//!
//! - **runtime**: Agent trait, population ownership, worker pool, event dispatch
//! - **evolution**: Fitness snapshots, roulette selection, reproduction
//! - **scheduler**: Generation loop, result handoff, cooperative stop
//! - **agents**: Reference genome agent used by the binary
//! - **observability**: Tracing and Prometheus metrics
//! - **utils**: Configuration and error types
//! - **testing**: Scripted agents for tests (`test-support` feature)

pub mod agents;
pub mod evolution;
pub mod observability;
pub mod runtime;
pub mod scheduler;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod utils;

// Re-export commonly used types
pub use runtime::agent::{Agent, AgentState};
pub use runtime::population::Population;
pub use scheduler::events::{EventKind, GenerationResult, RunId};
pub use scheduler::generation::{GenerationScheduler, SchedulerState, StopHandle};
pub use utils::config::EngineConfig;
pub use utils::errors::{EngineError, Result};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const GIT_HASH: &str = env!("GIT_HASH");

/// Engine build information
pub struct BuildInfo {
    pub version: &'static str,
    pub git_hash: &'static str,
    pub build_timestamp: &'static str,
    pub rustc_version: &'static str,
}

impl BuildInfo {
    pub fn current() -> Self {
        Self {
            version: VERSION,
            git_hash: GIT_HASH,
            build_timestamp: env!("BUILD_TIMESTAMP"),
            rustc_version: env!("RUSTC_VERSION"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_build_info() {
        let info = BuildInfo::current();
        assert!(!info.version.is_empty());
        assert!(!info.git_hash.is_empty());
        assert!(!info.rustc_version.is_empty());
    }
}
