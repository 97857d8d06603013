//! Engine error types
//!
//! Usage errors (bad `start` calls) and invariant violations surface here.
//! Failures inside a single agent's task are not errors at this level: they
//! are recorded as [`TaskFailure`](crate::runtime::dispatcher::TaskFailure)
//! values and the generation carries on.

use crate::scheduler::generation::SchedulerState;
use thiserror::Error;

/// Result alias used across the engine
pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Scheduler is already active (state: {0:?})")]
    AlreadyRunning(SchedulerState),

    #[error("Population size must be greater than 0, got {0}")]
    InvalidPopulationSize(usize),

    #[error("Failed to create agent #{index}: {reason}")]
    AgentCreation { index: usize, reason: String },

    #[error("Worker task for agent #{index} was lost before reaching the barrier")]
    TaskLost { index: usize },

    #[error("Population size changed from {expected} to {actual}")]
    PopulationSizeChanged { expected: usize, actual: usize },

    #[error("Worker pool error: {0}")]
    WorkerPoolFailed(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Observability error: {0}")]
    ObservabilityError(String),

    #[error("Runtime error: {0}")]
    RuntimeError(String),
}

impl From<config::ConfigError> for EngineError {
    fn from(e: config::ConfigError) -> Self {
        EngineError::ConfigError(e.to_string())
    }
}
