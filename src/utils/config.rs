//! Engine configuration
//!
//! Layered loading, later layers override earlier ones:
//!
//! 1. Built-in defaults
//! 2. `config/default.toml` (optional)
//! 3. File named by `EVOLAB_CONFIG` (optional)
//! 4. Environment variables, e.g. `EVOLAB__RUNTIME__POPULATION_SIZE=128`

use crate::utils::errors::{EngineError, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Environment variable naming an extra config file
pub const CONFIG_PATH_ENV: &str = "EVOLAB_CONFIG";

/// Top-level engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub runtime: RuntimeConfig,
    pub agent: AgentConfig,
    pub observability: ObservabilityConfig,
}

/// Scheduler and worker pool settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Number of agents in the population
    pub population_size: usize,

    /// Worker threads for agent tasks (default: available parallelism - 1)
    pub worker_threads: Option<usize>,

    /// Results buffered between the coordinator and the consumer
    pub handoff_capacity: usize,

    /// Best-effort delay after each event, unset means no throttle
    pub tick_interval_ms: Option<u64>,

    /// Stop after this many generations (binary only)
    pub max_generations: Option<u64>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            population_size: 64,
            worker_threads: None,
            handoff_capacity: 1,
            tick_interval_ms: None,
            max_generations: None,
        }
    }
}

impl RuntimeConfig {
    /// Resolved worker count, reserving one unit of parallelism for the coordinator
    pub fn resolved_worker_threads(&self) -> usize {
        self.worker_threads.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get().saturating_sub(1))
                .unwrap_or(1)
                .max(1)
        })
    }

    pub fn tick_interval(&self) -> Option<Duration> {
        self.tick_interval_ms.map(Duration::from_millis)
    }
}

/// Options for the reference genome agent
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Number of weights in each genome
    pub genome_len: usize,

    /// Major ticks an agent survives per life
    pub energy: u32,

    /// Probability that a weight is perturbed after crossover
    pub mutation_rate: f64,

    /// Standard deviation of the perturbation
    pub mutation_strength: f64,

    /// Chance per Major tick that a life ends before its energy runs out
    pub collapse_chance: f64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            genome_len: 32,
            energy: 20,
            mutation_rate: 0.01,
            mutation_strength: 0.1,
            collapse_chance: 0.02,
        }
    }
}

/// Logging and metrics settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Default log filter, `RUST_LOG` takes precedence
    pub log_level: String,

    /// Emit JSON log lines instead of human-readable ones
    pub json_logs: bool,

    /// Prometheus listen address, metrics disabled when unset
    pub metrics_addr: Option<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_addr: None,
        }
    }
}

impl EngineConfig {
    /// Load configuration from the default layers
    pub fn load() -> Result<Self> {
        let extra = std::env::var(CONFIG_PATH_ENV).ok();
        Self::load_from(extra.as_deref().map(Path::new))
    }

    /// Load configuration with an explicit extra file layer
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder()
            .add_source(File::with_name("config/default").required(false));

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }

        let settings = builder
            .add_source(
                Environment::with_prefix("EVOLAB")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: EngineConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.runtime.population_size == 0 {
            return Err(EngineError::ConfigError(
                "runtime.population_size must be greater than 0".to_string(),
            ));
        }

        if self.runtime.worker_threads == Some(0) {
            return Err(EngineError::ConfigError(
                "runtime.worker_threads cannot be 0".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.agent.mutation_rate) {
            return Err(EngineError::ConfigError(format!(
                "agent.mutation_rate must be within [0, 1], got {}",
                self.agent.mutation_rate
            )));
        }

        if self.agent.mutation_strength < 0.0 {
            return Err(EngineError::ConfigError(format!(
                "agent.mutation_strength cannot be negative, got {}",
                self.agent.mutation_strength
            )));
        }

        if !(0.0..=1.0).contains(&self.agent.collapse_chance) {
            return Err(EngineError::ConfigError(format!(
                "agent.collapse_chance must be within [0, 1], got {}",
                self.agent.collapse_chance
            )));
        }

        if self.agent.genome_len == 0 {
            return Err(EngineError::ConfigError(
                "agent.genome_len must be greater than 0".to_string(),
            ));
        }

        if self.agent.energy == 0 {
            return Err(EngineError::ConfigError(
                "agent.energy must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}
