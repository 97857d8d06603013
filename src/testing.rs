//! Scripted agents for exercising the scheduler
//!
//! `ScriptedAgent` follows a fixed plan instead of making decisions: it moves
//! for a configured number of ticks per life, reports a fixed fitness, and can
//! be told to fail or panic at a given index. Shared counters in
//! [`ScriptedCounters`] let tests observe what the engine did.

use crate::runtime::agent::Agent;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Counters shared by every clone of a scripted population
#[derive(Debug, Default)]
pub struct ScriptedCounters {
    pub acts: AtomicU64,
    pub major_acts: AtomicU64,
    pub crossovers: AtomicU64,
    pub reinitializations: AtomicU64,

    /// Donor fitness values read during crossover, as `(child, parent_a, parent_b)`
    pub donor_reads: Mutex<Vec<(usize, f64, f64)>>,
}

impl ScriptedCounters {
    pub fn acts(&self) -> u64 {
        self.acts.load(Ordering::SeqCst)
    }

    pub fn major_acts(&self) -> u64 {
        self.major_acts.load(Ordering::SeqCst)
    }

    pub fn crossovers(&self) -> u64 {
        self.crossovers.load(Ordering::SeqCst)
    }

    pub fn reinitializations(&self) -> u64 {
        self.reinitializations.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct ScriptedConfig {
    /// Ticks each life reports `moved = true` for
    pub moves_per_life: u64,

    /// Index of an agent that never stops moving
    pub tireless_index: Option<usize>,

    /// Fitness per index, missing entries default to `index + 1`
    pub fitness: Vec<f64>,

    pub fail_create_at: Option<usize>,
    pub fail_act_at: Option<usize>,
    pub panic_act_at: Option<usize>,
    pub fail_crossover_at: Option<usize>,
    pub panic_crossover_at: Option<usize>,
    pub panic_snapshot_at: Option<usize>,
    pub panic_fitness_at: Option<usize>,
    pub panic_reinitialize_at: Option<usize>,

    /// Sleep inside every `act`
    pub act_delay: Option<Duration>,

    pub counters: Arc<ScriptedCounters>,
}

impl Default for ScriptedConfig {
    fn default() -> Self {
        Self {
            moves_per_life: 0,
            tireless_index: None,
            fitness: Vec::new(),
            fail_create_at: None,
            fail_act_at: None,
            panic_act_at: None,
            fail_crossover_at: None,
            panic_crossover_at: None,
            panic_snapshot_at: None,
            panic_fitness_at: None,
            panic_reinitialize_at: None,
            act_delay: None,
            counters: Arc::new(ScriptedCounters::default()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptedState {
    pub acts: u64,
    pub last_major: bool,
    pub lives: u64,
    pub parents: Option<(usize, usize)>,
}

#[derive(Debug, Clone)]
pub struct ScriptedAgent {
    pub index: usize,
    pub fitness: f64,
    pub moves_left: u64,
    pub acts: u64,
    pub last_major: bool,
    pub lives: u64,
    pub parents: Option<(usize, usize)>,
    config: ScriptedConfig,
}

impl Agent for ScriptedAgent {
    type Config = ScriptedConfig;
    type State = ScriptedState;

    fn create(index: usize, config: &Self::Config) -> anyhow::Result<Self> {
        if config.fail_create_at == Some(index) {
            anyhow::bail!("scripted creation failure");
        }
        Ok(Self {
            index,
            fitness: config
                .fitness
                .get(index)
                .copied()
                .unwrap_or((index + 1) as f64),
            moves_left: config.moves_per_life,
            acts: 0,
            last_major: false,
            lives: 1,
            parents: None,
            config: config.clone(),
        })
    }

    fn act(&mut self, is_major_tick: bool) -> anyhow::Result<bool> {
        if let Some(delay) = self.config.act_delay {
            std::thread::sleep(delay);
        }

        self.acts += 1;
        self.last_major = is_major_tick;
        self.config.counters.acts.fetch_add(1, Ordering::SeqCst);
        if is_major_tick {
            self.config.counters.major_acts.fetch_add(1, Ordering::SeqCst);
        }

        if self.config.panic_act_at == Some(self.index) {
            panic!("scripted act panic");
        }
        if self.config.fail_act_at == Some(self.index) {
            anyhow::bail!("scripted act failure");
        }

        if self.config.tireless_index == Some(self.index) {
            return Ok(true);
        }
        if self.moves_left > 0 {
            self.moves_left -= 1;
            return Ok(true);
        }
        Ok(false)
    }

    fn snapshot(&self) -> Self::State {
        if self.config.panic_snapshot_at == Some(self.index) {
            panic!("scripted snapshot panic");
        }
        ScriptedState {
            acts: self.acts,
            last_major: self.last_major,
            lives: self.lives,
            parents: self.parents,
        }
    }

    fn fitness(&self) -> f64 {
        if self.config.panic_fitness_at == Some(self.index) {
            panic!("scripted fitness panic");
        }
        self.fitness
    }

    fn crossover(&mut self, parent_a: &Self, parent_b: &Self) -> anyhow::Result<()> {
        if self.config.panic_crossover_at == Some(self.index) {
            panic!("scripted crossover panic");
        }
        if self.config.fail_crossover_at == Some(self.index) {
            anyhow::bail!("scripted crossover failure");
        }

        self.config
            .counters
            .donor_reads
            .lock()
            .push((self.index, parent_a.fitness, parent_b.fitness));
        self.config.counters.crossovers.fetch_add(1, Ordering::SeqCst);

        self.parents = Some((parent_a.index, parent_b.index));
        // Visibly different from any donor value
        self.fitness = parent_a.fitness + parent_b.fitness + 1000.0;
        Ok(())
    }

    fn reinitialize(&mut self) {
        if self.config.panic_reinitialize_at == Some(self.index) {
            panic!("scripted reinitialize panic");
        }
        self.moves_left = self.config.moves_per_life;
        self.lives += 1;
        self.config
            .counters
            .reinitializations
            .fetch_add(1, Ordering::SeqCst);
    }
}
