//! Fixed-size, index-addressed agent population
//!
//! A phase hands every agent to its own worker task with [`Population::take`]
//! and puts them back with [`Population::restore`] once the barrier is reached.
//! The length never changes for the lifetime of a population.

use crate::runtime::agent::Agent;
use crate::utils::errors::{EngineError, Result};
use tracing::debug;

pub struct Population<A: Agent> {
    agents: Vec<A>,
    size: usize,
}

impl<A: Agent> Population<A> {
    /// Build `n` agents from shared options
    ///
    /// Fails without creating a partial population when `n` is 0 or any agent
    /// cannot be built.
    pub fn spawn(n: usize, config: &A::Config) -> Result<Self> {
        if n == 0 {
            return Err(EngineError::InvalidPopulationSize(n));
        }

        let agents = (0..n)
            .map(|index| {
                A::create(index, config).map_err(|e| EngineError::AgentCreation {
                    index,
                    reason: format!("{:#}", e),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        debug!("Spawned population of {} agents", n);
        Ok(Self { agents, size: n })
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn agents(&self) -> &[A] {
        &self.agents
    }

    pub fn agents_mut(&mut self) -> &mut [A] {
        &mut self.agents
    }

    pub fn get(&self, index: usize) -> Option<&A> {
        self.agents.get(index)
    }

    /// Move every agent out for task partitioning
    pub(crate) fn take(&mut self) -> Vec<A> {
        std::mem::take(&mut self.agents)
    }

    /// Put agents back after a barrier, enforcing the size invariant
    pub(crate) fn restore(&mut self, agents: Vec<A>) -> Result<()> {
        if agents.len() != self.size {
            return Err(EngineError::PopulationSizeChanged {
                expected: self.size,
                actual: agents.len(),
            });
        }
        self.agents = agents;
        Ok(())
    }
}
