//! Agent capability consumed by the engine
//!
//! The engine never looks inside an agent. It drives five operations:
//! - `act` once per tick
//! - `snapshot` after every `act`
//! - `fitness` when a reproduction round begins
//! - `crossover` from two donor agents
//! - `reinitialize` once every agent has been crossed over
//!
//! Calls on distinct agents may run concurrently on the worker pool. Calls on
//! the same agent are never concurrent: each agent is owned by exactly one task
//! per phase.

use serde::{Deserialize, Serialize};

/// An autonomous agent advanced by the generation scheduler
pub trait Agent: Clone + Send + Sync + Sized + 'static {
    /// Per-agent options passed to `start`
    type Config: Clone + Send + Sync + 'static;

    /// Opaque payload returned by `snapshot`
    type State: Serialize + Clone + Send + 'static;

    /// Build the agent at `index` of a new population
    fn create(index: usize, config: &Self::Config) -> anyhow::Result<Self>;

    /// Advance one tick. Returns whether the agent changed state.
    ///
    /// `is_major_tick` marks the last event of a generation, the commit boundary.
    fn act(&mut self, is_major_tick: bool) -> anyhow::Result<bool>;

    /// Point-in-time view of the agent for the presentation layer
    fn snapshot(&self) -> Self::State;

    /// Scalar performance measure used for parent selection
    fn fitness(&self) -> f64;

    /// Overwrite this agent's weights from two donors
    fn crossover(&mut self, parent_a: &Self, parent_b: &Self) -> anyhow::Result<()>;

    /// Start a fresh life with the current weights
    fn reinitialize(&mut self);
}

/// Per-agent record emitted with every [`GenerationResult`](crate::scheduler::GenerationResult)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentState<S> {
    /// Population index (stable for the generation)
    pub index: usize,

    /// Fitness after the event
    pub fitness: f64,

    /// Whether `act` reported a state change
    pub moved: bool,

    /// Whether the agent's task failed during this event
    pub failed: bool,

    /// Agent-defined snapshot, `None` when `snapshot` itself failed
    pub payload: Option<S>,
}

impl<S> AgentState<S> {
    /// Capture the record for an agent after its task has run
    pub fn capture<A>(index: usize, agent: &A, moved: bool, failed: bool) -> Self
    where
        A: Agent<State = S>,
    {
        Self {
            index,
            fitness: agent.fitness(),
            moved,
            failed,
            payload: Some(agent.snapshot()),
        }
    }

    /// Placeholder for an agent whose snapshot could not be taken
    pub fn unavailable(index: usize) -> Self {
        Self {
            index,
            fitness: 0.0,
            moved: false,
            failed: true,
            payload: None,
        }
    }
}
