//! Tick events and the per-event result record
//!
//! Every generation issues the same ordered sequence: eight Minor ticks
//! followed by one Major tick. The Major tick is the commit boundary handed to
//! `Agent::act`, and the only point where stall detection happens.

use crate::runtime::agent::AgentState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Minor ticks issued before the Major tick of a generation
pub const MINOR_TICKS_PER_GENERATION: usize = 8;

/// Total events per generation
pub const EVENTS_PER_GENERATION: usize = MINOR_TICKS_PER_GENERATION + 1;

/// Event kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Minor,
    Major,
}

impl EventKind {
    pub fn is_major(&self) -> bool {
        matches!(self, EventKind::Major)
    }

    /// The fixed event order of one generation
    pub fn generation_sequence() -> [EventKind; EVENTS_PER_GENERATION] {
        let mut sequence = [EventKind::Minor; EVENTS_PER_GENERATION];
        sequence[EVENTS_PER_GENERATION - 1] = EventKind::Major;
        sequence
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Minor => "minor",
            EventKind::Major => "major",
        }
    }
}

/// Identifier of one `start` → Idle run
pub type RunId = Ulid;

/// Snapshot of the population after one event, handed to the consumer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResult<S> {
    pub run_id: RunId,

    /// Generations completed before this one in the current run
    pub generation_index: u64,

    /// Position within the generation (0..=8)
    pub event_index: usize,

    pub event: EventKind,

    /// Whether any agent moved on this event
    pub any_moved: bool,

    /// One record per agent, in index order
    pub agent_states: Vec<AgentState<S>>,

    pub produced_at: DateTime<Utc>,
}

impl<S> GenerationResult<S> {
    /// Whether this is the last event of its generation
    pub fn closes_generation(&self) -> bool {
        self.event_index + 1 == EVENTS_PER_GENERATION
    }
}
