//! Event fan-out across the worker pool
//!
//! One task per agent runs `act` followed by `snapshot`. The dispatcher waits
//! for every task (hard barrier) before reporting whether any agent moved.
//! A failing or panicking `act` or `snapshot` is isolated to its own agent:
//! it is logged, counted as `moved = false`, and the barrier still completes.

use crate::observability::metrics as engine_metrics;
use crate::runtime::agent::{Agent, AgentState};
use crate::runtime::population::Population;
use crate::runtime::worker_pool::WorkerPool;
use crate::scheduler::events::EventKind;
use crate::utils::errors::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, trace};

/// Phase in which an agent task ran
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPhase {
    Act,
    Snapshot,
    Fitness,
    Crossover,
    Reinitialize,
}

impl TaskPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskPhase::Act => "act",
            TaskPhase::Snapshot => "snapshot",
            TaskPhase::Fitness => "fitness",
            TaskPhase::Crossover => "crossover",
            TaskPhase::Reinitialize => "reinitialize",
        }
    }
}

impl fmt::Display for TaskPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recovered failure inside one agent's task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskFailure {
    pub index: usize,
    pub phase: TaskPhase,
    pub reason: String,
}

impl TaskFailure {
    pub(crate) fn from_error(index: usize, phase: TaskPhase, error: &anyhow::Error) -> Self {
        Self {
            index,
            phase,
            reason: format!("{:#}", error),
        }
    }

    /// Turn a caught panic payload into a failure record
    pub(crate) fn from_panic(
        index: usize,
        phase: TaskPhase,
        payload: Box<dyn std::any::Any + Send>,
    ) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());

        Self {
            index,
            phase,
            reason: format!("panicked: {}", message),
        }
    }

    /// Log the failure with its full context and count it
    pub(crate) fn report(&self) {
        error!(
            index = self.index,
            phase = %self.phase,
            reason = %self.reason,
            "Agent task failed, continuing without it"
        );
        engine_metrics::record_task_failure(self.phase);
    }
}

/// Aggregated outcome of one event
#[derive(Debug, Clone)]
pub struct DispatchOutcome<S> {
    /// One record per agent, in index order
    pub states: Vec<AgentState<S>>,

    /// Logical OR of every agent's `moved`
    pub any_moved: bool,

    pub failures: Vec<TaskFailure>,
}

impl<S> DispatchOutcome<S> {
    /// Population-wide stall: nobody moved on this event
    pub fn all_game_over(&self) -> bool {
        !self.any_moved
    }
}

/// Fans events out to every agent and barrier-joins the results
pub struct EventDispatcher {
    pool: Arc<WorkerPool>,
}

impl EventDispatcher {
    pub fn new(pool: Arc<WorkerPool>) -> Self {
        Self { pool }
    }

    /// Deliver `event` to every agent and wait for all of them
    ///
    /// Only fails when a task is lost outright (the population cannot be put
    /// back together), which is fatal for the run.
    pub fn dispatch<A: Agent>(
        &self,
        event: EventKind,
        population: &mut Population<A>,
    ) -> Result<DispatchOutcome<A::State>> {
        let is_major = event.is_major();
        let started = Instant::now();
        let agents = population.take();
        trace!("Dispatching {:?} to {} agents", event, agents.len());

        let results = self.pool.run_batch(agents, move |index, mut agent: A| {
            let mut failures = Vec::new();

            let outcome = panic::catch_unwind(AssertUnwindSafe(|| agent.act(is_major)));
            let moved = match outcome {
                Ok(Ok(moved)) => moved,
                Ok(Err(e)) => {
                    failures.push(TaskFailure::from_error(index, TaskPhase::Act, &e));
                    false
                }
                Err(payload) => {
                    failures.push(TaskFailure::from_panic(index, TaskPhase::Act, payload));
                    false
                }
            };

            let failed = !failures.is_empty();
            let captured = panic::catch_unwind(AssertUnwindSafe(|| {
                AgentState::capture(index, &agent, moved, failed)
            }));
            let state = match captured {
                Ok(state) => state,
                Err(payload) => {
                    failures.push(TaskFailure::from_panic(index, TaskPhase::Snapshot, payload));
                    AgentState::unavailable(index)
                }
            };

            (agent, state, failures)
        });

        let results = match results {
            Ok(results) => results,
            Err(e) => {
                error!("Event barrier lost an agent task: {}", e);
                return Err(e);
            }
        };

        let mut agents = Vec::with_capacity(results.len());
        let mut states = Vec::with_capacity(results.len());
        let mut failures = Vec::new();
        let mut any_moved = false;

        for (agent, state, agent_failures) in results {
            any_moved |= state.moved;
            agents.push(agent);
            states.push(state);
            for failure in agent_failures {
                failure.report();
                failures.push(failure);
            }
        }

        population.restore(agents)?;
        engine_metrics::record_event(event, started.elapsed());

        Ok(DispatchOutcome {
            states,
            any_moved,
            failures,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedAgent, ScriptedConfig};

    fn dispatcher() -> EventDispatcher {
        EventDispatcher::new(Arc::new(WorkerPool::new(3).unwrap()))
    }

    #[test]
    fn test_every_agent_acts_once() {
        let config = ScriptedConfig {
            moves_per_life: 100,
            ..Default::default()
        };
        let counters = Arc::clone(&config.counters);
        let mut population = Population::<ScriptedAgent>::spawn(10, &config).unwrap();

        let outcome = dispatcher()
            .dispatch(EventKind::Minor, &mut population)
            .unwrap();

        assert_eq!(counters.acts(), 10);
        assert_eq!(counters.major_acts(), 0);
        assert_eq!(outcome.states.len(), 10);
        assert!(outcome.any_moved);
        assert!(!outcome.all_game_over());
        for (i, state) in outcome.states.iter().enumerate() {
            assert_eq!(state.index, i);
            assert_eq!(state.payload.as_ref().unwrap().acts, 1);
            assert!(!state.payload.as_ref().unwrap().last_major);
        }
    }

    #[test]
    fn test_major_flag_reaches_agents() {
        let config = ScriptedConfig::default();
        let counters = Arc::clone(&config.counters);
        let mut population = Population::<ScriptedAgent>::spawn(4, &config).unwrap();

        let outcome = dispatcher()
            .dispatch(EventKind::Major, &mut population)
            .unwrap();

        assert_eq!(counters.major_acts(), 4);
        assert!(outcome.states.iter().all(|s| s.payload.as_ref().unwrap().last_major));
    }

    #[test]
    fn test_stall_detection() {
        let config = ScriptedConfig::default();
        let mut population = Population::<ScriptedAgent>::spawn(6, &config).unwrap();

        let outcome = dispatcher()
            .dispatch(EventKind::Major, &mut population)
            .unwrap();

        assert!(!outcome.any_moved);
        assert!(outcome.all_game_over());
    }

    #[test]
    fn test_single_mover_prevents_stall() {
        let config = ScriptedConfig {
            tireless_index: Some(5),
            ..Default::default()
        };
        let mut population = Population::<ScriptedAgent>::spawn(6, &config).unwrap();

        let outcome = dispatcher()
            .dispatch(EventKind::Major, &mut population)
            .unwrap();

        assert!(outcome.any_moved);
        assert_eq!(outcome.states.iter().filter(|s| s.moved).count(), 1);
    }

    #[test]
    fn test_failed_act_is_isolated() {
        let config = ScriptedConfig {
            moves_per_life: 10,
            fail_act_at: Some(1),
            panic_act_at: Some(3),
            ..Default::default()
        };
        let mut population = Population::<ScriptedAgent>::spawn(5, &config).unwrap();

        let outcome = dispatcher()
            .dispatch(EventKind::Minor, &mut population)
            .unwrap();

        assert_eq!(population.len(), 5);
        assert_eq!(outcome.states.len(), 5);
        assert_eq!(outcome.failures.len(), 2);

        let failed: Vec<usize> = outcome.failures.iter().map(|f| f.index).collect();
        assert!(failed.contains(&1));
        assert!(failed.contains(&3));
        assert!(outcome.failures.iter().all(|f| f.phase == TaskPhase::Act));

        // Failed agents count as not moved, the rest still moved
        assert!(!outcome.states[1].moved && outcome.states[1].failed);
        assert!(!outcome.states[3].moved && outcome.states[3].failed);
        assert!(outcome.states[0].moved && !outcome.states[0].failed);
        assert!(outcome.any_moved);
    }

    #[test]
    fn test_failures_do_not_mask_stall() {
        let config = ScriptedConfig {
            panic_act_at: Some(0),
            ..Default::default()
        };
        let mut population = Population::<ScriptedAgent>::spawn(3, &config).unwrap();

        let outcome = dispatcher()
            .dispatch(EventKind::Major, &mut population)
            .unwrap();

        assert!(outcome.all_game_over());
        assert!(outcome.failures[0].reason.contains("scripted act panic"));
    }

    #[test]
    fn test_panicking_snapshot_is_isolated() {
        let config = ScriptedConfig {
            moves_per_life: 10,
            panic_snapshot_at: Some(1),
            ..Default::default()
        };
        let mut population = Population::<ScriptedAgent>::spawn(3, &config).unwrap();

        let outcome = dispatcher()
            .dispatch(EventKind::Minor, &mut population)
            .unwrap();

        assert_eq!(population.len(), 3);
        assert_eq!(outcome.states.len(), 3);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].index, 1);
        assert_eq!(outcome.failures[0].phase, TaskPhase::Snapshot);

        let broken = &outcome.states[1];
        assert_eq!(broken.index, 1);
        assert!(broken.failed && !broken.moved);
        assert!(broken.payload.is_none());
        assert!(outcome.states[0].payload.is_some());
        assert!(outcome.any_moved);

        // The population is intact for the next event
        let next = dispatcher()
            .dispatch(EventKind::Minor, &mut population)
            .unwrap();
        assert_eq!(next.states.len(), 3);
    }

    #[test]
    fn test_act_and_snapshot_failures_both_recorded() {
        let config = ScriptedConfig {
            fail_act_at: Some(0),
            panic_snapshot_at: Some(0),
            ..Default::default()
        };
        let mut population = Population::<ScriptedAgent>::spawn(2, &config).unwrap();

        let outcome = dispatcher()
            .dispatch(EventKind::Major, &mut population)
            .unwrap();

        let phases: Vec<TaskPhase> = outcome.failures.iter().map(|f| f.phase).collect();
        assert_eq!(phases, vec![TaskPhase::Act, TaskPhase::Snapshot]);
        assert!(outcome.states[0].failed);
    }
}
