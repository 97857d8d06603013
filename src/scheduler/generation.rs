//! Generation scheduler
//!
//! Owns the outer loop. A run lives on a dedicated coordinator thread that
//! issues the fixed event sequence, waits on every event barrier, hands each
//! result to the consumer, and runs a reproduction round whenever the Major
//! tick finds the whole population stalled.
//!
//! # State machine
//!
//! ```text
//!          start(n)              stop()                generation boundary
//!   Idle ──────────▶ Running ──────────▶ Stopping ──────────────────────▶ Idle
//!                       │                                                   ▲
//!                       └──── consumer gone / fatal error ──────────────────┘
//! ```
//!
//! The handoff channel is bounded: when the consumer has not drained the
//! previous result, the coordinator blocks on `send`. The simulation therefore
//! never runs further ahead of its consumer than the channel capacity.

use crate::evolution::reproduction::ReproductionCoordinator;
use crate::observability::metrics as engine_metrics;
use crate::runtime::agent::Agent;
use crate::runtime::dispatcher::EventDispatcher;
use crate::runtime::population::Population;
use crate::runtime::worker_pool::WorkerPool;
use crate::scheduler::events::{EventKind, GenerationResult, RunId};
use crate::scheduler::stop::StopSignal;
use crate::utils::config::RuntimeConfig;
use crate::utils::errors::{EngineError, Result};
use chrono::Utc;
use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use ulid::Ulid;

/// Scheduler lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    Idle,
    Running,
    Stopping,
}

/// Why a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// `stop()` was observed at a generation boundary
    Requested,

    /// The result receiver was dropped
    ConsumerDisconnected,
}

/// Totals for one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: RunId,
    pub generations_completed: u64,
    pub reproductions: u64,
    pub task_failures: u64,
    pub stop_reason: StopReason,
}

/// Cloneable handle that can request a stop without owning the scheduler
#[derive(Debug, Clone)]
pub struct StopHandle {
    signal: StopSignal,
    state: Arc<Mutex<SchedulerState>>,
}

impl StopHandle {
    /// Ask the running generation loop to stop at the next boundary
    ///
    /// No-op unless the scheduler is Running.
    pub fn stop(&self) {
        let mut state = self.state.lock();
        if *state == SchedulerState::Running {
            *state = SchedulerState::Stopping;
            self.signal.trigger();
            info!("Stop requested, finishing current generation");
        }
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.lock()
    }
}

/// Drives a population through generations on its own coordinator thread
pub struct GenerationScheduler<A: Agent> {
    pool: Arc<WorkerPool>,
    tick_interval: Option<Duration>,
    handle: StopHandle,
    results_tx: Sender<GenerationResult<A::State>>,
    coordinator: Mutex<Option<JoinHandle<Result<RunSummary>>>>,
}

impl<A: Agent> GenerationScheduler<A> {
    /// Create an idle scheduler and the receiving end of its handoff channel
    pub fn new(config: &RuntimeConfig) -> Result<(Self, Receiver<GenerationResult<A::State>>)> {
        let workers = config.resolved_worker_threads();
        let pool = Arc::new(WorkerPool::new(workers)?);
        let (results_tx, results_rx) = crossbeam_channel::bounded(config.handoff_capacity);

        info!(
            "Generation scheduler ready with {} workers, handoff capacity {}",
            workers, config.handoff_capacity
        );

        let scheduler = Self {
            pool,
            tick_interval: config.tick_interval(),
            handle: StopHandle {
                signal: StopSignal::new(),
                state: Arc::new(Mutex::new(SchedulerState::Idle)),
            },
            results_tx,
            coordinator: Mutex::new(None),
        };

        Ok((scheduler, results_rx))
    }

    /// Build a population of `n` agents and start issuing generations
    ///
    /// Counters restart at zero for every run. Fails without side effects when
    /// the scheduler is not Idle, `n` is 0, or an agent cannot be built.
    pub fn start(&self, n: usize, agent_config: A::Config) -> Result<RunId> {
        let mut state = self.handle.state.lock();
        if *state != SchedulerState::Idle {
            return Err(EngineError::AlreadyRunning(*state));
        }

        let population = Population::<A>::spawn(n, &agent_config)?;

        // A previous run has already left the loop once the state is Idle
        if let Some(previous) = self.coordinator.lock().take() {
            match previous.join() {
                Ok(Ok(summary)) => {
                    debug!("Discarding uncollected summary of run {}", summary.run_id)
                }
                Ok(Err(e)) => warn!("Previous run ended with an uncollected error: {}", e),
                Err(_) => warn!("Previous coordinator thread panicked"),
            }
        }

        let run_id = Ulid::new();
        self.handle.signal.reset();

        let coordinator = Coordinator {
            run_id,
            population,
            dispatcher: EventDispatcher::new(Arc::clone(&self.pool)),
            reproduction: ReproductionCoordinator::new(Arc::clone(&self.pool)),
            signal: self.handle.signal.clone(),
            results: self.results_tx.clone(),
            tick_interval: self.tick_interval,
        };

        // The guard is built on the new thread: dropping it here would need the held state lock
        let state_on_exit = Arc::clone(&self.handle.state);
        let spawned = thread::Builder::new()
            .name("evolab-coordinator".to_string())
            .spawn(move || {
                let _idle_on_exit = IdleOnExit(state_on_exit);
                let outcome = coordinator.run();
                if let Err(e) = &outcome {
                    error!("Generation loop aborted: {}", e);
                }
                outcome
            })
            .map_err(|e| EngineError::RuntimeError(format!("Failed to spawn coordinator: {}", e)))?;

        *self.coordinator.lock() = Some(spawned);
        *state = SchedulerState::Running;

        info!(%run_id, population = n, "Scheduler started");
        Ok(run_id)
    }

    /// Request a cooperative stop; idempotent
    pub fn stop(&self) {
        self.handle.stop();
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.handle.clone()
    }

    pub fn state(&self) -> SchedulerState {
        self.handle.state()
    }

    /// Block until the current run ends
    ///
    /// Returns `None` when no run has been started since the last `wait`.
    pub fn wait(&self) -> Result<Option<RunSummary>> {
        let Some(handle) = self.coordinator.lock().take() else {
            return Ok(None);
        };

        match handle.join() {
            Ok(outcome) => outcome.map(Some),
            Err(_) => Err(EngineError::RuntimeError(
                "Coordinator thread panicked".to_string(),
            )),
        }
    }
}

impl<A: Agent> Drop for GenerationScheduler<A> {
    fn drop(&mut self) {
        // The coordinator may be blocked on an undrained consumer; let it finish on its own
        self.handle.stop();
        if self.coordinator.lock().take().is_some() {
            debug!("Scheduler dropped while a run was still attached, detaching coordinator");
        }
    }
}

/// Returns the scheduler to Idle when the coordinator thread exits, unwinding included
struct IdleOnExit(Arc<Mutex<SchedulerState>>);

impl Drop for IdleOnExit {
    fn drop(&mut self) {
        *self.0.lock() = SchedulerState::Idle;
    }
}

/// Everything one run needs, moved onto the coordinator thread
struct Coordinator<A: Agent> {
    run_id: RunId,
    population: Population<A>,
    dispatcher: EventDispatcher,
    reproduction: ReproductionCoordinator,
    signal: StopSignal,
    results: Sender<GenerationResult<A::State>>,
    tick_interval: Option<Duration>,
}

impl<A: Agent> Coordinator<A> {
    fn run(mut self) -> Result<RunSummary> {
        let size = self.population.len();
        engine_metrics::record_population_size(size);

        let mut summary = RunSummary {
            run_id: self.run_id,
            generations_completed: 0,
            reproductions: 0,
            task_failures: 0,
            stop_reason: StopReason::Requested,
        };
        let mut consumer_connected = true;

        loop {
            let generation_index = summary.generations_completed;

            for (event_index, event) in EventKind::generation_sequence().into_iter().enumerate() {
                let outcome = self.dispatcher.dispatch(event, &mut self.population)?;
                summary.task_failures += outcome.failures.len() as u64;

                let stalled = event.is_major() && outcome.all_game_over();

                if consumer_connected {
                    let result = GenerationResult {
                        run_id: self.run_id,
                        generation_index,
                        event_index,
                        event,
                        any_moved: outcome.any_moved,
                        agent_states: outcome.states,
                        produced_at: Utc::now(),
                    };

                    // Blocks while the consumer is behind
                    if self.results.send(result).is_err() {
                        warn!("Result consumer disconnected, stopping after this generation");
                        consumer_connected = false;
                    }
                }

                if stalled {
                    debug!(generation_index, "Population stalled, reproducing");
                    let report = self.reproduction.run(&mut self.population)?;
                    summary.reproductions += 1;
                    summary.task_failures += report.failures.len() as u64;
                }

                if self.population.len() != size {
                    return Err(EngineError::PopulationSizeChanged {
                        expected: size,
                        actual: self.population.len(),
                    });
                }

                if let Some(interval) = self.tick_interval {
                    thread::sleep(interval);
                }
            }

            summary.generations_completed += 1;
            engine_metrics::record_generation();
            debug!(generation_index, "Generation complete");

            if !consumer_connected {
                summary.stop_reason = StopReason::ConsumerDisconnected;
                break;
            }
            if self.signal.is_triggered() {
                summary.stop_reason = StopReason::Requested;
                break;
            }
        }

        info!(
            run_id = %summary.run_id,
            generations = summary.generations_completed,
            reproductions = summary.reproductions,
            task_failures = summary.task_failures,
            reason = ?summary.stop_reason,
            "Run finished"
        );

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedAgent, ScriptedConfig};

    fn runtime_config() -> RuntimeConfig {
        RuntimeConfig {
            worker_threads: Some(2),
            ..Default::default()
        }
    }

    #[test]
    fn test_new_scheduler_is_idle() {
        let (scheduler, _rx) = GenerationScheduler::<ScriptedAgent>::new(&runtime_config()).unwrap();
        assert_eq!(scheduler.state(), SchedulerState::Idle);
        assert!(scheduler.wait().unwrap().is_none());
    }

    #[test]
    fn test_start_rejects_empty_population() {
        let (scheduler, _rx) = GenerationScheduler::<ScriptedAgent>::new(&runtime_config()).unwrap();

        let result = scheduler.start(0, ScriptedConfig::default());

        assert!(matches!(result, Err(EngineError::InvalidPopulationSize(0))));
        assert_eq!(scheduler.state(), SchedulerState::Idle);
        assert!(scheduler.wait().unwrap().is_none());
    }

    #[test]
    fn test_start_rejects_failed_agent_creation() {
        let (scheduler, _rx) = GenerationScheduler::<ScriptedAgent>::new(&runtime_config()).unwrap();
        let config = ScriptedConfig {
            fail_create_at: Some(1),
            ..Default::default()
        };

        let result = scheduler.start(3, config);

        assert!(matches!(result, Err(EngineError::AgentCreation { index: 1, .. })));
        assert_eq!(scheduler.state(), SchedulerState::Idle);
    }

    #[test]
    fn test_stop_when_idle_is_noop() {
        let (scheduler, _rx) = GenerationScheduler::<ScriptedAgent>::new(&runtime_config()).unwrap();
        scheduler.stop();
        scheduler.stop();
        assert_eq!(scheduler.state(), SchedulerState::Idle);
    }

    #[test]
    fn test_start_while_running_is_rejected() {
        let (scheduler, rx) = GenerationScheduler::<ScriptedAgent>::new(&runtime_config()).unwrap();
        scheduler.start(2, ScriptedConfig::default()).unwrap();

        let second = scheduler.start(2, ScriptedConfig::default());
        assert!(matches!(
            second,
            Err(EngineError::AlreadyRunning(SchedulerState::Running))
        ));

        // The undrained channel keeps the coordinator inside its first generation
        scheduler.stop();
        assert_eq!(scheduler.state(), SchedulerState::Stopping);
        let third = scheduler.start(2, ScriptedConfig::default());
        assert!(matches!(
            third,
            Err(EngineError::AlreadyRunning(SchedulerState::Stopping))
        ));

        drop(rx);
        let summary = scheduler.wait().unwrap().unwrap();
        assert_eq!(summary.stop_reason, StopReason::ConsumerDisconnected);
        assert_eq!(summary.generations_completed, 1);
        assert_eq!(scheduler.state(), SchedulerState::Idle);
    }

    #[test]
    fn test_unwinding_coordinator_returns_to_idle() {
        let state = Arc::new(Mutex::new(SchedulerState::Running));
        let guard = IdleOnExit(Arc::clone(&state));

        let joined = thread::spawn(move || {
            let _guard = guard;
            panic!("coordinator died");
        })
        .join();

        assert!(joined.is_err());
        assert_eq!(*state.lock(), SchedulerState::Idle);
    }

    #[test]
    fn test_panicking_reinitialize_keeps_scheduler_usable() {
        let (scheduler, rx) = GenerationScheduler::<ScriptedAgent>::new(&runtime_config()).unwrap();
        let config = ScriptedConfig {
            panic_reinitialize_at: Some(1),
            ..Default::default()
        };

        scheduler.start(3, config).unwrap();
        // The stop lands at the end of the first generation, after its reproduction round
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        scheduler.stop();
        while scheduler.state() != SchedulerState::Idle {
            let _ = rx.recv_timeout(Duration::from_millis(20));
        }
        rx.try_iter().for_each(drop);

        let summary = scheduler.wait().unwrap().unwrap();
        assert_eq!(summary.stop_reason, StopReason::Requested);
        assert_eq!(summary.generations_completed, 1);
        assert_eq!(summary.reproductions, 1);
        assert_eq!(summary.task_failures, 1);

        assert!(scheduler.start(3, ScriptedConfig::default()).is_ok());
        assert_eq!(scheduler.state(), SchedulerState::Running);
        scheduler.stop();
        drop(rx);
        assert!(scheduler.wait().unwrap().is_some());
        assert_eq!(scheduler.state(), SchedulerState::Idle);
    }
}
