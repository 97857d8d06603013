//! Engine metrics
//!
//! Recorded through the `metrics` facade; nothing is exported until
//! [`init_metrics`](super::init_metrics) installs the Prometheus recorder.

use crate::evolution::fitness::FitnessStats;
use crate::runtime::dispatcher::TaskPhase;
use crate::scheduler::events::EventKind;
use metrics::{counter, gauge, histogram};
use std::time::Duration;

pub const GENERATIONS_TOTAL: &str = "evolab_generations_total";
pub const EVENTS_TOTAL: &str = "evolab_events_total";
pub const REPRODUCTIONS_TOTAL: &str = "evolab_reproductions_total";
pub const TASK_FAILURES_TOTAL: &str = "evolab_agent_task_failures_total";
pub const EVENT_BARRIER_SECONDS: &str = "evolab_event_barrier_seconds";
pub const POPULATION_SIZE: &str = "evolab_population_size";
pub const FITNESS_MEAN: &str = "evolab_fitness_mean";
pub const FITNESS_MIN: &str = "evolab_fitness_min";
pub const FITNESS_MAX: &str = "evolab_fitness_max";

pub fn record_event(event: EventKind, barrier: Duration) {
    counter!(EVENTS_TOTAL, "kind" => event.as_str()).increment(1);
    histogram!(EVENT_BARRIER_SECONDS).record(barrier.as_secs_f64());
}

pub fn record_generation() {
    counter!(GENERATIONS_TOTAL).increment(1);
}

pub fn record_reproduction() {
    counter!(REPRODUCTIONS_TOTAL).increment(1);
}

pub fn record_task_failure(phase: TaskPhase) {
    counter!(TASK_FAILURES_TOTAL, "phase" => phase.as_str()).increment(1);
}

pub fn record_population_size(size: usize) {
    gauge!(POPULATION_SIZE).set(size as f64);
}

pub fn record_fitness(stats: &FitnessStats) {
    gauge!(FITNESS_MEAN).set(stats.mean);
    gauge!(FITNESS_MIN).set(stats.min);
    gauge!(FITNESS_MAX).set(stats.max);
}
