//! Reproduction round run when the whole population has stalled
//!
//! # Round
//!
//! ```text
//! 1. FitnessSnapshot::capture      (every fitness() read once, before any mutation)
//! 2. donors = frozen clone         (parents are read from here, never from live agents)
//! 3. per agent, on the pool:       sample 2 parents → crossover(donors[a], donors[b])
//! 4. barrier
//! 5. reinitialize every agent
//! ```
//!
//! Agents are reinitialised even when their crossover failed; they keep their
//! previous weights and start a new life with them. Panics in `fitness` or
//! `reinitialize` are caught per agent and reported like crossover failures.

use crate::evolution::fitness::{FitnessSnapshot, FitnessStats};
use crate::evolution::selector::WeightedSelector;
use crate::observability::metrics as engine_metrics;
use crate::runtime::agent::Agent;
use crate::runtime::dispatcher::{TaskFailure, TaskPhase};
use crate::runtime::population::Population;
use crate::runtime::worker_pool::WorkerPool;
use crate::utils::errors::Result;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What a reproduction round did
#[derive(Debug, Clone)]
pub struct ReproductionReport {
    /// Statistics over the snapshot the round selected from
    pub stats: FitnessStats,

    /// Selection fell back to uniform draws
    pub degenerate: bool,

    /// Parents drawn for each agent, in index order
    pub parents: Vec<(usize, usize)>,

    pub failures: Vec<TaskFailure>,
}

/// Runs selection, crossover and reinitialisation for a stalled population
pub struct ReproductionCoordinator {
    pool: Arc<WorkerPool>,
    selector: WeightedSelector,
}

impl ReproductionCoordinator {
    pub fn new(pool: Arc<WorkerPool>) -> Self {
        Self {
            pool,
            selector: WeightedSelector::new(),
        }
    }

    pub fn run<A: Agent>(&self, population: &mut Population<A>) -> Result<ReproductionReport> {
        let (snapshot, fitness_failures) = FitnessSnapshot::capture(population);
        let snapshot = Arc::new(snapshot);
        let stats = snapshot.stats();
        let degenerate = snapshot.is_degenerate();

        info!(
            mean = stats.mean,
            min = stats.min,
            max = stats.max,
            "fitness, mean={:.2}, min={:.2}, max={:.2}",
            stats.mean,
            stats.min,
            stats.max
        );
        engine_metrics::record_fitness(&stats);

        if degenerate {
            warn!(
                total = snapshot.total(),
                "No positive fitness in population, selecting parents uniformly"
            );
        }

        let donors: Arc<Vec<A>> = Arc::new(population.agents().to_vec());
        let selector = self.selector;
        let agents = population.take();

        let results = self.pool.run_batch(agents, {
            let snapshot = Arc::clone(&snapshot);
            let donors = Arc::clone(&donors);
            move |index, mut agent: A| {
                let (parent_a, parent_b) =
                    selector.sample_parents(&snapshot, &mut rand::thread_rng());

                let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                    agent.crossover(&donors[parent_a], &donors[parent_b])
                }));
                let failure = match outcome {
                    Ok(Ok(())) => None,
                    Ok(Err(e)) => Some(TaskFailure::from_error(index, TaskPhase::Crossover, &e)),
                    Err(payload) => Some(TaskFailure::from_panic(
                        index,
                        TaskPhase::Crossover,
                        payload,
                    )),
                };

                (agent, (parent_a, parent_b), failure)
            }
        })?;

        let mut agents = Vec::with_capacity(results.len());
        let mut parents = Vec::with_capacity(results.len());
        let mut failures = Vec::new();
        for failure in fitness_failures {
            failure.report();
            failures.push(failure);
        }

        for (agent, pair, failure) in results {
            agents.push(agent);
            parents.push(pair);
            if let Some(failure) = failure {
                failure.report();
                failures.push(failure);
            }
        }

        population.restore(agents)?;

        for (index, agent) in population.agents_mut().iter_mut().enumerate() {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| agent.reinitialize())) {
                let failure = TaskFailure::from_panic(index, TaskPhase::Reinitialize, payload);
                failure.report();
                failures.push(failure);
            }
        }

        debug!(
            "Reproduction round complete: {} agents, {} agent failures",
            parents.len(),
            failures.len()
        );
        engine_metrics::record_reproduction();

        Ok(ReproductionReport {
            stats,
            degenerate,
            parents,
            failures,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedAgent, ScriptedConfig};

    fn coordinator() -> ReproductionCoordinator {
        ReproductionCoordinator::new(Arc::new(WorkerPool::new(4).unwrap()))
    }

    #[test]
    fn test_round_preserves_population_size() {
        let config = ScriptedConfig::default();
        let counters = Arc::clone(&config.counters);
        let mut population = Population::<ScriptedAgent>::spawn(16, &config).unwrap();

        let report = coordinator().run(&mut population).unwrap();

        assert_eq!(population.len(), 16);
        assert_eq!(population.agents().len(), 16);
        assert_eq!(report.parents.len(), 16);
        assert_eq!(counters.crossovers(), 16);
        assert_eq!(counters.reinitializations(), 16);
        assert!(report.failures.is_empty());
    }

    #[test]
    fn test_parents_are_in_bounds() {
        let config = ScriptedConfig::default();
        let mut population = Population::<ScriptedAgent>::spawn(8, &config).unwrap();

        let report = coordinator().run(&mut population).unwrap();

        for (i, (a, b)) in report.parents.iter().enumerate() {
            assert!(*a < 8 && *b < 8);
            assert_eq!(population.agents()[i].parents, Some((*a, *b)));
        }
    }

    #[test]
    fn test_stats_reflect_pre_round_fitness() {
        let config = ScriptedConfig {
            fitness: vec![10.0, 20.0, 30.0],
            ..Default::default()
        };
        let mut population = Population::<ScriptedAgent>::spawn(3, &config).unwrap();

        let report = coordinator().run(&mut population).unwrap();

        assert_eq!(report.stats.mean, 20.0);
        assert_eq!(report.stats.min, 10.0);
        assert_eq!(report.stats.max, 30.0);
        assert!(!report.degenerate);
    }

    #[test]
    fn test_donor_reads_match_snapshot() {
        let fitness: Vec<f64> = (0..32).map(|i| (i % 5 + 1) as f64).collect();
        let config = ScriptedConfig {
            fitness: fitness.clone(),
            ..Default::default()
        };
        let counters = Arc::clone(&config.counters);
        let mut population = Population::<ScriptedAgent>::spawn(32, &config).unwrap();

        let report = coordinator().run(&mut population).unwrap();

        let reads = counters.donor_reads.lock();
        assert_eq!(reads.len(), 32);
        for (child, fitness_a, fitness_b) in reads.iter() {
            let (a, b) = report.parents[*child];
            assert_eq!(*fitness_a, fitness[a]);
            assert_eq!(*fitness_b, fitness[b]);
        }

        // Live agents were mutated, donors were not
        assert!(population.agents().iter().all(|agent| agent.fitness >= 1000.0));
    }

    #[test]
    fn test_zero_weight_agents_are_never_parents() {
        let config = ScriptedConfig {
            fitness: vec![0.0, 0.0, 7.0, 0.0],
            ..Default::default()
        };
        let mut population = Population::<ScriptedAgent>::spawn(4, &config).unwrap();

        let report = coordinator().run(&mut population).unwrap();

        assert!(report.parents.iter().all(|&(a, b)| a == 2 && b == 2));
    }

    #[test]
    fn test_degenerate_fitness_falls_back_to_uniform() {
        let config = ScriptedConfig {
            fitness: vec![0.0; 6],
            ..Default::default()
        };
        let mut population = Population::<ScriptedAgent>::spawn(6, &config).unwrap();

        let report = coordinator().run(&mut population).unwrap();

        assert!(report.degenerate);
        assert_eq!(report.parents.len(), 6);
        assert!(report.parents.iter().all(|&(a, b)| a < 6 && b < 6));
    }

    #[test]
    fn test_failed_crossover_still_reinitializes() {
        let config = ScriptedConfig {
            fail_crossover_at: Some(0),
            panic_crossover_at: Some(2),
            ..Default::default()
        };
        let counters = Arc::clone(&config.counters);
        let mut population = Population::<ScriptedAgent>::spawn(4, &config).unwrap();

        let report = coordinator().run(&mut population).unwrap();

        assert_eq!(report.failures.len(), 2);
        assert!(report
            .failures
            .iter()
            .all(|f| f.phase == TaskPhase::Crossover));
        assert_eq!(counters.crossovers(), 2);
        assert_eq!(counters.reinitializations(), 4);
        assert_eq!(population.len(), 4);

        // The failed agents kept their weights
        assert_eq!(population.agents()[0].parents, None);
        assert_eq!(population.agents()[2].parents, None);
        assert!(population.agents().iter().all(|agent| agent.lives == 2));
    }

    #[test]
    fn test_panicking_reinitialize_is_isolated() {
        let config = ScriptedConfig {
            panic_reinitialize_at: Some(1),
            ..Default::default()
        };
        let counters = Arc::clone(&config.counters);
        let mut population = Population::<ScriptedAgent>::spawn(3, &config).unwrap();

        let report = coordinator().run(&mut population).unwrap();

        assert_eq!(population.len(), 3);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].index, 1);
        assert_eq!(report.failures[0].phase, TaskPhase::Reinitialize);
        assert_eq!(counters.reinitializations(), 2);
        assert_eq!(population.agents()[0].lives, 2);
        assert_eq!(population.agents()[2].lives, 2);
    }

    #[test]
    fn test_panicking_fitness_is_never_a_parent() {
        let config = ScriptedConfig {
            fitness: vec![5.0, 5.0, 5.0],
            panic_fitness_at: Some(0),
            ..Default::default()
        };
        let mut population = Population::<ScriptedAgent>::spawn(3, &config).unwrap();

        let report = coordinator().run(&mut population).unwrap();

        assert_eq!(report.stats.min, 0.0);
        assert!(report
            .failures
            .iter()
            .any(|f| f.index == 0 && f.phase == TaskPhase::Fitness));
        assert!(report.parents.iter().all(|&(a, b)| a != 0 && b != 0));
    }
}
