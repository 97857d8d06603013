//! Reference genome agent
//!
//! A small stand-in for a game-playing bot: a flat weight genome drives how
//! much score each tick earns, Major ticks commit the pending score and spend
//! one unit of energy, and a life ends when energy runs out or the agent
//! collapses early. Once a life has ended `act` reports `false` until the
//! next `reinitialize`.

use crate::runtime::agent::Agent;
use crate::utils::config::AgentConfig;
use anyhow::ensure;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Snapshot of a [`GenomeAgent`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenomeState {
    pub score: f64,
    pub pending: f64,
    pub energy: u32,
    pub ticks: u64,
    pub lives: u64,
    pub game_over: bool,
    pub genome_mean: f64,
}

#[derive(Debug, Clone)]
pub struct GenomeAgent {
    index: usize,
    genome: Vec<f64>,
    energy: u32,
    score: f64,
    pending: f64,
    ticks: u64,
    lives: u64,
    game_over: bool,
    config: AgentConfig,
    rng: StdRng,
}

impl GenomeAgent {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn genome(&self) -> &[f64] {
        &self.genome
    }

    pub fn is_game_over(&self) -> bool {
        self.game_over
    }

    /// Replace the genome, e.g. to seed a population from a saved one
    pub fn with_genome(mut self, genome: Vec<f64>) -> anyhow::Result<Self> {
        ensure!(!genome.is_empty(), "genome must hold at least one weight");
        self.genome = genome;
        Ok(self)
    }

    fn activation(weight: f64) -> f64 {
        1.0 / (1.0 + (-weight).exp())
    }

    fn gaussian(rng: &mut StdRng) -> f64 {
        const TWO_PI: f64 = std::f64::consts::TAU;
        let u1 = rng.gen::<f64>().clamp(f64::MIN_POSITIVE, 1.0);
        let u2 = rng.gen::<f64>();
        (-2.0 * u1.ln()).sqrt() * (TWO_PI * u2).cos()
    }

    fn mutate(&mut self) {
        let rate = self.config.mutation_rate;
        let sigma = self.config.mutation_strength;
        for weight in &mut self.genome {
            if self.rng.gen::<f64>() < rate {
                *weight += Self::gaussian(&mut self.rng) * sigma;
            }
        }
    }
}

impl Agent for GenomeAgent {
    type Config = AgentConfig;
    type State = GenomeState;

    fn create(index: usize, config: &Self::Config) -> anyhow::Result<Self> {
        ensure!(config.genome_len > 0, "genome_len must be greater than 0");

        let mut rng = StdRng::from_entropy();
        let genome = (0..config.genome_len)
            .map(|_| rng.gen_range(-1.0..1.0))
            .collect();

        Ok(Self {
            index,
            genome,
            energy: config.energy,
            score: 0.0,
            pending: 0.0,
            ticks: 0,
            lives: 1,
            game_over: false,
            config: config.clone(),
            rng,
        })
    }

    fn act(&mut self, is_major_tick: bool) -> anyhow::Result<bool> {
        if self.game_over {
            return Ok(false);
        }

        let weight = self.genome[self.ticks as usize % self.genome.len()];
        self.pending += Self::activation(weight);
        self.ticks += 1;

        if is_major_tick {
            self.score += self.pending;
            self.pending = 0.0;
            self.energy = self.energy.saturating_sub(1);

            if self.energy == 0 || self.rng.gen::<f64>() < self.config.collapse_chance {
                self.game_over = true;
            }
        }

        Ok(true)
    }

    fn snapshot(&self) -> Self::State {
        GenomeState {
            score: self.score,
            pending: self.pending,
            energy: self.energy,
            ticks: self.ticks,
            lives: self.lives,
            game_over: self.game_over,
            genome_mean: self.genome.iter().sum::<f64>() / self.genome.len() as f64,
        }
    }

    fn fitness(&self) -> f64 {
        self.score
    }

    /// Coin flip per weight between the parents, then mutation
    fn crossover(&mut self, parent_a: &Self, parent_b: &Self) -> anyhow::Result<()> {
        ensure!(
            parent_a.genome.len() == self.genome.len() && parent_b.genome.len() == self.genome.len(),
            "genome length mismatch: child {}, parents {} and {}",
            self.genome.len(),
            parent_a.genome.len(),
            parent_b.genome.len()
        );

        for (i, weight) in self.genome.iter_mut().enumerate() {
            *weight = if self.rng.gen_bool(0.5) {
                parent_a.genome[i]
            } else {
                parent_b.genome[i]
            };
        }
        self.mutate();
        Ok(())
    }

    fn reinitialize(&mut self) {
        self.energy = self.config.energy;
        self.score = 0.0;
        self.pending = 0.0;
        self.ticks = 0;
        self.game_over = false;
        self.lives += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AgentConfig {
        AgentConfig {
            genome_len: 4,
            energy: 3,
            mutation_rate: 0.0,
            mutation_strength: 0.1,
            collapse_chance: 0.0,
        }
    }

    #[test]
    fn test_create() {
        let agent = GenomeAgent::create(7, &config()).unwrap();
        assert_eq!(agent.index(), 7);
        assert_eq!(agent.genome().len(), 4);
        assert!(agent.genome().iter().all(|w| (-1.0..1.0).contains(w)));
        assert_eq!(agent.fitness(), 0.0);
    }

    #[test]
    fn test_create_rejects_empty_genome() {
        let config = AgentConfig {
            genome_len: 0,
            ..config()
        };
        assert!(GenomeAgent::create(0, &config).is_err());
    }

    #[test]
    fn test_major_tick_commits_score() {
        let mut agent = GenomeAgent::create(0, &config()).unwrap();

        for _ in 0..8 {
            assert!(agent.act(false).unwrap());
        }
        assert_eq!(agent.fitness(), 0.0);
        assert!(agent.snapshot().pending > 0.0);

        assert!(agent.act(true).unwrap());
        assert!(agent.fitness() > 0.0);
        assert_eq!(agent.snapshot().pending, 0.0);
        assert_eq!(agent.snapshot().energy, 2);
    }

    #[test]
    fn test_game_over_after_energy_runs_out() {
        let mut agent = GenomeAgent::create(0, &config()).unwrap();

        for _ in 0..3 {
            assert!(agent.act(true).unwrap());
        }
        assert!(agent.is_game_over());
        assert!(!agent.act(false).unwrap());
        assert!(!agent.act(true).unwrap());
    }

    #[test]
    fn test_collapse_ends_life_early() {
        let config = AgentConfig {
            collapse_chance: 1.0,
            ..config()
        };
        let mut agent = GenomeAgent::create(0, &config).unwrap();

        assert!(agent.act(true).unwrap());
        assert!(agent.is_game_over());
        assert_eq!(agent.snapshot().energy, 2);
    }

    #[test]
    fn test_reinitialize_keeps_genome() {
        let mut agent = GenomeAgent::create(0, &config()).unwrap();
        let genome = agent.genome().to_vec();
        for _ in 0..3 {
            agent.act(true).unwrap();
        }

        agent.reinitialize();

        assert!(!agent.is_game_over());
        assert_eq!(agent.fitness(), 0.0);
        assert_eq!(agent.snapshot().energy, 3);
        assert_eq!(agent.snapshot().lives, 2);
        assert_eq!(agent.genome(), genome.as_slice());
    }

    #[test]
    fn test_crossover_takes_genes_from_parents() {
        let parent_a = GenomeAgent::create(0, &config())
            .unwrap()
            .with_genome(vec![1.0; 4])
            .unwrap();
        let parent_b = GenomeAgent::create(1, &config())
            .unwrap()
            .with_genome(vec![2.0; 4])
            .unwrap();
        let mut child = GenomeAgent::create(2, &config()).unwrap();

        child.crossover(&parent_a, &parent_b).unwrap();

        assert!(child.genome().iter().all(|w| *w == 1.0 || *w == 2.0));
    }

    #[test]
    fn test_crossover_mutates() {
        let config = AgentConfig {
            genome_len: 64,
            mutation_rate: 1.0,
            ..config()
        };
        let parent = GenomeAgent::create(0, &config)
            .unwrap()
            .with_genome(vec![0.5; 64])
            .unwrap();
        let mut child = GenomeAgent::create(1, &config).unwrap();

        child.crossover(&parent, &parent).unwrap();

        assert!(child.genome().iter().any(|w| *w != 0.5));
    }

    #[test]
    fn test_with_genome_rejects_empty() {
        let agent = GenomeAgent::create(0, &config()).unwrap();
        assert!(agent.with_genome(Vec::new()).is_err());
    }

    #[test]
    fn test_crossover_rejects_length_mismatch() {
        let parent_a = GenomeAgent::create(0, &config())
            .unwrap()
            .with_genome(vec![1.0; 3])
            .unwrap();
        let parent_b = GenomeAgent::create(1, &config()).unwrap();
        let mut child = GenomeAgent::create(2, &config()).unwrap();

        assert!(child.crossover(&parent_a, &parent_b).is_err());
    }
}
