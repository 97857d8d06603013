//! Evolab Engine
//!
//! Runs a population of reference genome agents through generations until
//! interrupted or until the configured generation limit is reached.

use anyhow::Result;
use crossbeam_channel::Receiver;
use evolab_engine::agents::{GenomeAgent, GenomeState};
use evolab_engine::observability::{init_metrics, init_tracing};
use evolab_engine::scheduler::{GenerationResult, GenerationScheduler, StopHandle};
use evolab_engine::utils::config::EngineConfig;
use evolab_engine::BuildInfo;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = EngineConfig::load()?;

    // Initialize observability (tracing, metrics)
    init_tracing(&config.observability)?;
    init_metrics(&config.observability)?;

    let build = BuildInfo::current();
    info!(
        "Starting Evolab Engine v{} ({}, built {})",
        build.version, build.git_hash, build.build_timestamp
    );
    info!("Configuration loaded: {:?}", config);

    let (scheduler, results) = GenerationScheduler::<GenomeAgent>::new(&config.runtime)?;
    let run_id = scheduler.start(config.runtime.population_size, config.agent.clone())?;
    info!(%run_id, "Population of {} agents running", config.runtime.population_size);

    let stop = scheduler.stop_handle();
    let max_generations = config.runtime.max_generations;
    let consumer = tokio::task::spawn_blocking(move || consume(results, stop, max_generations));

    // Graceful shutdown handler
    let stop = scheduler.stop_handle();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received shutdown signal, finishing current generation...");
                stop.stop();
            }
            Err(e) => error!("Failed to install CTRL+C signal handler: {}", e),
        }
    });

    // Dropping the scheduler closes the channel once the coordinator exits
    let summary = tokio::task::spawn_blocking(move || {
        let summary = scheduler.wait();
        drop(scheduler);
        summary
    })
    .await??;

    let last = consumer.await?;

    match summary {
        Some(summary) => info!(
            run_id = %summary.run_id,
            generations = summary.generations_completed,
            reproductions = summary.reproductions,
            task_failures = summary.task_failures,
            "Engine stopped: {:?}",
            summary.stop_reason
        ),
        None => warn!("Engine stopped without a run summary"),
    }

    if let Some(last) = last {
        println!("{}", serde_json::to_string_pretty(&last)?);
    }

    Ok(())
}

/// Drain results, log each generation and enforce the generation limit
///
/// Returns the last result seen so the final population can be reported.
fn consume(
    results: Receiver<GenerationResult<GenomeState>>,
    stop: StopHandle,
    max_generations: Option<u64>,
) -> Option<GenerationResult<GenomeState>> {
    let mut last = None;

    for result in results.iter() {
        if result.closes_generation() {
            let scores: Vec<f64> = result.agent_states.iter().map(|s| s.fitness).collect();
            let best = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let mean = scores.iter().sum::<f64>() / scores.len().max(1) as f64;
            let alive = result
                .agent_states
                .iter()
                .filter_map(|s| s.payload.as_ref())
                .filter(|payload| !payload.game_over)
                .count();

            info!(
                generation = result.generation_index,
                alive,
                "best score {:.3}, mean score {:.3}",
                best,
                mean
            );

            if max_generations.is_some_and(|max| result.generation_index + 1 >= max) {
                stop.stop();
            }
        }
        last = Some(result);
    }

    last
}
