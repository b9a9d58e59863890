//! Local simulation of one distributed graph computation.
//!
//! Spawns a conductor and a configurable number of simulated workers in
//! one process, runs the full orchestration path to a terminal state, and
//! prints the accumulated status as JSON.

use std::collections::BTreeSet;

use conductor::actors::conductor::{Conductor, ConductorProgress};
use conductor::actors::{next_execution_id, ActorSystem};
use conductor::sim::SimWorker;
use shared_types::{ActorId, ComputationConfig, ServerId};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

fn env_or(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let worker_count = env_or("QUIVER_WORKERS", 4);
    let vertices = env_or("QUIVER_VERTICES_PER_WORKER", 10_000);
    let active_rounds = env_or("QUIVER_ACTIVE_ROUNDS", 3);
    let config = ComputationConfig {
        max_supersteps: env_or("QUIVER_MAX_SUPERSTEPS", shared_types::DEFAULT_MAX_SUPERSTEPS),
    };

    let system = ActorSystem::new(ServerId::new("CRDN-0001"));
    let dispatcher = system.dispatcher();

    let worker_refs: Vec<_> = (0..worker_count)
        .map(|_| {
            let dispatcher = dispatcher.clone();
            system.spawn(move |id| {
                SimWorker::new(id, dispatcher, vertices, vertices * 4, active_rounds)
            })
        })
        .collect();
    let workers: BTreeSet<ActorId> = worker_refs.iter().map(|w| w.id().clone()).collect();

    let execution_id = next_execution_id();
    let (progress_tx, mut progress_rx) =
        watch::channel(ConductorProgress::launching(execution_id));
    let conductor_ref = {
        let dispatcher = dispatcher.clone();
        system.spawn(move |id| {
            Conductor::new(id, execution_id, workers, config, dispatcher, progress_tx)
        })
    };

    let outcome = progress_rx
        .wait_for(ConductorProgress::is_terminal)
        .await?
        .clone();

    match outcome.diagnostic {
        Some(diagnostic) => tracing::error!(execution = %execution_id, diagnostic, "computation failed"),
        None => tracing::info!(execution = %execution_id, state = %outcome.state, "computation finished"),
    }
    println!("{}", serde_json::to_string_pretty(&outcome.status)?);

    conductor_ref.stop();
    for worker in &worker_refs {
        worker.stop();
    }
    Ok(())
}
