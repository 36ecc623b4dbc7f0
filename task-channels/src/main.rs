// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

mod channel_coordinator;
mod delayed_client;

use anyhow::Context;
use channel_coordinator::ChannelCoordinator;
use clap::Parser;
use delayed_client::DelayedClient;
use scheduler_core::config::Config;
use scheduler_core::coordinator::Coordinator;
use scheduler_core::coordinator_client::CoordinatorClient;
use scheduler_core::dispatcher::Dispatcher;
use scheduler_core::task_executor::SimulatedExecutor;
use std::process::ExitCode;
use std::time::Instant;
use tokio::{signal, spawn};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const REQUEST_CAPACITY: usize = 64;

#[derive(Parser, Debug)]
#[command(author, version, about = "Heartbeat-driven map-reduce scheduler", long_about = None)]
struct Cli {
    /// JSON configuration file; built-in defaults are used when omitted
    #[arg(long)]
    config: Option<String>,

    #[arg(long)]
    workers: Option<usize>,

    #[arg(long)]
    reducers: Option<usize>,

    /// Stop after this many milliseconds even if work remains
    #[arg(long)]
    duration_ms: Option<u64>,

    /// Input files, replacing the configured list
    files: Vec<String>,
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(workers) = cli.workers {
        config.num_workers = workers;
    }
    if let Some(reducers) = cli.reducers {
        config.num_reducers = reducers;
    }
    if let Some(duration_ms) = cli.duration_ms {
        config.run_duration_ms = duration_ms;
    }
    if !cli.files.is_empty() {
        config.input_files = cli.files.clone();
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let start_time = Instant::now();
    let cli = Cli::parse();
    let config = load_config(&cli).context("failed to load configuration")?;

    info!("=== HEARTBEAT MAP-REDUCE SCHEDULER ===");
    config.print_summary();

    let coordinator = Coordinator::from_config(&config)?;
    let (client, phase_rx, actor) = ChannelCoordinator::spawn(coordinator, REQUEST_CAPACITY);

    let worker_client = DelayedClient::new(
        client.clone(),
        config.network_delay(),
        config.network_jitter(),
    );
    let executor = SimulatedExecutor::new(config.map_duration(), config.reduce_duration());

    let cancel_token = CancellationToken::new();
    let ctrl_c_token = cancel_token.clone();
    spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                info!("ctrl-c received, initiating shutdown");
                ctrl_c_token.cancel();
            }
            Err(e) => warn!(error = %e, "failed to listen for ctrl-c"),
        }
    });

    let report = Dispatcher::from_config(worker_client, executor, &config)
        .with_phase(phase_rx)
        .run(cancel_token)
        .await;

    let stats = client
        .stats()
        .await
        .context("coordinator stopped before the final report")?;
    drop(client);
    actor.await.context("coordinator task failed")?;

    info!("=== RESULTS ===");
    info!(reason = %report.stop_reason, clean = report.clean, "dispatcher stopped");
    info!(
        phase = %stats.phase,
        workers = stats.registered_workers,
        completed_maps = stats.completed_maps,
        reduce_completions = stats.reduce_completions,
        reclaimed_tasks = stats.reclaimed_tasks,
        "coordinator state"
    );
    for (bucket, output) in &stats.final_outputs {
        info!(bucket, output = %output, "final output");
    }
    for summary in &report.workers {
        info!(
            worker = ?summary.worker_id,
            heartbeats = summary.heartbeats,
            maps = summary.maps_completed,
            reduces = summary.reduces_completed,
            failed_calls = summary.failed_calls,
            failed_tasks = summary.failed_tasks,
            "worker summary"
        );
    }
    info!(elapsed = ?start_time.elapsed(), "scheduler finished");

    Ok(if report.clean {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
