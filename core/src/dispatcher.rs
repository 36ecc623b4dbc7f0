// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use crate::config::Config;
use crate::coordinator_client::CoordinatorClient;
use crate::shutdown_signal::TokenShutdownSignal;
use crate::task_executor::TaskExecutor;
use crate::task_pool::JobPhase;
use crate::worker_loop::{WorkerLoop, WorkerSettings, WorkerSummary};
use std::fmt;
use std::future::pending;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Every task of the job has completed
    Drained,
    /// The configured run duration elapsed first
    DeadlineElapsed,
    /// Stop was requested from outside
    Shutdown,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Drained => write!(f, "job drained"),
            StopReason::DeadlineElapsed => write!(f, "run duration elapsed"),
            StopReason::Shutdown => write!(f, "shutdown requested"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DispatchReport {
    pub stop_reason: StopReason,
    /// All workers stopped on their own within the grace period and none panicked
    pub clean: bool,
    pub workers: Vec<WorkerSummary>,
}

/// Starts N worker loops against one coordinator and stops them together
pub struct Dispatcher<C, E>
where
    C: CoordinatorClient,
    E: TaskExecutor,
{
    client: C,
    executor: E,
    num_workers: usize,
    settings: WorkerSettings,
    phase_rx: Option<watch::Receiver<JobPhase>>,
    run_duration: Option<Duration>,
    shutdown_grace: Duration,
}

impl<C, E> Dispatcher<C, E>
where
    C: CoordinatorClient,
    E: TaskExecutor,
{
    pub fn new(client: C, executor: E, num_workers: usize, settings: WorkerSettings) -> Self {
        Self {
            client,
            executor,
            num_workers,
            settings,
            phase_rx: None,
            run_duration: None,
            shutdown_grace: Duration::from_secs(30),
        }
    }

    pub fn from_config(client: C, executor: E, config: &Config) -> Self {
        Self::new(
            client,
            executor,
            config.num_workers,
            WorkerSettings::from_config(config),
        )
        .with_run_duration(config.run_duration())
        .with_shutdown_grace(config.shutdown_grace())
    }

    /// Stop as soon as the watched phase reaches `Done`
    pub fn with_phase(mut self, phase_rx: watch::Receiver<JobPhase>) -> Self {
        self.phase_rx = Some(phase_rx);
        self
    }

    pub fn with_run_duration(mut self, run_duration: Option<Duration>) -> Self {
        self.run_duration = run_duration;
        self
    }

    pub fn with_shutdown_grace(mut self, shutdown_grace: Duration) -> Self {
        self.shutdown_grace = shutdown_grace;
        self
    }

    pub async fn run(self, shutdown: CancellationToken) -> DispatchReport {
        let worker_token = shutdown.child_token();
        let mut workers = JoinSet::new();
        for slot in 0..self.num_workers {
            let worker = WorkerLoop::new(
                self.client.clone(),
                self.executor.clone(),
                TokenShutdownSignal::new(worker_token.clone()),
                self.settings,
            );
            workers.spawn(worker.run().instrument(info_span!("worker", slot)));
        }
        info!(workers = self.num_workers, "workers started");

        let stop_reason = wait_for_stop(&shutdown, self.phase_rx, self.run_duration).await;
        info!(reason = %stop_reason, "stopping workers");
        worker_token.cancel();

        let mut summaries = Vec::with_capacity(self.num_workers);
        let mut clean = true;
        let joined = timeout(
            self.shutdown_grace,
            join_all(&mut workers, &mut summaries, &mut clean),
        )
        .await;
        if joined.is_err() {
            warn!(
                remaining = workers.len(),
                grace_ms = self.shutdown_grace.as_millis() as u64,
                "workers still running after grace period, aborting"
            );
            clean = false;
            workers.abort_all();
            while workers.join_next().await.is_some() {}
        }

        info!(stopped = summaries.len(), clean, "all workers stopped");
        DispatchReport {
            stop_reason,
            clean,
            workers: summaries,
        }
    }
}

async fn wait_for_stop(
    shutdown: &CancellationToken,
    phase_rx: Option<watch::Receiver<JobPhase>>,
    run_duration: Option<Duration>,
) -> StopReason {
    let drained = async move {
        let Some(mut phase_rx) = phase_rx else {
            return pending().await;
        };
        let done = phase_rx
            .wait_for(|phase| *phase == JobPhase::Done)
            .await
            .is_ok();
        if !done {
            // Coordinator is gone; only shutdown or the deadline can stop us now
            pending::<()>().await;
        }
    };
    let deadline = async move {
        match run_duration {
            Some(run_duration) => sleep(run_duration).await,
            None => pending().await,
        }
    };

    tokio::select! {
        _ = shutdown.cancelled() => StopReason::Shutdown,
        _ = drained => StopReason::Drained,
        _ = deadline => StopReason::DeadlineElapsed,
    }
}

async fn join_all(
    workers: &mut JoinSet<WorkerSummary>,
    summaries: &mut Vec<WorkerSummary>,
    clean: &mut bool,
) {
    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok(summary) => summaries.push(summary),
            Err(e) => {
                warn!(error = %e, "worker loop ended abnormally");
                *clean = false;
            }
        }
    }
}
