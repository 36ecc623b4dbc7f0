// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use crate::config::Config;
use crate::coordinator_client::CoordinatorClient;
use crate::error::SchedulerError;
use crate::shutdown_signal::ShutdownSignal;
use crate::task::{
    Assignment, CompletedTask, CompletionReport, Heartbeat, WorkerId, WorkerStatus,
};
use crate::task_executor::TaskExecutor;
use std::future::pending;
use std::mem;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerSettings {
    pub heartbeat_interval: Duration,
    pub rpc_timeout: Duration,
}

impl WorkerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            heartbeat_interval: config.heartbeat_interval(),
            rpc_timeout: config.rpc_timeout(),
        }
    }
}

/// What one worker loop did over its lifetime
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerSummary {
    pub worker_id: Option<WorkerId>,
    pub heartbeats: u64,
    pub maps_completed: u64,
    pub reduces_completed: u64,
    pub failed_calls: u64,
    pub failed_tasks: u64,
}

type TaskResult = Result<CompletedTask, SchedulerError>;

/// Completion signal of the task currently executing in the background
struct RunningTask {
    done_rx: oneshot::Receiver<TaskResult>,
}

/// Single worker: polls the coordinator while idle, runs at most one task at a
/// time in the background, and reports each result before polling again.
///
/// The loop waits on whichever of these is outstanding: the heartbeat timer,
/// the coordinator's reply, the running task's completion, or shutdown. A
/// heartbeat is never sent while a task is running.
pub struct WorkerLoop<C, E, SD>
where
    C: CoordinatorClient,
    E: TaskExecutor,
    SD: ShutdownSignal,
{
    client: C,
    executor: E,
    shutdown: SD,
    settings: WorkerSettings,
    worker_id: Option<WorkerId>,
    status: WorkerStatus,
    current: Assignment,
    summary: WorkerSummary,
}

impl<C, E, SD> WorkerLoop<C, E, SD>
where
    C: CoordinatorClient,
    E: TaskExecutor,
    SD: ShutdownSignal,
{
    pub fn new(client: C, executor: E, shutdown: SD, settings: WorkerSettings) -> Self {
        Self {
            client,
            executor,
            shutdown,
            settings,
            worker_id: None,
            status: WorkerStatus::Idle,
            current: Assignment::Idle,
            summary: WorkerSummary::default(),
        }
    }

    pub fn worker_id(&self) -> Option<WorkerId> {
        self.worker_id
    }

    pub fn status(&self) -> WorkerStatus {
        self.status
    }

    /// Run until shutdown. A task that is running when shutdown arrives is
    /// allowed to finish and is reported before returning.
    pub async fn run(mut self) -> WorkerSummary {
        let mut ticker = interval(self.settings.heartbeat_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut running: Option<RunningTask> = None;

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = ticker.tick(), if running.is_none() => {
                    if let Some(assignment) = self.heartbeat().await {
                        running = Some(self.start(assignment));
                    }
                }
                result = wait_for(&mut running), if running.is_some() => {
                    running = None;
                    self.finish(result).await;
                }
            }
        }

        if let Some(mut task) = running.take() {
            info!(task = %self.current, "shutdown requested, waiting for running task");
            let result = wait_for_task(&mut task).await;
            self.finish(result).await;
        }

        info!(worker = ?self.worker_id, "worker loop stopped");
        self.summary
    }

    /// Send the current status and return a new assignment if one was handed out
    async fn heartbeat(&mut self) -> Option<Assignment> {
        let heartbeat = Heartbeat {
            worker_id: self.worker_id,
            status: self.status,
        };
        self.summary.heartbeats += 1;
        debug!(worker = ?self.worker_id, status = %self.status, "sending heartbeat");

        let rpc_timeout = self.settings.rpc_timeout;
        let reply = tokio::select! {
            reply = timeout(rpc_timeout, self.client.schedule(heartbeat)) => {
                reply.unwrap_or(Err(SchedulerError::RpcTimeout(rpc_timeout)))
            }
            _ = self.shutdown.cancelled() => return None,
        };

        let reply = match reply {
            Ok(reply) => reply,
            Err(e) => {
                self.summary.failed_calls += 1;
                if e.is_transient() {
                    warn!(worker = ?self.worker_id, error = %e, "heartbeat failed, retrying on next tick");
                } else {
                    error!(worker = ?self.worker_id, error = %e, "heartbeat rejected, retrying on next tick");
                }
                return None;
            }
        };

        if self.worker_id != Some(reply.worker_id) {
            info!(worker = %reply.worker_id, "registered with coordinator");
            self.worker_id = Some(reply.worker_id);
            self.summary.worker_id = self.worker_id;
        }

        if reply.assignment.is_idle() {
            debug!(worker = %reply.worker_id, "no work available");
            self.status = WorkerStatus::Idle;
            return None;
        }
        self.status = reply.status;
        Some(reply.assignment)
    }

    /// Move to the running state and execute `assignment` in the background
    fn start(&mut self, assignment: Assignment) -> RunningTask {
        self.status = assignment.running_status();
        self.current = assignment.clone();
        info!(worker = ?self.worker_id, task = %assignment, "task started");

        let (done_tx, done_rx) = oneshot::channel();
        let executor = self.executor.clone();
        tokio::spawn(async move {
            let result = execute(&executor, &assignment).await;
            let _ = done_tx.send(result);
        });

        RunningTask { done_rx }
    }

    /// Back to idle, then deliver the result to the coordinator
    async fn finish(&mut self, result: TaskResult) {
        let finished = mem::take(&mut self.current);
        self.status = WorkerStatus::Idle;

        let completed = match result {
            Ok(completed) => completed,
            Err(e) => {
                self.summary.failed_tasks += 1;
                warn!(worker = ?self.worker_id, task = %finished, error = %e, "task failed, leaving it to the coordinator");
                return;
            }
        };
        match &completed {
            CompletedTask::Map { .. } => self.summary.maps_completed += 1,
            CompletedTask::Reduce { .. } => self.summary.reduces_completed += 1,
        }
        info!(worker = ?self.worker_id, task = %finished, "task finished");

        let Some(worker_id) = self.worker_id else {
            return;
        };
        let report = CompletionReport {
            worker_id,
            completed,
        };
        let rpc_timeout = self.settings.rpc_timeout;
        let delivered = timeout(rpc_timeout, self.client.report_completion(report))
            .await
            .unwrap_or(Err(SchedulerError::RpcTimeout(rpc_timeout)));
        if let Err(e) = delivered {
            self.summary.failed_calls += 1;
            warn!(worker = %worker_id, task = %finished, error = %e, "completion report lost");
        }
    }
}

async fn execute<E: TaskExecutor>(executor: &E, assignment: &Assignment) -> TaskResult {
    match assignment {
        Assignment::Map(task) => {
            let outputs = executor.run_map(task).await?;
            Ok(CompletedTask::Map {
                file: task.file.clone(),
                outputs,
            })
        }
        Assignment::Reduce(task) => {
            let result = executor.run_reduce(task).await?;
            Ok(CompletedTask::Reduce {
                bucket: task.bucket,
                result,
            })
        }
        Assignment::Idle => Err(SchedulerError::TaskFailed("no task to run".to_string())),
    }
}

async fn wait_for(running: &mut Option<RunningTask>) -> TaskResult {
    match running {
        Some(task) => wait_for_task(task).await,
        None => pending().await,
    }
}

async fn wait_for_task(task: &mut RunningTask) -> TaskResult {
    (&mut task.done_rx).await.unwrap_or_else(|_| {
        Err(SchedulerError::TaskFailed(
            "task body stopped without a result".to_string(),
        ))
    })
}
