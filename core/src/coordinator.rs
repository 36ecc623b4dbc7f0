// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use crate::config::Config;
use crate::error::SchedulerError;
use crate::task::{
    Assignment, CompletedTask, CompletionReport, Heartbeat, ScheduleReply, WorkerId, WorkerStatus,
};
use crate::task_pool::{JobPhase, TaskPool};
use crate::worker_record::WorkerRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Point-in-time view of the coordinator, for logging and reports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorStats {
    pub phase: JobPhase,
    pub registered_workers: usize,
    pub pending_maps: usize,
    pub maps_in_flight: usize,
    pub completed_maps: usize,
    pub pending_reduces: usize,
    pub reduces_in_flight: usize,
    pub reduce_completions: u64,
    pub reclaimed_tasks: u64,
    /// Result locator of every finished reduce, by bucket
    pub final_outputs: BTreeMap<usize, String>,
}

/// Task-assignment state machine.
///
/// Every method takes `&mut self`: callers share a coordinator through a single
/// exclusive-access boundary (see `SharedCoordinator` or the channel actor), so
/// each `schedule` / `report_completion` is one serialized step.
#[derive(Debug)]
pub struct Coordinator {
    pool: TaskPool,
    workers: BTreeMap<WorkerId, WorkerRecord>,
    last_worker_id: u64,
    reduce_completions: u64,
    reclaimed_tasks: u64,
    final_outputs: BTreeMap<usize, String>,
    task_timeout: Option<Duration>,
    phase_tx: watch::Sender<JobPhase>,
}

impl Coordinator {
    pub fn new<I, S>(inputs: I, reducer_count: usize) -> Result<Self, SchedulerError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if reducer_count == 0 {
            return Err(SchedulerError::InvalidConfig(
                "reducer count must be at least 1".to_string(),
            ));
        }

        let pool = TaskPool::new(inputs, reducer_count);
        let (phase_tx, _) = watch::channel(pool.phase());

        Ok(Self {
            pool,
            workers: BTreeMap::new(),
            last_worker_id: 0,
            reduce_completions: 0,
            reclaimed_tasks: 0,
            final_outputs: BTreeMap::new(),
            task_timeout: None,
            phase_tx,
        })
    }

    /// Validate `config` and build a coordinator from it
    pub fn from_config(config: &Config) -> Result<Self, SchedulerError> {
        config.validate()?;
        Ok(Self::new(config.input_files.iter().cloned(), config.num_reducers)?
            .with_task_timeout(config.task_timeout()))
    }

    /// Reassign work whose worker has held it longer than `timeout`. `None` keeps
    /// assignments until their worker reports back.
    pub fn with_task_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.task_timeout = timeout;
        self
    }

    /// Watch the job phase; the receiver sees `Done` once the last reduce is reported
    pub fn subscribe(&self) -> watch::Receiver<JobPhase> {
        self.phase_tx.subscribe()
    }

    pub fn register_worker(&mut self) -> WorkerId {
        self.last_worker_id += 1;
        let id = WorkerId(self.last_worker_id);
        self.workers.insert(id, WorkerRecord::new(id, Instant::now()));
        info!(worker = %id, "worker registered");
        id
    }

    /// Record a heartbeat and decide what the worker should do next
    pub fn schedule(&mut self, heartbeat: Heartbeat) -> ScheduleReply {
        let now = Instant::now();
        self.reclaim_stale(now);

        let id = match heartbeat.worker_id {
            Some(id) if self.workers.contains_key(&id) => id,
            Some(unknown) => {
                debug!(worker = %unknown, "heartbeat from unknown worker, registering afresh");
                self.register_worker()
            }
            None => self.register_worker(),
        };
        let record = self
            .workers
            .entry(id)
            .or_insert_with(|| WorkerRecord::new(id, now));
        record.last_heartbeat = now;
        record.status = heartbeat.status;

        // A worker holding an assignment gets it echoed back, never a new one
        if heartbeat.status.is_busy() {
            if record.current.is_idle() {
                debug!(worker = %id, status = %heartbeat.status, "busy worker has no recorded assignment");
                record.status = WorkerStatus::Idle;
            }
            return ScheduleReply {
                worker_id: id,
                status: record.status,
                assignment: record.current.clone(),
            };
        }

        if !record.current.is_idle() {
            let abandoned = record.clear();
            if requeue(&mut self.pool, id, &abandoned) {
                warn!(worker = %id, task = %abandoned, "idle worker abandoned its assignment, returned to pool");
            }
        }

        let assignment = if let Some(task) = self.pool.take_map(id) {
            Assignment::Map(task)
        } else if let Some(task) = self.pool.take_reduce(id) {
            Assignment::Reduce(task)
        } else {
            Assignment::Idle
        };

        if !assignment.is_idle() {
            info!(worker = %id, task = %assignment, "task assigned");
            record.assign(assignment.clone(), now);
        }
        let reply = ScheduleReply {
            worker_id: id,
            status: record.status,
            assignment,
        };

        self.publish_phase();
        reply
    }

    /// Apply a completion report. Unknown workers, duplicates and reports for
    /// work that has since been reassigned are ignored.
    pub fn report_completion(&mut self, report: CompletionReport) {
        let id = report.worker_id;
        let Some(record) = self.workers.get_mut(&id) else {
            debug!(worker = %id, "completion from unknown worker ignored");
            return;
        };
        record.last_heartbeat = Instant::now();

        match &report.completed {
            CompletedTask::Map { file, outputs } => {
                if self.pool.complete_map(id, file, outputs) {
                    info!(worker = %id, file = %file, "map completed");
                } else {
                    debug!(worker = %id, file = %file, "stale or duplicate map report ignored");
                }
            }
            CompletedTask::Reduce { bucket, result } => {
                if self.pool.complete_reduce(id, *bucket) {
                    self.reduce_completions += 1;
                    self.final_outputs.insert(*bucket, result.clone());
                    info!(worker = %id, bucket, result = %result, "reduce completed");
                } else {
                    debug!(worker = %id, bucket, "stale or duplicate reduce report ignored");
                }
            }
        }

        if holds(&record.current, &report.completed) {
            record.clear();
        }

        self.publish_phase();
    }

    fn reclaim_stale(&mut self, now: Instant) {
        let Some(timeout) = self.task_timeout else {
            return;
        };
        for record in self.workers.values_mut() {
            if !record.is_stale(now, timeout) {
                continue;
            }
            let stale = record.clear();
            if requeue(&mut self.pool, record.id, &stale) {
                self.reclaimed_tasks += 1;
                warn!(worker = %record.id, task = %stale, ?timeout, "assignment timed out, returned to pool");
            }
        }
    }

    fn publish_phase(&self) {
        let phase = self.pool.phase();
        let changed = self.phase_tx.send_if_modified(|current| {
            if *current == phase {
                return false;
            }
            *current = phase;
            true
        });
        if changed {
            info!(%phase, "job phase changed");
        }
    }

    pub fn phase(&self) -> JobPhase {
        self.pool.phase()
    }

    pub fn pool(&self) -> &TaskPool {
        &self.pool
    }

    pub fn worker(&self, id: WorkerId) -> Option<&WorkerRecord> {
        self.workers.get(&id)
    }

    pub fn reduce_completions(&self) -> u64 {
        self.reduce_completions
    }

    pub fn stats(&self) -> CoordinatorStats {
        CoordinatorStats {
            phase: self.pool.phase(),
            registered_workers: self.workers.len(),
            pending_maps: self.pool.pending_map_inputs().count(),
            maps_in_flight: self.pool.maps_in_flight(),
            completed_maps: self.pool.completed_maps(),
            pending_reduces: self.pool.pending_reduce_buckets().count(),
            reduces_in_flight: self.pool.reduces_in_flight(),
            reduce_completions: self.reduce_completions,
            reclaimed_tasks: self.reclaimed_tasks,
            final_outputs: self.final_outputs.clone(),
        }
    }
}

fn requeue(pool: &mut TaskPool, worker: WorkerId, assignment: &Assignment) -> bool {
    match assignment {
        Assignment::Idle => false,
        Assignment::Map(task) => pool.requeue_map(worker, &task.file),
        Assignment::Reduce(task) => pool.requeue_reduce(worker, task.bucket),
    }
}

fn holds(current: &Assignment, completed: &CompletedTask) -> bool {
    match (current, completed) {
        (Assignment::Map(task), CompletedTask::Map { file, .. }) => task.file == *file,
        (Assignment::Reduce(task), CompletedTask::Reduce { bucket, .. }) => task.bucket == *bucket,
        _ => false,
    }
}
