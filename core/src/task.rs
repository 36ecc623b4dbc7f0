// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identifier handed out by the coordinator on first contact, starting at 1
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WorkerId(pub u64);

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a worker is doing, as reported in heartbeats and recorded by the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WorkerStatus {
    #[default]
    Idle,
    MapAssigned,
    MapRunning,
    ReduceAssigned,
    ReduceRunning,
}

impl WorkerStatus {
    /// True while the worker holds an assignment, whether started or not
    pub fn is_busy(self) -> bool {
        !matches!(self, WorkerStatus::Idle)
    }
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkerStatus::Idle => "Idle",
            WorkerStatus::MapAssigned => "MapAssigned",
            WorkerStatus::MapRunning => "MapRunning",
            WorkerStatus::ReduceAssigned => "ReduceAssigned",
            WorkerStatus::ReduceRunning => "ReduceRunning",
        };
        f.write_str(name)
    }
}

/// Map work for one input file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapTask {
    pub file: String,
    pub reducer_count: usize,
}

/// Reduce work for one bucket. `inputs` is a copy of the bucket taken at issue time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReduceTask {
    pub bucket: usize,
    pub inputs: Vec<String>,
}

/// Intermediate locators produced by one Map task, keyed by reducer index
pub type TaskOutputs = BTreeMap<usize, Vec<String>>;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Assignment {
    #[default]
    Idle,
    Map(MapTask),
    Reduce(ReduceTask),
}

impl Assignment {
    /// Status a worker enters when it is handed this assignment
    pub fn assigned_status(&self) -> WorkerStatus {
        match self {
            Assignment::Idle => WorkerStatus::Idle,
            Assignment::Map(_) => WorkerStatus::MapAssigned,
            Assignment::Reduce(_) => WorkerStatus::ReduceAssigned,
        }
    }

    /// Status a worker enters once it starts executing this assignment
    pub fn running_status(&self) -> WorkerStatus {
        match self {
            Assignment::Idle => WorkerStatus::Idle,
            Assignment::Map(_) => WorkerStatus::MapRunning,
            Assignment::Reduce(_) => WorkerStatus::ReduceRunning,
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, Assignment::Idle)
    }
}

impl fmt::Display for Assignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Assignment::Idle => f.write_str("idle"),
            Assignment::Map(task) => write!(f, "map({})", task.file),
            Assignment::Reduce(task) => {
                write!(f, "reduce(bucket {}, {} inputs)", task.bucket, task.inputs.len())
            }
        }
    }
}

/// Periodic poll from a worker. `worker_id` is `None` until the coordinator assigned one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heartbeat {
    pub worker_id: Option<WorkerId>,
    pub status: WorkerStatus,
}

/// Coordinator answer to a heartbeat
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleReply {
    pub worker_id: WorkerId,
    pub status: WorkerStatus,
    pub assignment: Assignment,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompletedTask {
    Map { file: String, outputs: TaskOutputs },
    Reduce { bucket: usize, result: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionReport {
    pub worker_id: WorkerId,
    pub completed: CompletedTask,
}
