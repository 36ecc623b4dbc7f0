// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use crate::error::SchedulerError;
use crate::task::{MapTask, ReduceTask, TaskOutputs};
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::sleep;

/// User-supplied task bodies. The scheduler only moves the locators these
/// return; it never looks inside them.
#[async_trait]
pub trait TaskExecutor: Clone + Send + Sync + 'static {
    /// Transform one input into locators grouped by reducer index
    async fn run_map(&self, task: &MapTask) -> Result<TaskOutputs, SchedulerError>;

    /// Consume one bucket and return the locator of the final output
    async fn run_reduce(&self, task: &ReduceTask) -> Result<String, SchedulerError>;
}

/// Stand-in for real computation: sleeps, then names its outputs.
///
/// Map of file `f` yields `"{f}-{k+1}"` for reducer `k`; reduce of bucket `b`
/// yields `"mr-out-{b}"`.
#[derive(Debug, Clone, Copy)]
pub struct SimulatedExecutor {
    map_duration: Duration,
    reduce_duration: Duration,
}

impl SimulatedExecutor {
    pub fn new(map_duration: Duration, reduce_duration: Duration) -> Self {
        Self {
            map_duration,
            reduce_duration,
        }
    }
}

pub fn map_output_locator(file: &str, reducer: usize) -> String {
    format!("{}-{}", file, reducer + 1)
}

pub fn reduce_output_locator(bucket: usize) -> String {
    format!("mr-out-{}", bucket)
}

#[async_trait]
impl TaskExecutor for SimulatedExecutor {
    async fn run_map(&self, task: &MapTask) -> Result<TaskOutputs, SchedulerError> {
        sleep(self.map_duration).await;
        Ok((0..task.reducer_count)
            .map(|reducer| (reducer, vec![map_output_locator(&task.file, reducer)]))
            .collect())
    }

    async fn run_reduce(&self, task: &ReduceTask) -> Result<String, SchedulerError> {
        sleep(self.reduce_duration).await;
        Ok(reduce_output_locator(task.bucket))
    }
}
