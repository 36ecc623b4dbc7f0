// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use thiserror::Error;

/// Errors surfaced by the scheduler.
///
/// Coordinator-side inconsistencies (duplicate or late completion reports,
/// unknown worker ids) never show up here: they are absorbed as no-ops.
/// What remains is startup validation, transport failures between a worker
/// and the coordinator, and task bodies that could not finish.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to read config file '{path}': {source}")]
    ConfigRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {source}")]
    ConfigParse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("coordinator unavailable: {0}")]
    CoordinatorUnavailable(String),

    #[error("coordinator call timed out after {0:?}")]
    RpcTimeout(std::time::Duration),

    #[error("task failed: {0}")]
    TaskFailed(String),
}

impl SchedulerError {
    /// Transport-level failures are retried by the worker on its next heartbeat
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SchedulerError::CoordinatorUnavailable(_) | SchedulerError::RpcTimeout(_)
        )
    }
}
