// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use crate::error::SchedulerError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::time::Duration;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Config {
    /// Map inputs in priority order
    pub input_files: Vec<String>,
    pub num_reducers: usize,
    pub num_workers: usize,
    /// Interval between two heartbeats of an idle worker
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_ms: u64,
    /// Simulated one-way latency of every coordinator call
    #[serde(default = "default_network_delay")]
    pub network_delay_ms: u64,
    /// Upper bound of random latency added on top of `network_delay_ms`
    #[serde(default)]
    pub network_jitter_ms: u64,
    #[serde(default = "default_map_duration")]
    pub map_duration_ms: u64,
    #[serde(default = "default_reduce_duration")]
    pub reduce_duration_ms: u64,
    /// Deadline for a single coordinator call, after which the worker retries
    #[serde(default = "default_rpc_timeout")]
    pub rpc_timeout_ms: u64,
    /// Reassign work held longer than this (0 = never reassign)
    #[serde(default)]
    pub task_timeout_ms: u64,
    /// Stop after this long even if work remains (0 = run until drained)
    #[serde(default)]
    pub run_duration_ms: u64,
    /// How long workers get to finish their current task once stopped
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_ms: u64,
}

fn default_heartbeat_interval() -> u64 {
    10_000
}

fn default_network_delay() -> u64 {
    2_000
}

fn default_map_duration() -> u64 {
    12_000
}

fn default_reduce_duration() -> u64 {
    22_000
}

fn default_rpc_timeout() -> u64 {
    30_000
}

fn default_shutdown_grace() -> u64 {
    30_000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input_files: vec!["a".into(), "b".into(), "c".into(), "d".into()],
            num_reducers: 3,
            num_workers: 5,
            heartbeat_interval_ms: default_heartbeat_interval(),
            network_delay_ms: default_network_delay(),
            network_jitter_ms: 0,
            map_duration_ms: default_map_duration(),
            reduce_duration_ms: default_reduce_duration(),
            rpc_timeout_ms: default_rpc_timeout(),
            task_timeout_ms: 0,
            run_duration_ms: 0,
            shutdown_grace_ms: default_shutdown_grace(),
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self, SchedulerError> {
        let contents = fs::read_to_string(path).map_err(|source| SchedulerError::ConfigRead {
            path: path.to_string(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| SchedulerError::ConfigParse {
            path: path.to_string(),
            source,
        })
    }

    /// Startup validation. Any error here is fatal for the process.
    pub fn validate(&self) -> Result<(), SchedulerError> {
        if self.num_reducers == 0 {
            return Err(SchedulerError::InvalidConfig(
                "num_reducers must be at least 1".to_string(),
            ));
        }
        if self.num_workers == 0 {
            return Err(SchedulerError::InvalidConfig(
                "num_workers must be at least 1".to_string(),
            ));
        }
        if self.input_files.is_empty() {
            return Err(SchedulerError::InvalidConfig(
                "input_files must not be empty".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        if let Some(duplicate) = self.input_files.iter().find(|file| !seen.insert(*file)) {
            return Err(SchedulerError::InvalidConfig(format!(
                "input file '{}' listed more than once",
                duplicate
            )));
        }
        if self.heartbeat_interval_ms == 0 {
            return Err(SchedulerError::InvalidConfig(
                "heartbeat_interval_ms must be positive".to_string(),
            ));
        }
        if self.rpc_timeout_ms == 0 {
            return Err(SchedulerError::InvalidConfig(
                "rpc_timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn network_delay(&self) -> Duration {
        Duration::from_millis(self.network_delay_ms)
    }

    pub fn network_jitter(&self) -> Duration {
        Duration::from_millis(self.network_jitter_ms)
    }

    pub fn map_duration(&self) -> Duration {
        Duration::from_millis(self.map_duration_ms)
    }

    pub fn reduce_duration(&self) -> Duration {
        Duration::from_millis(self.reduce_duration_ms)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }

    pub fn task_timeout(&self) -> Option<Duration> {
        (self.task_timeout_ms > 0).then(|| Duration::from_millis(self.task_timeout_ms))
    }

    pub fn run_duration(&self) -> Option<Duration> {
        (self.run_duration_ms > 0).then(|| Duration::from_millis(self.run_duration_ms))
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub fn print_summary(&self) {
        tracing::info!(
            inputs = self.input_files.len(),
            reducers = self.num_reducers,
            workers = self.num_workers,
            heartbeat_ms = self.heartbeat_interval_ms,
            network_delay_ms = self.network_delay_ms,
            map_ms = self.map_duration_ms,
            reduce_ms = self.reduce_duration_ms,
            task_timeout_ms = self.task_timeout_ms,
            run_duration_ms = self.run_duration_ms,
            "scheduler configuration"
        );
    }
}
