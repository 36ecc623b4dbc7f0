// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use crate::task::{Assignment, WorkerId, WorkerStatus};
use tokio::time::Instant;

/// Coordinator-side view of one worker. Created on first contact, never removed.
#[derive(Debug, Clone)]
pub struct WorkerRecord {
    pub id: WorkerId,
    pub status: WorkerStatus,
    /// Either a map task, a reduce task, or nothing; never both
    pub current: Assignment,
    pub last_heartbeat: Instant,
    pub assigned_at: Option<Instant>,
}

impl WorkerRecord {
    pub fn new(id: WorkerId, now: Instant) -> Self {
        Self {
            id,
            status: WorkerStatus::Idle,
            current: Assignment::Idle,
            last_heartbeat: now,
            assigned_at: None,
        }
    }

    pub fn assign(&mut self, assignment: Assignment, now: Instant) {
        self.status = assignment.assigned_status();
        self.current = assignment;
        self.assigned_at = Some(now);
    }

    /// Drop the current assignment and return it
    pub fn clear(&mut self) -> Assignment {
        self.status = WorkerStatus::Idle;
        self.assigned_at = None;
        std::mem::take(&mut self.current)
    }

    /// Whether the current assignment was handed out more than `timeout` before `now`
    pub fn is_stale(&self, now: Instant, timeout: std::time::Duration) -> bool {
        match self.assigned_at {
            Some(assigned_at) if !self.current.is_idle() => {
                now.saturating_duration_since(assigned_at) > timeout
            }
            _ => false,
        }
    }
}
