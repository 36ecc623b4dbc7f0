// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use crate::coordinator::{Coordinator, CoordinatorStats};
use crate::error::SchedulerError;
use crate::task::{CompletionReport, Heartbeat, ScheduleReply, WorkerId};
use crate::task_pool::JobPhase;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};

/// Request/response surface of the coordinator as seen by a worker.
/// Abstracts the transport (shared memory, actor channel, network, etc.)
///
/// Errors are transport failures only; the coordinator itself never rejects a
/// heartbeat or a report.
#[async_trait]
pub trait CoordinatorClient: Clone + Send + Sync + 'static {
    async fn register_worker(&self) -> Result<WorkerId, SchedulerError>;

    async fn schedule(&self, heartbeat: Heartbeat) -> Result<ScheduleReply, SchedulerError>;

    async fn report_completion(&self, report: CompletionReport) -> Result<(), SchedulerError>;

    async fn stats(&self) -> Result<CoordinatorStats, SchedulerError>;
}

/// In-process coordinator behind a single async mutex
#[derive(Clone)]
pub struct SharedCoordinator {
    inner: Arc<Mutex<Coordinator>>,
    phase_rx: watch::Receiver<JobPhase>,
}

impl SharedCoordinator {
    pub fn new(coordinator: Coordinator) -> Self {
        let phase_rx = coordinator.subscribe();
        Self {
            inner: Arc::new(Mutex::new(coordinator)),
            phase_rx,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<JobPhase> {
        self.phase_rx.clone()
    }

    /// Run `f` with exclusive access to the coordinator
    pub async fn with<R>(&self, f: impl FnOnce(&mut Coordinator) -> R) -> R {
        let mut coordinator = self.inner.lock().await;
        f(&mut coordinator)
    }
}

#[async_trait]
impl CoordinatorClient for SharedCoordinator {
    async fn register_worker(&self) -> Result<WorkerId, SchedulerError> {
        Ok(self.inner.lock().await.register_worker())
    }

    async fn schedule(&self, heartbeat: Heartbeat) -> Result<ScheduleReply, SchedulerError> {
        Ok(self.inner.lock().await.schedule(heartbeat))
    }

    async fn report_completion(&self, report: CompletionReport) -> Result<(), SchedulerError> {
        self.inner.lock().await.report_completion(report);
        Ok(())
    }

    async fn stats(&self) -> Result<CoordinatorStats, SchedulerError> {
        Ok(self.inner.lock().await.stats())
    }
}
