// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use async_trait::async_trait;
use scheduler_core::coordinator::{Coordinator, CoordinatorStats};
use scheduler_core::coordinator_client::CoordinatorClient;
use scheduler_core::error::SchedulerError;
use scheduler_core::task::{CompletionReport, Heartbeat, ScheduleReply, WorkerId};
use scheduler_core::task_pool::JobPhase;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::debug;

pub enum CoordinatorRequest {
    Register {
        reply: oneshot::Sender<WorkerId>,
    },
    Schedule {
        heartbeat: Heartbeat,
        reply: oneshot::Sender<ScheduleReply>,
    },
    Report {
        report: CompletionReport,
        reply: oneshot::Sender<()>,
    },
    Stats {
        reply: oneshot::Sender<CoordinatorStats>,
    },
}

/// Owns the coordinator on a single task and applies requests in arrival order
pub struct ChannelCoordinator {
    coordinator: Coordinator,
    rx: mpsc::Receiver<CoordinatorRequest>,
}

impl ChannelCoordinator {
    /// Start the actor. It runs until every client clone is dropped, then
    /// hands the coordinator back through the join handle.
    pub fn spawn(
        coordinator: Coordinator,
        capacity: usize,
    ) -> (
        ChannelCoordinatorClient,
        watch::Receiver<JobPhase>,
        JoinHandle<Coordinator>,
    ) {
        let (tx, rx) = mpsc::channel(capacity);
        let phase_rx = coordinator.subscribe();
        let actor = Self { coordinator, rx };
        let handle = tokio::spawn(actor.run());
        (ChannelCoordinatorClient { tx }, phase_rx, handle)
    }

    async fn run(mut self) -> Coordinator {
        while let Some(request) = self.rx.recv().await {
            self.handle(request);
        }
        debug!("all coordinator clients dropped, actor stopping");
        self.coordinator
    }

    fn handle(&mut self, request: CoordinatorRequest) {
        // A dropped reply receiver means the caller gave up; the state change still stands
        match request {
            CoordinatorRequest::Register { reply } => {
                let _ = reply.send(self.coordinator.register_worker());
            }
            CoordinatorRequest::Schedule { heartbeat, reply } => {
                let _ = reply.send(self.coordinator.schedule(heartbeat));
            }
            CoordinatorRequest::Report { report, reply } => {
                self.coordinator.report_completion(report);
                let _ = reply.send(());
            }
            CoordinatorRequest::Stats { reply } => {
                let _ = reply.send(self.coordinator.stats());
            }
        }
    }
}

#[derive(Clone)]
pub struct ChannelCoordinatorClient {
    tx: mpsc::Sender<CoordinatorRequest>,
}

impl ChannelCoordinatorClient {
    async fn call<R>(
        &self,
        request: impl FnOnce(oneshot::Sender<R>) -> CoordinatorRequest,
    ) -> Result<R, SchedulerError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx.send(request(reply_tx)).await.map_err(|_| {
            SchedulerError::CoordinatorUnavailable("request channel closed".to_string())
        })?;
        reply_rx.await.map_err(|_| {
            SchedulerError::CoordinatorUnavailable("coordinator dropped the request".to_string())
        })
    }
}

#[async_trait]
impl CoordinatorClient for ChannelCoordinatorClient {
    async fn register_worker(&self) -> Result<WorkerId, SchedulerError> {
        self.call(|reply| CoordinatorRequest::Register { reply }).await
    }

    async fn schedule(&self, heartbeat: Heartbeat) -> Result<ScheduleReply, SchedulerError> {
        self.call(|reply| CoordinatorRequest::Schedule { heartbeat, reply }).await
    }

    async fn report_completion(&self, report: CompletionReport) -> Result<(), SchedulerError> {
        self.call(|reply| CoordinatorRequest::Report { report, reply }).await
    }

    async fn stats(&self) -> Result<CoordinatorStats, SchedulerError> {
        self.call(|reply| CoordinatorRequest::Stats { reply }).await
    }
}
