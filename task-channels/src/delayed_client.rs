// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use async_trait::async_trait;
use rand::Rng;
use scheduler_core::coordinator::CoordinatorStats;
use scheduler_core::coordinator_client::CoordinatorClient;
use scheduler_core::error::SchedulerError;
use scheduler_core::task::{CompletionReport, Heartbeat, ScheduleReply, WorkerId};
use std::time::Duration;
use tokio::time::sleep;

/// Wrapper that simulates network latency on every worker call.
/// Stats requests pass through without delay.
#[derive(Clone)]
pub struct DelayedClient<C: CoordinatorClient> {
    inner: C,
    delay: Duration,
    jitter: Duration,
}

impl<C: CoordinatorClient> DelayedClient<C> {
    pub fn new(inner: C, delay: Duration, jitter: Duration) -> Self {
        Self {
            inner,
            delay,
            jitter,
        }
    }

    /// Fixed delay plus a random share of the jitter
    fn latency(&self) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return self.delay;
        }
        self.delay + Duration::from_millis(rand::rng().random_range(0..=jitter_ms))
    }
}

#[async_trait]
impl<C: CoordinatorClient> CoordinatorClient for DelayedClient<C> {
    async fn register_worker(&self) -> Result<WorkerId, SchedulerError> {
        sleep(self.latency()).await;
        self.inner.register_worker().await
    }

    async fn schedule(&self, heartbeat: Heartbeat) -> Result<ScheduleReply, SchedulerError> {
        sleep(self.latency()).await;
        self.inner.schedule(heartbeat).await
    }

    async fn report_completion(&self, report: CompletionReport) -> Result<(), SchedulerError> {
        sleep(self.latency()).await;
        self.inner.report_completion(report).await
    }

    async fn stats(&self) -> Result<CoordinatorStats, SchedulerError> {
        self.inner.stats().await
    }
}
