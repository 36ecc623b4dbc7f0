// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

pub mod config;
pub mod coordinator;
pub mod coordinator_client;
pub mod dispatcher;
pub mod error;
pub mod shutdown_signal;
pub mod task;
pub mod task_executor;
pub mod task_pool;
pub mod worker_loop;
pub mod worker_record;
