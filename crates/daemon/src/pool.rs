// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded worker pool for per-tick stage dispatch.
//!
//! One task per claimed job, at most `max` running at once. Workers return
//! nothing; stage failures are recorded in the job row, not propagated here.

use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    tasks: JoinSet<()>,
}

impl WorkerPool {
    pub fn new(max: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max.max(1))),
            tasks: JoinSet::new(),
        }
    }

    /// Queue one worker. Blocks only until a pool slot is reserved.
    pub async fn dispatch<F>(&mut self, work: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        // The semaphore is never closed while the pool is alive.
        let Ok(permit) = self.semaphore.clone().acquire_owned().await else {
            return;
        };
        self.tasks.spawn(async move {
            let _permit = permit;
            work.await;
        });
    }

    /// Await every dispatched worker.
    pub async fn join_all(&mut self) {
        while let Some(result) = self.tasks.join_next().await {
            if let Err(err) = result {
                tracing::error!(error = %err, "stage worker task failed");
            }
        }
    }
}

#[cfg(test)]
#[path = "pool_tests.rs"]
mod tests;
