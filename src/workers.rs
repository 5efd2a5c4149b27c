//! Bounded dispatch for collaborator calls.
//!
//! Tokenization, embedding, vector search, model inference, and file loading
//! all go through a [`WorkerPool`] so the request-accepting path never waits
//! on them directly. A semaphore caps how many calls are in flight and every
//! call carries its own timeout. On timeout the caller gets [`TimedOut`]:
//! async work is aborted, blocking work is detached and left to finish on
//! its own thread. A detached blocking call keeps its slot until its thread
//! returns.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use tokio::sync::Semaphore;

use crate::config::WorkersConfig;
use crate::error::TimedOut;

#[derive(Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
}

impl WorkerPool {
    pub fn new(config: &WorkersConfig) -> Self {
        Self::with_capacity(config.max_blocking)
    }

    pub fn with_capacity(max_in_flight: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_in_flight.max(1))),
        }
    }

    /// Run a blocking closure on the blocking thread pool.
    ///
    /// The outer `Result` reports the timeout; the inner one carries the
    /// closure's own failure (or a panic, as an error).
    pub async fn run_blocking<T, F>(
        &self,
        label: &str,
        timeout: Duration,
        f: F,
    ) -> Result<Result<T>, TimedOut>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let permits = self.permits.clone();
        let work = async move {
            let permit = permits
                .acquire_owned()
                .await
                .map_err(|_| anyhow!("worker pool closed"))?;
            // The permit travels with the thread so a detached call still counts.
            let job = move || {
                let _permit = permit;
                f()
            };
            match tokio::task::spawn_blocking(job).await {
                Ok(result) => result,
                Err(e) => Err(anyhow!("worker panicked: {}", e)),
            }
        };

        match tokio::time::timeout(timeout, work).await {
            Ok(result) => Ok(result),
            Err(_) => {
                tracing::warn!(label, ?timeout, "blocking call timed out; detaching worker");
                Err(TimedOut {
                    label: label.to_string(),
                    after: timeout,
                })
            }
        }
    }

    /// Run a future as its own task, aborting it on timeout.
    pub async fn run<T, Fut>(&self, label: &str, timeout: Duration, fut: Fut) -> Result<Result<T>, TimedOut>
    where
        T: Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let permits = self.permits.clone();
        let handle = tokio::spawn(async move {
            let _permit = permits
                .acquire_owned()
                .await
                .map_err(|_| anyhow!("worker pool closed"))?;
            fut.await
        });
        let abort = handle.abort_handle();

        match tokio::time::timeout(timeout, handle).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(e)) => Ok(Err(anyhow!("worker task failed: {}", e))),
            Err(_) => {
                abort.abort();
                tracing::warn!(label, ?timeout, "call timed out; task aborted");
                Err(TimedOut {
                    label: label.to_string(),
                    after: timeout,
                })
            }
        }
    }
}
