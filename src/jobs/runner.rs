//! Background execution of admitted jobs.

use super::registry::JobRegistry;
use super::types::{CorrelationId, Outcome};
use crate::metrics::JobMetrics;
use serde_json::Value;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinHandle};

/// Runs work off the request path and writes every result back to the registry.
///
/// Work that returns an error or panics is recorded as [`Outcome::Failure`], so no job is left
/// pending because its work went wrong. At most `max_concurrency` jobs execute at once; the
/// rest wait for a permit and stay pending meanwhile.
pub struct JobRunner {
    registry: Arc<JobRegistry>,
    metrics: Arc<JobMetrics>,
    permits: Arc<Semaphore>,
}

type Execution = JoinHandle<Result<Value, String>>;

impl JobRunner {
    /// Create a runner delivering outcomes to `registry`.
    pub fn new(registry: Arc<JobRegistry>, metrics: Arc<JobMetrics>, max_concurrency: usize) -> Self {
        Self {
            registry,
            metrics,
            permits: Arc::new(Semaphore::new(max_concurrency.max(1))),
        }
    }

    /// Run async work for `id` on the Tokio runtime.
    ///
    /// The returned handle resolves once the outcome has been recorded; dropping it does not
    /// cancel the job.
    pub fn submit<F, E>(&self, id: CorrelationId, work: F) -> JoinHandle<()>
    where
        F: Future<Output = Result<Value, E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        self.dispatch(id, move || {
            tokio::spawn(async move { work.await.map_err(|err| err.to_string()) })
        })
    }

    /// Run blocking work for `id` on the blocking thread pool.
    pub fn submit_blocking<F, E>(&self, id: CorrelationId, work: F) -> JoinHandle<()>
    where
        F: FnOnce() -> Result<Value, E> + Send + 'static,
        E: Display + Send + 'static,
    {
        self.dispatch(id, move || {
            tokio::task::spawn_blocking(move || work().map_err(|err| err.to_string()))
        })
    }

    /// Number of jobs that could start right now without waiting.
    pub fn available_slots(&self) -> usize {
        self.permits.available_permits()
    }

    fn dispatch<S>(&self, id: CorrelationId, start: S) -> JoinHandle<()>
    where
        S: FnOnce() -> Execution + Send + 'static,
    {
        let registry = Arc::clone(&self.registry);
        let metrics = Arc::clone(&self.metrics);
        let permits = Arc::clone(&self.permits);

        tokio::spawn(async move {
            // The semaphore is never closed, so acquisition only fails if that changes.
            let _permit = permits.acquire_owned().await.ok();
            tracing::debug!(correlation_id = %id, "Job started");

            let outcome = match start().await {
                Ok(Ok(payload)) => Outcome::Success(payload),
                Ok(Err(message)) => Outcome::Failure(message),
                Err(err) => Outcome::Failure(describe_join_error(err)),
            };
            deliver(&registry, &metrics, &id, outcome).await;
        })
    }
}

async fn deliver(registry: &JobRegistry, metrics: &JobMetrics, id: &CorrelationId, outcome: Outcome) {
    let success = outcome.is_success();
    if let Outcome::Failure(message) = &outcome {
        tracing::warn!(correlation_id = %id, error = %message, "Job failed");
    }

    match registry.record_outcome(id, outcome).await {
        Ok(()) => {
            metrics.record_completion(success);
            tracing::info!(correlation_id = %id, success, "Job finished");
        }
        Err(err) => {
            tracing::error!(
                correlation_id = %id,
                error = %err,
                "Failed to record job outcome; storing fallback failure"
            );
            metrics.record_completion(false);
            let fallback = Outcome::Failure(format!("failed to record job outcome: {err}"));
            if let Err(err) = registry.record_outcome(id, fallback).await {
                tracing::error!(
                    correlation_id = %id,
                    error = %err,
                    "Fallback outcome was not stored; job reads as pending until evicted"
                );
            }
        }
    }
}

fn describe_join_error(err: JoinError) -> String {
    if err.is_cancelled() {
        return "job was cancelled".to_string();
    }
    let panic = err.into_panic();
    let detail = panic
        .downcast_ref::<&str>()
        .map(|message| message.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string());
    format!("job panicked: {detail}")
}
