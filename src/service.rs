//! Job service coordinating admission, extraction work, and status reads.

use crate::config::Config;
use crate::extraction::{ExtractionError, Extractor, FileSource, OnlineSource, TextExtractor};
use crate::jobs::{Admission, CorrelationId, Fingerprint, JobRegistry, JobRunner, JobStatus};
use crate::metrics::{JobMetrics, MetricsSnapshot};
use crate::store::StoreError;
use async_trait::async_trait;
use serde_json::Value;
use std::fmt::Display;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while assembling the service at startup.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The configured storage backend could not be reached.
    #[error("Failed to open job store: {0}")]
    Store(#[from] StoreError),
    /// The extractor could not be constructed.
    #[error("Failed to build extractor: {0}")]
    Extractor(#[from] ExtractionError),
}

/// Abstraction over the job service used by the HTTP surface.
#[async_trait]
pub trait JobsApi: Send + Sync {
    /// Admit an online extraction, starting it unless an identical one is in flight.
    async fn submit_online(&self, source: OnlineSource) -> Result<Admission, StoreError>;

    /// Admit an extraction of a spooled upload. The upload is discarded when no job starts.
    async fn submit_file(&self, source: FileSource) -> Result<Admission, StoreError>;

    /// Current state of a job.
    async fn status(&self, id: &CorrelationId) -> Result<JobStatus, StoreError>;

    /// Retrieve the current metrics snapshot for diagnostics.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

/// Owns the registry, the runner, and the extractor behind every job.
///
/// Construct once near process start and share through an `Arc`; handlers never reach the
/// registry through global state.
pub struct JobService {
    registry: Arc<JobRegistry>,
    runner: JobRunner,
    metrics: Arc<JobMetrics>,
    extractor: Arc<dyn Extractor>,
}

impl JobService {
    /// Assemble a service over an existing registry and extractor.
    pub fn new(
        registry: Arc<JobRegistry>,
        extractor: Arc<dyn Extractor>,
        max_concurrency: usize,
    ) -> Self {
        let metrics = Arc::new(JobMetrics::new());
        let runner = JobRunner::new(Arc::clone(&registry), Arc::clone(&metrics), max_concurrency);
        Self {
            registry,
            runner,
            metrics,
            extractor,
        }
    }

    /// Build the service described by configuration.
    pub async fn from_config(config: &Config) -> Result<Self, ServiceError> {
        tracing::info!(backend = ?config.store_backend, "Initializing job registry");
        let registry = Arc::new(JobRegistry::from_config(config).await?);
        let extractor = Arc::new(TextExtractor::new(config.chunk_size)?);
        Ok(Self::new(registry, extractor, config.max_concurrency))
    }

    /// Registry shared with the runner.
    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    /// Admit `fingerprint` and, when it is new, run `work` in the background.
    ///
    /// The id is registered before the work is spawned, so a duplicate arriving while the job
    /// runs always finds it.
    pub async fn submit<F, E>(&self, fingerprint: &Fingerprint, work: F) -> Result<Admission, StoreError>
    where
        F: Future<Output = Result<Value, E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let admission = self.registry.admit(fingerprint).await?;
        match &admission {
            Admission::Created(id) => {
                self.metrics.record_submitted();
                tracing::info!(fingerprint = %fingerprint, correlation_id = %id, "Job admitted");
                self.runner.submit(id.clone(), work);
            }
            Admission::Accepted(id) => {
                self.metrics.record_deduplicated();
                tracing::info!(
                    fingerprint = %fingerprint,
                    correlation_id = %id,
                    "Duplicate submission; returning in-flight job"
                );
            }
        }
        Ok(admission)
    }
}

#[async_trait]
impl JobsApi for JobService {
    async fn submit_online(&self, source: OnlineSource) -> Result<Admission, StoreError> {
        let fingerprint = source.fingerprint();
        let extractor = Arc::clone(&self.extractor);
        self.submit(&fingerprint, async move { extractor.extract_online(source).await })
            .await
    }

    async fn submit_file(&self, source: FileSource) -> Result<Admission, StoreError> {
        let fingerprint = source.fingerprint();
        let path = source.path.clone();
        let extractor = Arc::clone(&self.extractor);
        let result = self
            .submit(&fingerprint, async move { extractor.extract_file(source).await })
            .await;
        if !matches!(result, Ok(Admission::Created(_))) {
            discard_upload(&path).await;
        }
        result
    }

    async fn status(&self, id: &CorrelationId) -> Result<JobStatus, StoreError> {
        self.registry.query_status(id).await
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

async fn discard_upload(path: &Path) {
    if let Err(err) = tokio::fs::remove_file(path).await {
        tracing::warn!(path = %path.display(), error = %err, "Failed to discard spooled upload");
    }
}
