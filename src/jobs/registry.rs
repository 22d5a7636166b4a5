//! Admission and status state machine over two bounded stores.

use super::types::{Admission, CorrelationId, Fingerprint, JobStatus, Outcome};
use crate::config::{Config, StoreBackend};
use crate::store::{self, BoundedStore, MemoryStore, PostgresStore, StoreError};
use std::num::NonZeroUsize;
use std::sync::Arc;

const DEDUP_NAMESPACE: &str = "processing";
const OUTCOME_NAMESPACE: &str = "result";

/// Tracks which fingerprint is in flight and what each finished job produced.
///
/// Job state is never stored explicitly. It is recovered from the two maps:
/// an id with a cached outcome is done; an id some fingerprint still points at is pending;
/// anything else is unknown.
pub struct JobRegistry {
    dedup_index: Arc<dyn BoundedStore<CorrelationId>>,
    outcomes: Arc<dyn BoundedStore<Outcome>>,
}

impl JobRegistry {
    /// Build a registry over explicit stores.
    pub fn new(
        dedup_index: Arc<dyn BoundedStore<CorrelationId>>,
        outcomes: Arc<dyn BoundedStore<Outcome>>,
    ) -> Self {
        Self {
            dedup_index,
            outcomes,
        }
    }

    /// Registry backed by in-process stores.
    pub fn in_memory(dedup_capacity: NonZeroUsize, result_capacity: NonZeroUsize) -> Self {
        Self::new(
            Arc::new(MemoryStore::<CorrelationId>::new(dedup_capacity)),
            Arc::new(MemoryStore::<Outcome>::new(result_capacity)),
        )
    }

    /// Registry backed by the shared Postgres table.
    pub fn postgres(
        pool: sqlx::PgPool,
        dedup_capacity: NonZeroUsize,
        result_capacity: NonZeroUsize,
    ) -> Self {
        Self::new(
            Arc::new(PostgresStore::<CorrelationId>::new(
                pool.clone(),
                DEDUP_NAMESPACE,
                dedup_capacity,
            )),
            Arc::new(PostgresStore::<Outcome>::new(
                pool,
                OUTCOME_NAMESPACE,
                result_capacity,
            )),
        )
    }

    /// Build the registry selected by configuration, connecting to Postgres when required.
    pub async fn from_config(config: &Config) -> Result<Self, StoreError> {
        match config.store_backend {
            StoreBackend::Memory => Ok(Self::in_memory(
                config.dedup_capacity,
                config.result_capacity,
            )),
            StoreBackend::Postgres => {
                let url = config.database_url.as_deref().unwrap_or_default();
                let pool = store::connect_pool(url).await?;
                tracing::info!("Connected job registry to Postgres");
                Ok(Self::postgres(
                    pool,
                    config.dedup_capacity,
                    config.result_capacity,
                ))
            }
        }
    }

    /// Return the id already registered for `fingerprint`, if it survives in the index.
    pub async fn try_admit(
        &self,
        fingerprint: &Fingerprint,
    ) -> Result<Option<CorrelationId>, StoreError> {
        self.dedup_index.get(fingerprint.as_str()).await
    }

    /// Point `fingerprint` at `id`.
    ///
    /// On its own this is not atomic with [`Self::try_admit`]; admission paths use
    /// [`Self::admit`], which performs both as one store operation.
    pub async fn register(
        &self,
        fingerprint: &Fingerprint,
        id: CorrelationId,
    ) -> Result<(), StoreError> {
        self.dedup_index.put(fingerprint.as_str(), id).await
    }

    /// Admit `fingerprint`: reuse the in-flight id, or mint and register a new one.
    ///
    /// Concurrent callers with the same fingerprint all observe the same id and exactly one
    /// of them receives [`Admission::Created`].
    pub async fn admit(&self, fingerprint: &Fingerprint) -> Result<Admission, StoreError> {
        let candidate = CorrelationId::mint();
        let admission = match self
            .dedup_index
            .put_if_absent(fingerprint.as_str(), candidate.clone())
            .await?
        {
            Some(existing) => Admission::Accepted(existing),
            None => Admission::Created(candidate),
        };
        tracing::debug!(
            fingerprint = %fingerprint,
            correlation_id = %admission.id(),
            created = admission.is_new(),
            "Admission decided"
        );
        Ok(admission)
    }

    /// Cache the terminal outcome of `id`. A second call overwrites the first.
    pub async fn record_outcome(
        &self,
        id: &CorrelationId,
        outcome: Outcome,
    ) -> Result<(), StoreError> {
        self.outcomes.put(id.as_str(), outcome).await
    }

    /// Report the state of `id`.
    ///
    /// The outcome cache is consulted first so a finished job reads as done even when its
    /// fingerprint mapping was evicted in the meantime.
    pub async fn query_status(&self, id: &CorrelationId) -> Result<JobStatus, StoreError> {
        if let Some(outcome) = self.outcomes.get(id.as_str()).await? {
            return Ok(JobStatus::Done(outcome));
        }
        if self.dedup_index.contains_value(id).await? {
            return Ok(JobStatus::Pending);
        }
        Ok(JobStatus::NotFound)
    }
}
