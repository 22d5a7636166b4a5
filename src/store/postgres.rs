//! Shared bounded store backed by Postgres.
//!
//! All stores share one table and are told apart by `namespace`. Entry age comes from a
//! `BIGSERIAL` assigned on first insertion; overwrites update `value` only. Every mutating
//! call runs in one transaction that first takes `pg_advisory_xact_lock` on the namespace, so
//! the check, the eviction and the insert are atomic across all processes sharing the table.

use super::{BoundedStore, StoreError};
use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgConnection, PgPool};
use std::marker::PhantomData;
use std::num::NonZeroUsize;

/// Connect to Postgres and make sure the backing table exists.
pub async fn connect_pool(url: &str) -> Result<PgPool, StoreError> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(url)
        .await?;
    ensure_schema(&pool).await?;
    Ok(pool)
}

/// Create the entries table and its age index when missing.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), StoreError> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS bounded_entries (
            namespace   TEXT NOT NULL,
            key         TEXT NOT NULL,
            value       JSONB NOT NULL,
            seq         BIGSERIAL NOT NULL,
            PRIMARY KEY (namespace, key)
        )",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_bounded_entries_age ON bounded_entries (namespace, seq)",
    )
    .execute(pool)
    .await?;
    tracing::debug!("Bounded store schema ensured");
    Ok(())
}

/// Bounded FIFO map stored in the `bounded_entries` table under one namespace.
pub struct PostgresStore<V> {
    pool: PgPool,
    namespace: String,
    capacity: NonZeroUsize,
    _value: PhantomData<fn() -> V>,
}

impl<V> PostgresStore<V> {
    /// Open the store for `namespace`. The schema must already exist (see [`ensure_schema`]).
    pub fn new(pool: PgPool, namespace: impl Into<String>, capacity: NonZeroUsize) -> Self {
        Self {
            pool,
            namespace: namespace.into(),
            capacity,
            _value: PhantomData,
        }
    }

    /// Namespace this store writes under.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn lock_namespace(&self, conn: &mut PgConnection) -> Result<(), StoreError> {
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1)::bigint)")
            .bind(&self.namespace)
            .execute(conn)
            .await?;
        Ok(())
    }

    /// Remove the oldest entries so one more key fits under capacity.
    async fn evict_for_insert(&self, conn: &mut PgConnection) -> Result<(), StoreError> {
        let evicted: Vec<(String,)> = sqlx::query_as(
            "DELETE FROM bounded_entries
             WHERE namespace = $1 AND seq IN (
                 SELECT seq FROM bounded_entries
                 WHERE namespace = $1
                 ORDER BY seq ASC
                 LIMIT GREATEST(
                     (SELECT COUNT(*) FROM bounded_entries WHERE namespace = $1) - $2 + 1,
                     0
                 )
             )
             RETURNING key",
        )
        .bind(&self.namespace)
        .bind(self.capacity.get() as i64)
        .fetch_all(conn)
        .await?;

        for (key,) in evicted {
            tracing::debug!(namespace = %self.namespace, key = %key, "Evicted oldest entry");
        }
        Ok(())
    }

    async fn insert(&self, conn: &mut PgConnection, key: &str, value: &Value) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO bounded_entries (namespace, key, value) VALUES ($1, $2, $3)")
            .bind(&self.namespace)
            .bind(key)
            .bind(value)
            .execute(conn)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl<V> BoundedStore<V> for PostgresStore<V>
where
    V: Clone + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    fn capacity(&self) -> usize {
        self.capacity.get()
    }

    async fn put(&self, key: &str, value: V) -> Result<(), StoreError> {
        let encoded = serde_json::to_value(&value)?;
        let mut tx = self.pool.begin().await?;
        self.lock_namespace(&mut tx).await?;

        let updated = sqlx::query(
            "UPDATE bounded_entries SET value = $3 WHERE namespace = $1 AND key = $2",
        )
        .bind(&self.namespace)
        .bind(key)
        .bind(&encoded)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated == 0 {
            self.evict_for_insert(&mut tx).await?;
            self.insert(&mut tx, key, &encoded).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn put_if_absent(&self, key: &str, value: V) -> Result<Option<V>, StoreError> {
        let encoded = serde_json::to_value(&value)?;
        let mut tx = self.pool.begin().await?;
        self.lock_namespace(&mut tx).await?;

        let existing: Option<(Value,)> = sqlx::query_as(
            "SELECT value FROM bounded_entries WHERE namespace = $1 AND key = $2",
        )
        .bind(&self.namespace)
        .bind(key)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some((stored,)) = existing {
            tx.commit().await?;
            return Ok(Some(serde_json::from_value(stored)?));
        }

        self.evict_for_insert(&mut tx).await?;
        self.insert(&mut tx, key, &encoded).await?;
        tx.commit().await?;
        Ok(None)
    }

    async fn get(&self, key: &str) -> Result<Option<V>, StoreError> {
        let row: Option<(Value,)> = sqlx::query_as(
            "SELECT value FROM bounded_entries WHERE namespace = $1 AND key = $2",
        )
        .bind(&self.namespace)
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|(stored,)| serde_json::from_value(stored))
            .transpose()
            .map_err(StoreError::from)
    }

    async fn contains_value(&self, value: &V) -> Result<bool, StoreError> {
        let encoded = serde_json::to_value(value)?;
        let (found,): (bool,) = sqlx::query_as(
            "SELECT EXISTS (SELECT 1 FROM bounded_entries WHERE namespace = $1 AND value = $2)",
        )
        .bind(&self.namespace)
        .bind(&encoded)
        .fetch_one(&self.pool)
        .await?;
        Ok(found)
    }

    async fn keys_with_value(&self, value: &V) -> Result<Vec<String>, StoreError> {
        let encoded = serde_json::to_value(value)?;
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT key FROM bounded_entries WHERE namespace = $1 AND value = $2 ORDER BY seq ASC",
        )
        .bind(&self.namespace)
        .bind(&encoded)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(key,)| key).collect())
    }

    async fn len(&self) -> Result<usize, StoreError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM bounded_entries WHERE namespace = $1")
                .bind(&self.namespace)
                .fetch_one(&self.pool)
                .await?;
        Ok(count.max(0) as usize)
    }
}
