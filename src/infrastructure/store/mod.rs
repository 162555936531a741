//! Persistence seam for the ledger and assignment records.
//!
//! `TransactionStore` is the primary extension point: the in-memory
//! implementation backs tests and embedded use, the Postgres implementation
//! backs production. Both uphold the same contracts: ascending
//! `effective_at` order (stable by insertion for ties), globally unique
//! non-empty idempotency keys, and all-or-nothing batches.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::models::{Assignment, Transaction};
use crate::domain::time::TimePoint;
use crate::infrastructure::config::StoreConfig;
use crate::infrastructure::db::PgPool;
use crate::services::errors::EngineError;

pub use memory::{InMemoryAssignmentStore, InMemoryStore};
pub use postgres::{PostgresAssignmentStore, PostgresStore};

/// Append-only transaction persistence. No update or delete surface exists
/// on this trait by design; corrections happen through new transactions.
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Appends one transaction. Fails with `DuplicateIdempotencyKey` when
    /// the transaction carries a non-empty key that already exists.
    async fn append(&self, tx: Transaction) -> Result<(), EngineError>;

    /// Appends a batch atomically: if any key collides with the store or
    /// with another key inside the batch, nothing is written.
    async fn append_batch(&self, batch: Vec<Transaction>) -> Result<(), EngineError>;

    /// All transactions for (entity, policy), ordered by `effective_at`
    /// ascending, insertion order for ties.
    async fn load(&self, entity_id: &str, policy_id: &str)
        -> Result<Vec<Transaction>, EngineError>;

    /// Transactions within `[from, to]`, where `to` covers its whole
    /// granularity window (a day bound includes intra-day entries). Same
    /// ordering as [`TransactionStore::load`].
    async fn load_range(
        &self,
        entity_id: &str,
        policy_id: &str,
        from: TimePoint,
        to: TimePoint,
    ) -> Result<Vec<Transaction>, EngineError>;

    /// All transactions for an entity across policies within a range.
    async fn load_by_entity(
        &self,
        entity_id: &str,
        from: TimePoint,
        to: TimePoint,
    ) -> Result<Vec<Transaction>, EngineError>;

    async fn exists(&self, idempotency_key: &str) -> Result<bool, EngineError>;

    /// Id of an unreversed consumption recorded for (entity, resource) on
    /// `date`, for policies enforcing day-uniqueness.
    async fn consumption_on(
        &self,
        entity_id: &str,
        resource_type: &str,
        date: NaiveDate,
    ) -> Result<Option<Uuid>, EngineError>;
}

/// Extended store offering a scoped unit of work. Writes inside a session
/// become visible only at commit; a session dropped without commit leaves
/// no trace.
#[async_trait]
pub trait SessionStore: TransactionStore {
    async fn begin(&self) -> Result<Box<dyn StoreSession + '_>, EngineError>;
}

#[async_trait]
pub trait StoreSession: Send {
    async fn append(&mut self, tx: Transaction) -> Result<(), EngineError>;

    async fn commit(self: Box<Self>) -> Result<(), EngineError>;

    async fn rollback(self: Box<Self>) -> Result<(), EngineError>;
}

/// Assignment persistence: one row per entity-policy binding.
#[async_trait]
pub trait AssignmentStore: Send + Sync {
    async fn put(&self, assignment: Assignment) -> Result<(), EngineError>;

    async fn assignments_for(&self, entity_id: &str) -> Result<Vec<Assignment>, EngineError>;
}

pub fn build_store(
    config: &StoreConfig,
    pool: Option<PgPool>,
) -> anyhow::Result<Arc<dyn TransactionStore>> {
    match config.provider.as_str() {
        "memory" => Ok(Arc::new(InMemoryStore::new())),
        "postgres" => {
            let pool = pool.ok_or_else(|| {
                anyhow::anyhow!("postgres store provider requires a database pool")
            })?;
            Ok(Arc::new(PostgresStore::new(pool)))
        }
        other => anyhow::bail!("unsupported store provider: {other}"),
    }
}

pub fn build_assignment_store(
    config: &StoreConfig,
    pool: Option<PgPool>,
) -> anyhow::Result<Arc<dyn AssignmentStore>> {
    match config.provider.as_str() {
        "memory" => Ok(Arc::new(InMemoryAssignmentStore::new())),
        "postgres" => {
            let pool = pool.ok_or_else(|| {
                anyhow::anyhow!("postgres store provider requires a database pool")
            })?;
            Ok(Arc::new(PostgresAssignmentStore::new(pool)))
        }
        other => anyhow::bail!("unsupported store provider: {other}"),
    }
}
