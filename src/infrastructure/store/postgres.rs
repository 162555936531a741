use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::Row;
use std::collections::HashSet;
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::amount::{Amount, Unit};
use crate::domain::models::{Assignment, Transaction, TransactionType};
use crate::domain::time::{Granularity, TimePoint};
use crate::infrastructure::db::PgPool;
use crate::services::errors::EngineError;

use super::{AssignmentStore, SessionStore, StoreSession, TransactionStore};

const SELECT_COLUMNS: &str = "id, entity_id, policy_id, resource_type, effective_at, granularity, \
     delta_value, delta_unit, kind, reference_id, reason, idempotency_key, metadata, created_by, created_at";

/// SQL-backed store. The schema carries a partial unique index on non-empty
/// idempotency keys and a composite index on (entity_id, policy_id,
/// effective_at); a bigserial `seq` column makes tie ordering stable by
/// insertion.
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

async fn insert_transaction<'e, E>(executor: E, tx: &Transaction) -> Result<(), EngineError>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    sqlx::query(
        "INSERT INTO ledger_transactions \
             (id, entity_id, policy_id, resource_type, effective_at, granularity, delta_value, \
              delta_unit, kind, reference_id, reason, idempotency_key, metadata, created_by, created_at) \
         VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15)",
    )
    .bind(tx.id)
    .bind(&tx.entity_id)
    .bind(&tx.policy_id)
    .bind(&tx.resource_type)
    .bind(tx.effective_at.instant())
    .bind(tx.effective_at.granularity().as_str())
    .bind(tx.delta.value)
    .bind(tx.delta.unit.as_str())
    .bind(tx.kind.as_str())
    .bind(tx.reference_id.as_deref())
    .bind(&tx.reason)
    .bind(tx.dedup_key())
    .bind(tx.metadata.as_ref())
    .bind(&tx.created_by)
    .bind(tx.created_at)
    .execute(executor)
    .await
    .map_err(|err| map_insert_error(err, tx))?;
    Ok(())
}

fn map_insert_error(err: sqlx::Error, tx: &Transaction) -> EngineError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            return EngineError::DuplicateIdempotencyKey {
                key: tx.dedup_key().unwrap_or("unknown").to_string(),
            };
        }
    }
    EngineError::from(err)
}

fn reject_internal_duplicates(batch: &[Transaction]) -> Result<(), EngineError> {
    let mut seen: HashSet<&str> = HashSet::new();
    for tx in batch {
        if let Some(key) = tx.dedup_key() {
            if !seen.insert(key) {
                return Err(EngineError::DuplicateIdempotencyKey {
                    key: key.to_string(),
                });
            }
        }
    }
    Ok(())
}

#[async_trait]
impl TransactionStore for PostgresStore {
    async fn append(&self, tx: Transaction) -> Result<(), EngineError> {
        insert_transaction(&self.pool, &tx).await
    }

    async fn append_batch(&self, batch: Vec<Transaction>) -> Result<(), EngineError> {
        reject_internal_duplicates(&batch)?;
        let mut db_tx = self.pool.begin().await.map_err(EngineError::from)?;
        for tx in &batch {
            insert_transaction(db_tx.as_mut(), tx).await?;
        }
        db_tx.commit().await.map_err(EngineError::from)?;
        Ok(())
    }

    async fn load(
        &self,
        entity_id: &str,
        policy_id: &str,
    ) -> Result<Vec<Transaction>, EngineError> {
        let rows = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM ledger_transactions \
             WHERE entity_id = $1 AND policy_id = $2 \
             ORDER BY effective_at ASC, seq ASC"
        ))
        .bind(entity_id)
        .bind(policy_id)
        .fetch_all(&self.pool)
        .await
        .map_err(EngineError::from)?;

        rows.into_iter().map(map_transaction).collect()
    }

    async fn load_range(
        &self,
        entity_id: &str,
        policy_id: &str,
        from: TimePoint,
        to: TimePoint,
    ) -> Result<Vec<Transaction>, EngineError> {
        let rows = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM ledger_transactions \
             WHERE entity_id = $1 AND policy_id = $2 \
               AND effective_at >= $3 AND effective_at < $4 \
             ORDER BY effective_at ASC, seq ASC"
        ))
        .bind(entity_id)
        .bind(policy_id)
        .bind(from.instant())
        .bind(to.window_end())
        .fetch_all(&self.pool)
        .await
        .map_err(EngineError::from)?;

        rows.into_iter().map(map_transaction).collect()
    }

    async fn load_by_entity(
        &self,
        entity_id: &str,
        from: TimePoint,
        to: TimePoint,
    ) -> Result<Vec<Transaction>, EngineError> {
        let rows = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM ledger_transactions \
             WHERE entity_id = $1 AND effective_at >= $2 AND effective_at < $3 \
             ORDER BY effective_at ASC, seq ASC"
        ))
        .bind(entity_id)
        .bind(from.instant())
        .bind(to.window_end())
        .fetch_all(&self.pool)
        .await
        .map_err(EngineError::from)?;

        rows.into_iter().map(map_transaction).collect()
    }

    async fn exists(&self, idempotency_key: &str) -> Result<bool, EngineError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM ledger_transactions WHERE idempotency_key = $1)",
        )
        .bind(idempotency_key)
        .fetch_one(&self.pool)
        .await
        .map_err(EngineError::from)?;
        Ok(exists)
    }

    async fn consumption_on(
        &self,
        entity_id: &str,
        resource_type: &str,
        date: NaiveDate,
    ) -> Result<Option<Uuid>, EngineError> {
        let id: Option<Uuid> = sqlx::query_scalar(
            "SELECT c.id FROM ledger_transactions c \
             WHERE c.entity_id = $1 AND c.resource_type = $2 AND c.kind = 'consumption' \
               AND c.effective_at >= $3 AND c.effective_at < $4 \
               AND NOT EXISTS ( \
                   SELECT 1 FROM ledger_transactions r \
                   WHERE r.kind = 'reversal' AND r.reference_id = c.id::text) \
             ORDER BY c.seq ASC LIMIT 1",
        )
        .bind(entity_id)
        .bind(resource_type)
        .bind(date.and_hms_opt(0, 0, 0).unwrap_or_default())
        .bind(
            date.succ_opt()
                .unwrap_or(date)
                .and_hms_opt(0, 0, 0)
                .unwrap_or_default(),
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(EngineError::from)?;
        Ok(id)
    }
}

#[async_trait]
impl SessionStore for PostgresStore {
    async fn begin(&self) -> Result<Box<dyn StoreSession + '_>, EngineError> {
        let db_tx = self.pool.begin().await.map_err(EngineError::from)?;
        Ok(Box::new(PostgresSession { db_tx }))
    }
}

struct PostgresSession {
    db_tx: sqlx::Transaction<'static, sqlx::Postgres>,
}

#[async_trait]
impl StoreSession for PostgresSession {
    async fn append(&mut self, tx: Transaction) -> Result<(), EngineError> {
        insert_transaction(self.db_tx.as_mut(), &tx).await
    }

    async fn commit(self: Box<Self>) -> Result<(), EngineError> {
        self.db_tx.commit().await.map_err(EngineError::from)
    }

    async fn rollback(self: Box<Self>) -> Result<(), EngineError> {
        self.db_tx.rollback().await.map_err(EngineError::from)
    }
}

fn map_transaction(row: PgRow) -> Result<Transaction, EngineError> {
    let granularity = parse_field::<Granularity>(&row, "granularity")?;
    let instant: chrono::NaiveDateTime = row.try_get("effective_at").map_err(EngineError::from)?;
    let unit = parse_field::<Unit>(&row, "delta_unit")?;
    let value: Decimal = row.try_get("delta_value").map_err(EngineError::from)?;

    Ok(Transaction {
        id: row.try_get("id").map_err(EngineError::from)?,
        entity_id: row.try_get("entity_id").map_err(EngineError::from)?,
        policy_id: row.try_get("policy_id").map_err(EngineError::from)?,
        resource_type: row.try_get("resource_type").map_err(EngineError::from)?,
        effective_at: TimePoint::new(instant, granularity),
        delta: Amount::new(value, unit),
        kind: parse_field::<TransactionType>(&row, "kind")?,
        reference_id: row.try_get("reference_id").map_err(EngineError::from)?,
        reason: row.try_get("reason").map_err(EngineError::from)?,
        idempotency_key: row.try_get("idempotency_key").map_err(EngineError::from)?,
        metadata: row.try_get("metadata").map_err(EngineError::from)?,
        created_by: row.try_get("created_by").map_err(EngineError::from)?,
        created_at: row.try_get("created_at").map_err(EngineError::from)?,
    })
}

fn parse_field<T>(row: &PgRow, column: &str) -> Result<T, EngineError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw: String = row.try_get(column).map_err(EngineError::from)?;
    raw.parse::<T>()
        .map_err(|err| EngineError::store(format!("bad {column} value {raw:?}: {err}")))
}

/// SQL-backed assignment rows.
pub struct PostgresAssignmentStore {
    pool: PgPool,
}

impl PostgresAssignmentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AssignmentStore for PostgresAssignmentStore {
    async fn put(&self, assignment: Assignment) -> Result<(), EngineError> {
        sqlx::query(
            "INSERT INTO assignments \
                 (id, entity_id, policy_id, priority, allow_negative, requires_approval, \
                  active_from, active_to, created_at) \
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9)",
        )
        .bind(assignment.id)
        .bind(&assignment.entity_id)
        .bind(&assignment.policy_id)
        .bind(assignment.priority)
        .bind(assignment.allow_negative)
        .bind(assignment.requires_approval)
        .bind(assignment.active_from)
        .bind(assignment.active_to)
        .bind(assignment.created_at)
        .execute(&self.pool)
        .await
        .map_err(EngineError::from)?;
        Ok(())
    }

    async fn assignments_for(&self, entity_id: &str) -> Result<Vec<Assignment>, EngineError> {
        let rows = sqlx::query(
            "SELECT id, entity_id, policy_id, priority, allow_negative, requires_approval, \
                    active_from, active_to, created_at \
             FROM assignments WHERE entity_id = $1 ORDER BY priority ASC, policy_id ASC",
        )
        .bind(entity_id)
        .fetch_all(&self.pool)
        .await
        .map_err(EngineError::from)?;

        rows.into_iter().map(map_assignment).collect()
    }
}

fn map_assignment(row: PgRow) -> Result<Assignment, EngineError> {
    Ok(Assignment {
        id: row.try_get("id").map_err(EngineError::from)?,
        entity_id: row.try_get("entity_id").map_err(EngineError::from)?,
        policy_id: row.try_get("policy_id").map_err(EngineError::from)?,
        priority: row.try_get("priority").map_err(EngineError::from)?,
        allow_negative: row.try_get("allow_negative").map_err(EngineError::from)?,
        requires_approval: row.try_get("requires_approval").map_err(EngineError::from)?,
        active_from: row.try_get("active_from").map_err(EngineError::from)?,
        active_to: row.try_get("active_to").map_err(EngineError::from)?,
        created_at: row.try_get("created_at").map_err(EngineError::from)?,
    })
}
