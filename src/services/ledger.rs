//! Append-only facade over the transaction store.
//!
//! The ledger is the only sanctioned write path into the store. It enforces
//! the global invariants (append-only, idempotency via the store contract)
//! but owns no policy semantics: reconciliation and request services append
//! their own transaction kinds through it.

use chrono::NaiveDate;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::domain::amount::{Amount, Unit};
use crate::domain::models::Transaction;
use crate::domain::time::TimePoint;
use crate::infrastructure::store::TransactionStore;

use super::errors::EngineError;

pub struct Ledger {
    store: Arc<dyn TransactionStore>,
}

impl Ledger {
    pub fn new(store: Arc<dyn TransactionStore>) -> Self {
        Self { store }
    }

    pub async fn append(&self, tx: Transaction) -> Result<(), EngineError> {
        debug!(
            entity_id = %tx.entity_id,
            policy_id = %tx.policy_id,
            kind = tx.kind.as_str(),
            delta = %tx.delta,
            "appending ledger transaction"
        );
        self.store.append(tx).await
    }

    pub async fn append_batch(&self, batch: Vec<Transaction>) -> Result<(), EngineError> {
        if batch.is_empty() {
            return Ok(());
        }
        debug!(size = batch.len(), "appending ledger batch");
        self.store.append_batch(batch).await
    }

    pub async fn transactions(
        &self,
        entity_id: &str,
        policy_id: &str,
    ) -> Result<Vec<Transaction>, EngineError> {
        self.store.load(entity_id, policy_id).await
    }

    pub async fn transactions_in_range(
        &self,
        entity_id: &str,
        policy_id: &str,
        from: TimePoint,
        to: TimePoint,
    ) -> Result<Vec<Transaction>, EngineError> {
        self.store.load_range(entity_id, policy_id, from, to).await
    }

    /// Sum of all deltas with `effective_at` at or before `at`, in `unit`.
    /// The cutoff covers `at`'s whole granularity window, so a day cutoff
    /// includes intra-day transactions.
    pub async fn balance_at(
        &self,
        entity_id: &str,
        policy_id: &str,
        at: TimePoint,
        unit: Unit,
    ) -> Result<Amount, EngineError> {
        let transactions = self.store.load(entity_id, policy_id).await?;
        Ok(transactions
            .iter()
            .filter(|tx| tx.effective_at.instant() < at.window_end())
            .fold(Amount::zero(unit), |acc, tx| acc.add(&tx.delta)))
    }

    /// Pass-through to the store's per-day consumption query, used by
    /// policies enforcing day-uniqueness.
    pub async fn consumption_on(
        &self,
        entity_id: &str,
        resource_type: &str,
        date: NaiveDate,
    ) -> Result<Option<Uuid>, EngineError> {
        self.store.consumption_on(entity_id, resource_type, date).await
    }
}
