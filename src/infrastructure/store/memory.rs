use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::domain::models::{Assignment, Transaction, TransactionType};
use crate::domain::time::TimePoint;
use crate::services::errors::EngineError;

use super::{AssignmentStore, SessionStore, StoreSession, TransactionStore};

#[derive(Default)]
struct Inner {
    /// Per (entity, policy) transactions kept sorted by `effective_at`,
    /// insertion order for ties.
    ledgers: HashMap<(String, String), Vec<Transaction>>,
    idempotency: HashMap<String, Uuid>,
}

impl Inner {
    fn validate_key(&self, tx: &Transaction) -> Result<(), EngineError> {
        if let Some(key) = tx.dedup_key() {
            if self.idempotency.contains_key(key) {
                return Err(EngineError::DuplicateIdempotencyKey {
                    key: key.to_string(),
                });
            }
        }
        Ok(())
    }

    fn insert(&mut self, tx: Transaction) {
        if let Some(key) = tx.dedup_key() {
            self.idempotency.insert(key.to_string(), tx.id);
        }
        let ledger = self
            .ledgers
            .entry((tx.entity_id.clone(), tx.policy_id.clone()))
            .or_default();
        let position = ledger.partition_point(|existing| existing.effective_at <= tx.effective_at);
        ledger.insert(position, tx);
    }
}

/// Reference store: sorted per-key vectors plus an idempotency index under
/// one lock. Readers see a consistent snapshot; writers serialize.
#[derive(Default)]
pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn validate_batch(inner: &Inner, batch: &[Transaction]) -> Result<(), EngineError> {
    let mut seen: HashSet<&str> = HashSet::new();
    for tx in batch {
        inner.validate_key(tx)?;
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
impl TransactionStore for InMemoryStore {
    async fn append(&self, tx: Transaction) -> Result<(), EngineError> {
        let mut inner = self.inner.write();
        inner.validate_key(&tx)?;
        inner.insert(tx);
        Ok(())
    }

    async fn append_batch(&self, batch: Vec<Transaction>) -> Result<(), EngineError> {
        let mut inner = self.inner.write();
        validate_batch(&inner, &batch)?;
        for tx in batch {
            inner.insert(tx);
        }
        Ok(())
    }

    async fn load(
        &self,
        entity_id: &str,
        policy_id: &str,
    ) -> Result<Vec<Transaction>, EngineError> {
        let inner = self.inner.read();
        Ok(inner
            .ledgers
            .get(&(entity_id.to_string(), policy_id.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn load_range(
        &self,
        entity_id: &str,
        policy_id: &str,
        from: TimePoint,
        to: TimePoint,
    ) -> Result<Vec<Transaction>, EngineError> {
        let inner = self.inner.read();
        Ok(inner
            .ledgers
            .get(&(entity_id.to_string(), policy_id.to_string()))
            .map(|ledger| {
                ledger
                    .iter()
                    .filter(|tx| tx.effective_at.in_range(&from, &to))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn load_by_entity(
        &self,
        entity_id: &str,
        from: TimePoint,
        to: TimePoint,
    ) -> Result<Vec<Transaction>, EngineError> {
        let inner = self.inner.read();
        let mut keys: Vec<&(String, String)> = inner
            .ledgers
            .keys()
            .filter(|(entity, _)| entity == entity_id)
            .collect();
        keys.sort();

        let mut merged = Vec::new();
        for key in keys {
            merged.extend(
                inner.ledgers[key]
                    .iter()
                    .filter(|tx| tx.effective_at.in_range(&from, &to))
                    .cloned(),
            );
        }
        merged.sort_by_key(|tx| tx.effective_at);
        Ok(merged)
    }

    async fn exists(&self, idempotency_key: &str) -> Result<bool, EngineError> {
        Ok(self.inner.read().idempotency.contains_key(idempotency_key))
    }

    async fn consumption_on(
        &self,
        entity_id: &str,
        resource_type: &str,
        date: NaiveDate,
    ) -> Result<Option<Uuid>, EngineError> {
        let inner = self.inner.read();
        let mut consumptions = Vec::new();
        let mut reversed: HashSet<String> = HashSet::new();
        for ((entity, _), ledger) in inner.ledgers.iter() {
            if entity != entity_id {
                continue;
            }
            for tx in ledger {
                match tx.kind {
                    TransactionType::Consumption
                        if tx.resource_type == resource_type
                            && tx.effective_at.date() == date =>
                    {
                        consumptions.push(tx.id);
                    }
                    TransactionType::Reversal => {
                        if let Some(reference) = tx.reference_id.as_deref() {
                            reversed.insert(reference.to_string());
                        }
                    }
                    _ => {}
                }
            }
        }
        Ok(consumptions
            .into_iter()
            .find(|id| !reversed.contains(&id.to_string())))
    }
}

#[async_trait]
impl SessionStore for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreSession + '_>, EngineError> {
        Ok(Box::new(MemorySession {
            store: self,
            staged: Vec::new(),
        }))
    }
}

/// Stages writes in a buffer; commit revalidates the idempotency index
/// under the write lock, surfacing `ConcurrentModification` when a staged
/// key appeared in the meantime.
struct MemorySession<'a> {
    store: &'a InMemoryStore,
    staged: Vec<Transaction>,
}

#[async_trait]
impl StoreSession for MemorySession<'_> {
    async fn append(&mut self, tx: Transaction) -> Result<(), EngineError> {
        {
            let inner = self.store.inner.read();
            inner.validate_key(&tx)?;
        }
        if let Some(key) = tx.dedup_key() {
            if self
                .staged
                .iter()
                .any(|staged| staged.dedup_key() == Some(key))
            {
                return Err(EngineError::DuplicateIdempotencyKey {
                    key: key.to_string(),
                });
            }
        }
        self.staged.push(tx);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), EngineError> {
        let mut inner = self.store.inner.write();
        for tx in &self.staged {
            if inner.validate_key(tx).is_err() {
                // The key was free when staged; another writer won the race.
                return Err(EngineError::ConcurrentModification);
            }
        }
        for tx in self.staged {
            inner.insert(tx);
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), EngineError> {
        Ok(())
    }
}

/// In-memory assignment rows.
#[derive(Default)]
pub struct InMemoryAssignmentStore {
    assignments: RwLock<Vec<Assignment>>,
}

impl InMemoryAssignmentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AssignmentStore for InMemoryAssignmentStore {
    async fn put(&self, assignment: Assignment) -> Result<(), EngineError> {
        self.assignments.write().push(assignment);
        Ok(())
    }

    async fn assignments_for(&self, entity_id: &str) -> Result<Vec<Assignment>, EngineError> {
        Ok(self
            .assignments
            .read()
            .iter()
            .filter(|assignment| assignment.entity_id == entity_id)
            .cloned()
            .collect())
    }
}
