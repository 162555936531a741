//! Consumption request lifecycle: Pending → Approved / Rejected / Cancelled.
//!
//! Every transition writes its ledger transactions in one atomic batch;
//! either the whole transition lands or the prior state holds. The request
//! record itself (status, approver, timestamps) lives outside the ledger.

use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::domain::amount::Amount;
use crate::domain::models::{
    Allocation, RequestStatus, ResourceRequest, Transaction, TransactionType,
};
use crate::domain::policy::PolicyCatalog;
use crate::domain::resource;
use crate::domain::time::TimePoint;

use super::aggregation::BalanceAggregator;
use super::distribution::{distribute, ResourceBalance};
use super::errors::EngineError;
use super::ledger::Ledger;

#[derive(Debug, Clone)]
pub struct NewRequest {
    pub entity_id: String,
    pub resource_type: String,
    pub amount: Amount,
    pub effective_at: TimePoint,
    pub reason: String,
    pub requested_by: String,
}

struct RequestRecord {
    request: ResourceRequest,
    /// Ids of the Pending transactions, in allocation order; reversals
    /// reference them so the pending bucket is released on settlement.
    pending_tx_ids: Vec<Uuid>,
}

pub struct RequestService {
    ledger: Arc<Ledger>,
    aggregator: BalanceAggregator,
    catalog: Arc<PolicyCatalog>,
    requests: RwLock<HashMap<Uuid, RequestRecord>>,
}

impl RequestService {
    pub fn new(
        ledger: Arc<Ledger>,
        aggregator: BalanceAggregator,
        catalog: Arc<PolicyCatalog>,
    ) -> Self {
        Self {
            ledger,
            aggregator,
            catalog,
            requests: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, request_id: Uuid) -> Option<ResourceRequest> {
        self.requests
            .read()
            .get(&request_id)
            .map(|record| record.request.clone())
    }

    /// Creates a request: distributes the amount across policies, reserves
    /// it with Pending transactions, and auto-approves when no allocation
    /// requires approval.
    pub async fn create(&self, new_request: NewRequest) -> Result<ResourceRequest, EngineError> {
        let as_of = new_request.effective_at.date();
        let resource_balance = self
            .aggregator
            .resource_balance(&new_request.entity_id, &new_request.resource_type, as_of)
            .await?;

        if new_request.amount.unit != resource_balance.unit() {
            return Err(EngineError::UnitMismatch {
                expected: resource_balance.unit(),
                actual: new_request.amount.unit,
            });
        }

        self.check_day_uniqueness(&new_request, &resource_balance, as_of)
            .await?;

        let distribution = distribute(&resource_balance, new_request.amount);
        if !distribution.is_satisfiable {
            return Err(EngineError::insufficient(
                resource_balance.total_available,
                new_request.amount,
            ));
        }

        let request_id = Uuid::new_v4();
        let batch = pending_batch(request_id, &new_request, &distribution.allocations);
        let pending_tx_ids: Vec<Uuid> = batch.iter().map(|tx| tx.id).collect();
        self.ledger.append_batch(batch).await?;

        let requires_approval = distribution.requires_approval();
        let request = ResourceRequest {
            id: request_id,
            entity_id: new_request.entity_id.clone(),
            resource_type: new_request.resource_type.clone(),
            amount: new_request.amount,
            effective_at: new_request.effective_at,
            reason: new_request.reason.clone(),
            status: RequestStatus::Pending,
            requires_approval,
            allocations: distribution.allocations,
            requested_by: new_request.requested_by.clone(),
            decided_by: None,
            decision_note: None,
            created_at: Utc::now(),
            decided_at: None,
        };

        let descriptor = resource::lookup_or_fallback(&request.resource_type);
        info!(
            request_id = %request_id,
            entity_id = %request.entity_id,
            resource_type = %request.resource_type,
            resource_domain = descriptor.resource_domain(),
            amount = %request.amount,
            requires_approval,
            "consumption request created"
        );

        self.requests.write().insert(
            request_id,
            RequestRecord {
                request: request.clone(),
                pending_tx_ids,
            },
        );

        if !requires_approval {
            return self.approve(request_id, &new_request.requested_by, None).await;
        }
        Ok(request)
    }

    /// Approves a pending request: each reservation is reversed and
    /// re-booked as a final Consumption, atomically.
    pub async fn approve(
        &self,
        request_id: Uuid,
        approver: &str,
        note: Option<String>,
    ) -> Result<ResourceRequest, EngineError> {
        let (request, pending_tx_ids) = self.pending_snapshot(request_id, "approve")?;

        let mut batch = Vec::with_capacity(request.allocations.len() * 2);
        for (index, allocation) in request.allocations.iter().enumerate() {
            batch.push(
                reversal_tx(&request, allocation, &pending_tx_ids, index, "reverse")
                    .with_reason("pending reservation settled on approval"),
            );
            batch.push(
                Transaction::new(
                    request.entity_id.clone(),
                    allocation.policy_id.clone(),
                    request.resource_type.clone(),
                    request.effective_at,
                    allocation.amount.neg(),
                    TransactionType::Consumption,
                )
                .with_reference(request_id.to_string())
                .with_reason(request.reason.clone())
                .with_idempotency_key(format!("{request_id}-consume-{index}"))
                .with_created_by(approver),
            );
        }
        self.ledger.append_batch(batch).await?;

        self.settle(request_id, RequestStatus::Approved, approver, note)
    }

    /// Rejects a pending request, releasing its reservations.
    pub async fn reject(
        &self,
        request_id: Uuid,
        approver: &str,
        note: Option<String>,
    ) -> Result<ResourceRequest, EngineError> {
        self.release(request_id, RequestStatus::Rejected, approver, note, "reject")
            .await
    }

    /// Cancels a pending request on behalf of the requester.
    pub async fn cancel(
        &self,
        request_id: Uuid,
        actor: &str,
        note: Option<String>,
    ) -> Result<ResourceRequest, EngineError> {
        self.release(request_id, RequestStatus::Cancelled, actor, note, "cancel")
            .await
    }

    async fn release(
        &self,
        request_id: Uuid,
        target: RequestStatus,
        actor: &str,
        note: Option<String>,
        verb: &str,
    ) -> Result<ResourceRequest, EngineError> {
        let (request, pending_tx_ids) = self.pending_snapshot(request_id, verb)?;

        let mut batch = Vec::with_capacity(request.allocations.len());
        for (index, allocation) in request.allocations.iter().enumerate() {
            batch.push(
                reversal_tx(&request, allocation, &pending_tx_ids, index, verb)
                    .with_reason(format!("pending reservation released on {verb}")),
            );
        }
        self.ledger.append_batch(batch).await?;

        self.settle(request_id, target, actor, note)
    }

    /// Snapshot of a request that must still be pending; terminal requests
    /// produce a state error without any writes.
    fn pending_snapshot(
        &self,
        request_id: Uuid,
        operation: &str,
    ) -> Result<(ResourceRequest, Vec<Uuid>), EngineError> {
        let requests = self.requests.read();
        let record = requests
            .get(&request_id)
            .ok_or_else(|| EngineError::EntityNotFound {
                id: request_id.to_string(),
            })?;
        if record.request.status.is_terminal() {
            return Err(EngineError::InvalidTransition {
                from: record.request.status.as_str().to_string(),
                operation: operation.to_string(),
            });
        }
        Ok((record.request.clone(), record.pending_tx_ids.clone()))
    }

    fn settle(
        &self,
        request_id: Uuid,
        status: RequestStatus,
        actor: &str,
        note: Option<String>,
    ) -> Result<ResourceRequest, EngineError> {
        let mut requests = self.requests.write();
        let record = requests
            .get_mut(&request_id)
            .ok_or_else(|| EngineError::EntityNotFound {
                id: request_id.to_string(),
            })?;
        record.request.status = status;
        record.request.decided_by = Some(actor.to_string());
        record.request.decision_note = note;
        record.request.decided_at = Some(Utc::now());
        info!(
            request_id = %request_id,
            status = status.as_str(),
            decided_by = actor,
            "consumption request settled"
        );
        Ok(record.request.clone())
    }

    async fn check_day_uniqueness(
        &self,
        new_request: &NewRequest,
        resource_balance: &ResourceBalance,
        as_of: chrono::NaiveDate,
    ) -> Result<(), EngineError> {
        let day_unique = resource_balance
            .policies
            .iter()
            .filter_map(|entry| self.catalog.resolve(&entry.assignment.policy_id).ok())
            .any(|policy| policy.unique_per_time_point);
        if !day_unique {
            return Ok(());
        }

        if let Some(existing_tx) = self
            .ledger
            .consumption_on(&new_request.entity_id, &new_request.resource_type, as_of)
            .await?
        {
            return Err(EngineError::DuplicateDayConsumption {
                date: as_of,
                existing_tx,
            });
        }
        Ok(())
    }
}

fn pending_batch(
    request_id: Uuid,
    new_request: &NewRequest,
    allocations: &[Allocation],
) -> Vec<Transaction> {
    allocations
        .iter()
        .enumerate()
        .map(|(index, allocation)| {
            Transaction::new(
                new_request.entity_id.clone(),
                allocation.policy_id.clone(),
                new_request.resource_type.clone(),
                new_request.effective_at,
                allocation.amount.neg(),
                TransactionType::Pending,
            )
            .with_reference(request_id.to_string())
            .with_reason(new_request.reason.clone())
            .with_idempotency_key(format!("{request_id}-pend-{index}"))
            .with_created_by(new_request.requested_by.clone())
        })
        .collect()
}

/// Reversal for one pending allocation. References the original Pending
/// transaction so balance accumulation releases the reserved bucket.
fn reversal_tx(
    request: &ResourceRequest,
    allocation: &Allocation,
    pending_tx_ids: &[Uuid],
    index: usize,
    verb: &str,
) -> Transaction {
    let mut tx = Transaction::new(
        request.entity_id.clone(),
        allocation.policy_id.clone(),
        request.resource_type.clone(),
        request.effective_at,
        allocation.amount,
        TransactionType::Reversal,
    )
    .with_idempotency_key(format!("{}-{verb}-{index}", request.id))
    .with_created_by("engine");
    if let Some(pending_id) = pending_tx_ids.get(index) {
        tx = tx.with_reference(pending_id.to_string());
    }
    tx
}
