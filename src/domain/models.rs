use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use super::amount::Amount;
use super::time::TimePoint;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TransactionType {
    Grant,
    Consumption,
    Pending,
    Reconciliation,
    Adjustment,
    Reversal,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Grant => "grant",
            TransactionType::Consumption => "consumption",
            TransactionType::Pending => "pending",
            TransactionType::Reconciliation => "reconciliation",
            TransactionType::Adjustment => "adjustment",
            TransactionType::Reversal => "reversal",
        }
    }
}

impl FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "grant" => Ok(TransactionType::Grant),
            "consumption" => Ok(TransactionType::Consumption),
            "pending" => Ok(TransactionType::Pending),
            "reconciliation" => Ok(TransactionType::Reconciliation),
            "adjustment" => Ok(TransactionType::Adjustment),
            "reversal" => Ok(TransactionType::Reversal),
            other => Err(format!("unknown transaction type {other}")),
        }
    }
}

impl From<TransactionType> for String {
    fn from(kind: TransactionType) -> Self {
        kind.as_str().to_string()
    }
}

/// One immutable ledger entry. Never updated or deleted after commit;
/// corrections are new `Adjustment` or `Reversal` entries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    pub id: Uuid,
    pub entity_id: String,
    pub policy_id: String,
    pub resource_type: String,
    pub effective_at: TimePoint,
    pub delta: Amount,
    pub kind: TransactionType,
    pub reference_id: Option<String>,
    pub reason: String,
    pub idempotency_key: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    pub fn new(
        entity_id: impl Into<String>,
        policy_id: impl Into<String>,
        resource_type: impl Into<String>,
        effective_at: TimePoint,
        delta: Amount,
        kind: TransactionType,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            entity_id: entity_id.into(),
            policy_id: policy_id.into(),
            resource_type: resource_type.into(),
            effective_at,
            delta,
            kind,
            reference_id: None,
            reason: String::new(),
            idempotency_key: None,
            metadata: None,
            created_by: "engine".to_string(),
            created_at: Utc::now(),
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    pub fn with_reference(mut self, reference_id: impl Into<String>) -> Self {
        self.reference_id = Some(reference_id.into());
        self
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    pub fn with_created_by(mut self, actor: impl Into<String>) -> Self {
        self.created_by = actor.into();
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Non-empty idempotency key, if any. Blank keys are treated as absent.
    pub fn dedup_key(&self) -> Option<&str> {
        self.idempotency_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }
}

/// Binds an entity to a policy. Lower `priority` is consumed first when
/// several policies cover the same resource.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Assignment {
    pub id: Uuid,
    pub entity_id: String,
    pub policy_id: String,
    pub priority: i32,
    pub allow_negative: bool,
    pub requires_approval: bool,
    pub active_from: NaiveDate,
    pub active_to: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

impl Assignment {
    pub fn is_active(&self, date: NaiveDate) -> bool {
        let after_start = date >= self.active_from;
        let before_end = self.active_to.map(|d| date <= d).unwrap_or(true);
        after_start && before_end
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
            RequestStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RequestStatus::Pending)
    }
}

impl FromStr for RequestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(RequestStatus::Pending),
            "approved" => Ok(RequestStatus::Approved),
            "rejected" => Ok(RequestStatus::Rejected),
            "cancelled" => Ok(RequestStatus::Cancelled),
            other => Err(format!("unknown request status {other}")),
        }
    }
}

impl From<RequestStatus> for String {
    fn from(status: RequestStatus) -> Self {
        status.as_str().to_string()
    }
}

/// One slice of a consumption request, charged against a single policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Allocation {
    pub policy_id: String,
    pub amount: Amount,
    pub requires_approval: bool,
}

/// A consumption request and its lifecycle record. The ledger only holds the
/// balance-affecting transactions; status, approver, and timestamps live
/// here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResourceRequest {
    pub id: Uuid,
    pub entity_id: String,
    pub resource_type: String,
    pub amount: Amount,
    pub effective_at: TimePoint,
    pub reason: String,
    pub status: RequestStatus,
    pub requires_approval: bool,
    pub allocations: Vec<Allocation>,
    pub requested_by: String,
    pub decided_by: Option<String>,
    pub decision_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
}
