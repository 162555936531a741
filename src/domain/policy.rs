use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

use crate::services::errors::EngineError;

use super::accrual::{AccrualSchedule, MonthlyAccrual, UpfrontGrant};
use super::amount::{Amount, Unit};
use super::period::PeriodConfig;

/// Policy-level choice of how much of the entitlement is consumable.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum ConsumptionMode {
    /// Full-period entitlement is consumable, including grants that have not
    /// accrued yet.
    #[default]
    ConsumeAhead,
    /// Only the accrued-to-date amount is consumable.
    ConsumeUpToAccrued,
}

impl ConsumptionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsumptionMode::ConsumeAhead => "consume_ahead",
            ConsumptionMode::ConsumeUpToAccrued => "consume_up_to_accrued",
        }
    }
}

impl FromStr for ConsumptionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "consume_ahead" => Ok(ConsumptionMode::ConsumeAhead),
            "consume_up_to_accrued" => Ok(ConsumptionMode::ConsumeUpToAccrued),
            other => Err(format!("unknown consumption mode {other}")),
        }
    }
}

impl From<ConsumptionMode> for String {
    fn from(mode: ConsumptionMode) -> Self {
        mode.as_str().to_string()
    }
}

/// How a policy's balance grows over a period.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum AccrualConfig {
    /// Fixed grant on the first of each month. When `prorate_partial` is
    /// set, a range starting mid-month gets a fractional grant at the range
    /// start for the remainder of that month.
    Monthly {
        per_month: Amount,
        prorate_partial: bool,
    },
    /// The whole entitlement granted at the start of the range.
    Upfront { amount: Amount },
    /// Accruals driven by external activity (hours worked, kudos). Future
    /// events are unknown, so no schedule can be derived from the policy
    /// alone; callers feed an activity log to the calculator instead.
    ActivityDriven,
    /// No automatic accrual; grants are posted manually.
    Manual,
}

impl AccrualConfig {
    /// Builds the deterministic schedule this config describes, or `None`
    /// when accruals depend on external inputs.
    pub fn schedule(&self) -> Option<Box<dyn AccrualSchedule>> {
        match self {
            AccrualConfig::Monthly {
                per_month,
                prorate_partial,
            } => Some(Box::new(MonthlyAccrual::new(*per_month, *prorate_partial))),
            AccrualConfig::Upfront { amount } => Some(Box::new(UpfrontGrant::new(*amount))),
            AccrualConfig::ActivityDriven | AccrualConfig::Manual => None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PolicyConstraints {
    /// Hard ceiling on `current()`; enforced by projection and by the
    /// period-end Cap action.
    pub max_balance: Option<Amount>,
    /// Default for assignments that do not override it.
    pub allow_negative: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ReconciliationTrigger {
    PeriodEnd,
}

/// One step of a period-boundary rule. Actions run in declared order and
/// share a single running summary, so Carryover-then-Expire implements
/// rollover-with-cap while Expire alone is use-it-or-lose-it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ReconciliationAction {
    Carryover { max_carryover: Option<Amount> },
    Expire,
    Cap,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReconciliationRule {
    pub trigger: ReconciliationTrigger,
    pub actions: Vec<ReconciliationAction>,
}

/// A versioned, immutable resource policy. Edits produce a new version with
/// a later `effective_at`; existing versions are never changed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Policy {
    pub id: String,
    pub name: String,
    pub resource_type: String,
    pub unit: Unit,
    pub period: PeriodConfig,
    pub accrual: AccrualConfig,
    pub consumption_mode: ConsumptionMode,
    pub unique_per_time_point: bool,
    pub constraints: PolicyConstraints,
    pub reconciliation: Vec<ReconciliationRule>,
    pub version: u32,
    pub effective_at: DateTime<Utc>,
}

impl Policy {
    pub fn schedule(&self) -> Option<Box<dyn AccrualSchedule>> {
        self.accrual.schedule()
    }

    pub fn zero(&self) -> Amount {
        Amount::zero(self.unit)
    }
}

/// Append-only collection of policy versions. Registration never replaces a
/// version; lookups resolve the latest version effective at a given instant.
#[derive(Default)]
pub struct PolicyCatalog {
    versions: RwLock<HashMap<String, Vec<Policy>>>,
}

impl PolicyCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, policy: Policy) {
        let mut versions = self.versions.write();
        let entries = versions.entry(policy.id.clone()).or_default();
        entries.push(policy);
        entries.sort_by_key(|p| (p.effective_at, p.version));
    }

    /// The newest version of `policy_id`.
    pub fn resolve(&self, policy_id: &str) -> Result<Policy, EngineError> {
        self.versions
            .read()
            .get(policy_id)
            .and_then(|entries| entries.last().cloned())
            .ok_or_else(|| EngineError::PolicyNotFound {
                id: policy_id.to_string(),
            })
    }

    /// The version of `policy_id` in force at `at`.
    pub fn resolve_at(&self, policy_id: &str, at: DateTime<Utc>) -> Result<Policy, EngineError> {
        self.versions
            .read()
            .get(policy_id)
            .and_then(|entries| {
                entries
                    .iter()
                    .rev()
                    .find(|p| p.effective_at <= at)
                    .cloned()
            })
            .ok_or_else(|| EngineError::PolicyNotFound {
                id: policy_id.to_string(),
            })
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.versions.read().keys().cloned().collect();
        ids.sort();
        ids
    }
}
