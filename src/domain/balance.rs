use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use super::amount::{Amount, Unit};
use super::models::{Transaction, TransactionType};
use super::period::Period;
use super::policy::ConsumptionMode;

/// Derived balance scalars for one (entity, policy, period). Never stored as
/// authoritative state; always recomputed from the ledger.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Balance {
    pub entity_id: String,
    pub policy_id: String,
    pub period: Period,
    /// Amount earned so far: the greater of actually granted and scheduled
    /// to date.
    pub accrued_to_date: Amount,
    /// Amount due for the whole period, including future scheduled grants.
    pub total_entitlement: Amount,
    /// Consumption to date, stored positive.
    pub total_consumed: Amount,
    /// Outstanding tentative reservations, stored positive.
    pub pending: Amount,
    /// Net manual and reconciliation corrections, signed.
    pub adjustments: Amount,
}

impl Balance {
    pub fn empty(
        entity_id: impl Into<String>,
        policy_id: impl Into<String>,
        period: Period,
        unit: Unit,
    ) -> Self {
        Self {
            entity_id: entity_id.into(),
            policy_id: policy_id.into(),
            period,
            accrued_to_date: Amount::zero(unit),
            total_entitlement: Amount::zero(unit),
            total_consumed: Amount::zero(unit),
            pending: Amount::zero(unit),
            adjustments: Amount::zero(unit),
        }
    }

    pub fn unit(&self) -> Unit {
        self.total_entitlement.unit
    }

    /// Remaining balance against the full-period entitlement.
    pub fn current(&self) -> Amount {
        self.total_entitlement
            .sub(&self.total_consumed)
            .add(&self.adjustments)
    }

    /// Remaining balance against what has accrued so far.
    pub fn current_accrued(&self) -> Amount {
        self.accrued_to_date
            .sub(&self.total_consumed)
            .add(&self.adjustments)
    }

    /// Consumable amount under `mode`, net of pending reservations.
    pub fn available(&self, mode: ConsumptionMode) -> Amount {
        let base = match mode {
            ConsumptionMode::ConsumeAhead => self.current(),
            ConsumptionMode::ConsumeUpToAccrued => self.current_accrued(),
        };
        base.sub(&self.pending)
    }

    pub fn can_consume(&self, amount: &Amount, mode: ConsumptionMode, allow_negative: bool) -> bool {
        allow_negative || !self.available(mode).sub(amount).is_negative()
    }
}

/// Raw per-type totals accumulated from a transaction list.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerTotals {
    pub actual_accruals: Amount,
    pub consumed: Amount,
    pub pending: Amount,
    pub adjustments: Amount,
}

impl LedgerTotals {
    pub fn zero(unit: Unit) -> Self {
        Self {
            actual_accruals: Amount::zero(unit),
            consumed: Amount::zero(unit),
            pending: Amount::zero(unit),
            adjustments: Amount::zero(unit),
        }
    }
}

/// Folds ordered transactions into per-type totals.
///
/// A Reversal undoes the bucket of the transaction it references: reversing
/// a Pending reservation releases `pending`, anything else reduces
/// `consumed`. Unreferenced reversals reduce `consumed`.
pub fn accumulate(transactions: &[Transaction], unit: Unit) -> LedgerTotals {
    let kinds: HashMap<Uuid, TransactionType> = transactions
        .iter()
        .map(|tx| (tx.id, tx.kind))
        .collect();

    let mut totals = LedgerTotals::zero(unit);
    for tx in transactions {
        match tx.kind {
            TransactionType::Grant => {
                totals.actual_accruals = totals.actual_accruals.add(&tx.delta);
            }
            TransactionType::Consumption => {
                totals.consumed = totals.consumed.sub(&tx.delta);
            }
            TransactionType::Pending => {
                totals.pending = totals.pending.sub(&tx.delta);
            }
            TransactionType::Adjustment | TransactionType::Reconciliation => {
                totals.adjustments = totals.adjustments.add(&tx.delta);
            }
            TransactionType::Reversal => {
                let reversed_kind = tx
                    .reference_id
                    .as_deref()
                    .and_then(|reference| reference.parse::<Uuid>().ok())
                    .and_then(|id| kinds.get(&id).copied());
                match reversed_kind {
                    Some(TransactionType::Pending) => {
                        totals.pending = totals.pending.sub(&tx.delta);
                    }
                    _ => {
                        totals.consumed = totals.consumed.sub(&tx.delta);
                    }
                }
            }
        }
    }
    totals
}
