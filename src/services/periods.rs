//! Period-boundary orchestration: closing, opening, and policy changes.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::domain::amount::Amount;
use crate::domain::balance::Balance;
use crate::domain::models::{Transaction, TransactionType};
use crate::domain::period::Period;
use crate::domain::policy::Policy;
use crate::domain::time::TimePoint;

use super::calculator::BalanceCalculator;
use super::errors::EngineError;
use super::ledger::Ledger;
use super::reconciliation::{
    ReconciliationEngine, ReconciliationInput, ReconciliationSummary,
};

/// Cached closing state. Never authoritative; balances are always
/// recomputable from the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceSnapshot {
    pub balance: Balance,
    pub summary: ReconciliationSummary,
    pub captured_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct PeriodCloseOutcome {
    pub closing_balance: Balance,
    pub summary: ReconciliationSummary,
    pub transactions: Vec<Transaction>,
    pub snapshot: Option<BalanceSnapshot>,
}

pub struct PeriodManager {
    ledger: Arc<Ledger>,
    calculator: BalanceCalculator,
    reconciliation: ReconciliationEngine,
    snapshot_on_close: bool,
}

impl PeriodManager {
    pub fn new(
        ledger: Arc<Ledger>,
        calculator: BalanceCalculator,
        reconciliation: ReconciliationEngine,
        snapshot_on_close: bool,
    ) -> Self {
        Self {
            ledger,
            calculator,
            reconciliation,
            snapshot_on_close,
        }
    }

    /// Closes `ending` for (entity, policy): computes the final balance,
    /// runs reconciliation, and writes the emitted transactions in one
    /// batch. The next period opens at the day after `ending.end` and
    /// stretches to the end of the policy period containing that day.
    pub async fn close_period(
        &self,
        entity_id: &str,
        policy: &Policy,
        ending: Period,
    ) -> Result<PeriodCloseOutcome, EngineError> {
        let next_start = ending
            .end
            .succ_opt()
            .ok_or_else(|| EngineError::InvalidPeriod {
                reason: format!("no day after period end {}", ending.end),
            })?;
        let next_end = policy.period.period_for(next_start)?.end.max(next_start);
        let next = Period::new(next_start, next_end)?;

        let closing_balance = self
            .calculator
            .balance(entity_id, policy, ending, ending.end)
            .await?;

        let outcome = self.reconciliation.reconcile(&ReconciliationInput {
            entity_id,
            policy,
            current_balance: &closing_balance,
            ending_period: ending,
            next_period: next,
        });

        self.ledger.append_batch(outcome.transactions.clone()).await?;

        info!(
            entity_id,
            policy_id = %policy.id,
            period_end = %ending.end,
            carried_over = %outcome.summary.carried_over,
            expired = %outcome.summary.expired,
            "period closed"
        );

        let snapshot = self.snapshot_on_close.then(|| BalanceSnapshot {
            balance: closing_balance.clone(),
            summary: outcome.summary.clone(),
            captured_at: Utc::now(),
        });

        Ok(PeriodCloseOutcome {
            closing_balance,
            summary: outcome.summary,
            transactions: outcome.transactions,
            snapshot,
        })
    }

    /// Opens `period`, optionally granting an opening amount at its start.
    /// Used for mid-period joiners and for seeding the period after a
    /// policy change.
    pub async fn open_period(
        &self,
        entity_id: &str,
        policy: &Policy,
        period: Period,
        opening_grant: Option<Amount>,
    ) -> Result<Option<Transaction>, EngineError> {
        let Some(amount) = opening_grant else {
            return Ok(None);
        };
        if amount.unit != policy.unit {
            return Err(EngineError::UnitMismatch {
                expected: policy.unit,
                actual: amount.unit,
            });
        }

        let tx = Transaction::new(
            entity_id,
            policy.id.clone(),
            policy.resource_type.clone(),
            TimePoint::day(period.start),
            amount,
            TransactionType::Grant,
        )
        .with_reason("opening grant")
        .with_idempotency_key(format!(
            "{entity_id}:{}:{}:opening",
            policy.id, period.start
        ))
        .with_created_by("engine");

        self.ledger.append(tx.clone()).await?;
        info!(
            entity_id,
            policy_id = %policy.id,
            period_start = %period.start,
            amount = %amount,
            "period opened with grant"
        );
        Ok(Some(tx))
    }

    /// Closes the old policy's current period early, ending the day before
    /// `change_at`; the caller then opens a period under the new policy.
    /// Reconciliation output (carryover) lands on `change_at` so it opens
    /// the successor period.
    pub async fn change_policy(
        &self,
        entity_id: &str,
        old_policy: &Policy,
        change_at: NaiveDate,
    ) -> Result<PeriodCloseOutcome, EngineError> {
        let last_day = change_at
            .pred_opt()
            .ok_or_else(|| EngineError::InvalidPeriod {
                reason: format!("no day before change date {change_at}"),
            })?;
        let current = old_policy.period.period_for(last_day)?;
        let truncated = Period::new(current.start, last_day)?;
        self.close_period(entity_id, old_policy, truncated).await
    }
}
