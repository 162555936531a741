//! Period-end reconciliation: carryover, expiration, and capping.
//!
//! Pure transaction generation; the period manager writes the emitted
//! transactions through the ledger. Actions within a rule run in declared
//! order and share one running summary, which is what lets
//! Carryover-then-Expire implement rollover-with-cap while Expire alone
//! implements use-it-or-lose-it.

use serde::{Deserialize, Serialize};

use crate::domain::amount::Amount;
use crate::domain::balance::Balance;
use crate::domain::models::{Transaction, TransactionType};
use crate::domain::period::Period;
use crate::domain::policy::{Policy, ReconciliationAction, ReconciliationTrigger};

pub struct ReconciliationInput<'a> {
    pub entity_id: &'a str,
    pub policy: &'a Policy,
    pub current_balance: &'a Balance,
    pub ending_period: Period,
    pub next_period: Period,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReconciliationSummary {
    pub carried_over: Amount,
    pub expired: Amount,
    pub prorated: Amount,
}

impl ReconciliationSummary {
    fn zero(unit: crate::domain::amount::Unit) -> Self {
        Self {
            carried_over: Amount::zero(unit),
            expired: Amount::zero(unit),
            prorated: Amount::zero(unit),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReconciliationOutcome {
    pub summary: ReconciliationSummary,
    pub transactions: Vec<Transaction>,
}

pub struct ReconciliationEngine {
    actor: String,
}

impl ReconciliationEngine {
    pub fn new(actor: impl Into<String>) -> Self {
        Self {
            actor: actor.into(),
        }
    }

    /// Applies every PeriodEnd rule of the policy. A balance with nothing
    /// accrued left over produces no transactions; negative balances stay
    /// as opening debt for the next period and are never expired or carried.
    pub fn reconcile(&self, input: &ReconciliationInput<'_>) -> ReconciliationOutcome {
        let unit = input.policy.unit;
        let mut summary = ReconciliationSummary::zero(unit);
        let mut transactions = Vec::new();

        for (rule_index, rule) in input.policy.reconciliation.iter().enumerate() {
            if rule.trigger != ReconciliationTrigger::PeriodEnd {
                continue;
            }
            for action in &rule.actions {
                match action {
                    ReconciliationAction::Carryover { max_carryover } => {
                        let remainder = input.current_balance.current_accrued();
                        if !remainder.is_positive() {
                            continue;
                        }
                        let carried = match max_carryover {
                            Some(cap) => remainder.min(cap),
                            None => remainder,
                        };
                        transactions.push(self.reconciliation_tx(
                            input,
                            rule_index,
                            "carryover",
                            input.next_period.start,
                            carried,
                            "carryover from previous period",
                        ));
                        summary.carried_over = carried;
                    }
                    ReconciliationAction::Expire => {
                        let expired = input
                            .current_balance
                            .current_accrued()
                            .sub(&summary.carried_over);
                        if !expired.is_positive() {
                            continue;
                        }
                        transactions.push(self.reconciliation_tx(
                            input,
                            rule_index,
                            "expire",
                            input.ending_period.end,
                            expired.neg(),
                            "balance expired at period end",
                        ));
                        summary.expired = summary.expired.add(&expired);
                    }
                    ReconciliationAction::Cap => {
                        let Some(max_balance) = input.policy.constraints.max_balance else {
                            continue;
                        };
                        let current = input.current_balance.current();
                        if current <= max_balance {
                            continue;
                        }
                        let excess = current.sub(&max_balance);
                        transactions.push(self.reconciliation_tx(
                            input,
                            rule_index,
                            "cap",
                            input.ending_period.end,
                            excess.neg(),
                            "balance capped",
                        ));
                        summary.expired = summary.expired.add(&excess);
                    }
                }
            }
        }

        ReconciliationOutcome {
            summary,
            transactions,
        }
    }

    fn reconciliation_tx(
        &self,
        input: &ReconciliationInput<'_>,
        rule_index: usize,
        action: &str,
        at: chrono::NaiveDate,
        delta: Amount,
        reason: &str,
    ) -> Transaction {
        Transaction::new(
            input.entity_id,
            input.policy.id.clone(),
            input.policy.resource_type.clone(),
            crate::domain::time::TimePoint::day(at),
            delta,
            TransactionType::Reconciliation,
        )
        .with_reason(reason)
        .with_idempotency_key(format!(
            "{}:{}:{}:r{rule_index}:{action}",
            input.entity_id, input.policy.id, input.ending_period.end,
        ))
        .with_created_by(self.actor.clone())
    }
}
