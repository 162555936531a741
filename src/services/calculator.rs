//! Per-policy balance computation over one period.

use chrono::NaiveDate;
use std::sync::Arc;

use crate::domain::accrual::{sum_events, AccrualSchedule};
use crate::domain::balance::{accumulate, Balance};
use crate::domain::period::Period;
use crate::domain::policy::Policy;

use super::errors::EngineError;
use super::ledger::Ledger;

pub struct BalanceCalculator {
    ledger: Arc<Ledger>,
}

impl BalanceCalculator {
    pub fn new(ledger: Arc<Ledger>) -> Self {
        Self { ledger }
    }

    /// Computes the balance for `(entity, policy, period)` as of `as_of`,
    /// using the schedule derived from the policy's accrual config.
    pub async fn balance(
        &self,
        entity_id: &str,
        policy: &Policy,
        period: Period,
        as_of: NaiveDate,
    ) -> Result<Balance, EngineError> {
        let schedule = policy.schedule();
        self.balance_with_schedule(entity_id, policy, period, schedule.as_deref(), as_of)
            .await
    }

    /// Variant accepting an explicit schedule, for activity-driven policies
    /// whose accrual log lives outside the policy definition.
    ///
    /// `accrued_to_date` is the greater of actually recorded grants and the
    /// scheduled amount to date: grants may be materialized ahead of their
    /// scheduled date and the larger figure wins. `total_entitlement` comes
    /// from the full-period schedule for deterministic schedules and falls
    /// back to recorded grants otherwise.
    pub async fn balance_with_schedule(
        &self,
        entity_id: &str,
        policy: &Policy,
        period: Period,
        schedule: Option<&dyn AccrualSchedule>,
        as_of: NaiveDate,
    ) -> Result<Balance, EngineError> {
        let transactions = self
            .ledger
            .transactions_in_range(
                entity_id,
                &policy.id,
                period.start_point(),
                period.end_point(),
            )
            .await?;

        let totals = accumulate(&transactions, policy.unit);

        let mut accrued_to_date = totals.actual_accruals;
        let mut total_entitlement = totals.actual_accruals;
        if let Some(schedule) = schedule {
            let horizon = as_of.min(period.end);
            let to_date = sum_events(
                &schedule.generate_accruals(period.start, horizon),
                policy.unit,
            );
            accrued_to_date = totals.actual_accruals.max(&to_date);
            total_entitlement = if schedule.is_deterministic() {
                sum_events(
                    &schedule.generate_accruals(period.start, period.end),
                    policy.unit,
                )
            } else {
                totals.actual_accruals
            };
        }

        Ok(Balance {
            entity_id: entity_id.to_string(),
            policy_id: policy.id.clone(),
            period,
            accrued_to_date,
            total_entitlement,
            total_consumed: totals.consumed,
            pending: totals.pending,
            adjustments: totals.adjustments,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::accrual::{AccrualEvent, ActivityLog};
    use crate::domain::amount::{Amount, Unit};
    use crate::domain::models::{Transaction, TransactionType};
    use crate::domain::period::PeriodConfig;
    use crate::domain::policy::{
        AccrualConfig, ConsumptionMode, PolicyConstraints, ReconciliationRule,
    };
    use crate::domain::time::TimePoint;
    use crate::infrastructure::store::InMemoryStore;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, m, d).unwrap()
    }

    fn monthly_policy(per_month: Decimal) -> Policy {
        Policy {
            id: "pto-standard".to_string(),
            name: "Standard PTO".to_string(),
            resource_type: "time_off".to_string(),
            unit: Unit::Days,
            period: PeriodConfig::CalendarYear,
            accrual: AccrualConfig::Monthly {
                per_month: Amount::new(per_month, Unit::Days),
                prorate_partial: false,
            },
            consumption_mode: ConsumptionMode::ConsumeAhead,
            unique_per_time_point: false,
            constraints: PolicyConstraints::default(),
            reconciliation: Vec::<ReconciliationRule>::new(),
            version: 1,
            effective_at: Utc::now(),
        }
    }

    fn year() -> Period {
        Period::new(date(1, 1), date(12, 31)).unwrap()
    }

    async fn fixture() -> (Arc<Ledger>, BalanceCalculator) {
        let ledger = Arc::new(Ledger::new(Arc::new(InMemoryStore::new())));
        let calculator = BalanceCalculator::new(Arc::clone(&ledger));
        (ledger, calculator)
    }

    #[tokio::test]
    async fn schedule_drives_accrued_and_entitlement() {
        let (_, calculator) = fixture().await;
        let policy = monthly_policy(dec!(2));

        let balance = calculator
            .balance("emp-1", &policy, year(), date(3, 15))
            .await
            .unwrap();

        // Three first-of-month events by mid March, twelve for the year.
        assert_eq!(balance.accrued_to_date.value, dec!(6));
        assert_eq!(balance.total_entitlement.value, dec!(24));
        assert_eq!(balance.current().value, dec!(24));
    }

    #[tokio::test]
    async fn early_materialized_grants_win_over_schedule() {
        let (ledger, calculator) = fixture().await;
        let policy = monthly_policy(dec!(2));

        ledger
            .append(Transaction::new(
                "emp-1",
                "pto-standard",
                "time_off",
                TimePoint::day(date(1, 2)),
                Amount::new(dec!(10), Unit::Days),
                TransactionType::Grant,
            ))
            .await
            .unwrap();

        let balance = calculator
            .balance("emp-1", &policy, year(), date(1, 31))
            .await
            .unwrap();

        // Scheduled-to-date is 2; the materialized 10 is larger and wins.
        assert_eq!(balance.accrued_to_date.value, dec!(10));
        assert_eq!(balance.total_entitlement.value, dec!(24));
    }

    #[tokio::test]
    async fn non_deterministic_schedule_short_circuits_entitlement() {
        let (ledger, calculator) = fixture().await;
        let mut policy = monthly_policy(dec!(2));
        policy.accrual = AccrualConfig::ActivityDriven;

        ledger
            .append(Transaction::new(
                "emp-1",
                "pto-standard",
                "time_off",
                TimePoint::day(date(2, 1)),
                Amount::new(dec!(3), Unit::Days),
                TransactionType::Grant,
            ))
            .await
            .unwrap();

        let log = ActivityLog::new(vec![AccrualEvent {
            at: TimePoint::day(date(2, 1)),
            amount: Amount::new(dec!(3), Unit::Days),
            reason: "overtime conversion".to_string(),
        }]);

        let balance = calculator
            .balance_with_schedule("emp-1", &policy, year(), Some(&log), date(6, 30))
            .await
            .unwrap();

        assert_eq!(balance.accrued_to_date.value, dec!(3));
        assert_eq!(balance.total_entitlement.value, dec!(3));
    }

    #[tokio::test]
    async fn consumption_pending_and_adjustments_accumulate() {
        let (ledger, calculator) = fixture().await;
        let policy = monthly_policy(dec!(2));

        let base = |value: Decimal, kind| {
            Transaction::new(
                "emp-1",
                "pto-standard",
                "time_off",
                TimePoint::day(date(4, 10)),
                Amount::new(value, Unit::Days),
                kind,
            )
        };
        ledger
            .append(base(dec!(-3), TransactionType::Consumption))
            .await
            .unwrap();
        ledger
            .append(base(dec!(-2), TransactionType::Pending))
            .await
            .unwrap();
        ledger
            .append(base(dec!(1), TransactionType::Adjustment))
            .await
            .unwrap();

        let balance = calculator
            .balance("emp-1", &policy, year(), date(12, 31))
            .await
            .unwrap();

        assert_eq!(balance.total_consumed.value, dec!(3));
        assert_eq!(balance.pending.value, dec!(2));
        assert_eq!(balance.adjustments.value, dec!(1));
        // current = 24 - 3 + 1
        assert_eq!(balance.current().value, dec!(22));
        assert_eq!(
            balance.available(ConsumptionMode::ConsumeAhead).value,
            dec!(20)
        );
    }
}
