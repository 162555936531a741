//! Validates hypothetical consumptions against a policy balance.
//!
//! Validation failures are structured results, not errors: when the
//! computation itself succeeds the caller reads `is_valid` and
//! `validation_error`. Only infrastructure failures propagate as `Err`.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::accrual::AccrualSchedule;
use crate::domain::amount::Amount;
use crate::domain::balance::Balance;
use crate::domain::period::Period;
use crate::domain::policy::Policy;

use super::calculator::BalanceCalculator;
use super::errors::EngineError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ValidationError {
    InsufficientBalance {
        available: Amount,
        requested: Amount,
        shortfall: Amount,
    },
    ExceedsMaxBalance {
        current: Amount,
        max_balance: Amount,
    },
}

impl ValidationError {
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::InsufficientBalance { .. } => "insufficient_balance",
            ValidationError::ExceedsMaxBalance { .. } => "exceeds_max",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectionOutcome {
    pub balance: Balance,
    pub is_valid: bool,
    pub remaining: Amount,
    pub validation_error: Option<ValidationError>,
    pub display: String,
}

pub struct ProjectionRequest<'a> {
    pub entity_id: &'a str,
    pub policy: &'a Policy,
    pub period: Period,
    /// Defaults to `period.end` (full-period view). Mid-period values
    /// matter for `ConsumeUpToAccrued` policies.
    pub as_of: Option<NaiveDate>,
    /// Overrides the policy-derived schedule when set.
    pub schedule: Option<&'a dyn AccrualSchedule>,
    pub requested: Amount,
    pub allow_negative: bool,
}

pub struct ProjectionEngine {
    calculator: BalanceCalculator,
}

impl ProjectionEngine {
    pub fn new(calculator: BalanceCalculator) -> Self {
        Self { calculator }
    }

    pub async fn project(
        &self,
        request: ProjectionRequest<'_>,
    ) -> Result<ProjectionOutcome, EngineError> {
        let policy = request.policy;
        if request.requested.unit != policy.unit {
            return Err(EngineError::UnitMismatch {
                expected: policy.unit,
                actual: request.requested.unit,
            });
        }

        let as_of = request.as_of.unwrap_or(request.period.end);
        let balance = match request.schedule {
            Some(schedule) => {
                self.calculator
                    .balance_with_schedule(
                        request.entity_id,
                        policy,
                        request.period,
                        Some(schedule),
                        as_of,
                    )
                    .await?
            }
            None => {
                self.calculator
                    .balance(request.entity_id, policy, request.period, as_of)
                    .await?
            }
        };

        let available = balance.available(policy.consumption_mode);
        let remaining = available.sub(&request.requested);

        let validation_error = if !request.allow_negative && remaining.is_negative() {
            Some(ValidationError::InsufficientBalance {
                available,
                requested: request.requested,
                shortfall: request.requested.sub(&available),
            })
        } else if let Some(max_balance) = policy.constraints.max_balance {
            if balance.current() > max_balance {
                Some(ValidationError::ExceedsMaxBalance {
                    current: balance.current(),
                    max_balance,
                })
            } else {
                None
            }
        } else {
            None
        };

        let display = match &validation_error {
            None => format!(
                "{} available, {} requested, {} remaining",
                available, request.requested, remaining
            ),
            Some(ValidationError::InsufficientBalance { shortfall, .. }) => format!(
                "{} available, {} requested, short by {}",
                available, request.requested, shortfall
            ),
            Some(ValidationError::ExceedsMaxBalance {
                current,
                max_balance,
            }) => format!("balance {} exceeds maximum {}", current, max_balance),
        };

        Ok(ProjectionOutcome {
            balance,
            is_valid: validation_error.is_none(),
            remaining,
            validation_error,
            display,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::amount::Unit;
    use crate::domain::models::{Transaction, TransactionType};
    use crate::domain::period::PeriodConfig;
    use crate::domain::policy::{
        AccrualConfig, ConsumptionMode, PolicyConstraints, ReconciliationRule,
    };
    use crate::domain::time::TimePoint;
    use crate::infrastructure::store::InMemoryStore;
    use crate::services::ledger::Ledger;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, m, d).unwrap()
    }

    fn year() -> Period {
        Period::new(date(1, 1), date(12, 31)).unwrap()
    }

    fn annual_monthly_policy(mode: ConsumptionMode) -> Policy {
        Policy {
            id: "pto-standard".to_string(),
            name: "Standard PTO".to_string(),
            resource_type: "time_off".to_string(),
            unit: Unit::Days,
            period: PeriodConfig::CalendarYear,
            accrual: AccrualConfig::Monthly {
                per_month: Amount::new(dec!(20) / dec!(12), Unit::Days),
                prorate_partial: false,
            },
            consumption_mode: mode,
            unique_per_time_point: false,
            constraints: PolicyConstraints::default(),
            reconciliation: Vec::<ReconciliationRule>::new(),
            version: 1,
            effective_at: Utc::now(),
        }
    }

    fn fixture() -> (Arc<Ledger>, ProjectionEngine) {
        let ledger = Arc::new(Ledger::new(Arc::new(InMemoryStore::new())));
        let engine = ProjectionEngine::new(BalanceCalculator::new(Arc::clone(&ledger)));
        (ledger, engine)
    }

    fn days(value: rust_decimal::Decimal) -> Amount {
        Amount::new(value, Unit::Days)
    }

    #[tokio::test]
    async fn consume_ahead_permits_future_entitlement_in_january() {
        let (_, engine) = fixture();
        let policy = annual_monthly_policy(ConsumptionMode::ConsumeAhead);

        let outcome = engine
            .project(ProjectionRequest {
                entity_id: "emp-1",
                policy: &policy,
                period: year(),
                as_of: Some(date(1, 15)),
                schedule: None,
                requested: days(dec!(15)),
                allow_negative: false,
            })
            .await
            .unwrap();

        assert!(outcome.is_valid);
        let accrued = outcome.balance.accrued_to_date.value;
        assert!((accrued - dec!(1.6667)).abs() < dec!(0.001));
        let entitlement = outcome.balance.total_entitlement.value;
        assert!((entitlement - dec!(20)).abs() < dec!(0.001));
    }

    #[tokio::test]
    async fn consume_up_to_accrued_rejects_january_overdraw() {
        let (_, engine) = fixture();
        let policy = annual_monthly_policy(ConsumptionMode::ConsumeUpToAccrued);

        let outcome = engine
            .project(ProjectionRequest {
                entity_id: "emp-1",
                policy: &policy,
                period: year(),
                as_of: Some(date(1, 31)),
                schedule: None,
                requested: days(dec!(10)),
                allow_negative: false,
            })
            .await
            .unwrap();

        assert!(!outcome.is_valid);
        let error = outcome.validation_error.expect("validation error");
        assert_eq!(error.code(), "insufficient_balance");
    }

    #[tokio::test]
    async fn pending_reservations_reduce_availability() {
        let (ledger, engine) = fixture();
        let mut policy = annual_monthly_policy(ConsumptionMode::ConsumeAhead);
        policy.accrual = AccrualConfig::Upfront {
            amount: days(dec!(20)),
        };

        ledger
            .append(Transaction::new(
                "emp-1",
                "pto-standard",
                "time_off",
                TimePoint::day(date(2, 1)),
                days(dec!(-5)),
                TransactionType::Pending,
            ))
            .await
            .unwrap();

        let outcome = engine
            .project(ProjectionRequest {
                entity_id: "emp-1",
                policy: &policy,
                period: year(),
                as_of: None,
                schedule: None,
                requested: days(dec!(16)),
                allow_negative: false,
            })
            .await
            .unwrap();

        assert!(!outcome.is_valid);
        assert_eq!(outcome.balance.pending.value, dec!(5));
        assert_eq!(outcome.remaining.value, dec!(-1));
    }

    #[tokio::test]
    async fn max_balance_violation_reports_exceeds_max() {
        let (ledger, engine) = fixture();
        let mut policy = annual_monthly_policy(ConsumptionMode::ConsumeAhead);
        policy.accrual = AccrualConfig::Upfront {
            amount: days(dec!(20)),
        };
        policy.constraints = PolicyConstraints {
            max_balance: Some(days(dec!(25))),
            allow_negative: false,
        };

        ledger
            .append(Transaction::new(
                "emp-1",
                "pto-standard",
                "time_off",
                TimePoint::day(date(3, 1)),
                days(dec!(10)),
                TransactionType::Adjustment,
            ))
            .await
            .unwrap();

        let outcome = engine
            .project(ProjectionRequest {
                entity_id: "emp-1",
                policy: &policy,
                period: year(),
                as_of: None,
                schedule: None,
                requested: days(dec!(1)),
                allow_negative: false,
            })
            .await
            .unwrap();

        assert!(!outcome.is_valid);
        assert_eq!(
            outcome.validation_error.expect("validation error").code(),
            "exceeds_max"
        );
    }

    #[tokio::test]
    async fn unit_mismatch_is_an_error_not_a_result() {
        let (_, engine) = fixture();
        let policy = annual_monthly_policy(ConsumptionMode::ConsumeAhead);

        let err = engine
            .project(ProjectionRequest {
                entity_id: "emp-1",
                policy: &policy,
                period: year(),
                as_of: None,
                schedule: None,
                requested: Amount::new(dec!(8), Unit::Hours),
                allow_negative: false,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::UnitMismatch { .. }));
    }
}
