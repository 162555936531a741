//! Priority-ordered allocation of a consumption request across policies.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::amount::{Amount, Unit};
use crate::domain::balance::Balance;
use crate::domain::models::{Allocation, Assignment};
use crate::domain::policy::ConsumptionMode;

/// One policy's standing within a resource aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyBalance {
    pub assignment: Assignment,
    pub balance: Balance,
    pub mode: ConsumptionMode,
}

impl PolicyBalance {
    pub fn priority(&self) -> i32 {
        self.assignment.priority
    }

    pub fn available(&self) -> Amount {
        self.balance.available(self.mode)
    }
}

/// Aggregate view of one resource across every active policy covering it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceBalance {
    pub entity_id: String,
    pub resource_type: String,
    pub as_of: NaiveDate,
    pub total_available: Amount,
    pub total_pending: Amount,
    pub policies: Vec<PolicyBalance>,
}

impl ResourceBalance {
    pub fn new(
        entity_id: impl Into<String>,
        resource_type: impl Into<String>,
        as_of: NaiveDate,
        unit: Unit,
        policies: Vec<PolicyBalance>,
    ) -> Self {
        let total_available = policies
            .iter()
            .fold(Amount::zero(unit), |acc, entry| acc.add(&entry.available()));
        let total_pending = policies
            .iter()
            .fold(Amount::zero(unit), |acc, entry| acc.add(&entry.balance.pending));
        Self {
            entity_id: entity_id.into(),
            resource_type: resource_type.into(),
            as_of,
            total_available,
            total_pending,
            policies,
        }
    }

    pub fn unit(&self) -> Unit {
        self.total_available.unit
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Distribution {
    pub allocations: Vec<Allocation>,
    pub is_satisfiable: bool,
    pub total_allocated: Amount,
}

impl Distribution {
    pub fn requires_approval(&self) -> bool {
        self.allocations
            .iter()
            .any(|allocation| allocation.requires_approval)
    }
}

/// Splits `requested` across policies in priority order (lower number
/// first, ties broken by lexicographic policy id). Zero-capacity policies
/// never receive an allocation; a residue lands on the first
/// negative-allowed assignment or marks the distribution unsatisfiable.
pub fn distribute(resource_balance: &ResourceBalance, requested: Amount) -> Distribution {
    let unit = requested.unit;
    let zero = Amount::zero(unit);

    let mut entries: Vec<&PolicyBalance> = resource_balance.policies.iter().collect();
    entries.sort_by(|a, b| {
        (a.priority(), &a.assignment.policy_id).cmp(&(b.priority(), &b.assignment.policy_id))
    });

    let mut allocations: Vec<Allocation> = Vec::new();
    let mut remaining = requested;

    for entry in &entries {
        if !remaining.is_positive() {
            break;
        }
        let capacity = entry.available().max(&zero);
        if !capacity.is_positive() {
            continue;
        }
        let take = remaining.min(&capacity);
        allocations.push(Allocation {
            policy_id: entry.assignment.policy_id.clone(),
            amount: take,
            requires_approval: entry.assignment.requires_approval,
        });
        remaining = remaining.sub(&take);
    }

    let mut is_satisfiable = true;
    if remaining.is_positive() {
        match entries
            .iter()
            .find(|entry| entry.assignment.allow_negative)
        {
            Some(sink) => {
                let sink_id = &sink.assignment.policy_id;
                match allocations
                    .iter_mut()
                    .find(|allocation| &allocation.policy_id == sink_id)
                {
                    Some(existing) => existing.amount = existing.amount.add(&remaining),
                    None => allocations.push(Allocation {
                        policy_id: sink_id.clone(),
                        amount: remaining,
                        requires_approval: sink.assignment.requires_approval,
                    }),
                }
            }
            None => is_satisfiable = false,
        }
    }

    let total_allocated = allocations
        .iter()
        .fold(zero, |acc, allocation| acc.add(&allocation.amount));

    Distribution {
        allocations,
        is_satisfiable,
        total_allocated,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::period::Period;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, m, d).unwrap()
    }

    fn days(value: Decimal) -> Amount {
        Amount::new(value, Unit::Days)
    }

    fn entry(
        policy_id: &str,
        available: Decimal,
        priority: i32,
        allow_negative: bool,
    ) -> PolicyBalance {
        let mut balance = Balance::empty(
            "emp-1",
            policy_id,
            Period::new(date(1, 1), date(12, 31)).unwrap(),
            Unit::Days,
        );
        balance.total_entitlement = days(available);
        PolicyBalance {
            assignment: Assignment {
                id: Uuid::new_v4(),
                entity_id: "emp-1".to_string(),
                policy_id: policy_id.to_string(),
                priority,
                allow_negative,
                requires_approval: false,
                active_from: date(1, 1),
                active_to: None,
                created_at: Utc::now(),
            },
            balance,
            mode: ConsumptionMode::ConsumeAhead,
        }
    }

    fn aggregate(policies: Vec<PolicyBalance>) -> ResourceBalance {
        ResourceBalance::new("emp-1", "time_off", date(6, 1), Unit::Days, policies)
    }

    #[test]
    fn priority_order_drains_higher_priority_first() {
        let balance = aggregate(vec![
            entry("pto-carryover", dec!(3), 1, false),
            entry("pto-bonus", dec!(5), 2, false),
            entry("pto-standard", dec!(20), 3, false),
        ]);

        let distribution = distribute(&balance, days(dec!(10)));

        assert!(distribution.is_satisfiable);
        let split: Vec<(String, Decimal)> = distribution
            .allocations
            .iter()
            .map(|a| (a.policy_id.clone(), a.amount.value))
            .collect();
        assert_eq!(
            split,
            vec![
                ("pto-carryover".to_string(), dec!(3)),
                ("pto-bonus".to_string(), dec!(5)),
                ("pto-standard".to_string(), dec!(2)),
            ]
        );
        assert_eq!(distribution.total_allocated.value, dec!(10));
    }

    #[test]
    fn equal_priorities_break_ties_lexicographically() {
        let balance = aggregate(vec![
            entry("pto-b", dec!(5), 1, false),
            entry("pto-a", dec!(5), 1, false),
        ]);

        let distribution = distribute(&balance, days(dec!(6)));

        assert_eq!(distribution.allocations[0].policy_id, "pto-a");
        assert_eq!(distribution.allocations[0].amount.value, dec!(5));
        assert_eq!(distribution.allocations[1].policy_id, "pto-b");
        assert_eq!(distribution.allocations[1].amount.value, dec!(1));
    }

    #[test]
    fn zero_capacity_policies_are_skipped() {
        let balance = aggregate(vec![
            entry("pto-empty", dec!(0), 1, false),
            entry("pto-standard", dec!(10), 2, false),
        ]);

        let distribution = distribute(&balance, days(dec!(4)));

        assert_eq!(distribution.allocations.len(), 1);
        assert_eq!(distribution.allocations[0].policy_id, "pto-standard");
    }

    #[test]
    fn residue_goes_to_first_negative_allowed_assignment() {
        let balance = aggregate(vec![
            entry("pto-carryover", dec!(2), 1, false),
            entry("pto-standard", dec!(3), 2, true),
        ]);

        let distribution = distribute(&balance, days(dec!(8)));

        assert!(distribution.is_satisfiable);
        assert_eq!(distribution.allocations.len(), 2);
        // 2 from carryover, 3 + 3 residue from the negative-allowed policy.
        assert_eq!(distribution.allocations[1].policy_id, "pto-standard");
        assert_eq!(distribution.allocations[1].amount.value, dec!(6));
        assert_eq!(distribution.total_allocated.value, dec!(8));
    }

    #[test]
    fn residue_without_negative_allowance_is_unsatisfiable() {
        let balance = aggregate(vec![entry("pto-standard", dec!(5), 1, false)]);

        let distribution = distribute(&balance, days(dec!(8)));

        assert!(!distribution.is_satisfiable);
        assert_eq!(distribution.total_allocated.value, dec!(5));
    }

    #[test]
    fn drained_negative_allowed_policy_still_absorbs_residue() {
        let balance = aggregate(vec![entry("pto-flex", dec!(0), 1, true)]);

        let distribution = distribute(&balance, days(dec!(4)));

        assert!(distribution.is_satisfiable);
        assert_eq!(distribution.allocations.len(), 1);
        assert_eq!(distribution.allocations[0].policy_id, "pto-flex");
        assert_eq!(distribution.allocations[0].amount.value, dec!(4));
    }
}
