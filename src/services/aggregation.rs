//! Multi-policy balance aggregation for one (entity, resource) pair.

use chrono::{NaiveDate, TimeZone, Utc};
use std::sync::Arc;

use crate::domain::amount::Unit;
use crate::domain::policy::PolicyCatalog;
use crate::infrastructure::store::AssignmentStore;

use super::calculator::BalanceCalculator;
use super::distribution::{PolicyBalance, ResourceBalance};
use super::errors::EngineError;

pub struct BalanceAggregator {
    calculator: BalanceCalculator,
    assignments: Arc<dyn AssignmentStore>,
    catalog: Arc<PolicyCatalog>,
}

impl BalanceAggregator {
    pub fn new(
        calculator: BalanceCalculator,
        assignments: Arc<dyn AssignmentStore>,
        catalog: Arc<PolicyCatalog>,
    ) -> Self {
        Self {
            calculator,
            assignments,
            catalog,
        }
    }

    /// Builds the aggregate balance across every active assignment whose
    /// policy covers `resource_type`, each evaluated in its own current
    /// period. An entity with no active covering assignment is a lookup
    /// failure.
    pub async fn resource_balance(
        &self,
        entity_id: &str,
        resource_type: &str,
        as_of: NaiveDate,
    ) -> Result<ResourceBalance, EngineError> {
        let assignments = self.assignments.assignments_for(entity_id).await?;

        let version_cutoff = Utc.from_utc_datetime(
            &as_of
                .and_hms_opt(23, 59, 59)
                .unwrap_or_else(|| as_of.and_time(chrono::NaiveTime::MIN)),
        );

        let mut policies = Vec::new();
        let mut unit: Option<Unit> = None;
        for assignment in assignments
            .into_iter()
            .filter(|assignment| assignment.is_active(as_of))
        {
            let policy = self
                .catalog
                .resolve_at(&assignment.policy_id, version_cutoff)?;
            if policy.resource_type != resource_type {
                continue;
            }
            match unit {
                None => unit = Some(policy.unit),
                Some(expected) if expected != policy.unit => {
                    return Err(EngineError::UnitMismatch {
                        expected,
                        actual: policy.unit,
                    });
                }
                _ => {}
            }

            let period = policy.period.period_for(as_of)?;
            let balance = self
                .calculator
                .balance(entity_id, &policy, period, as_of)
                .await?;
            policies.push(PolicyBalance {
                assignment,
                balance,
                mode: policy.consumption_mode,
            });
        }

        let Some(unit) = unit else {
            return Err(EngineError::EntityNotFound {
                id: entity_id.to_string(),
            });
        };

        Ok(ResourceBalance::new(
            entity_id,
            resource_type,
            as_of,
            unit,
            policies,
        ))
    }
}
