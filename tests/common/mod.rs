#![allow(dead_code)]

use std::sync::Arc;

use accrual_engine::domain::models::Assignment;
use accrual_engine::infrastructure::config::{Config, DatabaseConfig, EngineSettings, StoreConfig};
use accrual_engine::infrastructure::state::EngineState;
use accrual_engine::infrastructure::store::AssignmentStore;
use accrual_engine::services::projection::ProjectionEngine;
use accrual_engine::services::requests::RequestService;
use accrual_engine::{
    AccrualConfig, Amount, ConsumptionMode, Ledger, Period, PeriodConfig, Policy, PolicyCatalog,
    PolicyConstraints, Unit,
};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn days(value: Decimal) -> Amount {
    Amount::new(value, Unit::Days)
}

pub fn year_2025() -> Period {
    Period::new(date(2025, 1, 1), date(2025, 12, 31)).unwrap()
}

pub fn upfront_policy(id: &str, amount: Decimal) -> Policy {
    Policy {
        id: id.to_string(),
        name: id.to_string(),
        resource_type: "time_off".to_string(),
        unit: Unit::Days,
        period: PeriodConfig::CalendarYear,
        accrual: AccrualConfig::Upfront {
            amount: days(amount),
        },
        consumption_mode: ConsumptionMode::ConsumeAhead,
        unique_per_time_point: false,
        constraints: PolicyConstraints::default(),
        reconciliation: Vec::new(),
        version: 1,
        effective_at: Utc::now(),
    }
}

pub fn monthly_policy(id: &str, annual: Decimal, mode: ConsumptionMode) -> Policy {
    Policy {
        id: id.to_string(),
        name: id.to_string(),
        resource_type: "time_off".to_string(),
        unit: Unit::Days,
        period: PeriodConfig::CalendarYear,
        accrual: AccrualConfig::Monthly {
            per_month: Amount::new(annual / Decimal::from(12), Unit::Days),
            prorate_partial: false,
        },
        consumption_mode: mode,
        unique_per_time_point: false,
        constraints: PolicyConstraints::default(),
        reconciliation: Vec::new(),
        version: 1,
        effective_at: Utc::now(),
    }
}

pub fn assignment(entity_id: &str, policy_id: &str, priority: i32) -> Assignment {
    Assignment {
        id: Uuid::new_v4(),
        entity_id: entity_id.to_string(),
        policy_id: policy_id.to_string(),
        priority,
        allow_negative: false,
        requires_approval: false,
        active_from: date(2020, 1, 1),
        active_to: None,
        created_at: Utc::now(),
    }
}

pub struct Engine {
    pub state: EngineState,
    pub ledger: Arc<Ledger>,
    pub catalog: Arc<PolicyCatalog>,
    pub projection: ProjectionEngine,
    pub requests: RequestService,
}

/// Wires the full engine over the in-memory store via default config.
pub async fn engine(policies: Vec<Policy>, bindings: Vec<Assignment>) -> Engine {
    let config = Config {
        database: DatabaseConfig::default(),
        store: StoreConfig::default(),
        engine: EngineSettings::default(),
    };
    let state = EngineState::new(Arc::new(config), None).expect("memory-backed engine state");

    for policy in policies {
        state.catalog.register(policy);
    }
    for binding in bindings {
        state.assignments.put(binding).await.unwrap();
    }

    let ledger = Arc::clone(&state.ledger);
    let catalog = Arc::clone(&state.catalog);
    let projection = state.projection_engine();
    let requests = state.request_service();

    Engine {
        state,
        ledger,
        catalog,
        projection,
        requests,
    }
}
