//! Domain-agnostic resource accounting engine.
//!
//! Tracks divisible resources (vacation days, wellness points, learning
//! budgets) per entity, per policy, per period, on top of an append-only
//! transaction ledger. The engine answers how much of a resource an entity
//! has available and whether a consumption request is valid, and records
//! every answer as immutable ledger entries.

pub mod domain;
pub mod infrastructure;
pub mod services;
pub mod telemetry;

pub use domain::accrual::{AccrualEvent, AccrualSchedule};
pub use domain::amount::{Amount, Unit};
pub use domain::balance::Balance;
pub use domain::models::{
    Allocation, Assignment, RequestStatus, ResourceRequest, Transaction, TransactionType,
};
pub use domain::period::{Period, PeriodConfig};
pub use domain::policy::{
    AccrualConfig, ConsumptionMode, Policy, PolicyCatalog, PolicyConstraints,
    ReconciliationAction, ReconciliationRule, ReconciliationTrigger,
};
pub use domain::time::{Granularity, TimePoint};
pub use services::errors::{EngineError, ErrorClass};
pub use services::ledger::Ledger;
