use std::sync::Arc;

use anyhow::Result;

use crate::domain::policy::PolicyCatalog;
use crate::infrastructure::config::Config;
use crate::infrastructure::db::PgPool;
use crate::infrastructure::store::{
    build_assignment_store, build_store, AssignmentStore, TransactionStore,
};
use crate::services::aggregation::BalanceAggregator;
use crate::services::calculator::BalanceCalculator;
use crate::services::ledger::Ledger;
use crate::services::periods::PeriodManager;
use crate::services::projection::ProjectionEngine;
use crate::services::reconciliation::ReconciliationEngine;
use crate::services::requests::RequestService;

/// Shared wiring for the engine: configuration, stores, policy catalog, and
/// the ledger. Services are built from this state on demand.
pub struct EngineState {
    pub config: Arc<Config>,
    pub store: Arc<dyn TransactionStore>,
    pub assignments: Arc<dyn AssignmentStore>,
    pub catalog: Arc<PolicyCatalog>,
    pub ledger: Arc<Ledger>,
}

impl EngineState {
    pub fn new(config: Arc<Config>, pool: Option<PgPool>) -> Result<Self> {
        let store = build_store(&config.store, pool.clone())?;
        let assignments = build_assignment_store(&config.store, pool)?;
        let ledger = Arc::new(Ledger::new(Arc::clone(&store)));
        Ok(Self {
            config,
            store,
            assignments,
            catalog: Arc::new(PolicyCatalog::new()),
            ledger,
        })
    }

    pub fn calculator(&self) -> BalanceCalculator {
        BalanceCalculator::new(Arc::clone(&self.ledger))
    }

    pub fn projection_engine(&self) -> ProjectionEngine {
        ProjectionEngine::new(self.calculator())
    }

    pub fn balance_aggregator(&self) -> BalanceAggregator {
        BalanceAggregator::new(
            self.calculator(),
            Arc::clone(&self.assignments),
            Arc::clone(&self.catalog),
        )
    }

    pub fn request_service(&self) -> RequestService {
        RequestService::new(
            Arc::clone(&self.ledger),
            self.balance_aggregator(),
            Arc::clone(&self.catalog),
        )
    }

    pub fn period_manager(&self) -> PeriodManager {
        PeriodManager::new(
            Arc::clone(&self.ledger),
            self.calculator(),
            ReconciliationEngine::new(self.config.engine.actor.clone()),
            self.config.engine.snapshot_on_close,
        )
    }
}
