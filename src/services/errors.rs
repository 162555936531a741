use chrono::NaiveDate;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::amount::{Amount, Unit};

/// Failure classes callers dispatch on: client errors are not retried,
/// not-found signals a lookup miss, retryable covers transient store
/// conflicts, fatal marks programmer errors that must surface loudly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Client,
    NotFound,
    Retryable,
    Fatal,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("duplicate idempotency key {key}")]
    DuplicateIdempotencyKey { key: String },

    #[error("consumption already recorded for {date} by transaction {existing_tx}")]
    DuplicateDayConsumption {
        date: NaiveDate,
        existing_tx: Uuid,
    },

    #[error("insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance {
        available: Amount,
        requested: Amount,
        shortfall: Amount,
    },

    #[error("concurrent modification, safe to retry")]
    ConcurrentModification,

    #[error("policy {id} not found")]
    PolicyNotFound { id: String },

    #[error("entity {id} not found")]
    EntityNotFound { id: String },

    #[error("invalid period: {reason}")]
    InvalidPeriod { reason: String },

    #[error("unit mismatch: expected {expected}, got {actual}")]
    UnitMismatch { expected: Unit, actual: Unit },

    #[error("invalid request transition: {operation} from {from}")]
    InvalidTransition { from: String, operation: String },

    #[error("store error: {message}")]
    Store { message: String, retryable: bool },
}

impl EngineError {
    pub fn store(err: impl std::fmt::Display) -> Self {
        EngineError::Store {
            message: err.to_string(),
            retryable: false,
        }
    }

    pub fn store_retryable(err: impl std::fmt::Display) -> Self {
        EngineError::Store {
            message: err.to_string(),
            retryable: true,
        }
    }

    pub fn insufficient(available: Amount, requested: Amount) -> Self {
        EngineError::InsufficientBalance {
            available,
            requested,
            shortfall: requested.sub(&available),
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            EngineError::DuplicateIdempotencyKey { .. }
            | EngineError::DuplicateDayConsumption { .. }
            | EngineError::InsufficientBalance { .. }
            | EngineError::InvalidPeriod { .. } => ErrorClass::Client,
            EngineError::PolicyNotFound { .. } | EngineError::EntityNotFound { .. } => {
                ErrorClass::NotFound
            }
            EngineError::ConcurrentModification => ErrorClass::Retryable,
            EngineError::Store { retryable, .. } => {
                if *retryable {
                    ErrorClass::Retryable
                } else {
                    ErrorClass::Fatal
                }
            }
            EngineError::UnitMismatch { .. } | EngineError::InvalidTransition { .. } => {
                ErrorClass::Fatal
            }
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Retryable
    }
}

impl From<sqlx::Error> for EngineError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                // The only unique constraint on the ledger is the
                // idempotency key; the colliding key is recovered by the
                // store before reaching here when it is known.
                EngineError::DuplicateIdempotencyKey {
                    key: db.constraint().unwrap_or("unknown").to_string(),
                }
            }
            sqlx::Error::Database(db) if db.code().as_deref() == Some("40001") => {
                EngineError::ConcurrentModification
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => EngineError::store_retryable(err),
            _ => EngineError::store(err),
        }
    }
}
