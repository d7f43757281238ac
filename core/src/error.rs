use thiserror::Error;

use crate::{
    role::{Capability, Role},
    types::{InstitutionId, PeriodId},
};

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid decimal amount: {0}")]
    Decimal(#[from] rust_decimal::Error),

    #[error("Period {label} is closed for new entries")]
    ClosedPeriod { label: String },

    #[error("An entry for item {item_id} already exists for institution {institution_id} in period {period_id}")]
    DuplicateExpense {
        institution_id: InstitutionId,
        period_id: PeriodId,
        item_id: i64,
    },

    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },

    #[error("Role {role} may not {capability}")]
    PermissionDenied { role: Role, capability: Capability },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Aggregation failed for institution {institution_id}, period {period_id}: {reason}")]
    AggregationFailed {
        institution_id: InstitutionId,
        period_id: PeriodId,
        reason: String,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl LedgerError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound { entity, id: id.to_string() }
    }

    /// Whether the caller may retry the same operation unchanged.
    ///
    /// Aggregation failures roll back the whole write, and SQLite lock
    /// contention clears once the competing writer commits.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::AggregationFailed { .. } => true,
            Self::Database(rusqlite::Error::SqliteFailure(e, _)) => matches!(
                e.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;
