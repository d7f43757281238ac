//! The audit log: one entry per mutation of the ledger.
//!
//! RULE: An event is appended inside the same transaction as the write it
//! describes, so the log never records a change that was rolled back.

use crate::types::{ComboId, InstitutionId, ItemId, Money, PeriodId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Every event the ledger records.
/// Variants may be added, never removed or reordered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    // ── Periods ────────────────────────────────────
    PeriodOpened {
        period_id: PeriodId,
        year: i32,
        month: u32,
    },
    PeriodClosed {
        period_id: PeriodId,
    },
    PeriodReopened {
        period_id: PeriodId,
    },

    // ── Raw facts ──────────────────────────────────
    ExpenseRecorded {
        entry_id: i64,
        institution_id: InstitutionId,
        period_id: PeriodId,
        item_id: ItemId,
        total_value: Money,
    },
    ExpenseUpdated {
        entry_id: i64,
        total_value: Money,
    },
    ExpenseDeleted {
        entry_id: i64,
        institution_id: InstitutionId,
        period_id: PeriodId,
    },
    ComboBatchRecorded {
        combo_id: ComboId,
        institution_id: InstitutionId,
        period_id: PeriodId,
        created: usize,
        skipped: usize,
    },
    PayrollRecorded {
        payroll_id: i64,
        institution_id: InstitutionId,
        period_id: PeriodId,
        total: Money,
    },
    PayrollUpdated {
        payroll_id: i64,
        total: Money,
    },
    PayrollDeleted {
        payroll_id: i64,
        institution_id: InstitutionId,
        period_id: PeriodId,
    },
    StudentCountRecorded {
        institution_id: InstitutionId,
        period_id: PeriodId,
        students: u32,
    },
    StudentCountDeleted {
        institution_id: InstitutionId,
        period_id: PeriodId,
    },

    // ── Derived metrics ────────────────────────────
    MetricRecomputed {
        institution_id: InstitutionId,
        period_id: PeriodId,
        cost_per_student: Money,
        efficiency_score: Money,
    },

    // ── Registration ───────────────────────────────
    RegistrationSubmitted {
        request_id: i64,
        requested_role: String,
    },
    RegistrationApproved {
        request_id: i64,
        account_id: UserId,
    },
    RegistrationRejected {
        request_id: i64,
    },
    AccountCreated {
        account_id: UserId,
        role: String,
    },
    AccountLoggedIn {
        account_id: UserId,
    },
}

impl LedgerEvent {
    /// Stable string name used for the event_type column.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::PeriodOpened { .. } => "period_opened",
            Self::PeriodClosed { .. } => "period_closed",
            Self::PeriodReopened { .. } => "period_reopened",
            Self::ExpenseRecorded { .. } => "expense_recorded",
            Self::ExpenseUpdated { .. } => "expense_updated",
            Self::ExpenseDeleted { .. } => "expense_deleted",
            Self::ComboBatchRecorded { .. } => "combo_batch_recorded",
            Self::PayrollRecorded { .. } => "payroll_recorded",
            Self::PayrollUpdated { .. } => "payroll_updated",
            Self::PayrollDeleted { .. } => "payroll_deleted",
            Self::StudentCountRecorded { .. } => "student_count_recorded",
            Self::StudentCountDeleted { .. } => "student_count_deleted",
            Self::MetricRecomputed { .. } => "metric_recomputed",
            Self::RegistrationSubmitted { .. } => "registration_submitted",
            Self::RegistrationApproved { .. } => "registration_approved",
            Self::RegistrationRejected { .. } => "registration_rejected",
            Self::AccountCreated { .. } => "account_created",
            Self::AccountLoggedIn { .. } => "account_logged_in",
        }
    }
}

/// The event log entry as persisted to SQLite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub id: Option<i64>,
    pub occurred_at: DateTime<Utc>,
    pub actor_id: Option<UserId>,
    pub event_type: String,
    pub payload: String, // JSON-serialized LedgerEvent
}

impl EventLogEntry {
    pub fn new(actor_id: Option<&str>, event: &LedgerEvent) -> serde_json::Result<Self> {
        Ok(Self {
            id: None,
            occurred_at: Utc::now(),
            actor_id: actor_id.map(str::to_string),
            event_type: event.type_name().to_string(),
            payload: serde_json::to_string(event)?,
        })
    }

    pub fn decode(&self) -> serde_json::Result<LedgerEvent> {
        serde_json::from_str(&self.payload)
    }
}
