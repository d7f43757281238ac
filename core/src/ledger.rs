//! The ledger service: the only write path into the raw facts.
//!
//! Every mutating operation follows the same shape:
//!   1. check the actor's capability (and institution scope),
//!   2. validate against the current period / catalog state,
//!   3. write the fact and append its audit event,
//!   4. call the aggregator for the (institution, period) key it touched.
//!
//! Steps 2–4 run inside one store transaction.

use crate::{
    aggregator::{Aggregator, RecomputeOutcome},
    config::LedgerConfig,
    error::{LedgerError, LedgerResult},
    event::{EventLogEntry, LedgerEvent},
    period::{self, Period},
    role::{Actor, Capability},
    store::{
        ExpenseEntry, Institution, LedgerStore, Municipality, NewInstitution, PayrollEntry, State,
        StudentCount,
    },
    types::{InstitutionId, ItemId, MetricKey, Money, PeriodId},
};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Quantity is fixed at one; totals equal the unit value.
pub const EXPENSE_QUANTITY: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewExpense {
    pub institution_id: InstitutionId,
    pub period_id: PeriodId,
    pub item_id: ItemId,
    pub unit_value: Money,
    #[serde(default)]
    pub note: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPayroll {
    pub institution_id: InstitutionId,
    pub period_id: PeriodId,
    pub salaries: Money,
    pub charges: Money,
    #[serde(default)]
    pub note: String,
}

pub struct LedgerService {
    config: LedgerConfig,
    store: LedgerStore,
}

impl LedgerService {
    pub fn new(config: LedgerConfig, store: LedgerStore) -> LedgerResult<Self> {
        store.set_busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
        Ok(Self { config, store })
    }

    /// Open (or create) the database at `path` and apply migrations.
    pub fn open(path: &str, config: LedgerConfig) -> LedgerResult<Self> {
        let store = LedgerStore::open(path)?;
        store.migrate()?;
        Self::new(config, store)
    }

    /// In-memory, migrated, test config.
    pub fn build_test() -> LedgerResult<Self> {
        let store = LedgerStore::in_memory()?;
        store.migrate()?;
        Self::new(LedgerConfig::default_test(), store)
    }

    /// A second service on its own connection to the same database file.
    pub fn reopen(&self) -> LedgerResult<Self> {
        Self::new(self.config.clone(), self.store.reopen()?)
    }

    pub fn store(&self) -> &LedgerStore {
        &self.store
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub(crate) fn aggregator(&self) -> Aggregator<'_> {
        Aggregator::new(&self.store, self.config.baseline_cost_per_student)
    }

    // ── Boundary checks ────────────────────────────────────────

    /// Role check plus, for institution-scoped roles, responsibility for
    /// `institution_id`.
    pub(crate) fn authorize(
        &self,
        actor: &Actor,
        capability: Capability,
        institution_id: Option<InstitutionId>,
    ) -> LedgerResult<()> {
        actor.require(capability)?;
        if let (true, Some(id)) = (actor.role.is_institution_scoped(), institution_id) {
            let institution = self.institution(id)?;
            if institution.responsible_user_id.as_deref() != Some(actor.user_id.as_str()) {
                log::warn!(
                    "institution={id} ledger: {} denied {capability}, not responsible",
                    actor.user_id
                );
                return Err(LedgerError::PermissionDenied { role: actor.role, capability });
            }
        }
        Ok(())
    }

    pub(crate) fn record(&self, actor: Option<&Actor>, event: &LedgerEvent) -> LedgerResult<()> {
        let entry = EventLogEntry::new(actor.map(|a| a.user_id.as_str()), event)?;
        self.store.append_event(&entry)
    }

    fn institution(&self, institution_id: InstitutionId) -> LedgerResult<Institution> {
        self.store
            .institution(institution_id)?
            .ok_or_else(|| LedgerError::not_found("institution", institution_id))
    }

    pub(crate) fn period(&self, period_id: PeriodId) -> LedgerResult<Period> {
        self.store
            .period(period_id)?
            .ok_or_else(|| LedgerError::not_found("period", period_id))
    }

    /// The period, if it is still accepting entries.
    pub(crate) fn writable_period(&self, period_id: PeriodId) -> LedgerResult<Period> {
        let period = self.period(period_id)?;
        if !period.open {
            return Err(LedgerError::ClosedPeriod { label: period.label() });
        }
        Ok(period)
    }

    fn recompute(&self, key: MetricKey, actor: &Actor) -> LedgerResult<RecomputeOutcome> {
        self.aggregator().recompute(key, Some(&actor.user_id))
    }

    // ── Periods ────────────────────────────────────────────────

    /// Create an open period for (year, month).
    pub fn create_period(&self, actor: &Actor, year: i32, month: u32) -> LedgerResult<Period> {
        self.authorize(actor, Capability::ManagePeriods, None)?;
        period::validate_month(year, month)?;
        self.store.atomic(|store| {
            if store.period_by_month(year, month)?.is_some() {
                return Err(LedgerError::Validation(format!(
                    "period {month:02}/{year} already exists"
                )));
            }
            let period_id = store.insert_period(year, month, true)?;
            self.record(Some(actor), &LedgerEvent::PeriodOpened { period_id, year, month })?;
            log::info!("period={month:02}/{year} ledger: opened");
            self.period(period_id)
        })
    }

    pub fn close_period(&self, actor: &Actor, period_id: PeriodId) -> LedgerResult<Period> {
        self.set_period_open(actor, period_id, false)
    }

    pub fn reopen_period(&self, actor: &Actor, period_id: PeriodId) -> LedgerResult<Period> {
        self.set_period_open(actor, period_id, true)
    }

    fn set_period_open(&self, actor: &Actor, period_id: PeriodId, open: bool) -> LedgerResult<Period> {
        self.authorize(actor, Capability::ManagePeriods, None)?;
        self.store.atomic(|store| {
            if !store.set_period_open(period_id, open)? {
                return Err(LedgerError::not_found("period", period_id));
            }
            let event = if open {
                LedgerEvent::PeriodReopened { period_id }
            } else {
                LedgerEvent::PeriodClosed { period_id }
            };
            self.record(Some(actor), &event)?;
            self.period(period_id)
        })
    }

    /// All periods, newest first.
    pub fn periods(&self) -> LedgerResult<Vec<Period>> {
        self.store.periods()
    }

    // ── Institutions ───────────────────────────────────────────

    pub fn create_institution(&self, actor: &Actor, new: NewInstitution) -> LedgerResult<Institution> {
        self.authorize(actor, Capability::ManageInstitutions, None)?;
        if new.name.trim().is_empty() {
            return Err(LedgerError::Validation("institution name is empty".into()));
        }
        if self.store.municipality(new.municipality_id)?.is_none() {
            return Err(LedgerError::not_found("municipality", new.municipality_id));
        }
        let institution_id = self.store.insert_institution(&new)?;
        self.institution(institution_id)
    }

    pub fn institutions(&self) -> LedgerResult<Vec<Institution>> {
        self.store.institutions()
    }

    pub fn states(&self) -> LedgerResult<Vec<State>> {
        self.store.states()
    }

    /// Municipalities of `state_code`, or all of them.
    pub fn municipalities(&self, state_code: Option<&str>) -> LedgerResult<Vec<Municipality>> {
        self.store.municipalities(state_code)
    }

    pub fn find_municipality(&self, name: &str, state_code: &str) -> LedgerResult<Municipality> {
        self.store
            .municipality_by_name(name, state_code)?
            .ok_or_else(|| LedgerError::not_found("municipality", format!("{name}/{state_code}")))
    }

    pub fn assign_responsible(
        &self,
        actor: &Actor,
        institution_id: InstitutionId,
        user_id: &str,
    ) -> LedgerResult<Institution> {
        self.authorize(actor, Capability::ManageInstitutions, None)?;
        if self.store.account(user_id)?.is_none() {
            return Err(LedgerError::not_found("account", user_id));
        }
        if !self.store.set_institution_responsible(institution_id, user_id)? {
            return Err(LedgerError::not_found("institution", institution_id));
        }
        self.institution(institution_id)
    }

    // ── Expense entries ────────────────────────────────────────

    pub fn record_expense(&self, actor: &Actor, new: NewExpense) -> LedgerResult<ExpenseEntry> {
        self.authorize(actor, Capability::RecordExpense, Some(new.institution_id))?;
        require_non_negative("unit value", new.unit_value)?;
        self.store.atomic(|store| {
            let entry = self.insert_expense(store, actor, &new, None)?;
            self.recompute(entry.key(), actor)?;
            Ok(entry)
        })
    }

    /// Shared by single and combo-batch entry. Does not recompute.
    pub(crate) fn insert_expense(
        &self,
        store: &LedgerStore,
        actor: &Actor,
        new: &NewExpense,
        combo_id: Option<i64>,
    ) -> LedgerResult<ExpenseEntry> {
        self.writable_period(new.period_id)?;
        self.institution(new.institution_id)?;
        if store.item(new.item_id)?.is_none() {
            return Err(LedgerError::not_found("expense item", new.item_id));
        }
        let key = MetricKey::new(new.institution_id, new.period_id);
        if store.expense_exists(key, new.item_id)? {
            return Err(LedgerError::DuplicateExpense {
                institution_id: new.institution_id,
                period_id: new.period_id,
                item_id: new.item_id,
            });
        }

        let mut entry = ExpenseEntry {
            entry_id: 0,
            institution_id: new.institution_id,
            period_id: new.period_id,
            item_id: new.item_id,
            combo_id,
            quantity: EXPENSE_QUANTITY,
            unit_value: new.unit_value,
            total_value: new.unit_value * Decimal::from(EXPENSE_QUANTITY),
            note: new.note.clone(),
            recorded_by: actor.user_id.clone(),
            recorded_at: Utc::now(),
        };
        entry.entry_id = store.insert_expense(&entry)?;

        self.record(
            Some(actor),
            &LedgerEvent::ExpenseRecorded {
                entry_id: entry.entry_id,
                institution_id: entry.institution_id,
                period_id: entry.period_id,
                item_id: entry.item_id,
                total_value: entry.total_value,
            },
        )?;
        Ok(entry)
    }

    pub fn update_expense(
        &self,
        actor: &Actor,
        entry_id: i64,
        unit_value: Money,
        note: Option<String>,
    ) -> LedgerResult<ExpenseEntry> {
        require_non_negative("unit value", unit_value)?;
        let existing = self
            .store
            .expense(entry_id)?
            .ok_or_else(|| LedgerError::not_found("expense entry", entry_id))?;
        self.authorize(actor, Capability::RecordExpense, Some(existing.institution_id))?;

        self.store.atomic(|store| {
            self.writable_period(existing.period_id)?;
            let total_value = unit_value * Decimal::from(existing.quantity);
            let note = note.unwrap_or_else(|| existing.note.clone());
            store.update_expense_value(entry_id, unit_value, total_value, &note)?;
            self.record(Some(actor), &LedgerEvent::ExpenseUpdated { entry_id, total_value })?;
            self.recompute(existing.key(), actor)?;
            store
                .expense(entry_id)?
                .ok_or_else(|| LedgerError::not_found("expense entry", entry_id))
        })
    }

    pub fn delete_expense(&self, actor: &Actor, entry_id: i64) -> LedgerResult<()> {
        let existing = self
            .store
            .expense(entry_id)?
            .ok_or_else(|| LedgerError::not_found("expense entry", entry_id))?;
        self.authorize(actor, Capability::RecordExpense, Some(existing.institution_id))?;

        self.store.atomic(|store| {
            self.writable_period(existing.period_id)?;
            store.delete_expense(entry_id)?;
            self.record(
                Some(actor),
                &LedgerEvent::ExpenseDeleted {
                    entry_id,
                    institution_id: existing.institution_id,
                    period_id: existing.period_id,
                },
            )?;
            self.recompute(existing.key(), actor)?;
            Ok(())
        })
    }

    pub fn expenses_for(&self, actor: &Actor, key: MetricKey) -> LedgerResult<Vec<ExpenseEntry>> {
        self.authorize(actor, Capability::ViewReports, Some(key.institution_id))?;
        self.store.expenses_for(key)
    }

    // ── Payroll ────────────────────────────────────────────────

    pub fn record_payroll(&self, actor: &Actor, new: NewPayroll) -> LedgerResult<PayrollEntry> {
        self.authorize(actor, Capability::RecordPayroll, Some(new.institution_id))?;
        require_non_negative("salaries", new.salaries)?;
        require_non_negative("charges", new.charges)?;
        self.institution(new.institution_id)?;

        self.store.atomic(|store| {
            self.writable_period(new.period_id)?;
            let mut entry = PayrollEntry {
                payroll_id: 0,
                institution_id: new.institution_id,
                period_id: new.period_id,
                salaries: new.salaries,
                charges: new.charges,
                total: new.salaries + new.charges,
                note: new.note.clone(),
                processed_by: actor.user_id.clone(),
                processed_at: Utc::now(),
            };
            entry.payroll_id = store.insert_payroll(&entry)?;
            self.record(
                Some(actor),
                &LedgerEvent::PayrollRecorded {
                    payroll_id: entry.payroll_id,
                    institution_id: entry.institution_id,
                    period_id: entry.period_id,
                    total: entry.total,
                },
            )?;
            self.recompute(entry.key(), actor)?;
            Ok(entry)
        })
    }

    pub fn update_payroll(
        &self,
        actor: &Actor,
        payroll_id: i64,
        salaries: Money,
        charges: Money,
    ) -> LedgerResult<PayrollEntry> {
        require_non_negative("salaries", salaries)?;
        require_non_negative("charges", charges)?;
        let existing = self
            .store
            .payroll(payroll_id)?
            .ok_or_else(|| LedgerError::not_found("payroll entry", payroll_id))?;
        self.authorize(actor, Capability::RecordPayroll, Some(existing.institution_id))?;

        self.store.atomic(|store| {
            self.writable_period(existing.period_id)?;
            let total = salaries + charges;
            store.update_payroll_amounts(payroll_id, salaries, charges, total)?;
            self.record(Some(actor), &LedgerEvent::PayrollUpdated { payroll_id, total })?;
            self.recompute(existing.key(), actor)?;
            store
                .payroll(payroll_id)?
                .ok_or_else(|| LedgerError::not_found("payroll entry", payroll_id))
        })
    }

    pub fn delete_payroll(&self, actor: &Actor, payroll_id: i64) -> LedgerResult<()> {
        let existing = self
            .store
            .payroll(payroll_id)?
            .ok_or_else(|| LedgerError::not_found("payroll entry", payroll_id))?;
        self.authorize(actor, Capability::RecordPayroll, Some(existing.institution_id))?;

        self.store.atomic(|store| {
            self.writable_period(existing.period_id)?;
            store.delete_payroll(payroll_id)?;
            self.record(
                Some(actor),
                &LedgerEvent::PayrollDeleted {
                    payroll_id,
                    institution_id: existing.institution_id,
                    period_id: existing.period_id,
                },
            )?;
            self.recompute(existing.key(), actor)?;
            Ok(())
        })
    }

    pub fn payrolls_for(&self, actor: &Actor, key: MetricKey) -> LedgerResult<Vec<PayrollEntry>> {
        self.authorize(actor, Capability::ViewReports, Some(key.institution_id))?;
        self.store.payrolls_for(key)
    }

    // ── Student counts ─────────────────────────────────────────

    /// Report (or replace) the student count for a key.
    ///
    /// Not gated by the period's open flag: counts arrive late and are
    /// what unblocks a deferred metric.
    pub fn record_student_count(
        &self,
        actor: &Actor,
        institution_id: InstitutionId,
        period_id: PeriodId,
        students: u32,
    ) -> LedgerResult<StudentCount> {
        self.authorize(actor, Capability::RecordStudentCount, Some(institution_id))?;
        self.period(period_id)?;

        self.store.atomic(|store| {
            let count = StudentCount {
                institution_id,
                period_id,
                students,
                reported_by: actor.user_id.clone(),
                reported_at: Utc::now(),
            };
            store.upsert_student_count(&count)?;
            self.record(
                Some(actor),
                &LedgerEvent::StudentCountRecorded { institution_id, period_id, students },
            )?;
            self.recompute(MetricKey::new(institution_id, period_id), actor)?;
            Ok(count)
        })
    }

    /// Remove the count. The aggregator then defers, leaving the last
    /// metric row in place.
    pub fn delete_student_count(
        &self,
        actor: &Actor,
        institution_id: InstitutionId,
        period_id: PeriodId,
    ) -> LedgerResult<()> {
        self.authorize(actor, Capability::RecordStudentCount, Some(institution_id))?;
        let key = MetricKey::new(institution_id, period_id);
        self.store.atomic(|store| {
            if !store.delete_student_count(key)? {
                return Err(LedgerError::not_found("student count", key));
            }
            self.record(
                Some(actor),
                &LedgerEvent::StudentCountDeleted { institution_id, period_id },
            )?;
            self.recompute(key, actor)?;
            Ok(())
        })
    }
}

fn require_non_negative(field: &str, value: Money) -> LedgerResult<()> {
    if value < Decimal::ZERO {
        return Err(LedgerError::Validation(format!("{field} must not be negative, got {value}")));
    }
    Ok(())
}
