//! Store methods for the raw facts: expense entries, payroll, student counts.
//!
//! Writing a fact here does NOT refresh the derived metric. The service
//! calls the aggregator for the key after every write in the same
//! transaction.

use super::{decimal_at, LedgerStore};
use crate::{
    error::LedgerResult,
    types::{ComboId, InstitutionId, ItemId, MetricKey, Money, PeriodId, UserId},
};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpenseEntry {
    pub entry_id: i64,
    pub institution_id: InstitutionId,
    pub period_id: PeriodId,
    pub item_id: ItemId,
    pub combo_id: Option<ComboId>,
    /// Always 1; total_value = unit_value × quantity.
    pub quantity: u32,
    pub unit_value: Money,
    pub total_value: Money,
    pub note: String,
    pub recorded_by: UserId,
    pub recorded_at: DateTime<Utc>,
}

impl ExpenseEntry {
    pub fn key(&self) -> MetricKey {
        MetricKey::new(self.institution_id, self.period_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayrollEntry {
    pub payroll_id: i64,
    pub institution_id: InstitutionId,
    pub period_id: PeriodId,
    pub salaries: Money,
    pub charges: Money,
    /// salaries + charges
    pub total: Money,
    pub note: String,
    pub processed_by: UserId,
    pub processed_at: DateTime<Utc>,
}

impl PayrollEntry {
    pub fn key(&self) -> MetricKey {
        MetricKey::new(self.institution_id, self.period_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentCount {
    pub institution_id: InstitutionId,
    pub period_id: PeriodId,
    pub students: u32,
    pub reported_by: UserId,
    pub reported_at: DateTime<Utc>,
}

const EXPENSE_COLUMNS: &str = "entry_id, institution_id, period_id, item_id, combo_id, quantity,
     unit_value, total_value, note, recorded_by, recorded_at";

const PAYROLL_COLUMNS: &str = "payroll_id, institution_id, period_id, salaries, charges, total,
     note, processed_by, processed_at";

fn expense_from_row(r: &Row<'_>) -> rusqlite::Result<ExpenseEntry> {
    Ok(ExpenseEntry {
        entry_id: r.get(0)?,
        institution_id: r.get(1)?,
        period_id: r.get(2)?,
        item_id: r.get(3)?,
        combo_id: r.get(4)?,
        quantity: r.get(5)?,
        unit_value: decimal_at(r, 6)?,
        total_value: decimal_at(r, 7)?,
        note: r.get(8)?,
        recorded_by: r.get(9)?,
        recorded_at: r.get(10)?,
    })
}

fn payroll_from_row(r: &Row<'_>) -> rusqlite::Result<PayrollEntry> {
    Ok(PayrollEntry {
        payroll_id: r.get(0)?,
        institution_id: r.get(1)?,
        period_id: r.get(2)?,
        salaries: decimal_at(r, 3)?,
        charges: decimal_at(r, 4)?,
        total: decimal_at(r, 5)?,
        note: r.get(6)?,
        processed_by: r.get(7)?,
        processed_at: r.get(8)?,
    })
}

impl LedgerStore {
    // ── Expense entries ────────────────────────────────────────

    /// Insert an expense; `entry.entry_id` is ignored and the new id returned.
    pub fn insert_expense(&self, entry: &ExpenseEntry) -> LedgerResult<i64> {
        self.conn.execute(
            "INSERT INTO expense_entry (
                institution_id, period_id, item_id, combo_id, quantity,
                unit_value, total_value, note, recorded_by, recorded_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                entry.institution_id,
                entry.period_id,
                entry.item_id,
                entry.combo_id,
                entry.quantity,
                entry.unit_value.to_string(),
                entry.total_value.to_string(),
                entry.note,
                entry.recorded_by,
                entry.recorded_at,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn expense(&self, entry_id: i64) -> LedgerResult<Option<ExpenseEntry>> {
        Ok(self
            .conn
            .query_row(
                &format!("SELECT {EXPENSE_COLUMNS} FROM expense_entry WHERE entry_id = ?1"),
                params![entry_id],
                expense_from_row,
            )
            .optional()?)
    }

    pub fn expense_exists(&self, key: MetricKey, item_id: ItemId) -> LedgerResult<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM expense_entry
             WHERE institution_id = ?1 AND period_id = ?2 AND item_id = ?3",
            params![key.institution_id, key.period_id, item_id],
            |r| r.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn expenses_for(&self, key: MetricKey) -> LedgerResult<Vec<ExpenseEntry>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {EXPENSE_COLUMNS} FROM expense_entry
             WHERE institution_id = ?1 AND period_id = ?2
             ORDER BY entry_id ASC"
        ))?;
        let rows = stmt.query_map(params![key.institution_id, key.period_id], expense_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn update_expense_value(
        &self,
        entry_id: i64,
        unit_value: Money,
        total_value: Money,
        note: &str,
    ) -> LedgerResult<()> {
        self.conn.execute(
            "UPDATE expense_entry SET unit_value = ?1, total_value = ?2, note = ?3
             WHERE entry_id = ?4",
            params![unit_value.to_string(), total_value.to_string(), note, entry_id],
        )?;
        Ok(())
    }

    pub fn delete_expense(&self, entry_id: i64) -> LedgerResult<()> {
        self.conn
            .execute("DELETE FROM expense_entry WHERE entry_id = ?1", params![entry_id])?;
        Ok(())
    }

    /// Sum of expense totals for the key. Summed as decimals, not in SQL.
    pub fn sum_expense_totals(&self, key: MetricKey) -> LedgerResult<Money> {
        self.sum_money_column(
            "SELECT total_value FROM expense_entry WHERE institution_id = ?1 AND period_id = ?2",
            key,
        )
    }

    // ── Payroll ────────────────────────────────────────────────

    pub fn insert_payroll(&self, entry: &PayrollEntry) -> LedgerResult<i64> {
        self.conn.execute(
            "INSERT INTO payroll_entry (
                institution_id, period_id, salaries, charges, total,
                note, processed_by, processed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                entry.institution_id,
                entry.period_id,
                entry.salaries.to_string(),
                entry.charges.to_string(),
                entry.total.to_string(),
                entry.note,
                entry.processed_by,
                entry.processed_at,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn payroll(&self, payroll_id: i64) -> LedgerResult<Option<PayrollEntry>> {
        Ok(self
            .conn
            .query_row(
                &format!("SELECT {PAYROLL_COLUMNS} FROM payroll_entry WHERE payroll_id = ?1"),
                params![payroll_id],
                payroll_from_row,
            )
            .optional()?)
    }

    pub fn payrolls_for(&self, key: MetricKey) -> LedgerResult<Vec<PayrollEntry>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {PAYROLL_COLUMNS} FROM payroll_entry
             WHERE institution_id = ?1 AND period_id = ?2
             ORDER BY payroll_id ASC"
        ))?;
        let rows = stmt.query_map(params![key.institution_id, key.period_id], payroll_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn update_payroll_amounts(
        &self,
        payroll_id: i64,
        salaries: Money,
        charges: Money,
        total: Money,
    ) -> LedgerResult<()> {
        self.conn.execute(
            "UPDATE payroll_entry SET salaries = ?1, charges = ?2, total = ?3
             WHERE payroll_id = ?4",
            params![salaries.to_string(), charges.to_string(), total.to_string(), payroll_id],
        )?;
        Ok(())
    }

    pub fn delete_payroll(&self, payroll_id: i64) -> LedgerResult<()> {
        self.conn
            .execute("DELETE FROM payroll_entry WHERE payroll_id = ?1", params![payroll_id])?;
        Ok(())
    }

    pub fn sum_payroll_totals(&self, key: MetricKey) -> LedgerResult<Money> {
        self.sum_money_column(
            "SELECT total FROM payroll_entry WHERE institution_id = ?1 AND period_id = ?2",
            key,
        )
    }

    // ── Student counts ─────────────────────────────────────────

    /// One count per key; a second report replaces the first.
    pub fn upsert_student_count(&self, count: &StudentCount) -> LedgerResult<()> {
        self.conn.execute(
            "INSERT INTO student_count (institution_id, period_id, students, reported_by, reported_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(institution_id, period_id) DO UPDATE SET
                students = excluded.students,
                reported_by = excluded.reported_by,
                reported_at = excluded.reported_at",
            params![
                count.institution_id,
                count.period_id,
                count.students,
                count.reported_by,
                count.reported_at,
            ],
        )?;
        Ok(())
    }

    pub fn student_count(&self, key: MetricKey) -> LedgerResult<Option<StudentCount>> {
        Ok(self
            .conn
            .query_row(
                "SELECT institution_id, period_id, students, reported_by, reported_at
                 FROM student_count WHERE institution_id = ?1 AND period_id = ?2",
                params![key.institution_id, key.period_id],
                |r| {
                    Ok(StudentCount {
                        institution_id: r.get(0)?,
                        period_id: r.get(1)?,
                        students: r.get(2)?,
                        reported_by: r.get(3)?,
                        reported_at: r.get(4)?,
                    })
                },
            )
            .optional()?)
    }

    /// Returns false if there was no count to delete.
    pub fn delete_student_count(&self, key: MetricKey) -> LedgerResult<bool> {
        let changed = self.conn.execute(
            "DELETE FROM student_count WHERE institution_id = ?1 AND period_id = ?2",
            params![key.institution_id, key.period_id],
        )?;
        Ok(changed > 0)
    }

    fn sum_money_column(&self, sql: &str, key: MetricKey) -> LedgerResult<Money> {
        let mut stmt = self.conn.prepare(sql)?;
        let values = stmt
            .query_map(params![key.institution_id, key.period_id], |r| decimal_at(r, 0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(values.into_iter().fold(Decimal::ZERO, |acc, v| acc + v))
    }
}
