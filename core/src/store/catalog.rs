//! Store methods for the expense catalog and combo templates.

use super::{decimal_at, LedgerStore};
use crate::{
    error::LedgerResult,
    types::{ComboId, ItemId, Money, PeriodId},
};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpenseCategory {
    pub category_id: i64,
    pub code: String,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpenseItem {
    pub item_id: ItemId,
    pub name: String,
    pub description: Option<String>,
    pub category_id: i64,
    pub unit: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Combo {
    pub combo_id: ComboId,
    pub name: String,
    pub description: Option<String>,
    pub period_id: PeriodId,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// One catalog item inside a combo, with the value used to pre-fill batches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComboItem {
    pub combo_id: ComboId,
    pub item_id: ItemId,
    pub item_name: String,
    pub default_unit_value: Money,
}

const ITEM_COLUMNS: &str = "item_id, name, description, category_id, unit";
const COMBO_COLUMNS: &str = "combo_id, name, description, period_id, active, created_at";

fn item_from_row(r: &Row<'_>) -> rusqlite::Result<ExpenseItem> {
    Ok(ExpenseItem {
        item_id: r.get(0)?,
        name: r.get(1)?,
        description: r.get(2)?,
        category_id: r.get(3)?,
        unit: r.get(4)?,
    })
}

fn combo_from_row(r: &Row<'_>) -> rusqlite::Result<Combo> {
    Ok(Combo {
        combo_id: r.get(0)?,
        name: r.get(1)?,
        description: r.get(2)?,
        period_id: r.get(3)?,
        active: r.get(4)?,
        created_at: r.get(5)?,
    })
}

impl LedgerStore {
    // ── Categories ─────────────────────────────────────────────

    /// Insert or refresh a category keyed by its code.
    pub fn upsert_category(
        &self,
        code: &str,
        name: &str,
        description: Option<&str>,
    ) -> LedgerResult<i64> {
        Ok(self.conn.query_row(
            "INSERT INTO expense_category (code, name, description) VALUES (?1, ?2, ?3)
             ON CONFLICT(code) DO UPDATE SET
                name = excluded.name,
                description = excluded.description
             RETURNING category_id",
            params![code, name, description],
            |r| r.get(0),
        )?)
    }

    pub fn category_by_code(&self, code: &str) -> LedgerResult<Option<ExpenseCategory>> {
        Ok(self
            .conn
            .query_row(
                "SELECT category_id, code, name, description
                 FROM expense_category WHERE code = ?1",
                params![code],
                |r| {
                    Ok(ExpenseCategory {
                        category_id: r.get(0)?,
                        code: r.get(1)?,
                        name: r.get(2)?,
                        description: r.get(3)?,
                    })
                },
            )
            .optional()?)
    }

    // ── Items ──────────────────────────────────────────────────

    /// Insert or refresh an item keyed by its name.
    pub fn upsert_item(
        &self,
        name: &str,
        description: Option<&str>,
        category_id: i64,
        unit: &str,
    ) -> LedgerResult<ItemId> {
        Ok(self.conn.query_row(
            "INSERT INTO expense_item (name, description, category_id, unit)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(name) DO UPDATE SET
                description = excluded.description,
                category_id = excluded.category_id,
                unit = excluded.unit
             RETURNING item_id",
            params![name, description, category_id, unit],
            |r| r.get(0),
        )?)
    }

    pub fn item(&self, item_id: ItemId) -> LedgerResult<Option<ExpenseItem>> {
        Ok(self
            .conn
            .query_row(
                &format!("SELECT {ITEM_COLUMNS} FROM expense_item WHERE item_id = ?1"),
                params![item_id],
                item_from_row,
            )
            .optional()?)
    }

    pub fn item_by_name(&self, name: &str) -> LedgerResult<Option<ExpenseItem>> {
        Ok(self
            .conn
            .query_row(
                &format!("SELECT {ITEM_COLUMNS} FROM expense_item WHERE name = ?1"),
                params![name],
                item_from_row,
            )
            .optional()?)
    }

    pub fn items(&self) -> LedgerResult<Vec<ExpenseItem>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {ITEM_COLUMNS} FROM expense_item ORDER BY name ASC"))?;
        let rows = stmt.query_map([], item_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    // ── Combos ─────────────────────────────────────────────────

    pub fn insert_combo(
        &self,
        name: &str,
        description: Option<&str>,
        period_id: PeriodId,
        created_at: DateTime<Utc>,
    ) -> LedgerResult<ComboId> {
        self.conn.execute(
            "INSERT INTO combo (name, description, period_id, active, created_at)
             VALUES (?1, ?2, ?3, 1, ?4)",
            params![name, description, period_id, created_at],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn combo(&self, combo_id: ComboId) -> LedgerResult<Option<Combo>> {
        Ok(self
            .conn
            .query_row(
                &format!("SELECT {COMBO_COLUMNS} FROM combo WHERE combo_id = ?1"),
                params![combo_id],
                combo_from_row,
            )
            .optional()?)
    }

    pub fn combo_by_name(&self, name: &str, period_id: PeriodId) -> LedgerResult<Option<Combo>> {
        Ok(self
            .conn
            .query_row(
                &format!("SELECT {COMBO_COLUMNS} FROM combo WHERE name = ?1 AND period_id = ?2"),
                params![name, period_id],
                combo_from_row,
            )
            .optional()?)
    }

    pub fn combos_for_period(&self, period_id: PeriodId) -> LedgerResult<Vec<Combo>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {COMBO_COLUMNS} FROM combo WHERE period_id = ?1 ORDER BY name ASC"
        ))?;
        let rows = stmt.query_map(params![period_id], combo_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn set_combo_active(&self, combo_id: ComboId, active: bool) -> LedgerResult<bool> {
        let changed = self.conn.execute(
            "UPDATE combo SET active = ?1 WHERE combo_id = ?2",
            params![active, combo_id],
        )?;
        Ok(changed > 0)
    }

    /// Add an item to a combo, or change its default value if already present.
    pub fn upsert_combo_item(
        &self,
        combo_id: ComboId,
        item_id: ItemId,
        default_unit_value: Money,
    ) -> LedgerResult<()> {
        self.conn.execute(
            "INSERT INTO combo_item (combo_id, item_id, default_unit_value)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(combo_id, item_id) DO UPDATE SET
                default_unit_value = excluded.default_unit_value",
            params![combo_id, item_id, default_unit_value.to_string()],
        )?;
        Ok(())
    }

    pub fn combo_items(&self, combo_id: ComboId) -> LedgerResult<Vec<ComboItem>> {
        let mut stmt = self.conn.prepare(
            "SELECT ci.combo_id, ci.item_id, i.name, ci.default_unit_value
             FROM combo_item ci
             JOIN expense_item i ON i.item_id = ci.item_id
             WHERE ci.combo_id = ?1
             ORDER BY i.name ASC",
        )?;
        let rows = stmt.query_map(params![combo_id], |r| {
            Ok(ComboItem {
                combo_id: r.get(0)?,
                item_id: r.get(1)?,
                item_name: r.get(2)?,
                default_unit_value: decimal_at(r, 3)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }
}
