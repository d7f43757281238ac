//! Store methods for periods.

use super::LedgerStore;
use crate::{error::LedgerResult, period::Period, types::PeriodId};
use rusqlite::{params, OptionalExtension, Row};

const PERIOD_COLUMNS: &str = "period_id, year, month, open";

fn period_from_row(r: &Row<'_>) -> rusqlite::Result<Period> {
    Ok(Period {
        period_id: r.get(0)?,
        year: r.get(1)?,
        month: r.get(2)?,
        open: r.get(3)?,
    })
}

impl LedgerStore {
    pub fn insert_period(&self, year: i32, month: u32, open: bool) -> LedgerResult<PeriodId> {
        self.conn.execute(
            "INSERT INTO period (year, month, open) VALUES (?1, ?2, ?3)",
            params![year, month, open],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn period(&self, period_id: PeriodId) -> LedgerResult<Option<Period>> {
        Ok(self
            .conn
            .query_row(
                &format!("SELECT {PERIOD_COLUMNS} FROM period WHERE period_id = ?1"),
                params![period_id],
                period_from_row,
            )
            .optional()?)
    }

    pub fn period_by_month(&self, year: i32, month: u32) -> LedgerResult<Option<Period>> {
        Ok(self
            .conn
            .query_row(
                &format!("SELECT {PERIOD_COLUMNS} FROM period WHERE year = ?1 AND month = ?2"),
                params![year, month],
                period_from_row,
            )
            .optional()?)
    }

    /// Returns false if the period does not exist.
    pub fn set_period_open(&self, period_id: PeriodId, open: bool) -> LedgerResult<bool> {
        let changed = self.conn.execute(
            "UPDATE period SET open = ?1 WHERE period_id = ?2",
            params![open, period_id],
        )?;
        Ok(changed > 0)
    }

    /// All periods, newest first.
    pub fn periods(&self) -> LedgerResult<Vec<Period>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {PERIOD_COLUMNS} FROM period ORDER BY year DESC, month DESC"
        ))?;
        let rows = stmt.query_map([], period_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn open_periods(&self) -> LedgerResult<Vec<Period>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {PERIOD_COLUMNS} FROM period WHERE open = 1 ORDER BY year DESC, month DESC"
        ))?;
        let rows = stmt.query_map([], period_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }
}
