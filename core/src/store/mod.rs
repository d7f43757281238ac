//! SQLite persistence layer.
//!
//! RULE: Only store/ talks to the database.
//! The service, aggregator and reports call store methods and never
//! execute SQL directly.

mod account;
mod catalog;
mod facts;
mod geography;
mod institution;
mod metric;
mod period;
mod registration;

pub use account::{Account, StoredCredential};
pub use catalog::{Combo, ComboItem, ExpenseCategory, ExpenseItem};
pub use facts::{ExpenseEntry, PayrollEntry, StudentCount};
pub use geography::{Municipality, State};
pub use institution::{Institution, NewInstitution};
pub use metric::{CostMetric, MetricFilter, MetricRow};

use crate::{error::LedgerResult, event::EventLogEntry};
use rusqlite::{params, types::Type, Connection, Row, Transaction, TransactionBehavior};
use rust_decimal::Decimal;
use std::{str::FromStr, time::Duration};

pub struct LedgerStore {
    conn: Connection,
    path: Option<String>, // None for :memory:, Some(path) for file
}

impl LedgerStore {
    pub fn open(path: &str) -> LedgerResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (shared-memory and :memory: ignore it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self {
            conn,
            path: Some(path.to_string()),
        })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> LedgerResult<Self> {
        let conn = Connection::open(":memory:")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn, path: None })
    }

    /// Reopen a new connection to the same database.
    /// For in-memory databases, this returns a new in-memory database (isolated).
    /// For file-based databases, this opens the same file.
    pub fn reopen(&self) -> LedgerResult<Self> {
        match &self.path {
            Some(p) => Self::open(p),
            None => Self::in_memory(),
        }
    }

    /// How long a statement waits on another connection's write lock.
    pub fn set_busy_timeout(&self, timeout: Duration) -> LedgerResult<()> {
        self.conn.busy_timeout(timeout)?;
        Ok(())
    }

    /// Apply all schema migrations in order. Safe to run more than once.
    pub fn migrate(&self) -> LedgerResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_foundation.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/002_ledger.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/003_registration.sql"))?;
        Ok(())
    }

    /// Run `f` inside one IMMEDIATE transaction.
    ///
    /// Commits only if `f` succeeds; any error rolls back everything `f`
    /// wrote. Calls nested inside an open transaction join it.
    pub fn atomic<T>(&self, f: impl FnOnce(&Self) -> LedgerResult<T>) -> LedgerResult<T> {
        if !self.conn.is_autocommit() {
            return f(self);
        }
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;
        let out = f(self)?;
        tx.commit()?;
        Ok(out)
    }

    // ── Event log ──────────────────────────────────────────────

    pub fn append_event(&self, entry: &EventLogEntry) -> LedgerResult<()> {
        self.conn.execute(
            "INSERT INTO ledger_event (occurred_at, actor_id, event_type, payload)
             VALUES (?1, ?2, ?3, ?4)",
            params![entry.occurred_at, entry.actor_id, entry.event_type, entry.payload],
        )?;
        Ok(())
    }

    pub fn events_of_type(&self, event_type: &str) -> LedgerResult<Vec<EventLogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, occurred_at, actor_id, event_type, payload
             FROM ledger_event WHERE event_type = ?1
             ORDER BY id ASC",
        )?;
        let entries = stmt
            .query_map(params![event_type], |row| {
                Ok(EventLogEntry {
                    id: Some(row.get(0)?),
                    occurred_at: row.get(1)?,
                    actor_id: row.get(2)?,
                    event_type: row.get(3)?,
                    payload: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    pub fn event_count(&self) -> LedgerResult<i64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM ledger_event", [], |r| r.get(0))?)
    }
}

// ── Column helpers ─────────────────────────────────────────────

/// Read a TEXT money column.
fn decimal_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Decimal> {
    parse_at(row, idx)
}

/// Read a TEXT column through `FromStr` (enums, decimals).
fn parse_at<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let text: String = row.get(idx)?;
    text.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}
