//! Store methods for states (UF) and their municipalities.

use super::LedgerStore;
use crate::{error::LedgerResult, types::MunicipalityId};
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

/// A federative unit, keyed by its two-letter code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Municipality {
    pub municipality_id: MunicipalityId,
    pub name: String,
    pub state_code: String,
}

fn municipality_from_row(r: &Row<'_>) -> rusqlite::Result<Municipality> {
    Ok(Municipality {
        municipality_id: r.get(0)?,
        name: r.get(1)?,
        state_code: r.get(2)?,
    })
}

impl LedgerStore {
    pub fn upsert_state(&self, code: &str, name: &str) -> LedgerResult<()> {
        self.conn.execute(
            "INSERT INTO state (state_code, name) VALUES (?1, ?2)
             ON CONFLICT(state_code) DO UPDATE SET name = excluded.name",
            params![code, name],
        )?;
        Ok(())
    }

    pub fn states(&self) -> LedgerResult<Vec<State>> {
        let mut stmt = self
            .conn
            .prepare("SELECT state_code, name FROM state ORDER BY state_code ASC")?;
        let rows = stmt.query_map([], |r| Ok(State { code: r.get(0)?, name: r.get(1)? }))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Insert the municipality if missing and return its id either way.
    pub fn upsert_municipality(&self, name: &str, state_code: &str) -> LedgerResult<MunicipalityId> {
        self.conn.execute(
            "INSERT INTO municipality (name, state_code) VALUES (?1, ?2)
             ON CONFLICT(name, state_code) DO NOTHING",
            params![name, state_code],
        )?;
        Ok(self.conn.query_row(
            "SELECT municipality_id FROM municipality WHERE name = ?1 AND state_code = ?2",
            params![name, state_code],
            |r| r.get(0),
        )?)
    }

    pub fn municipality(&self, municipality_id: MunicipalityId) -> LedgerResult<Option<Municipality>> {
        Ok(self
            .conn
            .query_row(
                "SELECT municipality_id, name, state_code FROM municipality WHERE municipality_id = ?1",
                params![municipality_id],
                municipality_from_row,
            )
            .optional()?)
    }

    pub fn municipality_by_name(&self, name: &str, state_code: &str) -> LedgerResult<Option<Municipality>> {
        Ok(self
            .conn
            .query_row(
                "SELECT municipality_id, name, state_code FROM municipality
                 WHERE name = ?1 AND state_code = ?2",
                params![name, state_code],
                municipality_from_row,
            )
            .optional()?)
    }

    /// Municipalities of one state, or of every state when `state_code` is None.
    pub fn municipalities(&self, state_code: Option<&str>) -> LedgerResult<Vec<Municipality>> {
        let mut stmt = self.conn.prepare(
            "SELECT municipality_id, name, state_code FROM municipality
             WHERE (?1 IS NULL OR state_code = ?1)
             ORDER BY state_code ASC, name ASC",
        )?;
        let rows = stmt.query_map(params![state_code], municipality_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }
}
