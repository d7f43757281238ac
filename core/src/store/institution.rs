//! Store methods for institutions.

use super::LedgerStore;
use crate::{
    error::LedgerResult,
    types::{InstitutionId, MunicipalityId, UserId},
};
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Institution {
    pub institution_id: InstitutionId,
    pub name: String,
    pub kind: String,
    pub municipality_id: MunicipalityId,
    /// Municipality name, joined for display.
    pub municipality: String,
    pub state_code: String,
    pub inep_code: Option<String>,
    pub responsible_user_id: Option<UserId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewInstitution {
    pub name: String,
    pub kind: String,
    pub municipality_id: MunicipalityId,
    pub inep_code: Option<String>,
}

const INSTITUTION_SELECT: &str = "SELECT i.institution_id, i.name, i.kind, i.municipality_id,
            mu.name, mu.state_code, i.inep_code, i.responsible_user_id
     FROM institution i
     JOIN municipality mu ON mu.municipality_id = i.municipality_id";

fn institution_from_row(r: &Row<'_>) -> rusqlite::Result<Institution> {
    Ok(Institution {
        institution_id: r.get(0)?,
        name: r.get(1)?,
        kind: r.get(2)?,
        municipality_id: r.get(3)?,
        municipality: r.get(4)?,
        state_code: r.get(5)?,
        inep_code: r.get(6)?,
        responsible_user_id: r.get(7)?,
    })
}

impl LedgerStore {
    pub fn insert_institution(&self, new: &NewInstitution) -> LedgerResult<InstitutionId> {
        self.conn.execute(
            "INSERT INTO institution (name, kind, municipality_id, inep_code)
             VALUES (?1, ?2, ?3, ?4)",
            params![new.name, new.kind, new.municipality_id, new.inep_code],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn institution(&self, institution_id: InstitutionId) -> LedgerResult<Option<Institution>> {
        Ok(self
            .conn
            .query_row(
                &format!("{INSTITUTION_SELECT} WHERE i.institution_id = ?1"),
                params![institution_id],
                institution_from_row,
            )
            .optional()?)
    }

    /// First institution with exactly this name, if any.
    pub fn institution_by_name(&self, name: &str) -> LedgerResult<Option<Institution>> {
        Ok(self
            .conn
            .query_row(
                &format!("{INSTITUTION_SELECT} WHERE i.name = ?1 ORDER BY i.institution_id ASC LIMIT 1"),
                params![name],
                institution_from_row,
            )
            .optional()?)
    }

    pub fn institutions(&self) -> LedgerResult<Vec<Institution>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{INSTITUTION_SELECT} ORDER BY i.name ASC"))?;
        let rows = stmt.query_map([], institution_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Institutions whose responsible party is `user_id`.
    pub fn institutions_responsible_by(&self, user_id: &str) -> LedgerResult<Vec<InstitutionId>> {
        let mut stmt = self.conn.prepare(
            "SELECT institution_id FROM institution
             WHERE responsible_user_id = ?1 ORDER BY institution_id ASC",
        )?;
        let rows = stmt.query_map(params![user_id], |r| r.get(0))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn set_institution_responsible(
        &self,
        institution_id: InstitutionId,
        user_id: &str,
    ) -> LedgerResult<bool> {
        let changed = self.conn.execute(
            "UPDATE institution SET responsible_user_id = ?1 WHERE institution_id = ?2",
            params![user_id, institution_id],
        )?;
        Ok(changed > 0)
    }
}
