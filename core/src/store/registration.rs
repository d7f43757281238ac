//! Store methods for registration requests.

use super::{parse_at, LedgerStore};
use crate::{
    error::LedgerResult,
    registration::{RegistrationRequest, RegistrationStatus},
};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

const REQUEST_COLUMNS: &str = "request_id, full_name, tax_id, email, phone, requested_role,
     institution_id, birth_date, status, requested_at, responded_at, responder_id, account_id";

fn request_from_row(r: &Row<'_>) -> rusqlite::Result<RegistrationRequest> {
    Ok(RegistrationRequest {
        request_id: r.get(0)?,
        full_name: r.get(1)?,
        tax_id: r.get(2)?,
        email: r.get(3)?,
        phone: r.get(4)?,
        requested_role: parse_at(r, 5)?,
        institution_id: r.get(6)?,
        birth_date: r.get(7)?,
        status: parse_at(r, 8)?,
        requested_at: r.get(9)?,
        responded_at: r.get(10)?,
        responder_id: r.get(11)?,
        account_id: r.get(12)?,
    })
}

impl LedgerStore {
    /// Insert a new PENDING request; `req.request_id` is ignored.
    pub fn insert_registration(&self, req: &RegistrationRequest) -> LedgerResult<i64> {
        self.conn.execute(
            "INSERT INTO registration_request (
                full_name, tax_id, email, phone, requested_role, institution_id,
                birth_date, status, requested_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                req.full_name,
                req.tax_id,
                req.email,
                req.phone,
                req.requested_role.as_str(),
                req.institution_id,
                req.birth_date,
                req.status.as_str(),
                req.requested_at,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn registration(&self, request_id: i64) -> LedgerResult<Option<RegistrationRequest>> {
        Ok(self
            .conn
            .query_row(
                &format!("SELECT {REQUEST_COLUMNS} FROM registration_request WHERE request_id = ?1"),
                params![request_id],
                request_from_row,
            )
            .optional()?)
    }

    pub fn registrations_by_status(
        &self,
        status: RegistrationStatus,
    ) -> LedgerResult<Vec<RegistrationRequest>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {REQUEST_COLUMNS} FROM registration_request
             WHERE status = ?1 ORDER BY requested_at ASC, request_id ASC"
        ))?;
        let rows = stmt.query_map(params![status.as_str()], request_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Move a PENDING request to a terminal status.
    ///
    /// Returns false (and changes nothing) if the request is not PENDING.
    pub fn mark_registration_reviewed(
        &self,
        request_id: i64,
        status: RegistrationStatus,
        responder_id: &str,
        responded_at: DateTime<Utc>,
        account_id: Option<&str>,
    ) -> LedgerResult<bool> {
        let changed = self.conn.execute(
            "UPDATE registration_request
             SET status = ?1, responder_id = ?2, responded_at = ?3, account_id = ?4
             WHERE request_id = ?5 AND status = ?6",
            params![
                status.as_str(),
                responder_id,
                responded_at,
                account_id,
                request_id,
                RegistrationStatus::Pending.as_str(),
            ],
        )?;
        Ok(changed > 0)
    }
}
