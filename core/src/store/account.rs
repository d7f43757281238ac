//! Store methods for user accounts.

use super::{parse_at, LedgerStore};
use crate::{error::LedgerResult, role::Role, types::UserId};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub user_id: UserId,
    pub username: String,
    pub full_name: String,
    pub email: String,
    pub tax_id: Option<String>,
    pub role: Role,
    pub must_change_password: bool,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// An account together with its salted password hash.
#[derive(Debug, Clone)]
pub struct StoredCredential {
    pub account: Account,
    pub password_hash: String,
    pub password_salt: String,
}

const ACCOUNT_COLUMNS: &str = "user_id, username, full_name, email, tax_id, role,
     must_change_password, active, created_at, password_hash, password_salt";

fn credential_from_row(r: &Row<'_>) -> rusqlite::Result<StoredCredential> {
    Ok(StoredCredential {
        account: Account {
            user_id: r.get(0)?,
            username: r.get(1)?,
            full_name: r.get(2)?,
            email: r.get(3)?,
            tax_id: r.get(4)?,
            role: parse_at(r, 5)?,
            must_change_password: r.get(6)?,
            active: r.get(7)?,
            created_at: r.get(8)?,
        },
        password_hash: r.get(9)?,
        password_salt: r.get(10)?,
    })
}

impl LedgerStore {
    pub fn insert_account(&self, cred: &StoredCredential) -> LedgerResult<()> {
        let a = &cred.account;
        self.conn.execute(
            "INSERT INTO app_user (
                user_id, username, full_name, email, tax_id, role,
                password_hash, password_salt, must_change_password, active, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                a.user_id,
                a.username,
                a.full_name,
                a.email,
                a.tax_id,
                a.role.as_str(),
                cred.password_hash,
                cred.password_salt,
                a.must_change_password,
                a.active,
                a.created_at,
            ],
        )?;
        Ok(())
    }

    pub fn account(&self, user_id: &str) -> LedgerResult<Option<Account>> {
        Ok(self
            .conn
            .query_row(
                &format!("SELECT {ACCOUNT_COLUMNS} FROM app_user WHERE user_id = ?1"),
                params![user_id],
                credential_from_row,
            )
            .optional()?
            .map(|c| c.account))
    }

    pub fn account_by_username(&self, username: &str) -> LedgerResult<Option<Account>> {
        Ok(self.credential_by_username(username)?.map(|c| c.account))
    }

    pub fn credential_by_username(&self, username: &str) -> LedgerResult<Option<StoredCredential>> {
        Ok(self
            .conn
            .query_row(
                &format!("SELECT {ACCOUNT_COLUMNS} FROM app_user WHERE username = ?1"),
                params![username],
                credential_from_row,
            )
            .optional()?)
    }

    /// True if the username or the tax id is already taken.
    pub fn account_exists(&self, username: &str, tax_id: Option<&str>) -> LedgerResult<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM app_user
             WHERE username = ?1 OR (?2 IS NOT NULL AND tax_id = ?2)",
            params![username, tax_id],
            |r| r.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn update_password(
        &self,
        user_id: &str,
        password_hash: &str,
        password_salt: &str,
        must_change_password: bool,
    ) -> LedgerResult<()> {
        self.conn.execute(
            "UPDATE app_user SET password_hash = ?1, password_salt = ?2, must_change_password = ?3
             WHERE user_id = ?4",
            params![password_hash, password_salt, must_change_password, user_id],
        )?;
        Ok(())
    }

    pub fn set_account_active(&self, user_id: &str, active: bool) -> LedgerResult<bool> {
        let changed = self.conn.execute(
            "UPDATE app_user SET active = ?1 WHERE user_id = ?2",
            params![active, user_id],
        )?;
        Ok(changed > 0)
    }

    pub fn admin_count(&self) -> LedgerResult<i64> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM app_user WHERE role = ?1",
            params![Role::Admin.as_str()],
            |r| r.get(0),
        )?)
    }
}
