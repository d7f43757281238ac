//! Accounts and credentials.
//!
//! Passwords are stored as hex SHA-256 of `salt:password` with a random
//! per-account salt and compared in constant time. Provisioned accounts
//! start with must_change_password set; only `change_password` clears it.
//! Every successful login is appended to the audit log.

use crate::{
    error::{LedgerError, LedgerResult},
    event::LedgerEvent,
    ledger::LedgerService,
    role::{Actor, Capability, Role},
    store::{Account, LedgerStore, StoredCredential},
};
use chrono::Utc;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAccount {
    pub username: String,
    pub full_name: String,
    pub email: String,
    pub tax_id: Option<String>,
    pub role: Role,
    pub password: String,
}

pub(crate) fn hash_password(salt: &str, password: &str) -> String {
    hex::encode(Sha256::digest(format!("{salt}:{password}").as_bytes()))
}

fn password_matches(cred: &StoredCredential, password: &str) -> bool {
    let computed = hash_password(&cred.password_salt, password);
    computed.as_bytes().ct_eq(cred.password_hash.as_bytes()).into()
}

fn random_hex(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    hex::encode(buf)
}

/// 16 hex characters, for InitialPasswordPolicy::Random.
pub(crate) fn random_password() -> String {
    random_hex(8)
}

/// Insert a new account row. Callers own the surrounding transaction.
pub(crate) fn provision(
    store: &LedgerStore,
    new: &NewAccount,
    must_change_password: bool,
) -> LedgerResult<Account> {
    if new.username.trim().is_empty() {
        return Err(LedgerError::Validation("username is empty".into()));
    }
    if store.account_exists(&new.username, new.tax_id.as_deref())? {
        return Err(LedgerError::Validation(format!(
            "an account for '{}' already exists",
            new.username
        )));
    }
    let salt = random_hex(16);
    let account = Account {
        user_id: uuid::Uuid::new_v4().to_string(),
        username: new.username.clone(),
        full_name: new.full_name.clone(),
        email: new.email.clone(),
        tax_id: new.tax_id.clone(),
        role: new.role,
        must_change_password,
        active: true,
        created_at: Utc::now(),
    };
    store.insert_account(&StoredCredential {
        account: account.clone(),
        password_hash: hash_password(&salt, &new.password),
        password_salt: salt,
    })?;
    Ok(account)
}

fn check_password_strength(password: &str) -> LedgerResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(LedgerError::Validation(format!(
            "password must have at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

impl LedgerService {
    /// Create the first admin. Fails once any admin exists.
    pub fn bootstrap_admin(&self, username: &str, password: &str) -> LedgerResult<Actor> {
        check_password_strength(password)?;
        self.store().atomic(|store| {
            if store.admin_count()? > 0 {
                return Err(LedgerError::Validation("an admin account already exists".into()));
            }
            let account = provision(
                store,
                &NewAccount {
                    username: username.into(),
                    full_name: "Administrator".into(),
                    email: String::new(),
                    tax_id: None,
                    role: Role::Admin,
                    password: password.into(),
                },
                false,
            )?;
            self.record(
                None,
                &LedgerEvent::AccountCreated {
                    account_id: account.user_id.clone(),
                    role: account.role.as_str().into(),
                },
            )?;
            log::info!("account={} accounts: bootstrap admin created", account.username);
            Ok(Actor::new(account.user_id, Role::Admin))
        })
    }

    /// Admin-created account; the password is final (no forced change).
    pub fn create_account(&self, actor: &Actor, new: NewAccount) -> LedgerResult<Account> {
        actor.require(Capability::ReviewRegistrations)?;
        check_password_strength(&new.password)?;
        self.store().atomic(|store| {
            let account = provision(store, &new, false)?;
            self.record(
                Some(actor),
                &LedgerEvent::AccountCreated {
                    account_id: account.user_id.clone(),
                    role: account.role.as_str().into(),
                },
            )?;
            Ok(account)
        })
    }

    /// Verify a username/password pair and return the acting identity.
    pub fn authenticate(&self, username: &str, password: &str) -> LedgerResult<Actor> {
        let cred = self.verify_credentials(username, password)?;
        let actor = Actor::new(cred.account.user_id, cred.account.role);
        self.record(
            Some(&actor),
            &LedgerEvent::AccountLoggedIn { account_id: actor.user_id.clone() },
        )?;
        log::debug!("account={username} accounts: login");
        Ok(actor)
    }

    fn verify_credentials(&self, username: &str, password: &str) -> LedgerResult<StoredCredential> {
        let invalid = || LedgerError::Validation("invalid credentials".into());
        let cred = self.store().credential_by_username(username)?.ok_or_else(invalid)?;
        if !password_matches(&cred, password) {
            log::warn!("account={username} accounts: failed login");
            return Err(invalid());
        }
        if !cred.account.active {
            return Err(LedgerError::Validation("account is disabled".into()));
        }
        Ok(cred)
    }

    pub fn change_password(&self, actor: &Actor, current: &str, new_password: &str) -> LedgerResult<()> {
        check_password_strength(new_password)?;
        let account = self
            .store()
            .account(&actor.user_id)?
            .ok_or_else(|| LedgerError::not_found("account", &actor.user_id))?;
        self.verify_credentials(&account.username, current)?;
        if new_password == current {
            return Err(LedgerError::Validation("new password equals the current one".into()));
        }
        let salt = random_hex(16);
        self.store()
            .update_password(&actor.user_id, &hash_password(&salt, new_password), &salt, false)
    }

    pub fn deactivate_account(&self, actor: &Actor, user_id: &str) -> LedgerResult<()> {
        actor.require(Capability::ReviewRegistrations)?;
        if !self.store().set_account_active(user_id, false)? {
            return Err(LedgerError::not_found("account", user_id));
        }
        Ok(())
    }

    /// Resolve a stored account into an actor, e.g. from a session id.
    pub fn actor_for(&self, user_id: &str) -> LedgerResult<Actor> {
        let account = self
            .store()
            .account(user_id)?
            .filter(|a| a.active)
            .ok_or_else(|| LedgerError::not_found("account", user_id))?;
        Ok(Actor::new(account.user_id, account.role))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_password_different_salt_differs() {
        assert_ne!(hash_password("a", "secret"), hash_password("b", "secret"));
        assert_eq!(hash_password("a", "secret"), hash_password("a", "secret"));
    }

    #[test]
    fn password_check_uses_stored_salt() {
        let cred = StoredCredential {
            account: Account {
                user_id: "u1".into(),
                username: "ana".into(),
                full_name: "Ana".into(),
                email: String::new(),
                tax_id: None,
                role: Role::Admin,
                must_change_password: false,
                active: true,
                created_at: Utc::now(),
            },
            password_hash: hash_password("salt", "secret-1"),
            password_salt: "salt".into(),
        };
        assert!(password_matches(&cred, "secret-1"));
        assert!(!password_matches(&cred, "secret-2"));
        assert!(!password_matches(&cred, ""));
    }

    #[test]
    fn random_password_is_sixteen_hex_chars() {
        let pw = random_password();
        assert_eq!(pw.len(), 16);
        assert!(pw.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
