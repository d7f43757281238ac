//! Registration requests and their approval state machine.
//!
//! PENDING → APPROVED | REJECTED. Both targets are terminal.
//!
//! Approval provisions an account whose username is the requester's tax
//! id. The initial password follows `InitialPasswordPolicy`; with the
//! default `TaxId` policy it equals the (public) tax id, so the account is
//! always created with must_change_password set and a salted hash.

use crate::{
    account::{self, NewAccount},
    config::InitialPasswordPolicy,
    error::{LedgerError, LedgerResult},
    event::LedgerEvent,
    ledger::LedgerService,
    role::{Actor, Capability, Role},
    store::Account,
    types::{InstitutionId, UserId},
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStatus {
    Pending,
    Approved,
    Rejected,
}

impl RegistrationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RegistrationStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(LedgerError::Validation(format!("unknown registration status '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationRequest {
    pub request_id: i64,
    pub full_name: String,
    /// 11-digit CPF; becomes the username on approval.
    pub tax_id: String,
    pub email: String,
    pub phone: Option<String>,
    pub requested_role: Role,
    pub institution_id: Option<InstitutionId>,
    pub birth_date: Option<NaiveDate>,
    pub status: RegistrationStatus,
    pub requested_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
    pub responder_id: Option<UserId>,
    pub account_id: Option<UserId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRegistration {
    pub full_name: String,
    pub tax_id: String,
    pub email: String,
    pub phone: Option<String>,
    pub requested_role: Role,
    pub institution_id: Option<InstitutionId>,
    pub birth_date: Option<NaiveDate>,
}

/// What a review did to one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewOutcome {
    Approved {
        account: Account,
        /// Shown once to the reviewer; only its hash is stored.
        initial_password: String,
    },
    Rejected,
    /// The request was already terminal; nothing changed.
    Skipped(RegistrationStatus),
}

fn validate_tax_id(tax_id: &str) -> LedgerResult<()> {
    if tax_id.len() != 11 || !tax_id.chars().all(|c| c.is_ascii_digit()) {
        return Err(LedgerError::Validation(format!("tax id '{tax_id}' must be 11 digits")));
    }
    Ok(())
}

impl LedgerService {
    /// File a registration request. Needs no actor.
    pub fn submit_registration(&self, new: NewRegistration) -> LedgerResult<RegistrationRequest> {
        validate_tax_id(&new.tax_id)?;
        if new.full_name.trim().is_empty() || !new.email.contains('@') {
            return Err(LedgerError::Validation("name and a valid email are required".into()));
        }
        if new.requested_role == Role::InstitutionManager && new.institution_id.is_none() {
            return Err(LedgerError::Validation(
                "institution managers must name their institution".into(),
            ));
        }
        if let Some(id) = new.institution_id {
            if self.store().institution(id)?.is_none() {
                return Err(LedgerError::not_found("institution", id));
            }
        }

        self.store().atomic(|store| {
            let mut request = RegistrationRequest {
                request_id: 0,
                full_name: new.full_name.clone(),
                tax_id: new.tax_id.clone(),
                email: new.email.clone(),
                phone: new.phone.clone(),
                requested_role: new.requested_role,
                institution_id: new.institution_id,
                birth_date: new.birth_date,
                status: RegistrationStatus::Pending,
                requested_at: Utc::now(),
                responded_at: None,
                responder_id: None,
                account_id: None,
            };
            request.request_id = store.insert_registration(&request)?;
            self.record(
                None,
                &LedgerEvent::RegistrationSubmitted {
                    request_id: request.request_id,
                    requested_role: request.requested_role.as_str().into(),
                },
            )?;
            Ok(request)
        })
    }

    pub fn registration(&self, actor: &Actor, request_id: i64) -> LedgerResult<RegistrationRequest> {
        actor.require(Capability::ReviewRegistrations)?;
        self.store()
            .registration(request_id)?
            .ok_or_else(|| LedgerError::not_found("registration request", request_id))
    }

    pub fn registrations(
        &self,
        actor: &Actor,
        status: RegistrationStatus,
    ) -> LedgerResult<Vec<RegistrationRequest>> {
        actor.require(Capability::ReviewRegistrations)?;
        self.store().registrations_by_status(status)
    }

    /// PENDING → APPROVED. A terminal request is skipped, not an error.
    pub fn approve_registration(&self, actor: &Actor, request_id: i64) -> LedgerResult<ReviewOutcome> {
        actor.require(Capability::ReviewRegistrations)?;
        let request = self.registration(actor, request_id)?;
        if request.status.is_terminal() {
            log::debug!("registration={request_id} review: already {}, skipping", request.status);
            return Ok(ReviewOutcome::Skipped(request.status));
        }

        let initial_password = match self.config().initial_password_policy {
            InitialPasswordPolicy::TaxId => {
                log::warn!(
                    "registration={request_id} review: initial password equals the tax id"
                );
                request.tax_id.clone()
            }
            InitialPasswordPolicy::Random => account::random_password(),
        };

        self.store().atomic(|store| {
            let account = account::provision(
                store,
                &NewAccount {
                    username: request.tax_id.clone(),
                    full_name: request.full_name.clone(),
                    email: request.email.clone(),
                    tax_id: Some(request.tax_id.clone()),
                    role: request.requested_role,
                    password: initial_password.clone(),
                },
                true,
            )?;

            if let (Role::InstitutionManager, Some(institution_id)) =
                (request.requested_role, request.institution_id)
            {
                if !store.set_institution_responsible(institution_id, &account.user_id)? {
                    return Err(LedgerError::not_found("institution", institution_id));
                }
            }

            // Guarded on status = pending; a concurrent reviewer loses here.
            if !store.mark_registration_reviewed(
                request_id,
                RegistrationStatus::Approved,
                &actor.user_id,
                Utc::now(),
                Some(&account.user_id),
            )? {
                return Err(LedgerError::Validation(format!(
                    "registration {request_id} was reviewed concurrently"
                )));
            }

            self.record(
                Some(actor),
                &LedgerEvent::RegistrationApproved {
                    request_id,
                    account_id: account.user_id.clone(),
                },
            )?;
            log::info!(
                "registration={request_id} review: approved as {} ({})",
                account.username,
                account.role
            );
            Ok(ReviewOutcome::Approved {
                account,
                initial_password: initial_password.clone(),
            })
        })
    }

    /// PENDING → REJECTED. Stamps responder and time only.
    pub fn reject_registration(&self, actor: &Actor, request_id: i64) -> LedgerResult<ReviewOutcome> {
        actor.require(Capability::ReviewRegistrations)?;
        let request = self.registration(actor, request_id)?;
        if request.status.is_terminal() {
            return Ok(ReviewOutcome::Skipped(request.status));
        }
        self.store().atomic(|store| {
            if !store.mark_registration_reviewed(
                request_id,
                RegistrationStatus::Rejected,
                &actor.user_id,
                Utc::now(),
                None,
            )? {
                let current = store
                    .registration(request_id)?
                    .map_or(RegistrationStatus::Pending, |r| r.status);
                return Ok(ReviewOutcome::Skipped(current));
            }
            self.record(Some(actor), &LedgerEvent::RegistrationRejected { request_id })?;
            Ok(ReviewOutcome::Rejected)
        })
    }

    /// Approve every PENDING request among `request_ids`; others are ignored.
    ///
    /// Each request is reviewed in its own transaction. A failing request
    /// does not stop the rest, and its error is returned in its slot.
    pub fn approve_pending(
        &self,
        actor: &Actor,
        request_ids: &[i64],
    ) -> LedgerResult<Vec<(i64, LedgerResult<ReviewOutcome>)>> {
        actor.require(Capability::ReviewRegistrations)?;
        Ok(self
            .pending_among(request_ids)?
            .into_iter()
            .map(|id| (id, self.approve_registration(actor, id).map_err(|e| bulk_failure(id, e))))
            .collect())
    }

    /// Reject every PENDING request among `request_ids`; others are ignored.
    pub fn reject_pending(
        &self,
        actor: &Actor,
        request_ids: &[i64],
    ) -> LedgerResult<Vec<(i64, LedgerResult<ReviewOutcome>)>> {
        actor.require(Capability::ReviewRegistrations)?;
        Ok(self
            .pending_among(request_ids)?
            .into_iter()
            .map(|id| (id, self.reject_registration(actor, id).map_err(|e| bulk_failure(id, e))))
            .collect())
    }

    fn pending_among(&self, request_ids: &[i64]) -> LedgerResult<Vec<i64>> {
        Ok(self
            .store()
            .registrations_by_status(RegistrationStatus::Pending)?
            .into_iter()
            .map(|r| r.request_id)
            .filter(|id| request_ids.contains(id))
            .collect())
    }
}

fn bulk_failure(request_id: i64, err: LedgerError) -> LedgerError {
    log::warn!("registration={request_id} review: bulk review failed: {err}");
    err
}
