//! Roles and the capabilities they grant.
//!
//! RULE: Every LedgerService operation checks one Capability for the
//! acting user before touching the store. Institution-scoped capabilities
//! additionally require InstitutionManagers to be the responsible party.

use crate::{error::LedgerError, types::UserId};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    HumanResources,
    InstitutionManager,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    ManagePeriods,
    ManageCatalog,
    ManageInstitutions,
    RecordExpense,
    RecordPayroll,
    RecordStudentCount,
    ReviewRegistrations,
    RecomputeMetrics,
    ViewReports,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::HumanResources => "human_resources",
            Self::InstitutionManager => "institution_manager",
        }
    }

    pub fn grants(&self, capability: Capability) -> bool {
        use Capability::*;
        match self {
            Self::Admin => true,
            Self::HumanResources => matches!(capability, RecordPayroll | ViewReports),
            Self::InstitutionManager => {
                matches!(capability, RecordExpense | RecordStudentCount | ViewReports)
            }
        }
    }

    /// Whether this role only acts on institutions it is responsible for.
    pub fn is_institution_scoped(&self) -> bool {
        matches!(self, Self::InstitutionManager)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Self::Admin),
            "human_resources" => Ok(Self::HumanResources),
            "institution_manager" => Ok(Self::InstitutionManager),
            other => Err(LedgerError::Validation(format!("unknown role '{other}'"))),
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ManagePeriods => "manage periods",
            Self::ManageCatalog => "manage the catalog",
            Self::ManageInstitutions => "manage institutions",
            Self::RecordExpense => "record expenses",
            Self::RecordPayroll => "record payroll",
            Self::RecordStudentCount => "record student counts",
            Self::ReviewRegistrations => "review registrations",
            Self::RecomputeMetrics => "recompute metrics",
            Self::ViewReports => "view reports",
        };
        f.write_str(s)
    }
}

/// The authenticated user on whose behalf an operation runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    pub role: Role,
}

impl Actor {
    pub fn new(user_id: impl Into<UserId>, role: Role) -> Self {
        Self { user_id: user_id.into(), role }
    }

    /// Role-level check only. Institution scoping is done by the service,
    /// which needs the store to resolve the responsible party.
    pub fn require(&self, capability: Capability) -> Result<(), LedgerError> {
        if self.role.grants(capability) {
            Ok(())
        } else {
            Err(LedgerError::PermissionDenied { role: self.role, capability })
        }
    }
}
