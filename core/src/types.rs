//! Shared primitive types used across the ledger.

use rust_decimal::Decimal;

/// Row id of an institution.
pub type InstitutionId = i64;

/// Row id of a municipality.
pub type MunicipalityId = i64;

/// Row id of a period (competência).
pub type PeriodId = i64;

/// Row id of an expense item in the catalog.
pub type ItemId = i64;

/// Row id of a combo template.
pub type ComboId = i64;

/// Stable account identifier (UUID v4 string).
pub type UserId = String;

/// All money amounts are fixed-point decimals with two places.
pub type Money = Decimal;

/// The (institution, period) pair every raw fact and derived metric is scoped by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct MetricKey {
    pub institution_id: InstitutionId,
    pub period_id: PeriodId,
}

impl MetricKey {
    pub fn new(institution_id: InstitutionId, period_id: PeriodId) -> Self {
        Self { institution_id, period_id }
    }
}

impl std::fmt::Display for MetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "institution={} period={}", self.institution_id, self.period_id)
    }
}
