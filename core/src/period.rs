//! Reporting periods (competências): one calendar month each.

use crate::{error::LedgerError, types::PeriodId};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
    pub period_id: PeriodId,
    pub year: i32,
    pub month: u32,
    /// Closed periods accept no new expense or payroll writes.
    pub open: bool,
}

impl Period {
    /// `MM/YYYY`, the label shown on reports.
    pub fn label(&self) -> String {
        format!("{:02}/{}", self.month, self.year)
    }

    /// The (year, month) the variance calculator compares against.
    ///
    /// Only looks back within the same year: January has no predecessor.
    pub fn previous_in_year(&self) -> Option<(i32, u32)> {
        (self.month > 1).then(|| (self.year, self.month - 1))
    }
}

/// Newest period first.
impl Ord for Period {
    fn cmp(&self, other: &Self) -> Ordering {
        (other.year, other.month).cmp(&(self.year, self.month))
    }
}

impl PartialOrd for Period {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

pub fn validate_month(year: i32, month: u32) -> Result<(), LedgerError> {
    if !(1..=12).contains(&month) {
        return Err(LedgerError::Validation(format!("month {month} outside 1..=12")));
    }
    if !(1900..=9999).contains(&year) {
        return Err(LedgerError::Validation(format!("year {year} out of range")));
    }
    Ok(())
}
