//! Variance calculator: month-over-month change in cost per student.
//!
//! The predecessor is the same institution's metric for month − 1 of the
//! same year. January therefore never has one; the lookback does not
//! cross into December of the prior year.

use crate::{
    metrics::cents,
    period::Period,
    store::LedgerStore,
    types::{InstitutionId, Money},
};
use rust_decimal::Decimal;

/// Signed percentage change from `previous` to `current`; negative is an
/// improvement. `None` when there is no usable baseline.
pub fn variance_pct(current: Money, previous: Money) -> Option<Decimal> {
    if previous <= Decimal::ZERO {
        return None;
    }
    Some(cents((current - previous) / previous * Decimal::ONE_HUNDRED))
}

/// Variance of `current_cost` against the prior month's metric.
///
/// Lookup failures degrade to `None`; this never raises.
pub fn month_over_month(
    store: &LedgerStore,
    institution_id: InstitutionId,
    period: &Period,
    current_cost: Money,
) -> Option<Decimal> {
    let (year, month) = period.previous_in_year()?;
    match store.metric_for_month(institution_id, year, month) {
        Ok(Some(previous)) => variance_pct(current_cost, previous.breakdown.cost_per_student),
        Ok(None) => None,
        Err(e) => {
            log::warn!(
                "institution={institution_id} period={} variance: lookup failed: {e}",
                period.label()
            );
            None
        }
    }
}
