//! Aggregator: keeps the derived cost metric in sync with the raw facts.
//!
//! Called explicitly by every write path that touches an expense entry,
//! a payroll entry or a student count, with the (institution, period) key
//! the write invalidated.
//!
//! RULES:
//!   - No student count for the key → no write. Deferred, not an error.
//!   - Exactly one metric row per key, written by upsert.
//!   - Only a changed metric is written and audited.
//!   - Sums, derivation and upsert run in one transaction; a failure
//!     anywhere rolls back the lot and surfaces as AggregationFailed.

use crate::{
    error::{LedgerError, LedgerResult},
    event::{EventLogEntry, LedgerEvent},
    metrics::{self, CostBreakdown},
    store::LedgerStore,
    types::{MetricKey, Money},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecomputeOutcome {
    /// The metric row for the key now holds these figures.
    Updated(CostBreakdown),
    /// No student count yet; the metric was left untouched.
    Deferred,
}

pub struct Aggregator<'a> {
    store: &'a LedgerStore,
    baseline: Money,
}

impl<'a> Aggregator<'a> {
    pub fn new(store: &'a LedgerStore, baseline: Money) -> Self {
        Self { store, baseline }
    }

    /// Recompute and upsert the metric for `key`.
    ///
    /// Joins the caller's transaction if one is open, so a raw-fact write
    /// and its recomputation commit together.
    pub fn recompute(&self, key: MetricKey, actor_id: Option<&str>) -> LedgerResult<RecomputeOutcome> {
        self.store
            .atomic(|store| self.recompute_in(store, key, actor_id))
            .map_err(|e| match e {
                LedgerError::AggregationFailed { .. } => e,
                other => {
                    log::error!("{key} aggregator: recompute failed: {other}");
                    LedgerError::AggregationFailed {
                        institution_id: key.institution_id,
                        period_id: key.period_id,
                        reason: other.to_string(),
                    }
                }
            })
    }

    fn recompute_in(
        &self,
        store: &LedgerStore,
        key: MetricKey,
        actor_id: Option<&str>,
    ) -> LedgerResult<RecomputeOutcome> {
        let Some(count) = store.student_count(key)? else {
            log::debug!("{key} aggregator: no student count yet, deferring");
            return Ok(RecomputeOutcome::Deferred);
        };

        let operational_total = store.sum_expense_totals(key)?;
        let payroll_total = store.sum_payroll_totals(key)?;
        let breakdown = metrics::compute(operational_total, payroll_total, count.students, self.baseline);

        if store.metric(key)?.is_some_and(|m| m.breakdown == breakdown) {
            log::debug!("{key} aggregator: metric unchanged");
            return Ok(RecomputeOutcome::Updated(breakdown));
        }
        store.upsert_metric(key, &breakdown)?;

        let event = LedgerEvent::MetricRecomputed {
            institution_id: key.institution_id,
            period_id: key.period_id,
            cost_per_student: breakdown.cost_per_student,
            efficiency_score: breakdown.efficiency_score,
        };
        store.append_event(&EventLogEntry::new(actor_id, &event)?)?;

        log::info!(
            "{key} aggregator: grand_total={} students={} cost_per_student={} score={}",
            breakdown.grand_total,
            breakdown.student_count,
            breakdown.cost_per_student,
            breakdown.efficiency_score,
        );
        Ok(RecomputeOutcome::Updated(breakdown))
    }
}
