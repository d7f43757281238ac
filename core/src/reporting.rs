//! Read side: dashboard rows, cost reports and bulk recomputation.
//!
//! Reports read the derived metric rows only. Variance is computed at read
//! time from the prior month's row, so it never goes stale.

use crate::{
    aggregator::RecomputeOutcome,
    error::{LedgerError, LedgerResult},
    ledger::LedgerService,
    metrics::{cents, CostBreakdown},
    period::Period,
    role::{Actor, Capability},
    store::{CostMetric, MetricFilter, MetricRow},
    types::{InstitutionId, MetricKey, Money},
    variance,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardRow {
    pub institution_id: InstitutionId,
    pub institution_name: String,
    pub municipality: String,
    pub state_code: String,
    pub period: Period,
    pub metric: CostBreakdown,
    /// Month-over-month change in cost per student, in percent.
    pub variance_pct: Option<Decimal>,
}

/// Dashboard rows plus network-wide totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostReport {
    pub rows: Vec<DashboardRow>,
    pub operational_total: Money,
    pub payroll_total: Money,
    pub grand_total: Money,
    pub students: u64,
    /// grand_total / students across all rows; zero with no students.
    pub average_cost_per_student: Money,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecomputeSummary {
    pub updated: usize,
    pub deferred: usize,
}

impl LedgerService {
    /// Metric rows visible to `actor`, newest period first.
    ///
    /// Institution managers only see the institutions they are responsible for.
    pub fn dashboard(&self, actor: &Actor, filter: &MetricFilter) -> LedgerResult<Vec<DashboardRow>> {
        self.authorize(actor, Capability::ViewReports, filter.institution_id)?;
        let visible = if actor.role.is_institution_scoped() {
            Some(self.store().institutions_responsible_by(&actor.user_id)?)
        } else {
            None
        };

        let rows = self
            .store()
            .metric_rows(filter)?
            .into_iter()
            .filter(|row| {
                visible
                    .as_ref()
                    .map_or(true, |ids| ids.contains(&row.metric.key.institution_id))
            })
            .map(|row| self.dashboard_row(row))
            .collect();
        Ok(rows)
    }

    fn dashboard_row(&self, row: MetricRow) -> DashboardRow {
        let MetricRow { metric, period, institution_name, municipality, state_code } = row;
        let variance_pct = variance::month_over_month(
            self.store(),
            metric.key.institution_id,
            &period,
            metric.breakdown.cost_per_student,
        );
        DashboardRow {
            institution_id: metric.key.institution_id,
            institution_name,
            municipality,
            state_code,
            period,
            metric: metric.breakdown,
            variance_pct,
        }
    }

    pub fn cost_report(&self, actor: &Actor, filter: &MetricFilter) -> LedgerResult<CostReport> {
        let rows = self.dashboard(actor, filter)?;
        let operational_total: Money = rows.iter().map(|r| r.metric.operational_total).sum();
        let payroll_total: Money = rows.iter().map(|r| r.metric.payroll_total).sum();
        let grand_total = operational_total + payroll_total;
        let students: u64 = rows.iter().map(|r| u64::from(r.metric.student_count)).sum();
        let average_cost_per_student = if students > 0 {
            cents(grand_total / Decimal::from(students))
        } else {
            Decimal::ZERO
        };
        Ok(CostReport {
            rows,
            operational_total,
            payroll_total,
            grand_total,
            students,
            average_cost_per_student,
        })
    }

    pub fn metric_for(&self, actor: &Actor, key: MetricKey) -> LedgerResult<CostMetric> {
        self.authorize(actor, Capability::ViewReports, Some(key.institution_id))?;
        self.store()
            .metric(key)?
            .ok_or_else(|| LedgerError::not_found("cost metric", key))
    }

    /// Recompute every institution × open period. Used after bulk imports.
    pub fn recompute_all_open(&self, actor: &Actor) -> LedgerResult<RecomputeSummary> {
        self.authorize(actor, Capability::RecomputeMetrics, None)?;
        let institutions = self.store().institutions()?;
        let periods = self.store().open_periods()?;

        self.store().atomic(|_| {
            let mut summary = RecomputeSummary::default();
            for period in &periods {
                for institution in &institutions {
                    let key = MetricKey::new(institution.institution_id, period.period_id);
                    match self.aggregator().recompute(key, Some(&actor.user_id))? {
                        RecomputeOutcome::Updated(_) => summary.updated += 1,
                        RecomputeOutcome::Deferred => summary.deferred += 1,
                    }
                }
            }
            log::info!(
                "reporting: recomputed {} metrics, {} deferred",
                summary.updated,
                summary.deferred
            );
            Ok(summary)
        })
    }
}
