//! Store methods for the derived cost metric (the dashboard row).

use super::{decimal_at, LedgerStore};
use crate::{
    error::LedgerResult,
    metrics::CostBreakdown,
    period::Period,
    types::{InstitutionId, MetricKey, PeriodId},
};
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

/// One derived row per (institution, period).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostMetric {
    pub key: MetricKey,
    pub breakdown: CostBreakdown,
}

/// A metric joined with its period, institution and location, for reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricRow {
    pub metric: CostMetric,
    pub period: Period,
    pub institution_name: String,
    pub municipality: String,
    pub state_code: String,
}

/// Optional filters; `None` matches everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricFilter {
    pub institution_id: Option<InstitutionId>,
    pub period_id: Option<PeriodId>,
    pub year: Option<i32>,
    /// Two-letter state code of the institution's municipality.
    pub state_code: Option<String>,
}

const METRIC_COLUMNS: &str = "m.institution_id, m.period_id, m.operational_total, m.payroll_total,
     m.grand_total, m.student_count, m.cost_per_student, m.pct_payroll,
     m.pct_operational, m.efficiency_score";

fn metric_from_row(r: &Row<'_>) -> rusqlite::Result<CostMetric> {
    Ok(CostMetric {
        key: MetricKey::new(r.get(0)?, r.get(1)?),
        breakdown: CostBreakdown {
            operational_total: decimal_at(r, 2)?,
            payroll_total: decimal_at(r, 3)?,
            grand_total: decimal_at(r, 4)?,
            student_count: r.get(5)?,
            cost_per_student: decimal_at(r, 6)?,
            pct_payroll: decimal_at(r, 7)?,
            pct_operational: decimal_at(r, 8)?,
            efficiency_score: decimal_at(r, 9)?,
        },
    })
}

impl LedgerStore {
    /// Insert the row for `key`, or overwrite every derived field if it exists.
    pub fn upsert_metric(&self, key: MetricKey, m: &CostBreakdown) -> LedgerResult<()> {
        self.conn.execute(
            "INSERT INTO cost_metric (
                institution_id, period_id, operational_total, payroll_total, grand_total,
                student_count, cost_per_student, pct_payroll, pct_operational, efficiency_score
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(institution_id, period_id) DO UPDATE SET
                operational_total = excluded.operational_total,
                payroll_total     = excluded.payroll_total,
                grand_total       = excluded.grand_total,
                student_count     = excluded.student_count,
                cost_per_student  = excluded.cost_per_student,
                pct_payroll       = excluded.pct_payroll,
                pct_operational   = excluded.pct_operational,
                efficiency_score  = excluded.efficiency_score",
            params![
                key.institution_id,
                key.period_id,
                m.operational_total.to_string(),
                m.payroll_total.to_string(),
                m.grand_total.to_string(),
                m.student_count,
                m.cost_per_student.to_string(),
                m.pct_payroll.to_string(),
                m.pct_operational.to_string(),
                m.efficiency_score.to_string(),
            ],
        )?;
        Ok(())
    }

    pub fn metric(&self, key: MetricKey) -> LedgerResult<Option<CostMetric>> {
        Ok(self
            .conn
            .query_row(
                &format!(
                    "SELECT {METRIC_COLUMNS} FROM cost_metric m
                     WHERE m.institution_id = ?1 AND m.period_id = ?2"
                ),
                params![key.institution_id, key.period_id],
                metric_from_row,
            )
            .optional()?)
    }

    /// The metric for an institution in a given calendar month, if both exist.
    pub fn metric_for_month(
        &self,
        institution_id: InstitutionId,
        year: i32,
        month: u32,
    ) -> LedgerResult<Option<CostMetric>> {
        Ok(self
            .conn
            .query_row(
                &format!(
                    "SELECT {METRIC_COLUMNS} FROM cost_metric m
                     JOIN period p ON p.period_id = m.period_id
                     WHERE m.institution_id = ?1 AND p.year = ?2 AND p.month = ?3"
                ),
                params![institution_id, year, month],
                metric_from_row,
            )
            .optional()?)
    }

    /// Metrics matching `filter`, newest period first, then institution name.
    pub fn metric_rows(&self, filter: &MetricFilter) -> LedgerResult<Vec<MetricRow>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {METRIC_COLUMNS}, p.year, p.month, p.open, i.name, mu.name, mu.state_code
             FROM cost_metric m
             JOIN period p ON p.period_id = m.period_id
             JOIN institution i ON i.institution_id = m.institution_id
             JOIN municipality mu ON mu.municipality_id = i.municipality_id
             WHERE (?1 IS NULL OR m.institution_id = ?1)
               AND (?2 IS NULL OR m.period_id = ?2)
               AND (?3 IS NULL OR p.year = ?3)
               AND (?4 IS NULL OR mu.state_code = ?4)
             ORDER BY p.year DESC, p.month DESC, i.name ASC"
        ))?;
        let rows = stmt.query_map(
            params![filter.institution_id, filter.period_id, filter.year, filter.state_code],
            |r| {
                let metric = metric_from_row(r)?;
                Ok(MetricRow {
                    period: Period {
                        period_id: metric.key.period_id,
                        year: r.get(10)?,
                        month: r.get(11)?,
                        open: r.get(12)?,
                    },
                    institution_name: r.get(13)?,
                    municipality: r.get(14)?,
                    state_code: r.get(15)?,
                    metric,
                })
            },
        )?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn metric_count(&self) -> LedgerResult<i64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM cost_metric", [], |r| r.get(0))?)
    }
}
