//! Month-over-month variance as shown on the dashboard.

mod common;

use common::{d, fixture, Fixture};
use schoolcost_core::{
    ledger::NewPayroll,
    period::Period,
    reporting::DashboardRow,
    store::MetricFilter,
    types::PeriodId,
};

fn month_with_cost(fx: &Fixture, period: &Period, payroll: &str, students: u32) {
    fx.service
        .record_payroll(
            &fx.hr,
            NewPayroll {
                institution_id: fx.institution_id,
                period_id: period.period_id,
                salaries: d(payroll),
                charges: d("0"),
                note: String::new(),
            },
        )
        .unwrap();
    fx.service
        .record_student_count(&fx.manager, fx.institution_id, period.period_id, students)
        .unwrap();
}

fn row_for(rows: &[DashboardRow], period_id: PeriodId) -> &DashboardRow {
    rows.iter().find(|r| r.period.period_id == period_id).expect("dashboard row")
}

#[test]
fn cheaper_month_shows_negative_variance() {
    let fx = fixture();
    let february = fx.service.create_period(&fx.admin, 2025, 2).unwrap();
    month_with_cost(&fx, &february, "5000.00", 10);
    month_with_cost(&fx, &fx.period, "4500.00", 10);

    let rows = fx.service.dashboard(&fx.admin, &MetricFilter::default()).unwrap();
    assert_eq!(rows.len(), 2);
    // Newest first.
    assert_eq!(rows[0].period.month, 3);
    assert_eq!(row_for(&rows, fx.period.period_id).variance_pct, Some(d("-10.00")));
    assert_eq!(row_for(&rows, february.period_id).variance_pct, None);
}

/// January never looks back into December.
#[test]
fn january_has_no_variance() {
    let fx = fixture();
    let december = fx.service.create_period(&fx.admin, 2024, 12).unwrap();
    let january = fx.service.create_period(&fx.admin, 2025, 1).unwrap();
    month_with_cost(&fx, &december, "1000.00", 10);
    month_with_cost(&fx, &january, "2000.00", 10);

    let rows = fx.service.dashboard(&fx.admin, &MetricFilter::default()).unwrap();
    assert_eq!(row_for(&rows, january.period_id).variance_pct, None);
}

#[test]
fn zero_cost_predecessor_has_no_variance() {
    let fx = fixture();
    let february = fx.service.create_period(&fx.admin, 2025, 2).unwrap();
    month_with_cost(&fx, &february, "0", 10);
    month_with_cost(&fx, &fx.period, "4500.00", 10);

    let rows = fx.service.dashboard(&fx.admin, &MetricFilter::default()).unwrap();
    assert_eq!(row_for(&rows, fx.period.period_id).variance_pct, None);
}

#[test]
fn missing_predecessor_has_no_variance() {
    let fx = fixture();
    month_with_cost(&fx, &fx.period, "4500.00", 10);

    let rows = fx.service.dashboard(&fx.admin, &MetricFilter::default()).unwrap();
    assert_eq!(rows[0].variance_pct, None);
}

#[test]
fn cost_report_totals_across_months() {
    let fx = fixture();
    let february = fx.service.create_period(&fx.admin, 2025, 2).unwrap();
    month_with_cost(&fx, &february, "5000.00", 10);
    month_with_cost(&fx, &fx.period, "4000.00", 20);

    let report = fx
        .service
        .cost_report(&fx.admin, &MetricFilter { year: Some(2025), ..Default::default() })
        .unwrap();
    assert_eq!(report.rows.len(), 2);
    assert_eq!(report.grand_total, d("9000.00"));
    assert_eq!(report.students, 30);
    assert_eq!(report.average_cost_per_student, d("300.00"));
}
