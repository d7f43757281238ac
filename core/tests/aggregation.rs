//! Aggregator tests: every raw-fact write keeps the (institution, period)
//! metric row in sync.

mod common;

use common::{d, fixture, fixture_with};
use rust_decimal::Decimal;
use schoolcost_core::{
    config::LedgerConfig,
    error::LedgerError,
    ledger::{LedgerService, NewExpense},
};

/// R$1000 operational, R$4000 payroll, 10 students, baseline 500.
#[test]
fn reference_month_produces_expected_metric() {
    let fx = fixture();
    fx.expense("Material Escolar", "1000.00");
    fx.payroll("3000.00", "1000.00");
    fx.students(10);

    let m = fx.service.store().metric(fx.key()).unwrap().expect("metric row").breakdown;
    assert_eq!(m.operational_total, d("1000.00"));
    assert_eq!(m.payroll_total, d("4000.00"));
    assert_eq!(m.grand_total, d("5000.00"));
    assert_eq!(m.student_count, 10);
    assert_eq!(m.cost_per_student, d("500.00"));
    assert_eq!(m.pct_payroll, d("80"));
    assert_eq!(m.pct_operational, d("20"));
    assert_eq!(m.efficiency_score, d("100"));
}

/// Without a student count the aggregator writes nothing.
#[test]
fn missing_student_count_defers_metric() {
    let fx = fixture();
    fx.expense("Material Escolar", "120.00");
    fx.payroll("2000.00", "400.00");

    assert!(fx.service.store().metric(fx.key()).unwrap().is_none());
    assert_eq!(fx.service.store().metric_count().unwrap(), 0);
    assert!(fx.service.store().events_of_type("metric_recomputed").unwrap().is_empty());
}

/// Reporting the count later picks up every fact recorded before it.
#[test]
fn late_student_count_unblocks_metric() {
    let fx = fixture();
    fx.expense("Material Escolar", "300.00");
    fx.expense("Internet", "200.00");
    fx.payroll("4000.00", "500.00");
    fx.students(20);

    let m = fx.service.store().metric(fx.key()).unwrap().unwrap().breakdown;
    assert_eq!(m.grand_total, d("5000.00"));
    assert_eq!(m.cost_per_student, d("250.00"));
}

#[test]
fn update_and_delete_expense_resync_metric() {
    let fx = fixture();
    let entry = fx.expense("Material Escolar", "1000.00");
    fx.payroll("3000.00", "1000.00");
    fx.students(10);

    fx.service.update_expense(&fx.manager, entry.entry_id, d("2000.00"), None).unwrap();
    let m = fx.service.store().metric(fx.key()).unwrap().unwrap().breakdown;
    assert_eq!(m.operational_total, d("2000.00"));
    assert_eq!(m.cost_per_student, d("600.00"));
    assert!(m.efficiency_score < Decimal::ONE_HUNDRED);

    fx.service.delete_expense(&fx.manager, entry.entry_id).unwrap();
    let m = fx.service.store().metric(fx.key()).unwrap().unwrap().breakdown;
    assert_eq!(m.operational_total, Decimal::ZERO);
    assert_eq!(m.grand_total, d("4000.00"));
    assert_eq!(m.pct_payroll, d("100"));
}

#[test]
fn update_expense_keeps_note_unless_given() {
    let fx = fixture();
    let entry = fx.expense("Limpeza", "80.00");
    let updated = fx.service.update_expense(&fx.manager, entry.entry_id, d("90.00"), None).unwrap();
    assert_eq!(updated.note, entry.note);
    assert_eq!(updated.total_value, d("90.00"));
    assert_eq!(updated.quantity, 1);

    let updated = fx
        .service
        .update_expense(&fx.manager, entry.entry_id, d("90.00"), Some("nota 77".into()))
        .unwrap();
    assert_eq!(updated.note, "nota 77");
}

#[test]
fn payroll_rows_accumulate_and_update() {
    let fx = fixture();
    fx.students(4);
    let first = fx.payroll("1000.00", "200.00");
    fx.payroll("500.00", "100.00");

    let m = fx.service.store().metric(fx.key()).unwrap().unwrap().breakdown;
    assert_eq!(m.payroll_total, d("1800.00"));
    assert_eq!(fx.service.payrolls_for(&fx.manager, fx.key()).unwrap().len(), 2);

    fx.service.update_payroll(&fx.hr, first.payroll_id, d("2000.00"), d("0")).unwrap();
    let m = fx.service.store().metric(fx.key()).unwrap().unwrap().breakdown;
    assert_eq!(m.payroll_total, d("2600.00"));
    assert_eq!(m.cost_per_student, d("650.00"));

    fx.service.delete_payroll(&fx.hr, first.payroll_id).unwrap();
    let m = fx.service.store().metric(fx.key()).unwrap().unwrap().breakdown;
    assert_eq!(m.payroll_total, d("600.00"));
}

/// Recomputing without new facts changes nothing and never adds a row.
#[test]
fn recompute_is_idempotent() {
    let fx = fixture();
    fx.expense("Internet", "150.00");
    fx.payroll("2500.00", "350.00");
    fx.students(7);
    let before = fx.service.store().metric(fx.key()).unwrap().unwrap();
    let events_before = fx.service.store().event_count().unwrap();

    for _ in 0..3 {
        let summary = fx.service.recompute_all_open(&fx.admin).unwrap();
        assert_eq!(summary.updated, 1);
        assert_eq!(summary.deferred, 0);
    }

    let after = fx.service.store().metric(fx.key()).unwrap().unwrap();
    assert_eq!(before, after);
    assert_eq!(fx.service.store().metric_count().unwrap(), 1);
    assert_eq!(fx.service.store().event_count().unwrap(), events_before, "nothing changed, nothing audited");
}

/// Recomputing keys that have no student count leaves the audit log alone.
#[test]
fn deferred_recompute_is_not_audited() {
    let fx = fixture();
    fx.expense("Internet", "150.00");
    let events_before = fx.service.store().event_count().unwrap();

    let summary = fx.service.recompute_all_open(&fx.admin).unwrap();
    assert_eq!(summary.updated, 0);
    assert_eq!(summary.deferred, 1);
    assert_eq!(fx.service.store().event_count().unwrap(), events_before);
}

/// Zero students is a valid count: cost per student is zero.
#[test]
fn zero_students_yields_zero_cost_per_student() {
    let fx = fixture();
    fx.expense("Internet", "150.00");
    fx.students(0);

    let m = fx.service.store().metric(fx.key()).unwrap().unwrap().breakdown;
    assert_eq!(m.student_count, 0);
    assert_eq!(m.cost_per_student, Decimal::ZERO);
    assert_eq!(m.efficiency_score, d("100"));
}

/// Removing the count defers later recomputes; the last row stays as it was.
#[test]
fn deleting_student_count_leaves_last_metric() {
    let fx = fixture();
    fx.expense("Internet", "100.00");
    fx.students(10);
    let before = fx.service.store().metric(fx.key()).unwrap().unwrap();

    fx.service
        .delete_student_count(&fx.manager, fx.institution_id, fx.period.period_id)
        .unwrap();
    fx.expense("Limpeza", "900.00");

    let after = fx.service.store().metric(fx.key()).unwrap().unwrap();
    assert_eq!(before, after);
}

#[test]
fn every_write_is_audited() {
    let fx = fixture();
    let entry = fx.expense("Internet", "100.00");
    fx.payroll("1.00", "1.00");
    fx.students(3);

    let recorded = fx.service.store().events_of_type("expense_recorded").unwrap();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].actor_id.as_deref(), Some(fx.manager.user_id.as_str()));
    match recorded[0].decode().unwrap() {
        schoolcost_core::event::LedgerEvent::ExpenseRecorded { entry_id, total_value, .. } => {
            assert_eq!(entry_id, entry.entry_id);
            assert_eq!(total_value, d("100.00"));
        }
        other => panic!("unexpected event {other:?}"),
    }
    assert_eq!(fx.service.store().events_of_type("payroll_recorded").unwrap().len(), 1);
    assert_eq!(fx.service.store().events_of_type("metric_recomputed").unwrap().len(), 1);
}

/// A recompute that cannot read the stored facts fails the whole write:
/// the new expense, its audit event and the metric all stay as they were.
#[test]
fn failed_recompute_rolls_back_triggering_write() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.db");
    let service = LedgerService::open(path.to_str().unwrap(), LedgerConfig::default_test()).unwrap();
    let fx = fixture_with(service);
    let internet = fx.expense("Internet", "100.00");
    fx.students(10);
    let metric_before = fx.service.store().metric(fx.key()).unwrap().unwrap();
    let events_before = fx.service.store().event_count().unwrap();

    let raw = rusqlite::Connection::open(&path).unwrap();
    raw.execute(
        "UPDATE expense_entry SET total_value = 'garbled' WHERE entry_id = ?1",
        [internet.entry_id],
    )
    .unwrap();
    let expense_rows = |conn: &rusqlite::Connection| -> i64 {
        conn.query_row("SELECT COUNT(*) FROM expense_entry", [], |r| r.get(0)).unwrap()
    };

    let new = NewExpense {
        institution_id: fx.institution_id,
        period_id: fx.period.period_id,
        item_id: fx.item("Limpeza"),
        unit_value: d("40.00"),
        note: String::new(),
    };
    let err = fx.service.record_expense(&fx.manager, new.clone()).unwrap_err();
    assert!(matches!(err, LedgerError::AggregationFailed { .. }), "{err}");
    assert!(err.is_retryable());

    assert_eq!(expense_rows(&raw), 1, "the new entry was rolled back");
    assert_eq!(fx.service.store().event_count().unwrap(), events_before);
    assert_eq!(fx.service.store().metric(fx.key()).unwrap().unwrap(), metric_before);

    // Once the stored row reads again, the same write succeeds.
    raw.execute(
        "UPDATE expense_entry SET total_value = '100.00' WHERE entry_id = ?1",
        [internet.entry_id],
    )
    .unwrap();
    fx.service.record_expense(&fx.manager, new).unwrap();
    assert_eq!(expense_rows(&raw), 2);
    let m = fx.service.store().metric(fx.key()).unwrap().unwrap().breakdown;
    assert_eq!(m.operational_total, d("140.00"));
}
