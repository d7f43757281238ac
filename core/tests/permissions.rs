//! Role checks and institution scoping at the service boundary.

mod common;

use common::{d, fixture, register_manager};
use schoolcost_core::{
    error::LedgerError,
    ledger::{NewExpense, NewPayroll},
    role::Capability,
    store::{MetricFilter, NewInstitution},
    types::MetricKey,
};

fn second_institution(fx: &common::Fixture) -> i64 {
    let rio = fx.service.find_municipality("Rio de Janeiro", "RJ").unwrap();
    fx.service
        .create_institution(
            &fx.admin,
            NewInstitution {
                name: "Escola Municipal Norte".into(),
                kind: "Escola".into(),
                municipality_id: rio.municipality_id,
                inep_code: None,
            },
        )
        .unwrap()
        .institution_id
}

#[test]
fn manager_cannot_write_for_other_institution() {
    let fx = fixture();
    let other = second_institution(&fx);

    let err = fx
        .service
        .record_expense(
            &fx.manager,
            NewExpense {
                institution_id: other,
                period_id: fx.period.period_id,
                item_id: fx.item("Internet"),
                unit_value: d("10.00"),
                note: String::new(),
            },
        )
        .unwrap_err();
    assert!(matches!(
        err,
        LedgerError::PermissionDenied { capability: Capability::RecordExpense, .. }
    ));
    assert!(fx
        .service
        .record_student_count(&fx.manager, other, fx.period.period_id, 10)
        .is_err());
}

#[test]
fn roles_stay_in_their_lane() {
    let fx = fixture();
    let expense = NewExpense {
        institution_id: fx.institution_id,
        period_id: fx.period.period_id,
        item_id: fx.item("Internet"),
        unit_value: d("10.00"),
        note: String::new(),
    };
    assert!(matches!(
        fx.service.record_expense(&fx.hr, expense),
        Err(LedgerError::PermissionDenied { .. })
    ));

    let payroll = NewPayroll {
        institution_id: fx.institution_id,
        period_id: fx.period.period_id,
        salaries: d("10.00"),
        charges: d("0"),
        note: String::new(),
    };
    assert!(matches!(
        fx.service.record_payroll(&fx.manager, payroll),
        Err(LedgerError::PermissionDenied { .. })
    ));
    assert!(matches!(
        fx.service.create_period(&fx.manager, 2025, 4),
        Err(LedgerError::PermissionDenied { .. })
    ));
    assert!(matches!(
        fx.service.recompute_all_open(&fx.hr),
        Err(LedgerError::PermissionDenied { .. })
    ));
}

#[test]
fn manager_dashboard_shows_own_institution_only() {
    let fx = fixture();
    let other = second_institution(&fx);
    fx.students(5);
    fx.service
        .record_student_count(&fx.admin, other, fx.period.period_id, 8)
        .unwrap();

    let admin_rows = fx.service.dashboard(&fx.admin, &MetricFilter::default()).unwrap();
    assert_eq!(admin_rows.len(), 2);

    let manager_rows = fx.service.dashboard(&fx.manager, &MetricFilter::default()).unwrap();
    assert_eq!(manager_rows.len(), 1);
    assert_eq!(manager_rows[0].institution_id, fx.institution_id);

    let err = fx
        .service
        .metric_for(&fx.manager, MetricKey::new(other, fx.period.period_id))
        .unwrap_err();
    assert!(matches!(err, LedgerError::PermissionDenied { .. }));

    // A second manager sees the other institution instead.
    let other_manager = register_manager(&fx.service, &fx.admin, "70000000007", other);
    let rows = fx.service.dashboard(&other_manager, &MetricFilter::default()).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].institution_id, other);
}

#[test]
fn duplicate_and_negative_expenses_are_refused() {
    let fx = fixture();
    fx.expense("Internet", "100.00");

    let mut new = NewExpense {
        institution_id: fx.institution_id,
        period_id: fx.period.period_id,
        item_id: fx.item("Internet"),
        unit_value: d("100.00"),
        note: String::new(),
    };
    let err = fx.service.record_expense(&fx.manager, new.clone()).unwrap_err();
    assert!(matches!(err, LedgerError::DuplicateExpense { .. }));

    new.item_id = fx.item("Limpeza");
    new.unit_value = d("-0.01");
    let err = fx.service.record_expense(&fx.manager, new).unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)));
    assert_eq!(fx.service.store().expenses_for(fx.key()).unwrap().len(), 1);
}

#[test]
fn deactivated_account_cannot_log_in() {
    let fx = fixture();
    fx.service.deactivate_account(&fx.admin, &fx.hr.user_id).unwrap();
    assert!(fx.service.authenticate("rh", "rh-password").is_err());
    assert!(fx.service.actor_for(&fx.hr.user_id).is_err());
}
