//! Combo batch entry: one expense per selected combo line.

mod common;

use chrono::NaiveDate;
use common::{d, fixture, Fixture};
use schoolcost_core::{
    catalog::BatchLine,
    config::SeedCatalog,
    error::LedgerError,
    store::Combo,
};

fn default_combo(fx: &Fixture) -> Combo {
    fx.service
        .combos_for_period(fx.period.period_id)
        .unwrap()
        .into_iter()
        .next()
        .expect("seeded combo")
}

#[test]
fn defaults_prefill_batch_lines() {
    let fx = fixture();
    let combo = default_combo(&fx);
    assert_eq!(combo.name, "Gastos Mensais Padrão");

    let lines = fx.service.combo_lines_with_defaults(combo.combo_id).unwrap();
    assert_eq!(lines.len(), 2);
    let internet = lines.iter().find(|l| l.item_id == fx.item("Internet")).unwrap();
    assert_eq!(internet.unit_value, d("150.00"));
}

#[test]
fn batch_creates_entries_with_combo_note() {
    let fx = fixture();
    let combo = default_combo(&fx);
    let lines = vec![
        BatchLine { item_id: fx.item("Material Escolar"), unit_value: d("60.00"), note: None },
        BatchLine { item_id: fx.item("Internet"), unit_value: d("150.00"), note: Some("fatura 03".into()) },
    ];

    let outcome = fx
        .service
        .record_combo_batch(&fx.manager, combo.combo_id, fx.institution_id, Some("março"), &lines)
        .unwrap();
    assert_eq!(outcome.created.len(), 2);
    assert!(outcome.skipped.is_empty());
    assert!(outcome.created.iter().all(|e| e.combo_id == Some(combo.combo_id)));

    let internet = outcome.created.iter().find(|e| e.item_id == fx.item("Internet")).unwrap();
    assert_eq!(internet.note, "Combo: Gastos Mensais Padrão | março | fatura 03");
    let material = outcome.created.iter().find(|e| e.item_id == fx.item("Material Escolar")).unwrap();
    assert_eq!(material.note, "Combo: Gastos Mensais Padrão | março");
}

#[test]
fn items_outside_combo_and_duplicates_are_skipped() {
    let fx = fixture();
    let combo = default_combo(&fx);
    fx.expense("Internet", "140.00");

    let lines = vec![
        BatchLine { item_id: fx.item("Material Escolar"), unit_value: d("50.00"), note: None },
        BatchLine { item_id: fx.item("Internet"), unit_value: d("150.00"), note: None },
        BatchLine { item_id: fx.item("Limpeza"), unit_value: d("25.00"), note: None },
    ];
    let outcome = fx
        .service
        .record_combo_batch(&fx.manager, combo.combo_id, fx.institution_id, None, &lines)
        .unwrap();

    assert_eq!(outcome.created.len(), 1);
    assert_eq!(outcome.created[0].item_id, fx.item("Material Escolar"));
    assert_eq!(outcome.skipped, vec![fx.item("Internet"), fx.item("Limpeza")]);

    // Running the same batch again creates nothing.
    let again = fx
        .service
        .record_combo_batch(&fx.manager, combo.combo_id, fx.institution_id, None, &lines)
        .unwrap();
    assert!(again.created.is_empty());
    assert_eq!(again.skipped.len(), 3);
}

/// The whole batch triggers a single recomputation.
#[test]
fn batch_recomputes_once() {
    let fx = fixture();
    fx.students(10);
    let combo = default_combo(&fx);
    let before = fx.service.store().events_of_type("metric_recomputed").unwrap().len();

    let lines = fx.service.combo_lines_with_defaults(combo.combo_id).unwrap();
    fx.service
        .record_combo_batch(&fx.manager, combo.combo_id, fx.institution_id, None, &lines)
        .unwrap();

    let after = fx.service.store().events_of_type("metric_recomputed").unwrap().len();
    assert_eq!(after, before + 1);
    let m = fx.service.store().metric(fx.key()).unwrap().unwrap().breakdown;
    assert_eq!(m.operational_total, d("200.00"));
    assert_eq!(m.cost_per_student, d("20.00"));
}

#[test]
fn empty_batch_is_rejected() {
    let fx = fixture();
    let combo = default_combo(&fx);
    let err = fx
        .service
        .record_combo_batch(&fx.manager, combo.combo_id, fx.institution_id, None, &[])
        .unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)));
}

#[test]
fn inactive_combo_is_rejected() {
    let fx = fixture();
    let combo = default_combo(&fx);
    fx.service.set_combo_active(&fx.admin, combo.combo_id, false).unwrap();

    let lines = fx.service.combo_lines_with_defaults(combo.combo_id).unwrap();
    let err = fx
        .service
        .record_combo_batch(&fx.manager, combo.combo_id, fx.institution_id, None, &lines)
        .unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)));
    assert!(fx.service.store().expenses_for(fx.key()).unwrap().is_empty());
}

#[test]
fn closed_period_rejects_batch() {
    let fx = fixture();
    let combo = default_combo(&fx);
    fx.service.close_period(&fx.admin, fx.period.period_id).unwrap();

    let lines = fx.service.combo_lines_with_defaults(combo.combo_id).unwrap();
    let err = fx
        .service
        .record_combo_batch(&fx.manager, combo.combo_id, fx.institution_id, None, &lines)
        .unwrap_err();
    assert!(matches!(err, LedgerError::ClosedPeriod { .. }));
}

#[test]
fn seeding_twice_changes_nothing() {
    let fx = fixture();
    let summary = fx
        .service
        .seed_catalog(&fx.admin, &SeedCatalog::default_test(), NaiveDate::from_ymd_opt(2025, 3, 15).unwrap())
        .unwrap();
    assert_eq!(summary.combo_id, None);
    assert_eq!(summary.items, 3);
    assert_eq!(fx.service.items().unwrap().len(), 3);
    assert_eq!(fx.service.combos_for_period(fx.period.period_id).unwrap().len(), 1);
}

#[test]
fn combo_items_can_be_added() {
    let fx = fixture();
    let combo = default_combo(&fx);
    let items = fx
        .service
        .add_combo_item(&fx.admin, combo.combo_id, fx.item("Limpeza"), d("30.00"))
        .unwrap();
    assert_eq!(items.len(), 3);

    let err = fx
        .service
        .add_combo_item(&fx.manager, combo.combo_id, fx.item("Limpeza"), d("30.00"))
        .unwrap_err();
    assert!(matches!(err, LedgerError::PermissionDenied { .. }));
}

#[test]
fn seeding_opens_missing_period_with_combo() {
    let fx = fixture();
    let summary = fx
        .service
        .seed_catalog(&fx.admin, &SeedCatalog::default_test(), NaiveDate::from_ymd_opt(2025, 4, 2).unwrap())
        .unwrap();

    let april = fx.service.store().period_by_month(2025, 4).unwrap().expect("april opened");
    assert!(april.open);
    assert_eq!(summary.period_id, Some(april.period_id));
    let combos = fx.service.combos_for_period(april.period_id).unwrap();
    assert_eq!(combos.len(), 1);
    assert_eq!(summary.combo_id, Some(combos[0].combo_id));
    assert_eq!(fx.service.combo_lines_with_defaults(combos[0].combo_id).unwrap().len(), 2);
}
