//! Shared fixture: one open period (03/2025), the test catalog, one
//! institution in São Paulo/SP with an approved manager, and an HR account.

#![allow(dead_code)]

use chrono::NaiveDate;
use rust_decimal::Decimal;
use schoolcost_core::{
    account::NewAccount,
    config::SeedCatalog,
    ledger::{LedgerService, NewExpense, NewPayroll},
    period::Period,
    registration::{NewRegistration, ReviewOutcome},
    role::{Actor, Role},
    store::{ExpenseEntry, NewInstitution, PayrollEntry},
    types::{InstitutionId, ItemId, MetricKey},
};

pub const MANAGER_TAX_ID: &str = "12345678901";

pub struct Fixture {
    pub service: LedgerService,
    pub admin: Actor,
    pub manager: Actor,
    pub hr: Actor,
    pub institution_id: InstitutionId,
    pub period: Period,
}

pub fn d(s: &str) -> Decimal {
    s.parse().unwrap()
}

pub fn fixture() -> Fixture {
    fixture_with(LedgerService::build_test().unwrap())
}

/// Build the fixture on an already-migrated service.
pub fn fixture_with(service: LedgerService) -> Fixture {
    let _ = env_logger::builder().is_test(true).try_init();
    let admin = service.bootstrap_admin("admin", "admin-pw").unwrap();
    let period = service.create_period(&admin, 2025, 3).unwrap();
    service
        .seed_catalog(&admin, &SeedCatalog::default_test(), NaiveDate::from_ymd_opt(2025, 3, 1).unwrap())
        .unwrap();

    let sao_paulo = service.find_municipality("São Paulo", "SP").unwrap();
    let institution = service
        .create_institution(
            &admin,
            NewInstitution {
                name: "Escola Municipal Centro".into(),
                kind: "Escola".into(),
                municipality_id: sao_paulo.municipality_id,
                inep_code: Some("35000001".into()),
            },
        )
        .unwrap();

    let manager = register_manager(&service, &admin, MANAGER_TAX_ID, institution.institution_id);

    let hr_account = service
        .create_account(
            &admin,
            NewAccount {
                username: "rh".into(),
                full_name: "Recursos Humanos".into(),
                email: "rh@example.org".into(),
                tax_id: None,
                role: Role::HumanResources,
                password: "rh-password".into(),
            },
        )
        .unwrap();
    let hr = service.authenticate(&hr_account.username, "rh-password").unwrap();

    Fixture {
        service,
        admin,
        manager,
        hr,
        institution_id: institution.institution_id,
        period,
    }
}

pub fn manager_registration(tax_id: &str, institution_id: InstitutionId) -> NewRegistration {
    NewRegistration {
        full_name: "Maria Gestora".into(),
        tax_id: tax_id.into(),
        email: "maria@example.org".into(),
        phone: None,
        requested_role: Role::InstitutionManager,
        institution_id: Some(institution_id),
        birth_date: NaiveDate::from_ymd_opt(1980, 5, 17),
    }
}

/// Submit and approve a manager registration, then log in as that manager.
pub fn register_manager(
    service: &LedgerService,
    admin: &Actor,
    tax_id: &str,
    institution_id: InstitutionId,
) -> Actor {
    let request = service.submit_registration(manager_registration(tax_id, institution_id)).unwrap();
    match service.approve_registration(admin, request.request_id).unwrap() {
        ReviewOutcome::Approved { account, initial_password } => {
            service.authenticate(&account.username, &initial_password).unwrap()
        }
        other => panic!("expected approval, got {other:?}"),
    }
}

impl Fixture {
    pub fn key(&self) -> MetricKey {
        MetricKey::new(self.institution_id, self.period.period_id)
    }

    pub fn item(&self, name: &str) -> ItemId {
        self.service.store().item_by_name(name).unwrap().unwrap().item_id
    }

    pub fn expense(&self, item: &str, value: &str) -> ExpenseEntry {
        self.service
            .record_expense(
                &self.manager,
                NewExpense {
                    institution_id: self.institution_id,
                    period_id: self.period.period_id,
                    item_id: self.item(item),
                    unit_value: d(value),
                    note: String::new(),
                },
            )
            .unwrap()
    }

    pub fn payroll(&self, salaries: &str, charges: &str) -> PayrollEntry {
        self.service
            .record_payroll(
                &self.hr,
                NewPayroll {
                    institution_id: self.institution_id,
                    period_id: self.period.period_id,
                    salaries: d(salaries),
                    charges: d(charges),
                    note: String::new(),
                },
            )
            .unwrap()
    }

    pub fn students(&self, count: u32) {
        self.service
            .record_student_count(&self.manager, self.institution_id, self.period.period_id, count)
            .unwrap();
    }
}
