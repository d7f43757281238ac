//! ledger-runner: builds a seeded demo ledger and prints the cost dashboard.
//!
//! Usage:
//!   ledger-runner --seed 42 --institutions 3 --months 4 --year 2025 --db demo.db
//!   ledger-runner --data-dir ./data --json
//!
//! Rerunning against the same --db reuses its admin, periods, institutions,
//! managers and HR account, and adds only what is missing.

mod rng;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rng::{DemoRng, Stream};
use rust_decimal::Decimal;
use schoolcost_core::{
    account::NewAccount,
    catalog::BatchLine,
    config::{LedgerConfig, SeedCatalog},
    ledger::{LedgerService, NewPayroll},
    period::Period,
    registration::{NewRegistration, ReviewOutcome},
    reporting::CostReport,
    role::{Actor, Role},
    store::{Institution, MetricFilter, NewInstitution},
    types::MetricKey,
};
use std::env;

const ADMIN_USER: &str = "admin";
const ADMIN_PASSWORD: &str = "admin-demo";
const HR_USER: &str = "rh-demo";
const HR_PASSWORD: &str = "rh-demo-1";
const DEMO_MUNICIPALITY: (&str, &str) = ("São Paulo", "SP");
const SCHOOLS: &[&str] = &[
    "Escola Municipal Monteiro Lobato",
    "Escola Municipal Cecília Meireles",
    "Escola Municipal Paulo Freire",
    "Escola Municipal Anísio Teixeira",
    "Escola Municipal Rachel de Queiroz",
    "Escola Municipal Darcy Ribeiro",
];

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let seed = parse_arg(&args, "--seed", 42u64);
    let institutions = parse_arg(&args, "--institutions", 3usize);
    let months = parse_arg(&args, "--months", 3u32).clamp(1, 12);
    let year = parse_arg(&args, "--year", 2025i32);
    let db = flag_value(&args, "--db").unwrap_or(":memory:");
    let data_dir = flag_value(&args, "--data-dir").unwrap_or("./data");
    let json = args.iter().any(|a| a == "--json");

    if !json {
        println!("School cost ledger, ledger-runner");
        println!("  seed:          {seed}");
        println!("  institutions:  {institutions}");
        println!("  months:        {months}/{year}");
        println!("  db:            {db}");
        println!("  data_dir:      {data_dir}");
        println!();
    }

    let config = LedgerConfig::load(data_dir)?;
    let catalog = SeedCatalog::load(data_dir)?;
    let service = LedgerService::open(db, config)?;
    let options = DemoOptions { seed, institutions, months, year };
    let report = build_demo(&service, &catalog, &options)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

struct DemoOptions {
    seed: u64,
    institutions: usize,
    months: u32,
    year: i32,
}

/// Fill `service` with demo facts and return the year's cost report.
/// Safe to run again on the same database.
fn build_demo(service: &LedgerService, catalog: &SeedCatalog, options: &DemoOptions) -> Result<CostReport> {
    let DemoOptions { seed, institutions, months, year } = *options;
    let admin = service
        .bootstrap_admin(ADMIN_USER, ADMIN_PASSWORD)
        .or_else(|_| service.authenticate(ADMIN_USER, ADMIN_PASSWORD))
        .context("no usable admin account in this database")?;

    let periods = open_periods(service, &admin, catalog, year, months)?;
    let mut people = DemoRng::new(seed, Stream::People);
    let managed = create_institutions(service, &admin, &mut people, institutions)?;
    let hr = hr_account(service, &admin)?;

    let mut expenses = DemoRng::new(seed, Stream::Expenses);
    let mut payroll = DemoRng::new(seed, Stream::Payroll);
    let mut enrollment = DemoRng::new(seed, Stream::Enrollment);

    for period in &periods {
        let Some(combo) = service
            .combos_for_period(period.period_id)?
            .into_iter()
            .find(|c| c.active)
        else {
            log::warn!("period={} demo: no active combo, skipping expenses", period.label());
            continue;
        };
        let defaults = service.combo_lines_with_defaults(combo.combo_id)?;

        for (institution, manager) in &managed {
            let lines: Vec<BatchLine> = defaults
                .iter()
                .map(|line| BatchLine {
                    unit_value: expenses.jitter(line.unit_value, 20),
                    ..line.clone()
                })
                .collect();
            service.record_combo_batch(
                manager,
                combo.combo_id,
                institution.institution_id,
                Some(&format!("lançamento {}", period.label())),
                &lines,
            )?;

            let salaries = payroll.money(2_000_000, 6_000_000);
            let key = MetricKey::new(institution.institution_id, period.period_id);
            if service.payrolls_for(&hr, key)?.is_empty() {
                service.record_payroll(
                    &hr,
                    NewPayroll {
                        institution_id: institution.institution_id,
                        period_id: period.period_id,
                        salaries,
                        charges: (salaries * Decimal::new(20, 2)).round_dp(2),
                        note: String::new(),
                    },
                )?;
            }

            service.record_student_count(
                manager,
                institution.institution_id,
                period.period_id,
                enrollment.between(80, 600),
            )?;
        }
    }

    let summary = service.recompute_all_open(&admin)?;
    log::info!("demo: {} metrics updated, {} deferred", summary.updated, summary.deferred);

    Ok(service.cost_report(&admin, &MetricFilter { year: Some(year), ..Default::default() })?)
}

/// Create (or reuse) periods 1..=months of `year` and seed each one's catalog.
fn open_periods(
    service: &LedgerService,
    admin: &Actor,
    catalog: &SeedCatalog,
    year: i32,
    months: u32,
) -> Result<Vec<Period>> {
    let mut periods = Vec::new();
    for month in 1..=months {
        let period = match service.store().period_by_month(year, month)? {
            Some(p) => p,
            None => service.create_period(admin, year, month)?,
        };
        let first_day = NaiveDate::from_ymd_opt(year, month, 1)
            .with_context(|| format!("invalid month {month}/{year}"))?;
        service.seed_catalog(admin, catalog, first_day)?;
        periods.push(period);
    }
    Ok(periods)
}

/// One institution per school name, each with an approved manager.
/// Institutions already in the database are reused with their manager.
fn create_institutions(
    service: &LedgerService,
    admin: &Actor,
    rng: &mut DemoRng,
    count: usize,
) -> Result<Vec<(Institution, Actor)>> {
    let (city, state) = DEMO_MUNICIPALITY;
    let municipality = service
        .find_municipality(city, state)
        .context("demo municipality missing from the seed catalog")?;

    let mut managed = Vec::new();
    for (i, name) in SCHOOLS.iter().cycle().take(count).enumerate() {
        let name = if i < SCHOOLS.len() { name.to_string() } else { format!("{name} {}", i + 1) };
        // Drawn on every pass so reruns see the same tax ids.
        let tax_id = rng.tax_id();

        let institution = match service.store().institution_by_name(&name)? {
            Some(existing) => existing,
            None => service.create_institution(
                admin,
                NewInstitution {
                    name: name.clone(),
                    kind: "Escola".into(),
                    municipality_id: municipality.municipality_id,
                    inep_code: None,
                },
            )?,
        };
        if let Some(user_id) = &institution.responsible_user_id {
            log::debug!("institution={} demo: reusing manager", institution.institution_id);
            let manager = service.actor_for(user_id)?;
            managed.push((institution, manager));
            continue;
        }

        let request = service.submit_registration(NewRegistration {
            full_name: format!("Gestor {}", i + 1),
            tax_id,
            email: format!("gestor{}@escolas.example", i + 1),
            phone: None,
            requested_role: Role::InstitutionManager,
            institution_id: Some(institution.institution_id),
            birth_date: None,
        })?;
        let manager = match service.approve_registration(admin, request.request_id)? {
            ReviewOutcome::Approved { account, initial_password } => {
                service.authenticate(&account.username, &initial_password)?
            }
            other => anyhow::bail!("registration {} not approved: {other:?}", request.request_id),
        };
        managed.push((institution, manager));
    }
    Ok(managed)
}

fn hr_account(service: &LedgerService, admin: &Actor) -> Result<Actor> {
    if let Some(account) = service.store().account_by_username(HR_USER)? {
        return Ok(service.actor_for(&account.user_id)?);
    }
    let account = service.create_account(
        admin,
        NewAccount {
            username: HR_USER.into(),
            full_name: "Recursos Humanos".into(),
            email: "rh@escolas.example".into(),
            tax_id: None,
            role: Role::HumanResources,
            password: HR_PASSWORD.into(),
        },
    )?;
    Ok(service.authenticate(&account.username, HR_PASSWORD)?)
}

fn print_report(report: &CostReport) {
    println!("=== COST DASHBOARD ===");
    if report.rows.is_empty() {
        println!("  (No metrics yet)");
        return;
    }
    for row in &report.rows {
        let variance = match row.variance_pct {
            Some(v) if v > Decimal::ZERO => format!("+{v}%"),
            Some(v) => format!("{v}%"),
            None => "-".into(),
        };
        println!(
            "  {} | {:<36} | {:>14}/{} | students {:>4} | R$ {:>10} per student | score {:>6} | var {}",
            row.period.label(),
            row.institution_name,
            row.municipality,
            row.state_code,
            row.metric.student_count,
            row.metric.cost_per_student,
            row.metric.efficiency_score,
            variance,
        );
    }
    println!();
    println!("=== NETWORK TOTALS ===");
    println!("  operational:       R$ {}", report.operational_total);
    println!("  payroll:           R$ {}", report.payroll_total);
    println!("  grand total:       R$ {}", report.grand_total);
    println!("  students:          {}", report.students);
    println!("  avg per student:   R$ {}", report.average_cost_per_student);
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    flag_value(args, flag)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2).find(|w| w[0] == flag).map(|w| w[1].as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> DemoOptions {
        DemoOptions { seed: 7, institutions: 2, months: 2, year: 2025 }
    }

    #[test]
    fn demo_fills_every_institution_and_month() {
        let service = LedgerService::build_test().unwrap();
        let report = build_demo(&service, &SeedCatalog::default_test(), &options()).unwrap();
        assert_eq!(report.rows.len(), 4);
        assert!(report.rows.iter().all(|r| r.state_code == "SP"));
        assert!(report.students > 0);
    }

    /// A second run on the same database reuses everything and adds nothing.
    #[test]
    fn rerun_on_same_database_is_stable() {
        let service = LedgerService::build_test().unwrap();
        let catalog = SeedCatalog::default_test();
        let first = build_demo(&service, &catalog, &options()).unwrap();
        let institutions = service.institutions().unwrap();

        let second = build_demo(&service, &catalog, &options()).unwrap();
        assert_eq!(second, first);
        assert_eq!(service.institutions().unwrap(), institutions);
    }
}
