//! Expense catalog, combo templates and combo batch entry.
//!
//! A combo is a named, per-period bundle of catalog items with default
//! unit values. Recording a combo batch creates one expense entry per
//! selected line, skipping items outside the combo and items that already
//! have an entry for the key. All created entries share the batch's
//! transaction and a single aggregator recomputation.

use crate::{
    config::SeedCatalog,
    error::{LedgerError, LedgerResult},
    event::LedgerEvent,
    ledger::{LedgerService, NewExpense},
    role::{Actor, Capability},
    store::{Combo, ComboItem, ExpenseCategory, ExpenseEntry, ExpenseItem},
    types::{ComboId, InstitutionId, ItemId, MetricKey, Money, PeriodId},
};
use chrono::{Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One selected line of a combo batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchLine {
    pub item_id: ItemId,
    pub unit_value: Money,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub created: Vec<ExpenseEntry>,
    /// Items not in the combo, or already recorded for the key.
    pub skipped: Vec<ItemId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedSummary {
    pub states: usize,
    pub municipalities: usize,
    pub categories: usize,
    pub items: usize,
    /// Period of `today`, created if it did not exist.
    pub period_id: Option<PeriodId>,
    /// The default combo for that period, when one was created.
    pub combo_id: Option<ComboId>,
}

fn validate_state_code(code: &str) -> LedgerResult<()> {
    if code.len() != 2 || !code.chars().all(|c| c.is_ascii_uppercase()) {
        return Err(LedgerError::Validation(format!(
            "state code must be two uppercase letters, got '{code}'"
        )));
    }
    Ok(())
}

/// `Combo: <name>[ | <general note>][ | <line note>]`
fn batch_note(combo_name: &str, general: Option<&str>, line: Option<&str>) -> String {
    let mut note = format!("Combo: {combo_name}");
    for part in [general, line].into_iter().flatten() {
        let part = part.trim();
        if !part.is_empty() {
            note.push_str(" | ");
            note.push_str(part);
        }
    }
    note
}

impl LedgerService {
    // ── Catalog ────────────────────────────────────────────────

    pub fn create_category(
        &self,
        actor: &Actor,
        code: &str,
        name: &str,
        description: Option<&str>,
    ) -> LedgerResult<ExpenseCategory> {
        self.authorize(actor, Capability::ManageCatalog, None)?;
        if code.trim().is_empty() || name.trim().is_empty() {
            return Err(LedgerError::Validation("category code and name are required".into()));
        }
        self.store().upsert_category(code, name, description)?;
        self.store()
            .category_by_code(code)?
            .ok_or_else(|| LedgerError::not_found("expense category", code))
    }

    pub fn create_item(
        &self,
        actor: &Actor,
        name: &str,
        description: Option<&str>,
        category_code: &str,
        unit: &str,
    ) -> LedgerResult<ExpenseItem> {
        self.authorize(actor, Capability::ManageCatalog, None)?;
        if name.trim().is_empty() {
            return Err(LedgerError::Validation("item name is empty".into()));
        }
        let category = self
            .store()
            .category_by_code(category_code)?
            .ok_or_else(|| LedgerError::not_found("expense category", category_code))?;
        let item_id = self.store().upsert_item(name, description, category.category_id, unit)?;
        self.store()
            .item(item_id)?
            .ok_or_else(|| LedgerError::not_found("expense item", item_id))
    }

    pub fn items(&self) -> LedgerResult<Vec<ExpenseItem>> {
        self.store().items()
    }

    // ── Combos ─────────────────────────────────────────────────

    pub fn create_combo(
        &self,
        actor: &Actor,
        name: &str,
        description: Option<&str>,
        period_id: PeriodId,
    ) -> LedgerResult<Combo> {
        self.authorize(actor, Capability::ManageCatalog, None)?;
        self.period(period_id)?;
        if self.store().combo_by_name(name, period_id)?.is_some() {
            return Err(LedgerError::Validation(format!(
                "combo '{name}' already exists for period {period_id}"
            )));
        }
        let combo_id = self.store().insert_combo(name, description, period_id, Utc::now())?;
        self.combo(combo_id)
    }

    pub fn combo(&self, combo_id: ComboId) -> LedgerResult<Combo> {
        self.store()
            .combo(combo_id)?
            .ok_or_else(|| LedgerError::not_found("combo", combo_id))
    }

    pub fn combos_for_period(&self, period_id: PeriodId) -> LedgerResult<Vec<Combo>> {
        self.store().combos_for_period(period_id)
    }

    pub fn add_combo_item(
        &self,
        actor: &Actor,
        combo_id: ComboId,
        item_id: ItemId,
        default_unit_value: Money,
    ) -> LedgerResult<Vec<ComboItem>> {
        self.authorize(actor, Capability::ManageCatalog, None)?;
        if default_unit_value < Decimal::ZERO {
            return Err(LedgerError::Validation("default unit value must not be negative".into()));
        }
        self.combo(combo_id)?;
        if self.store().item(item_id)?.is_none() {
            return Err(LedgerError::not_found("expense item", item_id));
        }
        self.store().upsert_combo_item(combo_id, item_id, default_unit_value)?;
        self.store().combo_items(combo_id)
    }

    pub fn set_combo_active(&self, actor: &Actor, combo_id: ComboId, active: bool) -> LedgerResult<Combo> {
        self.authorize(actor, Capability::ManageCatalog, None)?;
        if !self.store().set_combo_active(combo_id, active)? {
            return Err(LedgerError::not_found("combo", combo_id));
        }
        self.combo(combo_id)
    }

    /// The combo's items as batch lines pre-filled with their default values.
    pub fn combo_lines_with_defaults(&self, combo_id: ComboId) -> LedgerResult<Vec<BatchLine>> {
        self.combo(combo_id)?;
        Ok(self
            .store()
            .combo_items(combo_id)?
            .into_iter()
            .map(|ci| BatchLine { item_id: ci.item_id, unit_value: ci.default_unit_value, note: None })
            .collect())
    }

    /// Record one expense entry per line for the combo's period.
    pub fn record_combo_batch(
        &self,
        actor: &Actor,
        combo_id: ComboId,
        institution_id: InstitutionId,
        general_note: Option<&str>,
        lines: &[BatchLine],
    ) -> LedgerResult<BatchOutcome> {
        self.authorize(actor, Capability::RecordExpense, Some(institution_id))?;
        if lines.is_empty() {
            return Err(LedgerError::Validation("a combo batch needs at least one line".into()));
        }
        if let Some(line) = lines.iter().find(|l| l.unit_value < Decimal::ZERO) {
            return Err(LedgerError::Validation(format!(
                "unit value for item {} must not be negative",
                line.item_id
            )));
        }
        let combo = self.combo(combo_id)?;
        if !combo.active {
            return Err(LedgerError::Validation(format!("combo '{}' is inactive", combo.name)));
        }
        self.writable_period(combo.period_id)?;
        let key = MetricKey::new(institution_id, combo.period_id);

        self.store().atomic(|store| {
            let members: Vec<ItemId> = store.combo_items(combo_id)?.iter().map(|ci| ci.item_id).collect();
            let mut outcome = BatchOutcome::default();

            for line in lines {
                if !members.contains(&line.item_id) || store.expense_exists(key, line.item_id)? {
                    log::debug!("{key} combo: skipping item {}", line.item_id);
                    outcome.skipped.push(line.item_id);
                    continue;
                }
                let new = NewExpense {
                    institution_id,
                    period_id: combo.period_id,
                    item_id: line.item_id,
                    unit_value: line.unit_value,
                    note: batch_note(&combo.name, general_note, line.note.as_deref()),
                };
                outcome.created.push(self.insert_expense(store, actor, &new, Some(combo_id))?);
            }

            self.record(
                Some(actor),
                &LedgerEvent::ComboBatchRecorded {
                    combo_id,
                    institution_id,
                    period_id: combo.period_id,
                    created: outcome.created.len(),
                    skipped: outcome.skipped.len(),
                },
            )?;
            if !outcome.created.is_empty() {
                self.aggregator().recompute(key, Some(&actor.user_id))?;
            }
            log::info!(
                "{key} combo: '{}' created={} skipped={}",
                combo.name,
                outcome.created.len(),
                outcome.skipped.len()
            );
            Ok(outcome)
        })
    }

    // ── Seeding ────────────────────────────────────────────────

    /// Load states, municipalities, categories and items, open the period
    /// of `today`, and create its default combo. Safe to run repeatedly.
    pub fn seed_catalog(
        &self,
        actor: &Actor,
        catalog: &SeedCatalog,
        today: NaiveDate,
    ) -> LedgerResult<SeedSummary> {
        self.authorize(actor, Capability::ManageCatalog, None)?;
        self.store().atomic(|store| {
            let mut summary = SeedSummary::default();
            for state in &catalog.states {
                validate_state_code(&state.code)?;
                store.upsert_state(&state.code, &state.name)?;
                summary.states += 1;
                for name in &state.municipalities {
                    store.upsert_municipality(name, &state.code)?;
                    summary.municipalities += 1;
                }
            }
            for c in &catalog.categories {
                store.upsert_category(&c.code, &c.name, c.description.as_deref())?;
                summary.categories += 1;
            }
            for i in &catalog.items {
                let category = store
                    .category_by_code(&i.category_code)?
                    .ok_or_else(|| LedgerError::not_found("expense category", &i.category_code))?;
                store.upsert_item(&i.name, i.description.as_deref(), category.category_id, &i.unit)?;
                summary.items += 1;
            }

            let (year, month) = (today.year(), today.month());
            let period = match store.period_by_month(year, month)? {
                Some(p) => p,
                None => {
                    let period_id = store.insert_period(year, month, true)?;
                    self.record(Some(actor), &LedgerEvent::PeriodOpened { period_id, year, month })?;
                    self.period(period_id)?
                }
            };
            summary.period_id = Some(period.period_id);

            let Some(seed) = &catalog.default_combo else {
                return Ok(summary);
            };
            if store.combo_by_name(&seed.name, period.period_id)?.is_some() {
                return Ok(summary);
            }

            let combo_id =
                store.insert_combo(&seed.name, seed.description.as_deref(), period.period_id, Utc::now())?;
            for ci in &seed.items {
                let item = store
                    .item_by_name(&ci.item)?
                    .ok_or_else(|| LedgerError::not_found("expense item", &ci.item))?;
                store.upsert_combo_item(combo_id, item.item_id, ci.default_unit_value)?;
            }
            log::info!("period={} catalog: default combo '{}' created", period.label(), seed.name);
            summary.combo_id = Some(combo_id);
            Ok(summary)
        })
    }
}
