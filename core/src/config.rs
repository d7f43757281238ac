use crate::types::Money;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// How the first password of an approved registration is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitialPasswordPolicy {
    /// Password equals the requester's tax id. Weak; kept pending a product decision.
    TaxId,
    /// Random 16-character hex password, handed back once to the reviewer.
    Random,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Cost per student at or below which the efficiency score is 100.
    pub baseline_cost_per_student: Money,
    /// How long a writer waits on a locked database before failing.
    pub busy_timeout_ms: u64,
    pub initial_password_policy: InitialPasswordPolicy,
}

impl LedgerConfig {
    /// Load from the data/ directory.
    /// In tests, use LedgerConfig::default_test().
    pub fn load(data_dir: &str) -> anyhow::Result<Self> {
        let path = format!("{data_dir}/ledger.json");
        let content = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: LedgerConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Config with hardcoded defaults for use in unit tests.
    pub fn default_test() -> Self {
        Self {
            baseline_cost_per_student: Decimal::new(50000, 2),
            busy_timeout_ms: 5_000,
            initial_password_policy: InitialPasswordPolicy::TaxId,
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.baseline_cost_per_student <= Decimal::ZERO {
            anyhow::bail!(
                "baseline_cost_per_student must be positive, got {}",
                self.baseline_cost_per_student
            );
        }
        Ok(())
    }
}

// ── Seed catalog ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedCategory {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedItem {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub category_code: String,
    pub unit: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedComboItem {
    /// Name of a catalog item.
    pub item: String,
    pub default_unit_value: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedCombo {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub items: Vec<SeedComboItem>,
}

/// A state and the municipalities seeded under it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedState {
    /// Two-letter code, e.g. "SP".
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub municipalities: Vec<String>,
}

/// Initial geography, categories, items and the default monthly combo.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedCatalog {
    #[serde(default)]
    pub states: Vec<SeedState>,
    pub categories: Vec<SeedCategory>,
    pub items: Vec<SeedItem>,
    pub default_combo: Option<SeedCombo>,
}

impl SeedCatalog {
    pub fn load(data_dir: &str) -> anyhow::Result<Self> {
        let path = format!("{data_dir}/seed/catalog.json");
        let content = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Small catalog for tests: two states, two categories, three items, one combo.
    pub fn default_test() -> Self {
        let item = |name: &str, category: &str| SeedItem {
            name: name.into(),
            description: None,
            category_code: category.into(),
            unit: "UN".into(),
        };
        Self {
            states: vec![
                SeedState {
                    code: "SP".into(),
                    name: "São Paulo".into(),
                    municipalities: vec!["São Paulo".into(), "Campinas".into()],
                },
                SeedState {
                    code: "RJ".into(),
                    name: "Rio de Janeiro".into(),
                    municipalities: vec!["Rio de Janeiro".into()],
                },
            ],
            categories: vec![
                SeedCategory { code: "02".into(), name: "Material".into(), description: None },
                SeedCategory { code: "03".into(), name: "Serviços".into(), description: None },
            ],
            items: vec![
                item("Material Escolar", "02"),
                item("Limpeza", "02"),
                item("Internet", "03"),
            ],
            default_combo: Some(SeedCombo {
                name: "Gastos Mensais Padrão".into(),
                description: None,
                items: vec![
                    SeedComboItem { item: "Material Escolar".into(), default_unit_value: Decimal::new(5000, 2) },
                    SeedComboItem { item: "Internet".into(), default_unit_value: Decimal::new(15000, 2) },
                ],
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_file_parses_decimal_strings() {
        let json = r#"{
            "baseline_cost_per_student": "650.50",
            "busy_timeout_ms": 250,
            "initial_password_policy": "random"
        }"#;
        let config: LedgerConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.baseline_cost_per_student, Decimal::new(65050, 2));
        assert_eq!(config.initial_password_policy, InitialPasswordPolicy::Random);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn non_positive_baseline_is_rejected() {
        let mut config = LedgerConfig::default_test();
        config.baseline_cost_per_student = Decimal::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn seed_catalog_without_states_parses() {
        let json = r#"{ "categories": [], "items": [], "default_combo": null }"#;
        let catalog: SeedCatalog = serde_json::from_str(json).unwrap();
        assert!(catalog.states.is_empty());
    }

    #[test]
    fn load_reports_missing_file_path() {
        let err = LedgerConfig::load("/nonexistent-dir").unwrap_err();
        assert!(err.to_string().contains("/nonexistent-dir/ledger.json"));
    }
}
