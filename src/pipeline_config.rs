//! Static lookup tables and thresholds that drive the extraction pipeline.
//!
//! Everything the extractors, scorer, and normalizer treat as "knowledge"
//! lives here: field weights, loan-type keyword sets, bank aliases, currency
//! symbols, optional conversion rates, table header keywords, and sanity
//! bounds. The built-in tables come from `PipelineConfig::default()`; a JSON
//! file with the same shape replaces them without code changes.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{CanonicalField, LoanType};
use crate::pipeline::confidence::thresholds;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid field weights: {0}")]
    InvalidWeights(String),

    #[error("Invalid threshold: {0}")]
    InvalidThreshold(String),

    #[error("Invalid bank alias table: {0}")]
    InvalidBankTable(String),

    #[error("Invalid keyword table: {0}")]
    InvalidKeywords(String),

    #[error("Invalid conversion table: {0}")]
    InvalidConversion(String),
}

// ═══════════════════════════════════════════════════════════
// Types
// ═══════════════════════════════════════════════════════════

/// One known lender and the spellings it appears under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankAlias {
    /// Canonical display name.
    pub name: String,
    pub short_code: String,
    /// Matched case-insensitively on word boundaries.
    pub aliases: Vec<String>,
}

/// Rates are units of `reporting_currency` per one unit of the keyed currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionTable {
    pub reporting_currency: String,
    pub rates: BTreeMap<String, f64>,
}

impl ConversionTable {
    pub fn rate(&self, from: &str) -> Option<f64> {
        if from.eq_ignore_ascii_case(&self.reporting_currency) {
            return Some(1.0);
        }
        self.rates.get(from).copied()
    }
}

/// Header keywords used to decide whether a table lists fees or installments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableKeywords {
    pub fee: Vec<String>,
    pub schedule: Vec<String>,
}

/// Hard bounds: a candidate outside them is dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SanityBounds {
    pub principal_max: f64,
    pub interest_rate_max: f64,
    pub tenure_max_months: f64,
    pub moratorium_max_months: f64,
    pub charge_percent_max: f64,
    pub emi_min: f64,
    pub emi_max: f64,
}

/// Soft bounds: a value outside them is kept but produces a warning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarningBounds {
    pub principal_high: f64,
    pub principal_low: f64,
    pub interest_rate_high: f64,
    pub interest_rate_low: f64,
    pub tenure_long_months: f64,
    pub moratorium_long_months: f64,
    /// Total fixed fees as a fraction of principal.
    pub fee_ratio_high: f64,
    /// Allowed relative gap between schedule principal sum and principal.
    pub schedule_principal_tolerance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Importance weight per canonical field. Must sum to 1.0.
    pub field_weights: BTreeMap<CanonicalField, f32>,
    /// Fields whose absence always forces review.
    pub critical_fields: Vec<CanonicalField>,
    pub low_confidence_threshold: f32,
    pub high_level_threshold: f32,
    pub medium_level_threshold: f32,
    pub loan_type_keywords: BTreeMap<LoanType, Vec<String>>,
    /// Tie-break order when two loan types score equally. Earlier wins.
    pub loan_type_priority: Vec<LoanType>,
    pub bank_aliases: Vec<BankAlias>,
    /// Symbol or code as written in documents, mapped to an ISO code.
    pub currency_symbols: BTreeMap<String, String>,
    #[serde(default)]
    pub conversion: Option<ConversionTable>,
    pub table_keywords: TableKeywords,
    pub sanity: SanityBounds,
    pub warnings: WarningBounds,
}

// ═══════════════════════════════════════════════════════════
// Built-in tables
// ═══════════════════════════════════════════════════════════

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn bank(name: &str, short_code: &str, aliases: &[&str]) -> BankAlias {
    BankAlias {
        name: name.into(),
        short_code: short_code.into(),
        aliases: strings(aliases),
    }
}

fn default_weights() -> BTreeMap<CanonicalField, f32> {
    use CanonicalField::*;
    BTreeMap::from([
        (PrincipalAmount, 0.20),
        (InterestRate, 0.20),
        (Tenure, 0.15),
        (BankName, 0.10),
        (Fees, 0.05),
        (LatePaymentPenalty, 0.05),
        (PrepaymentPenalty, 0.05),
        (RepaymentMode, 0.05),
        (MoratoriumPeriod, 0.05),
        (DisbursementTerms, 0.05),
        (Cosigner, 0.03),
        (Collateral, 0.02),
    ])
}

fn default_loan_keywords() -> BTreeMap<LoanType, Vec<String>> {
    BTreeMap::from([
        (
            LoanType::Education,
            strings(&[
                "education loan",
                "student loan",
                "tuition fee",
                "academic loan",
                "scholarship",
                "university",
                "college",
                "educational institution",
                "course fee",
                "student finance",
            ]),
        ),
        (
            LoanType::Home,
            strings(&[
                "home loan",
                "housing loan",
                "mortgage",
                "property loan",
                "real estate",
                "residential loan",
                "home purchase",
                "house loan",
                "property purchase",
                "home construction",
            ]),
        ),
        (
            LoanType::Personal,
            strings(&[
                "personal loan",
                "unsecured loan",
                "consumer loan",
                "personal finance",
                "quick loan",
                "instant loan",
            ]),
        ),
        (
            LoanType::Vehicle,
            strings(&[
                "vehicle loan",
                "car loan",
                "auto loan",
                "automobile loan",
                "two wheeler",
                "four wheeler",
                "bike loan",
                "motor vehicle",
                "vehicle finance",
            ]),
        ),
        (
            LoanType::Gold,
            strings(&[
                "gold loan",
                "gold pledge",
                "gold backed",
                "gold collateral",
                "jewel loan",
                "gold ornament",
            ]),
        ),
    ])
}

fn default_bank_aliases() -> Vec<BankAlias> {
    vec![
        bank("State Bank of India", "SBI", &["SBI", "State Bank of India", "StateBank"]),
        bank(
            "HDFC Bank",
            "HDFC",
            &["HDFC", "HDFC Bank", "Housing Development Finance Corporation"],
        ),
        bank("ICICI Bank", "ICICI", &["ICICI", "ICICI Bank"]),
        bank("Axis Bank", "AXIS", &["Axis", "Axis Bank"]),
        bank("Punjab National Bank", "PNB", &["PNB", "Punjab National Bank"]),
        bank("Bank of Baroda", "BOB", &["Bank of Baroda", "BoB", "Baroda Bank"]),
        bank("Canara Bank", "CANARA", &["Canara", "Canara Bank"]),
        bank("Union Bank of India", "UBI", &["Union Bank of India", "Union Bank"]),
        bank("Bank of India", "BOI", &["Bank of India", "BoI"]),
        bank("Indian Bank", "INDIAN", &["Indian Bank"]),
        bank("Kotak Mahindra Bank", "KOTAK", &["Kotak", "Kotak Mahindra", "Kotak Mahindra Bank"]),
        bank("IndusInd Bank", "INDUSIND", &["IndusInd", "IndusInd Bank"]),
        bank("Yes Bank", "YES", &["Yes Bank"]),
        bank("IDFC First Bank", "IDFC", &["IDFC", "IDFC First", "IDFC First Bank"]),
        bank("Federal Bank", "FEDERAL", &["Federal Bank"]),
        bank("RBL Bank", "RBL", &["RBL", "RBL Bank", "Ratnakar Bank"]),
        bank("South Indian Bank", "SIB", &["South Indian Bank"]),
        bank("Karur Vysya Bank", "KVB", &["Karur Vysya", "Karur Vysya Bank", "KVB"]),
        bank(
            "Tamilnad Mercantile Bank",
            "TMB",
            &["Tamilnad Mercantile", "Tamilnad Mercantile Bank", "TMB"],
        ),
        bank("City Union Bank", "CUB", &["City Union", "City Union Bank", "CUB"]),
    ]
}

fn default_currency_symbols() -> BTreeMap<String, String> {
    [
        ("₹", "INR"),
        ("rs", "INR"),
        ("rs.", "INR"),
        ("inr", "INR"),
        ("$", "USD"),
        ("usd", "USD"),
        ("€", "EUR"),
        ("eur", "EUR"),
        ("£", "GBP"),
        ("gbp", "GBP"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            field_weights: default_weights(),
            critical_fields: vec![CanonicalField::PrincipalAmount, CanonicalField::InterestRate],
            low_confidence_threshold: thresholds::MEDIUM,
            high_level_threshold: thresholds::HIGH,
            medium_level_threshold: thresholds::MEDIUM,
            loan_type_keywords: default_loan_keywords(),
            loan_type_priority: vec![
                LoanType::Education,
                LoanType::Home,
                LoanType::Vehicle,
                LoanType::Gold,
                LoanType::Personal,
            ],
            bank_aliases: default_bank_aliases(),
            currency_symbols: default_currency_symbols(),
            conversion: None,
            table_keywords: TableKeywords {
                fee: strings(&[
                    "fee",
                    "fees",
                    "charge",
                    "charges",
                    "penalty",
                    "description",
                    "particulars",
                ]),
                schedule: strings(&[
                    "installment",
                    "instalment",
                    "emi",
                    "due date",
                    "principal",
                    "interest",
                    "outstanding",
                    "balance",
                ]),
            },
            sanity: SanityBounds {
                principal_max: 1e10,
                interest_rate_max: 100.0,
                tenure_max_months: 360.0,
                moratorium_max_months: 60.0,
                charge_percent_max: 10.0,
                emi_min: 100.0,
                emi_max: 1e6,
            },
            warnings: WarningBounds {
                principal_high: 1e8,
                principal_low: 1000.0,
                interest_rate_high: 50.0,
                interest_rate_low: 0.1,
                tenure_long_months: 360.0,
                moratorium_long_months: 60.0,
                fee_ratio_high: 0.10,
                schedule_principal_tolerance: 0.05,
            },
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Loading & validation
// ═══════════════════════════════════════════════════════════

const WEIGHT_TOLERANCE: f32 = 0.001;

impl PipelineConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config = Self::from_json_str(&raw)?;
        tracing::info!(
            path = %path.display(),
            banks = config.bank_aliases.len(),
            "Loaded pipeline config"
        );
        Ok(config)
    }

    pub fn weight(&self, field: CanonicalField) -> f32 {
        self.field_weights.get(&field).copied().unwrap_or(0.0)
    }

    pub fn is_critical(&self, field: CanonicalField) -> bool {
        self.critical_fields.contains(&field)
    }

    /// Map a currency symbol or code as written (`Rs.`, `₹`, `usd`) to ISO.
    pub fn currency_code(&self, symbol: &str) -> Option<&str> {
        let key = symbol.trim().to_lowercase();
        self.currency_symbols.get(&key).map(String::as_str)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let bad_weight = self.field_weights.iter().find(|(_, w)| **w < 0.0 || !w.is_finite());
        if let Some((field, w)) = bad_weight {
            return Err(ConfigError::InvalidWeights(format!("{field} has weight {w}")));
        }
        let sum: f32 = self.field_weights.values().sum();
        if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(ConfigError::InvalidWeights(format!("weights sum to {sum}, expected 1.0")));
        }
        if let Some(field) = self.critical_fields.iter().find(|f| self.weight(**f) <= 0.0) {
            return Err(ConfigError::InvalidWeights(format!(
                "critical field {field} has no weight"
            )));
        }

        let thresholds = [
            ("low_confidence_threshold", self.low_confidence_threshold),
            ("high_level_threshold", self.high_level_threshold),
            ("medium_level_threshold", self.medium_level_threshold),
        ];
        if let Some((name, t)) = thresholds.iter().find(|(_, t)| !(0.0..=1.0).contains(t)) {
            return Err(ConfigError::InvalidThreshold(format!("{name} = {t}")));
        }
        if self.medium_level_threshold > self.high_level_threshold {
            return Err(ConfigError::InvalidThreshold(
                "medium_level_threshold exceeds high_level_threshold".into(),
            ));
        }

        for b in &self.bank_aliases {
            if b.name.trim().is_empty() || b.aliases.iter().any(|a| a.trim().is_empty()) {
                return Err(ConfigError::InvalidBankTable(format!(
                    "empty name or alias in '{}'",
                    b.name
                )));
            }
        }

        for (loan_type, words) in &self.loan_type_keywords {
            if *loan_type == LoanType::Other {
                return Err(ConfigError::InvalidKeywords(
                    "'other' is the fallback and takes no keywords".into(),
                ));
            }
            if words.iter().any(|w| w.trim().is_empty()) {
                return Err(ConfigError::InvalidKeywords(format!("empty keyword for {loan_type}")));
            }
            if !self.loan_type_priority.contains(loan_type) {
                return Err(ConfigError::InvalidKeywords(format!(
                    "{loan_type} missing from priority list"
                )));
            }
        }
        if self.table_keywords.fee.is_empty() || self.table_keywords.schedule.is_empty() {
            return Err(ConfigError::InvalidKeywords("table keyword sets must not be empty".into()));
        }

        if let Some(conv) = &self.conversion {
            if conv.reporting_currency.trim().is_empty() {
                return Err(ConfigError::InvalidConversion("missing reporting currency".into()));
            }
            let bad_rate = conv.rates.iter().find(|(_, r)| **r <= 0.0 || !r.is_finite());
            if let Some((code, rate)) = bad_rate {
                return Err(ConfigError::InvalidConversion(format!("rate for {code} is {rate}")));
            }
        }

        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        PipelineConfig::default().validate().unwrap();
    }

    #[test]
    fn default_weights_cover_every_field() {
        let config = PipelineConfig::default();
        for field in CanonicalField::ALL {
            assert!(config.weight(field) > 0.0, "{field} has no weight");
        }
    }

    #[test]
    fn critical_fields_weighted_highest() {
        let config = PipelineConfig::default();
        let principal = config.weight(CanonicalField::PrincipalAmount);
        let collateral = config.weight(CanonicalField::Collateral);
        let tenure = config.weight(CanonicalField::Tenure);
        assert!(principal > tenure);
        assert!(tenure > collateral);
    }

    #[test]
    fn rejects_weights_not_summing_to_one() {
        let mut config = PipelineConfig::default();
        config.field_weights.insert(CanonicalField::Collateral, 0.5);
        assert!(matches!(config.validate(), Err(ConfigError::InvalidWeights(_))));
    }

    #[test]
    fn rejects_negative_conversion_rate() {
        let mut config = PipelineConfig::default();
        config.conversion = Some(ConversionTable {
            reporting_currency: "INR".into(),
            rates: BTreeMap::from([("USD".to_string(), -83.0)]),
        });
        assert!(matches!(config.validate(), Err(ConfigError::InvalidConversion(_))));
    }

    #[test]
    fn currency_symbols_resolve_case_insensitively() {
        let config = PipelineConfig::default();
        assert_eq!(config.currency_code("Rs."), Some("INR"));
        assert_eq!(config.currency_code("₹"), Some("INR"));
        assert_eq!(config.currency_code("USD"), Some("USD"));
        assert_eq!(config.currency_code("XYZ"), None);
    }

    #[test]
    fn json_round_trip_through_file() {
        let mut config = PipelineConfig::default();
        config.conversion = Some(ConversionTable {
            reporting_currency: "INR".into(),
            rates: BTreeMap::from([("USD".to_string(), 83.0)]),
        });
        let json = serde_json::to_string_pretty(&config).unwrap();

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();

        let loaded = PipelineConfig::from_json_file(file.path()).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.conversion.unwrap().rate("USD"), Some(83.0));
    }

    #[test]
    fn malformed_json_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"{ not json").unwrap();
        assert!(matches!(
            PipelineConfig::from_json_file(file.path()),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");
        assert!(matches!(PipelineConfig::from_json_file(&path), Err(ConfigError::Io(_))));
    }

    #[test]
    fn conversion_rate_for_reporting_currency_is_one() {
        let table = ConversionTable {
            reporting_currency: "INR".into(),
            rates: BTreeMap::new(),
        };
        assert_eq!(table.rate("inr"), Some(1.0));
        assert_eq!(table.rate("EUR"), None);
    }
}
