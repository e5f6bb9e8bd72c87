//! Parties and security: lender, co-signer, collateral.

use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};

use regex::Regex;

use crate::models::{CollateralKind, EntityRole, ExtractedEntity, ExtractorKind};
use crate::pipeline_config::PipelineConfig;

use super::traits::{ExtractorOutput, FieldExtractor};
use super::types::LoanDocument;
use super::ExtractionError;

/// Entity confidences by how the entity was found.
pub mod confidence {
    pub const KNOWN_BANK: f32 = 0.95;
    pub const GENERIC_BANK: f32 = 0.80;
    pub const BRANCH: f32 = 0.75;
    pub const COSIGNER: f32 = 0.80;
    pub const UNSECURED: f32 = 0.90;
    pub const DESCRIBED_COLLATERAL: f32 = 0.75;
}

fn re(pattern: &str) -> Regex {
    Regex::new(pattern).expect("valid regex")
}

static GENERIC_BANK: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        re(r"(?i:lender|bank|financial\s+institution)\s*(?:name)?\s*[:\-]\s*(?P<name>[A-Z][A-Za-z&]*(?:[ \t]+[A-Za-z&]+){0,5}?[ \t]+(?:Bank|Ltd\.?|Limited))\b"),
        re(r"(?P<name>[A-Z][A-Za-z&]*(?:[ \t]+[A-Z][A-Za-z&]*){0,5}?[ \t]+(?:Bank|Ltd\.?|Limited))[ \t,]+(?i:branch|office)"),
    ]
});

static BRANCH: LazyLock<Regex> = LazyLock::new(|| {
    re(r"(?i:branch)(?:\s+(?i:name|address|office))?\s*[:\-]\s*(?P<branch>[A-Z][A-Za-z ,\-]{1,60}?)\s*(?:\n|$|\.|;|\(|(?i:ifsc))")
});

static IFSC: LazyLock<Regex> = LazyLock::new(|| re(r"\b(?P<code>[A-Z]{4}0[A-Z0-9]{6})\b"));

static SWIFT: LazyLock<Regex> = LazyLock::new(|| {
    re(r"(?i:swift(?:\s+code)?|bic)\s*[:\-]?\s*(?P<code>[A-Z]{6}[A-Z0-9]{2}(?:[A-Z0-9]{3})?)\b")
});

static COSIGNER: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        re(r"(?i:co-?\s?signer|co-?\s?applicant|co-?\s?borrower|guarantor)(?:'s)?(?:\s+(?i:name))?\s*[:\-]\s*(?P<name>[A-Z][A-Za-z.]*(?:[ \t]+[A-Z][A-Za-z.]*){0,4})"),
        re(r"(?i:parent|guardian)(?:'s)?\s+(?i:name)\s*[:\-]?\s*(?P<name>[A-Z][A-Za-z.]*(?:[ \t]+[A-Z][A-Za-z.]*){0,4})"),
    ]
});

static RELATIONSHIP: LazyLock<Regex> = LazyLock::new(|| {
    re(r"(?i)(?:relationship|relation)(?:\s+(?:with|to)\s+(?:the\s+)?(?:borrower|applicant|student))?\s*[:\-]?\s*(?P<rel>father|mother|parent|guardian|spouse|husband|wife|sibling|brother|sister)\b")
});

static UNSECURED: LazyLock<Regex> = LazyLock::new(|| {
    re(r"(?i)\b(?:unsecured\s+loan|no\s+collateral|without\s+(?:any\s+)?(?:collateral|security)|collateral\s*[:\-]\s*(?:nil|none|not\s+required))")
});

static COLLATERAL: LazyLock<Regex> = LazyLock::new(|| {
    re(r"(?i)(?:(?:collateral|security|pledge)(?:\s+(?:offered|provided|details))?\s*[:\-]|secured\s+(?:by|against))\s*(?P<desc>[^\n.;]{3,120})")
});

pub struct EntityExtractor {
    config: Arc<PipelineConfig>,
    /// (bank index, alias regex), compiled once from the alias table.
    bank_patterns: Vec<(usize, Regex)>,
}

impl EntityExtractor {
    pub fn new(config: Arc<PipelineConfig>) -> Self {
        let bank_patterns = compile_aliases(&config);
        Self { config, bank_patterns }
    }

    pub fn extract_entities(&self, text: &str) -> Vec<ExtractedEntity> {
        [self.lender(text), cosigner(text), collateral(text)]
            .into_iter()
            .flatten()
            .collect()
    }

    fn lender(&self, text: &str) -> Option<ExtractedEntity> {
        let mut attributes = BTreeMap::new();

        let confidence = if let Some((bank_idx, matched)) = self.known_bank(text) {
            let bank = &self.config.bank_aliases[bank_idx];
            attributes.insert("name".to_string(), bank.name.clone());
            attributes.insert("short_code".to_string(), bank.short_code.clone());
            attributes.insert("matched_text".to_string(), matched);
            confidence::KNOWN_BANK
        } else {
            let name = GENERIC_BANK
                .iter()
                .find_map(|r| r.captures(text))
                .and_then(|c| c.name("name").map(|m| collapse_spaces(m.as_str())))?;
            attributes.insert("name".to_string(), name);
            confidence::GENERIC_BANK
        };

        if let Some(branch) = branch_name(text) {
            attributes.insert("branch".to_string(), branch);
            attributes.insert("branch_confidence".to_string(), confidence::BRANCH.to_string());
        }
        if let Some(code) = IFSC.captures(text).and_then(|c| c.name("code")) {
            attributes.insert("ifsc".to_string(), code.as_str().to_string());
        }
        if let Some(code) = SWIFT.captures(text).and_then(|c| c.name("code")) {
            attributes.insert("swift".to_string(), code.as_str().to_uppercase());
        }

        tracing::debug!(
            name = attributes.get("name").map(String::as_str),
            confidence,
            "Lender found"
        );
        Some(ExtractedEntity {
            role: EntityRole::Lender,
            attributes,
            confidence,
        })
    }

    /// Earliest alias hit in the text; longer aliases win at the same offset.
    fn known_bank(&self, text: &str) -> Option<(usize, String)> {
        self.bank_patterns
            .iter()
            .filter_map(|(idx, r)| {
                r.find(text)
                    .map(|m| (m.start(), std::cmp::Reverse(m.len()), *idx, m.as_str()))
            })
            .min()
            .map(|(_, _, idx, matched)| (idx, matched.to_string()))
    }
}

/// One word-boundary regex per alias.
///
/// Multi-word names match in any case. A single-word alias ("BoB", "Axis",
/// "TMB") matches only as written or in full capitals, so names and ordinary
/// words such as "Bob" or "axis" are not taken for a bank.
pub fn compile_aliases(config: &PipelineConfig) -> Vec<(usize, Regex)> {
    let mut out = Vec::new();
    for (idx, bank) in config.bank_aliases.iter().enumerate() {
        for alias in &bank.aliases {
            let words: Vec<String> = alias.split_whitespace().map(regex::escape).collect();
            let pattern = match words.as_slice() {
                [word] => {
                    let upper = word.to_uppercase();
                    if upper == *word {
                        format!(r"\b{word}\b")
                    } else {
                        format!(r"\b(?:{word}|{upper})\b")
                    }
                }
                _ => format!(r"(?i)\b{}\b", words.join(r"\s+")),
            };
            match Regex::new(&pattern) {
                Ok(r) => out.push((idx, r)),
                Err(e) => tracing::warn!(alias = %alias, error = %e, "Skipping bank alias"),
            }
        }
    }
    out
}

/// IFSC code if present, else a SWIFT/BIC code.
pub fn bank_code(text: &str) -> Option<String> {
    IFSC.captures(text)
        .and_then(|c| c.name("code"))
        .map(|m| m.as_str().to_string())
        .or_else(|| {
            SWIFT
                .captures(text)
                .and_then(|c| c.name("code"))
                .map(|m| m.as_str().to_uppercase())
        })
}

pub fn branch_name(text: &str) -> Option<String> {
    BRANCH
        .captures(text)
        .and_then(|c| c.name("branch"))
        .map(|m| collapse_spaces(m.as_str().trim_end_matches([',', ' ', '-'])))
}

fn collapse_spaces(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn cosigner(text: &str) -> Option<ExtractedEntity> {
    let name = COSIGNER
        .iter()
        .find_map(|r| r.captures(text))
        .and_then(|c| c.name("name").map(|m| collapse_spaces(m.as_str())))?;

    let mut attributes = BTreeMap::from([("name".to_string(), name)]);
    if let Some(rel) = RELATIONSHIP.captures(text).and_then(|c| c.name("rel")) {
        attributes.insert("relationship".to_string(), rel.as_str().to_lowercase());
    }
    Some(ExtractedEntity {
        role: EntityRole::Cosigner,
        attributes,
        confidence: confidence::COSIGNER,
    })
}

fn collateral(text: &str) -> Option<ExtractedEntity> {
    if let Some(m) = UNSECURED.find(text) {
        return Some(ExtractedEntity {
            role: EntityRole::Collateral,
            attributes: BTreeMap::from([
                ("kind".to_string(), CollateralKind::Unsecured.as_str().to_string()),
                ("description".to_string(), m.as_str().to_string()),
            ]),
            confidence: confidence::UNSECURED,
        });
    }

    let desc = COLLATERAL.captures(text)?.name("desc")?.as_str().trim().to_string();
    Some(ExtractedEntity {
        role: EntityRole::Collateral,
        attributes: BTreeMap::from([
            ("kind".to_string(), collateral_kind(&desc).as_str().to_string()),
            ("description".to_string(), desc),
        ]),
        confidence: confidence::DESCRIBED_COLLATERAL,
    })
}

fn collateral_kind(desc: &str) -> CollateralKind {
    let d = desc.to_lowercase();
    let has = |keys: &[&str]| keys.iter().any(|k| d.contains(k));
    if has(&["gold", "jewel", "ornament"]) {
        CollateralKind::Gold
    } else if has(&["vehicle", "car", "bike", "two wheeler", "hypothecation"]) {
        CollateralKind::Vehicle
    } else if has(&["land", "plot", "agricultural"]) {
        CollateralKind::Land
    } else if has(&["property", "house", "flat", "apartment", "building", "mortgage"]) {
        CollateralKind::Property
    } else {
        CollateralKind::Other
    }
}

impl FieldExtractor for EntityExtractor {
    fn kind(&self) -> ExtractorKind {
        ExtractorKind::Entities
    }

    fn extract(&self, doc: &LoanDocument) -> Result<ExtractorOutput, ExtractionError> {
        Ok(ExtractorOutput::Entities(self.extract_entities(&doc.text)))
    }
}
