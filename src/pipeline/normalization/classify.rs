//! Loan-type classification and the per-type fields that follow from it.

use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};

use regex::Regex;

use crate::models::{LoanClassification, LoanType};
use crate::pipeline::extraction::numeric::parse_number;
use crate::pipeline_config::PipelineConfig;

/// Keyword hits at or above which the winning share is boosted.
const STRONG_SIGNAL_HITS: u32 = 3;
const STRONG_SIGNAL_BOOST: f32 = 1.2;

pub struct LoanTypeClassifier {
    config: Arc<PipelineConfig>,
    keyword_patterns: Vec<(LoanType, Regex)>,
}

impl LoanTypeClassifier {
    pub fn new(config: Arc<PipelineConfig>) -> Self {
        let mut keyword_patterns = Vec::new();
        for (loan_type, phrases) in &config.loan_type_keywords {
            for phrase in phrases {
                let words: Vec<String> = phrase.split_whitespace().map(regex::escape).collect();
                let pattern = format!(r"(?i)\b{}s?\b", words.join(r"[\s-]+"));
                match Regex::new(&pattern) {
                    Ok(r) => keyword_patterns.push((*loan_type, r)),
                    Err(e) => {
                        tracing::warn!(keyword = %phrase, error = %e, "Skipping loan-type keyword")
                    }
                }
            }
        }
        Self { config, keyword_patterns }
    }

    /// Score the text against every keyword set. No hits gives `Other` at 0.
    pub fn classify(&self, text: &str) -> LoanClassification {
        let mut scores: BTreeMap<LoanType, u32> = BTreeMap::new();
        for (loan_type, regex) in &self.keyword_patterns {
            let hits = regex.find_iter(text).count() as u32;
            if hits > 0 {
                *scores.entry(*loan_type).or_default() += hits;
            }
        }

        let Some(max) = scores.values().copied().max() else {
            return LoanClassification {
                loan_type: LoanType::Other,
                confidence: 0.0,
                scores,
            };
        };

        let loan_type = self.break_tie(scores.iter().filter(|(_, s)| **s == max).map(|(t, _)| *t));
        let total: u32 = scores.values().sum();
        let mut confidence = max as f32 / total as f32;
        if max >= STRONG_SIGNAL_HITS {
            confidence = (confidence * STRONG_SIGNAL_BOOST).min(1.0);
        }

        tracing::debug!(
            loan_type = loan_type.as_str(),
            confidence,
            hits = max,
            "Loan type classified"
        );
        LoanClassification {
            loan_type,
            confidence,
            scores,
        }
    }

    /// Earliest entry of the priority list wins; unlisted types lose to
    /// listed ones and fall back to enum order among themselves.
    fn break_tie(&self, tied: impl Iterator<Item = LoanType>) -> LoanType {
        let priority = &self.config.loan_type_priority;
        tied.min_by_key(|t| (priority.iter().position(|p| p == t).unwrap_or(usize::MAX), *t))
            .unwrap_or(LoanType::Other)
    }
}

/// How a captured value is cleaned before it is stored.
#[derive(Clone, Copy)]
enum Capture {
    Text,
    Number,
}

struct SpecificRule {
    loan_type: LoanType,
    field: &'static str,
    capture: Capture,
    patterns: Vec<Regex>,
}

fn specific(
    loan_type: LoanType,
    field: &'static str,
    capture: Capture,
    patterns: &[&str],
) -> SpecificRule {
    SpecificRule {
        loan_type,
        field,
        capture,
        patterns: patterns.iter().map(|p| Regex::new(p).expect("valid regex")).collect(),
    }
}

const NAME: &str = r"(?P<v>[A-Za-z][A-Za-z .&,'()-]{1,80})";
const AMOUNT: &str = r"(?:rs\.?|inr|₹)?\s*(?P<v>\d[\d,]*(?:\.\d+)?)";

static SPECIFIC_FIELDS: LazyLock<Vec<SpecificRule>> = LazyLock::new(|| {
    use Capture::*;
    use LoanType::*;
    vec![
        specific(
            Education,
            "institution",
            Text,
            &[&format!(r"(?i)(?:university|college|institut(?:e|ion))(?:\s+name)?\s*[:\-]\s*{NAME}")],
        ),
        specific(
            Education,
            "course",
            Text,
            &[&format!(r"(?i)(?:course|program(?:me)?)(?:\s+name)?\s*[:\-]\s*{NAME}")],
        ),
        specific(
            Home,
            "property_address",
            Text,
            &[r"(?i)property\s+(?:address|location)\s*[:\-]\s*(?P<v>[A-Za-z0-9][A-Za-z0-9 ,./#-]{2,120})"],
        ),
        specific(
            Home,
            "property_value",
            Number,
            &[&format!(r"(?i)(?:property|market)\s+value\s*[:\-]?\s*{AMOUNT}")],
        ),
        specific(
            Home,
            "property_type",
            Text,
            &[r"(?i)(?:property\s+type|type\s+of\s+property)\s*[:\-]\s*(?P<v>[A-Za-z]+)"],
        ),
        specific(
            Vehicle,
            "vehicle_make",
            Text,
            &[r"(?i)\b(?:make|manufacturer)\s*[:\-]\s*(?P<v>[A-Za-z][A-Za-z-]*)"],
        ),
        specific(
            Vehicle,
            "vehicle_model",
            Text,
            &[r"(?i)\bmodel\s*[:\-]\s*(?P<v>[A-Za-z0-9][A-Za-z0-9 -]{0,40})"],
        ),
        specific(
            Vehicle,
            "vehicle_year",
            Text,
            &[r"(?i)(?:manufacturing\s+|model\s+)?year\s*[:\-]\s*(?P<v>(?:19|20)\d{2})\b"],
        ),
        specific(
            Gold,
            "gold_weight_grams",
            Number,
            &[r"(?i)(?:gold\s+)?weight\s*[:\-]?\s*(?P<v>\d+(?:\.\d+)?)\s*(?:grams?|gms?|g)\b"],
        ),
        specific(
            Gold,
            "gold_purity_carat",
            Number,
            &[r"(?i)(?:gold\s+)?purity\s*[:\-]?\s*(?P<v>\d{1,2})\s*(?:carats?|kt|k)\b"],
        ),
        specific(
            Gold,
            "gold_value",
            Number,
            &[&format!(r"(?i)(?:gold|ornament)\s+value\s*[:\-]?\s*{AMOUNT}")],
        ),
        specific(
            Personal,
            "purpose",
            Text,
            &[r"(?i)(?:loan\s+)?purpose(?:\s+of\s+(?:the\s+)?loan)?\s*[:\-]\s*(?P<v>[A-Za-z][A-Za-z ]{2,60})"],
        ),
    ]
});

/// Fields that only make sense for one loan type (institution, property
/// value, vehicle make). Absent fields are omitted.
pub fn loan_specific_fields(text: &str, loan_type: LoanType) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for rule in SPECIFIC_FIELDS.iter().filter(|r| r.loan_type == loan_type) {
        let found = rule
            .patterns
            .iter()
            .find_map(|p| p.captures(text))
            .and_then(|c| c.name("v").map(|m| m.as_str().to_string()));
        let Some(raw) = found else {
            continue;
        };
        let value = match rule.capture {
            Capture::Text => Some(raw.trim().trim_end_matches([',', '.', '-']).trim().to_string()),
            Capture::Number => parse_number(&raw).map(|n| n.value.to_string()),
        };
        if let Some(v) = value.filter(|v| !v.is_empty()) {
            out.insert(rule.field.to_string(), v);
        }
    }
    out
}
