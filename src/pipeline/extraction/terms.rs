//! Additional terms: repayment mode, disbursement, EMI amount, prepayment
//! option, and lock-in period.

use std::sync::{Arc, LazyLock};

use regex::Regex;

use crate::models::{
    AdditionalTerms, DisbursementType, DurationUnit, ExtractedField, ExtractorKind, RepaymentMode,
};
use crate::pipeline_config::PipelineConfig;

use super::patterns::{first_match, rule, PatternRule, ValueParse, CURRENCY, DURATION_UNIT, NUMBER};
use super::traits::{ExtractorOutput, FieldExtractor};
use super::types::LoanDocument;
use super::ExtractionError;

/// A rule whose hit yields a fixed label rather than a number.
struct LabelRule {
    regex: Regex,
    value: &'static str,
    confidence: f32,
}

fn label(pattern: &str, value: &'static str, confidence: f32) -> LabelRule {
    LabelRule {
        regex: Regex::new(pattern).expect("valid regex"),
        value,
        confidence,
    }
}

fn first_label(rules: &[LabelRule], text: &str, field: &str) -> Option<ExtractedField> {
    rules.iter().find_map(|r| {
        r.regex.find(text).map(|m| {
            tracing::debug!(field, value = r.value, "Term found");
            ExtractedField::text(r.value, r.confidence, m.as_str())
        })
    })
}

// Specific modes first: step-up and bullet documents often mention EMIs too.
static REPAYMENT_MODE: LazyLock<Vec<LabelRule>> = LazyLock::new(|| {
    vec![
        label(r"(?i)\bstep[\s-]?up\b", RepaymentMode::StepUp.as_str(), 0.85),
        label(
            r"(?i)\bbullet\s+(?:re)?payment|\blump[\s-]?sum\s+repayment",
            RepaymentMode::Bullet.as_str(),
            0.85,
        ),
        label(
            r"(?i)\bequated\s+monthly\s+instal?l?ments?\b|\bemis?\b",
            RepaymentMode::Emi.as_str(),
            0.90,
        ),
    ]
});

static DISBURSEMENT: LazyLock<Vec<LabelRule>> = LazyLock::new(|| {
    vec![
        label(
            r"(?i)disburs\w*[^.\n]{0,60}?\b(?:multiple|several|\d+|two|three|four|five)\s+(?:tranches|instal?l?ments|stages|phases)",
            DisbursementType::Multiple.as_str(),
            0.80,
        ),
        label(
            r"(?i)\b(?:single|one[\s-]time|lump[\s-]?sum)\s+disbursement|disbursed\s+in\s+(?:a\s+)?(?:single|one)\b|disbursement\s*[:\-]\s*single",
            DisbursementType::Single.as_str(),
            0.75,
        ),
    ]
});

static PREPAYMENT_OPTION: LazyLock<Vec<LabelRule>> = LazyLock::new(|| {
    vec![
        label(
            r"(?i)(?:prepayment|pre-payment|foreclosure)s?\s+(?:is\s+|are\s+)?(?:not\s+(?:allowed|permitted)|prohibited)",
            "not_allowed",
            0.85,
        ),
        label(
            r"(?i)part(?:ial)?[\s-]?(?:pre-?)?payments?\s+(?:is\s+|are\s+)?(?:allowed|permitted)",
            "partial",
            0.80,
        ),
        label(
            r"(?i)(?:prepayment|pre-payment|foreclosure)s?\s+(?:is\s+|are\s+)?(?:allowed|permitted)|(?:can|may)\s+be\s+(?:prepaid|foreclosed)",
            "allowed",
            0.85,
        ),
    ]
});

static EMI_AMOUNT: LazyLock<Vec<PatternRule>> = LazyLock::new(|| {
    vec![rule(
        &format!(r"(?i)\b(?:emi|monthly\s+instal?l?ment)(?:\s+amount)?\s*(?:of\s*)?[:\-]?\s*{CURRENCY}?\s*{NUMBER}"),
        0.85,
        ValueParse::Amount,
    )]
});

static LOCK_IN: LazyLock<Vec<PatternRule>> = LazyLock::new(|| {
    vec![rule(
        &format!(r"(?i)lock[\s-]?in(?:\s+period)?\s*(?:of\s*)?[:\-]?\s*{NUMBER}\s*{DURATION_UNIT}?"),
        0.80,
        ValueParse::Duration,
    )]
});

pub struct TermsExtractor {
    config: Arc<PipelineConfig>,
}

impl TermsExtractor {
    pub fn new(config: Arc<PipelineConfig>) -> Self {
        Self { config }
    }

    pub fn extract_terms(&self, text: &str) -> AdditionalTerms {
        let config = &*self.config;
        let bounds = &config.sanity;

        AdditionalTerms {
            repayment_mode: first_label(&REPAYMENT_MODE, text, "repayment_mode"),
            disbursement_terms: first_label(&DISBURSEMENT, text, "disbursement_terms"),
            emi_amount: first_match(&EMI_AMOUNT, text, config, "emi_amount", |c| {
                (bounds.emi_min..=bounds.emi_max).contains(&c.value)
            }),
            prepayment_option: first_label(&PREPAYMENT_OPTION, text, "prepayment_option"),
            lock_in_period: first_match(&LOCK_IN, text, config, "lock_in_period", |c| {
                let unit = c
                    .unit
                    .as_deref()
                    .and_then(DurationUnit::from_word)
                    .unwrap_or(DurationUnit::Months);
                (0.0..=bounds.tenure_max_months).contains(&unit.to_months(c.value))
            }),
        }
    }
}

impl FieldExtractor for TermsExtractor {
    fn kind(&self) -> ExtractorKind {
        ExtractorKind::Terms
    }

    fn extract(&self, doc: &LoanDocument) -> Result<ExtractorOutput, ExtractionError> {
        Ok(ExtractorOutput::Terms(self.extract_terms(&doc.text)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_extractor() -> TermsExtractor {
        TermsExtractor::new(Arc::new(PipelineConfig::default()))
    }

    #[test]
    fn emi_mode_and_amount() {
        let text = "Repayment through EMI. EMI Amount: Rs. 10,624 per month";
        let terms = make_extractor().extract_terms(text);
        let mode = terms.repayment_mode.unwrap();
        assert_eq!(mode.value.as_text(), Some("emi"));
        assert_eq!(mode.confidence, 0.90);
        let emi = terms.emi_amount.unwrap();
        assert_eq!(emi.value.as_f64(), Some(10624.0));
        assert_eq!(emi.unit_or_currency.as_deref(), Some("INR"));
    }

    #[test]
    fn step_up_preferred_over_emi() {
        let terms = make_extractor().extract_terms("Step-up EMI plan with increasing EMIs");
        assert_eq!(terms.repayment_mode.unwrap().value.as_text(), Some("step_up"));
    }

    #[test]
    fn multiple_tranches() {
        let text = "The loan will be disbursed in 4 tranches directly to the college.";
        let terms = make_extractor().extract_terms(text);
        let d = terms.disbursement_terms.unwrap();
        assert_eq!(d.value.as_text(), Some("multiple"));
        assert_eq!(d.confidence, 0.80);
    }

    #[test]
    fn single_disbursement() {
        let terms = make_extractor().extract_terms("Single disbursement to the seller's account.");
        assert_eq!(terms.disbursement_terms.unwrap().value.as_text(), Some("single"));
    }

    #[test]
    fn prepayment_not_allowed_wins_over_allowed() {
        let text = "Prepayment is not allowed during lock-in. Lock-in period: 12 months";
        let terms = make_extractor().extract_terms(text);
        assert_eq!(terms.prepayment_option.unwrap().value.as_text(), Some("not_allowed"));
        let lock_in = terms.lock_in_period.unwrap();
        assert_eq!(lock_in.value.as_f64(), Some(12.0));
    }

    #[test]
    fn implausible_emi_dropped() {
        let terms = make_extractor().extract_terms("EMI: 12");
        assert!(terms.emi_amount.is_none());
    }

    #[test]
    fn nothing_found() {
        assert!(make_extractor().extract_terms("Loan amount 50,000").is_empty());
    }
}
