//! Principal, interest rate, tenure, and moratorium.

use std::sync::{Arc, LazyLock};

use crate::models::{CoreFields, DurationUnit, ExtractorKind};
use crate::pipeline_config::PipelineConfig;

use super::patterns::{first_match, rule, Candidate, PatternRule, ValueParse};
use super::patterns::{CURRENCY, DURATION_UNIT, NUMBER, PERIOD, SCALE};
use super::traits::{ExtractorOutput, FieldExtractor};
use super::types::LoanDocument;
use super::ExtractionError;

static PRINCIPAL_RULES: LazyLock<Vec<PatternRule>> = LazyLock::new(|| {
    vec![
        rule(
            &format!(
                r"(?i)(?:principal(?:\s+amount)?|loan\s+amount|amount\s+sanctioned|sanctioned\s+amount|disbursement\s+amount)\s*(?:of\s*)?[:\-]?\s*{CURRENCY}?\s*{NUMBER}\s*{SCALE}?"
            ),
            0.90,
            ValueParse::Amount,
        ),
        rule(
            &format!(r"(?i)(?:loan|borrowed|sanctioned)\s+(?:of\s+|for\s+)?{CURRENCY}\s*{NUMBER}\s*{SCALE}?"),
            0.80,
            ValueParse::Amount,
        )
        .unlabeled(),
    ]
});

static INTEREST_RULES: LazyLock<Vec<PatternRule>> = LazyLock::new(|| {
    vec![
        rule(
            &format!(
                r"(?i)(?:interest\s+rate|rate\s+of\s+interest|\broi\b)\s*(?:\(\s*(?:fixed|floating)\s*\))?\s*[:\-]?\s*(?:@\s*)?{NUMBER}\s*%?\s*{PERIOD}?"
            ),
            0.90,
            ValueParse::Rate,
        ),
        rule(
            &format!(r"(?i){NUMBER}\s*%\s*{PERIOD}?\s*(?:rate\s+of\s+)?(?:interest|roi)\b"),
            0.85,
            ValueParse::Rate,
        )
        .unlabeled(),
        rule(
            &format!(r"(?i)\b(?:apr|annual\s+percentage\s+rate)\b\s*[:\-]?\s*{NUMBER}\s*%?"),
            0.80,
            ValueParse::Rate,
        ),
    ]
});

static TENURE_RULES: LazyLock<Vec<PatternRule>> = LazyLock::new(|| {
    vec![
        rule(
            &format!(
                r"(?i)(?:loan\s+)?(?:tenure|tenor|loan\s+period|repayment\s+period|term\s+of\s+(?:the\s+)?loan)\s*(?:of\s*)?[:\-]?\s*{NUMBER}\s*{DURATION_UNIT}"
            ),
            0.90,
            ValueParse::Duration,
        ),
        rule(
            &format!(r"(?i){NUMBER}\s*{DURATION_UNIT}\s+(?:loan\s+)?(?:tenure|tenor|repayment\s+period)"),
            0.80,
            ValueParse::Duration,
        )
        .unlabeled(),
        rule(
            &format!(r"(?i)\bterm\s*[:\-]?\s*{NUMBER}\s*{DURATION_UNIT}"),
            0.80,
            ValueParse::Duration,
        )
        .fallback(),
    ]
});

static MORATORIUM_RULES: LazyLock<Vec<PatternRule>> = LazyLock::new(|| {
    vec![rule(
        &format!(
            r"(?i)(?:moratorium(?:\s+period)?|grace\s+period|repayment\s+holiday|payment\s+holiday)\s*(?:of\s*)?[:\-]?\s*{NUMBER}\s*{DURATION_UNIT}?"
        ),
        0.85,
        ValueParse::Duration,
    )]
});

fn months_of(candidate: &Candidate) -> f64 {
    let unit = candidate
        .unit
        .as_deref()
        .and_then(DurationUnit::from_word)
        .unwrap_or(DurationUnit::Months);
    unit.to_months(candidate.value)
}

pub struct CoreFieldExtractor {
    config: Arc<PipelineConfig>,
}

impl CoreFieldExtractor {
    pub fn new(config: Arc<PipelineConfig>) -> Self {
        Self { config }
    }

    pub fn extract_fields(&self, text: &str) -> CoreFields {
        let config = &*self.config;
        let bounds = &config.sanity;

        CoreFields {
            principal_amount: first_match(&PRINCIPAL_RULES, text, config, "principal_amount", |c| {
                c.value > 0.0 && c.value <= bounds.principal_max
            }),
            interest_rate: first_match(&INTEREST_RULES, text, config, "interest_rate", |c| {
                (0.0..=bounds.interest_rate_max).contains(&c.value)
            }),
            tenure: first_match(&TENURE_RULES, text, config, "tenure", |c| {
                (1.0..=bounds.tenure_max_months).contains(&months_of(c))
            }),
            moratorium_period: first_match(
                &MORATORIUM_RULES,
                text,
                config,
                "moratorium_period",
                |c| (0.0..=bounds.moratorium_max_months).contains(&months_of(c)),
            ),
        }
    }
}

impl FieldExtractor for CoreFieldExtractor {
    fn kind(&self) -> ExtractorKind {
        ExtractorKind::CoreFields
    }

    fn extract(&self, doc: &LoanDocument) -> Result<ExtractorOutput, ExtractionError> {
        Ok(ExtractorOutput::CoreFields(self.extract_fields(&doc.text)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_extractor() -> CoreFieldExtractor {
        CoreFieldExtractor::new(Arc::new(PipelineConfig::default()))
    }

    #[test]
    fn principal_with_indian_grouping() {
        let fields = make_extractor().extract_fields("Principal Amount: Rs. 5,00,000");
        let principal = fields.principal_amount.unwrap();
        assert_eq!(principal.value.as_f64(), Some(500000.0));
        assert_eq!(principal.unit_or_currency.as_deref(), Some("INR"));
    }

    #[test]
    fn principal_in_lakhs() {
        let fields = make_extractor().extract_fields("Loan Amount of ₹ 7.5 lakh sanctioned");
        let principal = fields.principal_amount.unwrap();
        assert_eq!(principal.value.as_f64(), Some(750000.0));
        assert_eq!(principal.unit_or_currency.as_deref(), Some("INR"));
    }

    #[test]
    fn principal_without_currency_has_no_tag() {
        let fields = make_extractor().extract_fields("Loan amount: 250000");
        let principal = fields.principal_amount.unwrap();
        assert!(principal.unit_or_currency.is_none());
    }

    #[test]
    fn negative_principal_dropped() {
        let fields = make_extractor().extract_fields("Loan Amount: -50000");
        assert!(fields.principal_amount.is_none());
    }

    #[test]
    fn rate_and_tenure_scenario() {
        let fields =
            make_extractor().extract_fields("Interest Rate: 10.5% p.a.\nTenure: 60 months");
        let rate = fields.interest_rate.unwrap();
        let tenure = fields.tenure.unwrap();
        assert_eq!(rate.value.as_f64(), Some(10.5));
        assert_eq!(rate.unit_or_currency.as_deref(), Some("percent_per_annum"));
        assert!(rate.confidence >= 0.85, "Expected >= 0.85, got {}", rate.confidence);
        assert_eq!(tenure.value.as_f64(), Some(60.0));
        assert!(tenure.confidence >= 0.85, "Expected >= 0.85, got {}", tenure.confidence);
    }

    #[test]
    fn rate_above_hundred_dropped() {
        let fields = make_extractor().extract_fields("Rate of interest: 150%");
        assert!(fields.interest_rate.is_none());
    }

    #[test]
    fn rate_written_before_label() {
        let fields =
            make_extractor().extract_fields("The loan carries 9.25% p.a. interest on the balance");
        let rate = fields.interest_rate.unwrap();
        assert_eq!(rate.value.as_f64(), Some(9.25));
    }

    #[test]
    fn labeled_rule_beats_earlier_unlabeled_mention() {
        let text = "Penal charge of 2% interest on overdue.\nROI: 11.0% per annum";
        let rate = make_extractor().extract_fields(text).interest_rate.unwrap();
        assert_eq!(rate.value.as_f64(), Some(11.0));
    }

    #[test]
    fn tenure_in_years_kept_raw() {
        let tenure = make_extractor().extract_fields("Loan Tenure: 5 years").tenure.unwrap();
        assert_eq!(tenure.value.as_f64(), Some(5.0));
        assert_eq!(tenure.unit_or_currency.as_deref(), Some("years"));
    }

    #[test]
    fn tenure_beyond_thirty_years_dropped() {
        assert!(make_extractor().extract_fields("Tenure: 40 years").tenure.is_none());
    }

    #[test]
    fn moratorium_extracted() {
        let m = make_extractor()
            .extract_fields("Moratorium Period: 6 months after course completion")
            .moratorium_period
            .unwrap();
        assert_eq!(m.value.as_f64(), Some(6.0));
        assert_eq!(m.unit_or_currency.as_deref(), Some("months"));
    }

    #[test]
    fn empty_text_yields_nothing() {
        assert_eq!(make_extractor().extract_fields(""), CoreFields::default());
    }

    #[test]
    fn extraction_is_deterministic() {
        let ex = make_extractor();
        let text = "Loan Amount: Rs 3,00,000. Interest rate 8.5% p.a. Tenure 36 months.";
        assert_eq!(ex.extract_fields(text), ex.extract_fields(text));
    }
}
