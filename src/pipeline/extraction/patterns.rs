//! Ordered pattern rules and the confidence shading applied to their hits.
//!
//! A field owns a slice of `PatternRule`s ordered most-specific first.
//! `first_match` walks the rules in order and, within a rule, the matches in
//! text order; the first candidate that parses and passes its sanity check
//! wins. Rule order is the tie-break, never match position across rules.
//!
//! Capture group names shared by every rule:
//! - `num`: the numeric token
//! - `cur`: currency symbol or code
//! - `mult`: lakh / crore scale word
//! - `pct`: a trailing percent sign
//! - `unit`: months / years
//! - `per`: rate period qualifier

use regex::{Captures, Regex};

use crate::models::{DurationUnit, ExtractedField, RateUnit};
use crate::pipeline_config::PipelineConfig;

use super::numeric::{multiplier, parse_number};

/// Currency symbol or code, captured as `cur`.
pub const CURRENCY: &str = r"(?P<cur>rs\.?|inr|₹|\$|usd|€|eur|£|gbp)";
/// Numeric token, captured as `num`. Admits letter O for OCR repair.
pub const NUMBER: &str = r"(?P<num>-?\d[\dOo,]*(?:\.\d+)?)";
/// Indian scale words, captured as `mult`.
pub const SCALE: &str = r"(?P<mult>lakhs?|lacs?|crores?|cr\b)";
/// Rate period qualifier, captured as `per`.
pub const PERIOD: &str = r"(?P<per>p\.?\s?a\.?|per\s+annum|annually|p\.?\s?m\.?|per\s+month|monthly)";
/// Duration unit, captured as `unit`.
pub const DURATION_UNIT: &str = r"(?P<unit>months?|mos?\b|years?|yrs?\b)";

/// Confidence shading applied on top of a rule's base confidence.
pub mod shading {
    /// Amount written with a currency symbol or code.
    pub const CURRENCY_BONUS: f32 = 0.03;
    /// Match anchored on an explicit label ("Interest Rate:").
    pub const LABEL_BONUS: f32 = 0.02;
    /// Unit or period stated next to the number.
    pub const UNIT_BONUS: f32 = 0.02;
    /// Number needed repair (letter O, irregular grouping).
    pub const MALFORMED_PENALTY: f32 = 0.10;
    /// Match came from a loose catch-all rule.
    pub const FALLBACK_PENALTY: f32 = 0.05;
}

/// How the captures of a rule turn into a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueParse {
    /// Amount with optional currency and lakh/crore scale.
    Amount,
    /// Percentage with optional per-annum / per-month qualifier.
    Rate,
    /// Count of months or years.
    Duration,
}

#[derive(Debug)]
pub struct PatternRule {
    pub regex: Regex,
    pub base_confidence: f32,
    pub parse: ValueParse,
    /// Anchored on a field label.
    pub labeled: bool,
    /// Catch-all rule tried only after the specific ones.
    pub fallback: bool,
}

/// Compile a rule. Patterns are literals, so failure is a programming error.
pub fn rule(pattern: &str, base_confidence: f32, parse: ValueParse) -> PatternRule {
    PatternRule {
        regex: Regex::new(pattern).expect("valid regex"),
        base_confidence,
        parse,
        labeled: true,
        fallback: false,
    }
}

impl PatternRule {
    pub fn unlabeled(mut self) -> Self {
        self.labeled = false;
        self
    }

    pub fn fallback(mut self) -> Self {
        self.fallback = true;
        self
    }
}

/// A parsed hit before confidence shading.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub value: f64,
    pub unit: Option<String>,
    pub well_formed: bool,
    pub currency_stated: bool,
    pub unit_stated: bool,
}

impl ValueParse {
    pub fn parse(&self, caps: &Captures, config: &PipelineConfig) -> Option<Candidate> {
        let parsed = parse_number(caps.name("num")?.as_str())?;
        match self {
            Self::Amount => {
                let scale = caps
                    .name("mult")
                    .and_then(|m| multiplier(m.as_str()))
                    .unwrap_or(1.0);
                let currency = caps
                    .name("cur")
                    .and_then(|m| config.currency_code(m.as_str()))
                    .map(str::to_string);
                Some(Candidate {
                    value: parsed.value * scale,
                    currency_stated: currency.is_some(),
                    unit: currency,
                    well_formed: parsed.well_formed,
                    unit_stated: false,
                })
            }
            Self::Rate => {
                let period = caps.name("per").map(|m| m.as_str().to_lowercase());
                let unit = match period.as_deref() {
                    Some(p) if is_monthly(p) => RateUnit::PercentPerMonth,
                    _ => RateUnit::PercentPerAnnum,
                };
                Some(Candidate {
                    value: parsed.value,
                    unit: Some(unit.as_str().to_string()),
                    well_formed: parsed.well_formed,
                    currency_stated: false,
                    unit_stated: period.is_some(),
                })
            }
            Self::Duration => {
                let stated = caps.name("unit").and_then(|m| DurationUnit::from_word(m.as_str()));
                let unit = stated.unwrap_or(DurationUnit::Months);
                Some(Candidate {
                    value: parsed.value,
                    unit: Some(unit.as_str().to_string()),
                    well_formed: parsed.well_formed,
                    currency_stated: false,
                    unit_stated: stated.is_some(),
                })
            }
        }
    }
}

fn is_monthly(period: &str) -> bool {
    let p: String = period.chars().filter(|c| c.is_ascii_alphabetic()).collect();
    p == "pm" || p.contains("month")
}

/// Apply bonuses and penalties to the rule's base confidence.
pub fn shade(rule: &PatternRule, candidate: &Candidate) -> f32 {
    let mut conf = rule.base_confidence;
    if candidate.currency_stated {
        conf += shading::CURRENCY_BONUS;
    }
    if rule.labeled {
        conf += shading::LABEL_BONUS;
    }
    if candidate.unit_stated {
        conf += shading::UNIT_BONUS;
    }
    if !candidate.well_formed {
        conf -= shading::MALFORMED_PENALTY;
    }
    if rule.fallback {
        conf -= shading::FALLBACK_PENALTY;
    }
    conf.clamp(0.0, 1.0)
}

/// Evaluate `rules` in order and return the first sane candidate as a field.
///
/// `sane` receives the parsed candidate; rejected candidates are logged and
/// scanning continues with the next match.
pub fn first_match(
    rules: &[PatternRule],
    text: &str,
    config: &PipelineConfig,
    field: &str,
    sane: impl Fn(&Candidate) -> bool,
) -> Option<ExtractedField> {
    for rule in rules {
        for caps in rule.regex.captures_iter(text) {
            let span = caps.get(0).map_or("", |m| m.as_str());
            let Some(candidate) = rule.parse.parse(&caps, config) else {
                continue;
            };
            if !sane(&candidate) {
                tracing::warn!(
                    field,
                    value = candidate.value,
                    span,
                    "Candidate rejected by sanity bounds"
                );
                continue;
            }
            let confidence = shade(rule, &candidate);
            tracing::debug!(field, value = candidate.value, confidence, "Pattern hit");
            return Some(ExtractedField::number(candidate.value, candidate.unit, confidence, span));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_rule(parse: ValueParse) -> PatternRule {
        let pattern = match parse {
            ValueParse::Amount => {
                r"(?i)amount[:\s]*(?P<cur>rs\.?|inr|₹)?\s*(?P<num>-?\d[\dOo,]*(?:\.\d+)?)\s*(?P<mult>lakhs?|crores?)?"
            }
            ValueParse::Rate => r"(?i)rate[:\s]*(?P<num>\d+(?:\.\d+)?)\s*%\s*(?P<per>p\.?\s?a\.?|p\.?\s?m\.?|per\s+month)?",
            ValueParse::Duration => r"(?i)tenure[:\s]*(?P<num>\d+)\s*(?P<unit>months?|years?)?",
        };
        rule(pattern, 0.9, parse)
    }

    #[test]
    fn amount_with_currency_gets_bonus() {
        let config = PipelineConfig::default();
        let r = make_rule(ValueParse::Amount);
        let field =
            first_match(&[r], "Amount: Rs. 5,00,000", &config, "principal", |_| true).unwrap();
        assert_eq!(field.value.as_f64(), Some(500000.0));
        assert_eq!(field.unit_or_currency.as_deref(), Some("INR"));
        assert!(field.confidence > 0.9, "Expected > 0.9, got {}", field.confidence);
    }

    #[test]
    fn lakh_multiplier_applied() {
        let config = PipelineConfig::default();
        let rules = [make_rule(ValueParse::Amount)];
        let field = first_match(&rules, "amount 5 lakhs", &config, "p", |_| true).unwrap();
        assert_eq!(field.value.as_f64(), Some(500000.0));
        assert!(field.unit_or_currency.is_none());
    }

    #[test]
    fn malformed_number_degrades_but_survives() {
        let config = PipelineConfig::default();
        let rules = [make_rule(ValueParse::Amount)];
        let clean = first_match(&rules, "Amount: Rs. 5,00,000", &config, "p", |_| true).unwrap();
        let noisy = first_match(&rules, "Amount: Rs. 5,0O,000", &config, "p", |_| true).unwrap();
        assert_eq!(noisy.value.as_f64(), Some(500000.0));
        assert!(noisy.confidence < clean.confidence);
    }

    #[test]
    fn monthly_rate_detected() {
        let config = PipelineConfig::default();
        let rules = [make_rule(ValueParse::Rate)];
        let field = first_match(&rules, "rate: 1.5% p.m.", &config, "rate", |_| true).unwrap();
        assert_eq!(field.unit_or_currency.as_deref(), Some("percent_per_month"));
        let annual = first_match(&rules, "rate: 10.5% p.a.", &config, "rate", |_| true).unwrap();
        assert_eq!(annual.unit_or_currency.as_deref(), Some("percent_per_annum"));
    }

    #[test]
    fn duration_defaults_to_months_without_bonus() {
        let config = PipelineConfig::default();
        let rules = [make_rule(ValueParse::Duration)];
        let bare = first_match(&rules, "tenure: 60", &config, "tenure", |_| true).unwrap();
        let stated = first_match(&rules, "tenure: 60 months", &config, "tenure", |_| true).unwrap();
        assert_eq!(bare.unit_or_currency.as_deref(), Some("months"));
        assert!(stated.confidence > bare.confidence);
    }

    #[test]
    fn insane_candidate_skipped_for_next_match() {
        let config = PipelineConfig::default();
        let text = "amount -5000 and later amount 7000";
        let rules = [make_rule(ValueParse::Amount)];
        let field = first_match(&rules, text, &config, "p", |c| c.value > 0.0).unwrap();
        assert_eq!(field.value.as_f64(), Some(7000.0));
    }

    #[test]
    fn earlier_rule_wins_over_earlier_position() {
        let config = PipelineConfig::default();
        let specific = rule(r"(?i)loan amount[:\s]*(?P<num>\d+)", 0.95, ValueParse::Amount);
        let general = rule(r"(?i)amount[:\s]*(?P<num>\d+)", 0.75, ValueParse::Amount).fallback();
        let text = "amount 100 ... loan amount 900";
        let field = first_match(&[specific, general], text, &config, "p", |_| true).unwrap();
        assert_eq!(field.value.as_f64(), Some(900.0));
    }

    #[test]
    fn shading_is_clamped() {
        let r = rule(r"x(?P<num>\d)", 0.99, ValueParse::Amount);
        let c = Candidate {
            value: 1.0,
            unit: Some("INR".into()),
            well_formed: true,
            currency_stated: true,
            unit_stated: true,
        };
        assert_eq!(shade(&r, &c), 1.0);
    }

    #[test]
    fn no_match_is_none() {
        let config = PipelineConfig::default();
        let rules = [make_rule(ValueParse::Rate)];
        assert!(first_match(&rules, "nothing here", &config, "rate", |_| true).is_none());
    }
}
