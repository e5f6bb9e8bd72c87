//! Resolves the lender to a canonical bank identity.
//!
//! The extracted lender entity is preferred. Its name is looked up in the
//! alias table; names the table does not know pass through verbatim at a
//! capped confidence. Without a lender entity the document text itself is
//! scanned for aliases.

use std::sync::Arc;

use regex::Regex;

use crate::models::{BankIdentity, ExtractedEntity};
use crate::pipeline::extraction::entities::{bank_code, branch_name, compile_aliases};
use crate::pipeline_config::{BankAlias, PipelineConfig};

/// Ceiling for a lender name the alias table does not know.
const UNMATCHED_CONFIDENCE: f32 = 0.5;

// Text-scan scoring.
const PER_HIT: f32 = 0.3;
const HEADER_BONUS: f32 = 0.4;
const CANONICAL_NAME_BONUS: f32 = 0.3;
/// Hits starting before this byte offset count as letterhead.
const HEADER_SPAN: usize = 500;

pub struct BankIdentifier {
    config: Arc<PipelineConfig>,
    alias_patterns: Vec<(usize, Regex)>,
}

impl BankIdentifier {
    pub fn new(config: Arc<PipelineConfig>) -> Self {
        let alias_patterns = compile_aliases(&config);
        Self { config, alias_patterns }
    }

    pub fn identify(&self, text: &str, lender: Option<&ExtractedEntity>) -> BankIdentity {
        if let Some(identity) = lender.and_then(|l| self.from_lender(l)) {
            return identity;
        }
        self.scan_text(text).unwrap_or_else(|| {
            tracing::info!("No lender identified");
            BankIdentity::unknown()
        })
    }

    fn from_lender(&self, lender: &ExtractedEntity) -> Option<BankIdentity> {
        let name = lender.attribute("name")?;
        let branch = lender.attribute("branch").map(str::to_string);
        let bank_code = lender.attribute("ifsc").or(lender.attribute("swift")).map(str::to_string);

        let identity = match self.resolve(name) {
            Some(bank) => BankIdentity {
                name: bank.name.clone(),
                short_code: Some(bank.short_code.clone()),
                branch,
                bank_code,
                known: true,
                confidence: lender.confidence,
            },
            None => BankIdentity {
                name: name.to_string(),
                short_code: None,
                branch,
                bank_code,
                known: false,
                confidence: lender.confidence.min(UNMATCHED_CONFIDENCE),
            },
        };
        Some(identity)
    }

    /// Alias-table entry for a lender name, matching the whole name first
    /// and then any alias found inside it.
    pub fn resolve(&self, name: &str) -> Option<&BankAlias> {
        let wanted = fold(name);
        let banks = &self.config.bank_aliases;
        banks
            .iter()
            .find(|b| fold(&b.name) == wanted || b.aliases.iter().any(|a| fold(a) == wanted))
            .or_else(|| {
                self.alias_patterns
                    .iter()
                    .filter_map(|(idx, r)| {
                        r.find(name).map(|m| (m.start(), std::cmp::Reverse(m.len()), *idx))
                    })
                    .min()
                    .and_then(|(_, _, idx)| banks.get(idx))
            })
    }

    /// Best-scoring alias in the text. Earlier aliases win ties.
    fn scan_text(&self, text: &str) -> Option<BankIdentity> {
        let mut best: Option<(f32, usize)> = None;
        for (idx, regex) in &self.alias_patterns {
            let hits: Vec<_> = regex.find_iter(text).collect();
            let Some(first) = hits.first() else {
                continue;
            };
            let bank = &self.config.bank_aliases[*idx];
            let mut score = hits.len() as f32 * PER_HIT;
            if first.start() < HEADER_SPAN {
                score += HEADER_BONUS;
            }
            if fold(first.as_str()) == fold(&bank.name) {
                score += CANONICAL_NAME_BONUS;
            }
            let score = score.min(1.0);
            if best.is_none_or(|(s, _)| score > s) {
                best = Some((score, *idx));
            }
        }

        let (confidence, idx) = best?;
        let bank = &self.config.bank_aliases[idx];
        tracing::debug!(bank = %bank.name, confidence, "Bank identified from text");
        Some(BankIdentity {
            name: bank.name.clone(),
            short_code: Some(bank.short_code.clone()),
            branch: branch_name(text),
            bank_code: bank_code(text),
            known: true,
            confidence,
        })
    }
}

fn fold(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::models::EntityRole;

    fn make_identifier() -> BankIdentifier {
        BankIdentifier::new(Arc::new(PipelineConfig::default()))
    }

    fn make_lender(name: &str, confidence: f32) -> ExtractedEntity {
        ExtractedEntity {
            role: EntityRole::Lender,
            attributes: BTreeMap::from([
                ("name".to_string(), name.to_string()),
                ("ifsc".to_string(), "SBIN0001234".to_string()),
            ]),
            confidence,
        }
    }

    #[test]
    fn alias_resolves_to_canonical_name() {
        let id = make_identifier().identify("", Some(&make_lender("SBI", 0.95)));
        assert_eq!(id.name, "State Bank of India");
        assert_eq!(id.short_code.as_deref(), Some("SBI"));
        assert_eq!(id.bank_code.as_deref(), Some("SBIN0001234"));
        assert!(id.known);
        assert_eq!(id.confidence, 0.95);
    }

    #[test]
    fn alias_inside_longer_name() {
        let identifier = make_identifier();
        let bank = identifier.resolve("HDFC Bank Ltd.").unwrap();
        assert_eq!(bank.short_code, "HDFC");
    }

    #[test]
    fn unknown_name_passes_through_with_lower_confidence() {
        let id =
            make_identifier().identify("", Some(&make_lender("Saraswat Co-operative Bank", 0.80)));
        assert_eq!(id.name, "Saraswat Co-operative Bank");
        assert!(!id.known);
        assert_eq!(id.confidence, UNMATCHED_CONFIDENCE);
    }

    #[test]
    fn text_scan_when_no_lender_entity() {
        let text = "AXIS BANK\nLoan sanction letter. Axis Bank reserves the right...";
        let id = make_identifier().identify(text, None);
        assert_eq!(id.name, "Axis Bank");
        // Two hits, in the header, canonical spelling: capped at 1.0.
        assert_eq!(id.confidence, 1.0);
    }

    #[test]
    fn text_scan_late_single_hit() {
        let text = format!("{}Repayable to ICICI.", "x ".repeat(400));
        let id = make_identifier().identify(&text, None);
        assert_eq!(id.name, "ICICI Bank");
        assert!((id.confidence - PER_HIT).abs() < 1e-6);
    }

    #[test]
    fn ordinary_words_are_not_short_codes() {
        let text = "Guarantor: Bob Mathews. The property lies on the main axis of the layout.";
        assert_eq!(make_identifier().identify(text, None), BankIdentity::unknown());
    }

    #[test]
    fn nothing_found_is_unknown() {
        let id = make_identifier().identify("Sanction letter", None);
        assert_eq!(id, BankIdentity::unknown());
    }
}
