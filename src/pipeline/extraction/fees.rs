//! Fees and penalties, from running text and from fee tables.
//!
//! Every charge kind has one text rule that accepts either a fixed amount or
//! a trailing `%`. Fee tables contribute rows whose description names a
//! kind; rows naming nothing known become `other_fee` with their label kept.
//! When text and a table both yield the same kind, the higher confidence
//! wins and the table wins ties.

use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};

use regex::{Captures, Regex};

use crate::models::{ExtractedFee, ExtractedPenalty, ExtractorKind, FeeKind, PenaltyKind, ValueType};
use crate::pipeline_config::PipelineConfig;

use super::patterns::{rule, shade, shading, Candidate, PatternRule, ValueParse, CURRENCY, NUMBER};
use super::table_detect::{classify_table, document_tables, TableKind};
use super::traits::{ExtractorOutput, FieldExtractor};
use super::types::{DocumentTable, LoanDocument};
use super::ExtractionError;

/// Base confidence for a row read out of a classified fee table.
const TABLE_ROW_CONFIDENCE: f32 = 0.90;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ChargeKind {
    Fee(FeeKind),
    Penalty(PenaltyKind),
}

impl ChargeKind {
    /// Largest plausible fixed amount for this kind.
    fn fixed_max(&self) -> f64 {
        match self {
            Self::Fee(FeeKind::Processing) | Self::Fee(FeeKind::Other) => 1e6,
            Self::Fee(FeeKind::Administrative) => 5e5,
            Self::Fee(FeeKind::Documentation) => 1e5,
            Self::Penalty(PenaltyKind::LatePayment) => 1e5,
            Self::Penalty(PenaltyKind::Prepayment) => 5e5,
        }
    }

    /// Classify a free-form description such as a fee table cell.
    pub fn from_description(desc: &str) -> Self {
        let d = desc.to_lowercase();
        let any = |words: &[&str]| words.iter().any(|k| d.contains(k));
        if any(&["late", "delayed", "overdue", "bounce", "penal interest"]) {
            Self::Penalty(PenaltyKind::LatePayment)
        } else if any(&["prepay", "pre-pay", "pre pay", "foreclos", "part pay", "part-pay"]) {
            Self::Penalty(PenaltyKind::Prepayment)
        } else if d.contains("processing") {
            Self::Fee(FeeKind::Processing)
        } else if d.contains("admin") {
            Self::Fee(FeeKind::Administrative)
        } else if d.contains("document") {
            Self::Fee(FeeKind::Documentation)
        } else {
            Self::Fee(FeeKind::Other)
        }
    }
}

struct ChargeRule {
    kind: ChargeKind,
    rule: PatternRule,
}

fn charge(kind: ChargeKind, label: &str, base_confidence: f32) -> ChargeRule {
    let pattern =
        format!(r"(?i){label}\s*(?:of\s*)?[:\-]?\s*(?:@\s*)?{CURRENCY}?\s*{NUMBER}\s*(?P<pct>%)?");
    ChargeRule {
        kind,
        rule: rule(&pattern, base_confidence, ValueParse::Amount),
    }
}

static CHARGE_RULES: LazyLock<Vec<ChargeRule>> = LazyLock::new(|| {
    use ChargeKind::*;
    vec![
        charge(Fee(FeeKind::Processing), r"processing\s+(?:fees?|charges?)", 0.85),
        charge(
            Fee(FeeKind::Administrative),
            r"(?:administrative|administration|admin)\s+(?:fees?|charges?)",
            0.85,
        ),
        charge(
            Fee(FeeKind::Documentation),
            r"(?:documentation|document)\s+(?:fees?|charges?)",
            0.85,
        ),
        charge(
            Penalty(PenaltyKind::LatePayment),
            r"(?:(?:late|delayed)\s+payment|overdue)\s+(?:penalty|charges?|fees?|interest)",
            0.80,
        ),
        charge(
            Penalty(PenaltyKind::LatePayment),
            r"(?:penalty|charges?)\s+(?:for|on)\s+(?:late|delayed|overdue)\s+payments?",
            0.80,
        ),
        charge(
            Penalty(PenaltyKind::Prepayment),
            r"(?:prepayment|pre-payment|foreclosure)\s+(?:penalty|charges?|fees?)",
            0.80,
        ),
        charge(
            Penalty(PenaltyKind::Prepayment),
            r"(?:penalty|charges?)\s+(?:for|on)\s+(?:prepayment|pre-payment|foreclosure)",
            0.80,
        ),
    ]
});

static CELL_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i){CURRENCY}?\s*{NUMBER}\s*(?P<pct>%)?")).expect("valid regex")
});

/// A charge before it is split into fee or penalty.
#[derive(Debug, Clone, PartialEq)]
struct Charge {
    kind: ChargeKind,
    label: Option<String>,
    value: f64,
    value_type: ValueType,
    currency: Option<String>,
    confidence: f32,
    source_span: String,
    from_table: bool,
}

impl Charge {
    fn key(&self) -> (ChargeKind, Option<String>) {
        (self.kind, self.label.as_ref().map(|l| l.to_lowercase()))
    }
}

pub struct FeeExtractor {
    config: Arc<PipelineConfig>,
}

impl FeeExtractor {
    pub fn new(config: Arc<PipelineConfig>) -> Self {
        Self { config }
    }

    pub fn extract_charges(
        &self,
        doc: &LoanDocument,
    ) -> (Vec<ExtractedFee>, Vec<ExtractedPenalty>) {
        let mut best: BTreeMap<(ChargeKind, Option<String>), Charge> = BTreeMap::new();

        let from_text = self.charges_from_text(&doc.text);
        let from_tables = document_tables(doc)
            .iter()
            .enumerate()
            .flat_map(|(index, table)| self.charges_from_table(index, table))
            .collect::<Vec<_>>();

        for charge in from_text.into_iter().chain(from_tables) {
            let key = charge.key();
            let replace = match best.get(&key) {
                None => true,
                Some(existing) => {
                    let table_tie = charge.confidence == existing.confidence
                        && charge.from_table
                        && !existing.from_table;
                    charge.confidence > existing.confidence || table_tie
                }
            };
            if replace {
                best.insert(key, charge);
            }
        }

        let mut fees = Vec::new();
        let mut penalties = Vec::new();
        for charge in best.into_values() {
            match charge.kind {
                ChargeKind::Fee(kind) => fees.push(ExtractedFee {
                    kind,
                    label: charge.label,
                    value: charge.value,
                    value_type: charge.value_type,
                    currency: charge.currency,
                    confidence: charge.confidence,
                    source_span: charge.source_span,
                }),
                ChargeKind::Penalty(kind) => penalties.push(ExtractedPenalty {
                    kind,
                    value: charge.value,
                    value_type: charge.value_type,
                    currency: charge.currency,
                    confidence: charge.confidence,
                    source_span: charge.source_span,
                }),
            }
        }
        (fees, penalties)
    }

    fn is_sane(&self, kind: ChargeKind, value: f64, value_type: ValueType) -> bool {
        match value_type {
            ValueType::Percentage => (0.0..=self.config.sanity.charge_percent_max).contains(&value),
            ValueType::Fixed => (0.0..=kind.fixed_max()).contains(&value),
        }
    }

    /// Parse a match carrying `num` and optional `cur` / `pct` captures.
    /// Percentages carry no currency.
    fn read_amount(&self, caps: &Captures) -> Option<(Candidate, ValueType)> {
        let mut candidate = ValueParse::Amount.parse(caps, &self.config)?;
        if caps.name("pct").is_some() {
            candidate.unit = None;
            Some((candidate, ValueType::Percentage))
        } else {
            Some((candidate, ValueType::Fixed))
        }
    }

    fn charges_from_text(&self, text: &str) -> Vec<Charge> {
        let mut found: BTreeMap<ChargeKind, Charge> = BTreeMap::new();

        for cr in CHARGE_RULES.iter() {
            if found.contains_key(&cr.kind) {
                continue;
            }
            for caps in cr.rule.regex.captures_iter(text) {
                let span = caps.get(0).map_or("", |m| m.as_str());
                let Some((candidate, value_type)) = self.read_amount(&caps) else {
                    continue;
                };
                let value = candidate.value;
                if !self.is_sane(cr.kind, value, value_type) {
                    tracing::warn!(
                        kind = ?cr.kind,
                        value,
                        span,
                        "Charge rejected by sanity bounds"
                    );
                    continue;
                }
                let confidence = shade(&cr.rule, &candidate);
                tracing::debug!(kind = ?cr.kind, value, confidence, "Charge found in text");
                found.insert(
                    cr.kind,
                    Charge {
                        kind: cr.kind,
                        label: None,
                        value,
                        value_type,
                        currency: candidate.unit,
                        confidence,
                        source_span: span.trim().to_string(),
                        from_table: false,
                    },
                );
                break;
            }
        }

        found.into_values().collect()
    }

    fn charges_from_table(&self, index: usize, table: &DocumentTable) -> Vec<Charge> {
        match classify_table(table, &self.config.table_keywords) {
            TableKind::Fee => {}
            TableKind::Ambiguous => {
                tracing::info!(table = index, extractor = "fees", "Skipping ambiguous table");
                return Vec::new();
            }
            _ => return Vec::new(),
        }
        let Some((header, body)) = table.header_and_body() else {
            return Vec::new();
        };
        let (desc_col, amount_col) = fee_columns(header);

        let mut charges = Vec::new();
        for row in body {
            let (Some(desc), Some(cell)) = (row.get(desc_col), row.get(amount_col)) else {
                continue;
            };
            let desc = desc.trim();
            if desc.is_empty() {
                continue;
            }
            let Some(caps) = CELL_NUMBER.captures(cell) else {
                tracing::debug!(table = index, description = desc, "Fee row without amount");
                continue;
            };
            let Some((candidate, value_type)) = self.read_amount(&caps) else {
                continue;
            };
            let value = candidate.value;
            let kind = ChargeKind::from_description(desc);
            if !self.is_sane(kind, value, value_type) {
                tracing::warn!(
                    table = index,
                    kind = ?kind,
                    value,
                    "Fee row rejected by sanity bounds"
                );
                continue;
            }
            let mut confidence = TABLE_ROW_CONFIDENCE;
            if !candidate.well_formed {
                confidence -= shading::MALFORMED_PENALTY;
            }
            charges.push(Charge {
                kind,
                label: matches!(kind, ChargeKind::Fee(FeeKind::Other)).then(|| desc.to_string()),
                value,
                value_type,
                currency: candidate.unit,
                confidence,
                source_span: format!("{desc} | {}", cell.trim()),
                from_table: true,
            });
        }
        charges
    }
}

/// Pick the description and amount columns of a fee table.
fn fee_columns(header: &[String]) -> (usize, usize) {
    let lower: Vec<String> = header.iter().map(|h| h.to_lowercase()).collect();
    let find = |keys: &[&str], skip: Option<usize>| {
        lower
            .iter()
            .enumerate()
            .find(|(i, h)| Some(*i) != skip && keys.iter().any(|k| h.contains(k)))
            .map(|(i, _)| i)
    };

    let desc_keys = ["description", "particular", "type", "nature", "fee", "charge"];
    let desc = find(&desc_keys, None).unwrap_or(0);
    let amount = find(&["amount", "value", "rate", "rs", "inr", "₹"], Some(desc))
        .or_else(|| find(&["charge", "fee"], Some(desc)))
        .unwrap_or_else(|| if header.len() > 1 && desc == 0 { header.len() - 1 } else { 0 });
    (desc, amount)
}

impl FieldExtractor for FeeExtractor {
    fn kind(&self) -> ExtractorKind {
        ExtractorKind::Charges
    }

    fn extract(&self, doc: &LoanDocument) -> Result<ExtractorOutput, ExtractionError> {
        let (fees, penalties) = self.extract_charges(doc);
        Ok(ExtractorOutput::Charges { fees, penalties })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_extractor() -> FeeExtractor {
        FeeExtractor::new(Arc::new(PipelineConfig::default()))
    }

    fn make_doc(text: &str, tables: Vec<DocumentTable>) -> LoanDocument {
        LoanDocument::new(text, tables)
    }

    fn make_table(header: &[&str], rows: &[&[&str]]) -> DocumentTable {
        DocumentTable::new(
            Some(header.iter().map(|s| s.to_string()).collect()),
            rows.iter().map(|r| r.iter().map(|s| s.to_string()).collect()).collect(),
        )
    }

    #[test]
    fn two_column_pipe_table_in_text() {
        let text = "| Fee Description | Amount |\n\
                    | Processing Fee | Rs. 5,000 |\n\
                    | Stamp Duty | 1,200 |";
        let (fees, penalties) = make_extractor().extract_charges(&make_doc(text, vec![]));
        assert!(penalties.is_empty());
        assert_eq!(fees.len(), 2);
        let processing = fees.iter().find(|f| f.kind == FeeKind::Processing).unwrap();
        assert_eq!(processing.value, 5000.0);
        assert_eq!(processing.value_type, ValueType::Fixed);
        let stamp = fees.iter().find(|f| f.kind == FeeKind::Other).unwrap();
        assert_eq!(stamp.label.as_deref(), Some("Stamp Duty"));
        assert_eq!(stamp.value, 1200.0);
    }

    #[test]
    fn percentage_processing_fee_from_text() {
        let doc = make_doc("Processing Fee: 1.5% of loan amount", vec![]);
        let (fees, _) = make_extractor().extract_charges(&doc);
        assert_eq!(fees.len(), 1);
        assert_eq!(fees[0].kind, FeeKind::Processing);
        assert_eq!(fees[0].value, 1.5);
        assert_eq!(fees[0].value_type, ValueType::Percentage);
        assert!(fees[0].currency.is_none());
    }

    #[test]
    fn fixed_fee_with_currency() {
        let doc = make_doc("Documentation charges: Rs. 1,500", vec![]);
        let (fees, _) = make_extractor().extract_charges(&doc);
        assert_eq!(fees[0].kind, FeeKind::Documentation);
        assert_eq!(fees[0].value, 1500.0);
        assert_eq!(fees[0].value_type, ValueType::Fixed);
        assert_eq!(fees[0].currency.as_deref(), Some("INR"));
    }

    #[test]
    fn penalties_from_text() {
        let text = "Late payment penalty: 2% per month on overdue EMI.\nForeclosure charges: 4%";
        let (fees, penalties) = make_extractor().extract_charges(&make_doc(text, vec![]));
        assert!(fees.is_empty());
        assert_eq!(penalties.len(), 2);
        assert_eq!(penalties[0].kind, PenaltyKind::LatePayment);
        assert_eq!(penalties[0].value, 2.0);
        assert_eq!(penalties[1].kind, PenaltyKind::Prepayment);
        assert_eq!(penalties[1].value, 4.0);
    }

    #[test]
    fn percentage_above_ten_rejected() {
        let (fees, _) = make_extractor().extract_charges(&make_doc("Processing fee: 25%", vec![]));
        assert!(fees.is_empty());
    }

    #[test]
    fn no_fee_text_and_no_table_yields_empty() {
        let doc = make_doc("Interest Rate: 10.5% p.a.\nTenure: 60 months", vec![]);
        let (fees, penalties) = make_extractor().extract_charges(&doc);
        assert!(fees.is_empty());
        assert!(penalties.is_empty());
    }

    #[test]
    fn fee_table_rows_become_fees_and_penalties() {
        let table = make_table(
            &["Fee Description", "Amount"],
            &[
                &["Processing Fee", "Rs. 5,000"],
                &["Stamp Duty", "1,200"],
                &["Cheque bounce charges", "500"],
            ],
        );
        let (fees, penalties) = make_extractor().extract_charges(&make_doc("", vec![table]));
        assert_eq!(fees.len(), 2);
        assert_eq!(fees[0].kind, FeeKind::Processing);
        assert_eq!(fees[0].value, 5000.0);
        assert_eq!(fees[1].kind, FeeKind::Other);
        assert_eq!(fees[1].label.as_deref(), Some("Stamp Duty"));
        assert_eq!(penalties.len(), 1);
        assert_eq!(penalties[0].kind, PenaltyKind::LatePayment);
    }

    #[test]
    fn table_wins_over_weaker_text_candidate() {
        let table = make_table(&["Particulars", "Charges"], &[&["Processing fee", "2%"]]);
        let doc = make_doc("Processing fee: 1%", vec![table]);
        let (fees, _) = make_extractor().extract_charges(&doc);
        assert_eq!(fees.len(), 1);
        assert_eq!(fees[0].value, 2.0);
        assert_eq!(fees[0].confidence, TABLE_ROW_CONFIDENCE);
    }

    #[test]
    fn ambiguous_table_skipped() {
        let table = make_table(&["Fee", "Interest"], &[&["Processing", "1000"]]);
        let (fees, _) = make_extractor().extract_charges(&make_doc("", vec![table]));
        assert!(fees.is_empty());
    }

    #[test]
    fn description_classification() {
        assert_eq!(
            ChargeKind::from_description("Admin charges"),
            ChargeKind::Fee(FeeKind::Administrative)
        );
        assert_eq!(
            ChargeKind::from_description("Part-payment charges"),
            ChargeKind::Penalty(PenaltyKind::Prepayment)
        );
        assert_eq!(ChargeKind::from_description("Insurance"), ChargeKind::Fee(FeeKind::Other));
    }

    #[test]
    fn column_detection() {
        let header: Vec<String> =
            ["Sr", "Nature of charge", "Amount (Rs)"].iter().map(|s| s.to_string()).collect();
        assert_eq!(fee_columns(&header), (1, 2));
    }
}
