//! Canonical, unit-consistent loan record built from an `ExtractionResult`.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::LoanType;
use super::extraction::{
    AdditionalTerms, ConfidenceReport, ExtractedEntity, ExtractedFee, ExtractedPenalty,
    ScheduleRow, ScheduleSummary,
};

/// Any extracted item plus a marker telling consumers it fell below the
/// low-confidence threshold. Flagged items are kept, never dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flagged<T> {
    #[serde(flatten)]
    pub item: T,
    pub flagged: bool,
}

impl<T> Flagged<T> {
    pub fn new(item: T, flagged: bool) -> Self {
        Self { item, flagged }
    }
}

/// A numeric value after unit/currency normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedValue {
    pub value: f64,
    /// Currency code, `months`, or `percent_per_annum`. `None` only for
    /// amounts whose currency was never stated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    pub confidence: f32,
    pub flagged: bool,
    /// Value and unit as extracted, present when a conversion was applied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanClassification {
    pub loan_type: LoanType,
    pub confidence: f32,
    /// Keyword hits per loan type; types with no hits are omitted.
    pub scores: BTreeMap<LoanType, u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankIdentity {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    /// IFSC or SWIFT code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bank_code: Option<String>,
    /// True when the name resolved through the alias table.
    pub known: bool,
    pub confidence: f32,
}

impl BankIdentity {
    pub fn unknown() -> Self {
        Self {
            name: "Unknown".into(),
            short_code: None,
            branch: None,
            bank_code: None,
            known: false,
            confidence: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedLoanData {
    /// Deterministic for a given document text.
    pub loan_id: Uuid,
    pub classification: LoanClassification,
    pub bank: BankIdentity,
    /// Set only when a conversion table was supplied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reporting_currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub principal_amount: Option<NormalizedValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interest_rate: Option<NormalizedValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenure: Option<NormalizedValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub moratorium_period: Option<NormalizedValue>,
    pub fees: Vec<Flagged<ExtractedFee>>,
    pub penalties: Vec<Flagged<ExtractedPenalty>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cosigner: Option<Flagged<ExtractedEntity>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collateral: Option<Flagged<ExtractedEntity>>,
    pub payment_schedule: Vec<Flagged<ScheduleRow>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule_summary: Option<ScheduleSummary>,
    /// Currency of the schedule rows and summary. Schedule tables carry no
    /// currency of their own, so this follows the principal amount.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule_currency: Option<String>,
    pub additional_terms: AdditionalTerms,
    pub loan_specific: BTreeMap<String, String>,
    /// Every field name that carries a `flagged` marker.
    pub flagged_fields: BTreeSet<String>,
    pub warnings: Vec<String>,
    pub confidence_report: ConfidenceReport,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::enums::{FeeKind, ValueType};

    #[test]
    fn flagged_flattens_inner_fields() {
        let fee = ExtractedFee {
            kind: FeeKind::Processing,
            label: None,
            value: 2.0,
            value_type: ValueType::Percentage,
            currency: None,
            confidence: 0.6,
            source_span: "processing fee 2%".into(),
        };
        let json = serde_json::to_value(Flagged::new(fee, true)).unwrap();
        assert_eq!(json["kind"], "processing_fee");
        assert_eq!(json["flagged"], true);
        assert_eq!(json["value"], 2.0);
    }

    #[test]
    fn unknown_bank_has_zero_confidence() {
        let bank = BankIdentity::unknown();
        assert_eq!(bank.name, "Unknown");
        assert!(!bank.known);
        assert_eq!(bank.confidence, 0.0);
    }
}
