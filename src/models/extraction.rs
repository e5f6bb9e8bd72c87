//! Candidate values produced by the pattern extractors and the merged
//! per-document `ExtractionResult`.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::enums::{CanonicalField, ConfidenceLevel, EntityRole, FeeKind, PenaltyKind, ValueType};

/// A scalar extracted from text: numbers stay numbers in JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Text(String),
}

impl FieldValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Number(_) => None,
            Self::Text(s) => Some(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedField {
    pub value: FieldValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_or_currency: Option<String>,
    pub confidence: f32,
    /// The matched text, verbatim.
    pub source_span: String,
}

impl ExtractedField {
    pub fn number(value: f64, unit: Option<String>, confidence: f32, span: &str) -> Self {
        Self {
            value: FieldValue::Number(value),
            unit_or_currency: unit,
            confidence,
            source_span: span.trim().to_string(),
        }
    }

    pub fn text(value: impl Into<String>, confidence: f32, span: &str) -> Self {
        Self {
            value: FieldValue::Text(value.into()),
            unit_or_currency: None,
            confidence,
            source_span: span.trim().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedFee {
    pub kind: FeeKind,
    /// Original description for table rows that matched no known kind.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub value: f64,
    pub value_type: ValueType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    pub confidence: f32,
    pub source_span: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedPenalty {
    pub kind: PenaltyKind,
    pub value: f64,
    pub value_type: ValueType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    pub confidence: f32,
    pub source_span: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedEntity {
    pub role: EntityRole,
    pub attributes: BTreeMap<String, String>,
    pub confidence: f32,
}

impl ExtractedEntity {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleRow {
    pub index: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub principal_component: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interest_component: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outstanding_balance: Option<f64>,
    pub confidence: f32,
}

/// A row-level inconsistency found while assembling the schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleAnomaly {
    pub row_index: u32,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScheduleSummary {
    pub total_payments: u32,
    pub total_payable: f64,
    pub total_principal: f64,
    pub total_interest: f64,
    pub average_installment: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoreFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub principal_amount: Option<ExtractedField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interest_rate: Option<ExtractedField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenure: Option<ExtractedField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub moratorium_period: Option<ExtractedField>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdditionalTerms {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repayment_mode: Option<ExtractedField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disbursement_terms: Option<ExtractedField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emi_amount: Option<ExtractedField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prepayment_option: Option<ExtractedField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock_in_period: Option<ExtractedField>,
}

impl AdditionalTerms {
    pub fn is_empty(&self) -> bool {
        self.repayment_mode.is_none()
            && self.disbursement_terms.is_none()
            && self.emi_amount.is_none()
            && self.prepayment_option.is_none()
            && self.lock_in_period.is_none()
    }
}

/// Record of an extractor that failed and contributed nothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractorFault {
    pub extractor: String,
    pub message: String,
}

/// Merged output of every extractor for one document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub core_fields: CoreFields,
    pub fees: Vec<ExtractedFee>,
    pub penalties: Vec<ExtractedPenalty>,
    pub entities: Vec<ExtractedEntity>,
    pub payment_schedule: Vec<ScheduleRow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule_summary: Option<ScheduleSummary>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub schedule_anomalies: Vec<ScheduleAnomaly>,
    pub additional_terms: AdditionalTerms,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extractor_faults: Vec<ExtractorFault>,
}

impl ExtractionResult {
    pub fn entity(&self, role: EntityRole) -> Option<&ExtractedEntity> {
        self.entities.iter().find(|e| e.role == role)
    }

    /// Confidence of every canonical field that is present.
    ///
    /// Fees and each penalty kind contribute the mean of their candidates.
    pub fn field_confidences(&self) -> BTreeMap<CanonicalField, f32> {
        let mut out = BTreeMap::new();
        let core = &self.core_fields;

        let singles = [
            (CanonicalField::PrincipalAmount, &core.principal_amount),
            (CanonicalField::InterestRate, &core.interest_rate),
            (CanonicalField::Tenure, &core.tenure),
            (CanonicalField::MoratoriumPeriod, &core.moratorium_period),
            (CanonicalField::RepaymentMode, &self.additional_terms.repayment_mode),
            (
                CanonicalField::DisbursementTerms,
                &self.additional_terms.disbursement_terms,
            ),
        ];
        for (field, value) in singles {
            if let Some(v) = value {
                out.insert(field, v.confidence);
            }
        }

        if let Some(conf) = mean(self.fees.iter().map(|f| f.confidence)) {
            out.insert(CanonicalField::Fees, conf);
        }
        for kind in [PenaltyKind::LatePayment, PenaltyKind::Prepayment] {
            let confs = self
                .penalties
                .iter()
                .filter(|p| p.kind == kind)
                .map(|p| p.confidence);
            if let Some(conf) = mean(confs) {
                out.insert(kind.canonical_field(), conf);
            }
        }

        let roles = [
            (EntityRole::Lender, CanonicalField::BankName),
            (EntityRole::Cosigner, CanonicalField::Cosigner),
            (EntityRole::Collateral, CanonicalField::Collateral),
        ];
        for (role, field) in roles {
            if let Some(entity) = self.entity(role) {
                out.insert(field, entity.confidence);
            }
        }

        out
    }
}

/// Calibrated reliability signal derived from an `ExtractionResult`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceReport {
    pub overall_confidence: f32,
    pub level: ConfidenceLevel,
    pub requires_review: bool,
    pub low_confidence_fields: BTreeSet<String>,
    pub missing_critical_fields: BTreeSet<String>,
}

fn mean(values: impl Iterator<Item = f32>) -> Option<f32> {
    let (sum, count) = values.fold((0.0f32, 0u32), |(s, c), v| (s + v, c + 1));
    (count > 0).then(|| sum / count as f32)
}
