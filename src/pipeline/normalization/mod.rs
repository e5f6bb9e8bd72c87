//! Maps an `ExtractionResult` onto the canonical `NormalizedLoanData` schema.
//!
//! Normalization never discards data. Every extracted value is carried over;
//! values below the low-confidence threshold are marked `flagged` and listed
//! in `flagged_fields`.

pub mod bank;
pub mod classify;
pub mod units;
pub mod validation;

pub use bank::BankIdentifier;
pub use classify::{loan_specific_fields, LoanTypeClassifier};

use std::collections::BTreeSet;
use std::sync::Arc;

use uuid::Uuid;

use crate::models::{
    ConfidenceReport, EntityRole, ExtractedFee, ExtractedPenalty, ExtractionResult, Flagged,
    NormalizedLoanData, NormalizedValue, ValueType,
};
use crate::pipeline_config::PipelineConfig;

use self::units::{
    convert_amount, convert_field, convert_schedule, to_annual_rate, to_months, to_reporting_amount,
};

pub struct NormalizationEngine {
    config: Arc<PipelineConfig>,
    classifier: LoanTypeClassifier,
    banks: BankIdentifier,
}

impl NormalizationEngine {
    pub fn new(config: Arc<PipelineConfig>) -> Self {
        Self {
            classifier: LoanTypeClassifier::new(config.clone()),
            banks: BankIdentifier::new(config.clone()),
            config,
        }
    }

    /// Build the canonical record. `text` is the document text the result
    /// was extracted from; it drives classification and the loan id.
    pub fn normalize(
        &self,
        text: &str,
        result: &ExtractionResult,
        report: &ConfidenceReport,
    ) -> NormalizedLoanData {
        let config = &*self.config;
        let threshold = config.low_confidence_threshold;
        let table = config.conversion.as_ref();
        let mut flagged_fields = BTreeSet::new();

        let classification = self.classifier.classify(text);
        let bank = self.banks.identify(text, result.entity(EntityRole::Lender));

        let core = &result.core_fields;
        let mut mark = |name: &str, value: Option<NormalizedValue>| {
            if value.as_ref().is_some_and(|v| v.flagged) {
                flagged_fields.insert(name.to_string());
            }
            value
        };
        let principal_amount = mark(
            "principal_amount",
            core.principal_amount.as_ref().and_then(|f| to_reporting_amount(f, table, threshold)),
        );
        let interest_rate = mark(
            "interest_rate",
            core.interest_rate.as_ref().and_then(|f| to_annual_rate(f, threshold)),
        );
        let tenure = mark("tenure", core.tenure.as_ref().and_then(|f| to_months(f, threshold)));
        let moratorium_period = mark(
            "moratorium_period",
            core.moratorium_period.as_ref().and_then(|f| to_months(f, threshold)),
        );

        let fees: Vec<Flagged<ExtractedFee>> = result
            .fees
            .iter()
            .map(|fee| {
                let mut fee = fee.clone();
                if fee.value_type == ValueType::Fixed {
                    let c = convert_amount(fee.value, fee.currency.as_deref(), table);
                    fee.value = c.value;
                    fee.currency = c.currency;
                }
                let flagged = fee.confidence < threshold;
                Flagged::new(fee, flagged)
            })
            .collect();
        if fees.iter().any(|f| f.flagged) {
            flagged_fields.insert("fees".to_string());
        }

        let penalties: Vec<Flagged<ExtractedPenalty>> = result
            .penalties
            .iter()
            .map(|p| {
                let mut p = p.clone();
                if p.value_type == ValueType::Fixed {
                    let c = convert_amount(p.value, p.currency.as_deref(), table);
                    p.value = c.value;
                    p.currency = c.currency;
                }
                let flagged = p.confidence < threshold;
                if flagged {
                    flagged_fields.insert(p.kind.as_str().to_string());
                }
                Flagged::new(p, flagged)
            })
            .collect();

        let mut entity = |role: EntityRole, name: &str| {
            result.entity(role).map(|e| {
                let flagged = e.confidence < threshold;
                if flagged {
                    flagged_fields.insert(name.to_string());
                }
                Flagged::new(e.clone(), flagged)
            })
        };
        let cosigner = entity(EntityRole::Cosigner, "cosigner");
        let collateral = entity(EntityRole::Collateral, "collateral");
        if bank.confidence < threshold {
            flagged_fields.insert("bank_name".to_string());
        }

        let mut rows = result.payment_schedule.clone();
        let mut schedule_summary = result.schedule_summary.clone();
        let schedule_currency = if rows.is_empty() && schedule_summary.is_none() {
            None
        } else {
            let document_currency =
                core.principal_amount.as_ref().and_then(|f| f.unit_or_currency.as_deref());
            convert_schedule(&mut rows, schedule_summary.as_mut(), document_currency, table)
        };
        let payment_schedule: Vec<Flagged<_>> = rows
            .into_iter()
            .map(|r| {
                let flagged = r.confidence < threshold;
                Flagged::new(r, flagged)
            })
            .collect();
        if payment_schedule.iter().any(|r| r.flagged) {
            flagged_fields.insert("payment_schedule".to_string());
        }

        let mut additional_terms = result.additional_terms.clone();
        additional_terms.emi_amount =
            additional_terms.emi_amount.as_ref().map(|f| convert_field(f, table));
        let terms = &additional_terms;
        let term_fields = [
            ("repayment_mode", &terms.repayment_mode),
            ("disbursement_terms", &terms.disbursement_terms),
            ("emi_amount", &terms.emi_amount),
            ("prepayment_option", &terms.prepayment_option),
            ("lock_in_period", &terms.lock_in_period),
        ];
        for (name, field) in term_fields {
            if field.as_ref().is_some_and(|f| f.confidence < threshold) {
                flagged_fields.insert(name.to_string());
            }
        }

        let mut data = NormalizedLoanData {
            loan_id: Uuid::new_v5(&Uuid::NAMESPACE_OID, text.as_bytes()),
            loan_specific: loan_specific_fields(text, classification.loan_type),
            classification,
            bank,
            reporting_currency: table.map(|t| t.reporting_currency.clone()),
            principal_amount,
            interest_rate,
            tenure,
            moratorium_period,
            fees,
            penalties,
            cosigner,
            collateral,
            payment_schedule,
            schedule_summary,
            schedule_currency,
            additional_terms,
            flagged_fields,
            warnings: Vec::new(),
            confidence_report: report.clone(),
        };
        data.warnings = validation::business_warnings(&data, &config.warnings, threshold);

        tracing::info!(
            loan_id = %data.loan_id,
            loan_type = data.classification.loan_type.as_str(),
            bank = %data.bank.name,
            flagged = data.flagged_fields.len(),
            warnings = data.warnings.len(),
            "Loan data normalized"
        );
        data
    }
}
