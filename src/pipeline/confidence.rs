//! Aggregates per-field confidences into one `ConfidenceReport`.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::models::{CanonicalField, ConfidenceLevel, ConfidenceReport, ExtractionResult};
use crate::pipeline_config::PipelineConfig;

/// Built-in confidence thresholds. `PipelineConfig` carries the live values.
pub mod thresholds {
    /// At or above this: high confidence, no special flagging.
    pub const HIGH: f32 = 0.90;

    /// At or above this: medium. Below it a field is low-confidence and
    /// the document goes to review.
    pub const MEDIUM: f32 = 0.70;
}

/// Name reported in `low_confidence_fields` when schedule rows are weak.
pub const SCHEDULE_FIELD: &str = "payment_schedule";

pub struct ConfidenceScorer {
    config: Arc<PipelineConfig>,
}

impl ConfidenceScorer {
    pub fn new(config: Arc<PipelineConfig>) -> Self {
        Self { config }
    }

    pub fn score(&self, result: &ExtractionResult) -> ConfidenceReport {
        let config = &*self.config;
        let confidences = result.field_confidences();

        // Weighted mean over the fields that were extracted.
        let (weighted, present_weight) = confidences
            .iter()
            .fold((0.0_f32, 0.0_f32), |(sum, total), (field, conf)| {
                let w = config.weight(*field);
                (sum + w * conf, total + w)
            });
        let overall_confidence = if present_weight > 0.0 {
            (weighted / present_weight).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let level = self.level(overall_confidence);

        let missing_critical_fields: BTreeSet<String> = CanonicalField::ALL
            .iter()
            .filter(|f| config.is_critical(**f) && !confidences.contains_key(*f))
            .map(|f| f.as_str().to_string())
            .collect();

        let mut low_confidence_fields: BTreeSet<String> = confidences
            .iter()
            .filter(|(_, conf)| **conf < config.low_confidence_threshold)
            .map(|(f, _)| f.as_str().to_string())
            .collect();
        if result
            .payment_schedule
            .iter()
            .any(|r| r.confidence < config.low_confidence_threshold)
        {
            low_confidence_fields.insert(SCHEDULE_FIELD.to_string());
        }

        let requires_review = level == ConfidenceLevel::Low
            || !missing_critical_fields.is_empty()
            || !low_confidence_fields.is_empty();

        tracing::info!(
            overall_confidence,
            level = level.as_str(),
            requires_review,
            fields = confidences.len(),
            "Confidence scored"
        );

        ConfidenceReport {
            overall_confidence,
            level,
            requires_review,
            low_confidence_fields,
            missing_critical_fields,
        }
    }

    pub fn level(&self, overall: f32) -> ConfidenceLevel {
        if overall >= self.config.high_level_threshold {
            ConfidenceLevel::High
        } else if overall >= self.config.medium_level_threshold {
            ConfidenceLevel::Medium
        } else {
            ConfidenceLevel::Low
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        CoreFields, EntityRole, ExtractedEntity, ExtractedFee, ExtractedField, FeeKind, ScheduleRow,
        ValueType,
    };

    fn make_scorer() -> ConfidenceScorer {
        ConfidenceScorer::new(Arc::new(PipelineConfig::default()))
    }

    fn make_field(value: f64, confidence: f32) -> Option<ExtractedField> {
        Some(ExtractedField::number(value, None, confidence, "span"))
    }

    fn make_result(principal: Option<f32>, rate: Option<f32>) -> ExtractionResult {
        ExtractionResult {
            core_fields: CoreFields {
                principal_amount: principal.and_then(|c| make_field(500000.0, c)),
                interest_rate: rate.and_then(|c| make_field(10.5, c)),
                tenure: make_field(60.0, 0.92),
                moratorium_period: None,
            },
            ..Default::default()
        }
    }

    fn make_row(index: u32, confidence: f32) -> ScheduleRow {
        ScheduleRow {
            index,
            date: None,
            total_amount: Some(10000.0),
            principal_component: None,
            interest_component: None,
            outstanding_balance: None,
            confidence,
        }
    }

    #[test]
    fn confident_complete_core_needs_no_review() {
        let report = make_scorer().score(&make_result(Some(0.95), Some(0.92)));
        assert!(!report.requires_review);
        assert!(report.missing_critical_fields.is_empty());
        assert_eq!(report.level, ConfidenceLevel::High);
    }

    #[test]
    fn missing_critical_field_forces_review() {
        let report = make_scorer().score(&make_result(None, Some(0.99)));
        assert!(report.requires_review);
        assert!(report.missing_critical_fields.contains("principal_amount"));
        // Renormalized over present fields, so still high.
        assert!(report.overall_confidence > 0.9);
    }

    #[test]
    fn critical_list_comes_from_config() {
        let mut config = PipelineConfig::default();
        config.critical_fields = vec![CanonicalField::Tenure];
        let scorer = ConfidenceScorer::new(Arc::new(config));
        let report = scorer.score(&make_result(None, None));
        assert!(report.missing_critical_fields.is_empty());

        let mut result = make_result(None, None);
        result.core_fields.tenure = None;
        let report = scorer.score(&result);
        assert_eq!(report.missing_critical_fields, BTreeSet::from(["tenure".to_string()]));
    }

    #[test]
    fn empty_result_scores_zero() {
        let report = make_scorer().score(&ExtractionResult::default());
        assert_eq!(report.overall_confidence, 0.0);
        assert_eq!(report.level, ConfidenceLevel::Low);
        assert!(report.requires_review);
        assert_eq!(report.missing_critical_fields.len(), 2);
    }

    #[test]
    fn weights_favour_critical_fields() {
        let mut result = make_result(Some(0.95), Some(0.95));
        result.entities.push(ExtractedEntity {
            role: EntityRole::Collateral,
            attributes: Default::default(),
            confidence: 0.2,
        });
        let report = make_scorer().score(&result);
        // Collateral carries little weight; the low value still triggers review.
        assert!(report.overall_confidence > 0.85, "got {}", report.overall_confidence);
        assert!(report.low_confidence_fields.contains("collateral"));
        assert!(report.requires_review);
    }

    #[test]
    fn fee_confidence_is_the_mean() {
        let fee = |confidence| ExtractedFee {
            kind: FeeKind::Processing,
            label: None,
            value: 1000.0,
            value_type: ValueType::Fixed,
            currency: None,
            confidence,
            source_span: String::new(),
        };
        let mut result = make_result(Some(0.9), Some(0.9));
        result.fees = vec![fee(0.9), fee(0.6)];
        let report = make_scorer().score(&result);
        assert!(!report.low_confidence_fields.contains("fees"));
        result.fees = vec![fee(0.6), fee(0.6)];
        assert!(make_scorer().score(&result).low_confidence_fields.contains("fees"));
    }

    #[test]
    fn weak_schedule_row_flags_schedule() {
        let mut result = make_result(Some(0.95), Some(0.95));
        result.payment_schedule = vec![make_row(1, 0.9), make_row(2, 0.9), make_row(3, 0.54)];
        let report = make_scorer().score(&result);
        assert!(report.low_confidence_fields.contains(SCHEDULE_FIELD));
        assert!(report.requires_review);
    }

    #[test]
    fn overall_always_within_bounds() {
        for c in [0.0, 0.3, 0.7, 0.9, 1.0] {
            let report = make_scorer().score(&make_result(Some(c), Some(c)));
            assert!((0.0..=1.0).contains(&report.overall_confidence));
        }
    }

    #[test]
    fn level_boundaries() {
        let scorer = make_scorer();
        assert_eq!(scorer.level(0.90), ConfidenceLevel::High);
        assert_eq!(scorer.level(0.8999), ConfidenceLevel::Medium);
        assert_eq!(scorer.level(0.70), ConfidenceLevel::Medium);
        assert_eq!(scorer.level(0.6999), ConfidenceLevel::Low);
    }

    #[test]
    fn scoring_is_pure() {
        let result = make_result(Some(0.81), Some(0.77));
        let scorer = make_scorer();
        assert_eq!(scorer.score(&result), scorer.score(&result));
    }
}
