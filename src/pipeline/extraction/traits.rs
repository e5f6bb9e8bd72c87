//! The seam between the orchestrator and the individual extractors.
//!
//! Each extractor scans one `LoanDocument` and returns its slice of the
//! result. Extractors hold only read-only configuration, so any set of them
//! can run in any order or in parallel.

use crate::models::{
    AdditionalTerms, CoreFields, ExtractedEntity, ExtractedFee, ExtractedPenalty, ExtractorKind,
    ScheduleAnomaly, ScheduleRow, ScheduleSummary,
};

use super::types::LoanDocument;
use super::ExtractionError;

/// One extractor's contribution, merged by the orchestrator after all
/// extractors have finished.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractorOutput {
    CoreFields(CoreFields),
    Charges {
        fees: Vec<ExtractedFee>,
        penalties: Vec<ExtractedPenalty>,
    },
    Entities(Vec<ExtractedEntity>),
    Schedule {
        rows: Vec<ScheduleRow>,
        summary: Option<ScheduleSummary>,
        anomalies: Vec<ScheduleAnomaly>,
    },
    Terms(AdditionalTerms),
}

pub trait FieldExtractor: Send + Sync {
    /// Which part of the result this extractor fills.
    fn kind(&self) -> ExtractorKind;

    /// Scan the document. Absence of a field is not an error.
    fn extract(&self, doc: &LoanDocument) -> Result<ExtractorOutput, ExtractionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    // Verify traits are object-safe (can be used as `dyn Trait`)
    #[test]
    fn traits_are_object_safe() {
        fn _assert_extractor(_: &dyn FieldExtractor) {}
    }
}
