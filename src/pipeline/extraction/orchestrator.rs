use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::models::{ExtractionResult, ExtractorFault, ExtractorKind};
use crate::pipeline_config::PipelineConfig;

use super::core_fields::CoreFieldExtractor;
use super::entities::EntityExtractor;
use super::fees::FeeExtractor;
use super::schedule::ScheduleExtractor;
use super::terms::TermsExtractor;
use super::traits::{ExtractorOutput, FieldExtractor};
use super::types::LoanDocument;
use super::ExtractionError;

/// How the extractors of one document are scheduled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExecutionMode {
    #[default]
    Sequential,
    /// Fork-join over scoped threads; outputs are merged after every
    /// extractor has finished.
    Parallel,
}

/// The built-in extractor set, one per `ExtractorKind`.
pub fn default_extractors(config: Arc<PipelineConfig>) -> Vec<Box<dyn FieldExtractor>> {
    vec![
        Box::new(CoreFieldExtractor::new(config.clone())),
        Box::new(FeeExtractor::new(config.clone())),
        Box::new(EntityExtractor::new(config.clone())),
        Box::new(ScheduleExtractor::new(config.clone())),
        Box::new(TermsExtractor::new(config)),
    ]
}

/// Runs every extractor against a document and merges their outputs into one
/// `ExtractionResult`. A failing extractor contributes nothing and is
/// recorded as an `ExtractorFault`; the others are unaffected.
pub struct ExtractionOrchestrator {
    extractors: Vec<Box<dyn FieldExtractor>>,
    mode: ExecutionMode,
}

impl ExtractionOrchestrator {
    pub fn new(config: Arc<PipelineConfig>) -> Self {
        Self::with_extractors(default_extractors(config))
    }

    pub fn with_extractors(extractors: Vec<Box<dyn FieldExtractor>>) -> Self {
        Self {
            extractors,
            mode: ExecutionMode::default(),
        }
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn extract(&self, doc: &LoanDocument) -> ExtractionResult {
        let mut outcomes = match self.mode {
            ExecutionMode::Sequential => self
                .extractors
                .iter()
                .map(|e| (e.kind(), run_isolated(e.as_ref(), doc)))
                .collect::<Vec<_>>(),
            ExecutionMode::Parallel => self.run_parallel(doc),
        };

        // Merge order depends only on kind, never on scheduling.
        outcomes.sort_by_key(|(kind, _)| *kind);

        let mut result = ExtractionResult::default();
        for (kind, outcome) in outcomes {
            match outcome {
                Ok(output) => merge(&mut result, output),
                Err(err) => {
                    let message = match err {
                        ExtractionError::ExtractorFault { message, .. } => message,
                        other => other.to_string(),
                    };
                    tracing::error!(
                        extractor = kind.as_str(),
                        error = %message,
                        "Extractor failed; contribution dropped"
                    );
                    result.extractor_faults.push(ExtractorFault {
                        extractor: kind.as_str().to_string(),
                        message,
                    });
                }
            }
        }

        tracing::info!(
            fees = result.fees.len(),
            penalties = result.penalties.len(),
            entities = result.entities.len(),
            schedule_rows = result.payment_schedule.len(),
            faults = result.extractor_faults.len(),
            "Extraction complete"
        );
        result
    }

    fn run_parallel(
        &self,
        doc: &LoanDocument,
    ) -> Vec<(ExtractorKind, Result<ExtractorOutput, ExtractionError>)> {
        std::thread::scope(|scope| {
            let handles: Vec<_> = self
                .extractors
                .iter()
                .map(|e| {
                    let kind = e.kind();
                    (kind, scope.spawn(move || run_isolated(e.as_ref(), doc)))
                })
                .collect();

            handles
                .into_iter()
                .map(|(kind, handle)| {
                    let outcome = handle.join().unwrap_or_else(|payload| {
                        Err(ExtractionError::ExtractorFault {
                            extractor: kind.as_str().to_string(),
                            message: panic_message(payload.as_ref()),
                        })
                    });
                    (kind, outcome)
                })
                .collect()
        })
    }
}

/// Run one extractor, converting a panic into an `ExtractorFault` error.
fn run_isolated(
    extractor: &dyn FieldExtractor,
    doc: &LoanDocument,
) -> Result<ExtractorOutput, ExtractionError> {
    catch_unwind(AssertUnwindSafe(|| extractor.extract(doc))).unwrap_or_else(|payload| {
        Err(ExtractionError::ExtractorFault {
            extractor: extractor.kind().as_str().to_string(),
            message: panic_message(payload.as_ref()),
        })
    })
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}

fn merge(result: &mut ExtractionResult, output: ExtractorOutput) {
    match output {
        ExtractorOutput::CoreFields(core) => result.core_fields = core,
        ExtractorOutput::Charges { fees, penalties } => {
            result.fees.extend(fees);
            result.penalties.extend(penalties);
        }
        ExtractorOutput::Entities(entities) => result.entities.extend(entities),
        ExtractorOutput::Schedule { rows, summary, anomalies } => {
            result.payment_schedule.extend(rows);
            result.schedule_summary = result.schedule_summary.take().or(summary);
            result.schedule_anomalies.extend(anomalies);
        }
        ExtractorOutput::Terms(terms) => result.additional_terms = terms,
    }
}
