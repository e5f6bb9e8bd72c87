//! Loan document processing entry point.
//!
//! Single entry point that drives the full pipeline for one document:
//! extract → score → normalize. The output always carries a complete
//! `ExtractionResult` and `ConfidenceReport`; the only error is a document
//! that breaks the input contract.

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;

use crate::models::{ConfidenceReport, ExtractionResult, NormalizedLoanData};
use crate::pipeline::confidence::ConfidenceScorer;
use crate::pipeline::extraction::{
    ExecutionMode, ExtractionError, ExtractionOrchestrator, LoanDocument,
};
use crate::pipeline::normalization::NormalizationEngine;
use crate::pipeline_config::{ConfigError, PipelineConfig};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can occur during document processing.
#[derive(Debug, thiserror::Error)]
pub enum ProcessingError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Extraction failed: {0}")]
    Extraction(#[from] ExtractionError),
}

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// Everything produced for one document, serialized as one JSON object.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessingOutput {
    #[serde(flatten)]
    pub extraction: ExtractionResult,
    pub confidence_report: ConfidenceReport,
    /// Present unless normalization was disabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub normalized: Option<NormalizedLoanData>,
}

// ---------------------------------------------------------------------------
// Processor
// ---------------------------------------------------------------------------

/// Composes extraction, scoring, and (optionally) normalization.
///
/// Holds only read-only state, so one processor can serve any number of
/// documents, including from several threads.
pub struct LoanDocumentProcessor {
    orchestrator: ExtractionOrchestrator,
    scorer: ConfidenceScorer,
    normalizer: Option<NormalizationEngine>,
}

impl LoanDocumentProcessor {
    pub fn new(config: Arc<PipelineConfig>) -> Self {
        Self {
            orchestrator: ExtractionOrchestrator::new(config.clone()),
            scorer: ConfidenceScorer::new(config.clone()),
            normalizer: Some(NormalizationEngine::new(config)),
        }
    }

    /// Load and validate replacement tables from a JSON file.
    pub fn from_config_file(path: &Path) -> Result<Self, ProcessingError> {
        let config = PipelineConfig::from_json_file(path)?;
        Ok(Self::new(Arc::new(config)))
    }

    /// Swap in a custom orchestrator (custom extractor set or mode).
    pub fn with_orchestrator(mut self, orchestrator: ExtractionOrchestrator) -> Self {
        self.orchestrator = orchestrator;
        self
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.orchestrator = self.orchestrator.with_mode(mode);
        self
    }

    /// Stop after scoring; `normalized` stays `None`.
    pub fn without_normalization(mut self) -> Self {
        self.normalizer = None;
        self
    }

    pub fn process(&self, doc: &LoanDocument) -> Result<ProcessingOutput, ProcessingError> {
        doc.validate()?;

        let extraction = self.orchestrator.extract(doc);
        let confidence_report = self.scorer.score(&extraction);
        let normalized = self
            .normalizer
            .as_ref()
            .map(|n| n.normalize(&doc.text, &extraction, &confidence_report));

        tracing::info!(
            text_length = doc.text.len(),
            tables = doc.tables.len(),
            overall_confidence = confidence_report.overall_confidence,
            requires_review = confidence_report.requires_review,
            "Document processed"
        );

        Ok(ProcessingOutput {
            extraction,
            confidence_report,
            normalized,
        })
    }

    /// Parse the upstream JSON contract (`{"text": ..., "tables": [...]}`)
    /// and process it.
    pub fn process_json(&self, json: &str) -> Result<ProcessingOutput, ProcessingError> {
        let doc = LoanDocument::from_json(json)?;
        self.process(&doc)
    }
}
