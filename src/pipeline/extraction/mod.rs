pub mod types;
pub mod numeric;
pub mod patterns;
pub mod table_detect;
pub mod traits;
pub mod core_fields;
pub mod fees;
pub mod entities;
pub mod schedule;
pub mod terms;
pub mod orchestrator;

pub use types::*;
pub use traits::*;
pub use core_fields::CoreFieldExtractor;
pub use fees::FeeExtractor;
pub use entities::EntityExtractor;
pub use schedule::ScheduleExtractor;
pub use terms::TermsExtractor;
pub use orchestrator::*;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExtractionError {
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Extractor {extractor} failed: {message}")]
    ExtractorFault { extractor: String, message: String },
}
