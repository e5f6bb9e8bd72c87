use serde::{Deserialize, Serialize};

use super::ExtractionError;

/// A table as handed over by the layout collaborator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentTable {
    #[serde(default)]
    pub header: Option<Vec<String>>,
    #[serde(default)]
    pub rows: Vec<Vec<String>>,
}

impl DocumentTable {
    pub fn new(header: Option<Vec<String>>, rows: Vec<Vec<String>>) -> Self {
        Self { header, rows }
    }

    /// Header cells plus the data rows that follow them. Without an explicit
    /// header, the first row is taken as the header.
    pub fn header_and_body(&self) -> Option<(&[String], &[Vec<String>])> {
        match &self.header {
            Some(h) => Some((h.as_slice(), self.rows.as_slice())),
            None => self.rows.split_first().map(|(h, body)| (h.as_slice(), body)),
        }
    }
}

/// OCR text and tables for one document. The input contract of the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanDocument {
    pub text: String,
    #[serde(default)]
    pub tables: Vec<DocumentTable>,
}

impl LoanDocument {
    pub fn new(text: impl Into<String>, tables: Vec<DocumentTable>) -> Self {
        Self {
            text: text.into(),
            tables,
        }
    }

    /// Parse and validate the JSON input contract.
    pub fn from_json(json: &str) -> Result<Self, ExtractionError> {
        let doc: Self =
            serde_json::from_str(json).map_err(|e| ExtractionError::MalformedInput(e.to_string()))?;
        doc.validate()?;
        Ok(doc)
    }

    pub fn validate(&self) -> Result<(), ExtractionError> {
        let has_nul = |s: &str| s.contains('\0');
        if has_nul(&self.text) {
            return Err(ExtractionError::MalformedInput("text contains NUL bytes".into()));
        }
        let cells = self
            .tables
            .iter()
            .flat_map(|t| t.header.iter().chain(t.rows.iter()))
            .flatten();
        for cell in cells {
            if has_nul(cell) {
                return Err(ExtractionError::MalformedInput("table cell contains NUL bytes".into()));
            }
        }
        Ok(())
    }
}
