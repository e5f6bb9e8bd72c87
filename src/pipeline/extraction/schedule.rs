//! Payment schedule (amortization table) extraction.
//!
//! Rows from every table classified as a schedule are collected, ordered by
//! their stated installment number, and re-indexed from 1. Inconsistent rows
//! are never dropped: they keep a reduced confidence and an anomaly entry.

use std::sync::{Arc, LazyLock};

use chrono::{Datelike, NaiveDate};
use regex::Regex;

use crate::models::{ExtractorKind, ScheduleAnomaly, ScheduleRow, ScheduleSummary};
use crate::pipeline_config::PipelineConfig;

use super::numeric::parse_number;
use super::patterns::{shading, NUMBER};
use super::table_detect::{classify_table, document_tables, TableKind};
use super::traits::{ExtractorOutput, FieldExtractor};
use super::types::{DocumentTable, LoanDocument};
use super::ExtractionError;

/// Base confidence of a schedule row read from a classified table.
const ROW_CONFIDENCE: f32 = 0.90;
/// Multiplier for a row whose balance rises over the previous row.
/// Takes a base row below the low-confidence threshold.
const BALANCE_INCREASE_FACTOR: f32 = 0.60;
/// Multiplier for a misnumbered row or an unreadable date.
const MINOR_ANOMALY_FACTOR: f32 = 0.85;

/// Four-digit-year formats come first; a two-digit year read through `%Y`
/// lands before year 1000 and is rejected so the `%y` forms get a turn.
const DATE_FORMATS: &[&str] = &[
    "%d-%m-%Y", "%d/%m/%Y", "%d.%m.%Y", "%Y-%m-%d", "%Y/%m/%d", "%d %b %Y", "%d-%b-%Y", "%b %d, %Y",
    "%d-%m-%y", "%d/%m/%y", "%d.%m.%y", "%d %b %y", "%d-%b-%y",
];

static CELL_NUMBER: LazyLock<Regex> = LazyLock::new(|| Regex::new(NUMBER).expect("valid regex"));

/// Parse a schedule date. Month names may be short or long.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    DATE_FORMATS
        .iter()
        .filter_map(|f| NaiveDate::parse_from_str(s, f).ok())
        .find(|d| d.year() >= 1000)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Column {
    Number,
    Date,
    Total,
    Principal,
    Interest,
    Balance,
    /// Balance before the installment. Used only when no closing balance column exists.
    OpeningBalance,
}

fn column_role(header: &str) -> Option<Column> {
    let h = header.trim().to_lowercase();
    let tokens: Vec<&str> =
        h.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()).collect();
    let has_token = |words: &[&str]| tokens.iter().any(|t| words.contains(t));
    let has_any = |words: &[&str]| words.iter().any(|k| h.contains(k));

    if h.contains("principal") {
        Some(Column::Principal)
    } else if h.contains("interest") {
        Some(Column::Interest)
    } else if has_any(&["opening", "beginning"]) {
        Some(Column::OpeningBalance)
    } else if has_any(&["outstanding", "balance", "remaining", "closing"]) {
        Some(Column::Balance)
    } else if h.contains("date") || has_token(&["due"]) {
        Some(Column::Date)
    } else if h.contains('#') || has_token(&["no", "sr", "sno", "serial", "number", "month"]) {
        Some(Column::Number)
    } else if has_any(&["emi", "total", "amount", "installment", "instalment", "payment"]) {
        Some(Column::Total)
    } else {
        None
    }
}

#[derive(Debug, Default)]
struct ColumnMap {
    number: Option<usize>,
    date: Option<usize>,
    total: Option<usize>,
    principal: Option<usize>,
    interest: Option<usize>,
    balance: Option<usize>,
}

impl ColumnMap {
    fn from_header(header: &[String]) -> Self {
        let mut map = Self::default();
        let mut opening = None;
        for (i, cell) in header.iter().enumerate() {
            let slot = match column_role(cell) {
                Some(Column::Number) => &mut map.number,
                Some(Column::Date) => &mut map.date,
                Some(Column::Total) => &mut map.total,
                Some(Column::Principal) => &mut map.principal,
                Some(Column::Interest) => &mut map.interest,
                Some(Column::Balance) => &mut map.balance,
                Some(Column::OpeningBalance) => &mut opening,
                None => continue,
            };
            slot.get_or_insert(i);
        }
        map.balance = map.balance.or(opening);
        map
    }
}

/// A row before ordering and re-indexing.
#[derive(Debug, Clone)]
struct RawRow {
    stated_number: Option<u32>,
    date: Option<NaiveDate>,
    date_unreadable: bool,
    total: Option<f64>,
    principal: Option<f64>,
    interest: Option<f64>,
    balance: Option<f64>,
    confidence: f32,
}

pub struct ScheduleExtractor {
    config: Arc<PipelineConfig>,
}

impl ScheduleExtractor {
    pub fn new(config: Arc<PipelineConfig>) -> Self {
        Self { config }
    }

    pub fn extract_schedule(
        &self,
        doc: &LoanDocument,
    ) -> (Vec<ScheduleRow>, Option<ScheduleSummary>, Vec<ScheduleAnomaly>) {
        let mut raw: Vec<RawRow> = document_tables(doc)
            .iter()
            .enumerate()
            .flat_map(|(index, table)| self.rows_from_table(index, table))
            .collect();
        raw.sort_by_key(|r| r.stated_number.unwrap_or(u32::MAX));

        let mut rows = Vec::with_capacity(raw.len());
        let mut anomalies = Vec::new();
        let mut previous_balance: Option<f64> = None;

        for (pos, r) in raw.into_iter().enumerate() {
            let index = pos as u32 + 1;
            let mut confidence = r.confidence;

            if let Some(stated) = r.stated_number.filter(|n| *n != index) {
                confidence *= MINOR_ANOMALY_FACTOR;
                anomalies.push(ScheduleAnomaly {
                    row_index: index,
                    reason: format!(
                        "stated installment number {stated} differs from position {index}"
                    ),
                });
            }
            if r.date_unreadable {
                confidence *= MINOR_ANOMALY_FACTOR;
                anomalies.push(ScheduleAnomaly {
                    row_index: index,
                    reason: "due date could not be parsed".into(),
                });
            }
            if let (Some(prev), Some(curr)) = (previous_balance, r.balance) {
                if curr > prev {
                    confidence *= BALANCE_INCREASE_FACTOR;
                    tracing::warn!(
                        row = index,
                        previous = prev,
                        current = curr,
                        "Outstanding balance increased"
                    );
                    anomalies.push(ScheduleAnomaly {
                        row_index: index,
                        reason: format!("outstanding balance rose from {prev} to {curr}"),
                    });
                }
            }
            if r.balance.is_some() {
                previous_balance = r.balance;
            }

            rows.push(ScheduleRow {
                index,
                date: r.date,
                total_amount: r.total,
                principal_component: r.principal,
                interest_component: r.interest,
                outstanding_balance: r.balance,
                confidence,
            });
        }

        let summary = summarize(&rows);
        (rows, summary, anomalies)
    }

    fn rows_from_table(&self, index: usize, table: &DocumentTable) -> Vec<RawRow> {
        match classify_table(table, &self.config.table_keywords) {
            TableKind::Schedule => {}
            TableKind::Ambiguous => {
                tracing::info!(table = index, extractor = "schedule", "Skipping ambiguous table");
                return Vec::new();
            }
            _ => return Vec::new(),
        }
        let Some((header, body)) = table.header_and_body() else {
            return Vec::new();
        };
        let cols = ColumnMap::from_header(header);

        let mut out = Vec::new();
        for (row_no, row) in body.iter().enumerate() {
            let cell = |col: Option<usize>| {
                col.and_then(|c| row.get(c)).map(|s| s.trim()).filter(|s| !s.is_empty())
            };

            let mut well_formed = true;
            let mut amount = |col: Option<usize>| {
                let parsed = cell(col).and_then(cell_amount)?;
                well_formed &= parsed.1;
                Some(parsed.0)
            };
            let total = amount(cols.total);
            let principal = amount(cols.principal);
            let interest = amount(cols.interest);
            let balance = amount(cols.balance);

            if total.is_none() && principal.is_none() {
                tracing::debug!(
                    table = index,
                    row = row_no,
                    "Skipping row without installment amounts"
                );
                continue;
            }

            let date_cell = cell(cols.date);
            let date = date_cell.and_then(parse_date);
            let stated_number = cell(cols.number)
                .and_then(cell_amount)
                .map(|(n, _)| n)
                .filter(|n| *n >= 0.0 && n.fract() == 0.0 && *n <= u32::MAX as f64)
                .map(|n| n as u32);

            out.push(RawRow {
                stated_number,
                date,
                date_unreadable: date_cell.is_some() && date.is_none(),
                total,
                principal,
                interest,
                balance,
                confidence: if well_formed {
                    ROW_CONFIDENCE
                } else {
                    ROW_CONFIDENCE - shading::MALFORMED_PENALTY
                },
            });
        }
        out
    }
}

/// First number in a cell, with its well-formedness.
fn cell_amount(cell: &str) -> Option<(f64, bool)> {
    let m = CELL_NUMBER.find(cell)?;
    let parsed = parse_number(m.as_str())?;
    Some((parsed.value, parsed.well_formed))
}

fn summarize(rows: &[ScheduleRow]) -> Option<ScheduleSummary> {
    if rows.is_empty() {
        return None;
    }
    let total_payable: f64 = rows
        .iter()
        .map(|r| {
            let components =
                r.principal_component.unwrap_or(0.0) + r.interest_component.unwrap_or(0.0);
            r.total_amount.unwrap_or(components)
        })
        .sum();
    Some(ScheduleSummary {
        total_payments: rows.len() as u32,
        total_payable,
        total_principal: rows.iter().filter_map(|r| r.principal_component).sum(),
        total_interest: rows.iter().filter_map(|r| r.interest_component).sum(),
        average_installment: total_payable / rows.len() as f64,
    })
}

impl FieldExtractor for ScheduleExtractor {
    fn kind(&self) -> ExtractorKind {
        ExtractorKind::Schedule
    }

    fn extract(&self, doc: &LoanDocument) -> Result<ExtractorOutput, ExtractionError> {
        let (rows, summary, anomalies) = self.extract_schedule(doc);
        Ok(ExtractorOutput::Schedule {
            rows,
            summary,
            anomalies,
        })
    }
}
