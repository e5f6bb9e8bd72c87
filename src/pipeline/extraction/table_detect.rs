use crate::pipeline_config::TableKeywords;

use super::types::{DocumentTable, LoanDocument};

/// What a table appears to contain, judged from its header cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    Fee,
    Schedule,
    /// Fee and schedule keywords tie. Skipped, never guessed.
    Ambiguous,
    Unknown,
}

/// Classify a table by counting header cells that contain a keyword of each kind.
pub fn classify_table(table: &DocumentTable, keywords: &TableKeywords) -> TableKind {
    let Some((header, _)) = table.header_and_body() else {
        return TableKind::Unknown;
    };
    let fee = count_hits(header, &keywords.fee);
    let schedule = count_hits(header, &keywords.schedule);

    match (fee, schedule) {
        (0, 0) => TableKind::Unknown,
        (f, s) if f > s => TableKind::Fee,
        (f, s) if s > f => TableKind::Schedule,
        _ => TableKind::Ambiguous,
    }
}

fn count_hits(header: &[String], keywords: &[String]) -> usize {
    header
        .iter()
        .filter(|cell| {
            let cell = cell.to_lowercase();
            keywords.iter().any(|k| contains_word(&cell, &k.to_lowercase()))
        })
        .count()
}

/// Keyword match on word boundaries, so "fee" does not hit "feedback".
fn contains_word(haystack: &str, word: &str) -> bool {
    haystack.match_indices(word).any(|(start, _)| {
        let end = start + word.len();
        let before = haystack[..start].chars().next_back();
        let after = haystack[end..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

/// The tables an extractor should look at: the supplied ones, or tables
/// recovered from tabular runs in the text when none were supplied.
pub fn document_tables(doc: &LoanDocument) -> Vec<DocumentTable> {
    if doc.tables.is_empty() {
        tables_from_text(&doc.text)
    } else {
        doc.tables.clone()
    }
}

/// Minimum consecutive tabular lines to treat as a table.
const MIN_TABLE_LINES: usize = 2;

/// Recover tables from runs of tabular lines in OCR text.
/// The first line of each run is left as the first row.
pub fn tables_from_text(text: &str) -> Vec<DocumentTable> {
    let mut tables = Vec::new();
    let mut run: Vec<Vec<String>> = Vec::new();

    for line in text.lines() {
        if is_tabular_line(line) {
            run.push(split_cells(line));
        } else {
            flush_run(&mut run, &mut tables);
        }
    }
    flush_run(&mut run, &mut tables);
    tables
}

fn flush_run(run: &mut Vec<Vec<String>>, tables: &mut Vec<DocumentTable>) {
    if run.len() >= MIN_TABLE_LINES {
        tables.push(DocumentTable::new(None, std::mem::take(run)));
    } else {
        run.clear();
    }
}

/// Heuristic: a line looks tabular if it has multiple columns separated by
/// tabs, pipes, or consistent multi-space gaps.
///
/// Patterns detected:
/// - Tab-separated: "No\tDue Date\tEMI"
/// - Pipe-separated: "No | Due Date | EMI" or "| Fee | Amount |"
/// - Multi-space aligned: "1    01-05-2024    10,000"
fn is_tabular_line(line: &str) -> bool {
    let trimmed = line.trim();
    if trimmed.len() < 5 {
        return false;
    }
    trimmed.matches('\t').count() >= 2
        || trimmed.matches('|').count() >= 2
        || count_multi_space_gaps(trimmed) >= 2
}

/// Count runs of 3+ consecutive spaces that separate non-empty text segments.
fn count_multi_space_gaps(text: &str) -> usize {
    let mut count = 0;
    let mut gap_len = 0;

    for ch in text.chars() {
        if ch == ' ' {
            gap_len += 1;
            if gap_len == 3 {
                count += 1;
            }
        } else {
            gap_len = 0;
        }
    }

    count
}

fn split_cells(line: &str) -> Vec<String> {
    let trimmed = line.trim().trim_matches('|');
    let cells: Vec<&str> = if trimmed.contains('|') {
        trimmed.split('|').collect()
    } else if trimmed.contains('\t') {
        trimmed.split('\t').collect()
    } else {
        trimmed.split("   ").collect()
    };
    cells
        .into_iter()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline_config::PipelineConfig;

    fn make_table(header: &[&str]) -> DocumentTable {
        DocumentTable::new(Some(header.iter().map(|s| s.to_string()).collect()), vec![])
    }

    fn keywords() -> TableKeywords {
        PipelineConfig::default().table_keywords
    }

    #[test]
    fn schedule_header_classified() {
        let table =
            make_table(&["Installment No", "Due Date", "EMI", "Principal", "Interest", "Balance"]);
        assert_eq!(classify_table(&table, &keywords()), TableKind::Schedule);
    }

    #[test]
    fn fee_header_classified() {
        let table = make_table(&["Fee Description", "Charges"]);
        assert_eq!(classify_table(&table, &keywords()), TableKind::Fee);
    }

    #[test]
    fn tied_header_is_ambiguous() {
        let table = make_table(&["Fee", "Interest"]);
        assert_eq!(classify_table(&table, &keywords()), TableKind::Ambiguous);
    }

    #[test]
    fn unrelated_header_is_unknown() {
        let table = make_table(&["Name", "Address"]);
        assert_eq!(classify_table(&table, &keywords()), TableKind::Unknown);
        assert_eq!(classify_table(&DocumentTable::default(), &keywords()), TableKind::Unknown);
    }

    #[test]
    fn keyword_needs_word_boundary() {
        assert!(contains_word("processing fee", "fee"));
        assert!(!contains_word("feedback", "fee"));
        assert!(contains_word("emi amount", "emi"));
        assert!(!contains_word("premium", "emi"));
    }

    // --- text table recovery ---

    #[test]
    fn pipe_table_recovered_from_text() {
        let text = "Repayment schedule\n\
                    | No | Due Date | EMI |\n\
                    | 1 | 01-05-2024 | 10,000 |\n\
                    | 2 | 01-06-2024 | 10,000 |\n\
                    End";
        let tables = tables_from_text(text);
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].rows.len(), 3);
        assert_eq!(tables[0].rows[0], vec!["No", "Due Date", "EMI"]);
    }

    #[test]
    fn two_column_pipe_table_recovered() {
        let text = "| Fee Description | Amount |\n\
                    | Processing Fee | Rs. 5,000 |\n\
                    | Stamp Duty | 1,200 |";
        let tables = tables_from_text(text);
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].rows.len(), 3);
        assert_eq!(tables[0].rows[1], vec!["Processing Fee", "Rs. 5,000"]);
        assert_eq!(classify_table(&tables[0], &keywords()), TableKind::Fee);
    }

    #[test]
    fn multi_space_table_recovered() {
        let text = "No    Date          EMI\n1     01-05-2024    10000\n";
        let tables = tables_from_text(text);
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].rows[1], vec!["1", "01-05-2024", "10000"]);
    }

    #[test]
    fn single_tabular_line_is_not_a_table() {
        assert!(tables_from_text("A\tB\tC\nplain prose here").is_empty());
    }

    #[test]
    fn prose_is_not_tabular() {
        assert!(!is_tabular_line("This is a normal sentence."));
        assert!(!is_tabular_line("Hi"));
    }

    #[test]
    fn supplied_tables_take_precedence() {
        let doc = LoanDocument::new("A\tB\tC\nD\tE\tF", vec![make_table(&["Fee"])]);
        let tables = document_tables(&doc);
        assert_eq!(tables.len(), 1);
        assert!(tables[0].header.is_some());
    }
}
