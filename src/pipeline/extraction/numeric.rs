//! Number parsing for OCR'd amounts.
//!
//! Accepts both comma conventions seen on loan paperwork:
//! - Western: `1,234,567.89` (groups of three)
//! - Indian: `12,34,567.89` (last group of three, groups of two before it)
//!
//! Letter O read in place of zero is repaired. Repairs and irregular
//! grouping still yield a value, but mark it as not well-formed so the
//! caller can lower its confidence.

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParsedNumber {
    pub value: f64,
    pub well_formed: bool,
}

/// Parse a numeric token. Returns `None` when nothing numeric survives.
pub fn parse_number(raw: &str) -> Option<ParsedNumber> {
    let trimmed = raw.trim().trim_end_matches([',', '.']);
    let (negative, body) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest.trim_start()),
        None => (false, trimmed),
    };
    if body.is_empty() {
        return None;
    }

    let repaired: String = body
        .chars()
        .map(|c| if c == 'O' || c == 'o' { '0' } else { c })
        .collect();
    let mut well_formed = repaired == body;

    let (int_part, frac_part) = match repaired.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (repaired.as_str(), None),
    };
    if int_part.is_empty() {
        return None;
    }
    if let Some(f) = frac_part {
        if f.is_empty() || !f.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
    }

    let groups: Vec<&str> = int_part.split(',').collect();
    if groups.iter().any(|g| g.is_empty() || !g.chars().all(|c| c.is_ascii_digit())) {
        return None;
    }
    if groups.len() > 1 && !is_western_grouping(&groups) && !is_indian_grouping(&groups) {
        well_formed = false;
    }

    let mut digits = groups.concat();
    if let Some(f) = frac_part {
        digits.push('.');
        digits.push_str(f);
    }
    let value: f64 = digits.parse().ok()?;
    Some(ParsedNumber {
        value: if negative { -value } else { value },
        well_formed,
    })
}

fn is_western_grouping(groups: &[&str]) -> bool {
    (1..=3).contains(&groups[0].len()) && groups[1..].iter().all(|g| g.len() == 3)
}

fn is_indian_grouping(groups: &[&str]) -> bool {
    let Some((last, middle)) = groups[1..].split_last() else {
        return false;
    };
    (1..=2).contains(&groups[0].len()) && last.len() == 3 && middle.iter().all(|g| g.len() == 2)
}

/// Scale words used with Indian amounts.
pub fn multiplier(word: &str) -> Option<f64> {
    match word.trim().trim_end_matches('.').to_lowercase().as_str() {
        "lakh" | "lakhs" | "lac" | "lacs" => Some(1e5),
        "crore" | "crores" | "cr" => Some(1e7),
        "million" => Some(1e6),
        _ => None,
    }
}
