//! Unit and currency conversion into the canonical schema.
//!
//! Tenure ends up in months, interest in percent per annum, and amounts in
//! the reporting currency when a conversion table is supplied. An amount
//! with no stated currency is never converted or tagged.

use std::str::FromStr;

use crate::models::{
    DurationUnit, ExtractedField, FieldValue, NormalizedValue, RateUnit, ScheduleRow,
    ScheduleSummary,
};
use crate::pipeline_config::ConversionTable;

pub const MONTHLY_RATE_NOTE: &str = "converted from a monthly rate by multiplying by 12 (linear, compounding not applied)";

/// Duration (tenure, moratorium) in months.
pub fn to_months(field: &ExtractedField, flag_below: f32) -> Option<NormalizedValue> {
    let value = field.value.as_f64()?;
    let unit = field
        .unit_or_currency
        .as_deref()
        .and_then(DurationUnit::from_word)
        .unwrap_or(DurationUnit::Months);
    let converted = unit != DurationUnit::Months;

    Some(NormalizedValue {
        value: unit.to_months(value),
        unit: Some(DurationUnit::Months.as_str().to_string()),
        confidence: field.confidence,
        flagged: field.confidence < flag_below,
        original: converted.then(|| format!("{value} {unit}")),
        note: None,
    })
}

/// Interest rate in percent per annum.
pub fn to_annual_rate(field: &ExtractedField, flag_below: f32) -> Option<NormalizedValue> {
    let value = field.value.as_f64()?;
    let unit = field
        .unit_or_currency
        .as_deref()
        .and_then(|u| RateUnit::from_str(u).ok())
        .unwrap_or(RateUnit::PercentPerAnnum);
    let monthly = unit == RateUnit::PercentPerMonth;

    Some(NormalizedValue {
        value: if monthly { value * 12.0 } else { value },
        unit: Some(RateUnit::PercentPerAnnum.as_str().to_string()),
        confidence: field.confidence,
        flagged: field.confidence < flag_below,
        original: monthly.then(|| format!("{value} {unit}")),
        note: monthly.then(|| MONTHLY_RATE_NOTE.to_string()),
    })
}

/// Outcome of converting one amount.
#[derive(Debug, Clone, PartialEq)]
pub struct Converted {
    pub value: f64,
    pub currency: Option<String>,
    pub note: Option<String>,
}

/// Convert `value` written in `currency` into the reporting currency.
/// Without a table, or without a stated currency, the value is unchanged.
pub fn convert_amount(
    value: f64,
    currency: Option<&str>,
    table: Option<&ConversionTable>,
) -> Converted {
    let unchanged = |note: Option<String>| Converted {
        value,
        currency: currency.map(str::to_string),
        note,
    };
    let Some(table) = table else {
        return unchanged(None);
    };
    let Some(code) = currency else {
        return unchanged(Some("currency not stated; left unconverted".into()));
    };
    match table.rate(code) {
        Some(rate) => Converted {
            value: value * rate,
            currency: Some(table.reporting_currency.clone()),
            note: None,
        },
        None => {
            tracing::warn!(
                currency = code,
                reporting = %table.reporting_currency,
                "No conversion rate"
            );
            unchanged(Some(format!("no conversion rate from {code}; left in original currency")))
        }
    }
}

/// Principal or any other amount field as a normalized value.
pub fn to_reporting_amount(
    field: &ExtractedField,
    table: Option<&ConversionTable>,
    flag_below: f32,
) -> Option<NormalizedValue> {
    let value = field.value.as_f64()?;
    let currency = field.unit_or_currency.as_deref();
    let converted = convert_amount(value, currency, table);
    let changed = converted.currency.as_deref() != currency;

    Some(NormalizedValue {
        value: converted.value,
        original: match (changed, currency) {
            (true, Some(c)) => Some(format!("{value} {c}")),
            _ => None,
        },
        unit: converted.currency,
        confidence: field.confidence,
        flagged: field.confidence < flag_below,
        note: converted.note,
    })
}

/// An extracted amount (EMI and the like) restated in the reporting currency.
/// Non-numeric fields are returned unchanged.
pub fn convert_field(field: &ExtractedField, table: Option<&ConversionTable>) -> ExtractedField {
    let Some(value) = field.value.as_f64() else {
        return field.clone();
    };
    let converted = convert_amount(value, field.unit_or_currency.as_deref(), table);
    ExtractedField {
        value: FieldValue::Number(converted.value),
        unit_or_currency: converted.currency,
        ..field.clone()
    }
}

/// Scale schedule amounts written in `currency` into the reporting currency.
///
/// Returns the currency the rows and summary are expressed in afterwards:
/// the reporting currency when a rate exists, otherwise `currency` itself.
pub fn convert_schedule(
    rows: &mut [ScheduleRow],
    summary: Option<&mut ScheduleSummary>,
    currency: Option<&str>,
    table: Option<&ConversionTable>,
) -> Option<String> {
    let Some((rate, table)) = currency
        .zip(table)
        .and_then(|(code, table)| table.rate(code).map(|rate| (rate, table)))
    else {
        return currency.map(str::to_string);
    };

    for row in rows.iter_mut() {
        for amount in [
            &mut row.total_amount,
            &mut row.principal_component,
            &mut row.interest_component,
            &mut row.outstanding_balance,
        ] {
            if let Some(v) = amount {
                *v *= rate;
            }
        }
    }
    if let Some(s) = summary {
        s.total_payable *= rate;
        s.total_principal *= rate;
        s.total_interest *= rate;
        s.average_installment *= rate;
    }
    Some(table.reporting_currency.clone())
}
