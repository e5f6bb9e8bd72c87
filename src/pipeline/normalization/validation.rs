// Business-rule checks on a normalized loan record.
// Everything here produces warnings; no value is changed or removed.

use crate::models::{NormalizedLoanData, ValueType};
use crate::pipeline_config::WarningBounds;

/// Collect plausibility warnings for `data`.
///
/// `low_confidence_threshold` is the scorer's threshold; an overall
/// confidence below it is reported too.
pub fn business_warnings(
    data: &NormalizedLoanData,
    bounds: &WarningBounds,
    low_confidence_threshold: f32,
) -> Vec<String> {
    let mut warnings = Vec::new();

    check_core_values(data, bounds, &mut warnings);
    check_fees(data, bounds, &mut warnings);
    check_schedule(data, bounds, &mut warnings);

    let overall = data.confidence_report.overall_confidence;
    if overall < low_confidence_threshold {
        warnings.push(format!("Low extraction confidence: {overall:.2}"));
    }

    if !warnings.is_empty() {
        tracing::warn!(
            loan_id = %data.loan_id,
            warning_count = warnings.len(),
            "Business rule warnings detected"
        );
    }
    warnings
}

fn check_core_values(
    data: &NormalizedLoanData,
    bounds: &WarningBounds,
    warnings: &mut Vec<String>,
) {
    if let Some(p) = &data.principal_amount {
        if p.value > bounds.principal_high {
            warnings.push(format!("Principal amount {} is unusually high", p.value));
        }
        if p.value < bounds.principal_low {
            warnings.push(format!("Principal amount {} is unusually low", p.value));
        }
    }

    if let Some(r) = &data.interest_rate {
        if r.value > bounds.interest_rate_high {
            warnings.push(format!("Interest rate {}% is unusually high", r.value));
        }
        if r.value < bounds.interest_rate_low {
            warnings.push(format!("Interest rate {}% is unusually low", r.value));
        }
    }

    let tenure = data.tenure.as_ref().map(|t| t.value);
    if let Some(t) = tenure.filter(|t| *t > bounds.tenure_long_months) {
        warnings.push(format!("Tenure {t} months is unusually long"));
    }

    if let Some(m) = data.moratorium_period.as_ref().map(|m| m.value) {
        if tenure.is_some_and(|t| m > t) {
            warnings.push("Moratorium period exceeds loan tenure".to_string());
        }
        if m > bounds.moratorium_long_months {
            warnings.push(format!("Moratorium period {m} months is unusually long"));
        }
    }
}

/// Fixed fees only; percentage fees have no amount to add up.
fn check_fees(data: &NormalizedLoanData, bounds: &WarningBounds, warnings: &mut Vec<String>) {
    let Some(principal) = data.principal_amount.as_ref().map(|p| p.value) else {
        return;
    };
    let total: f64 = data
        .fees
        .iter()
        .filter(|f| f.item.value_type == ValueType::Fixed)
        .map(|f| f.item.value)
        .sum();
    if total > principal * bounds.fee_ratio_high {
        warnings.push(format!(
            "Total fees {total} exceed {:.0}% of principal amount",
            bounds.fee_ratio_high * 100.0
        ));
    }
}

fn check_schedule(data: &NormalizedLoanData, bounds: &WarningBounds, warnings: &mut Vec<String>) {
    let rows = &data.payment_schedule;
    if rows.is_empty() {
        return;
    }

    let balances: Vec<(u32, f64)> = rows
        .iter()
        .filter_map(|r| r.item.outstanding_balance.map(|b| (r.item.index, b)))
        .collect();
    if let Some(w) = balances.windows(2).find(|w| w[1].1 > w[0].1) {
        warnings.push(format!("Outstanding balance increases at installment {}", w[1].0));
    }

    let dates: Vec<_> = rows.iter().filter_map(|r| r.item.date).collect();
    if dates.windows(2).any(|w| w[1] <= w[0]) {
        warnings.push("Payment schedule dates are not in chronological order".to_string());
    }

    // Sums are only comparable when both sides are in the same currency.
    let principal = data
        .principal_amount
        .as_ref()
        .filter(|p| p.value > 0.0 && p.unit == data.schedule_currency)
        .map(|p| p.value);
    let principal_sum: f64 = rows.iter().filter_map(|r| r.item.principal_component).sum();
    if let Some(principal) = principal {
        let drift = (principal_sum - principal).abs() / principal;
        if principal_sum > 0.0 && drift > bounds.schedule_principal_tolerance {
            warnings.push(format!(
                "Schedule principal total {principal_sum} differs from principal amount \
                 {principal} by more than {:.0}%",
                bounds.schedule_principal_tolerance * 100.0
            ));
        }
    }
}
