use serde::{Deserialize, Serialize};

use super::ModelError;

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $s)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = ModelError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(ModelError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

str_enum!(LoanType {
    Education => "education",
    Home => "home",
    Personal => "personal",
    Vehicle => "vehicle",
    Gold => "gold",
    Other => "other",
});

str_enum!(FeeKind {
    Processing => "processing_fee",
    Administrative => "administrative_fee",
    Documentation => "documentation_fee",
    Other => "other_fee",
});

str_enum!(PenaltyKind {
    LatePayment => "late_payment_penalty",
    Prepayment => "prepayment_penalty",
});

str_enum!(ValueType {
    Fixed => "fixed",
    Percentage => "percentage",
});

str_enum!(EntityRole {
    Lender => "lender",
    Cosigner => "cosigner",
    Collateral => "collateral",
});

str_enum!(CollateralKind {
    Unsecured => "unsecured",
    Property => "property",
    Gold => "gold",
    Vehicle => "vehicle",
    Land => "land",
    Other => "other",
});

str_enum!(RepaymentMode {
    Emi => "emi",
    Bullet => "bullet",
    StepUp => "step_up",
});

str_enum!(DisbursementType {
    Single => "single",
    Multiple => "multiple",
});

str_enum!(ConfidenceLevel {
    High => "high",
    Medium => "medium",
    Low => "low",
});

str_enum!(DurationUnit {
    Months => "months",
    Years => "years",
});

str_enum!(RateUnit {
    PercentPerAnnum => "percent_per_annum",
    PercentPerMonth => "percent_per_month",
});

str_enum!(ExtractorKind {
    CoreFields => "core_fields",
    Charges => "fees_and_penalties",
    Entities => "entities",
    Schedule => "payment_schedule",
    Terms => "additional_terms",
});

// Every field the confidence scorer knows a weight for.
str_enum!(CanonicalField {
    PrincipalAmount => "principal_amount",
    InterestRate => "interest_rate",
    Tenure => "tenure",
    MoratoriumPeriod => "moratorium_period",
    BankName => "bank_name",
    Fees => "fees",
    LatePaymentPenalty => "late_payment_penalty",
    PrepaymentPenalty => "prepayment_penalty",
    RepaymentMode => "repayment_mode",
    DisbursementTerms => "disbursement_terms",
    Cosigner => "cosigner",
    Collateral => "collateral",
});

impl CanonicalField {
    pub const ALL: [CanonicalField; 12] = [
        CanonicalField::PrincipalAmount,
        CanonicalField::InterestRate,
        CanonicalField::Tenure,
        CanonicalField::MoratoriumPeriod,
        CanonicalField::BankName,
        CanonicalField::Fees,
        CanonicalField::LatePaymentPenalty,
        CanonicalField::PrepaymentPenalty,
        CanonicalField::RepaymentMode,
        CanonicalField::DisbursementTerms,
        CanonicalField::Cosigner,
        CanonicalField::Collateral,
    ];
}

impl DurationUnit {
    /// Parse the unit word captured next to a number ("years", "yr", "mos").
    pub fn from_word(word: &str) -> Option<Self> {
        let w = word.trim().to_lowercase();
        if w.starts_with("y") {
            Some(Self::Years)
        } else if w.starts_with("mo") {
            Some(Self::Months)
        } else {
            None
        }
    }

    pub fn to_months(&self, value: f64) -> f64 {
        match self {
            Self::Years => value * 12.0,
            Self::Months => value,
        }
    }
}

impl PenaltyKind {
    pub fn canonical_field(&self) -> CanonicalField {
        match self {
            Self::LatePayment => CanonicalField::LatePaymentPenalty,
            Self::Prepayment => CanonicalField::PrepaymentPenalty,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn loan_type_round_trip() {
        for lt in [
            LoanType::Education,
            LoanType::Home,
            LoanType::Personal,
            LoanType::Vehicle,
            LoanType::Gold,
            LoanType::Other,
        ] {
            assert_eq!(LoanType::from_str(lt.as_str()).unwrap(), lt);
        }
    }

    #[test]
    fn invalid_enum_value_rejected() {
        let err = FeeKind::from_str("stamp_duty").unwrap_err();
        assert!(err.to_string().contains("FeeKind"));
    }

    #[test]
    fn serializes_as_snake_case_string() {
        let json = serde_json::to_string(&RepaymentMode::StepUp).unwrap();
        assert_eq!(json, "\"step_up\"");
        let back: RepaymentMode = serde_json::from_str("\"step_up\"").unwrap();
        assert_eq!(back, RepaymentMode::StepUp);
    }

    #[test]
    fn duration_unit_from_ocr_words() {
        assert_eq!(DurationUnit::from_word("Years"), Some(DurationUnit::Years));
        assert_eq!(DurationUnit::from_word("yrs"), Some(DurationUnit::Years));
        assert_eq!(DurationUnit::from_word("month"), Some(DurationUnit::Months));
        assert_eq!(DurationUnit::from_word("mos"), Some(DurationUnit::Months));
        assert_eq!(DurationUnit::from_word("days"), None);
    }

    #[test]
    fn canonical_field_keys_are_unique() {
        let mut names: Vec<&str> = CanonicalField::ALL.iter().map(|f| f.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), CanonicalField::ALL.len());
    }
}
