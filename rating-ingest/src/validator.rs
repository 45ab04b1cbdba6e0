//! Decimal validation for factor cells and factor rows
//!
//! A factor cell is accepted when it is non-empty, numeric, has at most 8
//! significant fractional digits, and lies in [0, 1]. Checks run in that
//! order, so a value like `5.123456789` reports excess precision rather than
//! range. A row is accepted when the exact sum of its thirty factors lies in
//! [0, 1].

use rating_common::fixed::{self, DecimalParseError, FIXED_SCALE};
use rating_common::{FactorId, FactorSet};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a row was rejected before staging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectionKind {
    Empty,
    NotNumeric,
    OutOfRange,
    TooManyDecimals,
    SumOutOfRange,
}

impl RejectionKind {
    pub fn describe(&self) -> &'static str {
        match self {
            RejectionKind::Empty => "empty",
            RejectionKind::NotNumeric => "not numeric",
            RejectionKind::OutOfRange => "out of range",
            RejectionKind::TooManyDecimals => "too many decimals",
            RejectionKind::SumOutOfRange => "sum out of range",
        }
    }
}

impl fmt::Display for RejectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// One rejected row: source line, offending field, reason
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    /// 1-based physical line in the uploaded file (header is line 1)
    pub line: u64,
    /// Factor column (`f20`), or `sum` for the row-level check
    pub field: String,
    pub kind: RejectionKind,
    /// Offending raw text (absent for empty cells)
    pub value: Option<String>,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(value) => write!(f, "line {}: {} {} ('{}')", self.line, self.field, self.kind, value),
            None => write!(f, "line {}: {} {}", self.line, self.field, self.kind),
        }
    }
}

impl std::error::Error for Rejection {}

/// Field name used for row-level sum rejections
pub const SUM_FIELD: &str = "sum";

/// Validate a single factor cell, returning the quantized value
pub fn validate_factor(id: FactorId, raw: &str, line: u64) -> Result<Decimal, Rejection> {
    let reject = |kind: RejectionKind, value: Option<&str>| Rejection {
        line,
        field: id.column().to_string(),
        kind,
        value: value.map(str::to_string),
    };

    let value = match fixed::parse_decimal(raw) {
        Ok(value) => value,
        Err(DecimalParseError::Empty) => return Err(reject(RejectionKind::Empty, None)),
        Err(DecimalParseError::NotNumeric) => return Err(reject(RejectionKind::NotNumeric, Some(raw))),
        Err(DecimalParseError::Overflow { fractional_digits }) => {
            let kind = if fractional_digits > FIXED_SCALE as usize {
                RejectionKind::TooManyDecimals
            } else {
                RejectionKind::OutOfRange
            };
            return Err(reject(kind, Some(raw)));
        }
    };

    if fixed::fractional_digits(value) > FIXED_SCALE {
        return Err(reject(RejectionKind::TooManyDecimals, Some(raw)));
    }

    if !fixed::in_unit_interval(value) {
        return Err(reject(RejectionKind::OutOfRange, Some(raw)));
    }

    Ok(fixed::quantize(value))
}

/// Validate the exact sum of all thirty factors, returning the quantized sum
///
/// A zero sum is valid; the header is then pending.
pub fn validate_row_sum(factors: &FactorSet, line: u64) -> Result<Decimal, Rejection> {
    let sum = factors.sum();

    if sum < Decimal::ZERO || sum > Decimal::ONE {
        return Err(Rejection {
            line,
            field: SUM_FIELD.to_string(),
            kind: RejectionKind::SumOutOfRange,
            value: Some(sum.to_string()),
        });
    }

    Ok(sum)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn kind_of(raw: &str) -> RejectionKind {
        validate_factor(FactorId::F20, raw, 7).unwrap_err().kind
    }

    #[test]
    fn test_boundaries_are_inclusive() {
        assert_eq!(validate_factor(FactorId::F08, "0", 2).unwrap().to_string(), "0.00000000");
        assert_eq!(validate_factor(FactorId::F08, "1", 2).unwrap().to_string(), "1.00000000");
        assert_eq!(validate_factor(FactorId::F08, "1.00000000", 2).unwrap(), Decimal::ONE);
        assert_eq!(validate_factor(FactorId::F08, "0.00000001", 2).unwrap().to_string(), "0.00000001");
    }

    #[test]
    fn test_excess_precision_is_rejected() {
        assert_eq!(kind_of("1.000000001"), RejectionKind::TooManyDecimals);
        assert_eq!(kind_of("0.123456789"), RejectionKind::TooManyDecimals);
        assert_eq!(kind_of("5.123456789"), RejectionKind::TooManyDecimals);
        assert_eq!(kind_of("0.0000000000000000000000000000001"), RejectionKind::TooManyDecimals);
    }

    #[test]
    fn test_trailing_zeros_do_not_count_as_precision() {
        let value = validate_factor(FactorId::F20, "0.500000000000", 3).unwrap();
        assert_eq!(value.to_string(), "0.50000000");
    }

    #[test]
    fn test_out_of_range_values() {
        assert_eq!(kind_of("1.00000001"), RejectionKind::OutOfRange);
        assert_eq!(kind_of("-0.5"), RejectionKind::OutOfRange);
        assert_eq!(kind_of("2"), RejectionKind::OutOfRange);
        assert_eq!(kind_of("1e3"), RejectionKind::OutOfRange);
        assert_eq!(kind_of("99999999999999999999999999999999"), RejectionKind::OutOfRange);
    }

    #[test]
    fn test_empty_and_non_numeric() {
        let err = validate_factor(FactorId::F19a, "  ", 9).unwrap_err();
        assert_eq!(err.kind, RejectionKind::Empty);
        assert_eq!(err.field, "f19a");
        assert_eq!(err.line, 9);
        assert_eq!(err.value, None);

        assert_eq!(kind_of("abc"), RejectionKind::NotNumeric);
        assert_eq!(kind_of("0,5"), RejectionKind::NotNumeric);
        assert_eq!(kind_of("NaN"), RejectionKind::NotNumeric);
    }

    #[test]
    fn test_scientific_notation_is_accepted() {
        let value = validate_factor(FactorId::F30, "2.5E-1", 4).unwrap();
        assert_eq!(value.to_string(), "0.25000000");
    }

    #[test]
    fn test_scientific_notation_beyond_decimal_range() {
        assert_eq!(kind_of("1.5e-9"), RejectionKind::TooManyDecimals);
        assert_eq!(kind_of("1e-30"), RejectionKind::TooManyDecimals);
        assert_eq!(kind_of("5e-29"), RejectionKind::TooManyDecimals);
        assert_eq!(kind_of("1E+40"), RejectionKind::OutOfRange);
        assert_eq!(kind_of("1e3"), RejectionKind::OutOfRange);
        assert_eq!(kind_of("1e+"), RejectionKind::NotNumeric);
    }

    #[test]
    fn test_row_sum_over_one_is_rejected() {
        let mut set = FactorSet::zeroed();
        set[FactorId::F08] = Decimal::from_str("0.5").unwrap();
        set[FactorId::F09] = Decimal::from_str("0.6").unwrap();

        let err = validate_row_sum(&set, 2).unwrap_err();
        assert_eq!(err.kind, RejectionKind::SumOutOfRange);
        assert_eq!(err.field, SUM_FIELD);
        assert_eq!(err.value.as_deref(), Some("1.10000000"));
        assert_eq!(err.to_string(), "line 2: sum sum out of range ('1.10000000')");
    }

    #[test]
    fn test_row_sum_exactly_one_and_zero_are_valid() {
        let mut set = FactorSet::zeroed();
        assert_eq!(validate_row_sum(&set, 2).unwrap(), Decimal::ZERO);

        for id in FactorId::ALL.iter().take(3) {
            set[*id] = Decimal::from_str("0.33333333").unwrap();
        }
        set[FactorId::F37] = Decimal::from_str("0.00000001").unwrap();
        assert_eq!(validate_row_sum(&set, 2).unwrap().to_string(), "1.00000000");
    }
}
