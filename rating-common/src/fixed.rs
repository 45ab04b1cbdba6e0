//! Fixed-point helpers for (18, 8) decimal values
//!
//! Every factor, factor sum, historical value and update factor in the rating
//! model is an exact base-10 decimal with at most 8 fractional digits and 18
//! total digits. Values travel through the system as `rust_decimal::Decimal`
//! or as decimal strings; they are never converted to binary floats.
//!
//! Quantization to 8 fractional digits always uses banker's rounding
//! (round half to even) through [`quantize`].

use rust_decimal::{Decimal, RoundingStrategy};
use thiserror::Error;

/// Number of fractional digits kept for every fixed-point value
pub const FIXED_SCALE: u32 = 8;

/// Total number of significant digits allowed for every fixed-point value
pub const FIXED_PRECISION: u32 = 18;

/// Rounding applied whenever a value is quantized to [`FIXED_SCALE`]
pub const ROUNDING: RoundingStrategy = RoundingStrategy::MidpointNearestEven;

/// Largest scale `rust_decimal` can hold
const MAX_DECIMAL_SCALE: i64 = 28;

/// Failure to read a decimal from text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecimalParseError {
    /// Blank or whitespace-only input
    #[error("value is empty")]
    Empty,

    /// Input is not a decimal number
    #[error("value is not numeric")]
    NotNumeric,

    /// Syntactically numeric, but too many digits to represent exactly
    ///
    /// `fractional_digits` is the fractional length the value would need;
    /// zero means the magnitude itself is too large.
    #[error("value has too many digits ({fractional_digits} fractional)")]
    Overflow { fractional_digits: usize },
}

/// Parse decimal text exactly (no silent rounding)
///
/// Accepts plain notation (`0.125`, `-3`, `.5`) and scientific notation
/// (`1.5E-3`). Surrounding whitespace is ignored. Trailing fractional zeros
/// are dropped before parsing, so `0.100000000000` reads as `0.1`.
pub fn parse_decimal(raw: &str) -> Result<Decimal, DecimalParseError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(DecimalParseError::Empty);
    }

    if let Some((mantissa, exponent)) = trimmed.split_once(['e', 'E']) {
        return parse_scientific(mantissa, exponent);
    }

    if !is_plain_number(trimmed) {
        return Err(DecimalParseError::NotNumeric);
    }

    let canonical = strip_trailing_zeros(trimmed);
    Decimal::from_str_exact(canonical).map_err(|_| DecimalParseError::Overflow {
        fractional_digits: fractional_len(canonical),
    })
}

/// Count of significant fractional digits (trailing zeros ignored)
pub fn fractional_digits(value: Decimal) -> u32 {
    value.normalize().scale()
}

/// Quantize to exactly [`FIXED_SCALE`] fractional digits with banker's rounding
pub fn quantize(value: Decimal) -> Decimal {
    let mut q = value.round_dp_with_strategy(FIXED_SCALE, ROUNDING);
    q.rescale(FIXED_SCALE);
    if q.is_zero() {
        q.set_sign_positive(true);
    }
    q
}

/// Canonical text form: quantized, always 8 fractional digits, no exponent
pub fn to_fixed_string(value: Decimal) -> String {
    quantize(value).to_string()
}

/// Zero at canonical scale (`0.00000000`)
pub fn zero() -> Decimal {
    quantize(Decimal::ZERO)
}

/// True when the quantized value fits (18, 8): at most 10 integer digits
pub fn fits_precision(value: Decimal) -> bool {
    let limit = Decimal::from(10_i64.pow(FIXED_PRECISION - FIXED_SCALE));
    quantize(value).abs() < limit
}

/// True when `0 <= value <= 1`
pub fn in_unit_interval(value: Decimal) -> bool {
    value >= Decimal::ZERO && value <= Decimal::ONE
}

fn is_plain_number(text: &str) -> bool {
    let body = text.strip_prefix(['+', '-']).unwrap_or(text);
    let mut seen_digit = false;
    let mut seen_point = false;
    for c in body.chars() {
        match c {
            '0'..='9' => seen_digit = true,
            '.' if !seen_point => seen_point = true,
            _ => return false,
        }
    }
    seen_digit
}

/// Mantissa and exponent are checked separately so that a well-formed
/// number too small or too large for `Decimal` reads as an overflow, not as
/// non-numeric text.
fn parse_scientific(mantissa: &str, exponent: &str) -> Result<Decimal, DecimalParseError> {
    if !is_plain_number(mantissa) {
        return Err(DecimalParseError::NotNumeric);
    }
    let exponent = parse_exponent(exponent).ok_or(DecimalParseError::NotNumeric)?;

    let mantissa = strip_trailing_zeros(mantissa);
    let needed_scale = (fractional_len(mantissa) as i64).saturating_sub(exponent);
    let overflow = || DecimalParseError::Overflow {
        fractional_digits: usize::try_from(needed_scale.max(0)).unwrap_or(usize::MAX),
    };

    let mut value = Decimal::from_str_exact(mantissa).map_err(|_| overflow())?;
    if value.is_zero() {
        return Ok(Decimal::ZERO);
    }

    let scale = i64::from(value.scale()).saturating_sub(exponent);
    if scale > MAX_DECIMAL_SCALE || scale < -MAX_DECIMAL_SCALE {
        return Err(overflow());
    }
    if scale >= 0 {
        value.set_scale(scale as u32).map_err(|_| overflow())?;
    } else {
        value.set_scale(0).map_err(|_| overflow())?;
        for _ in 0..(-scale) {
            value = value.checked_mul(Decimal::TEN).ok_or_else(overflow)?;
        }
    }
    Ok(value)
}

/// Optional sign and at least one digit; saturates on absurd lengths
fn parse_exponent(text: &str) -> Option<i64> {
    let (negative, digits) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let magnitude = digits.parse::<i64>().unwrap_or(i64::MAX);
    Some(if negative { -magnitude } else { magnitude })
}

fn strip_trailing_zeros(text: &str) -> &str {
    if !text.contains('.') {
        return text;
    }
    let stripped = text.trim_end_matches('0').trim_end_matches('.');
    // `.0` and `-.000` strip down to no digits at all
    if stripped.bytes().any(|b| b.is_ascii_digit()) {
        stripped
    } else {
        "0"
    }
}

fn fractional_len(text: &str) -> usize {
    text.split_once('.').map(|(_, frac)| frac.len()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_parse_plain_and_scientific() {
        assert_eq!(parse_decimal("0.125").unwrap(), dec("0.125"));
        assert_eq!(parse_decimal("  1 ").unwrap(), Decimal::ONE);
        assert_eq!(parse_decimal(".5").unwrap(), dec("0.5"));
        assert_eq!(parse_decimal("1.5E-3").unwrap(), dec("0.0015"));
        assert_eq!(parse_decimal("-2").unwrap(), dec("-2"));
    }

    #[test]
    fn test_parse_rejects_non_numeric() {
        assert_eq!(parse_decimal(""), Err(DecimalParseError::Empty));
        assert_eq!(parse_decimal("   "), Err(DecimalParseError::Empty));
        assert_eq!(parse_decimal("abc"), Err(DecimalParseError::NotNumeric));
        assert_eq!(parse_decimal("NaN"), Err(DecimalParseError::NotNumeric));
        assert_eq!(parse_decimal("inf"), Err(DecimalParseError::NotNumeric));
        assert_eq!(parse_decimal("0,5"), Err(DecimalParseError::NotNumeric));
        assert_eq!(parse_decimal("1.2.3"), Err(DecimalParseError::NotNumeric));
        assert_eq!(parse_decimal("-"), Err(DecimalParseError::NotNumeric));
    }

    #[test]
    fn test_parse_scientific_out_of_decimal_range() {
        assert_eq!(parse_decimal("1e-30"), Err(DecimalParseError::Overflow { fractional_digits: 30 }));
        assert_eq!(parse_decimal("5e-29"), Err(DecimalParseError::Overflow { fractional_digits: 29 }));
        assert_eq!(parse_decimal("1E+40"), Err(DecimalParseError::Overflow { fractional_digits: 0 }));
        assert_eq!(
            parse_decimal("1e-99999999999999999999"),
            Err(DecimalParseError::Overflow {
                fractional_digits: i64::MAX as usize
            })
        );
        assert_eq!(parse_decimal("2.50E+1").unwrap(), dec("25"));
        assert_eq!(parse_decimal("0e-40").unwrap(), Decimal::ZERO);
    }

    #[test]
    fn test_parse_scientific_syntax_errors() {
        assert_eq!(parse_decimal("e5"), Err(DecimalParseError::NotNumeric));
        assert_eq!(parse_decimal("1e"), Err(DecimalParseError::NotNumeric));
        assert_eq!(parse_decimal("1e+"), Err(DecimalParseError::NotNumeric));
        assert_eq!(parse_decimal("1e2.5"), Err(DecimalParseError::NotNumeric));
        assert_eq!(parse_decimal("1e5e5"), Err(DecimalParseError::NotNumeric));
        assert_eq!(parse_decimal("x1e5"), Err(DecimalParseError::NotNumeric));
    }

    #[test]
    fn test_parse_zero_with_only_fractional_zeros() {
        assert_eq!(parse_decimal(".0").unwrap(), Decimal::ZERO);
        assert_eq!(parse_decimal("-.000").unwrap(), Decimal::ZERO);
    }

    #[test]
    fn test_parse_keeps_excess_precision_visible() {
        let value = parse_decimal("1.000000001").unwrap();
        assert_eq!(fractional_digits(value), 9);
    }

    #[test]
    fn test_parse_ignores_trailing_zeros() {
        let value = parse_decimal("0.100000000000000000000000000000000").unwrap();
        assert_eq!(value, dec("0.1"));
        assert_eq!(fractional_digits(value), 1);
    }

    #[test]
    fn test_parse_overflow_reports_fractional_length() {
        let err = parse_decimal("0.0000000000000000000000000000001").unwrap_err();
        assert_eq!(err, DecimalParseError::Overflow { fractional_digits: 31 });
    }

    #[test]
    fn test_quantize_uses_bankers_rounding() {
        assert_eq!(quantize(dec("0.000000005")).to_string(), "0.00000000");
        assert_eq!(quantize(dec("0.000000015")).to_string(), "0.00000002");
        assert_eq!(quantize(dec("0.000000025")).to_string(), "0.00000002");
        assert_eq!(quantize(dec("0.5")).to_string(), "0.50000000");
    }

    #[test]
    fn test_to_fixed_string_has_eight_places() {
        assert_eq!(to_fixed_string(Decimal::ONE), "1.00000000");
        assert_eq!(to_fixed_string(dec("-0")), "0.00000000");
        assert_eq!(zero().to_string(), "0.00000000");
    }

    #[test]
    fn test_fits_precision_limits_integer_digits() {
        assert!(fits_precision(dec("9999999999.99999999")));
        assert!(!fits_precision(dec("10000000000")));
        assert!(fits_precision(dec("-9999999999")));
    }

    #[test]
    fn test_unit_interval_is_inclusive() {
        assert!(in_unit_interval(Decimal::ZERO));
        assert!(in_unit_interval(Decimal::ONE));
        assert!(!in_unit_interval(dec("1.00000001")));
        assert!(!in_unit_interval(dec("-0.00000001")));
    }
}
