//! Coercion of raw header cells into typed header fields

use rating_common::fixed;
use rating_common::models::{HeaderId, Market, NewHeader, Origin};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::normalizer::HeaderFields;

pub const INSTRUMENT_MAX_CHARS: usize = 100;
pub const CAPITAL_EVENT_MAX_CHARS: usize = 100;
pub const DESCRIPTION_MAX_CHARS: usize = 255;
pub const NOTE_MAX_CHARS: usize = 255;

/// A header cell that cannot become a typed value
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct CoercionError {
    pub field: &'static str,
    pub message: String,
}

impl CoercionError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Coerce every header cell; the first failing field is reported
pub fn coerce_header(fields: &HeaderFields) -> Result<NewHeader, CoercionError> {
    Ok(NewHeader {
        market: fields
            .market
            .parse::<Market>()
            .map_err(|e| CoercionError::new("market", e))?,
        origin: Origin::parse_optional(&fields.origin).map_err(|e| CoercionError::new("origin", e))?,
        instrument: required_text("instrument", &fields.instrument, INSTRUMENT_MAX_CHARS)?,
        capital_event: required_text("capital_event", &fields.capital_event, CAPITAL_EVENT_MAX_CHARS)?,
        historical_value: fixed_18_8("historical_value", &fields.historical_value)?,
        payment_date: rating_common::time::parse_date(&fields.payment_date)
            .ok_or_else(|| CoercionError::new("payment_date", format!("invalid date '{}'", fields.payment_date.trim())))?,
        event_sequence: non_negative("event_sequence", &fields.event_sequence)?,
        fiscal_year: non_negative("fiscal_year", &fields.fiscal_year)?,
        update_factor: fixed_18_8("update_factor", &fields.update_factor)?,
        is_future_settlement: flag("is_future_settlement", &fields.is_future_settlement)?,
        entered_by_amounts: flag("entered_by_amounts", &fields.entered_by_amounts)?,
        description: optional_text("description", &fields.description, DESCRIPTION_MAX_CHARS)?,
    })
}

/// Header id for update mode: must be present and a positive integer
pub fn coerce_header_id(raw: Option<&str>) -> Result<HeaderId, CoercionError> {
    let text = raw.map(str::trim).unwrap_or("");
    if text.is_empty() {
        return Err(CoercionError::new("header_id", "required in update mode"));
    }
    match text.parse::<HeaderId>() {
        Ok(id) if id.0 > 0 => Ok(id),
        _ => Err(CoercionError::new("header_id", format!("invalid id '{}'", text))),
    }
}

pub fn check_note(note: &str) -> Result<(), CoercionError> {
    check_length("factor_note", note, NOTE_MAX_CHARS)
}

fn check_length(field: &'static str, text: &str, max: usize) -> Result<(), CoercionError> {
    let chars = text.chars().count();
    if chars > max {
        return Err(CoercionError::new(
            field,
            format!("{} characters exceeds the limit of {}", chars, max),
        ));
    }
    Ok(())
}

fn required_text(field: &'static str, raw: &str, max: usize) -> Result<String, CoercionError> {
    let text = raw.trim();
    if text.is_empty() {
        return Err(CoercionError::new(field, "required"));
    }
    check_length(field, text, max)?;
    Ok(text.to_string())
}

fn optional_text(field: &'static str, raw: &str, max: usize) -> Result<String, CoercionError> {
    let text = raw.trim();
    check_length(field, text, max)?;
    Ok(text.to_string())
}

/// Blank reads as zero; otherwise exact (18, 8)
fn fixed_18_8(field: &'static str, raw: &str) -> Result<Decimal, CoercionError> {
    if raw.trim().is_empty() {
        return Ok(fixed::zero());
    }

    let value = fixed::parse_decimal(raw).map_err(|e| CoercionError::new(field, e.to_string()))?;
    if fixed::fractional_digits(value) > fixed::FIXED_SCALE {
        return Err(CoercionError::new(
            field,
            format!("more than {} decimal places", fixed::FIXED_SCALE),
        ));
    }
    if !fixed::fits_precision(value) {
        return Err(CoercionError::new(
            field,
            format!("more than {} total digits", fixed::FIXED_PRECISION),
        ));
    }
    Ok(fixed::quantize(value))
}

fn non_negative(field: &'static str, raw: &str) -> Result<u32, CoercionError> {
    let text = raw.trim();
    text.parse::<u32>()
        .map_err(|_| CoercionError::new(field, format!("expected a non-negative integer, got '{}'", text)))
}

fn flag(field: &'static str, raw: &str) -> Result<bool, CoercionError> {
    match raw.trim().to_lowercase().as_str() {
        "" | "0" | "false" | "f" | "no" | "n" => Ok(false),
        "1" | "true" | "t" | "yes" | "y" | "si" | "sí" | "x" => Ok(true),
        other => Err(CoercionError::new(field, format!("expected a boolean, got '{}'", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn fields() -> HeaderFields {
        HeaderFields {
            market: "acciones".to_string(),
            origin: "".to_string(),
            instrument: " CHILE ".to_string(),
            capital_event: "DIV".to_string(),
            historical_value: "100.5".to_string(),
            payment_date: "15/05/2024".to_string(),
            event_sequence: "3".to_string(),
            fiscal_year: "2024".to_string(),
            update_factor: "".to_string(),
            is_future_settlement: "Sí".to_string(),
            entered_by_amounts: "".to_string(),
            description: "".to_string(),
        }
    }

    #[test]
    fn test_coerce_valid_header() {
        let header = coerce_header(&fields()).unwrap();
        assert_eq!(header.market, Market::Equity);
        assert_eq!(header.origin, None);
        assert_eq!(header.instrument, "CHILE");
        assert_eq!(header.historical_value.to_string(), "100.50000000");
        assert_eq!(header.payment_date, NaiveDate::from_ymd_opt(2024, 5, 15).unwrap());
        assert_eq!(header.update_factor.to_string(), "0.00000000");
        assert!(header.is_future_settlement);
        assert!(!header.entered_by_amounts);
    }

    fn failing_field(mutate: impl FnOnce(&mut HeaderFields)) -> &'static str {
        let mut input = fields();
        mutate(&mut input);
        coerce_header(&input).unwrap_err().field
    }

    #[test]
    fn test_coercion_failures_name_the_field() {
        assert_eq!(failing_field(|f| f.market = "STOCKS".into()), "market");
        assert_eq!(failing_field(|f| f.origin = "bank".into()), "origin");
        assert_eq!(failing_field(|f| f.instrument = "  ".into()), "instrument");
        assert_eq!(failing_field(|f| f.capital_event = "".into()), "capital_event");
        assert_eq!(failing_field(|f| f.instrument = "x".repeat(101)), "instrument");
        assert_eq!(failing_field(|f| f.historical_value = "12345678901".into()), "historical_value");
        assert_eq!(failing_field(|f| f.historical_value = "1.123456789".into()), "historical_value");
        assert_eq!(failing_field(|f| f.payment_date = "2024-13-01".into()), "payment_date");
        assert_eq!(failing_field(|f| f.event_sequence = "-1".into()), "event_sequence");
        assert_eq!(failing_field(|f| f.fiscal_year = "two".into()), "fiscal_year");
        assert_eq!(failing_field(|f| f.is_future_settlement = "maybe".into()), "is_future_settlement");
        assert_eq!(failing_field(|f| f.description = "d".repeat(256)), "description");
    }

    #[test]
    fn test_length_limits_count_characters() {
        let mut input = fields();
        input.instrument = "ñ".repeat(100);
        assert!(coerce_header(&input).is_ok());
        assert!(check_note(&"é".repeat(255)).is_ok());
        assert!(check_note(&"é".repeat(256)).is_err());
    }

    #[test]
    fn test_header_id_for_update() {
        assert_eq!(coerce_header_id(Some(" 42 ")).unwrap(), HeaderId(42));
        assert_eq!(coerce_header_id(None).unwrap_err().field, "header_id");
        assert!(coerce_header_id(Some("")).is_err());
        assert!(coerce_header_id(Some("0")).is_err());
        assert!(coerce_header_id(Some("abc")).is_err());
    }
}
