//! Scalar type inference for untyped text fields.
//!
//! Every field in the intermediate file is text. Before it is loaded into the
//! staging table it is classified, first success wins:
//!
//! 1. numeric: whole values stay integers, fractional values are rounded to
//!    the nearest integer (half to even). Decimals are collapsed to whole
//!    numbers on purpose, the staging tables only hold whole amounts.
//! 2. ISO-8601 date or date-time: rendered as `'YYYY/MM/DD'`, the time part
//!    is dropped.
//! 3. anything else: the text unchanged.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::fmt;
use std::str::FromStr;

/// Kind assigned to a field by [`classify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Integer,
    Decimal,
    Date,
    String,
}

/// A classified field value. Never persisted, re-derived on every load.
#[derive(Debug, Clone, PartialEq)]
pub enum InferredValue {
    /// Numeric token with no fractional part.
    Integer(i64),

    /// Numeric token with a fractional part, and its rounded value.
    Decimal { value: Decimal, rounded: i64 },

    /// ISO-8601 date or date-time (date part only).
    Date(NaiveDate),

    /// Opaque text.
    Text(String),
}

impl InferredValue {
    pub fn kind(&self) -> FieldKind {
        match self {
            InferredValue::Integer(_) => FieldKind::Integer,
            InferredValue::Decimal { .. } => FieldKind::Decimal,
            InferredValue::Date(_) => FieldKind::Date,
            InferredValue::Text(_) => FieldKind::String,
        }
    }

    /// Integer value loaded for numeric fields.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            InferredValue::Integer(n) => Some(*n),
            InferredValue::Decimal { rounded, .. } => Some(*rounded),
            _ => None,
        }
    }

    /// SQL literal text: numbers unquoted, dates as `'YYYY/MM/DD'`, text
    /// quoted as-is.
    ///
    /// Embedded quotes are NOT escaped. The literal form is only used for
    /// logs and dry runs; statements sent to the server bind the value.
    pub fn render_literal(&self) -> String {
        match self {
            InferredValue::Integer(n) => n.to_string(),
            InferredValue::Decimal { rounded, .. } => rounded.to_string(),
            InferredValue::Date(d) => format!("'{}'", d.format("%Y/%m/%d")),
            InferredValue::Text(s) => format!("'{}'", s),
        }
    }
}

impl fmt::Display for InferredValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render_literal())
    }
}

/// Classify a text token. Never fails: a failed attempt falls through to the
/// next classification.
pub fn classify(token: &str) -> InferredValue {
    if let Some(value) = parse_number(token) {
        return value;
    }
    if let Some(date) = parse_date(token) {
        return InferredValue::Date(date);
    }
    InferredValue::Text(token.to_string())
}

/// Classify a token and render it as a SQL literal.
pub fn classify_and_render(token: &str) -> String {
    classify(token).render_literal()
}

fn parse_number(token: &str) -> Option<InferredValue> {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return None;
    }

    let value = Decimal::from_str(trimmed)
        .or_else(|_| Decimal::from_scientific(trimmed))
        .ok()?;

    if value.fract().is_zero() {
        return value.to_i64().map(InferredValue::Integer);
    }

    // Decimal::round is banker's rounding: 2.5 -> 2, 3.5 -> 4
    let rounded = value.round().to_i64()?;
    Some(InferredValue::Decimal { value, rounded })
}

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

const DATETIME_OFFSET_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%:z"];

fn parse_date(token: &str) -> Option<NaiveDate> {
    if let Ok(date) = NaiveDate::parse_from_str(token, "%Y-%m-%d") {
        return Some(date);
    }

    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(token, format) {
            return Some(dt.date());
        }
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(token) {
        return Some(dt.date_naive());
    }

    DATETIME_OFFSET_FORMATS
        .iter()
        .find_map(|format| DateTime::parse_from_str(token, format).ok())
        .map(|dt| dt.date_naive())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_tokens_render_unquoted() {
        assert_eq!(classify_and_render("1"), "1");
        assert_eq!(classify_and_render("-42"), "-42");
        assert_eq!(classify_and_render("0"), "0");
        assert_eq!(classify("1").kind(), FieldKind::Integer);
    }

    #[test]
    fn test_whole_decimal_is_integer() {
        assert_eq!(classify("10.00"), InferredValue::Integer(10));
        assert_eq!(classify("1e3"), InferredValue::Integer(1000));
        assert_eq!(classify(" 7 "), InferredValue::Integer(7));
    }

    #[test]
    fn test_decimal_rounds_half_to_even() {
        assert_eq!(classify_and_render("2.4"), "2");
        assert_eq!(classify_and_render("2.5"), "2");
        assert_eq!(classify_and_render("3.5"), "4");
        assert_eq!(classify_and_render("2.6"), "3");
        assert_eq!(classify_and_render("-1.7"), "-2");

        let value = classify("19.99");
        assert_eq!(value.kind(), FieldKind::Decimal);
        assert_eq!(value.as_integer(), Some(20));
    }

    #[test]
    fn test_iso_date_renders_slashed_and_quoted() {
        assert_eq!(classify_and_render("2023-07-04"), "'2023/07/04'");
        assert_eq!(classify("2023-07-04").kind(), FieldKind::Date);
    }

    #[test]
    fn test_datetime_drops_time_part() {
        assert_eq!(classify_and_render("2023-07-04 10:20:30"), "'2023/07/04'");
        assert_eq!(classify_and_render("2023-07-04T10:20:30.123"), "'2023/07/04'");
        assert_eq!(classify_and_render("2023-07-04T23:59:00+02:00"), "'2023/07/04'");
    }

    #[test]
    fn test_invalid_date_falls_through_to_string() {
        assert_eq!(classify_and_render("2023-13-45"), "'2023-13-45'");
    }

    #[test]
    fn test_other_tokens_are_quoted_unchanged() {
        assert_eq!(classify_and_render("Widget A"), "'Widget A'");
        assert_eq!(classify_and_render(""), "''");
        assert_eq!(classify_and_render("NaN"), "'NaN'");
        assert_eq!(classify("True").kind(), FieldKind::String);
    }

    #[test]
    fn test_embedded_quotes_are_not_escaped() {
        assert_eq!(classify_and_render("O'Brien"), "'O'Brien'");
    }

    #[test]
    fn test_out_of_range_integer_falls_through() {
        let token = "99999999999999999999";
        assert_eq!(classify(token), InferredValue::Text(token.to_string()));
    }
}
