//! Value coercion: normalize heterogeneous database cell values to the two
//! shapes the rest of the pipeline needs — a sample's numeric value
//! (`f64`) and a label's string value.
//!
//! The SQL backend hands back cells as a tagged union rather than via
//! reflection (see the "Dynamic typing in Row Projection" design note) so
//! that the coercion rules below are a plain match, not driver-specific
//! type-switching.

use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDateTime, Utc};
use thiserror::Error;

/// One cell of a HANA result set, already decoded by the driver layer.
///
/// `Decimal` stands in for the arbitrary-precision value HANA returns for
/// `DECIMAL` columns. The original implementation this pipeline is modeled
/// on used Go's `math/big.Rat`; the Rust HANA driver surfaces the
/// equivalent HANA type as `bigdecimal::BigDecimal` instead, so the
/// "canonical p/q form" ToString rule becomes "canonical decimal string".
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Int64(i64),
    UInt64(u64),
    Float64(f64),
    Bytes(Vec<u8>),
    Text(String),
    Time(DateTime<Utc>),
    Decimal(BigDecimal),
}

/// Timestamp format shared by ToString, the timestamp-string fallback in
/// row projection, and the value-column timestamp check.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Error)]
pub enum CoerceError {
    #[error("destination pointer is nil")]
    NilDestination,
    #[error("could not parse {value:?} as a float or fraction")]
    NotNumeric { value: String },
    #[error("fraction {numerator}/{denominator} has a zero denominator")]
    ZeroDenominator { numerator: f64, denominator: f64 },
}

/// Rule 1–5 of ToFloat64 (spec.md §4.A). Never panics; callers that want
/// the "substitute 0.0 and warn" behavior should match on `Err` themselves
/// so the warning can carry metric/tenant context.
pub fn to_f64(value: &CellValue) -> Result<f64, CoerceError> {
    match value {
        CellValue::Null => Ok(0.0),
        CellValue::Int64(v) => Ok(*v as f64),
        CellValue::UInt64(v) => Ok(*v as f64),
        CellValue::Float64(v) => Ok(*v),
        CellValue::Bytes(b) => parse_fraction_or_float(&String::from_utf8_lossy(b)),
        CellValue::Text(s) => parse_fraction_or_float(s),
        CellValue::Decimal(d) => Ok(decimal_to_f64(d)),
        CellValue::Time(t) => parse_fraction_or_float(&t.format(TIMESTAMP_FORMAT).to_string()),
    }
}

/// Like [`to_f64`] but never fails — on any parse error it returns `0.0`
/// and leaves the warning to the caller via the returned flag, matching
/// the "substitute 0.0 and log a warning; the sample is still emitted"
/// rule. Returns `(value, had_error)`.
pub fn to_f64_or_zero(value: &CellValue) -> (f64, bool) {
    match to_f64(value) {
        Ok(v) => (v, false),
        Err(_) => (0.0, true),
    }
}

fn parse_fraction_or_float(raw: &str) -> Result<f64, CoerceError> {
    let trimmed = raw.trim();
    let slash_count = trimmed.matches('/').count();
    if slash_count == 1 {
        let mut parts = trimmed.splitn(2, '/');
        let numerator: f64 = parts
            .next()
            .unwrap()
            .trim()
            .parse()
            .map_err(|_| CoerceError::NotNumeric { value: raw.to_string() })?;
        let denominator: f64 = parts
            .next()
            .unwrap()
            .trim()
            .parse()
            .map_err(|_| CoerceError::NotNumeric { value: raw.to_string() })?;
        if denominator == 0.0 {
            return Err(CoerceError::ZeroDenominator { numerator, denominator });
        }
        return Ok(numerator / denominator);
    }
    trimmed
        .parse::<f64>()
        .map_err(|_| CoerceError::NotNumeric { value: raw.to_string() })
}

fn decimal_to_f64(d: &BigDecimal) -> f64 {
    // BigDecimal's Display is already the canonical decimal string; parsing
    // it back is the simplest correct widening that avoids pulling in the
    // num-traits ToPrimitive impl just for this one call site.
    d.to_string().parse().unwrap_or(0.0)
}

/// ToString (spec.md §4.A). Strings pass through unchanged; everything
/// else gets a canonical textual form.
pub fn to_string_lossy(value: &CellValue) -> String {
    match value {
        CellValue::Null => String::new(),
        CellValue::Text(s) => s.clone(),
        CellValue::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
        CellValue::Time(t) => t.format(TIMESTAMP_FORMAT).to_string(),
        CellValue::Decimal(d) => d.to_string(),
        CellValue::Int64(v) => v.to_string(),
        CellValue::UInt64(v) => v.to_string(),
        // Display, not Debug: Go's `%v` on a float64 prints the shortest
        // round-tripping form with no forced decimal point, same as Rust's
        // f64 Display (Debug always keeps the `.0`).
        CellValue::Float64(v) => format!("{v}"),
    }
}

/// Parses a timestamp formatted exactly as [`TIMESTAMP_FORMAT`], returning
/// Unix seconds. Used by row projection's value-column timestamp check.
pub fn parse_timestamp_seconds(raw: &str) -> Option<f64> {
    NaiveDateTime::parse_from_str(raw.trim(), TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| naive.and_utc().timestamp() as f64)
}

/// Scan-equivalent destination for a raw cell: the driver layer's answer to
/// the original implementation's custom `sql.Scanner`. Rather than
/// reflecting over arbitrary Go values, callers hand it an already-tagged
/// [`CellValue`] and it normalizes into an owned byte buffer, matching the
/// "%g with up to 17 significant digits" rule for decimals and the
/// passthrough rule for raw bytes.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RawCell(pub Vec<u8>);

impl RawCell {
    /// Mirrors the original `PlainData.Scan`: decimals render with up to 17
    /// significant digits, byte sequences are copied verbatim, and
    /// everything else falls back to the same formatting ToString uses for
    /// numbers. `dest` standing in for a nil destination pointer is the one
    /// documented failure mode.
    pub fn scan(dest: Option<&mut RawCell>, src: &CellValue) -> Result<(), CoerceError> {
        let dest = dest.ok_or(CoerceError::NilDestination)?;
        dest.0 = match src {
            CellValue::Decimal(d) => format_significant(d).into_bytes(),
            CellValue::Bytes(b) => b.clone(),
            other => to_string_lossy(other).into_bytes(),
        };
        Ok(())
    }
}

fn format_significant(d: &BigDecimal) -> String {
    // Go's `%g` with 17 significant digits picks whichever of %e/%f is
    // shorter; Rust's default f64 Display already produces the shortest
    // round-tripping decimal representation, which is a close match.
    format!("{}", decimal_to_f64(d))
}
