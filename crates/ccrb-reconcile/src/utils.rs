//! Shared utilities for the reconciliation pipeline.
//!
//! Date parsing, series construction, and null-filling helpers used by
//! the normalizer and the resolver.

use chrono::NaiveDate;
use polars::prelude::*;

use crate::error::Result;

// =============================================================================
// Data Type Utilities
// =============================================================================

/// Checks if a dtype is any integer type.
#[inline]
pub fn is_integer_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
    )
}

/// Checks if a dtype is the calendar date type.
#[inline]
pub fn is_date_dtype(dtype: &DataType) -> bool {
    matches!(dtype, DataType::Date)
}

/// Checks if a string is empty or whitespace-only.
#[inline]
pub fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

// =============================================================================
// Date Utilities
// =============================================================================

/// Parses a US-format date string (MM/DD/YYYY). Returns `None` for blank
/// or unparseable input; the caller records the miss, it is never an error.
pub fn parse_us_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    NaiveDate::parse_from_str(trimmed, "%m/%d/%Y").ok()
}

/// Days since the Unix epoch, the physical representation of a Date value.
pub fn days_since_epoch(date: NaiveDate) -> i32 {
    date.signed_duration_since(NaiveDate::default()).num_days() as i32
}

/// Builds a Date series from parsed calendar dates, `None` becoming null.
pub fn date_series(name: &str, values: &[Option<NaiveDate>]) -> Series {
    let days: Int32Chunked = values.iter().map(|v| v.map(days_since_epoch)).collect();
    let mut series = days.into_date().into_series();
    series.rename(name.into());
    series
}

// =============================================================================
// Null Filling Utilities
// =============================================================================

/// Replaces nulls in a string series with a fixed label.
pub fn fill_string_nulls(series: &Series, value: &str) -> Result<Series> {
    let ca = series.str()?;
    let filled: StringChunked = ca.iter().map(|v| Some(v.unwrap_or(value))).collect();
    let mut out = filled.into_series();
    out.rename(series.name().clone());
    Ok(out)
}

/// Replaces nulls in an integer series with a fixed sentinel, widening to
/// Int64 so one sentinel value fits every integer column.
pub fn fill_int_nulls(series: &Series, value: i64) -> Result<Series> {
    let widened = series.cast(&DataType::Int64)?;
    let ca = widened.i64()?;
    let filled: Int64Chunked = ca.iter().map(|v| Some(v.unwrap_or(value))).collect();
    let mut out = filled.into_series();
    out.rename(series.name().clone());
    Ok(out)
}

// =============================================================================
// Tests
// =============================================================================
