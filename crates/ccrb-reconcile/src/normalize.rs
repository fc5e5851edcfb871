//! Schema normalization: canonical column names, blank-string handling,
//! and US-format date parsing with explicit unknown markers.
//!
//! Runs before anything else so every later stage can rely on canonical
//! names, typed date columns, and the blank-to-null invariant. The whole
//! stage is idempotent: normalizing an already-normalized table changes
//! nothing and records nothing.

use once_cell::sync::Lazy;
use polars::prelude::*;
use regex::Regex;
use tracing::debug;

use crate::error::{ReconcileError, Result};
use crate::schema::TableKind;
use crate::types::{ColumnAudit, ResolutionRule};
use crate::utils;

static SEPARATOR_RUNS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[ ._/\-]+").expect("Invalid regex: separator runs"));

/// Normalizes raw input tables into the canonical schema.
pub struct SchemaNormalizer;

impl SchemaNormalizer {
    /// Canonical form of one raw column header: lowercased, separator
    /// runs collapsed to a single underscore, edges trimmed.
    pub fn canonical_name(raw: &str) -> String {
        let lowered = raw.trim().to_lowercase();
        let collapsed = SEPARATOR_RUNS.replace_all(&lowered, "_");
        collapsed.trim_matches('_').to_string()
    }

    /// Normalizes one table: canonical headers, blank strings to null,
    /// declared date columns parsed from MM/DD/YYYY. Returns the new
    /// frame plus audit entries for every value the stage touched.
    pub fn normalize(df: DataFrame, table: TableKind) -> Result<(DataFrame, Vec<ColumnAudit>)> {
        if df.width() == 0 {
            return Err(ReconcileError::EmptyTable(table.name().to_string()));
        }
        debug!(
            "Normalizing table '{}' ({} columns, {} rows)",
            table.name(),
            df.width(),
            df.height()
        );

        let df = Self::canonicalize_headers(df)?;
        let (df, mut audits) = Self::normalize_blanks(df)?;
        let (df, date_audits) = Self::parse_date_columns(df, table)?;
        audits.extend(date_audits);
        Ok((df, audits))
    }

    fn canonicalize_headers(mut df: DataFrame) -> Result<DataFrame> {
        let canonical: Vec<String> = df
            .get_column_names()
            .iter()
            .map(|name| Self::canonical_name(name.as_str()))
            .collect();
        // Duplicate canonical names (two raw headers collapsing to one)
        // surface here as a column-name clash.
        df.set_column_names(canonical)?;
        Ok(df)
    }

    /// Turns empty and whitespace-only strings into null and trims the
    /// rest, so missingness counting never sees a disguised blank.
    fn normalize_blanks(mut df: DataFrame) -> Result<(DataFrame, Vec<ColumnAudit>)> {
        let names: Vec<String> = df
            .get_column_names()
            .into_iter()
            .map(|s| s.to_string())
            .collect();
        let mut audits = Vec::new();

        for name in &names {
            let column = df.column(name)?;
            if column.dtype() != &DataType::String {
                continue;
            }
            let ca = column.str()?;
            let mut values: Vec<Option<String>> = Vec::with_capacity(ca.len());
            let mut blanked = 0usize;
            for opt_val in ca.into_iter() {
                match opt_val {
                    Some(val) if utils::is_blank(val) => {
                        values.push(None);
                        blanked += 1;
                    }
                    Some(val) => values.push(Some(val.trim().to_string())),
                    None => values.push(None),
                }
            }
            df.replace(name, Series::new(name.as_str().into(), values))?;
            if blanked > 0 {
                audits.push(ColumnAudit::new(
                    name.clone(),
                    ResolutionRule::BlankNormalized,
                    blanked,
                ));
            }
        }
        Ok((df, audits))
    }

    /// Parses each declared date column from MM/DD/YYYY strings into a
    /// Date column. Unparseable values become null and are counted, never
    /// an error; a column already of Date dtype is left untouched.
    fn parse_date_columns(
        mut df: DataFrame,
        table: TableKind,
    ) -> Result<(DataFrame, Vec<ColumnAudit>)> {
        let mut audits = Vec::new();

        for &name in table.date_columns() {
            let dtype = match df.column(name) {
                Ok(column) => column.dtype().clone(),
                Err(_) => {
                    return Err(ReconcileError::MissingColumn {
                        column: name.to_string(),
                        table: table.name().to_string(),
                    });
                }
            };
            if utils::is_date_dtype(&dtype) {
                continue;
            }
            if dtype != DataType::String {
                return Err(ReconcileError::InvalidDateColumn {
                    column: name.to_string(),
                    dtype: format!("{dtype}"),
                });
            }

            let ca = df.column(name)?.str()?;
            let mut values = Vec::with_capacity(ca.len());
            let mut unparseable = 0usize;
            for opt_val in ca.into_iter() {
                match opt_val {
                    Some(raw) => {
                        let parsed = utils::parse_us_date(raw);
                        if parsed.is_none() {
                            unparseable += 1;
                        }
                        values.push(parsed);
                    }
                    None => values.push(None),
                }
            }
            df.replace(name, utils::date_series(name, &values))?;
            if unparseable > 0 {
                audits.push(ColumnAudit::new(name, ResolutionRule::UnknownDate, unparseable));
            }
        }
        Ok((df, audits))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_canonical_name() {
        assert_eq!(SchemaNormalizer::canonical_name("Complaint Id"), "complaint_id");
        assert_eq!(SchemaNormalizer::canonical_name("Tax ID"), "tax_id");
        assert_eq!(SchemaNormalizer::canonical_name("As Of Date"), "as_of_date");
        assert_eq!(
            SchemaNormalizer::canonical_name("Borough.Of-Incident/Occurrence"),
            "borough_of_incident_occurrence"
        );
        assert_eq!(SchemaNormalizer::canonical_name("  CCRB   Received Date "), "ccrb_received_date");
        assert_eq!(SchemaNormalizer::canonical_name("Tax ID."), "tax_id");
    }

    #[test]
    fn test_canonical_name_is_idempotent() {
        for raw in ["Complaint Id", "allegation_record_identity", "FADO Type"] {
            let once = SchemaNormalizer::canonical_name(raw);
            assert_eq!(SchemaNormalizer::canonical_name(&once), once);
        }
    }

    #[test]
    fn test_normalize_renames_blanks_and_dates() {
        let df = df!(
            "As Of Date" => &["01/01/2023", "01/01/2023", "01/01/2023"],
            "Complaint Id" => &[1i64, 2, 3],
            "FADO Type" => &["Force", "", "   "],
        )
        .unwrap();

        let (out, audits) = SchemaNormalizer::normalize(df, TableKind::Allegations).unwrap();

        assert_eq!(
            out.get_column_names()
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>(),
            vec!["as_of_date", "complaint_id", "fado_type"]
        );
        assert_eq!(out.column("as_of_date").unwrap().dtype(), &DataType::Date);
        assert_eq!(out.column("fado_type").unwrap().null_count(), 2);

        let blank_audit = audits
            .iter()
            .find(|a| a.rule == ResolutionRule::BlankNormalized)
            .unwrap();
        assert_eq!(blank_audit.column, "fado_type");
        assert_eq!(blank_audit.values_affected, 2);
    }

    #[test]
    fn test_unparseable_dates_become_null_with_audit() {
        let df = df!(
            "As Of Date" => &["01/01/2023", "not a date", "13/45/2023", "02/29/2024"],
            "Complaint Id" => &[1i64, 2, 3, 4],
        )
        .unwrap();

        let (out, audits) = SchemaNormalizer::normalize(df, TableKind::Allegations).unwrap();
        assert_eq!(out.column("as_of_date").unwrap().null_count(), 2);

        let date_audit = audits
            .iter()
            .find(|a| a.rule == ResolutionRule::UnknownDate)
            .unwrap();
        assert_eq!(date_audit.column, "as_of_date");
        assert_eq!(date_audit.values_affected, 2);
    }

    #[test]
    fn test_blank_date_counts_as_blank_not_unparseable() {
        let df = df!(
            "As Of Date" => &["01/01/2023", ""],
            "Complaint Id" => &[1i64, 2],
        )
        .unwrap();

        let (out, audits) = SchemaNormalizer::normalize(df, TableKind::Allegations).unwrap();
        assert_eq!(out.column("as_of_date").unwrap().null_count(), 1);
        assert!(audits.iter().any(|a| a.rule == ResolutionRule::BlankNormalized));
        assert!(!audits.iter().any(|a| a.rule == ResolutionRule::UnknownDate));
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let df = df!(
            "As Of Date" => &["01/01/2023", "bad", ""],
            "Officer Command At Incident" => &["075 PCT", " 075 PCT ", ""],
            "Complaint Id" => &[1i64, 2, 3],
        )
        .unwrap();

        let (once, _) = SchemaNormalizer::normalize(df, TableKind::Allegations).unwrap();
        let (twice, audits) = SchemaNormalizer::normalize(once.clone(), TableKind::Allegations).unwrap();
        assert_eq!(once, twice);
        assert!(audits.is_empty());
    }

    #[test]
    fn test_missing_date_column_is_fatal() {
        let df = df!("Complaint Id" => &[1i64, 2]).unwrap();
        let err = SchemaNormalizer::normalize(df, TableKind::Allegations).unwrap_err();
        assert_eq!(err.error_code(), "MISSING_COLUMN");
        assert!(err.to_string().contains("as_of_date"));
    }

    #[test]
    fn test_non_string_date_column_is_fatal() {
        let df = df!(
            "As Of Date" => &[20230101i64, 20230102],
            "Complaint Id" => &[1i64, 2],
        )
        .unwrap();
        let err = SchemaNormalizer::normalize(df, TableKind::Allegations).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_DATE_COLUMN");
    }
}
