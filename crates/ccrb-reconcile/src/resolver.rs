//! The ordered missing-value resolution rules.
//!
//! Five rules run in a fixed order: column elimination, semantic
//! substitution, explicit sentinel, per-group carry-forward, and row
//! elimination as the fallback. Configuration validation guarantees a
//! column is claimed by at most one of rules 1-4, so the order never
//! has to arbitrate between rules. Afterward the table holds zero
//! missing values, and every touched value is counted in the audits.
//!
//! "No penalty" (rule 2) and "Missing" (rule 3) stay distinct labels:
//! the first asserts a domain fact, the second preserves ignorance as
//! its own category.

use polars::prelude::*;
use tracing::debug;

use crate::config::PipelineConfig;
use crate::error::{ReconcileError, Result, ResultExt};
use crate::types::{ColumnAudit, ResolutionRule};
use crate::utils;

/// What the resolver produced: the null-free frame, the per-column
/// audits, and the number of rows the fallback eliminated.
#[derive(Debug)]
pub struct ResolutionOutcome {
    pub df: DataFrame,
    pub audits: Vec<ColumnAudit>,
    pub rows_eliminated: usize,
}

/// Applies the missing-value policy to the filtered join product.
pub struct MissingValueResolver;

impl MissingValueResolver {
    /// Runs all five rules in order and verifies the zero-missingness
    /// postcondition.
    pub fn resolve(df: DataFrame, config: &PipelineConfig) -> Result<ResolutionOutcome> {
        let mut audits = Vec::new();
        let df = Self::eliminate_columns(df, config, &mut audits);
        let df = Self::substitute_semantic(df, config, &mut audits)?;
        let df = Self::fill_sentinels(df, config, &mut audits)?;
        let df = Self::carry_forward(df, config, &mut audits)?;
        let (df, rows_eliminated) = Self::eliminate_rows(df, &mut audits)?;
        Self::verify_no_missing(&df)?;
        Ok(ResolutionOutcome {
            df,
            audits,
            rows_eliminated,
        })
    }

    /// Rule 1: drop the configured columns outright. Configured columns
    /// absent from this frame are skipped.
    pub fn eliminate_columns(
        df: DataFrame,
        config: &PipelineConfig,
        audits: &mut Vec<ColumnAudit>,
    ) -> DataFrame {
        let mut drops: Vec<PlSmallStr> = Vec::new();
        for name in &config.eliminated_columns {
            if let Ok(column) = df.column(name) {
                audits.push(
                    ColumnAudit::new(name.clone(), ResolutionRule::ColumnEliminated, column.len())
                        .with_note(format!(
                            "{} of {} values were missing",
                            column.null_count(),
                            column.len()
                        )),
                );
                drops.push(name.as_str().into());
            }
        }
        if drops.is_empty() {
            return df;
        }
        debug!("Eliminated {} columns", drops.len());
        df.drop_many(drops)
    }

    /// Rule 2: replace missing values with a domain label, recording the
    /// configured rationale in the audit.
    pub fn substitute_semantic(
        mut df: DataFrame,
        config: &PipelineConfig,
        audits: &mut Vec<ColumnAudit>,
    ) -> Result<DataFrame> {
        for sub in &config.semantic_substitutions {
            if let Ok(column) = df.column(&sub.column) {
                let series = column.as_materialized_series();
                let nulls = series.null_count();
                if nulls == 0 {
                    continue;
                }
                if series.dtype() != &DataType::String {
                    return Err(ReconcileError::ResolutionFailed {
                        column: sub.column.clone(),
                        reason: format!(
                            "semantic substitution needs a string column, found {}",
                            series.dtype()
                        ),
                    });
                }
                let filled = utils::fill_string_nulls(series, &sub.replacement)?;
                df.replace(&sub.column, filled)?;
                audits.push(
                    ColumnAudit::new(sub.column.clone(), ResolutionRule::SemanticSubstitution, nulls)
                        .with_note(sub.rationale.clone()),
                );
            }
        }
        Ok(df)
    }

    /// Rule 3: fill missing values with the explicit unknown sentinel,
    /// kept as a first-class category ("Missing" for strings, the
    /// configured integer for integer columns).
    pub fn fill_sentinels(
        mut df: DataFrame,
        config: &PipelineConfig,
        audits: &mut Vec<ColumnAudit>,
    ) -> Result<DataFrame> {
        for name in &config.sentinel_columns {
            if let Ok(column) = df.column(name) {
                let series = column.as_materialized_series();
                let nulls = series.null_count();
                if nulls == 0 {
                    continue;
                }
                let filled = match series.dtype() {
                    DataType::String => utils::fill_string_nulls(series, &config.sentinel_label)?,
                    dtype if utils::is_integer_dtype(dtype) => {
                        utils::fill_int_nulls(series, config.numeric_sentinel)?
                    }
                    dtype => {
                        return Err(ReconcileError::ResolutionFailed {
                            column: name.clone(),
                            reason: format!("no sentinel form for dtype {dtype}"),
                        });
                    }
                };
                df.replace(name, filled)?;
                audits.push(ColumnAudit::new(
                    name.clone(),
                    ResolutionRule::MissingSentinel,
                    nulls,
                ));
            }
        }
        Ok(df)
    }

    /// Rule 4: forward-fill each configured column within its complaint
    /// group. The fill follows row order inside each group and never
    /// crosses group boundaries, whether or not groups are contiguous;
    /// overall row order is unchanged.
    pub fn carry_forward(
        df: DataFrame,
        config: &PipelineConfig,
        audits: &mut Vec<ColumnAudit>,
    ) -> Result<DataFrame> {
        let targets: Vec<String> = config
            .carry_forward_columns
            .iter()
            .filter(|name| df.column(name).is_ok())
            .cloned()
            .collect();
        if targets.is_empty() {
            return Ok(df);
        }
        if df.column(&config.group_key).is_err() {
            return Err(ReconcileError::MissingColumn {
                column: config.group_key.clone(),
                table: "joined".to_string(),
            });
        }

        let nulls_before: Vec<usize> = targets
            .iter()
            .map(|name| df.column(name).map(|c| c.null_count()).unwrap_or(0))
            .collect();

        let mut lf = df.lazy();
        for name in &targets {
            lf = lf.with_column(
                col(name.as_str())
                    .forward_fill(None)
                    .over([col(config.group_key.as_str())])
                    .alias(name.as_str()),
            );
        }
        let filled = lf
            .collect()
            .context("carry-forward fill over complaint groups")?;

        for (name, before) in targets.iter().zip(nulls_before) {
            let after = filled.column(name)?.null_count();
            let affected = before.saturating_sub(after);
            if affected > 0 {
                audits.push(ColumnAudit::new(
                    name.clone(),
                    ResolutionRule::CarryForward,
                    affected,
                ));
            }
        }
        Ok(filled)
    }

    /// Rule 5: drop every row still holding a null in any column. The
    /// residual null count of each column is audited, and the dropped
    /// rows are counted so the books balance.
    pub fn eliminate_rows(
        df: DataFrame,
        audits: &mut Vec<ColumnAudit>,
    ) -> Result<(DataFrame, usize)> {
        let before = df.height();
        let mut keep = vec![true; before];
        let mut any_nulls = false;

        for column in df.get_columns() {
            let nulls = column.null_count();
            if nulls == 0 {
                continue;
            }
            any_nulls = true;
            audits.push(ColumnAudit::new(
                column.name().to_string(),
                ResolutionRule::RowElimination,
                nulls,
            ));
            let null_mask = column.as_materialized_series().is_null();
            for i in 0..before {
                if null_mask.get(i).unwrap_or(false) {
                    keep[i] = false;
                }
            }
        }
        if !any_nulls {
            return Ok((df, 0));
        }

        let mask = BooleanChunked::from_slice("mask".into(), &keep);
        let kept = df.filter(&mask)?;
        let eliminated = before.saturating_sub(kept.height());
        debug!("Row elimination dropped {} of {} rows", eliminated, before);
        Ok((kept, eliminated))
    }

    /// The postcondition: no column may hold a null after resolution.
    pub fn verify_no_missing(df: &DataFrame) -> Result<()> {
        for column in df.get_columns() {
            let nulls = column.null_count();
            if nulls > 0 {
                return Err(ReconcileError::ResolutionFailed {
                    column: column.name().to_string(),
                    reason: format!("{nulls} missing values remain after resolution"),
                });
            }
        }
        Ok(())
    }
}
