//! Feature projection: the final shape of the output table.
//!
//! Selects the configured source columns under their feature names, in
//! the configured order, casts the categorical features, and sorts the
//! rows deterministically. Row count never changes here.

use polars::prelude::*;
use tracing::debug;

use crate::config::PipelineConfig;
use crate::error::{ReconcileError, Result, ResultExt};

fn categorical_dtype() -> DataType {
    DataType::from_categories(Categories::global())
}

/// Projects the resolved table onto the configured feature set.
pub struct FeatureProjector;

impl FeatureProjector {
    /// Selects, renames, types, and orders the output columns. Every
    /// configured source must be present in the frame.
    pub fn project(df: DataFrame, config: &PipelineConfig) -> Result<DataFrame> {
        let missing: Vec<&str> = config
            .feature_columns
            .iter()
            .filter(|feature| df.column(&feature.source).is_err())
            .map(|feature| feature.source.as_str())
            .collect();
        if !missing.is_empty() {
            return Err(ReconcileError::ProjectionFailed(format!(
                "source columns not present: {}",
                missing.join(", ")
            )));
        }

        let categorical = categorical_dtype();
        let exprs: Vec<Expr> = config
            .feature_columns
            .iter()
            .map(|feature| {
                let expr = col(feature.source.as_str());
                let expr = if config.categorical_columns.contains(&feature.name) {
                    expr.cast(categorical.clone())
                } else {
                    expr
                };
                expr.alias(feature.name.as_str())
            })
            .collect();

        let by: Vec<PlSmallStr> = config
            .sort_columns
            .iter()
            .map(|name| name.as_str().into())
            .collect();
        let sort_options = SortMultipleOptions::new().with_maintain_order(true);

        let lf = df.lazy().select(exprs);
        let lf = if by.is_empty() {
            lf
        } else {
            lf.sort(by, sort_options)
        };
        let projected = lf.collect().context("feature projection")?;
        debug!(
            "Projected {} features over {} rows",
            projected.width(),
            projected.height()
        );
        Ok(projected)
    }
}
