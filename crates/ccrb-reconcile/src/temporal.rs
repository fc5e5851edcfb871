//! Recency-window filtering over the incident date.
//!
//! The window is a closed lower bound: a row whose incident date falls
//! exactly on the cutoff day is kept, one day earlier is dropped, and no
//! upper bound is applied. Rows with unknown incident dates are dropped
//! unless configured otherwise.

use chrono::{Local, Months, NaiveDate};
use polars::prelude::*;
use tracing::debug;

use crate::config::PipelineConfig;
use crate::error::{ReconcileError, Result};
use crate::schema::INCIDENT_DATE;
use crate::utils;

/// Filters the joined table down to the configured recency window.
pub struct TemporalFilter;

impl TemporalFilter {
    /// Lower bound of the window: the reference date minus the window
    /// width. Month arithmetic clamps end-of-month overflow (a Feb 29
    /// reference lands on Feb 28 in a non-leap year).
    pub fn cutoff(reference: NaiveDate, recency_years: u32) -> NaiveDate {
        reference
            .checked_sub_months(Months::new(recency_years.saturating_mul(12)))
            .unwrap_or(NaiveDate::MIN)
    }

    /// Applies the configured window, anchoring at the configured
    /// reference date or today. Returns the frame and the removed count.
    pub fn filter(df: DataFrame, config: &PipelineConfig) -> Result<(DataFrame, usize)> {
        let reference = config
            .reference_date
            .unwrap_or_else(|| Local::now().date_naive());
        let cutoff = Self::cutoff(reference, config.recency_years);
        Self::filter_from(df, cutoff, config.include_unknown_incident_dates)
    }

    /// Explicit-cutoff variant.
    pub fn filter_from(
        df: DataFrame,
        cutoff: NaiveDate,
        include_unknown: bool,
    ) -> Result<(DataFrame, usize)> {
        let column = df
            .column(INCIDENT_DATE)
            .map_err(|_| ReconcileError::MissingColumn {
                column: INCIDENT_DATE.to_string(),
                table: "joined".to_string(),
            })?;
        let series = column.as_materialized_series();
        if !utils::is_date_dtype(series.dtype()) {
            return Err(ReconcileError::InvalidDateColumn {
                column: INCIDENT_DATE.to_string(),
                dtype: format!("{}", series.dtype()),
            });
        }

        let cutoff_days = utils::days_since_epoch(cutoff);
        let physical = series.to_physical_repr();
        let days_ca = physical.i32()?;

        let mut mask_values = Vec::with_capacity(days_ca.len());
        for opt_days in days_ca.into_iter() {
            match opt_days {
                Some(days) => mask_values.push(days >= cutoff_days),
                None => mask_values.push(include_unknown),
            }
        }
        let mask = BooleanChunked::from_slice("mask".into(), &mask_values);

        let before = df.height();
        let filtered = df.filter(&mask)?;
        let removed = before.saturating_sub(filtered.height());
        debug!(
            "Recency filter at {} removed {} of {} rows",
            cutoff, removed, before
        );
        Ok((filtered, removed))
    }
}
