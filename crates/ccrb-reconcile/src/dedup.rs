//! Duplicate removal, before and after the join.
//!
//! Both operations keep the first occurrence and preserve input order,
//! so deduplication never reorders surviving rows and output row count
//! is never larger than input row count.

use polars::prelude::*;
use tracing::debug;

use crate::error::{ReconcileError, Result};

/// Removes duplicate rows from input tables and from the join product.
pub struct Deduplicator;

impl Deduplicator {
    /// Removes exact duplicate rows (all columns equal), keeping the
    /// first occurrence. Returns the frame and the removed-row count.
    pub fn drop_duplicate_rows(df: DataFrame) -> Result<(DataFrame, usize)> {
        let before = df.height();
        let deduped = df.unique_stable::<&str, &str>(None, UniqueKeepStrategy::First, None)?;
        let removed = before.saturating_sub(deduped.height());
        if removed > 0 {
            debug!("Removed {} exact duplicate rows", removed);
        }
        Ok((deduped, removed))
    }

    /// Removes rows that duplicate the given key columns, keeping the
    /// first occurrence. `table` only labels the error when a key column
    /// is absent.
    pub fn drop_duplicate_keys(
        df: DataFrame,
        keys: &[&str],
        table: &str,
    ) -> Result<(DataFrame, usize)> {
        for &key in keys {
            if df.column(key).is_err() {
                return Err(ReconcileError::MissingColumn {
                    column: key.to_string(),
                    table: table.to_string(),
                });
            }
        }
        let subset: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
        let before = df.height();
        let deduped = df.unique_stable(Some(subset), UniqueKeepStrategy::First, None)?;
        let removed = before.saturating_sub(deduped.height());
        if removed > 0 {
            debug!("Removed {} rows duplicating key {:?}", removed, keys);
        }
        Ok((deduped, removed))
    }
}
