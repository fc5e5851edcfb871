//! The three-step join reconciling the four input relations.
//!
//! complaints left-join allegations on complaint_id, inner-join penalties
//! on complaint_id (deliberate narrowing to complaints that reached a
//! penalty decision), left-join officers on tax_id. Right-side collisions
//! get the fixed `_right` suffix and the redundant suffixed copies are
//! dropped by name right after each step, so downstream stages never see
//! a suffixed column. Left row order survives every step.

use polars::prelude::*;
use tracing::debug;

use crate::error::{ReconcileError, Result};
use crate::schema::{ALLEGATION_RECORD_IDENTITY, AS_OF_DATE, COMPLAINT_ID, JOIN_SUFFIX, TAX_ID};
use crate::types::TableSet;

/// The composite key that uniquely identifies a joined row.
pub const JOINED_KEY: [&str; 3] = [COMPLAINT_ID, TAX_ID, ALLEGATION_RECORD_IDENTITY];

/// Executes the fixed join sequence over the four normalized tables.
pub struct JoinEngine;

impl JoinEngine {
    /// Step 1: complaints left-join allegations on the complaint key.
    /// Complaints without allegations survive with null allegation fields.
    pub fn join_complaints_allegations(
        complaints: DataFrame,
        allegations: DataFrame,
    ) -> Result<DataFrame> {
        Self::join_step(
            complaints,
            allegations,
            COMPLAINT_ID,
            JoinType::Left,
            "complaints",
            "allegations",
            &[suffixed(AS_OF_DATE)],
        )
    }

    /// Step 2: inner-join penalties on the complaint key. Complaints that
    /// never reached a penalty decision drop out here by design. The
    /// penalty table's second officer identifier is redundant with the
    /// allegation-side one and is dropped.
    pub fn join_penalties(joined: DataFrame, penalties: DataFrame) -> Result<DataFrame> {
        Self::join_step(
            joined,
            penalties,
            COMPLAINT_ID,
            JoinType::Inner,
            "joined",
            "penalties",
            &[suffixed(AS_OF_DATE), suffixed(TAX_ID)],
        )
    }

    /// Step 3: left-join officers on the officer key. Rows whose officer
    /// record is absent keep null officer fields for the resolver.
    pub fn join_officers(joined: DataFrame, officers: DataFrame) -> Result<DataFrame> {
        Self::join_step(
            joined,
            officers,
            TAX_ID,
            JoinType::Left,
            "joined",
            "officers",
            &[suffixed(AS_OF_DATE)],
        )
    }

    /// Runs the full three-step sequence.
    pub fn join_all(tables: TableSet) -> Result<DataFrame> {
        let TableSet {
            complaints,
            allegations,
            penalties,
            officers,
        } = tables;
        let joined = Self::join_complaints_allegations(complaints, allegations)?;
        let joined = Self::join_penalties(joined, penalties)?;
        let joined = Self::join_officers(joined, officers)?;
        debug!(
            "Join sequence produced {} rows x {} columns",
            joined.height(),
            joined.width()
        );
        Ok(joined)
    }

    fn join_step(
        left: DataFrame,
        right: DataFrame,
        key: &str,
        how: JoinType,
        left_label: &str,
        right_label: &str,
        drop_after: &[String],
    ) -> Result<DataFrame> {
        Self::require_column(&left, key, left_label)?;
        Self::require_column(&right, key, right_label)?;

        let mut args = JoinArgs::new(how);
        args.suffix = Some(JOIN_SUFFIX.into());
        args.maintain_order = MaintainOrderJoin::Left;

        let joined = left
            .lazy()
            .join(right.lazy(), [col(key)], [col(key)], args)
            .collect()
            .map_err(|e| ReconcileError::JoinFailed {
                left: left_label.to_string(),
                right: right_label.to_string(),
                reason: e.to_string(),
            })?;

        // drop_many ignores names that did not materialize (no collision).
        let drops: Vec<PlSmallStr> = drop_after.iter().map(|c| c.as_str().into()).collect();
        Ok(joined.drop_many(drops))
    }

    fn require_column(df: &DataFrame, column: &str, table: &str) -> Result<()> {
        if df.column(column).is_err() {
            return Err(ReconcileError::MissingColumn {
                column: column.to_string(),
                table: table.to_string(),
            });
        }
        Ok(())
    }
}

fn suffixed(column: &str) -> String {
    format!("{column}{JOIN_SUFFIX}")
}
