//! Main reconciliation pipeline module.
//!
//! This module provides the core `Pipeline` struct and builder for
//! orchestrating the six-stage reconciliation workflow.

use polars::prelude::*;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::PipelineConfig;
use crate::dedup::Deduplicator;
use crate::error::Result;
use crate::join::{JOINED_KEY, JoinEngine};
use crate::normalize::SchemaNormalizer;
use crate::project::FeatureProjector;
use crate::resolver::MissingValueResolver;
use crate::schema::{INCIDENT_DATE, TableKind};
use crate::temporal::TemporalFilter;
use crate::types::{
    ActionType, PipelineResult, ReconcileAction, ReconciliationSummary, ResolutionRule, TableSet,
};

/// The record reconciliation pipeline.
///
/// Use [`Pipeline::builder()`] to create a pipeline with custom
/// configuration.
///
/// # Example
///
/// ```rust,ignore
/// use ccrb_reconcile::{Pipeline, PipelineConfig, TableSet};
///
/// let result = Pipeline::builder()
///     .config(PipelineConfig::builder().recency_years(5).build()?)
///     .build()?
///     .run(TableSet { complaints, allegations, penalties, officers })?;
///
/// println!("{} rows reconciled", result.summary.final_rows);
/// ```
pub struct Pipeline {
    config: PipelineConfig,
}

// Ensure Pipeline is Send (the batch can run on a worker thread)
static_assertions::assert_impl_all!(Pipeline: Send);

impl Pipeline {
    /// Create a new pipeline builder.
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    /// Run the full reconciliation over the four input tables.
    ///
    /// Returns a [`PipelineResult`] holding the final feature table and
    /// the audit summary.
    pub fn run(&self, tables: TableSet) -> Result<PipelineResult> {
        match self.run_internal(tables) {
            Ok(result) => Ok(result),
            Err(e) => {
                error!("Reconciliation error: {}", e);
                Err(e)
            }
        }
    }

    fn run_internal(&self, mut tables: TableSet) -> Result<PipelineResult> {
        let start_time = Instant::now();
        info!("Starting reconciliation pipeline...");

        let mut summary = ReconciliationSummary::new();

        // Step 1: Normalize schemas
        info!("Step 1: Normalizing table schemas...");
        for kind in TableKind::ALL {
            let (df, audits) = SchemaNormalizer::normalize(tables.get(kind).clone(), kind)?;
            debug!(
                "{}: {} rows x {} columns after normalization",
                kind.name(),
                df.height(),
                df.width()
            );
            for audit in audits {
                summary.add_audit(audit.with_note(format!("{} table", kind.name())));
            }
            tables.set(kind, df);
        }
        summary.complaint_rows = tables.get(TableKind::Complaints).height();
        summary.allegation_rows = tables.get(TableKind::Allegations).height();
        summary.penalty_rows = tables.get(TableKind::Penalties).height();
        summary.officer_rows = tables.get(TableKind::Officers).height();
        summary.add_action(ReconcileAction::new(
            ActionType::SchemaNormalized,
            "all tables",
            "Canonicalized column names, normalized blank strings, and parsed date columns",
        ));

        // Step 2: Exact-duplicate removal per table
        info!("Step 2: Removing exact duplicate rows...");
        let mut duplicates_removed = 0usize;
        for kind in TableKind::ALL {
            let (df, removed) = Deduplicator::drop_duplicate_rows(tables.get(kind).clone())?;
            if removed > 0 {
                debug!("{}: removed {} exact duplicate rows", kind.name(), removed);
                duplicates_removed += removed;
            }
            tables.set(kind, df);
        }
        if duplicates_removed > 0 {
            summary.add_action(ReconcileAction::new(
                ActionType::DuplicatesRemoved,
                "all tables",
                format!("Removed {duplicates_removed} exact duplicate rows before joining"),
            ));
        }

        // Step 3: Join sequence, then composite-key deduplication
        info!("Step 3: Joining complaints, allegations, penalties, and officers...");
        let joined = JoinEngine::join_all(tables)?;
        summary.rows_joined = joined.height();
        summary.add_action(
            ReconcileAction::new(
                ActionType::TablesJoined,
                "joined",
                format!("Three-step join produced {} rows", summary.rows_joined),
            )
            .with_details(
                "complaints left-join allegations on complaint_id; \
                 inner-join penalties on complaint_id; \
                 left-join officers on tax_id",
            ),
        );
        if summary.complaint_rows > 0 {
            let ratio = summary.rows_joined as f64 / summary.complaint_rows as f64;
            if ratio > self.config.fanout_warning_ratio {
                let message = format!(
                    "Join fan-out: {} joined rows from {} complaints ({:.1}x exceeds the {:.1}x bound)",
                    summary.rows_joined, summary.complaint_rows, ratio, self.config.fanout_warning_ratio
                );
                warn!("{}", message);
                summary.add_warning(message);
            }
        }

        let (joined, key_duplicates) =
            Deduplicator::drop_duplicate_keys(joined, &JOINED_KEY, "joined")?;
        summary.rows_after_dedup = joined.height();
        if key_duplicates > 0 {
            summary.add_action(ReconcileAction::new(
                ActionType::DuplicatesRemoved,
                "joined",
                format!(
                    "Removed {} rows duplicating the ({}) key",
                    key_duplicates,
                    JOINED_KEY.join(", ")
                ),
            ));
        }

        // Step 4: Recency filter
        info!("Step 4: Applying the recency filter...");
        let (filtered, rows_outside_window) = TemporalFilter::filter(joined, &self.config)?;
        summary.rows_after_filter = filtered.height();
        summary.add_action(ReconcileAction::new(
            ActionType::RowsFiltered,
            INCIDENT_DATE,
            format!(
                "Excluded {} rows outside the {}-year window",
                rows_outside_window, self.config.recency_years
            ),
        ));
        if summary.filter_removed_percentage() > 30.0 {
            let message = format!(
                "Recency filter removed {:.1}% of joined rows",
                summary.filter_removed_percentage()
            );
            warn!("{}", message);
            summary.add_warning(message);
        }

        // Step 5: Missing-value resolution
        info!("Step 5: Resolving missing values...");
        summary.completeness_before_resolution = Self::completeness(&filtered);
        debug!(
            "Completeness entering the resolver: {:.3}",
            summary.completeness_before_resolution
        );
        let outcome = MissingValueResolver::resolve(filtered, &self.config)?;
        summary.rows_eliminated = outcome.rows_eliminated;
        for audit in outcome.audits {
            summary.add_audit(audit);
        }

        let columns_eliminated = summary
            .column_audits
            .iter()
            .filter(|a| a.rule == ResolutionRule::ColumnEliminated)
            .count();
        if columns_eliminated > 0 {
            summary.add_action(ReconcileAction::new(
                ActionType::ColumnsDropped,
                "resolver",
                format!("Eliminated {columns_eliminated} columns with irreparable coverage"),
            ));
        }
        let substituted = summary.values_affected_by(ResolutionRule::SemanticSubstitution)
            + summary.values_affected_by(ResolutionRule::MissingSentinel);
        if substituted > 0 {
            summary.add_action(ReconcileAction::new(
                ActionType::ValuesSubstituted,
                "resolver",
                format!("Substituted {substituted} missing values with domain labels and sentinels"),
            ));
        }
        let carried = summary.values_affected_by(ResolutionRule::CarryForward);
        if carried > 0 {
            summary.add_action(ReconcileAction::new(
                ActionType::ValuesCarriedForward,
                "resolver",
                format!("Carried {carried} values forward within complaint groups"),
            ));
        }
        if summary.rows_eliminated > 0 {
            summary.add_action(ReconcileAction::new(
                ActionType::RowsEliminated,
                "resolver",
                format!(
                    "Eliminated {} rows with unresolvable values",
                    summary.rows_eliminated
                ),
            ));
        }
        if summary.elimination_percentage() > 30.0 {
            let message = format!(
                "Row elimination dropped {:.1}% of resolver input",
                summary.elimination_percentage()
            );
            warn!("{}", message);
            summary.add_warning(message);
        }

        // Step 6: Feature projection
        info!("Step 6: Projecting the feature table...");
        let table = FeatureProjector::project(outcome.df, &self.config)?;
        summary.final_rows = table.height();
        summary.final_columns = table.width();
        summary.add_action(ReconcileAction::new(
            ActionType::FeaturesProjected,
            "output",
            format!(
                "Projected {} features sorted by {}",
                summary.final_columns,
                self.config.sort_columns.join(", ")
            ),
        ));
        if summary.final_rows == 0 {
            summary.add_warning("No rows survived reconciliation");
        }

        summary.duration_ms = start_time.elapsed().as_millis() as u64;
        info!(
            "Reconciliation completed: {} rows x {} columns in {} ms",
            summary.final_rows, summary.final_columns, summary.duration_ms
        );

        Ok(PipelineResult { table, summary })
    }

    /// Non-null share of cells, the completeness measure recorded just
    /// before resolution.
    fn completeness(df: &DataFrame) -> f32 {
        if df.height() == 0 || df.width() == 0 {
            return 0.0;
        }
        let total_cells = df.height() * df.width();
        let null_count: usize = df.get_columns().iter().map(|c| c.null_count()).sum();
        let non_null = total_cells.saturating_sub(null_count);
        non_null as f32 / total_cells as f32
    }
}

/// Builder for creating a [`Pipeline`] instance.
///
/// Use [`Pipeline::builder()`] to get started.
#[derive(Default)]
pub struct PipelineBuilder {
    config: Option<PipelineConfig>,
}

static_assertions::assert_impl_all!(PipelineBuilder: Send);

impl PipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Build the pipeline.
    ///
    /// Returns an error if the configuration is invalid.
    pub fn build(self) -> std::result::Result<Pipeline, crate::config::ConfigValidationError> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        Ok(Pipeline { config })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_pipeline_builder_default() {
        let pipeline = Pipeline::builder().build().unwrap();
        assert_eq!(pipeline.config.recency_years, 10);
        assert_eq!(pipeline.config.group_key, "complaint_id");
    }

    #[test]
    fn test_pipeline_builder_with_config() {
        let config = PipelineConfig::builder()
            .recency_years(5)
            .include_unknown_incident_dates(true)
            .build()
            .unwrap();

        let pipeline = Pipeline::builder().config(config).build().unwrap();
        assert_eq!(pipeline.config.recency_years, 5);
        assert!(pipeline.config.include_unknown_incident_dates);
    }

    #[test]
    fn test_pipeline_builder_rejects_invalid_config() {
        let mut config = PipelineConfig::default();
        config.recency_years = 0;
        assert!(Pipeline::builder().config(config).build().is_err());
    }

    fn full_schema_tables() -> TableSet {
        // raw headers as the source systems publish them; one complaint
        // inside the window, one far outside it
        let complaints = df!(
            "As Of Date" => &["01/01/2023", "01/01/2023"],
            "Complaint Id" => &[100i64, 200],
            "CCRB Received Date" => &["06/02/2019", "04/01/2001"],
            "Close Date" => &[Some("01/10/2020"), None],
            "Complaint Status" => &["Closed", "Closed"],
            "Incident Date" => &["06/01/2019", "03/01/2001"],
            "Incident Hour" => &[14i64, 2],
            "Borough Of Incident Occurrence" => &["Brooklyn", "Bronx"],
            "Precinct Of Incident Occurrence" => &[73i64, 44],
            "Location Type Of Incident" => &["Street/highway", "Street/highway"],
            "Reason For Initial Contact" => &["Report-dispute", "Moving violation"],
            "Outcome Of Police Encounter" => &["Arrest", "Summons"],
        )
        .unwrap();

        let allegations = df!(
            "As Of Date" => &["01/01/2023", "01/01/2023", "01/01/2023"],
            "Complaint Id" => &[100i64, 100, 200],
            "Allegation Record Identity" => &[1i64, 2, 9],
            "FADO Type" => &["Force", "Discourtesy", "Force"],
            "Allegation" => &["Physical force", "Word", "Gun Pointed"],
            "Tax ID" => &[900i64, 901, 902],
            "Officer Rank At Incident" => &[Some("POM"), None, Some("SGT")],
            "Officer Command At Incident" => &["073 PCT", "073 PCT", "044 PCT"],
            "Officer Days On Force At Incident" => &[700i64, 1400, 3000],
            "Victim Race" => &[Some("Black"), None, Some("Hispanic")],
            "Victim Ethnicity" => &[None::<&str>, None, None],
            "Victim Gender" => &["Male", "Male", "Female"],
            "Victim Age Range At Incident" => &["25-34", "25-34", "35-44"],
        )
        .unwrap();

        let penalties = df!(
            "As Of Date" => &["01/01/2023", "01/01/2023"],
            "Complaint Id" => &[100i64, 200],
            "Tax ID" => &[900i64, 902],
            "CCRB Case Status" => &["Closed", "Closed"],
            "Date Officer Served Charges" => &[None::<&str>, None],
            "APU CCRB Recommended Penalty" => &[None::<&str>, None],
            "APU Trial Commissioner Recommended Penalty" => &[None::<&str>, None],
            "NYPD Officer Penalty" => &[None::<&str>, Some("Formalized Training")],
        )
        .unwrap();

        let officers = df!(
            "As Of Date" => &["01/01/2023"],
            "Tax ID" => &[900i64],
            "Officer Race" => &["White"],
            "Officer Gender" => &["Male"],
            "Officer Age" => &[38i64],
            "Current Rank" => &["Police Officer"],
            "Currently On The Force" => &["Yes"],
            "Total Complaints" => &[4i64],
        )
        .unwrap();

        TableSet {
            complaints,
            allegations,
            penalties,
            officers,
        }
    }

    fn string_values(df: &DataFrame, column: &str) -> Vec<Option<String>> {
        let series = df
            .column(column)
            .unwrap()
            .as_materialized_series()
            .cast(&DataType::String)
            .unwrap();
        series
            .str()
            .unwrap()
            .into_iter()
            .map(|v| v.map(|s| s.to_string()))
            .collect()
    }

    #[test]
    fn test_full_run_reconciles_the_schema_scenario() {
        let config = PipelineConfig::builder()
            .reference_date(NaiveDate::from_ymd_opt(2023, 12, 31).unwrap())
            .build()
            .unwrap();
        let pipeline = Pipeline::builder().config(config).build().unwrap();

        let result = pipeline.run(full_schema_tables()).unwrap();
        let summary = &result.summary;

        assert_eq!(summary.complaint_rows, 2);
        assert_eq!(summary.allegation_rows, 3);
        assert_eq!(summary.penalty_rows, 2);
        assert_eq!(summary.officer_rows, 1);
        assert_eq!(summary.rows_joined, 3);
        assert_eq!(summary.rows_after_dedup, 3);
        // the 2001 complaint falls outside the ten-year window
        assert_eq!(summary.rows_after_filter, 2);
        assert_eq!(summary.rows_eliminated, 0);
        assert_eq!(summary.final_rows, 2);
        assert_eq!(summary.final_columns, 25);
        assert_eq!(summary.resolver_rows_accounted(), summary.rows_after_filter);
        assert!(summary.completeness_before_resolution > 0.0);
        assert!(summary.completeness_before_resolution < 1.0);

        // losing 1 of 3 rows to the filter crosses the 30% threshold
        assert_eq!(summary.warnings.len(), 1);
        assert!(summary.warnings[0].contains("Recency filter"));

        for column in result.table.get_columns() {
            assert_eq!(column.null_count(), 0, "nulls left in {}", column.name());
        }

        let names: Vec<String> = result
            .table
            .get_column_names()
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(
            &names[..3],
            &["complaint_id", "tax_id", "allegation_record_identity"]
        );
        assert!(names.contains(&"final_penalty".to_string()));
        assert!(names.contains(&"borough".to_string()));

        // missing final penalty resolved as a domain fact, not as unknown
        assert_eq!(
            string_values(&result.table, "final_penalty"),
            vec![Some("No penalty".to_string()), Some("No penalty".to_string())]
        );
        // officer 901 has no roster record: sentinel fields, carried rank
        assert_eq!(
            string_values(&result.table, "officer_race"),
            vec![Some("White".to_string()), Some("Missing".to_string())]
        );
        assert_eq!(
            string_values(&result.table, "officer_rank"),
            vec![Some("POM".to_string()), Some("POM".to_string())]
        );
        let ages: Vec<Option<i64>> = result
            .table
            .column("officer_age")
            .unwrap()
            .i64()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(ages, vec![Some(38), Some(-1)]);
    }

    #[test]
    fn test_full_run_summary_serializes() {
        let config = PipelineConfig::builder()
            .reference_date(NaiveDate::from_ymd_opt(2023, 12, 31).unwrap())
            .build()
            .unwrap();
        let pipeline = Pipeline::builder().config(config).build().unwrap();

        let result = pipeline.run(full_schema_tables()).unwrap();
        let json = serde_json::to_string_pretty(&result.summary).unwrap();
        assert!(json.contains("\"final_rows\": 2"));
        assert!(json.contains("column_audits"));
    }
}
