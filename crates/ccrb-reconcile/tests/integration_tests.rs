//! Integration tests for the record reconciliation pipeline.
//!
//! These tests run the full pipeline over small CSV fixtures shaped like the
//! published complaint extracts: raw headers, MM/DD/YYYY dates, blank cells,
//! an unparseable date, an exact duplicate row, and officers missing from
//! the roster.

use ccrb_reconcile::{ActionType, Pipeline, PipelineConfig, ResolutionRule, TableSet};
use chrono::NaiveDate;
use polars::io::csv::read::CsvReadOptions;
use polars::prelude::*;
use std::path::PathBuf;

// ============================================================================
// Helper Functions
// ============================================================================

fn fixtures_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn load_csv(filename: &str) -> DataFrame {
    let path = fixtures_path().join(filename);
    CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(path))
        .expect("Failed to create CSV reader")
        .finish()
        .expect("Failed to read CSV file")
}

fn load_tables() -> TableSet {
    TableSet {
        complaints: load_csv("complaints.csv"),
        allegations: load_csv("allegations.csv"),
        penalties: load_csv("penalties.csv"),
        officers: load_csv("officers.csv"),
    }
}

/// Pipeline anchored at the end of 2023 so the fixtures stay deterministic.
fn pipeline_with_window(years: u32) -> Pipeline {
    Pipeline::builder()
        .config(
            PipelineConfig::builder()
                .recency_years(years)
                .reference_date(NaiveDate::from_ymd_opt(2023, 12, 31).unwrap())
                .build()
                .unwrap(),
        )
        .build()
        .unwrap()
}

/// Column values as strings, materializing categoricals along the way.
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

fn i64_values(df: &DataFrame, column: &str) -> Vec<Option<i64>> {
    df.column(column)
        .unwrap()
        .i64()
        .unwrap()
        .into_iter()
        .collect()
}

// ============================================================================
// Fixture Sanity
// ============================================================================

#[test]
fn test_fixtures_load_with_expected_shapes() {
    let tables = load_tables();
    assert_eq!(tables.complaints.shape(), (4, 12));
    assert_eq!(tables.allegations.shape(), (7, 13));
    assert_eq!(tables.penalties.shape(), (4, 8));
    assert_eq!(tables.officers.shape(), (3, 8));

    // empty CSV cells arrive as nulls; whitespace-only cells arrive as
    // strings and are only nulled during normalization
    assert_eq!(tables.allegations.column("Tax ID").unwrap().null_count(), 1);
    assert_eq!(
        tables
            .allegations
            .column("Officer Rank At Incident")
            .unwrap()
            .str()
            .unwrap()
            .get(1),
        Some(" ")
    );
}

// ============================================================================
// Full Pipeline
// ============================================================================

#[test]
fn test_full_pipeline_reconciles_fixture_tables() {
    let result = pipeline_with_window(10).run(load_tables()).unwrap();
    let summary = &result.summary;

    // input counts are taken after normalization, before deduplication
    assert_eq!(summary.complaint_rows, 4);
    assert_eq!(summary.allegation_rows, 7);
    assert_eq!(summary.penalty_rows, 4);
    assert_eq!(summary.officer_rows, 3);

    // one exact duplicate allegation row is dropped before joining, the
    // 2005 complaint falls outside the window, and the allegation with no
    // officer identifier falls to row elimination
    assert_eq!(summary.rows_joined, 6);
    assert_eq!(summary.rows_after_dedup, 6);
    assert_eq!(summary.rows_after_filter, 5);
    assert_eq!(summary.rows_eliminated, 1);
    assert_eq!(summary.final_rows, 4);
    assert_eq!(summary.final_columns, 25);
    assert_eq!(summary.resolver_rows_accounted(), summary.rows_after_filter);
    assert!(summary.completeness_before_resolution > 0.8);
    assert!(summary.completeness_before_resolution < 0.9);
    assert!(summary.warnings.is_empty());

    // zero-missingness postcondition
    for column in result.table.get_columns() {
        assert_eq!(column.null_count(), 0, "nulls left in {}", column.name());
    }

    // full projection contract: order and renames
    let names: Vec<String> = result
        .table
        .get_column_names()
        .iter()
        .map(|s| s.to_string())
        .collect();
    assert_eq!(
        names,
        vec![
            "complaint_id",
            "tax_id",
            "allegation_record_identity",
            "incident_date",
            "incident_hour",
            "borough",
            "precinct",
            "location_type",
            "contact_reason",
            "contact_outcome",
            "fado_type",
            "allegation",
            "victim_race",
            "victim_gender",
            "victim_age_range",
            "officer_rank",
            "officer_command",
            "officer_tenure_days",
            "officer_race",
            "officer_gender",
            "officer_age",
            "active_officer",
            "officer_complaint_count",
            "ccrb_recommended_penalty",
            "final_penalty",
        ]
    );
    assert!(matches!(
        result.table.column("borough").unwrap().dtype(),
        DataType::Categorical(_, _)
    ));
    assert_eq!(
        result.table.column("incident_date").unwrap().dtype(),
        &DataType::Date
    );

    // deterministic sort by the composite identity
    assert_eq!(
        string_values(&result.table, "complaint_id"),
        ["C1001", "C1001", "C1002", "C1004"]
            .map(|s| Some(s.to_string()))
            .to_vec()
    );
    assert_eq!(
        i64_values(&result.table, "tax_id"),
        vec![Some(915001), Some(915002), Some(915001), Some(915004)]
    );
    assert_eq!(
        string_values(&result.table, "allegation_record_identity"),
        ["AR-1", "AR-2", "AR-3", "AR-6"]
            .map(|s| Some(s.to_string()))
            .to_vec()
    );

    // absent penalties become domain facts, not unknowns
    assert_eq!(
        string_values(&result.table, "final_penalty"),
        ["Formalized Training", "Formalized Training", "No penalty", "No penalty"]
            .map(|s| Some(s.to_string()))
            .to_vec()
    );
    assert_eq!(
        string_values(&result.table, "ccrb_recommended_penalty")[2],
        Some("No penalty recommended".to_string())
    );

    // the blank rank was carried forward within its complaint; the officer
    // missing from the roster got sentinel values
    assert_eq!(
        string_values(&result.table, "officer_rank"),
        ["POM", "POM", "SGT", "POM"].map(|s| Some(s.to_string())).to_vec()
    );
    assert_eq!(
        string_values(&result.table, "officer_race"),
        ["White", "Black", "White", "Missing"]
            .map(|s| Some(s.to_string()))
            .to_vec()
    );
    assert_eq!(
        i64_values(&result.table, "officer_age"),
        vec![Some(38), Some(29), Some(38), Some(-1)]
    );
    assert_eq!(
        string_values(&result.table, "victim_race"),
        ["Black", "Black", "Hispanic", "Missing"]
            .map(|s| Some(s.to_string()))
            .to_vec()
    );
}

// ============================================================================
// Summary Accuracy
// ============================================================================

#[test]
fn test_summary_actions_cover_every_stage() {
    let result = pipeline_with_window(10).run(load_tables()).unwrap();
    let types: Vec<ActionType> = result
        .summary
        .actions
        .iter()
        .map(|a| a.action_type)
        .collect();

    for expected in [
        ActionType::SchemaNormalized,
        ActionType::DuplicatesRemoved,
        ActionType::TablesJoined,
        ActionType::RowsFiltered,
        ActionType::ColumnsDropped,
        ActionType::ValuesSubstituted,
        ActionType::ValuesCarriedForward,
        ActionType::RowsEliminated,
        ActionType::FeaturesProjected,
    ] {
        assert!(types.contains(&expected), "missing action {:?}", expected);
    }
    assert_eq!(types.len(), 9);
}

#[test]
fn test_summary_audits_track_each_mechanism() {
    let result = pipeline_with_window(10).run(load_tables()).unwrap();
    let summary = &result.summary;

    // the whitespace-only rank and race cells, each nulled once
    assert_eq!(summary.values_affected_by(ResolutionRule::BlankNormalized), 2);
    // the "Unknown" close date
    assert_eq!(summary.values_affected_by(ResolutionRule::UnknownDate), 1);
    let unknown_date = summary
        .column_audits
        .iter()
        .find(|a| a.rule == ResolutionRule::UnknownDate)
        .unwrap();
    assert_eq!(unknown_date.column, "close_date");
    assert_eq!(unknown_date.note.as_deref(), Some("complaints table"));

    // five configured columns eliminated from the join product
    assert_eq!(
        summary
            .column_audits
            .iter()
            .filter(|a| a.rule == ResolutionRule::ColumnEliminated)
            .count(),
        5
    );
    // three missing final penalties and one missing recommendation
    assert_eq!(
        summary.values_affected_by(ResolutionRule::SemanticSubstitution),
        4
    );
    // one blank victim race plus six officer fields for two unmatched rows
    assert_eq!(summary.values_affected_by(ResolutionRule::MissingSentinel), 13);
    // the carried officer rank
    assert_eq!(summary.values_affected_by(ResolutionRule::CarryForward), 1);
    // the allegation row with no officer identifier
    assert_eq!(summary.values_affected_by(ResolutionRule::RowElimination), 1);
    let eliminated = summary
        .column_audits
        .iter()
        .find(|a| a.rule == ResolutionRule::RowElimination)
        .unwrap();
    assert_eq!(eliminated.column, "tax_id");
}

#[test]
fn test_summary_serializes_to_json() {
    let result = pipeline_with_window(10).run(load_tables()).unwrap();
    let json = serde_json::to_string_pretty(&result.summary).unwrap();
    assert!(json.contains("\"rows_joined\": 6"));
    assert!(json.contains("\"final_rows\": 4"));
    assert!(json.contains("column_audits"));
    assert!(json.contains("\"complaints table\""));
}

// ============================================================================
// Window Edge Cases
// ============================================================================

#[test]
fn test_narrow_window_triggers_loss_warnings() {
    // a two-year window keeps only the 2022 complaint, and one of its two
    // allegation rows has no officer identifier
    let result = pipeline_with_window(2).run(load_tables()).unwrap();
    let summary = &result.summary;

    assert_eq!(summary.rows_after_filter, 2);
    assert_eq!(summary.rows_eliminated, 1);
    assert_eq!(summary.final_rows, 1);

    assert_eq!(summary.warnings.len(), 2);
    assert!(summary.warnings[0].contains("Recency filter"));
    assert!(summary.warnings[1].contains("Row elimination"));

    assert_eq!(
        string_values(&result.table, "complaint_id"),
        vec![Some("C1004".to_string())]
    );
    assert_eq!(
        string_values(&result.table, "officer_race"),
        vec![Some("Missing".to_string())]
    );
}

#[test]
fn test_far_future_reference_empties_the_table() {
    let pipeline = Pipeline::builder()
        .config(
            PipelineConfig::builder()
                .recency_years(10)
                .reference_date(NaiveDate::from_ymd_opt(2090, 12, 31).unwrap())
                .build()
                .unwrap(),
        )
        .build()
        .unwrap();

    let result = pipeline.run(load_tables()).unwrap();
    let summary = &result.summary;

    assert_eq!(summary.rows_after_filter, 0);
    assert_eq!(summary.final_rows, 0);
    assert_eq!(summary.final_columns, 25);
    assert_eq!(summary.completeness_before_resolution, 0.0);
    assert!(
        summary
            .warnings
            .iter()
            .any(|w| w.contains("No rows survived"))
    );
}
