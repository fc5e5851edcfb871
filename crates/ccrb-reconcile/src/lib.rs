//! Complaint-Record Reconciliation Library
//!
//! Reconciles the four civilian-complaint publication tables into a single
//! analysis-ready feature table with zero unresolved missing values, built
//! with Rust and Polars.
//!
//! # Overview
//!
//! The pipeline runs six pure stages over the input tables:
//!
//! - **Schema Normalization**: canonical column names, blank-to-null, date parsing
//! - **Deduplication**: exact-duplicate removal, keep-first and order-preserving
//! - **Joining**: complaints x allegations x penalties x officers on the published keys
//! - **Temporal Filtering**: a configurable recency window over the incident date
//! - **Missing-Value Resolution**: five ordered rules ending in zero missing values
//! - **Feature Projection**: select, rename, categorical casts, deterministic sort
//!
//! Every run yields a [`ReconciliationSummary`]: row counts per milestone,
//! per-column resolution audits, typed actions, and warnings.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use ccrb_reconcile::{Pipeline, PipelineConfig, TableSet};
//!
//! let result = Pipeline::builder()
//!     .config(PipelineConfig::builder().recency_years(10).build()?)
//!     .build()?
//!     .run(TableSet {
//!         complaints,
//!         allegations,
//!         penalties,
//!         officers,
//!     })?;
//!
//! println!(
//!     "{} rows x {} columns",
//!     result.summary.final_rows, result.summary.final_columns
//! );
//! for audit in &result.summary.column_audits {
//!     println!(
//!         "  {}: {} ({} values)",
//!         audit.column,
//!         audit.rule.display_name(),
//!         audit.values_affected
//!     );
//! }
//! ```
//!
//! # Configuration
//!
//! Use [`PipelineConfig`] to customize a run:
//!
//! ```rust,ignore
//! use ccrb_reconcile::PipelineConfig;
//! use chrono::NaiveDate;
//!
//! let config = PipelineConfig::builder()
//!     .recency_years(5)                     // keep the last five years
//!     .reference_date(NaiveDate::from_ymd_opt(2023, 12, 31).unwrap())
//!     .include_unknown_incident_dates(true) // keep rows with unknown dates
//!     .sentinel_label("Unknown")
//!     .build()?;
//! ```
//!
//! Every stage is also independently callable ([`SchemaNormalizer`],
//! [`Deduplicator`], [`JoinEngine`], [`TemporalFilter`],
//! [`MissingValueResolver`], [`FeatureProjector`]) for partial runs and
//! testing.

// Core modules
pub mod config;
pub mod dedup;
pub mod error;
pub mod join;
pub mod normalize;
pub mod pipeline;
pub mod project;
pub mod resolver;
pub mod schema;
pub mod temporal;
pub mod types;
pub mod utils;

// Re-exports for convenient access
pub use config::{
    ConfigValidationError, FeatureColumn, PipelineConfig, PipelineConfigBuilder,
    SemanticSubstitution,
};
pub use dedup::Deduplicator;
pub use error::{ReconcileError, Result as ReconcileResult, ResultExt};
pub use join::{JOINED_KEY, JoinEngine};
pub use normalize::SchemaNormalizer;
pub use pipeline::{Pipeline, PipelineBuilder};
pub use project::FeatureProjector;
pub use resolver::{MissingValueResolver, ResolutionOutcome};
pub use schema::TableKind;
pub use temporal::TemporalFilter;
pub use types::{
    ActionType, ColumnAudit, PipelineResult, PipelineStage, ReconcileAction,
    ReconciliationSummary, ResolutionRule, TableSet,
};
pub use utils::{fill_int_nulls, fill_string_nulls, is_date_dtype, is_integer_dtype, parse_us_date};
