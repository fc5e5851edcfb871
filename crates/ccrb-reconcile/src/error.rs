//! Error types for the record reconciliation pipeline.
//!
//! Schema problems (a join key or declared date column that is not where
//! the configuration says it is) are fatal and fail fast with the column
//! named. Value-level problems (unparseable dates, blank strings, residual
//! missingness) are never errors; they are absorbed into the audit summary
//! as counts.
//!
//! Errors serialize as `{code, message}` so the JSON output of the CLI
//! stays machine-readable on failure.

use serde::ser::{Serialize, SerializeStruct, Serializer};
use thiserror::Error;

/// Errors that can occur during reconciliation.
#[derive(Error, Debug)]
pub enum ReconcileError {
    /// A required column is absent from an input table.
    #[error("Column '{column}' not found in table '{table}'")]
    MissingColumn { column: String, table: String },

    /// A declared date column has a dtype that can be neither parsed nor
    /// kept (anything other than String or Date).
    #[error("Date column '{column}' has unsupported dtype {dtype}")]
    InvalidDateColumn { column: String, dtype: String },

    /// An input table has no columns at all.
    #[error("Table '{0}' is empty")]
    EmptyTable(String),

    /// Invalid pipeline configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A join between two tables failed.
    #[error("Join of '{left}' with '{right}' failed: {reason}")]
    JoinFailed {
        left: String,
        right: String,
        reason: String,
    },

    /// A resolver rule could not be applied to a column.
    #[error("Failed to resolve missing values in column '{column}': {reason}")]
    ResolutionFailed { column: String, reason: String },

    /// The feature projection could not be produced.
    #[error("Feature projection failed: {0}")]
    ProjectionFailed(String),

    /// IO error (file reading/writing).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Underlying polars operation failed.
    #[error("DataFrame operation failed: {0}")]
    Polars(#[from] polars::prelude::PolarsError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Wrapper that attaches context while keeping the source error.
    #[error("{context}")]
    WithContext {
        context: String,
        #[source]
        source: Box<ReconcileError>,
    },
}

impl ReconcileError {
    /// Wraps this error with additional context.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        ReconcileError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Stable machine-readable code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            ReconcileError::MissingColumn { .. } => "MISSING_COLUMN",
            ReconcileError::InvalidDateColumn { .. } => "INVALID_DATE_COLUMN",
            ReconcileError::EmptyTable(_) => "EMPTY_TABLE",
            ReconcileError::InvalidConfig(_) => "INVALID_CONFIG",
            ReconcileError::JoinFailed { .. } => "JOIN_FAILED",
            ReconcileError::ResolutionFailed { .. } => "RESOLUTION_FAILED",
            ReconcileError::ProjectionFailed(_) => "PROJECTION_FAILED",
            ReconcileError::Io(_) => "IO_ERROR",
            ReconcileError::Polars(_) => "POLARS_ERROR",
            ReconcileError::Json(_) => "JSON_ERROR",
            ReconcileError::WithContext { source, .. } => source.error_code(),
        }
    }

    /// Whether this error points at the shape of an input table rather
    /// than at the run itself.
    pub fn is_schema_error(&self) -> bool {
        match self {
            ReconcileError::MissingColumn { .. }
            | ReconcileError::InvalidDateColumn { .. }
            | ReconcileError::EmptyTable(_) => true,
            ReconcileError::WithContext { source, .. } => source.is_schema_error(),
            _ => false,
        }
    }

    /// Whether the caller can fix this without different input data.
    pub fn is_recoverable(&self) -> bool {
        match self {
            ReconcileError::InvalidConfig(_) => true,
            ReconcileError::WithContext { source, .. } => source.is_recoverable(),
            _ => false,
        }
    }
}

impl Serialize for ReconcileError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut state = serializer.serialize_struct("ReconcileError", 2)?;
        state.serialize_field("code", self.error_code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

/// Convenience result type for reconciliation operations.
pub type Result<T> = std::result::Result<T, ReconcileError>;

/// Extension trait for attaching context to results.
pub trait ResultExt<T> {
    /// Adds context to the error, if any.
    fn context(self, ctx: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(ctx))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, polars::prelude::PolarsError> {
    fn context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| ReconcileError::from(e).with_context(ctx))
    }
}
