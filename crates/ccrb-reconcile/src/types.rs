use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};

use crate::schema::TableKind;

/// The four loaded input relations, in canonical order.
#[derive(Debug, Clone)]
pub struct TableSet {
    pub complaints: DataFrame,
    pub allegations: DataFrame,
    pub penalties: DataFrame,
    pub officers: DataFrame,
}

impl TableSet {
    pub fn get(&self, kind: TableKind) -> &DataFrame {
        match kind {
            TableKind::Complaints => &self.complaints,
            TableKind::Allegations => &self.allegations,
            TableKind::Penalties => &self.penalties,
            TableKind::Officers => &self.officers,
        }
    }

    pub fn set(&mut self, kind: TableKind, df: DataFrame) {
        match kind {
            TableKind::Complaints => self.complaints = df,
            TableKind::Allegations => self.allegations = df,
            TableKind::Penalties => self.penalties = df,
            TableKind::Officers => self.officers = df,
        }
    }
}

/// Output of a full pipeline run: the feature table plus the audit trail.
#[derive(Debug)]
pub struct PipelineResult {
    pub table: DataFrame,
    pub summary: ReconciliationSummary,
}

// =============================================================================
// Audit Summary Types
// =============================================================================

/// The six pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    SchemaNormalization,
    Deduplication,
    Join,
    TemporalFilter,
    MissingValueResolution,
    FeatureProjection,
}

impl PipelineStage {
    pub fn display_name(&self) -> &'static str {
        match self {
            PipelineStage::SchemaNormalization => "Schema Normalization",
            PipelineStage::Deduplication => "Deduplication",
            PipelineStage::Join => "Join",
            PipelineStage::TemporalFilter => "Temporal Filter",
            PipelineStage::MissingValueResolution => "Missing-Value Resolution",
            PipelineStage::FeatureProjection => "Feature Projection",
        }
    }
}

/// How a column's missing values were handled, one entry per mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionRule {
    BlankNormalized,
    UnknownDate,
    ColumnEliminated,
    SemanticSubstitution,
    MissingSentinel,
    CarryForward,
    RowElimination,
}

impl ResolutionRule {
    pub fn display_name(&self) -> &'static str {
        match self {
            ResolutionRule::BlankNormalized => "Blank Normalized",
            ResolutionRule::UnknownDate => "Unknown Date",
            ResolutionRule::ColumnEliminated => "Column Eliminated",
            ResolutionRule::SemanticSubstitution => "Semantic Substitution",
            ResolutionRule::MissingSentinel => "Missing Sentinel",
            ResolutionRule::CarryForward => "Carry Forward",
            ResolutionRule::RowElimination => "Row Elimination",
        }
    }
}

/// Per-column record of one resolution mechanism and how many values it
/// touched. The zero-missingness postcondition is auditable by summing
/// these against the nulls observed on entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnAudit {
    pub column: String,
    pub rule: ResolutionRule,
    pub values_affected: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl ColumnAudit {
    pub fn new(column: impl Into<String>, rule: ResolutionRule, values_affected: usize) -> Self {
        Self {
            column: column.into(),
            rule,
            values_affected,
            note: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// Category of a pipeline action, for display and machine filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    SchemaNormalized,
    DuplicatesRemoved,
    TablesJoined,
    ColumnsDropped,
    RowsFiltered,
    ValuesSubstituted,
    ValuesCarriedForward,
    RowsEliminated,
    FeaturesProjected,
}

impl ActionType {
    pub fn display_name(&self) -> &'static str {
        match self {
            ActionType::SchemaNormalized => "Schema Normalized",
            ActionType::DuplicatesRemoved => "Duplicates Removed",
            ActionType::TablesJoined => "Tables Joined",
            ActionType::ColumnsDropped => "Columns Dropped",
            ActionType::RowsFiltered => "Rows Filtered",
            ActionType::ValuesSubstituted => "Values Substituted",
            ActionType::ValuesCarriedForward => "Values Carried Forward",
            ActionType::RowsEliminated => "Rows Eliminated",
            ActionType::FeaturesProjected => "Features Projected",
        }
    }
}

/// One concrete operation performed during the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileAction {
    pub action_type: ActionType,
    /// Which table (or join product) the action applied to.
    pub target: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ReconcileAction {
    pub fn new(
        action_type: ActionType,
        target: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            action_type,
            target: target.into(),
            description: description.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Full audit trail of a reconciliation run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReconciliationSummary {
    pub duration_ms: u64,
    /// Input row counts before any processing.
    pub complaint_rows: usize,
    pub allegation_rows: usize,
    pub penalty_rows: usize,
    pub officer_rows: usize,
    /// Row count straight out of the three-join sequence.
    pub rows_joined: usize,
    /// After composite-key deduplication of the join product.
    pub rows_after_dedup: usize,
    /// After the recency-window filter; this is what enters the resolver.
    pub rows_after_filter: usize,
    /// Rows dropped by the resolver's row-elimination fallback.
    pub rows_eliminated: usize,
    pub final_rows: usize,
    pub final_columns: usize,
    /// Non-null share of cells entering the resolver (1.0 = complete).
    pub completeness_before_resolution: f32,
    pub actions: Vec<ReconcileAction>,
    pub column_audits: Vec<ColumnAudit>,
    pub warnings: Vec<String>,
}

impl ReconciliationSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_action(&mut self, action: ReconcileAction) {
        self.actions.push(action);
    }

    pub fn add_audit(&mut self, audit: ColumnAudit) {
        self.column_audits.push(audit);
    }

    pub fn add_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    /// Rows the resolver must account for: survivors plus eliminated.
    /// Equals `rows_after_filter` when the books balance.
    pub fn resolver_rows_accounted(&self) -> usize {
        self.final_rows + self.rows_eliminated
    }

    /// Percentage of rows dropped by the temporal filter.
    pub fn filter_removed_percentage(&self) -> f32 {
        if self.rows_after_dedup == 0 {
            return 0.0;
        }
        let removed = self.rows_after_dedup.saturating_sub(self.rows_after_filter);
        (removed as f32 / self.rows_after_dedup as f32) * 100.0
    }

    /// Percentage of resolver-entering rows lost to row elimination.
    pub fn elimination_percentage(&self) -> f32 {
        if self.rows_after_filter == 0 {
            return 0.0;
        }
        (self.rows_eliminated as f32 / self.rows_after_filter as f32) * 100.0
    }

    /// Total values affected by one resolution rule, across columns.
    pub fn values_affected_by(&self, rule: ResolutionRule) -> usize {
        self.column_audits
            .iter()
            .filter(|a| a.rule == rule)
            .map(|a| a.values_affected)
            .sum()
    }
}
