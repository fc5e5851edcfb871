//! Configuration for the reconciliation pipeline.
//!
//! Every column list the stages act on (elimination, substitution,
//! sentinel, carry-forward, projection) is configuration data with
//! schema-derived defaults, set up through the builder pattern.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::schema;

/// Replacement of missing values in one column with a domain label.
/// The rationale is recorded in the audit so "No penalty" stays
/// distinguishable from "we did not know".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticSubstitution {
    pub column: String,
    pub replacement: String,
    pub rationale: String,
}

impl SemanticSubstitution {
    pub fn new(
        column: impl Into<String>,
        replacement: impl Into<String>,
        rationale: impl Into<String>,
    ) -> Self {
        Self {
            column: column.into(),
            replacement: replacement.into(),
            rationale: rationale.into(),
        }
    }
}

/// One projected output column: source name and its feature name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureColumn {
    pub source: String,
    pub name: String,
}

impl FeatureColumn {
    pub fn new(source: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            name: name.into(),
        }
    }
}

/// Configuration for the reconciliation pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Width of the recency window, in years.
    pub recency_years: u32,

    /// Anchor of the recency window. `None` means the current local date.
    pub reference_date: Option<NaiveDate>,

    /// Keep rows whose incident date is unknown instead of dropping them.
    pub include_unknown_incident_dates: bool,

    /// Joined-rows to complaint-rows ratio above which a fan-out warning
    /// is recorded.
    pub fanout_warning_ratio: f64,

    /// Rule 1: columns dropped outright.
    pub eliminated_columns: Vec<String>,

    /// Rule 2: per-column domain replacements with rationale.
    pub semantic_substitutions: Vec<SemanticSubstitution>,

    /// Rule 3: columns whose missing values become the explicit sentinel.
    pub sentinel_columns: Vec<String>,

    /// Sentinel label for string columns.
    pub sentinel_label: String,

    /// Sentinel value for integer columns.
    pub numeric_sentinel: i64,

    /// Rule 4: columns forward-filled within their complaint group.
    pub carry_forward_columns: Vec<String>,

    /// Grouping key for carry-forward.
    pub group_key: String,

    /// Projection list: source column and feature name, in output order.
    pub feature_columns: Vec<FeatureColumn>,

    /// Feature names cast to categorical in the output.
    pub categorical_columns: Vec<String>,

    /// Feature names the output is sorted by, in precedence order.
    pub sort_columns: Vec<String>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn features(pairs: &[(&str, &str)]) -> Vec<FeatureColumn> {
    pairs
        .iter()
        .map(|(source, name)| FeatureColumn::new(*source, *name))
        .collect()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            recency_years: 10,
            reference_date: None,
            include_unknown_incident_dates: false,
            fanout_warning_ratio: 10.0,
            eliminated_columns: strings(&[
                "victim_ethnicity",
                "apu_trial_commissioner_recommended_penalty",
                "date_officer_served_charges",
                schema::AS_OF_DATE,
                "close_date",
            ]),
            semantic_substitutions: vec![
                SemanticSubstitution::new(
                    "nypd_officer_penalty",
                    "No penalty",
                    "an absent final penalty means none was imposed",
                ),
                SemanticSubstitution::new(
                    "apu_ccrb_recommended_penalty",
                    "No penalty recommended",
                    "an absent recommendation means the board recommended none",
                ),
            ],
            sentinel_columns: strings(&[
                "complaint_status",
                "fado_type",
                "allegation",
                "reason_for_initial_contact",
                "outcome_of_police_encounter",
                "officer_command_at_incident",
                "officer_days_on_force_at_incident",
                "victim_race",
                "victim_gender",
                "victim_age_range_at_incident",
                "ccrb_case_status",
                "officer_race",
                "officer_gender",
                "officer_age",
                "current_rank",
                "currently_on_the_force",
                "total_complaints",
            ]),
            sentinel_label: "Missing".to_string(),
            numeric_sentinel: -1,
            carry_forward_columns: strings(&[
                "ccrb_received_date",
                schema::INCIDENT_DATE,
                "incident_hour",
                "borough_of_incident_occurrence",
                "precinct_of_incident_occurrence",
                "location_type_of_incident",
                "officer_rank_at_incident",
            ]),
            group_key: schema::COMPLAINT_ID.to_string(),
            feature_columns: features(&[
                (schema::COMPLAINT_ID, schema::COMPLAINT_ID),
                (schema::TAX_ID, schema::TAX_ID),
                (
                    schema::ALLEGATION_RECORD_IDENTITY,
                    schema::ALLEGATION_RECORD_IDENTITY,
                ),
                (schema::INCIDENT_DATE, schema::INCIDENT_DATE),
                ("incident_hour", "incident_hour"),
                ("borough_of_incident_occurrence", "borough"),
                ("precinct_of_incident_occurrence", "precinct"),
                ("location_type_of_incident", "location_type"),
                ("reason_for_initial_contact", "contact_reason"),
                ("outcome_of_police_encounter", "contact_outcome"),
                ("fado_type", "fado_type"),
                ("allegation", "allegation"),
                ("victim_race", "victim_race"),
                ("victim_gender", "victim_gender"),
                ("victim_age_range_at_incident", "victim_age_range"),
                ("officer_rank_at_incident", "officer_rank"),
                ("officer_command_at_incident", "officer_command"),
                ("officer_days_on_force_at_incident", "officer_tenure_days"),
                ("officer_race", "officer_race"),
                ("officer_gender", "officer_gender"),
                ("officer_age", "officer_age"),
                ("currently_on_the_force", "active_officer"),
                ("total_complaints", "officer_complaint_count"),
                ("apu_ccrb_recommended_penalty", "ccrb_recommended_penalty"),
                ("nypd_officer_penalty", "final_penalty"),
            ]),
            categorical_columns: strings(&[
                "borough",
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
                "officer_race",
                "officer_gender",
                "active_officer",
                "ccrb_recommended_penalty",
                "final_penalty",
            ]),
            sort_columns: strings(&[
                schema::COMPLAINT_ID,
                schema::TAX_ID,
                schema::ALLEGATION_RECORD_IDENTITY,
            ]),
        }
    }
}

impl PipelineConfig {
    /// Creates a builder for fluent configuration.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Validates the configuration, checking window bounds, projection
    /// consistency, and that no column is claimed by two resolution rules.
    pub fn validate(&self) -> std::result::Result<(), ConfigValidationError> {
        if self.recency_years == 0 {
            return Err(ConfigValidationError::InvalidWindow(self.recency_years));
        }
        if !self.fanout_warning_ratio.is_finite() || self.fanout_warning_ratio < 1.0 {
            return Err(ConfigValidationError::InvalidFanoutRatio(
                self.fanout_warning_ratio,
            ));
        }
        if self.feature_columns.is_empty() {
            return Err(ConfigValidationError::EmptyProjection);
        }

        let mut claimed: Vec<&str> = Vec::new();
        let rule_columns = self
            .eliminated_columns
            .iter()
            .chain(self.semantic_substitutions.iter().map(|s| &s.column))
            .chain(self.sentinel_columns.iter())
            .chain(self.carry_forward_columns.iter());
        for column in rule_columns {
            if claimed.contains(&column.as_str()) {
                return Err(ConfigValidationError::OverlappingRule(column.clone()));
            }
            claimed.push(column);
        }

        let mut names: Vec<&str> = Vec::new();
        for feature in &self.feature_columns {
            if names.contains(&feature.name.as_str()) {
                return Err(ConfigValidationError::DuplicateFeature(feature.name.clone()));
            }
            names.push(&feature.name);
            if self.eliminated_columns.contains(&feature.source) {
                return Err(ConfigValidationError::EliminatedFeatureSource(
                    feature.source.clone(),
                ));
            }
        }
        for column in &self.sort_columns {
            if !names.contains(&column.as_str()) {
                return Err(ConfigValidationError::UnknownSortColumn(column.clone()));
            }
        }
        for column in &self.categorical_columns {
            if !names.contains(&column.as_str()) {
                return Err(ConfigValidationError::UnknownCategoricalColumn(
                    column.clone(),
                ));
            }
        }
        Ok(())
    }
}

/// Errors from configuration validation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigValidationError {
    #[error("recency window must be at least 1 year, got {0}")]
    InvalidWindow(u32),

    #[error("fan-out warning ratio must be a finite value >= 1.0, got {0}")]
    InvalidFanoutRatio(f64),

    #[error("feature projection list is empty")]
    EmptyProjection,

    #[error("column '{0}' is assigned to more than one resolution rule")]
    OverlappingRule(String),

    #[error("duplicate feature name '{0}' in projection")]
    DuplicateFeature(String),

    #[error("sort column '{0}' is not a projected feature")]
    UnknownSortColumn(String),

    #[error("categorical column '{0}' is not a projected feature")]
    UnknownCategoricalColumn(String),

    #[error("feature source '{0}' is eliminated by the resolver")]
    EliminatedFeatureSource(String),
}

impl From<ConfigValidationError> for crate::error::ReconcileError {
    fn from(err: ConfigValidationError) -> Self {
        crate::error::ReconcileError::InvalidConfig(err.to_string())
    }
}

/// Builder for `PipelineConfig`.
#[derive(Debug, Default)]
pub struct PipelineConfigBuilder {
    recency_years: Option<u32>,
    reference_date: Option<NaiveDate>,
    include_unknown_incident_dates: Option<bool>,
    fanout_warning_ratio: Option<f64>,
    eliminated_columns: Option<Vec<String>>,
    semantic_substitutions: Option<Vec<SemanticSubstitution>>,
    sentinel_columns: Option<Vec<String>>,
    sentinel_label: Option<String>,
    numeric_sentinel: Option<i64>,
    carry_forward_columns: Option<Vec<String>>,
    group_key: Option<String>,
    feature_columns: Option<Vec<FeatureColumn>>,
    categorical_columns: Option<Vec<String>>,
    sort_columns: Option<Vec<String>>,
}

impl PipelineConfigBuilder {
    pub fn recency_years(mut self, years: u32) -> Self {
        self.recency_years = Some(years);
        self
    }

    pub fn reference_date(mut self, date: NaiveDate) -> Self {
        self.reference_date = Some(date);
        self
    }

    pub fn include_unknown_incident_dates(mut self, include: bool) -> Self {
        self.include_unknown_incident_dates = Some(include);
        self
    }

    pub fn fanout_warning_ratio(mut self, ratio: f64) -> Self {
        self.fanout_warning_ratio = Some(ratio);
        self
    }

    pub fn eliminated_columns(mut self, columns: Vec<String>) -> Self {
        self.eliminated_columns = Some(columns);
        self
    }

    pub fn semantic_substitutions(mut self, substitutions: Vec<SemanticSubstitution>) -> Self {
        self.semantic_substitutions = Some(substitutions);
        self
    }

    pub fn sentinel_columns(mut self, columns: Vec<String>) -> Self {
        self.sentinel_columns = Some(columns);
        self
    }

    pub fn sentinel_label(mut self, label: impl Into<String>) -> Self {
        self.sentinel_label = Some(label.into());
        self
    }

    pub fn numeric_sentinel(mut self, sentinel: i64) -> Self {
        self.numeric_sentinel = Some(sentinel);
        self
    }

    pub fn carry_forward_columns(mut self, columns: Vec<String>) -> Self {
        self.carry_forward_columns = Some(columns);
        self
    }

    pub fn group_key(mut self, key: impl Into<String>) -> Self {
        self.group_key = Some(key.into());
        self
    }

    pub fn feature_columns(mut self, columns: Vec<FeatureColumn>) -> Self {
        self.feature_columns = Some(columns);
        self
    }

    pub fn categorical_columns(mut self, columns: Vec<String>) -> Self {
        self.categorical_columns = Some(columns);
        self
    }

    pub fn sort_columns(mut self, columns: Vec<String>) -> Self {
        self.sort_columns = Some(columns);
        self
    }

    /// Builds the configuration, applying defaults and validating.
    pub fn build(self) -> std::result::Result<PipelineConfig, ConfigValidationError> {
        let defaults = PipelineConfig::default();
        let config = PipelineConfig {
            recency_years: self.recency_years.unwrap_or(defaults.recency_years),
            reference_date: self.reference_date.or(defaults.reference_date),
            include_unknown_incident_dates: self
                .include_unknown_incident_dates
                .unwrap_or(defaults.include_unknown_incident_dates),
            fanout_warning_ratio: self
                .fanout_warning_ratio
                .unwrap_or(defaults.fanout_warning_ratio),
            eliminated_columns: self
                .eliminated_columns
                .unwrap_or(defaults.eliminated_columns),
            semantic_substitutions: self
                .semantic_substitutions
                .unwrap_or(defaults.semantic_substitutions),
            sentinel_columns: self.sentinel_columns.unwrap_or(defaults.sentinel_columns),
            sentinel_label: self.sentinel_label.unwrap_or(defaults.sentinel_label),
            numeric_sentinel: self.numeric_sentinel.unwrap_or(defaults.numeric_sentinel),
            carry_forward_columns: self
                .carry_forward_columns
                .unwrap_or(defaults.carry_forward_columns),
            group_key: self.group_key.unwrap_or(defaults.group_key),
            feature_columns: self.feature_columns.unwrap_or(defaults.feature_columns),
            categorical_columns: self
                .categorical_columns
                .unwrap_or(defaults.categorical_columns),
            sort_columns: self.sort_columns.unwrap_or(defaults.sort_columns),
        };
        config.validate()?;
        Ok(config)
    }
}
