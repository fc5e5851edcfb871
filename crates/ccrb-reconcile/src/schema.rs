//! Canonical schema data for the four input relations.
//!
//! Column names here are the post-normalization forms. Everything the
//! pipeline knows about table shape (keys, declared date columns, key
//! uniqueness) lives in this module as data, so the stages themselves
//! stay free of embedded column literals.

use serde::{Deserialize, Serialize};

/// Unique complaint identifier, the spine of the first two joins.
pub const COMPLAINT_ID: &str = "complaint_id";
/// Officer identifier, the key of the final join.
pub const TAX_ID: &str = "tax_id";
/// Disambiguates multiple allegations within one complaint.
pub const ALLEGATION_RECORD_IDENTITY: &str = "allegation_record_identity";
/// Snapshot date every source export carries.
pub const AS_OF_DATE: &str = "as_of_date";
/// Date the incident occurred, the recency-window column.
pub const INCIDENT_DATE: &str = "incident_date";

/// Suffix applied to right-side columns that collide during a join.
pub const JOIN_SUFFIX: &str = "_right";

/// The four input relations, in join order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableKind {
    Complaints,
    Allegations,
    Penalties,
    Officers,
}

impl TableKind {
    pub const ALL: [TableKind; 4] = [
        TableKind::Complaints,
        TableKind::Allegations,
        TableKind::Penalties,
        TableKind::Officers,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            TableKind::Complaints => "complaints",
            TableKind::Allegations => "allegations",
            TableKind::Penalties => "penalties",
            TableKind::Officers => "officers",
        }
    }

    /// Columns that identify a row in this table.
    pub fn key_columns(&self) -> &'static [&'static str] {
        match self {
            TableKind::Complaints => &[COMPLAINT_ID],
            TableKind::Allegations => &[COMPLAINT_ID, ALLEGATION_RECORD_IDENTITY],
            TableKind::Penalties => &[COMPLAINT_ID],
            TableKind::Officers => &[TAX_ID],
        }
    }

    /// Whether the key is expected to be unique. Penalties deliberately
    /// carry multiple rows per complaint.
    pub fn key_is_unique(&self) -> bool {
        !matches!(self, TableKind::Penalties)
    }

    /// Columns that arrive as MM/DD/YYYY strings and must become dates.
    pub fn date_columns(&self) -> &'static [&'static str] {
        match self {
            TableKind::Complaints => &[AS_OF_DATE, "ccrb_received_date", "close_date", INCIDENT_DATE],
            TableKind::Allegations => &[AS_OF_DATE],
            TableKind::Penalties => &[AS_OF_DATE, "date_officer_served_charges"],
            TableKind::Officers => &[AS_OF_DATE],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_table_has_keys_and_snapshot_date() {
        for table in TableKind::ALL {
            assert!(!table.key_columns().is_empty(), "{} has no key", table.name());
            assert!(
                table.date_columns().contains(&AS_OF_DATE),
                "{} missing snapshot date",
                table.name()
            );
        }
    }

    #[test]
    fn test_only_penalties_allow_duplicate_keys() {
        assert!(TableKind::Complaints.key_is_unique());
        assert!(TableKind::Allegations.key_is_unique());
        assert!(!TableKind::Penalties.key_is_unique());
        assert!(TableKind::Officers.key_is_unique());
    }

    #[test]
    fn test_table_kind_serializes_snake_case() {
        let json = serde_json::to_string(&TableKind::Allegations).unwrap();
        assert_eq!(json, "\"allegations\"");
    }
}
