use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::grid::Grid;

/// The persisted schedule: one document per clinic schedule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleDocument {
    pub document_id: String,
    #[serde(default)]
    pub schedule_cells: Grid,
    /// Stamp of the write that produced this document
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

impl ScheduleDocument {
    pub fn empty(document_id: impl Into<String>) -> Self {
        ScheduleDocument {
            document_id: document_id.into(),
            schedule_cells: Grid::default(),
            last_updated: None,
        }
    }

    /// Whether this document was written after `other` was.
    /// An unstamped document is never newer.
    pub fn is_newer_than(&self, other: Option<DateTime<Utc>>) -> bool {
        match (self.last_updated, other) {
            (Some(mine), Some(theirs)) => mine > theirs,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }
}
