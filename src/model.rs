use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Guest {
    pub id: i32,
    pub name: String,
    pub department: Option<String>,
    #[serde(default)]
    pub table_number: Option<u32>,
    #[serde(default)]
    pub check_in_id: Option<String>,
    #[serde(default)]
    pub checked_in: bool,
    #[serde(default)]
    pub checked_in_at: Option<NaiveDateTime>,
    // Set by guest-management code when the record is created; import rows
    // without a timestamp default to the epoch until that code stamps them.
    #[serde(default)]
    pub created_at: NaiveDateTime,
}

impl Guest {
    /// Returns the guest's department trimmed of surrounding whitespace, or
    /// `None` if the field is absent or blank. Blank departments are treated
    /// the same as missing ones everywhere in the engine.
    pub fn normalized_department(&self) -> Option<&str> {
        self.department
            .as_deref()
            .map(str::trim)
            .filter(|department| !department.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table {
    pub table_number: u32,
    pub check_in_id: String,
    pub guests: Vec<Guest>,
}

/// An event's seating state as the engine sees it. Persistence of this
/// structure is the surrounding application's concern.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Event {
    pub guests: Vec<Guest>,
    pub tables: Vec<Table>,
    pub is_assigned: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepartmentCluster {
    pub department: String,
    pub count: usize,
}

/// Result of a clustering check on a single table. Advisory only; consumed
/// by presentation code to render a warning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusteringReport {
    pub has_clustering: bool,
    pub clusters: Vec<DepartmentCluster>,
}
