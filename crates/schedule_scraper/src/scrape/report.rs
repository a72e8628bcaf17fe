/// Summaries produced by a refresh cycle
use crate::db::StoreId;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Outcome of one department's sub-pipeline
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DepartmentReport {
    pub department: String,
    pub classes: usize,
    pub sections: usize,
    /// Rows written to the staging store
    pub inserted: usize,
    /// Rows extracted but not written
    pub skipped: usize,
}

impl DepartmentReport {
    pub fn new(department: &str) -> Self {
        Self {
            department: department.to_string(),
            ..Default::default()
        }
    }
}

/// Outcome of one whole cycle
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
    /// Number of sub-pipelines launched, one per department
    pub launched: usize,
    pub completed: Vec<DepartmentReport>,
    /// Departments whose sub-pipeline aborted
    pub failed: Vec<String>,
    /// The store that became live at the end of the cycle
    pub live: StoreId,
    pub fingerprint: Option<String>,
}

impl CycleReport {
    pub fn inserted(&self) -> usize {
        self.completed.iter().map(|d| d.inserted).sum()
    }

    pub fn skipped(&self) -> usize {
        self.completed.iter().map(|d| d.skipped).sum()
    }
}
