//! Error types for the refresh cycle.

use crate::config::ConfigError;
use crate::db::StoreError;
use crate::extract::ExtractError;
use crate::fetch::FetchError;
use thiserror::Error;

/// Errors raised while running a refresh cycle.
///
/// Variants naming a department are contained to that department's
/// sub-pipeline; everything else ends the process.
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// The root index could not be retrieved
    #[error("Failed to fetch root index: {0}")]
    IndexFetch(#[source] FetchError),

    /// The root index could not be turned into departments
    #[error("Failed to extract departments from root index: {0}")]
    IndexExtract(#[source] ExtractError),

    /// Preparing staging or flipping the switch failed
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Startup configuration is unusable
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A department's page could not be retrieved
    #[error("Failed to fetch page for {department}: {source}")]
    DepartmentFetch {
        department: String,
        #[source]
        source: FetchError,
    },

    /// A department's page could not be parsed
    #[error("Failed to extract records for {department}: {source}")]
    DepartmentExtract {
        department: String,
        #[source]
        source: ExtractError,
    },

    /// The department row itself could not be written
    #[error("Failed to store department {department}: {source}")]
    DepartmentStore {
        department: String,
        #[source]
        source: StoreError,
    },

    /// The sub-pipeline task panicked or was aborted
    #[error("Task for {department} did not complete: {message}")]
    TaskFailed { department: String, message: String },
}

impl ScrapeError {
    /// Returns true if this error must stop the refresh loop.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ScrapeError::IndexFetch(_)
                | ScrapeError::IndexExtract(_)
                | ScrapeError::Store(_)
                | ScrapeError::Config(_)
        )
    }

    /// The department a contained failure belongs to.
    pub fn department(&self) -> Option<&str> {
        match self {
            ScrapeError::DepartmentFetch { department, .. }
            | ScrapeError::DepartmentExtract { department, .. }
            | ScrapeError::DepartmentStore { department, .. }
            | ScrapeError::TaskFailed { department, .. } => Some(department),
            _ => None,
        }
    }
}
