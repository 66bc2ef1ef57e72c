pub mod files;
pub mod product;
pub mod state;
pub mod upload;

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Billing(#[from] billing::BillingError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unusable include pattern `{pattern}`: {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("failed to process pattern `{pattern}`: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: Box<SyncError>,
    },

    #[error("failed to sync {}: {source}", path.display())]
    File {
        path: PathBuf,
        #[source]
        source: Box<SyncError>,
    },

    #[error("failed to write state file {}: {message}", path.display())]
    State { path: PathBuf, message: String },

    #[error(
        "product `{name}` is archived; remove its price or unarchive it in the provider dashboard"
    )]
    ArchivedProduct { name: String },

    #[error(
        "product `{name}` recurring interval cannot be changed from \"{existing}\" to \"{requested}\""
    )]
    IntervalConflict {
        name: String,
        existing: String,
        requested: String,
    },
}

impl SyncError {
    /// Wrap with the content file the failure belongs to; sync is fail-fast
    /// and the path context is what the operator acts on.
    pub fn for_file(self, path: impl Into<PathBuf>) -> Self {
        SyncError::File {
            path: path.into(),
            source: Box::new(self),
        }
    }

    pub fn for_pattern(self, pattern: impl Into<String>) -> Self {
        SyncError::Pattern {
            pattern: pattern.into(),
            source: Box::new(self),
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
