//! Error types for jobscout
//!
//! Centralized error handling using thiserror. The variants follow the run's
//! failure taxonomy: extraction and store errors abort a run, discovery and
//! scoring errors are contained to one query or one listing.

use thiserror::Error;

/// All error types that can occur in jobscout
#[derive(Debug, Error)]
pub enum ScoutError {
    /// No usable candidate profile could be built
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// Query planning failed
    #[error("Planning error: {0}")]
    Planning(String),

    /// A query exhausted its retries against the browse capability
    #[error("Discovery error for query '{query}': {cause}")]
    Discovery { query: String, cause: String },

    /// A listing could not be scored
    #[error("Scoring error for listing {listing}: {cause}")]
    Scoring { listing: String, cause: String },

    /// Durable state is unreadable or inconsistent
    #[error("Store error: {0}")]
    Store(String),

    /// The run was cancelled while waiting on an external call
    #[error("Run cancelled")]
    Cancelled,

    /// Invalid state transition or operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Configuration could not be loaded or is inconsistent
    #[error("Config error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ScoutError {
    /// Returns true if this error must terminate the run in FAILED.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ScoutError::Extraction(_)
                | ScoutError::Store(_)
                | ScoutError::InvalidState(_)
                | ScoutError::Config(_)
                | ScoutError::Io(_)
                | ScoutError::Json(_)
        )
    }
}

impl From<rusqlite::Error> for ScoutError {
    fn from(err: rusqlite::Error) -> Self {
        ScoutError::Store(err.to_string())
    }
}

/// Result type alias for jobscout operations
pub type Result<T> = std::result::Result<T, ScoutError>;
