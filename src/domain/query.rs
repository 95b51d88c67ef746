//! Planned search units and their lifecycle.

use serde::{Deserialize, Serialize};

use super::profile::{JobType, RemotePolicy, Seniority};

/// Lifecycle of a query within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QueryStatus {
    Pending,
    InFlight,
    Done,
    Failed,
}

impl QueryStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, QueryStatus::Done | QueryStatus::Failed)
    }
}

/// Whether a query came from the initial plan or a later replan round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryOrigin {
    Initial,
    Replan,
}

/// Structured search parameters handed to the browse capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryParams {
    pub keywords: String,
    pub location: Option<String>,
    pub seniority: Option<Seniority>,
    pub remote: Option<RemotePolicy>,
    #[serde(default)]
    pub job_types: Vec<JobType>,
}

/// A single planned search unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub id: String,
    /// Human-readable query text; also the dedup key between plan rounds.
    pub text: String,
    pub params: QueryParams,
    /// Lower rank runs first.
    pub rank: u32,
    pub status: QueryStatus,
    pub origin: QueryOrigin,
    /// How many times this query text has been dispatched.
    pub attempts: u32,
    pub last_error: Option<String>,
}

impl SearchQuery {
    pub fn new(id: impl Into<String>, text: impl Into<String>, params: QueryParams, rank: u32) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            params,
            rank,
            status: QueryStatus::Pending,
            origin: QueryOrigin::Initial,
            attempts: 0,
            last_error: None,
        }
    }

    pub fn with_origin(mut self, origin: QueryOrigin) -> Self {
        self.origin = origin;
        self
    }

    /// Normalized text used to detect repeated queries.
    pub fn text_key(&self) -> String {
        normalize_query_text(&self.text)
    }

    pub fn mark_in_flight(&mut self) {
        self.status = QueryStatus::InFlight;
        self.attempts += 1;
    }

    pub fn mark_done(&mut self) {
        self.status = QueryStatus::Done;
        self.last_error = None;
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = QueryStatus::Failed;
        self.last_error = Some(error.into());
    }
}

/// Lowercase, whitespace-collapsed form of a query string.
pub fn normalize_query_text(text: &str) -> String {
    text.split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}
