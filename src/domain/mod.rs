//! Domain types for jobscout
//!
//! This module contains all core domain types:
//! - CandidateProfile / Preferences: the "Candidate DNA" and its inputs
//! - SearchQuery: a planned search unit and its lifecycle
//! - JobListing / ScoredListing: discovered postings and their fit scores
//! - RunState: the orchestration's checkpointed working memory
//! - RunSummary / StopReason: how a run ended

pub mod listing;
pub mod outcome;
pub mod profile;
pub mod query;
pub mod run_state;

pub use listing::{
    AttributeCheck, IdentityKey, JobListing, ListingStatus, ResultRecord, ScoreVariance, ScoredListing, rank_results,
};
pub use outcome::{RunSummary, StopReason};
pub use profile::{CandidateProfile, ConstraintValue, JobType, Preferences, RemotePolicy, Seniority, constraint};
pub use query::{QueryOrigin, QueryParams, QueryStatus, SearchQuery, normalize_query_text};
pub use run_state::{
    AcceptedListing, BudgetCounters, ErrorCounters, InFlightQuery, ResumeSource, RunInput, RunPhase, RunState,
};
