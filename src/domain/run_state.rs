//! RunState - the orchestration's working memory for one run.
//!
//! Everything the state machine needs to re-enter a run after a crash lives
//! here and is checkpointed as a whole.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;

use super::listing::{IdentityKey, JobListing, ScoredListing};
use super::outcome::{RunSummary, StopReason};
use super::profile::{CandidateProfile, Preferences};
use super::query::{QueryOrigin, QueryStatus, SearchQuery};
use crate::discovery::Pagination;
use crate::id::now_ms;

/// Phases of the orchestration state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunPhase {
    Init,
    Planning,
    Discovering,
    Scoring,
    Done,
    Failed,
    Cancelled,
}

impl RunPhase {
    /// Returns true if the run can make no further progress
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunPhase::Done | RunPhase::Failed | RunPhase::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunPhase::Init => "INIT",
            RunPhase::Planning => "PLANNING",
            RunPhase::Discovering => "DISCOVERING",
            RunPhase::Scoring => "SCORING",
            RunPhase::Done => "DONE",
            RunPhase::Failed => "FAILED",
            RunPhase::Cancelled => "CANCELLED",
        }
    }
}

/// Where the resume text comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum ResumeSource {
    /// Already-extracted text.
    Text(String),
    /// A file to hand to the text-extraction capability.
    File(PathBuf),
}

/// Inputs a run was started with. Kept so INIT can be re-entered on resume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunInput {
    pub resume: ResumeSource,
    pub preferences: Preferences,
}

/// A listing accepted by the deduplicator and awaiting (or denied) a score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcceptedListing {
    pub key: IdentityKey,
    pub listing: JobListing,
}

/// Pagination progress of the query currently being discovered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InFlightQuery {
    pub query_id: String,
    pub pagination: Pagination,
}

/// Budget counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BudgetCounters {
    /// Queries dispatched to discovery.
    pub queries_issued: u32,
    /// Queries created by the initial plan.
    pub initial_planned: u32,
    /// Queries created by replan rounds.
    pub replan_planned: u32,
    pub replan_rounds: u32,
    pub pages_fetched: u32,
    pub listings_found: u32,
    pub listings_accepted: u32,
    /// Wall time spent across all process lifetimes of this run.
    pub elapsed_ms: u64,
}

/// Contained (non-fatal) error counts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorCounters {
    pub discovery_failures: u32,
    pub scoring_failures: u32,
    pub planning_degradations: u32,
    /// Discovery failures since the last successful query.
    pub consecutive_discovery_failures: u32,
}

/// The orchestration's working memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    pub id: String,
    pub phase: RunPhase,
    pub input: RunInput,
    pub profile: Option<CandidateProfile>,
    /// Every query of the run, in creation order.
    pub queries: Vec<SearchQuery>,
    /// Identity keys accepted by this run.
    pub seen: BTreeSet<IdentityKey>,
    /// Accepted in the current discovery step, not yet scored.
    pub pending_scoring: Vec<AcceptedListing>,
    pub scored: Vec<ScoredListing>,
    /// Scoring failed; eligible for a rescore pass.
    pub unscored: Vec<AcceptedListing>,
    pub in_flight: Option<InFlightQuery>,
    /// True once the initial plan has been produced.
    pub planned: bool,
    pub budget: BudgetCounters,
    pub errors: ErrorCounters,
    pub stop_reason: Option<StopReason>,
    pub terminal_error: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl RunState {
    /// Create a fresh run in INIT.
    pub fn new(id: impl Into<String>, input: RunInput) -> Self {
        let now = now_ms();
        Self {
            id: id.into(),
            phase: RunPhase::Init,
            input,
            profile: None,
            queries: Vec::new(),
            seen: BTreeSet::new(),
            pending_scoring: Vec::new(),
            scored: Vec::new(),
            unscored: Vec::new(),
            in_flight: None,
            planned: false,
            budget: BudgetCounters::default(),
            errors: ErrorCounters::default(),
            stop_reason: None,
            terminal_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = now_ms();
    }

    /// Index of the best-ranked pending query.
    pub fn next_pending(&self) -> Option<usize> {
        self.queries
            .iter()
            .enumerate()
            .filter(|(_, q)| q.status == QueryStatus::Pending)
            .min_by_key(|(i, q)| (q.rank, *i))
            .map(|(i, _)| i)
    }

    pub fn has_pending(&self) -> bool {
        self.queries.iter().any(|q| q.status == QueryStatus::Pending)
    }

    pub fn query(&self, id: &str) -> Option<&SearchQuery> {
        self.queries.iter().find(|q| q.id == id)
    }

    pub fn query_mut(&mut self, id: &str) -> Option<&mut SearchQuery> {
        self.queries.iter_mut().find(|q| q.id == id)
    }

    pub fn count_origin(&self, origin: QueryOrigin) -> usize {
        self.queries.iter().filter(|q| q.origin == origin).count()
    }

    /// Counts surfaced in the final summary.
    pub fn summary(&self) -> RunSummary {
        RunSummary {
            run_id: self.id.clone(),
            phase: self.phase,
            stop_reason: self.stop_reason,
            queries_planned: self.queries.len() as u32,
            queries_attempted: self.queries.iter().filter(|q| q.attempts > 0).count() as u32,
            queries_failed: self
                .queries
                .iter()
                .filter(|q| q.status == QueryStatus::Failed)
                .count() as u32,
            listings_discovered: self.budget.listings_found,
            listings_accepted: self.budget.listings_accepted,
            listings_scored: self.scored.len() as u32,
            listings_unscored: self.unscored.len() as u32,
            elapsed_ms: self.budget.elapsed_ms,
            error: self.terminal_error.clone(),
        }
    }
}
