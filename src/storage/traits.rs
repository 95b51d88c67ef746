//! Listing store interface.

use serde::{Deserialize, Serialize};

use super::identity::ListingIdentity;
use crate::domain::{IdentityKey, JobListing, ListingStatus, ResultRecord, ScoredListing, rank_results};
use crate::error::Result;

/// A listing's membership in one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunLink {
    pub run_id: String,
    pub key: IdentityKey,
    pub status: ListingStatus,
    /// Last scoring failure, for unscored listings.
    #[serde(default)]
    pub cause: Option<String>,
    pub updated_at: i64,
}

/// Where `upsert_identity` filed a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upserted {
    /// Key the entity is stored under; every alias resolves to it.
    pub key: IdentityKey,
    /// True when the entity was new to the store.
    pub inserted: bool,
}

/// Durable listing storage, shareable across runs.
///
/// Listings are stored once per entity under a canonical key, with an alias
/// index from every identity key to it. `upsert_identity` is atomic per
/// entity and idempotent. Scores and statuses are kept per (run, key).
pub trait ListingStore: Send + Sync {
    /// Resolve `identity` against the alias index, store `listing` unless the
    /// entity is present, record any new aliases, and link it to `run_id`.
    fn upsert_identity(&self, run_id: &str, identity: &ListingIdentity, listing: &JobListing) -> Result<Upserted>;

    /// Store `listing` under exactly `key`. Returns true when the key was new.
    fn upsert(&self, run_id: &str, key: &IdentityKey, listing: &JobListing) -> Result<bool> {
        Ok(self
            .upsert_identity(run_id, &ListingIdentity::exact(key.clone()), listing)?
            .inserted)
    }

    /// Listing stored under `key` or any alias of it.
    fn get(&self, key: &IdentityKey) -> Result<Option<JobListing>>;

    /// Persist a score for (run, key) and mark the link scored.
    fn save_score(&self, run_id: &str, scored: &ScoredListing) -> Result<()>;

    /// Previously saved score for (run, key).
    fn score_for(&self, run_id: &str, key: &IdentityKey) -> Result<Option<ScoredListing>>;

    /// Mark (run, key) unscored, keeping the raw listing.
    fn mark_unscored(&self, run_id: &str, key: &IdentityKey, cause: &str) -> Result<()>;

    /// Links of a run, optionally filtered by status, ordered by key.
    fn run_links(&self, run_id: &str, status: Option<ListingStatus>) -> Result<Vec<RunLink>>;

    /// All scores saved for a run.
    fn run_scores(&self, run_id: &str) -> Result<Vec<ScoredListing>>;

    /// Number of distinct listings across all runs.
    fn listing_count(&self) -> Result<usize>;

    /// Ranked result records for a run, best first.
    fn ranked_results(&self, run_id: &str) -> Result<Vec<ResultRecord>> {
        let mut records: Vec<ResultRecord> = self.run_scores(run_id)?.iter().map(ResultRecord::from).collect();
        rank_results(&mut records);
        Ok(records)
    }
}
