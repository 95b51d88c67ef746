//! Discovered job listings and their scored form.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Deterministic key identifying one underlying job posting.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityKey(pub String);

impl IdentityKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Raw discovered unit, as produced by the discovery driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobListing {
    /// Identifier exposed by the source site, if any.
    pub external_id: Option<String>,
    pub title: String,
    pub company: String,
    pub description: String,
    pub location: String,
    /// Canonical posting URL (no query string or fragment).
    pub url: Option<String>,
    pub date_posted: Option<NaiveDate>,
    pub discovered_at: DateTime<Utc>,
    /// Query that surfaced this listing.
    pub source_query: String,
}

/// One profile attribute the scorer compared against a listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeCheck {
    pub attribute: String,
    pub detail: String,
    pub matched: bool,
}

/// Record of a score that disagreed with an earlier one for the same pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreVariance {
    pub previous_score: u8,
    pub delta: i16,
    pub samples: u32,
    pub within_tolerance: bool,
}

/// A listing with its fit score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredListing {
    pub key: IdentityKey,
    pub listing: JobListing,
    /// 0..=100
    pub score: u8,
    pub rationale: String,
    #[serde(default)]
    pub checks: Vec<AttributeCheck>,
    pub scored_at: DateTime<Utc>,
    /// "keyword" | "llm"
    pub backend: String,
    pub profile_fingerprint: String,
    #[serde(default)]
    pub variance: Option<ScoreVariance>,
}

impl ScoredListing {
    pub fn matched(&self) -> impl Iterator<Item = &AttributeCheck> {
        self.checks.iter().filter(|c| c.matched)
    }

    pub fn missing(&self) -> impl Iterator<Item = &AttributeCheck> {
        self.checks.iter().filter(|c| !c.matched)
    }
}

/// Scoring status of a stored listing within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListingStatus {
    Discovered,
    Scored,
    Unscored,
}

impl ListingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListingStatus::Discovered => "discovered",
            ListingStatus::Scored => "scored",
            ListingStatus::Unscored => "unscored",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "discovered" => Some(ListingStatus::Discovered),
            "scored" => Some(ListingStatus::Scored),
            "unscored" => Some(ListingStatus::Unscored),
            _ => None,
        }
    }
}

/// Output row for a ranked result set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultRecord {
    pub id: String,
    pub title: String,
    pub company: String,
    pub location: String,
    pub url: Option<String>,
    pub score: u8,
    pub rationale: String,
    pub discovered_at: DateTime<Utc>,
    pub scored_at: DateTime<Utc>,
}

impl From<&ScoredListing> for ResultRecord {
    fn from(scored: &ScoredListing) -> Self {
        Self {
            id: scored.key.0.clone(),
            title: scored.listing.title.clone(),
            company: scored.listing.company.clone(),
            location: scored.listing.location.clone(),
            url: scored.listing.url.clone(),
            score: scored.score,
            rationale: scored.rationale.clone(),
            discovered_at: scored.listing.discovered_at,
            scored_at: scored.scored_at,
        }
    }
}

/// Sort result records by score, best first. Ties break on id for stable output.
pub fn rank_results(records: &mut [ResultRecord]) {
    records.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
}
