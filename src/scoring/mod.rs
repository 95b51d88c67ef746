//! Fit scoring: how well a listing matches a candidate profile.
//!
//! Backends implement `FitScorer` and are held as `Arc<dyn FitScorer>`, so the
//! orchestrator never knows which one it is driving.

mod keyword;
mod llm;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{AcceptedListing, CandidateProfile, ScoreVariance, ScoredListing};
use crate::error::Result;

pub use keyword::{KEYWORD_BACKEND, KeywordBreakdown, KeywordFitScorer, stated_salary_max};
pub use llm::{LLM_BACKEND, LlmFitScorer};

/// Default allowed drift between two scores of the same pair.
pub const DEFAULT_TOLERANCE: u8 = 5;

#[async_trait]
pub trait FitScorer: Send + Sync {
    /// Short backend name recorded on every score.
    fn backend(&self) -> &str;

    async fn score(&self, profile: &CandidateProfile, candidate: &AcceptedListing) -> Result<ScoredListing>;

    /// Score several listings. Results line up with `batch`; one failure does
    /// not fail the others.
    async fn score_batch(&self, profile: &CandidateProfile, batch: &[AcceptedListing]) -> Vec<Result<ScoredListing>> {
        let mut results = Vec::with_capacity(batch.len());
        for candidate in batch {
            results.push(self.score(profile, candidate).await);
        }
        results
    }
}

/// Which scorer a run uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoringBackend {
    #[default]
    Keyword,
    Llm,
}

/// Attach a variance note to `fresh` when `previous` scored the same listing
/// against the same profile. Returns true when the drift is within tolerance
/// (or there was nothing to compare).
pub fn reconcile(previous: Option<&ScoredListing>, fresh: &mut ScoredListing, tolerance: u8) -> bool {
    let Some(prev) = previous.filter(|p| p.profile_fingerprint == fresh.profile_fingerprint) else {
        return true;
    };

    let delta = fresh.score as i16 - prev.score as i16;
    let within_tolerance = delta.unsigned_abs() <= tolerance as u16;
    let samples = prev.variance.as_ref().map(|v| v.samples).unwrap_or(1) + 1;
    if !within_tolerance {
        tracing::warn!(
            listing = %fresh.key,
            previous = prev.score,
            current = fresh.score,
            delta,
            tolerance,
            "Score drifted beyond tolerance"
        );
    }
    fresh.variance = Some(ScoreVariance {
        previous_score: prev.score,
        delta,
        samples,
        within_tolerance,
    });
    within_tolerance
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{IdentityKey, JobListing};
    use chrono::Utc;

    fn scored(score: u8, fingerprint: &str) -> ScoredListing {
        ScoredListing {
            key: IdentityKey("ext:1".to_string()),
            listing: JobListing {
                external_id: Some("1".to_string()),
                title: "Engineer".to_string(),
                company: "Acme".to_string(),
                description: String::new(),
                location: "Berlin".to_string(),
                url: None,
                date_posted: None,
                discovered_at: Utc::now(),
                source_query: "q1".to_string(),
            },
            score,
            rationale: String::new(),
            checks: vec![],
            scored_at: Utc::now(),
            backend: "llm".to_string(),
            profile_fingerprint: fingerprint.to_string(),
            variance: None,
        }
    }

    #[test]
    fn test_reconcile_without_previous() {
        let mut fresh = scored(70, "fp");
        assert!(reconcile(None, &mut fresh, DEFAULT_TOLERANCE));
        assert!(fresh.variance.is_none());
    }

    #[test]
    fn test_reconcile_within_tolerance() {
        let prev = scored(70, "fp");
        let mut fresh = scored(74, "fp");
        assert!(reconcile(Some(&prev), &mut fresh, DEFAULT_TOLERANCE));
        let v = fresh.variance.unwrap();
        assert_eq!(v.previous_score, 70);
        assert_eq!(v.delta, 4);
        assert_eq!(v.samples, 2);
        assert!(v.within_tolerance);
    }

    #[test]
    fn test_reconcile_beyond_tolerance() {
        let prev = scored(70, "fp");
        let mut fresh = scored(60, "fp");
        assert!(!reconcile(Some(&prev), &mut fresh, DEFAULT_TOLERANCE));
        assert_eq!(fresh.variance.unwrap().delta, -10);
    }

    #[test]
    fn test_reconcile_counts_samples() {
        let mut prev = scored(70, "fp");
        prev.variance = Some(ScoreVariance {
            previous_score: 68,
            delta: 2,
            samples: 2,
            within_tolerance: true,
        });
        let mut fresh = scored(71, "fp");
        reconcile(Some(&prev), &mut fresh, DEFAULT_TOLERANCE);
        assert_eq!(fresh.variance.unwrap().samples, 3);
    }

    #[test]
    fn test_reconcile_ignores_other_profile() {
        let prev = scored(20, "old");
        let mut fresh = scored(90, "new");
        assert!(reconcile(Some(&prev), &mut fresh, DEFAULT_TOLERANCE));
        assert!(fresh.variance.is_none());
    }

    #[tokio::test]
    async fn test_default_batch_scores_each() {
        use crate::domain::{CandidateProfile, Seniority};
        use std::collections::{BTreeMap, BTreeSet};

        let profile = CandidateProfile {
            technical_skills: BTreeSet::new(),
            soft_skills: BTreeSet::new(),
            seniority: Seniority::Mid,
            domains: vec![],
            constraints: BTreeMap::new(),
            must_haves: vec![],
            summary: String::new(),
        };
        let batch: Vec<AcceptedListing> = ["1", "2", "3"]
            .iter()
            .map(|id| AcceptedListing {
                key: IdentityKey(format!("ext:{}", id)),
                listing: scored(0, "fp").listing,
            })
            .collect();

        let results = KeywordFitScorer.score_batch(&profile, &batch).await;
        assert_eq!(results.len(), 3);
        assert_eq!(results[2].as_ref().unwrap().key.as_str(), "ext:3");
    }
}
