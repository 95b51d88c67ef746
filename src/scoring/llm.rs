//! Model-backed scorer.
//!
//! Listings are sent in batches; one completion call scores a whole batch and
//! returns `{"scores": [{"job_id", "relevance_score", "reasoning"}]}`. The model
//! score is blended with the keyword score and the keyword breakdown supplies
//! the attribute checks.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;

use super::FitScorer;
use super::keyword::KeywordFitScorer;
use crate::domain::{AcceptedListing, CandidateProfile, ScoredListing};
use crate::error::{Result, ScoutError};
use crate::llm::{CompletionRequest, LlmClient, PromptRenderer, extract_json};

pub const LLM_BACKEND: &str = "llm";

const SCORE_SYSTEM: &str = "You are a recruiter scoring job listings against a candidate profile. Reply with JSON only.";

const SCORE_PROMPT: &str = "Candidate profile:
- Seniority: {{seniority}}
- Target roles: {{domains}}
- Technical skills: {{skills}}
- Locations: {{locations}}
- Must haves: {{must_haves}}
- Summary: {{summary}}

Job listings:
{{jobs}}

Score each listing from 0 (no match) to 100 (perfect match) for this candidate.
Return {\"scores\": [{\"job_id\": \"...\", \"relevance_score\": 0, \"reasoning\": \"one sentence\"}]}
with exactly one entry per listing, using the job_id given above.";

/// Truncated description length sent per listing.
const DESCRIPTION_CHARS: usize = 600;

#[derive(Debug, Deserialize)]
struct JobScoreBatch {
    #[serde(default)]
    scores: Vec<JobScore>,
}

#[derive(Debug, Deserialize)]
struct JobScore {
    job_id: String,
    relevance_score: i64,
    #[serde(default)]
    reasoning: String,
}

/// Model score blended with the keyword breakdown.
pub struct LlmFitScorer {
    llm: Arc<dyn LlmClient>,
    keyword: KeywordFitScorer,
    batch_size: usize,
    /// Share of the final score taken from the model, 0.0..=1.0.
    model_weight: f32,
}

impl LlmFitScorer {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            llm,
            keyword: KeywordFitScorer,
            batch_size: 10,
            model_weight: 0.7,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_model_weight(mut self, weight: f32) -> Self {
        self.model_weight = weight.clamp(0.0, 1.0);
        self
    }

    fn render_prompt(&self, profile: &CandidateProfile, batch: &[AcceptedListing]) -> String {
        let jobs = batch
            .iter()
            .map(|c| {
                let desc: String = c.listing.description.chars().take(DESCRIPTION_CHARS).collect();
                format!(
                    "- job_id: {}\n  title: {}\n  company: {}\n  location: {}\n  description: {}",
                    c.key, c.listing.title, c.listing.company, c.listing.location, desc
                )
            })
            .collect::<Vec<_>>()
            .join("\n");

        PromptRenderer::new()
            .var("seniority", profile.seniority.as_str())
            .list_var("domains", profile.domains.iter(), "any")
            .list_var("skills", profile.technical_skills.iter(), "none listed")
            .list_var("locations", profile.locations().iter(), "any")
            .list_var("must_haves", profile.must_haves.iter(), "none")
            .var("summary", profile.summary.as_str())
            .var("jobs", jobs)
            .render(SCORE_PROMPT)
    }

    async fn score_chunk(&self, profile: &CandidateProfile, chunk: &[AcceptedListing]) -> Vec<Result<ScoredListing>> {
        let fail_all = |cause: String| -> Vec<Result<ScoredListing>> {
            chunk
                .iter()
                .map(|c| {
                    Err(ScoutError::Scoring {
                        listing: c.key.to_string(),
                        cause: cause.clone(),
                    })
                })
                .collect()
        };

        let request = CompletionRequest::new(SCORE_SYSTEM)
            .with_user_message(self.render_prompt(profile, chunk))
            .with_max_tokens(256 + 128 * chunk.len() as u32);

        let batch: JobScoreBatch = match self.llm.complete(request).await {
            Ok(response) => match extract_json(&response.content).and_then(|v| {
                serde_json::from_value::<JobScoreBatch>(v).map_err(|e| crate::llm::LlmError::InvalidResponse(e.to_string()))
            }) {
                Ok(batch) => batch,
                Err(e) => return fail_all(format!("unparseable score batch: {}", e)),
            },
            Err(e) => return fail_all(e.to_string()),
        };

        let fingerprint = profile.fingerprint();
        chunk
            .iter()
            .map(|candidate| {
                let key = candidate.key.as_str();
                let entry = batch.scores.iter().find(|s| s.job_id.trim() == key).ok_or_else(|| {
                    ScoutError::Scoring {
                        listing: key.to_string(),
                        cause: "model returned no score for listing".to_string(),
                    }
                })?;

                let model_score = entry.relevance_score.clamp(0, 100) as f32;
                let kw = self.keyword.breakdown(profile, &candidate.listing);
                let blended = self.model_weight * model_score + (1.0 - self.model_weight) * kw.score as f32;
                let reasoning = entry.reasoning.trim();

                Ok(ScoredListing {
                    key: candidate.key.clone(),
                    listing: candidate.listing.clone(),
                    score: blended.round().clamp(0.0, 100.0) as u8,
                    rationale: if reasoning.is_empty() {
                        kw.rationale
                    } else {
                        format!("{} ({})", reasoning, kw.rationale)
                    },
                    checks: kw.checks,
                    scored_at: Utc::now(),
                    backend: LLM_BACKEND.to_string(),
                    profile_fingerprint: fingerprint.clone(),
                    variance: None,
                })
            })
            .collect()
    }
}

#[async_trait]
impl FitScorer for LlmFitScorer {
    fn backend(&self) -> &str {
        LLM_BACKEND
    }

    async fn score(&self, profile: &CandidateProfile, candidate: &AcceptedListing) -> Result<ScoredListing> {
        self.score_chunk(profile, std::slice::from_ref(candidate))
            .await
            .pop()
            .unwrap_or_else(|| {
                Err(ScoutError::Scoring {
                    listing: candidate.key.to_string(),
                    cause: "empty batch result".to_string(),
                })
            })
    }

    async fn score_batch(&self, profile: &CandidateProfile, batch: &[AcceptedListing]) -> Vec<Result<ScoredListing>> {
        let mut results = Vec::with_capacity(batch.len());
        for chunk in batch.chunks(self.batch_size) {
            log::debug!("Scoring batch of {} listings with {}", chunk.len(), self.llm.model());
            results.extend(self.score_chunk(profile, chunk).await);
        }
        results
    }
}
