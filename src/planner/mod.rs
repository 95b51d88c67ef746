//! Query Planner
//!
//! Turns a candidate profile into ranked search queries, and produces
//! follow-up queries when the first plan runs dry.

pub mod search_url;

pub use search_url::{PAGE_SIZE, SearchUrl, canonicalize_job_url};

use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::domain::{
    CandidateProfile, ConstraintValue, JobType, QueryOrigin, QueryParams, QueryStatus, RemotePolicy, SearchQuery,
    Seniority, constraint, normalize_query_text,
};
use crate::error::{Result, ScoutError};
use crate::id::generate_query_id;
use crate::llm::{CompletionRequest, LlmClient, PromptRenderer, extract_json};

const PHRASING_SYSTEM: &str = "You are a technical recruiter writing job-board searches. Reply with JSON only.";

const PHRASING_PROMPT: &str = "Candidate profile:
- Technical skills: {{technical_skills}}
- Experience level: {{experience_level}}
- Must-haves: {{must_haves}}
- Location preference: {{location}}
- Summary: {{summary}}

Rewrite each of these job search queries so it reads like a search a recruiter would paste into a job board. Keep the same order and the same number of queries, keep the seniority and \"remote\" words, and do not add locations:
{{queries}}

Return {\"queries\": [\"...\"]}.";

#[derive(Debug, Deserialize)]
struct PhrasingReply {
    queries: Vec<String>,
}

/// Queries produced by one planning call.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanOutcome {
    pub queries: Vec<SearchQuery>,
    /// The model was asked for phrasing and its answer was discarded.
    pub degraded: bool,
}

/// Builds and extends query plans.
pub struct QueryPlanner {
    llm: Option<Arc<dyn LlmClient>>,
    max_reissue: u32,
}

impl QueryPlanner {
    pub fn new(max_reissue: u32) -> Self {
        Self { llm: None, max_reissue }
    }

    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    /// Initial plan: one query per (domain, adjacent seniority) pair, exact
    /// level first, earlier domains first, capped at `max_queries`.
    pub async fn plan(&self, run_id: &str, profile: &CandidateProfile, max_queries: usize) -> Result<PlanOutcome> {
        let location = profile.locations().into_iter().next();
        let wants_remote = profile.remote_only();

        let mut seen = HashSet::new();
        let mut queries = Vec::new();
        for level in profile.seniority.adjacent() {
            for domain in &profile.domains {
                if queries.len() >= max_queries {
                    break;
                }
                let params = self.params_for(profile, domain, Some(level), location.clone());
                let text = query_text(title_for(level, domain), wants_remote, location.as_deref());
                if !seen.insert(normalize_query_text(&text)) {
                    continue;
                }
                let rank = queries.len() as u32;
                queries.push(SearchQuery::new(generate_query_id(run_id, queries.len()), text, params, rank));
            }
        }

        if queries.is_empty() {
            return Err(ScoutError::Planning(format!(
                "no queries could be planned (max_queries = {})",
                max_queries
            )));
        }

        let degraded = match &self.llm {
            Some(llm) => !self.rephrase(llm.as_ref(), profile, &mut queries).await,
            None => false,
        };

        log::info!("Planned {} initial queries for run {}", queries.len(), run_id);
        Ok(PlanOutcome { queries, degraded })
    }

    /// Follow-up queries: failed ones reissued (bounded), then skill variants
    /// whose text has not been issued before. At most `remaining_budget`.
    pub fn replan(
        &self,
        run_id: &str,
        profile: &CandidateProfile,
        history: &[SearchQuery],
        remaining_budget: usize,
    ) -> Vec<SearchQuery> {
        if remaining_budget == 0 {
            return Vec::new();
        }

        let mut occurrences: HashMap<String, (u32, bool)> = HashMap::new();
        for q in history {
            let entry = occurrences.entry(q.text_key()).or_insert((0, true));
            entry.0 += 1;
            // Reissue only when every instance of this text has failed.
            entry.1 &= q.status == QueryStatus::Failed;
        }

        let next_rank = history.iter().map(|q| q.rank + 1).max().unwrap_or(0);
        let mut planned_keys = HashSet::new();
        let mut out: Vec<SearchQuery> = Vec::new();

        let push = |out: &mut Vec<SearchQuery>, text: String, params: QueryParams| {
            let index = history.len() + out.len();
            let rank = next_rank + out.len() as u32;
            out.push(
                SearchQuery::new(generate_query_id(run_id, index), text, params, rank).with_origin(QueryOrigin::Replan),
            );
        };

        for q in history {
            if out.len() >= remaining_budget {
                break;
            }
            let key = q.text_key();
            let Some((count, all_failed)) = occurrences.get(&key) else {
                continue;
            };
            if *all_failed && *count <= self.max_reissue && planned_keys.insert(key) {
                log::debug!("Reissuing failed query '{}'", q.text);
                push(&mut out, q.text.clone(), q.params.clone());
            }
        }

        let location = profile.locations().into_iter().next();
        let wants_remote = profile.remote_only();
        'variants: for domain in &profile.domains {
            for skill in &profile.technical_skills {
                if out.len() >= remaining_budget {
                    break 'variants;
                }
                let title = title_for(profile.seniority, domain);
                let text = query_text(format!("{} {}", title, skill), wants_remote, location.as_deref());
                let key = normalize_query_text(&text);
                if occurrences.contains_key(&key) || !planned_keys.insert(key) {
                    continue;
                }
                let mut params = self.params_for(profile, domain, Some(profile.seniority), location.clone());
                params.keywords = format!("{} {}", params.keywords, skill);
                push(&mut out, text, params);
            }
        }

        log::info!("Replan for run {} produced {} queries", run_id, out.len());
        out
    }

    fn params_for(
        &self,
        profile: &CandidateProfile,
        domain: &str,
        level: Option<Seniority>,
        location: Option<String>,
    ) -> QueryParams {
        let keywords = match level {
            Some(level) => title_for(level, domain),
            None => domain.to_string(),
        };
        QueryParams {
            keywords,
            location,
            seniority: level,
            remote: Some(if profile.remote_only() {
                RemotePolicy::Remote
            } else {
                RemotePolicy::Any
            }),
            job_types: job_types(profile),
        }
    }

    /// Ask the model to rephrase query text in place. Returns false when the
    /// reply was unusable and the deterministic text was kept.
    async fn rephrase(&self, llm: &dyn LlmClient, profile: &CandidateProfile, queries: &mut [SearchQuery]) -> bool {
        let listing = queries
            .iter()
            .enumerate()
            .map(|(i, q)| format!("{}. {}", i + 1, q.text))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = PromptRenderer::new()
            .list_var("technical_skills", &profile.technical_skills, "(none)")
            .var("experience_level", profile.seniority.as_str())
            .list_var("must_haves", &profile.must_haves, "(none)")
            .list_var("location", profile.locations(), "(unspecified)")
            .var("summary", profile.summary.as_str())
            .var("queries", listing)
            .render(PHRASING_PROMPT);
        let request = CompletionRequest::new(PHRASING_SYSTEM)
            .with_user_message(prompt)
            .with_max_tokens(512);

        let reply = match llm.complete(request).await {
            Ok(response) => extract_json(&response.content)
                .ok()
                .and_then(|v| serde_json::from_value::<PhrasingReply>(v).ok()),
            Err(e) => {
                log::warn!("Query phrasing call failed, keeping planned text: {}", e);
                return false;
            }
        };

        let Some(reply) = reply.filter(|r| r.queries.len() == queries.len()) else {
            log::warn!("Query phrasing reply unusable, keeping planned text");
            return false;
        };

        let mut keys: HashSet<String> = HashSet::new();
        for (query, text) in queries.iter_mut().zip(reply.queries) {
            let text = text.trim().to_string();
            let key = normalize_query_text(&text);
            if !text.is_empty() && keys.insert(key) {
                query.text = text;
            } else {
                keys.insert(query.text_key());
            }
        }
        true
    }
}

fn title_for(level: Seniority, domain: &str) -> String {
    let prefix = level.title_prefix();
    if prefix.is_empty() {
        domain.to_string()
    } else {
        format!("{} {}", prefix, domain)
    }
}

fn query_text(title: String, wants_remote: bool, location: Option<&str>) -> String {
    let mut text = title;
    if wants_remote {
        text.push_str(" remote");
    }
    if let Some(location) = location {
        text.push(' ');
        text.push_str(location);
    }
    text
}

fn job_types(profile: &CandidateProfile) -> Vec<JobType> {
    match profile.constraints.get(constraint::JOB_TYPES) {
        Some(ConstraintValue::List(items)) => items
            .iter()
            .filter_map(|s| serde_json::from_value(serde_json::Value::String(s.clone())).ok())
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;
    use std::collections::{BTreeMap, BTreeSet};

    fn profile(domains: &[&str], seniority: Seniority) -> CandidateProfile {
        let mut constraints = BTreeMap::new();
        constraints.insert(
            constraint::LOCATION.to_string(),
            ConstraintValue::List(vec!["Berlin".to_string()]),
        );
        constraints.insert(constraint::REMOTE_ONLY.to_string(), ConstraintValue::Flag(true));
        constraints.insert(
            constraint::JOB_TYPES.to_string(),
            ConstraintValue::List(vec!["full-time".to_string()]),
        );
        CandidateProfile {
            technical_skills: ["python", "rust"].iter().map(|s| s.to_string()).collect::<BTreeSet<_>>(),
            soft_skills: BTreeSet::new(),
            seniority,
            domains: domains.iter().map(|d| d.to_string()).collect(),
            constraints,
            must_haves: vec![],
            summary: "summary".to_string(),
        }
    }

    #[tokio::test]
    async fn test_plan_covers_domain_by_adjacent_level() {
        let p = profile(&["Backend Engineer", "Data Engineer"], Seniority::Senior);
        let outcome = QueryPlanner::new(1).plan("run-1-abcd", &p, 10).await.unwrap();
        let texts: Vec<&str> = outcome.queries.iter().map(|q| q.text.as_str()).collect();

        assert_eq!(
            texts,
            vec![
                "Senior Backend Engineer remote Berlin",
                "Senior Data Engineer remote Berlin",
                "Backend Engineer remote Berlin",
                "Data Engineer remote Berlin",
                "Staff Backend Engineer remote Berlin",
                "Staff Data Engineer remote Berlin",
            ]
        );
        assert!(!outcome.degraded);
        let ranks: Vec<u32> = outcome.queries.iter().map(|q| q.rank).collect();
        assert_eq!(ranks, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(outcome.queries[0].params.seniority, Some(Seniority::Senior));
        assert_eq!(outcome.queries[0].params.job_types, vec![JobType::FullTime]);
        assert_eq!(outcome.queries[0].id, "abcd-q000");
    }

    #[tokio::test]
    async fn test_plan_respects_cap() {
        let p = profile(&["Backend Engineer", "Data Engineer"], Seniority::Senior);
        let outcome = QueryPlanner::new(1).plan("run-1-abcd", &p, 3).await.unwrap();
        assert_eq!(outcome.queries.len(), 3);
    }

    #[tokio::test]
    async fn test_plan_with_zero_cap_is_planning_error() {
        let p = profile(&["Backend Engineer"], Seniority::Mid);
        let err = QueryPlanner::new(1).plan("run-1", &p, 0).await.unwrap_err();
        assert!(matches!(err, ScoutError::Planning(_)));
    }

    #[tokio::test]
    async fn test_plan_applies_model_phrasing() {
        let p = profile(&["Backend Engineer"], Seniority::Intern);
        let reply = r#"{"queries": ["Backend Intern remote", "Junior Backend Developer remote"]}"#;
        let llm = Arc::new(MockLlmClient::new(vec![reply.to_string()]));
        let outcome = QueryPlanner::new(1).with_llm(llm).plan("run-1", &p, 5).await.unwrap();

        assert!(!outcome.degraded);
        assert_eq!(outcome.queries[0].text, "Backend Intern remote");
        assert_eq!(outcome.queries[1].text, "Junior Backend Developer remote");
        assert_eq!(outcome.queries[0].params.seniority, Some(Seniority::Intern));
    }

    #[tokio::test]
    async fn test_plan_degrades_when_model_fails() {
        let p = profile(&["Backend Engineer"], Seniority::Intern);
        let llm = Arc::new(MockLlmClient::new(vec![]));
        let outcome = QueryPlanner::new(1).with_llm(llm).plan("run-1", &p, 5).await.unwrap();

        assert!(outcome.degraded);
        assert_eq!(outcome.queries[0].text, "Intern Backend Engineer remote Berlin");
    }

    #[test]
    fn test_replan_reissues_failed_once_then_variants() {
        let p = profile(&["Backend Engineer"], Seniority::Senior);
        let planner = QueryPlanner::new(1);
        let params = planner.params_for(&p, "Backend Engineer", Some(Seniority::Senior), None);
        let mut failed = SearchQuery::new("q0", "Senior Backend Engineer remote Berlin", params, 0);
        failed.mark_in_flight();
        failed.mark_failed("timeout");
        let history = vec![failed.clone()];

        let round1 = planner.replan("run-1", &p, &history, 10);
        assert_eq!(round1[0].text, failed.text);
        assert_eq!(round1[0].origin, QueryOrigin::Replan);
        assert_eq!(round1[1].text, "Senior Backend Engineer python remote Berlin");
        assert_eq!(round1[2].text, "Senior Backend Engineer rust remote Berlin");
        assert_eq!(round1.len(), 3);

        // Second failure of the same text is not reissued again.
        let mut history2 = history.clone();
        let mut reissued = round1[0].clone();
        reissued.mark_in_flight();
        reissued.mark_failed("timeout");
        history2.push(reissued);
        for mut q in round1[1..].iter().cloned() {
            q.mark_in_flight();
            q.mark_done();
            history2.push(q);
        }
        assert!(planner.replan("run-1", &p, &history2, 10).is_empty());
    }

    #[test]
    fn test_replan_never_duplicates_and_respects_budget() {
        let p = profile(&["Backend Engineer"], Seniority::Senior);
        let planner = QueryPlanner::new(0);
        let params = planner.params_for(&p, "Backend Engineer", Some(Seniority::Senior), None);
        let mut done = SearchQuery::new("q0", "Senior Backend Engineer python remote Berlin", params, 0);
        done.mark_in_flight();
        done.mark_done();

        let out = planner.replan("run-1", &p, &[done.clone()], 5);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].text, "Senior Backend Engineer rust remote Berlin");
        assert!(out[0].rank > done.rank);

        assert!(planner.replan("run-1", &p, &[done], 0).is_empty());
    }
}
