//! Candidate Profile Builder
//!
//! Turns resume text plus stated preferences into a `CandidateProfile`.
//! A language model may be consulted for richer extraction; anything it
//! returns that does not parse falls back to the vocabulary extractor, so
//! the only non-determinism in a run is confined to this step.

pub mod vocabulary;

use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::domain::{CandidateProfile, ConstraintValue, Preferences, RemotePolicy, Seniority, constraint};
use crate::error::{Result, ScoutError};
use crate::llm::{CompletionRequest, LlmClient, PromptRenderer, extract_json};

const PROFILE_SYSTEM: &str = "You extract structured candidate profiles for job matching. Reply with JSON only.";

const PROFILE_PROMPT: &str = "Resume text:
---
{{resume_text}}
---

Additional preferences or context from the candidate:
---
{{preferences}}
---

Extract and merge the above into a single candidate profile. Return a JSON object with:
- technical_skills: list of technologies, languages, frameworks, and tools
- soft_skills: list of communication, teamwork, problem-solving skills
- experience_level: one of intern, junior, mid, senior, staff, principal
- domains: list of target role families, e.g. \"Backend Engineer\"
- must_haves: list of must-have job criteria from the candidate
- location: preferred or current location
- summary: a 2-sentence professional persona summary

Use an empty string or empty list when information is not available. Prefer the candidate's stated preferences when they conflict with resume content.";

/// Shape of the model's profile reply. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ProfileDraft {
    technical_skills: Vec<String>,
    soft_skills: Vec<String>,
    experience_level: String,
    domains: Vec<String>,
    must_haves: Vec<String>,
    location: String,
    summary: String,
}

/// Builds candidate profiles.
pub struct ProfileBuilder {
    llm: Option<Arc<dyn LlmClient>>,
}

impl ProfileBuilder {
    /// Vocabulary-only builder
    pub fn new() -> Self {
        Self { llm: None }
    }

    /// Builder that asks the model first and falls back to vocabulary
    pub fn with_llm(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm: Some(llm) }
    }

    /// Build a profile. Fails with `Extraction` when the resume text is empty
    /// or the preferences lack a location or a remote policy.
    pub async fn build(&self, resume_text: &str, prefs: &Preferences) -> Result<CandidateProfile> {
        if resume_text.trim().is_empty() {
            return Err(ScoutError::Extraction("resume text is empty".to_string()));
        }
        if prefs.locations.iter().all(|l| l.trim().is_empty()) {
            return Err(ScoutError::Extraction(
                "preferences must name at least one location".to_string(),
            ));
        }
        let remote_policy = prefs
            .remote_policy
            .ok_or_else(|| ScoutError::Extraction("preferences must set a remote policy".to_string()))?;

        let draft = match &self.llm {
            Some(llm) => match self.draft_from_llm(llm.as_ref(), resume_text, prefs).await {
                Ok(draft) => Some(draft),
                Err(e) => {
                    log::warn!("Model profile extraction failed, using vocabulary extractor: {}", e);
                    None
                }
            },
            None => None,
        };

        let profile = merge(resume_text, prefs, remote_policy, draft.unwrap_or_default());
        log::info!(
            "Built profile: {:?}, {} technical skills, domains {:?}",
            profile.seniority,
            profile.technical_skills.len(),
            profile.domains
        );
        Ok(profile)
    }

    async fn draft_from_llm(
        &self,
        llm: &dyn LlmClient,
        resume_text: &str,
        prefs: &Preferences,
    ) -> std::result::Result<ProfileDraft, String> {
        let prompt = PromptRenderer::new()
            .var("resume_text", resume_text)
            .var("preferences", describe_preferences(prefs))
            .render(PROFILE_PROMPT);
        let request = CompletionRequest::new(PROFILE_SYSTEM)
            .with_user_message(prompt)
            .with_max_tokens(1024);

        let response = llm.complete(request).await.map_err(|e| e.to_string())?;
        let value = extract_json(&response.content).map_err(|e| e.to_string())?;
        serde_json::from_value(value).map_err(|e| format!("profile JSON has wrong shape: {}", e))
    }
}

impl Default for ProfileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn describe_preferences(prefs: &Preferences) -> String {
    let mut lines = Vec::new();
    if !prefs.desired_roles.is_empty() {
        lines.push(format!("Desired roles: {}", prefs.desired_roles.join(", ")));
    }
    lines.push(format!("Locations: {}", prefs.locations.join(", ")));
    if let Some(policy) = prefs.remote_policy {
        lines.push(format!("Remote policy: {:?}", policy).to_lowercase());
    }
    if let Some(floor) = prefs.salary_floor {
        lines.push(format!("Salary floor: {}", floor));
    }
    if let Some(level) = prefs.seniority {
        lines.push(format!("Seniority: {}", level.as_str()));
    }
    if !prefs.must_haves.is_empty() {
        lines.push(format!("Must-haves: {}", prefs.must_haves.join(", ")));
    }
    if !prefs.notes.trim().is_empty() {
        lines.push(prefs.notes.trim().to_string());
    }
    lines.join("\n")
}

/// Merge vocabulary findings, the model draft, and preferences. Preferences
/// win on seniority, domains order, location, and remote policy.
fn merge(resume_text: &str, prefs: &Preferences, remote_policy: RemotePolicy, draft: ProfileDraft) -> CandidateProfile {
    let mut technical_skills: BTreeSet<String> = vocabulary::find_terms(resume_text, vocabulary::TECHNICAL_SKILLS)
        .into_iter()
        .collect();
    technical_skills.extend(clean_list(&draft.technical_skills));

    let mut soft_skills: BTreeSet<String> = vocabulary::find_terms(resume_text, vocabulary::SOFT_SKILLS)
        .into_iter()
        .collect();
    soft_skills.extend(clean_list(&draft.soft_skills));

    let seniority = prefs
        .seniority
        .or_else(|| Seniority::parse(&draft.experience_level))
        .or_else(|| vocabulary::seniority_from_titles(resume_text))
        .or_else(|| vocabulary::years_of_experience(resume_text).map(vocabulary::seniority_from_years))
        .unwrap_or(Seniority::Mid);

    let mut domains = Vec::new();
    let candidates = prefs
        .desired_roles
        .iter()
        .chain(prefs.domains.iter())
        .cloned()
        .chain(draft.domains.iter().cloned())
        .chain(vocabulary::infer_domains(resume_text));
    for domain in candidates {
        let domain = domain.trim().to_string();
        if !domain.is_empty() && !domains.iter().any(|d: &String| d.eq_ignore_ascii_case(&domain)) {
            domains.push(domain);
        }
    }
    if domains.is_empty() {
        domains.push(vocabulary::DEFAULT_DOMAIN.to_string());
    }

    let mut constraints = BTreeMap::new();
    let mut locations: Vec<String> = prefs
        .locations
        .iter()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect();
    if locations.is_empty() && !draft.location.trim().is_empty() {
        locations.push(draft.location.trim().to_string());
    }
    constraints.insert(constraint::LOCATION.to_string(), ConstraintValue::List(locations));
    constraints.insert(
        constraint::REMOTE_ONLY.to_string(),
        ConstraintValue::Flag(remote_policy == RemotePolicy::Remote),
    );
    if let Some(floor) = prefs.salary_floor {
        constraints.insert(
            constraint::SALARY_FLOOR.to_string(),
            ConstraintValue::Range {
                min: Some(floor),
                max: None,
            },
        );
    }
    if !prefs.job_types.is_empty() {
        let types = prefs
            .job_types
            .iter()
            .filter_map(|t| serde_json::to_value(t).ok())
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect();
        constraints.insert(constraint::JOB_TYPES.to_string(), ConstraintValue::List(types));
    }

    let mut must_haves: Vec<String> = Vec::new();
    for item in prefs.must_haves.iter().chain(draft.must_haves.iter()) {
        let item = item.trim();
        if !item.is_empty() && !must_haves.iter().any(|m| m.eq_ignore_ascii_case(item)) {
            must_haves.push(item.to_string());
        }
    }

    let summary = if draft.summary.trim().is_empty() {
        let top: Vec<&str> = technical_skills.iter().take(5).map(String::as_str).collect();
        format!(
            "{} candidate targeting {} roles, skilled in {}.",
            capitalize(seniority.as_str()),
            domains[0],
            if top.is_empty() { "general software".to_string() } else { top.join(", ") }
        )
    } else {
        draft.summary.trim().to_string()
    };

    CandidateProfile {
        technical_skills,
        soft_skills,
        seniority,
        domains,
        constraints,
        must_haves,
        summary,
    }
}

fn clean_list(items: &[String]) -> impl Iterator<Item = String> + '_ {
    items.iter().map(|s| s.trim().to_lowercase()).filter(|s| !s.is_empty())
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;

    const RESUME: &str = "Jane Doe\nSenior Backend Engineer at Acme\n\
        7 years of experience building Python and Django services on AWS with PostgreSQL.\n\
        Strong communication and mentoring.";

    fn prefs() -> Preferences {
        Preferences {
            locations: vec!["Berlin".to_string()],
            remote_policy: Some(RemotePolicy::Remote),
            salary_floor: Some(70_000),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_build_rejects_empty_resume() {
        let err = ProfileBuilder::new().build("   \n", &prefs()).await.unwrap_err();
        assert!(matches!(err, ScoutError::Extraction(_)));
    }

    #[tokio::test]
    async fn test_build_requires_location_and_remote_policy() {
        let mut no_location = prefs();
        no_location.locations.clear();
        let err = ProfileBuilder::new().build(RESUME, &no_location).await.unwrap_err();
        assert!(err.to_string().contains("location"));

        let mut no_policy = prefs();
        no_policy.remote_policy = None;
        let err = ProfileBuilder::new().build(RESUME, &no_policy).await.unwrap_err();
        assert!(err.to_string().contains("remote policy"));
    }

    #[tokio::test]
    async fn test_build_vocabulary_profile() {
        let profile = ProfileBuilder::new().build(RESUME, &prefs()).await.unwrap();

        assert!(profile.has_skill("python"));
        assert!(profile.has_skill("django"));
        assert!(profile.soft_skills.contains("mentoring"));
        assert_eq!(profile.seniority, Seniority::Senior);
        assert_eq!(profile.domains[0], "Backend Engineer");
        assert_eq!(profile.locations(), vec!["Berlin".to_string()]);
        assert!(profile.remote_only());
        assert_eq!(profile.salary_floor(), Some(70_000));
    }

    #[tokio::test]
    async fn test_preferences_win_on_conflict() {
        let mut p = prefs();
        p.seniority = Some(Seniority::Staff);
        p.desired_roles = vec!["Platform Engineer".to_string()];

        let profile = ProfileBuilder::new().build(RESUME, &p).await.unwrap();
        assert_eq!(profile.seniority, Seniority::Staff);
        assert_eq!(profile.domains[0], "Platform Engineer");
    }

    #[tokio::test]
    async fn test_build_is_deterministic_without_model() {
        let a = ProfileBuilder::new().build(RESUME, &prefs()).await.unwrap();
        let b = ProfileBuilder::new().build(RESUME, &prefs()).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[tokio::test]
    async fn test_build_uses_model_draft() {
        let reply = r#"{"technical_skills": ["Rust", "Tokio"], "experience_level": "junior",
            "domains": ["Systems Engineer"], "must_haves": ["visa sponsorship"],
            "summary": "Systems programmer."}"#;
        let llm = Arc::new(MockLlmClient::new(vec![reply.to_string()]));
        let profile = ProfileBuilder::with_llm(llm.clone()).build(RESUME, &prefs()).await.unwrap();

        assert!(profile.has_skill("rust"));
        assert!(profile.has_skill("python"));
        assert_eq!(profile.seniority, Seniority::Junior);
        assert_eq!(profile.domains[0], "Systems Engineer");
        assert_eq!(profile.must_haves, vec!["visa sponsorship".to_string()]);
        assert_eq!(profile.summary, "Systems programmer.");
        assert_eq!(llm.call_count(), 1);
    }

    #[tokio::test]
    async fn test_unparseable_model_reply_degrades() {
        let llm = Arc::new(MockLlmClient::new(vec!["I cannot help with that".to_string()]));
        let with_model = ProfileBuilder::with_llm(llm).build(RESUME, &prefs()).await.unwrap();
        let without = ProfileBuilder::new().build(RESUME, &prefs()).await.unwrap();
        assert_eq!(with_model, without);
    }
}
