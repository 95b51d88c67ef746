//! Deterministic keyword scorer.
//!
//! Weighted sum of four components, each in 0.0..=1.0:
//! - skills (50): matched / (matched + missing) over skills the listing names
//! - seniority (20): 1.0 on the same rung, 0.6 one rung away, 0.0 otherwise
//! - domain (15): 1.0 when a target role family appears in the listing
//! - constraints (15): share of location / remote / salary checks that pass

use async_trait::async_trait;
use chrono::Utc;

use super::FitScorer;
use crate::domain::{AcceptedListing, AttributeCheck, CandidateProfile, JobListing, ScoredListing, Seniority};
use crate::error::Result;
use crate::profile::vocabulary::{TECHNICAL_SKILLS, contains_term, infer_domains, seniority_from_titles};

const SKILL_WEIGHT: f32 = 50.0;
const SENIORITY_WEIGHT: f32 = 20.0;
const DOMAIN_WEIGHT: f32 = 15.0;
const CONSTRAINT_WEIGHT: f32 = 15.0;

/// Neutral component value when the listing says nothing either way.
const UNSTATED: f32 = 0.5;

pub const KEYWORD_BACKEND: &str = "keyword";

/// Full breakdown of a keyword score.
#[derive(Debug, Clone, PartialEq)]
pub struct KeywordBreakdown {
    pub score: u8,
    pub checks: Vec<AttributeCheck>,
    pub rationale: String,
}

/// Pure, deterministic fit scorer. No external calls.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordFitScorer;

impl KeywordFitScorer {
    pub fn new() -> Self {
        Self
    }

    pub fn breakdown(&self, profile: &CandidateProfile, listing: &JobListing) -> KeywordBreakdown {
        let text = format!("{}\n{}", listing.title, listing.description).to_lowercase();
        let mut checks = Vec::new();
        let mut notes = Vec::new();

        // Skills
        let matched: Vec<&String> = profile
            .technical_skills
            .iter()
            .filter(|s| contains_term(&text, s))
            .collect();
        let missing: Vec<&str> = TECHNICAL_SKILLS
            .iter()
            .copied()
            .filter(|s| contains_term(&text, s) && !profile.technical_skills.contains(*s))
            .collect();
        for skill in &matched {
            checks.push(check("skill", skill.as_str(), true));
        }
        for skill in &missing {
            checks.push(check("skill", skill, false));
        }
        let skill_fit = if matched.is_empty() && missing.is_empty() {
            UNSTATED
        } else {
            matched.len() as f32 / (matched.len() + missing.len()) as f32
        };
        notes.push(format!(
            "skills matched: {}; missing: {}",
            list_or_none(matched.iter().map(|s| s.as_str())),
            list_or_none(missing.iter().copied())
        ));

        // Seniority
        let listing_level = seniority_from_titles(&listing.title).or_else(|| Seniority::parse(&listing.title));
        let seniority_fit = match listing_level {
            Some(level) => {
                let fit = match profile.seniority.distance(level) {
                    0 => 1.0,
                    1 => 0.6,
                    _ => 0.0,
                };
                checks.push(check(
                    "seniority",
                    &format!("{} vs {}", level.as_str(), profile.seniority.as_str()),
                    fit > 0.0,
                ));
                notes.push(format!(
                    "seniority: listing {}, candidate {}",
                    level.as_str(),
                    profile.seniority.as_str()
                ));
                fit
            }
            None => {
                notes.push(format!("seniority: not stated, candidate {}", profile.seniority.as_str()));
                UNSTATED
            }
        };

        // Domain
        let inferred = infer_domains(&text);
        let domain_hit = profile.domains.iter().find(|d| {
            contains_term(&text, &d.to_lowercase()) || inferred.iter().any(|i| i.eq_ignore_ascii_case(d))
        });
        let domain_fit = match domain_hit {
            Some(domain) => {
                checks.push(check("domain", domain, true));
                notes.push(format!("domain: {}", domain));
                1.0
            }
            None => {
                let wanted = profile.domains.first().map(String::as_str).unwrap_or("any");
                checks.push(check("domain", wanted, false));
                notes.push(format!("domain: no match for {}", wanted));
                0.0
            }
        };

        // Constraints
        let constraint_checks = constraint_checks(profile, listing, &text);
        let passed = constraint_checks.iter().filter(|c| c.matched).count();
        let constraint_fit = if constraint_checks.is_empty() {
            1.0
        } else {
            passed as f32 / constraint_checks.len() as f32
        };
        for c in &constraint_checks {
            notes.push(format!(
                "{}: {} ({})",
                c.attribute,
                c.detail,
                if c.matched { "ok" } else { "fails" }
            ));
        }
        checks.extend(constraint_checks);

        let raw = SKILL_WEIGHT * skill_fit
            + SENIORITY_WEIGHT * seniority_fit
            + DOMAIN_WEIGHT * domain_fit
            + CONSTRAINT_WEIGHT * constraint_fit;
        let score = raw.round().clamp(0.0, 100.0) as u8;

        KeywordBreakdown {
            score,
            checks,
            rationale: notes.join("; "),
        }
    }
}

#[async_trait]
impl FitScorer for KeywordFitScorer {
    fn backend(&self) -> &str {
        KEYWORD_BACKEND
    }

    async fn score(&self, profile: &CandidateProfile, candidate: &AcceptedListing) -> Result<ScoredListing> {
        let b = self.breakdown(profile, &candidate.listing);
        Ok(ScoredListing {
            key: candidate.key.clone(),
            listing: candidate.listing.clone(),
            score: b.score,
            rationale: b.rationale,
            checks: b.checks,
            scored_at: Utc::now(),
            backend: KEYWORD_BACKEND.to_string(),
            profile_fingerprint: profile.fingerprint(),
            variance: None,
        })
    }
}

fn check(attribute: &str, detail: &str, matched: bool) -> AttributeCheck {
    AttributeCheck {
        attribute: attribute.to_string(),
        detail: detail.to_string(),
        matched,
    }
}

fn list_or_none<'a>(items: impl Iterator<Item = &'a str>) -> String {
    let v: Vec<&str> = items.collect();
    if v.is_empty() { "none".to_string() } else { v.join(", ") }
}

fn is_remote(listing: &JobListing, text: &str) -> bool {
    contains_term(&listing.location.to_lowercase(), "remote") || contains_term(text, "remote")
}

fn constraint_checks(profile: &CandidateProfile, listing: &JobListing, text: &str) -> Vec<AttributeCheck> {
    let mut checks = Vec::new();
    let remote = is_remote(listing, text);

    let locations = profile.locations();
    if !locations.is_empty() {
        let where_ = listing.location.to_lowercase();
        let hit = locations.iter().find(|l| where_.contains(&l.to_lowercase()));
        let ok = hit.is_some() || (remote && profile.remote_only());
        let detail = match hit {
            Some(l) => format!("{} in {}", listing.location, l),
            None => format!("{} not in {}", listing.location, locations.join(", ")),
        };
        checks.push(check("location", &detail, ok));
    }

    if profile.remote_only() {
        let detail = if remote { "remote required, listing is remote" } else { "remote required, listing is not remote" };
        checks.push(check("remote", detail, remote));
    }

    if let Some(floor) = profile.salary_floor() {
        match stated_salary_max(&listing.description) {
            Some(max) => checks.push(check(
                "salary",
                &format!("up to {} against floor {}", max, floor),
                max >= floor,
            )),
            None => checks.push(check("salary", "not stated", true)),
        }
    }

    checks
}

/// Largest salary-looking figure in `text`: "$120,000", "120k", "€95.000".
pub fn stated_salary_max(text: &str) -> Option<u64> {
    text.split(|c: char| c.is_whitespace() || c == '-' || c == '/' || c == '(' || c == ')')
        .filter_map(parse_amount)
        .max()
}

fn parse_amount(word: &str) -> Option<u64> {
    let w = word.trim_matches(|c: char| matches!(c, ',' | '.' | ';' | ':'));
    let has_currency = w.starts_with(['$', '€', '£']);
    let w = w.trim_start_matches(['$', '€', '£']);
    let (digits, thousands) = match w.strip_suffix(['k', 'K']) {
        Some(d) => (d, true),
        None => (w, false),
    };
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit() || c == ',' || c == '.') {
        return None;
    }
    let value: u64 = digits.replace([',', '.'], "").parse().ok()?;
    let value = if thousands { value * 1000 } else { value };
    if (thousands || has_currency) && value >= 10_000 { Some(value) } else { None }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ConstraintValue, IdentityKey, constraint};
    use std::collections::{BTreeMap, BTreeSet};

    fn profile() -> CandidateProfile {
        let mut constraints = BTreeMap::new();
        constraints.insert(
            constraint::LOCATION.to_string(),
            ConstraintValue::List(vec!["Berlin".to_string()]),
        );
        constraints.insert(constraint::REMOTE_ONLY.to_string(), ConstraintValue::Flag(false));
        constraints.insert(
            constraint::SALARY_FLOOR.to_string(),
            ConstraintValue::Range {
                min: Some(80_000),
                max: None,
            },
        );
        CandidateProfile {
            technical_skills: ["rust", "python", "postgresql"].iter().map(|s| s.to_string()).collect(),
            soft_skills: BTreeSet::new(),
            seniority: Seniority::Senior,
            domains: vec!["Backend Engineer".to_string()],
            constraints,
            must_haves: vec![],
            summary: String::new(),
        }
    }

    fn listing(title: &str, description: &str, location: &str) -> JobListing {
        JobListing {
            external_id: Some("1".to_string()),
            title: title.to_string(),
            company: "Acme".to_string(),
            description: description.to_string(),
            location: location.to_string(),
            url: None,
            date_posted: None,
            discovered_at: Utc::now(),
            source_query: "q1".to_string(),
        }
    }

    #[test]
    fn test_strong_fit_scores_high() {
        let b = KeywordFitScorer.breakdown(
            &profile(),
            &listing(
                "Senior Backend Engineer",
                "Rust and PostgreSQL services. Salary $90,000 - $120,000.",
                "Berlin, Germany",
            ),
        );
        assert!(b.score >= 90, "score was {}", b.score);
        assert!(b.rationale.contains("rust"));
        assert!(b.rationale.contains("seniority: listing senior"));
    }

    #[test]
    fn test_weak_fit_cites_missing_skills() {
        let b = KeywordFitScorer.breakdown(
            &profile(),
            &listing("Junior iOS Developer", "Swift and Kotlin apps. Pay 40k.", "Paris"),
        );
        assert!(b.score < 30, "score was {}", b.score);
        assert!(b.rationale.contains("missing: "));
        assert!(b.checks.iter().any(|c| c.attribute == "salary" && !c.matched));
        assert!(b.checks.iter().any(|c| c.attribute == "location" && !c.matched));
    }

    #[test]
    fn test_scoring_is_deterministic() {
        let l = listing("Staff Engineer", "Python, Go, Kubernetes", "Remote");
        let a = KeywordFitScorer.breakdown(&profile(), &l);
        let b = KeywordFitScorer.breakdown(&profile(), &l);
        assert_eq!(a, b);
    }

    #[test]
    fn test_remote_only_check() {
        let mut p = profile();
        p.constraints
            .insert(constraint::REMOTE_ONLY.to_string(), ConstraintValue::Flag(true));
        let onsite = KeywordFitScorer.breakdown(&p, &listing("Backend Engineer", "Rust", "Munich"));
        let remote = KeywordFitScorer.breakdown(&p, &listing("Backend Engineer", "Rust", "Remote (EU)"));
        assert!(onsite.checks.iter().any(|c| c.attribute == "remote" && !c.matched));
        assert!(remote.checks.iter().all(|c| c.matched || c.attribute == "skill"));
        assert!(remote.score > onsite.score);
    }

    #[test]
    fn test_stated_salary_max() {
        assert_eq!(stated_salary_max("Pay: $90,000-$120,000 per year"), Some(120_000));
        assert_eq!(stated_salary_max("between 70k and 85K"), Some(85_000));
        assert_eq!(stated_salary_max("Team of 12000 people"), None);
        assert_eq!(stated_salary_max("no figures"), None);
    }

    #[tokio::test]
    async fn test_score_fills_metadata() {
        let p = profile();
        let candidate = AcceptedListing {
            key: IdentityKey("ext:1".to_string()),
            listing: listing("Backend Engineer", "Rust", "Berlin"),
        };
        let scored = KeywordFitScorer.score(&p, &candidate).await.unwrap();
        assert_eq!(scored.backend, "keyword");
        assert_eq!(scored.profile_fingerprint, p.fingerprint());
        assert!(scored.variance.is_none());
    }
}
