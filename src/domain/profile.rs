//! Candidate profile ("Candidate DNA") and the preferences it is built from.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};

/// Ordered seniority ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Seniority {
    Intern,
    Junior,
    Mid,
    Senior,
    Staff,
    Principal,
}

impl Seniority {
    pub const ALL: [Seniority; 6] = [
        Seniority::Intern,
        Seniority::Junior,
        Seniority::Mid,
        Seniority::Senior,
        Seniority::Staff,
        Seniority::Principal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Seniority::Intern => "intern",
            Seniority::Junior => "junior",
            Seniority::Mid => "mid",
            Seniority::Senior => "senior",
            Seniority::Staff => "staff",
            Seniority::Principal => "principal",
        }
    }

    /// Title prefix used when phrasing search queries.
    pub fn title_prefix(&self) -> &'static str {
        match self {
            Seniority::Intern => "Intern",
            Seniority::Junior => "Junior",
            Seniority::Mid => "",
            Seniority::Senior => "Senior",
            Seniority::Staff => "Staff",
            Seniority::Principal => "Principal",
        }
    }

    /// Parse loose wording ("entry level", "mid-senior", "Sr.") into a level.
    pub fn parse(text: &str) -> Option<Self> {
        let t = text.trim().to_lowercase();
        if t.is_empty() {
            return None;
        }
        if t.contains("principal") || t.contains("distinguished") {
            Some(Seniority::Principal)
        } else if t.contains("staff") || t.contains("lead") {
            Some(Seniority::Staff)
        } else if t.contains("senior") || t.starts_with("sr") || t.contains("mid-senior") {
            Some(Seniority::Senior)
        } else if t.contains("intern") {
            Some(Seniority::Intern)
        } else if t.contains("junior") || t.contains("entry") || t.contains("graduate") || t.starts_with("jr") {
            Some(Seniority::Junior)
        } else if t.contains("mid") || t.contains("intermediate") || t.contains("associate") {
            Some(Seniority::Mid)
        } else {
            None
        }
    }

    /// The level itself followed by its immediate neighbours on the ladder.
    pub fn adjacent(&self) -> Vec<Seniority> {
        let idx = Self::ALL.iter().position(|s| s == self).unwrap_or(2);
        let mut levels = vec![*self];
        if idx > 0 {
            levels.push(Self::ALL[idx - 1]);
        }
        if idx + 1 < Self::ALL.len() {
            levels.push(Self::ALL[idx + 1]);
        }
        levels
    }

    /// Distance in rungs between two levels.
    pub fn distance(&self, other: Seniority) -> usize {
        let a = Self::ALL.iter().position(|s| *s == *self).unwrap_or(0);
        let b = Self::ALL.iter().position(|s| *s == other).unwrap_or(0);
        a.abs_diff(b)
    }
}

/// Where the candidate is willing to work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemotePolicy {
    Onsite,
    Hybrid,
    Remote,
    Any,
}

impl RemotePolicy {
    pub fn wants_remote(&self) -> bool {
        matches!(self, RemotePolicy::Remote)
    }
}

/// Employment type filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobType {
    FullTime,
    PartTime,
    Contract,
    Temporary,
    Volunteer,
}

/// A single hard constraint value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum ConstraintValue {
    Text(String),
    List(Vec<String>),
    Flag(bool),
    Range { min: Option<u64>, max: Option<u64> },
}

/// Names of the constraints the builder always derives.
pub mod constraint {
    pub const LOCATION: &str = "location";
    pub const REMOTE_ONLY: &str = "remote_only";
    pub const SALARY_FLOOR: &str = "salary_floor";
    pub const JOB_TYPES: &str = "job_types";
}

/// Stated job preferences, loaded from YAML.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    pub desired_roles: Vec<String>,
    pub locations: Vec<String>,
    pub remote_policy: Option<RemotePolicy>,
    pub salary_floor: Option<u64>,
    pub seniority: Option<Seniority>,
    pub job_types: Vec<JobType>,
    pub domains: Vec<String>,
    pub must_haves: Vec<String>,
    pub notes: String,
}

/// Structured candidate profile. Immutable once built for a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateProfile {
    pub technical_skills: BTreeSet<String>,
    pub soft_skills: BTreeSet<String>,
    pub seniority: Seniority,
    /// Target domains in priority order.
    pub domains: Vec<String>,
    pub constraints: BTreeMap<String, ConstraintValue>,
    pub must_haves: Vec<String>,
    pub summary: String,
}

impl CandidateProfile {
    /// All skills, technical first.
    pub fn skills(&self) -> impl Iterator<Item = &String> {
        self.technical_skills.iter().chain(self.soft_skills.iter())
    }

    pub fn has_skill(&self, skill: &str) -> bool {
        let s = skill.to_lowercase();
        self.technical_skills.contains(&s) || self.soft_skills.contains(&s)
    }

    /// Preferred locations from the `location` constraint.
    pub fn locations(&self) -> Vec<String> {
        match self.constraints.get(constraint::LOCATION) {
            Some(ConstraintValue::List(items)) => items.clone(),
            Some(ConstraintValue::Text(s)) => vec![s.clone()],
            _ => Vec::new(),
        }
    }

    pub fn remote_only(&self) -> bool {
        matches!(self.constraints.get(constraint::REMOTE_ONLY), Some(ConstraintValue::Flag(true)))
    }

    pub fn salary_floor(&self) -> Option<u64> {
        match self.constraints.get(constraint::SALARY_FLOOR) {
            Some(ConstraintValue::Range { min, .. }) => *min,
            _ => None,
        }
    }

    /// Stable digest of the profile, used to tell whether two scores were
    /// produced against the same candidate.
    pub fn fingerprint(&self) -> String {
        let canonical = serde_json::to_vec(self).unwrap_or_default();
        let digest = Sha256::digest(&canonical);
        hex::encode(&digest[..8])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_profile() -> CandidateProfile {
        let mut constraints = BTreeMap::new();
        constraints.insert(
            constraint::LOCATION.to_string(),
            ConstraintValue::List(vec!["Berlin".to_string()]),
        );
        constraints.insert(constraint::REMOTE_ONLY.to_string(), ConstraintValue::Flag(true));
        constraints.insert(
            constraint::SALARY_FLOOR.to_string(),
            ConstraintValue::Range {
                min: Some(70_000),
                max: None,
            },
        );
        CandidateProfile {
            technical_skills: ["python", "rust"].iter().map(|s| s.to_string()).collect(),
            soft_skills: BTreeSet::new(),
            seniority: Seniority::Senior,
            domains: vec!["backend".to_string()],
            constraints,
            must_haves: vec![],
            summary: String::new(),
        }
    }

    #[test]
    fn test_seniority_ordering() {
        assert!(Seniority::Junior < Seniority::Mid);
        assert!(Seniority::Staff > Seniority::Senior);
    }

    #[test]
    fn test_seniority_parse() {
        assert_eq!(Seniority::parse("Entry level"), Some(Seniority::Junior));
        assert_eq!(Seniority::parse("Sr. Engineer"), Some(Seniority::Senior));
        assert_eq!(Seniority::parse("Tech Lead"), Some(Seniority::Staff));
        assert_eq!(Seniority::parse("mid"), Some(Seniority::Mid));
        assert_eq!(Seniority::parse(""), None);
        assert_eq!(Seniority::parse("wizard"), None);
    }

    #[test]
    fn test_seniority_adjacent() {
        assert_eq!(
            Seniority::Mid.adjacent(),
            vec![Seniority::Mid, Seniority::Junior, Seniority::Senior]
        );
        assert_eq!(Seniority::Intern.adjacent(), vec![Seniority::Intern, Seniority::Junior]);
        assert_eq!(
            Seniority::Principal.adjacent(),
            vec![Seniority::Principal, Seniority::Staff]
        );
    }

    #[test]
    fn test_seniority_distance() {
        assert_eq!(Seniority::Junior.distance(Seniority::Senior), 2);
        assert_eq!(Seniority::Senior.distance(Seniority::Senior), 0);
    }

    #[test]
    fn test_profile_constraint_accessors() {
        let profile = sample_profile();
        assert_eq!(profile.locations(), vec!["Berlin".to_string()]);
        assert!(profile.remote_only());
        assert_eq!(profile.salary_floor(), Some(70_000));
        assert!(profile.has_skill("Rust"));
    }

    #[test]
    fn test_fingerprint_is_stable_and_content_sensitive() {
        let a = sample_profile();
        let b = sample_profile();
        assert_eq!(a.fingerprint(), b.fingerprint());

        let mut c = sample_profile();
        c.seniority = Seniority::Staff;
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn test_preferences_yaml_defaults() {
        let prefs: Preferences = serde_yaml::from_str("locations: [Berlin]\nremote_policy: remote\n").unwrap();
        assert_eq!(prefs.locations, vec!["Berlin".to_string()]);
        assert_eq!(prefs.remote_policy, Some(RemotePolicy::Remote));
        assert!(prefs.desired_roles.is_empty());
        assert_eq!(prefs.salary_floor, None);
    }

    #[test]
    fn test_job_type_serialization() {
        let json = serde_json::to_string(&JobType::FullTime).unwrap();
        assert_eq!(json, "\"full-time\"");
    }
}
