//! Skill, domain and seniority vocabulary for deterministic extraction.

use crate::domain::Seniority;

/// Technical terms recognised in resume and listing text.
pub const TECHNICAL_SKILLS: &[&str] = &[
    "rust", "python", "go", "golang", "java", "kotlin", "scala", "c++", "c#", "typescript",
    "javascript", "ruby", "php", "swift", "sql", "bash", "react", "vue", "angular", "node.js",
    "django", "flask", "fastapi", "spring", "rails", "graphql", "grpc", "postgres", "postgresql",
    "mysql", "sqlite", "mongodb", "redis", "kafka", "rabbitmq", "elasticsearch", "spark", "airflow",
    "dbt", "hadoop", "snowflake", "aws", "gcp", "azure", "docker", "kubernetes", "terraform", "ansible",
    "linux", "git", "ci/cd", "pytorch", "tensorflow", "scikit-learn", "pandas", "numpy", "llm", "nlp",
    "computer vision", "machine learning", "deep learning", "data science", "statistics", "tokio",
    "microservices", "distributed systems", "embedded", "ios", "android", "figma",
];

/// Soft skills recognised in resume text.
pub const SOFT_SKILLS: &[&str] = &[
    "communication", "leadership", "mentoring", "teamwork", "collaboration", "problem-solving",
    "problem solving", "ownership", "stakeholder management", "public speaking", "agile", "scrum",
];

/// Role families and the terms that suggest them. Order is priority order.
pub const DOMAIN_RULES: &[(&str, &[&str])] = &[
    ("Machine Learning Engineer", &["machine learning", "deep learning", "pytorch", "tensorflow", "llm", "nlp", "computer vision"]),
    ("Data Scientist", &["data science", "statistics", "pandas", "scikit-learn"]),
    ("Data Engineer", &["spark", "airflow", "dbt", "hadoop", "snowflake", "kafka", "etl"]),
    ("Backend Engineer", &["backend", "django", "flask", "fastapi", "spring", "rails", "grpc", "microservices", "postgres", "postgresql"]),
    ("Frontend Engineer", &["frontend", "react", "vue", "angular", "css", "figma"]),
    ("DevOps Engineer", &["devops", "kubernetes", "terraform", "ansible", "ci/cd", "sre"]),
    ("Systems Engineer", &["rust", "c++", "embedded", "distributed systems", "tokio", "linux"]),
    ("Mobile Engineer", &["ios", "android", "swift", "kotlin"]),
];

/// Used when nothing in the text suggests a role family.
pub const DEFAULT_DOMAIN: &str = "Software Engineer";

/// True when `term` occurs in `haystack` on word boundaries.
///
/// Both arguments are expected lowercase. Boundaries are any character that
/// is not alphanumeric, so "go" does not match inside "google" while "c++"
/// and "node.js" still match as written.
pub fn contains_term(haystack: &str, term: &str) -> bool {
    if term.is_empty() {
        return false;
    }
    let mut from = 0;
    while let Some(pos) = haystack[from..].find(term) {
        let start = from + pos;
        let end = start + term.len();
        let before_ok = haystack[..start]
            .chars()
            .next_back()
            .map(|c| !c.is_alphanumeric())
            .unwrap_or(true);
        let after_ok = haystack[end..]
            .chars()
            .next()
            .map(|c| !c.is_alphanumeric() && c != '+' && c != '#')
            .unwrap_or(true);
        if before_ok && after_ok {
            return true;
        }
        from = start + haystack[start..].chars().next().map(|c| c.len_utf8()).unwrap_or(1);
    }
    false
}

/// Vocabulary terms found in `text`.
pub fn find_terms(text: &str, vocabulary: &[&str]) -> Vec<String> {
    let lower = text.to_lowercase();
    vocabulary
        .iter()
        .filter(|t| contains_term(&lower, t))
        .map(|t| t.to_string())
        .collect()
}

/// Role families suggested by `text`, ordered by how many terms matched.
pub fn infer_domains(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    let mut hits: Vec<(usize, usize, &str)> = DOMAIN_RULES
        .iter()
        .enumerate()
        .map(|(i, (domain, terms))| (terms.iter().filter(|t| contains_term(&lower, t)).count(), i, *domain))
        .filter(|(n, _, _)| *n > 0)
        .collect();
    hits.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
    hits.into_iter().map(|(_, _, d)| d.to_string()).collect()
}

/// Largest "N years" / "N+ yrs" figure stated in the text.
pub fn years_of_experience(text: &str) -> Option<u32> {
    let lower = text.to_lowercase();
    let words: Vec<&str> = lower.split_whitespace().collect();
    words
        .windows(2)
        .filter(|w| w[1].starts_with("year") || w[1].starts_with("yrs") || w[1].starts_with("yr"))
        .filter_map(|w| w[0].trim_end_matches('+').parse::<u32>().ok())
        .filter(|n| *n < 60)
        .max()
}

pub fn seniority_from_years(years: u32) -> Seniority {
    match years {
        0..=1 => Seniority::Junior,
        2..=4 => Seniority::Mid,
        5..=7 => Seniority::Senior,
        8..=11 => Seniority::Staff,
        _ => Seniority::Principal,
    }
}

const TITLE_NOUNS: &[&str] = &["engineer", "developer", "scientist", "analyst", "architect", "programmer"];

/// Seniority from the first short line that looks like a job title.
pub fn seniority_from_titles(text: &str) -> Option<Seniority> {
    text.lines()
        .map(|l| l.trim().to_lowercase())
        .filter(|l| !l.is_empty() && l.len() <= 80)
        .filter(|l| TITLE_NOUNS.iter().any(|n| contains_term(l, n)))
        .find_map(|l| title_level(&l))
}

fn title_level(line: &str) -> Option<Seniority> {
    const MARKERS: &[(&str, Seniority)] = &[
        ("principal", Seniority::Principal),
        ("distinguished", Seniority::Principal),
        ("staff", Seniority::Staff),
        ("lead", Seniority::Staff),
        ("senior", Seniority::Senior),
        ("sr", Seniority::Senior),
        ("junior", Seniority::Junior),
        ("jr", Seniority::Junior),
        ("graduate", Seniority::Junior),
        ("intern", Seniority::Intern),
    ];
    MARKERS.iter().find(|(m, _)| contains_term(line, m)).map(|(_, s)| *s)
}
