//! Rendering queries as job-board search URLs, and URL canonicalisation.

use url::Url;

use crate::domain::{JobType, QueryParams, RemotePolicy, Seniority};

pub const DEFAULT_SEARCH_BASE: &str = "https://www.linkedin.com/jobs/search";

/// Results per page on the search surface; the paging offset advances by this.
pub const PAGE_SIZE: u32 = 25;

/// Job-type filter code (`f_JT`)
pub fn job_type_code(job_type: JobType) -> &'static str {
    match job_type {
        JobType::FullTime => "F",
        JobType::PartTime => "P",
        JobType::Contract => "C",
        JobType::Temporary => "T",
        JobType::Volunteer => "V",
    }
}

/// Experience filter code (`f_E`): internship=1, entry=2, associate=3,
/// mid-senior=4, director=5.
pub fn experience_code(seniority: Seniority) -> &'static str {
    match seniority {
        Seniority::Intern => "1",
        Seniority::Junior => "2",
        Seniority::Mid => "3",
        Seniority::Senior | Seniority::Staff => "4",
        Seniority::Principal => "5",
    }
}

/// Workplace filter code (`f_WT`). `Any` applies no filter.
pub fn workplace_code(policy: RemotePolicy) -> Option<&'static str> {
    match policy {
        RemotePolicy::Onsite => Some("1"),
        RemotePolicy::Remote => Some("2"),
        RemotePolicy::Hybrid => Some("3"),
        RemotePolicy::Any => None,
    }
}

/// A search URL builder for one query.
#[derive(Debug, Clone)]
pub struct SearchUrl<'a> {
    base: &'a str,
    params: &'a QueryParams,
}

impl<'a> SearchUrl<'a> {
    pub fn new(base: &'a str, params: &'a QueryParams) -> Self {
        Self { base, params }
    }

    /// Render the URL for the page starting at `offset`.
    pub fn render(&self, offset: u32) -> Result<Url, url::ParseError> {
        let mut url = Url::parse(self.base)?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("keywords", &self.params.keywords);
            if let Some(location) = &self.params.location {
                pairs.append_pair("location", location);
            }
            if !self.params.job_types.is_empty() {
                let codes: Vec<&str> = self.params.job_types.iter().map(|t| job_type_code(*t)).collect();
                pairs.append_pair("f_JT", &codes.join(","));
            }
            if let Some(level) = self.params.seniority {
                pairs.append_pair("f_E", experience_code(level));
            }
            if let Some(code) = self.params.remote.and_then(workplace_code) {
                pairs.append_pair("f_WT", code);
            }
            if offset > 0 {
                pairs.append_pair("start", &offset.to_string());
            }
        }
        Ok(url)
    }
}

/// Strip query string and fragment so tracking parameters do not make one
/// posting look like several. Unparseable input is returned unchanged.
pub fn canonicalize_job_url(raw: &str) -> String {
    match Url::parse(raw.trim()) {
        Ok(mut url) if url.has_host() => {
            url.set_query(None);
            url.set_fragment(None);
            url.to_string()
        }
        _ => raw.trim().to_string(),
    }
}
