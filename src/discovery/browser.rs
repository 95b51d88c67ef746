//! Browse capability: fetch one structured results page for a query.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use super::pagination::PageCursor;
use crate::domain::QueryParams;
use crate::planner::{PAGE_SIZE, SearchUrl};

/// One page request.
#[derive(Debug, Clone, PartialEq)]
pub struct PageRequest {
    pub query_id: String,
    pub query_text: String,
    pub params: QueryParams,
    pub cursor: Option<PageCursor>,
}

/// A listing as the source presents it, before canonicalisation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawListing {
    pub external_id: Option<String>,
    pub title: String,
    pub company: String,
    pub description: String,
    pub location: String,
    pub url: Option<String>,
    pub date_posted: Option<String>,
}

/// One fetched results page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawPage {
    pub listings: Vec<RawListing>,
    pub next_cursor: Option<PageCursor>,
}

/// Errors from the browse capability.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BrowseError {
    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Server error {status}: {message}")]
    Server { status: u16, message: String },

    #[error("Browser session detached: {0}")]
    SessionDetached(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request rejected {status}: {message}")]
    Client { status: u16, message: String },

    #[error("Unparseable page: {0}")]
    Parse(String),
}

impl BrowseError {
    /// Worth retrying after a backoff and a fresh session
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            BrowseError::Timeout(_)
                | BrowseError::RateLimited { .. }
                | BrowseError::Server { .. }
                | BrowseError::SessionDetached(_)
                | BrowseError::Network(_)
        )
    }
}

/// The external browse/search surface.
#[async_trait]
pub trait Browser: Send + Sync {
    /// Host key used for rate limiting
    fn host(&self) -> &str;

    async fn fetch(&self, request: &PageRequest) -> Result<RawPage, BrowseError>;

    /// Drop and re-acquire the underlying session
    async fn reset_session(&self) -> Result<(), BrowseError>;
}

/// Browse adapter for a search endpoint that answers with JSON pages
/// (`{"listings": [...], "next_cursor": "25"}`). Cursors are result offsets.
pub struct HttpSearchBrowser {
    endpoint: String,
    host: String,
    timeout: Duration,
    client: Mutex<reqwest::Client>,
}

impl HttpSearchBrowser {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, BrowseError> {
        let endpoint = endpoint.into();
        let host = url::Url::parse(&endpoint)
            .map_err(|e| BrowseError::Client {
                status: 0,
                message: format!("invalid endpoint {}: {}", endpoint, e),
            })?
            .host_str()
            .unwrap_or_default()
            .to_string();
        let client = build_client(timeout)?;
        Ok(Self {
            endpoint,
            host,
            timeout,
            client: Mutex::new(client),
        })
    }

    fn client(&self) -> Result<reqwest::Client, BrowseError> {
        self.client
            .lock()
            .map(|c| c.clone())
            .map_err(|e| BrowseError::SessionDetached(e.to_string()))
    }
}

fn build_client(timeout: Duration) -> Result<reqwest::Client, BrowseError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| BrowseError::Network(format!("failed to create HTTP client: {}", e)))
}

#[async_trait]
impl Browser for HttpSearchBrowser {
    fn host(&self) -> &str {
        &self.host
    }

    async fn fetch(&self, request: &PageRequest) -> Result<RawPage, BrowseError> {
        let offset = match &request.cursor {
            Some(cursor) => cursor
                .as_str()
                .parse::<u32>()
                .map_err(|_| BrowseError::Parse(format!("cursor {} is not an offset", cursor)))?,
            None => 0,
        };
        let url = SearchUrl::new(&self.endpoint, &request.params)
            .render(offset)
            .map_err(|e| BrowseError::Client {
                status: 0,
                message: e.to_string(),
            })?;

        let response = self
            .client()?
            .get(url)
            .header("Accept", "application/json")
            .header("Accept-Language", "en-US,en;q=0.9")
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    BrowseError::Timeout(e.to_string())
                } else {
                    BrowseError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|h| h.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(BrowseError::RateLimited { retry_after });
        }
        if status.is_server_error() {
            let message = response.text().await.unwrap_or_default();
            return Err(BrowseError::Server {
                status: status.as_u16(),
                message,
            });
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(BrowseError::Client {
                status: status.as_u16(),
                message,
            });
        }

        let mut page: RawPage = response.json().await.map_err(|e| BrowseError::Parse(e.to_string()))?;
        if page.next_cursor.is_none() && page.listings.len() as u32 >= PAGE_SIZE {
            page.next_cursor = Some(PageCursor::new((offset + PAGE_SIZE).to_string()));
        }
        Ok(page)
    }

    async fn reset_session(&self) -> Result<(), BrowseError> {
        let fresh = build_client(self.timeout)?;
        let mut client = self
            .client
            .lock()
            .map_err(|e| BrowseError::SessionDetached(e.to_string()))?;
        *client = fresh;
        log::debug!("Re-acquired HTTP session for {}", self.host);
        Ok(())
    }
}

/// What a scripted query does when fetched.
#[derive(Debug, Clone)]
enum Script {
    /// Pages served in order; cursor `p<n>` points at page n.
    Pages(Vec<Vec<RawListing>>),
    /// Every fetch fails with this error.
    Fail(BrowseError),
}

#[derive(Debug, Default)]
struct ScriptState {
    scripts: HashMap<String, Script>,
    /// Errors injected ahead of the script, per query text.
    injected: HashMap<String, VecDeque<BrowseError>>,
    fetches: Vec<PageRequest>,
    resets: u32,
}

/// Scripted browser for tests and dry runs. Queries are matched by text;
/// unknown queries return an empty final page.
pub struct ScriptedBrowser {
    host: String,
    latency: Duration,
    state: Mutex<ScriptState>,
}

impl ScriptedBrowser {
    pub fn new() -> Self {
        Self {
            host: "scripted.local".to_string(),
            latency: Duration::ZERO,
            state: Mutex::new(ScriptState::default()),
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Simulated time spent in every fetch
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn on_query(self, query_text: &str, pages: Vec<Vec<RawListing>>) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.scripts.insert(query_text.to_string(), Script::Pages(pages));
        }
        self
    }

    pub fn failing_query(self, query_text: &str, error: BrowseError) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.scripts.insert(query_text.to_string(), Script::Fail(error));
        }
        self
    }

    /// Fail the next `times` fetches of `query_text` before the script applies
    pub fn fail_first(self, query_text: &str, times: usize, error: BrowseError) -> Self {
        if let Ok(mut state) = self.state.lock() {
            let queue = state.injected.entry(query_text.to_string()).or_default();
            for _ in 0..times {
                queue.push_back(error.clone());
            }
        }
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.state.lock().map(|s| s.fetches.len()).unwrap_or(0)
    }

    pub fn fetches_for(&self, query_text: &str) -> usize {
        self.state
            .lock()
            .map(|s| s.fetches.iter().filter(|r| r.query_text == query_text).count())
            .unwrap_or(0)
    }

    pub fn reset_count(&self) -> u32 {
        self.state.lock().map(|s| s.resets).unwrap_or(0)
    }

    fn respond(&self, request: &PageRequest) -> Result<RawPage, BrowseError> {
        let mut state = self
            .state
            .lock()
            .map_err(|e| BrowseError::SessionDetached(e.to_string()))?;
        state.fetches.push(request.clone());

        if let Some(err) = state.injected.get_mut(&request.query_text).and_then(|q| q.pop_front()) {
            return Err(err);
        }

        match state.scripts.get(&request.query_text) {
            Some(Script::Fail(err)) => Err(err.clone()),
            Some(Script::Pages(pages)) => {
                let index = match &request.cursor {
                    None => 0,
                    Some(c) => c
                        .as_str()
                        .trim_start_matches('p')
                        .parse::<usize>()
                        .map_err(|_| BrowseError::Parse(format!("unknown cursor {}", c)))?,
                };
                let listings = pages.get(index).cloned().unwrap_or_default();
                let next_cursor = (index + 1 < pages.len()).then(|| PageCursor::new(format!("p{}", index + 1)));
                Ok(RawPage { listings, next_cursor })
            }
            None => Ok(RawPage::default()),
        }
    }
}

impl Default for ScriptedBrowser {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Browser for ScriptedBrowser {
    fn host(&self) -> &str {
        &self.host
    }

    async fn fetch(&self, request: &PageRequest) -> Result<RawPage, BrowseError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.respond(request)
    }

    async fn reset_session(&self) -> Result<(), BrowseError> {
        if let Ok(mut state) = self.state.lock() {
            state.resets += 1;
        }
        Ok(())
    }
}
