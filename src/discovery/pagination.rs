//! Pagination progress for one query, with a repeated-cursor guard.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque continuation token handed back by the browse capability.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageCursor(pub String);

impl PageCursor {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PageCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Why a query stopped paging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PageEnd {
    /// The source reported no further pages
    Exhausted,
    /// The source handed back a cursor we already fetched
    RepeatedCursor,
    /// The per-query page budget was spent
    PageBudget,
}

/// Paging state of the query being discovered. Checkpointed with the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pagination {
    /// Cursor of the next page to fetch; `None` means the first page.
    pub cursor: Option<PageCursor>,
    pub seen_cursors: Vec<PageCursor>,
    pub pages_fetched: u32,
    pub page_budget: u32,
    pub end: Option<PageEnd>,
}

impl Pagination {
    pub fn new(page_budget: u32) -> Self {
        Self {
            cursor: None,
            seen_cursors: Vec::new(),
            pages_fetched: 0,
            page_budget,
            end: None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.end.is_some()
    }

    /// Record a fetched page and move to `next`.
    pub fn advance(&mut self, next: Option<PageCursor>) -> Option<PageEnd> {
        self.pages_fetched += 1;
        if let Some(current) = self.cursor.take() {
            self.seen_cursors.push(current);
        }

        let end = match next {
            None => Some(PageEnd::Exhausted),
            Some(next) if self.seen_cursors.contains(&next) => {
                log::warn!("Cursor {} repeated, ending pagination", next);
                Some(PageEnd::RepeatedCursor)
            }
            Some(_) if self.pages_fetched >= self.page_budget => Some(PageEnd::PageBudget),
            Some(next) => {
                self.cursor = Some(next);
                None
            }
        };
        self.end = end;
        end
    }
}
