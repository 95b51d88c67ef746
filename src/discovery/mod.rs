//! Discovery: the browse capability, per-host rate limiting, pagination, and
//! the driver that combines them into one retried page fetch per step.

pub mod browser;
pub mod driver;
pub mod pagination;
pub mod rate_limit;

pub use browser::{BrowseError, Browser, HttpSearchBrowser, PageRequest, RawListing, RawPage, ScriptedBrowser};
pub use driver::{DiscoveryDriver, DiscoveryPage, RetryPolicy};
pub use pagination::{PageCursor, PageEnd, Pagination};
pub use rate_limit::{HostRateLimiter, RateLimitConfig};
