//! ID generation utilities for jobscout
//!
//! Provides functions for generating identifiers for runs and queries.

use rand::Rng;

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Generate a unique run ID
///
/// Format: `run-{timestamp_ms}-{random_hex}`
/// Example: `run-1738300800123-a1b2`
pub fn generate_run_id() -> String {
    let random: u16 = rand::rng().random();
    format!("run-{}-{:04x}", now_ms(), random)
}

/// Generate a query ID for a run
///
/// Format: `{run_suffix}-q{index:03}`
/// Example: For run "run-1738300800123-a1b2" and index 2: "a1b2-q002"
pub fn generate_query_id(run_id: &str, index: usize) -> String {
    let run_suffix = run_id.rsplit('-').next().unwrap_or(run_id);
    format!("{}-q{:03}", run_suffix, index)
}
