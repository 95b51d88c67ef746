//! Listing persistence and deduplication.
//!
//! Two interchangeable `ListingStore` backends share one identity-key scheme:
//! an append-only JSONL directory and a SQLite database.

mod dedup;
mod identity;
mod jsonl;
mod sqlite;
mod traits;

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use dedup::{Deduplicator, IngestOutcome};
pub use identity::{ListingIdentity, content_key, identity_key, normalize_field};
pub use jsonl::JsonlListingStore;
pub use sqlite::SqliteListingStore;
pub use traits::{ListingStore, RunLink, Upserted};

/// Which listing store backend to open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Jsonl,
    Sqlite,
}

/// Open the configured backend rooted at `dir`.
pub fn open_store(backend: StoreBackend, dir: &Path) -> Result<Arc<dyn ListingStore>> {
    log::debug!("Opening {:?} listing store at {}", backend, dir.display());
    Ok(match backend {
        StoreBackend::Jsonl => Arc::new(JsonlListingStore::open(dir)?),
        StoreBackend::Sqlite => Arc::new(SqliteListingStore::open(dir)?),
    })
}

/// Write a run's ranked results to `path` as a pretty JSON array.
/// Returns the number of records written.
pub fn export_results(store: &dyn ListingStore, run_id: &str, path: &Path) -> Result<usize> {
    let records = store.ranked_results(run_id)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(&records)?)?;
    log::info!("Exported {} results for {} to {}", records.len(), run_id, path.display());
    Ok(records.len())
}
