//! Run-scoped deduplication in front of the shared listing store.

use std::collections::BTreeSet;
use std::sync::Arc;

use super::identity::ListingIdentity;
use super::traits::ListingStore;
use crate::domain::{IdentityKey, JobListing};
use crate::error::Result;

/// Result of offering one listing to a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestOutcome {
    /// Canonical key; the same for every alias of the entity.
    pub key: IdentityKey,
    /// First sighting within this run.
    pub accepted: bool,
    /// First sighting in the store as a whole.
    pub newly_stored: bool,
}

/// Decides acceptance against a run's seen-set and persists every sighting.
#[derive(Clone)]
pub struct Deduplicator {
    store: Arc<dyn ListingStore>,
}

impl Deduplicator {
    pub fn new(store: Arc<dyn ListingStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn ListingStore> {
        &self.store
    }

    /// Upsert `listing`, then record its canonical key in `seen`.
    ///
    /// The store resolves every alias of the listing (external id and content
    /// hash) to one canonical key, so a sighting that lost or gained its
    /// external id is still the same entity. The store write happens first: a
    /// crash between the two leaves the listing stored but unseen, and
    /// replaying the page re-accepts it exactly once.
    pub fn ingest(&self, run_id: &str, seen: &mut BTreeSet<IdentityKey>, listing: &JobListing) -> Result<IngestOutcome> {
        let identity = ListingIdentity::of(listing);
        let stored = self.store.upsert_identity(run_id, &identity, listing)?;
        let key = stored.key;
        let newly_stored = stored.inserted;
        let accepted = seen.insert(key.clone());
        if !accepted {
            log::debug!("Duplicate listing {} in run {}", key, run_id);
        }
        Ok(IngestOutcome {
            key,
            accepted,
            newly_stored,
        })
    }
}
