//! SQLite listing store.
//!
//! Listings are keyed by canonical key with a primary-key constraint, so a
//! concurrent double insert of the same key collapses into one row. The
//! `aliases` table maps every identity key to its canonical key. Run links
//! and scores are keyed by (run_id, key).

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{Connection, OptionalExtension, params};

use super::identity::ListingIdentity;
use super::traits::{ListingStore, RunLink, Upserted};
use crate::domain::{IdentityKey, JobListing, ListingStatus, ScoredListing};
use crate::error::{Result, ScoutError};
use crate::id::now_ms;

/// SQLite-backed `ListingStore`.
///
/// `rusqlite::Connection` is not `Sync`, so it sits behind a `Mutex`.
pub struct SqliteListingStore {
    db: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteListingStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteListingStore").finish_non_exhaustive()
    }
}

impl SqliteListingStore {
    /// Open (or create) `listings.db` under `base_dir`.
    pub fn open(base_dir: impl AsRef<Path>) -> Result<Self> {
        let base_dir = base_dir.as_ref();
        std::fs::create_dir_all(base_dir)?;
        let db_path = base_dir.join("listings.db");
        let db = Connection::open(&db_path)
            .map_err(|e| ScoutError::Store(format!("cannot open {}: {}", db_path.display(), e)))?;
        Self::with_connection(db)
    }

    /// In-memory store, for tests and throwaway runs.
    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(db: Connection) -> Result<Self> {
        Self::init_schema(&db)?;
        Ok(Self { db: Mutex::new(db) })
    }

    fn init_schema(db: &Connection) -> Result<()> {
        db.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS listings (
                key TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                company TEXT NOT NULL,
                location TEXT NOT NULL,
                url TEXT,
                discovered_at INTEGER NOT NULL,
                json_data TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS run_listings (
                run_id TEXT NOT NULL,
                key TEXT NOT NULL,
                status TEXT NOT NULL,
                cause TEXT,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (run_id, key)
            );

            CREATE TABLE IF NOT EXISTS aliases (
                alias TEXT PRIMARY KEY,
                key TEXT NOT NULL
            );

            INSERT OR IGNORE INTO aliases (alias, key) SELECT key, key FROM listings;

            CREATE INDEX IF NOT EXISTS idx_run_listings_status ON run_listings(run_id, status);

            CREATE TABLE IF NOT EXISTS scores (
                run_id TEXT NOT NULL,
                key TEXT NOT NULL,
                score INTEGER NOT NULL,
                json_data TEXT NOT NULL,
                PRIMARY KEY (run_id, key)
            );
            "#,
        )?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.db.lock().map_err(|e| ScoutError::Store(e.to_string()))
    }

    fn set_link(db: &Connection, run_id: &str, key: &IdentityKey, status: ListingStatus, cause: Option<&str>) -> Result<()> {
        db.execute(
            "INSERT OR REPLACE INTO run_listings (run_id, key, status, cause, updated_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![run_id, key.as_str(), status.as_str(), cause, now_ms()],
        )?;
        Ok(())
    }
}

fn row_to_link(row: &rusqlite::Row<'_>) -> rusqlite::Result<(String, String, String, Option<String>, i64)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

impl ListingStore for SqliteListingStore {
    fn upsert_identity(&self, run_id: &str, identity: &ListingIdentity, listing: &JobListing) -> Result<Upserted> {
        let mut db = self.conn()?;
        let json = serde_json::to_string(listing)?;
        let tx = db.transaction()?;

        let lookup = "SELECT key FROM aliases WHERE alias = ?1";
        let mut canonical: Option<String> = tx
            .query_row(lookup, params![identity.primary.as_str()], |row| row.get(0))
            .optional()?;
        if canonical.is_none() {
            let by_content: Option<String> = tx
                .query_row(lookup, params![identity.content.as_str()], |row| row.get(0))
                .optional()?;
            if let Some(candidate) = by_content {
                let stored: Option<String> = tx
                    .query_row(
                        "SELECT json_data FROM listings WHERE key = ?1",
                        params![candidate],
                        |row| row.get(0),
                    )
                    .optional()?;
                let stored: Option<JobListing> = stored.map(|j| serde_json::from_str(&j)).transpose()?;
                if stored.is_none_or(|l| identity.can_merge_into(&l)) {
                    canonical = Some(candidate);
                }
            }
        }
        let key = canonical.map(IdentityKey).unwrap_or_else(|| identity.primary.clone());

        for alias in identity.aliases() {
            tx.execute(
                "INSERT OR IGNORE INTO aliases (alias, key) VALUES (?1, ?2)",
                params![alias.as_str(), key.as_str()],
            )?;
        }
        let inserted = tx.execute(
            "INSERT OR IGNORE INTO listings (key, title, company, location, url, discovered_at, json_data)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                key.as_str(),
                listing.title,
                listing.company,
                listing.location,
                listing.url,
                listing.discovered_at.timestamp_millis(),
                json
            ],
        )? == 1;
        tx.execute(
            "INSERT OR IGNORE INTO run_listings (run_id, key, status, cause, updated_at) VALUES (?1, ?2, ?3, NULL, ?4)",
            params![run_id, key.as_str(), ListingStatus::Discovered.as_str(), now_ms()],
        )?;
        tx.commit()?;
        Ok(Upserted { key, inserted })
    }

    fn get(&self, key: &IdentityKey) -> Result<Option<JobListing>> {
        let db = self.conn()?;
        let json: Option<String> = db
            .query_row(
                "SELECT json_data FROM listings
                 WHERE key = COALESCE((SELECT key FROM aliases WHERE alias = ?1), ?1)",
                params![key.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        json.map(|j| serde_json::from_str(&j).map_err(ScoutError::from)).transpose()
    }

    fn save_score(&self, run_id: &str, scored: &ScoredListing) -> Result<()> {
        let db = self.conn()?;
        db.execute(
            "INSERT OR REPLACE INTO scores (run_id, key, score, json_data) VALUES (?1, ?2, ?3, ?4)",
            params![run_id, scored.key.as_str(), scored.score, serde_json::to_string(scored)?],
        )?;
        Self::set_link(&db, run_id, &scored.key, ListingStatus::Scored, None)
    }

    fn score_for(&self, run_id: &str, key: &IdentityKey) -> Result<Option<ScoredListing>> {
        let db = self.conn()?;
        let json: Option<String> = db
            .query_row(
                "SELECT json_data FROM scores WHERE run_id = ?1 AND key = ?2",
                params![run_id, key.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        json.map(|j| serde_json::from_str(&j).map_err(ScoutError::from)).transpose()
    }

    fn mark_unscored(&self, run_id: &str, key: &IdentityKey, cause: &str) -> Result<()> {
        let db = self.conn()?;
        Self::set_link(&db, run_id, key, ListingStatus::Unscored, Some(cause))
    }

    fn run_links(&self, run_id: &str, status: Option<ListingStatus>) -> Result<Vec<RunLink>> {
        let db = self.conn()?;
        let rows = match status {
            Some(status) => {
                let mut stmt = db.prepare(
                    "SELECT run_id, key, status, cause, updated_at FROM run_listings
                     WHERE run_id = ?1 AND status = ?2 ORDER BY key",
                )?;
                stmt.query_map(params![run_id, status.as_str()], row_to_link)?
                    .collect::<rusqlite::Result<Vec<_>>>()?
            }
            None => {
                let mut stmt = db.prepare(
                    "SELECT run_id, key, status, cause, updated_at FROM run_listings
                     WHERE run_id = ?1 ORDER BY key",
                )?;
                stmt.query_map(params![run_id], row_to_link)?
                    .collect::<rusqlite::Result<Vec<_>>>()?
            }
        };

        rows.into_iter()
            .map(|(run_id, key, status, cause, updated_at)| {
                let status = ListingStatus::parse(&status)
                    .ok_or_else(|| ScoutError::Store(format!("unknown listing status '{}'", status)))?;
                Ok(RunLink {
                    run_id,
                    key: IdentityKey(key),
                    status,
                    cause,
                    updated_at,
                })
            })
            .collect()
    }

    fn run_scores(&self, run_id: &str) -> Result<Vec<ScoredListing>> {
        let db = self.conn()?;
        let mut stmt = db.prepare("SELECT json_data FROM scores WHERE run_id = ?1 ORDER BY key")?;
        let rows = stmt
            .query_map(params![run_id], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.iter()
            .map(|j| serde_json::from_str(j).map_err(ScoutError::from))
            .collect()
    }

    fn listing_count(&self) -> Result<usize> {
        let db = self.conn()?;
        let count: i64 = db.query_row("SELECT COUNT(*) FROM listings", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}
