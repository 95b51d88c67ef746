//! JSONL listing store with an in-memory cache.
//!
//! Three append-only files under the store directory:
//! - `listings.jsonl`: one line per identity key, first sighting wins
//! - `links.jsonl`: run membership and status, last line per (run, key) wins
//! - `scores.jsonl`: scores, last line per (run, key) wins
//! - `aliases.jsonl`: identity key to canonical key, first line per alias wins
//!
//! A crash can leave a partial last line. Opening the store drops it from the
//! file, so later appends start on a fresh line.

use std::collections::{BTreeMap, HashMap};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize, de::DeserializeOwned};

use super::identity::ListingIdentity;
use super::traits::{ListingStore, RunLink, Upserted};
use crate::domain::{IdentityKey, JobListing, ListingStatus, ScoredListing};
use crate::error::{Result, ScoutError};
use crate::id::now_ms;

const LISTINGS_FILE: &str = "listings.jsonl";
const LINKS_FILE: &str = "links.jsonl";
const SCORES_FILE: &str = "scores.jsonl";
const ALIASES_FILE: &str = "aliases.jsonl";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ListingLine {
    key: IdentityKey,
    listing: JobListing,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ScoreLine {
    run_id: String,
    scored: ScoredListing,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AliasLine {
    alias: IdentityKey,
    key: IdentityKey,
}

#[derive(Debug, Default)]
struct Cache {
    listings: HashMap<IdentityKey, JobListing>,
    aliases: HashMap<IdentityKey, IdentityKey>,
    links: HashMap<String, BTreeMap<IdentityKey, RunLink>>,
    scores: HashMap<String, BTreeMap<IdentityKey, ScoredListing>>,
}

impl Cache {
    /// Canonical key of an already stored entity matching `identity`.
    fn resolve(&self, identity: &ListingIdentity) -> Option<IdentityKey> {
        if let Some(key) = self.aliases.get(&identity.primary) {
            return Some(key.clone());
        }
        self.aliases
            .get(&identity.content)
            .filter(|key| {
                self.listings
                    .get(*key)
                    .is_none_or(|stored| identity.can_merge_into(stored))
            })
            .cloned()
    }
}

/// JSONL-backed `ListingStore`.
pub struct JsonlListingStore {
    base_path: PathBuf,
    cache: RwLock<Cache>,
}

impl JsonlListingStore {
    /// Open (or create) a store at `base_path`, loading every file into memory.
    pub fn open(base_path: impl AsRef<Path>) -> Result<Self> {
        let base_path = base_path.as_ref().to_path_buf();
        fs::create_dir_all(&base_path)?;

        let mut cache = Cache::default();
        for line in load_lines::<AliasLine>(&base_path.join(ALIASES_FILE))? {
            cache.aliases.entry(line.alias).or_insert(line.key);
        }
        for line in load_lines::<ListingLine>(&base_path.join(LISTINGS_FILE))? {
            cache.aliases.entry(line.key.clone()).or_insert_with(|| line.key.clone());
            cache.listings.entry(line.key).or_insert(line.listing);
        }
        for link in load_lines::<RunLink>(&base_path.join(LINKS_FILE))? {
            cache
                .links
                .entry(link.run_id.clone())
                .or_default()
                .insert(link.key.clone(), link);
        }
        for line in load_lines::<ScoreLine>(&base_path.join(SCORES_FILE))? {
            cache
                .scores
                .entry(line.run_id)
                .or_default()
                .insert(line.scored.key.clone(), line.scored);
        }

        log::debug!(
            "Opened JSONL store at {} ({} listings)",
            base_path.display(),
            cache.listings.len()
        );
        Ok(Self {
            base_path,
            cache: RwLock::new(cache),
        })
    }

    fn append<T: Serialize>(&self, file: &str, record: &T) -> Result<()> {
        let path = self.base_path.join(file);
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        writeln!(file, "{}", serde_json::to_string(record)?)?;
        Ok(())
    }

    fn read_cache(&self) -> Result<std::sync::RwLockReadGuard<'_, Cache>> {
        self.cache.read().map_err(|e| ScoutError::Store(e.to_string()))
    }

    fn write_cache(&self) -> Result<std::sync::RwLockWriteGuard<'_, Cache>> {
        self.cache.write().map_err(|e| ScoutError::Store(e.to_string()))
    }

    /// Append a link line and update the cache. Caller holds the write lock.
    fn put_link(&self, cache: &mut Cache, link: RunLink) -> Result<()> {
        self.append(LINKS_FILE, &link)?;
        cache
            .links
            .entry(link.run_id.clone())
            .or_default()
            .insert(link.key.clone(), link);
        Ok(())
    }
}

/// Parse a JSONL file and repair its tail.
///
/// A torn final line (crash mid-append) is skipped and truncated away; a
/// complete final record missing its newline gets one. A bad line anywhere
/// else is a store error.
fn load_lines<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let bytes = fs::read(path)?;

    let mut segments: Vec<(usize, &[u8])> = Vec::new();
    let mut start = 0;
    for (i, b) in bytes.iter().enumerate() {
        if *b == b'\n' {
            segments.push((start, &bytes[start..i]));
            start = i + 1;
        }
    }
    if start < bytes.len() {
        segments.push((start, &bytes[start..]));
    }
    let last = segments.iter().rposition(|(_, line)| !line.trim_ascii().is_empty());

    let mut records = Vec::new();
    let mut torn_at = None;
    for (i, (offset, line)) in segments.iter().enumerate() {
        if line.trim_ascii().is_empty() {
            continue;
        }
        match serde_json::from_slice(line) {
            Ok(record) => records.push(record),
            Err(e) if Some(i) == last => {
                log::warn!("Dropping torn last line {} of {}: {}", i + 1, path.display(), e);
                torn_at = Some(*offset);
            }
            Err(e) => {
                return Err(ScoutError::Store(format!(
                    "corrupt line {} of {}: {}",
                    i + 1,
                    path.display(),
                    e
                )));
            }
        }
    }

    if let Some(offset) = torn_at {
        OpenOptions::new().write(true).open(path)?.set_len(offset as u64)?;
    } else if bytes.last().is_some_and(|b| *b != b'\n') {
        OpenOptions::new().append(true).open(path)?.write_all(b"\n")?;
    }
    Ok(records)
}

impl ListingStore for JsonlListingStore {
    fn upsert_identity(&self, run_id: &str, identity: &ListingIdentity, listing: &JobListing) -> Result<Upserted> {
        let mut cache = self.write_cache()?;
        let key = cache.resolve(identity).unwrap_or_else(|| identity.primary.clone());

        // Aliases go first: an alias without its listing heals on the next upsert.
        for alias in identity.aliases() {
            if !cache.aliases.contains_key(alias) {
                self.append(
                    ALIASES_FILE,
                    &AliasLine {
                        alias: alias.clone(),
                        key: key.clone(),
                    },
                )?;
                cache.aliases.insert(alias.clone(), key.clone());
            }
        }

        let key = &key;
        let inserted = !cache.listings.contains_key(key);
        if inserted {
            self.append(
                LISTINGS_FILE,
                &ListingLine {
                    key: key.clone(),
                    listing: listing.clone(),
                },
            )?;
            cache.listings.insert(key.clone(), listing.clone());
        }

        let linked = cache.links.get(run_id).map(|l| l.contains_key(key)).unwrap_or(false);
        if !linked {
            self.put_link(
                &mut cache,
                RunLink {
                    run_id: run_id.to_string(),
                    key: key.clone(),
                    status: ListingStatus::Discovered,
                    cause: None,
                    updated_at: now_ms(),
                },
            )?;
        }
        Ok(Upserted {
            key: key.clone(),
            inserted,
        })
    }

    fn get(&self, key: &IdentityKey) -> Result<Option<JobListing>> {
        let cache = self.read_cache()?;
        let key = cache.aliases.get(key).unwrap_or(key);
        Ok(cache.listings.get(key).cloned())
    }

    fn save_score(&self, run_id: &str, scored: &ScoredListing) -> Result<()> {
        let mut cache = self.write_cache()?;
        self.append(
            SCORES_FILE,
            &ScoreLine {
                run_id: run_id.to_string(),
                scored: scored.clone(),
            },
        )?;
        cache
            .scores
            .entry(run_id.to_string())
            .or_default()
            .insert(scored.key.clone(), scored.clone());
        self.put_link(
            &mut cache,
            RunLink {
                run_id: run_id.to_string(),
                key: scored.key.clone(),
                status: ListingStatus::Scored,
                cause: None,
                updated_at: now_ms(),
            },
        )
    }

    fn score_for(&self, run_id: &str, key: &IdentityKey) -> Result<Option<ScoredListing>> {
        Ok(self
            .read_cache()?
            .scores
            .get(run_id)
            .and_then(|s| s.get(key))
            .cloned())
    }

    fn mark_unscored(&self, run_id: &str, key: &IdentityKey, cause: &str) -> Result<()> {
        let mut cache = self.write_cache()?;
        self.put_link(
            &mut cache,
            RunLink {
                run_id: run_id.to_string(),
                key: key.clone(),
                status: ListingStatus::Unscored,
                cause: Some(cause.to_string()),
                updated_at: now_ms(),
            },
        )
    }

    fn run_links(&self, run_id: &str, status: Option<ListingStatus>) -> Result<Vec<RunLink>> {
        let cache = self.read_cache()?;
        Ok(cache
            .links
            .get(run_id)
            .map(|links| {
                links
                    .values()
                    .filter(|l| status.is_none_or(|s| l.status == s))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn run_scores(&self, run_id: &str) -> Result<Vec<ScoredListing>> {
        let cache = self.read_cache()?;
        Ok(cache
            .scores
            .get(run_id)
            .map(|s| s.values().cloned().collect())
            .unwrap_or_default())
    }

    fn listing_count(&self) -> Result<usize> {
        Ok(self.read_cache()?.listings.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn listing(title: &str) -> JobListing {
        JobListing {
            external_id: None,
            title: title.to_string(),
            company: "Acme".to_string(),
            description: String::new(),
            location: "Berlin".to_string(),
            url: None,
            date_posted: None,
            discovered_at: Utc::now(),
            source_query: "q1".to_string(),
        }
    }

    fn scored(key: &str, score: u8) -> ScoredListing {
        ScoredListing {
            key: IdentityKey(key.to_string()),
            listing: listing("Engineer"),
            score,
            rationale: "fits".to_string(),
            checks: vec![],
            scored_at: Utc::now(),
            backend: "keyword".to_string(),
            profile_fingerprint: "fp".to_string(),
            variance: None,
        }
    }

    fn key(s: &str) -> IdentityKey {
        IdentityKey(s.to_string())
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let store = JsonlListingStore::open(temp.path()).unwrap();

        assert!(store.upsert("run-1", &key("ext:1"), &listing("A")).unwrap());
        assert!(!store.upsert("run-1", &key("ext:1"), &listing("A")).unwrap());
        assert_eq!(store.listing_count().unwrap(), 1);
        assert_eq!(store.run_links("run-1", None).unwrap().len(), 1);

        let lines = fs::read_to_string(temp.path().join(LISTINGS_FILE)).unwrap();
        assert_eq!(lines.lines().count(), 1);
    }

    #[test]
    fn test_upsert_links_existing_listing_to_new_run() {
        let temp = TempDir::new().unwrap();
        let store = JsonlListingStore::open(temp.path()).unwrap();
        store.upsert("run-1", &key("ext:1"), &listing("A")).unwrap();

        assert!(!store.upsert("run-2", &key("ext:1"), &listing("A")).unwrap());
        assert_eq!(store.run_links("run-2", None).unwrap().len(), 1);
        assert_eq!(store.listing_count().unwrap(), 1);
    }

    #[test]
    fn test_reupsert_does_not_downgrade_status() {
        let temp = TempDir::new().unwrap();
        let store = JsonlListingStore::open(temp.path()).unwrap();
        store.upsert("run-1", &key("ext:1"), &listing("A")).unwrap();
        store.save_score("run-1", &scored("ext:1", 80)).unwrap();
        store.upsert("run-1", &key("ext:1"), &listing("A")).unwrap();

        let links = store.run_links("run-1", Some(ListingStatus::Scored)).unwrap();
        assert_eq!(links.len(), 1);
    }

    #[test]
    fn test_unscored_then_scored() {
        let temp = TempDir::new().unwrap();
        let store = JsonlListingStore::open(temp.path()).unwrap();
        store.upsert("run-1", &key("ext:1"), &listing("A")).unwrap();
        store.mark_unscored("run-1", &key("ext:1"), "model down").unwrap();

        let unscored = store.run_links("run-1", Some(ListingStatus::Unscored)).unwrap();
        assert_eq!(unscored[0].cause.as_deref(), Some("model down"));
        assert!(store.get(&key("ext:1")).unwrap().is_some());

        store.save_score("run-1", &scored("ext:1", 70)).unwrap();
        assert!(store.run_links("run-1", Some(ListingStatus::Unscored)).unwrap().is_empty());
        assert_eq!(store.score_for("run-1", &key("ext:1")).unwrap().unwrap().score, 70);
    }

    #[test]
    fn test_persistence_across_instances() {
        let temp = TempDir::new().unwrap();
        {
            let store = JsonlListingStore::open(temp.path()).unwrap();
            store.upsert("run-1", &key("ext:1"), &listing("A")).unwrap();
            store.upsert("run-1", &key("ext:2"), &listing("B")).unwrap();
            store.save_score("run-1", &scored("ext:1", 40)).unwrap();
            store.save_score("run-1", &scored("ext:2", 90)).unwrap();
        }

        let store = JsonlListingStore::open(temp.path()).unwrap();
        assert_eq!(store.listing_count().unwrap(), 2);
        let ranked = store.ranked_results("run-1").unwrap();
        assert_eq!(ranked[0].id, "ext:2");
        assert_eq!(ranked[1].id, "ext:1");
    }

    #[test]
    fn test_torn_last_line_is_skipped() {
        let temp = TempDir::new().unwrap();
        {
            let store = JsonlListingStore::open(temp.path()).unwrap();
            store.upsert("run-1", &key("ext:1"), &listing("A")).unwrap();
        }
        let path = temp.path().join(LISTINGS_FILE);
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        write!(file, "{{\"key\": \"ext:2\", \"listi").unwrap();

        {
            let store = JsonlListingStore::open(temp.path()).unwrap();
            assert_eq!(store.listing_count().unwrap(), 1);
            store.upsert("run-1", &key("ext:3"), &listing("C")).unwrap();
            store.upsert("run-1", &key("ext:4"), &listing("D")).unwrap();
        }

        let store = JsonlListingStore::open(temp.path()).unwrap();
        assert_eq!(store.listing_count().unwrap(), 3);
        assert!(store.get(&key("ext:2")).unwrap().is_none());
        assert!(store.get(&key("ext:4")).unwrap().is_some());
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 3);
        assert!(content.ends_with('\n'));
    }

    #[test]
    fn test_last_record_without_newline_is_kept() {
        let temp = TempDir::new().unwrap();
        {
            let store = JsonlListingStore::open(temp.path()).unwrap();
            store.upsert("run-1", &key("ext:1"), &listing("A")).unwrap();
        }
        let path = temp.path().join(LISTINGS_FILE);
        let content = fs::read_to_string(&path).unwrap();
        fs::write(&path, content.trim_end()).unwrap();

        {
            let store = JsonlListingStore::open(temp.path()).unwrap();
            assert_eq!(store.listing_count().unwrap(), 1);
            store.upsert("run-1", &key("ext:2"), &listing("B")).unwrap();
        }

        let store = JsonlListingStore::open(temp.path()).unwrap();
        assert_eq!(store.listing_count().unwrap(), 2);
    }

    #[test]
    fn test_aliases_resolve_across_instances() {
        let temp = TempDir::new().unwrap();
        let mut with_id = listing("Engineer");
        with_id.external_id = Some("7".to_string());
        let without_id = listing("Engineer");
        {
            let store = JsonlListingStore::open(temp.path()).unwrap();
            let first = store
                .upsert_identity("run-1", &ListingIdentity::of(&with_id), &with_id)
                .unwrap();
            assert_eq!(first.key, key("ext:7"));
            assert!(first.inserted);
        }

        let store = JsonlListingStore::open(temp.path()).unwrap();
        let identity = ListingIdentity::of(&without_id);
        let second = store.upsert_identity("run-2", &identity, &without_id).unwrap();
        assert_eq!(second.key, key("ext:7"));
        assert!(!second.inserted);
        assert_eq!(store.listing_count().unwrap(), 1);
        assert!(store.get(&identity.content).unwrap().is_some());
    }

    #[test]
    fn test_corrupt_middle_line_is_store_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(LISTINGS_FILE);
        fs::write(&path, "garbage\n{}\n").unwrap();
        let err = JsonlListingStore::open(temp.path()).err().unwrap();
        assert!(matches!(err, ScoutError::Store(_)));
    }

    #[test]
    fn test_concurrent_upserts_store_each_key_once() {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(JsonlListingStore::open(temp.path()).unwrap());

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for i in 0..10 {
                        store
                            .upsert(&format!("run-{}", t), &key(&format!("ext:{}", i)), &listing("A"))
                            .unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(store.listing_count().unwrap(), 10);
        let lines = fs::read_to_string(temp.path().join(LISTINGS_FILE)).unwrap();
        assert_eq!(lines.lines().count(), 10);
    }
}
