//! Durable RunState checkpoints.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::domain::RunState;
use crate::error::{Result, ScoutError};

/// Where run checkpoints live.
pub trait CheckpointStore: Send + Sync {
    /// Persist the whole state, replacing any earlier checkpoint for the run.
    fn save(&self, state: &RunState) -> Result<()>;

    fn load(&self, run_id: &str) -> Result<Option<RunState>>;

    /// Ids of every checkpointed run, sorted.
    fn list(&self) -> Result<Vec<String>>;
}

/// One JSON file per run, `<dir>/<run_id>.json`.
///
/// Writes go to a sibling temp file which is synced and renamed over the
/// target, so a reader sees either the old checkpoint or the new one.
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, run_id: &str) -> Result<PathBuf> {
        if run_id.is_empty() || run_id.contains(['/', '\\']) || run_id.starts_with('.') {
            return Err(ScoutError::InvalidState(format!("invalid run id '{}'", run_id)));
        }
        Ok(self.dir.join(format!("{}.json", run_id)))
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn save(&self, state: &RunState) -> Result<()> {
        let path = self.path_for(&state.id)?;
        let tmp = path.with_extension("json.tmp");
        {
            let mut file = File::create(&tmp)?;
            file.write_all(&serde_json::to_vec_pretty(state)?)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;
        log::debug!("Checkpointed {} in {}", state.id, state.phase.as_str());
        Ok(())
    }

    fn load(&self, run_id: &str) -> Result<Option<RunState>> {
        let path = self.path_for(run_id)?;
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)?;
        let state = serde_json::from_str(&content)
            .map_err(|e| ScoutError::Store(format!("unreadable checkpoint {}: {}", path.display(), e)))?;
        Ok(Some(state))
    }

    fn list(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json")
                && let Some(stem) = path.file_stem().and_then(|s| s.to_str())
            {
                ids.push(stem.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Preferences, ResumeSource, RunInput, RunPhase};
    use tempfile::TempDir;

    fn state(id: &str) -> RunState {
        RunState::new(
            id,
            RunInput {
                resume: ResumeSource::Text("Rust developer".to_string()),
                preferences: Preferences::default(),
            },
        )
    }

    #[test]
    fn test_save_and_load() {
        let temp = TempDir::new().unwrap();
        let store = FileCheckpointStore::new(temp.path()).unwrap();
        let mut s = state("run-1");
        s.phase = RunPhase::Discovering;
        store.save(&s).unwrap();

        let loaded = store.load("run-1").unwrap().unwrap();
        assert_eq!(loaded, s);
        assert!(!temp.path().join("run-1.json.tmp").exists());
    }

    #[test]
    fn test_save_replaces_previous() {
        let temp = TempDir::new().unwrap();
        let store = FileCheckpointStore::new(temp.path()).unwrap();
        let mut s = state("run-1");
        store.save(&s).unwrap();
        s.phase = RunPhase::Scoring;
        store.save(&s).unwrap();
        assert_eq!(store.load("run-1").unwrap().unwrap().phase, RunPhase::Scoring);
    }

    #[test]
    fn test_load_missing_is_none() {
        let temp = TempDir::new().unwrap();
        let store = FileCheckpointStore::new(temp.path()).unwrap();
        assert!(store.load("run-404").unwrap().is_none());
    }

    #[test]
    fn test_corrupt_checkpoint_is_store_error() {
        let temp = TempDir::new().unwrap();
        let store = FileCheckpointStore::new(temp.path()).unwrap();
        fs::write(temp.path().join("run-1.json"), "{ not json").unwrap();
        assert!(matches!(store.load("run-1"), Err(ScoutError::Store(_))));
    }

    #[test]
    fn test_list_ignores_temp_files() {
        let temp = TempDir::new().unwrap();
        let store = FileCheckpointStore::new(temp.path()).unwrap();
        store.save(&state("run-b")).unwrap();
        store.save(&state("run-a")).unwrap();
        fs::write(temp.path().join("run-c.json.tmp"), "{}").unwrap();
        assert_eq!(store.list().unwrap(), vec!["run-a", "run-b"]);
    }

    #[test]
    fn test_rejects_path_like_run_id() {
        let temp = TempDir::new().unwrap();
        let store = FileCheckpointStore::new(temp.path()).unwrap();
        assert!(store.load("../etc").is_err());
    }
}
