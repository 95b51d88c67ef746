use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::discovery::{RateLimitConfig, RetryPolicy};
use crate::error::{Result, ScoutError};
use crate::llm::AnthropicConfig;
use crate::orchestrator::{RunSettings, StopCondition};
use crate::scoring::ScoringBackend;
use crate::storage::StoreBackend;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: Option<String>,
    pub run: RunConfig,
    pub discovery: DiscoveryConfig,
    pub scoring: ScoringConfig,
    pub storage: StorageConfig,
    pub llm: LlmConfig,
    pub browser: BrowserConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub max_queries: u32,
    pub replan_cap: u32,
    pub max_replan_rounds: u32,
    pub max_reissue: u32,
    pub target_results: u32,
    pub time_budget_secs: u64,
    pub page_budget: u32,
    pub stop_order: Vec<StopCondition>,
    pub max_consecutive_failures: u32,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_queries: 10,
            replan_cap: 5,
            max_replan_rounds: 2,
            max_reissue: 1,
            target_results: 50,
            time_budget_secs: 1800,
            page_budget: 3,
            stop_order: StopCondition::DEFAULT_ORDER.to_vec(),
            max_consecutive_failures: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    pub min_spacing_ms: u64,
    pub bucket_capacity: u32,
    pub refill_per_sec: f64,
    /// Only values above 1.0 shorten spacing.
    pub relaxation: f64,
    pub rate_limit_backoff_max_ms: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base_ms: 1000,
            backoff_max_ms: 30000,
            min_spacing_ms: 2000,
            bucket_capacity: 5,
            refill_per_sec: 0.5,
            relaxation: 1.0,
            rate_limit_backoff_max_ms: 64000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub backend: ScoringBackend,
    pub batch_size: usize,
    pub tolerance: u8,
    /// Share of an llm score taken from the model, the rest from keywords.
    pub model_weight: f32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            backend: ScoringBackend::Keyword,
            batch_size: 10,
            tolerance: 5,
            model_weight: 0.7,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StoreBackend,
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Jsonl,
            data_dir: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("jobscout"),
        }
    }
}

impl StorageConfig {
    pub fn listings_dir(&self) -> PathBuf {
        self.data_dir.join("listings")
    }

    pub fn runs_dir(&self) -> PathBuf {
        self.data_dir.join("runs")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Consult the model for profile extraction and query phrasing.
    pub enabled: bool,
    pub model: String,
    pub max_tokens: u32,
    pub timeout_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        let anthropic = AnthropicConfig::default();
        Self {
            enabled: false,
            model: anthropic.model,
            max_tokens: anthropic.max_tokens,
            timeout_ms: anthropic.timeout.as_millis() as u64,
        }
    }
}

impl LlmConfig {
    pub fn anthropic(&self) -> AnthropicConfig {
        AnthropicConfig {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            timeout: Duration::from_millis(self.timeout_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub endpoint: String,
    pub timeout_ms: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8931/search".to_string(),
            timeout_ms: 30000,
        }
    }
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path);
        }

        // ~/.config/jobscout/jobscout.yml
        let project_name = env!("CARGO_PKG_NAME");
        if let Some(config_dir) = dirs::config_dir() {
            let primary_config = config_dir.join(project_name).join(format!("{}.yml", project_name));
            if primary_config.exists() {
                match Self::load_from_file(&primary_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from {}: {}", primary_config.display(), e);
                    }
                }
            }
        }

        // ./jobscout.yml
        let fallback_config = PathBuf::from(format!("{}.yml", project_name));
        if fallback_config.exists() {
            match Self::load_from_file(&fallback_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!("Failed to load config from {}: {}", fallback_config.display(), e);
                }
            }
        }

        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| ScoutError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        let config: Self = serde_yaml::from_str(&content)
            .map_err(|e| ScoutError::Config(format!("cannot parse {}: {}", path.display(), e)))?;
        config.validate()?;

        log::info!("Loaded config from: {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.run.max_queries == 0 {
            return Err(ScoutError::Config("run.max_queries must be at least 1".to_string()));
        }
        if self.run.page_budget == 0 {
            return Err(ScoutError::Config("run.page_budget must be at least 1".to_string()));
        }
        if self.discovery.max_attempts == 0 {
            return Err(ScoutError::Config("discovery.max_attempts must be at least 1".to_string()));
        }
        if !(0.0..=1.0).contains(&self.scoring.model_weight) {
            return Err(ScoutError::Config("scoring.model_weight must be within 0..1".to_string()));
        }
        Ok(())
    }

    pub fn run_settings(&self) -> RunSettings {
        RunSettings {
            max_queries: self.run.max_queries,
            replan_cap: self.run.replan_cap,
            max_replan_rounds: self.run.max_replan_rounds,
            page_budget: self.run.page_budget,
            target_results: self.run.target_results,
            time_budget: Duration::from_secs(self.run.time_budget_secs),
            stop_order: self.run.stop_order.clone(),
            max_consecutive_failures: self.run.max_consecutive_failures,
            score_tolerance: self.scoring.tolerance,
        }
    }

    pub fn rate_limit(&self) -> RateLimitConfig {
        RateLimitConfig {
            min_spacing: Duration::from_millis(self.discovery.min_spacing_ms),
            bucket_capacity: self.discovery.bucket_capacity,
            refill_per_sec: self.discovery.refill_per_sec,
            relaxation: self.discovery.relaxation,
            max_backoff: Duration::from_millis(self.discovery.rate_limit_backoff_max_ms),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.discovery.max_attempts,
            base_backoff: Duration::from_millis(self.discovery.backoff_base_ms),
            max_backoff: Duration::from_millis(self.discovery.backoff_max_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.run.max_queries, 10);
        assert_eq!(config.discovery.max_attempts, 3);
        assert_eq!(config.scoring.tolerance, 5);
        assert_eq!(config.storage.backend, StoreBackend::Jsonl);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
run:
  max_queries: 4
  stop_order: [query-budget, target-reached]
scoring:
  backend: llm
storage:
  backend: sqlite
  data_dir: /tmp/jobscout
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.run.max_queries, 4);
        assert_eq!(config.run.replan_cap, 5);
        assert_eq!(config.run.stop_order[0], StopCondition::QueryBudget);
        assert_eq!(config.scoring.backend, ScoringBackend::Llm);
        assert_eq!(config.storage.backend, StoreBackend::Sqlite);
        assert_eq!(config.storage.runs_dir(), PathBuf::from("/tmp/jobscout/runs"));
        assert_eq!(config.discovery.min_spacing_ms, 2000);
    }

    #[test]
    fn test_load_explicit_path() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("jobscout.yml");
        fs::write(&path, "run:\n  target_results: 7\n").unwrap();
        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.run.target_results, 7);
    }

    #[test]
    fn test_missing_explicit_path_is_config_error() {
        let path = PathBuf::from("/nonexistent/jobscout.yml");
        assert!(matches!(Config::load(Some(&path)), Err(ScoutError::Config(_))));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("jobscout.yml");
        fs::write(&path, "run:\n  max_queries: 0\n").unwrap();
        assert!(matches!(Config::load_from_file(&path), Err(ScoutError::Config(_))));
    }

    #[test]
    fn test_conversions() {
        let config = Config::default();
        let settings = config.run_settings();
        assert_eq!(settings.total_query_cap(), 15);
        assert_eq!(settings.time_budget, Duration::from_secs(1800));
        assert_eq!(config.rate_limit().min_spacing, Duration::from_secs(2));
        assert_eq!(config.retry_policy().max_attempts, 3);
        assert_eq!(config.llm.anthropic().timeout, Duration::from_secs(120));
    }
}
