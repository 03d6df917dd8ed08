//! Runtime settings.
//!
//! Everything has a default; a JSON file may override any subset and the
//! command line overrides the file.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::domain::invasions::DEFAULT_SCORE_THRESHOLD;
use crate::polling::FetcherConfig;
use crate::store::DEFAULT_COMPACTION_THRESHOLD;

pub const DEFAULT_URL: &str = "https://content.warframe.com/dynamic/worldState.php";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub url: String,
    /// `None` or empty keeps every table in memory.
    pub storage_root: Option<PathBuf>,
    pub database: String,
    pub categories: BTreeSet<String>,
    pub vocabulary: Option<PathBuf>,
    pub poll_interval_ms: u64,
    pub min_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_decrement_ms: u64,
    pub request_timeout_ms: u64,
    pub flush_interval_ms: u64,
    pub timestamp_key: String,
    pub compaction_threshold: usize,
    /// Per category, see each category for the unit.
    pub history_thresholds: BTreeMap<String, f64>,
}

impl Default for Config {
    fn default() -> Self {
        let fetch = FetcherConfig::default();
        let ms = |d: Duration| d.as_millis() as u64;

        Self {
            url: DEFAULT_URL.to_string(),
            storage_root: Some(PathBuf::from("data")),
            database: "pc".to_string(),
            categories: ["alerts", "invasions", "void_traders", "bounties"]
                .into_iter()
                .map(String::from)
                .collect(),
            vocabulary: None,
            poll_interval_ms: ms(fetch.poll_interval),
            min_backoff_ms: ms(fetch.min_backoff),
            max_backoff_ms: ms(fetch.max_backoff),
            backoff_decrement_ms: ms(fetch.backoff_decrement),
            request_timeout_ms: ms(fetch.request_timeout),
            flush_interval_ms: ms(fetch.flush_interval),
            timestamp_key: fetch.timestamp_key,
            compaction_threshold: DEFAULT_COMPACTION_THRESHOLD,
            history_thresholds: BTreeMap::from([("invasions".to_string(), DEFAULT_SCORE_THRESHOLD)]),
        }
    }
}

impl Config {
    pub async fn load(path: &Path) -> Result<Self> {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("read config {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parse config {}", path.display()))
    }

    pub fn storage_root(&self) -> Option<PathBuf> {
        self.storage_root
            .clone()
            .filter(|p| !p.as_os_str().is_empty())
    }

    pub fn history_threshold(&self, category: &str, default: f64) -> f64 {
        self.history_thresholds.get(category).copied().unwrap_or(default)
    }

    pub fn fetcher_config(&self) -> FetcherConfig {
        FetcherConfig {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            min_backoff: Duration::from_millis(self.min_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms.max(self.min_backoff_ms)),
            backoff_decrement: Duration::from_millis(self.backoff_decrement_ms),
            request_timeout: Duration::from_millis(self.request_timeout_ms),
            timestamp_key: self.timestamp_key.clone(),
            flush_interval: Duration::from_millis(self.flush_interval_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn partial_file_keeps_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(&path, r#"{"storage_root": "", "categories": ["alerts"], "poll_interval_ms": 1000}"#)
            .unwrap();

        let config = Config::load(&path).await.unwrap();
        assert_eq!(config.storage_root(), None);
        assert_eq!(config.categories, BTreeSet::from(["alerts".to_string()]));
        assert_eq!(config.fetcher_config().poll_interval, Duration::from_secs(1));
        assert_eq!(config.compaction_threshold, 50);
        assert_eq!(config.database, "pc");
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = Config::load(&tmp.path().join("absent.json")).await.unwrap_err();
        assert!(err.to_string().contains("read config"));
    }

    #[test]
    fn defaults_match_fetcher_defaults() {
        let config = Config::default();
        assert_eq!(config.fetcher_config(), FetcherConfig::default());
        assert_eq!(config.storage_root(), Some(PathBuf::from("data")));
        assert_eq!(config.history_threshold("invasions", 1.0), DEFAULT_SCORE_THRESHOLD);
        assert_eq!(config.history_threshold("other", 1.0), 1.0);
    }

    #[test]
    fn backoff_ceiling_never_below_floor() {
        let config = Config {
            min_backoff_ms: 9000,
            max_backoff_ms: 10,
            ..Config::default()
        };
        assert_eq!(config.fetcher_config().max_backoff, Duration::from_secs(9));
    }
}
