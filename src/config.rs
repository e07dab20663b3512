//! Oracle configuration
//!
//! Read once at startup from a JSON file. Lookup order for the file:
//! `--config <path>`, then `TRIVIA_ORACLE_CONFIG`, then `./config.json`.
//! A missing file yields defaults, which accept no channels.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::OracleError;

/// Account that posts trivia questions and disclosures
pub const DEFAULT_QUESTION_SOURCE_ID: &str = "859024110905458718";

pub const CONFIG_ENV: &str = "TRIVIA_ORACLE_CONFIG";
const CONFIG_FILE: &str = "config.json";

/// Inclusive range a reply delay is drawn from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DelayRange {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl DelayRange {
    pub const IMAGE: DelayRange = DelayRange {
        min_ms: 3000,
        max_ms: 4000,
    };

    pub const CAPITAL: DelayRange = DelayRange {
        min_ms: 1000,
        max_ms: 4000,
    };

    pub const fn fixed(ms: u64) -> Self {
        Self { min_ms: ms, max_ms: ms }
    }

    pub fn validate(&self) -> Result<(), OracleError> {
        if self.min_ms > self.max_ms {
            return Err(OracleError::Config(format!(
                "delay range min {} exceeds max {}",
                self.min_ms, self.max_ms
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Channels the oracle is allowed to answer in
    #[serde(default, alias = "channelIds")]
    pub channel_ids: Vec<String>,

    #[serde(default = "default_question_source_id", alias = "questionSourceId")]
    pub question_source_id: String,

    /// Directory holding the per-category knowledge files
    #[serde(default = "default_data_dir", alias = "dataDir")]
    pub data_dir: PathBuf,

    /// How long to wait for a disclosure after a miss (seconds)
    #[serde(default = "default_learning_window_secs")]
    pub learning_window_secs: u64,

    #[serde(default = "default_image_delay")]
    pub image_delay_ms: DelayRange,

    #[serde(default = "default_capital_delay")]
    pub capital_delay_ms: DelayRange,

    /// Reply "Failed to hash the image." when an image cannot be fetched
    #[serde(default = "default_notify_hash_failure")]
    pub notify_hash_failure: bool,

    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
}

fn default_question_source_id() -> String {
    DEFAULT_QUESTION_SOURCE_ID.to_string()
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("trivia-oracle")
        .join("data")
}

fn default_learning_window_secs() -> u64 {
    50
}

fn default_image_delay() -> DelayRange {
    DelayRange::IMAGE
}

fn default_capital_delay() -> DelayRange {
    DelayRange::CAPITAL
}

fn default_notify_hash_failure() -> bool {
    true
}

fn default_fetch_timeout_secs() -> u64 {
    15
}

impl Default for Config {
    fn default() -> Self {
        Self {
            channel_ids: Vec::new(),
            question_source_id: default_question_source_id(),
            data_dir: default_data_dir(),
            learning_window_secs: default_learning_window_secs(),
            image_delay_ms: default_image_delay(),
            capital_delay_ms: default_capital_delay(),
            notify_hash_failure: default_notify_hash_failure(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
        }
    }
}

impl Config {
    /// Resolve the config path: explicit argument, env var, then cwd
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(path) = explicit {
            return path.to_path_buf();
        }
        std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(CONFIG_FILE))
    }

    /// Load config from a file, falling back to defaults when it is absent
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::warn!("No config at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {:?}", path))?;
        Self::from_json(&content).with_context(|| format!("Failed to parse config {:?}", path))
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), OracleError> {
        self.image_delay_ms.validate()?;
        self.capital_delay_ms.validate()?;
        if self.question_source_id.trim().is_empty() {
            return Err(OracleError::Config("question_source_id is empty".to_string()));
        }
        Ok(())
    }

    pub fn allows_channel(&self, channel_id: &str) -> bool {
        self.channel_ids.iter().any(|c| c == channel_id)
    }

    pub fn learning_window(&self) -> Duration {
        Duration::from_secs(self.learning_window_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_match_observed_timing() {
        let config = Config::default();
        assert_eq!(config.learning_window(), Duration::from_secs(50));
        assert_eq!(config.image_delay_ms, DelayRange { min_ms: 3000, max_ms: 4000 });
        assert_eq!(config.capital_delay_ms, DelayRange { min_ms: 1000, max_ms: 4000 });
        assert_eq!(config.question_source_id, DEFAULT_QUESTION_SOURCE_ID);
        assert!(config.channel_ids.is_empty());
    }

    #[test]
    fn test_accepts_legacy_camel_case_channel_ids() {
        let config = Config::from_json(r#"{"token":"ignored","channelIds":["111","222"]}"#).unwrap();
        assert!(config.allows_channel("111"));
        assert!(config.allows_channel("222"));
        assert!(!config.allows_channel("333"));
    }

    #[test]
    fn test_rejects_inverted_delay_range() {
        let result = Config::from_json(r#"{"image_delay_ms":{"min_ms":5000,"max_ms":10}}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let config = Config::load(&dir.path().join("nope.json")).unwrap();
        assert_eq!(config.learning_window_secs, 50);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{"channel_ids":["42"],"data_dir":"/tmp/kb","learning_window_secs":5}"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.channel_ids, vec!["42".to_string()]);
        assert_eq!(config.data_dir, PathBuf::from("/tmp/kb"));
        assert_eq!(config.learning_window(), Duration::from_secs(5));
    }

    #[test]
    fn test_explicit_path_wins() {
        let path = Config::resolve_path(Some(Path::new("/etc/oracle.json")));
        assert_eq!(path, PathBuf::from("/etc/oracle.json"));
    }
}
