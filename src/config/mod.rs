//! Request layer configuration.
//!
//! Provides:
//! - Defaults matching the polite scraping profile (10s timeout, 1s spacing)
//! - JSON loading with every field optional
//! - `CF_REQUEST_CACHE` environment override for the shared cookie cache path

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Environment variable naming the cookie cache file.
pub const CACHE_PATH_ENV: &str = "CF_REQUEST_CACHE";

const CACHE_FILE_NAME: &str = "request_cache.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error reading config {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config {path:?}: {source}")]
    InvalidJson {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Settings for one `Request` instance.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RequestConfig {
    /// Serialize and throttle calls, injecting cached challenge cookies.
    pub sequential: bool,
    #[serde(with = "seconds")]
    pub timeout: Duration,
    /// Gap enforced between consecutive sequential calls.
    #[serde(with = "seconds")]
    pub wait: Duration,
    /// How many times a fresh challenge may re-run a call.
    pub challenge_retries: u32,
    #[serde(with = "seconds")]
    pub head_timeout: Duration,
    #[serde(with = "seconds")]
    pub head_cache_ttl: Duration,
    pub max_redirect_hops: usize,
    pub skip_head: bool,
    pub cache_path: PathBuf,
    #[serde(with = "seconds")]
    pub lock_timeout: Duration,
    /// Fixed user-agent; a random desktop browser is used when absent.
    pub user_agent: Option<String>,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            sequential: false,
            timeout: Duration::from_secs(10),
            wait: Duration::from_secs(1),
            challenge_retries: 3,
            head_timeout: Duration::from_secs(2),
            head_cache_ttl: crate::modules::ttl_cache::DEFAULT_TTL,
            max_redirect_hops: 5,
            skip_head: false,
            cache_path: default_cache_path(),
            lock_timeout: Duration::from_secs(10),
            user_agent: None,
        }
    }
}

impl RequestConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw).map_err(|source| ConfigError::InvalidJson {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// `$CF_REQUEST_CACHE`, or `request_cache.json` in the temp directory.
pub fn default_cache_path() -> PathBuf {
    match std::env::var_os(CACHE_PATH_ENV) {
        Some(path) if !path.is_empty() => PathBuf::from(path),
        _ => std::env::temp_dir().join(CACHE_FILE_NAME),
    }
}

/// Durations as (fractional) seconds.
mod seconds {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_polite_profile() {
        let config = RequestConfig::default();
        assert!(!config.sequential);
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert_eq!(config.wait, Duration::from_secs(1));
        assert_eq!(config.challenge_retries, 3);
        assert_eq!(config.head_timeout, Duration::from_secs(2));
        assert_eq!(config.head_cache_ttl, Duration::from_secs(12 * 3600));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = RequestConfig::from_json_str(
            r#"{"sequential": true, "wait": 0.25, "challenge_retries": 1, "cache_path": "/tmp/x.json"}"#,
        )
        .unwrap();
        assert!(config.sequential);
        assert_eq!(config.wait, Duration::from_millis(250));
        assert_eq!(config.challenge_retries, 1);
        assert_eq!(config.cache_path, PathBuf::from("/tmp/x.json"));
        assert_eq!(config.timeout, Duration::from_secs(10));
    }

    #[test]
    fn negative_durations_are_rejected() {
        assert!(RequestConfig::from_json_str(r#"{"timeout": -1}"#).is_err());
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("request.json");
        fs::write(&path, r#"{"timeout": 3}"#).unwrap();
        assert_eq!(
            RequestConfig::from_json_file(&path).unwrap().timeout,
            Duration::from_secs(3)
        );

        let missing = RequestConfig::from_json_file(dir.path().join("missing.json"));
        assert!(matches!(missing, Err(ConfigError::Io { .. })));
    }
}
