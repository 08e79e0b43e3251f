//! Configuration types for appcenter-distribute
//!
//! Every field has a serde default, so a partial JSON document (or none at all)
//! yields a working configuration.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// REST client settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Per-request timeout for REST calls (default: 60 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout: default_request_timeout(),
        }
    }
}

/// Chunked uploader settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Tenant name sent to the upload service (default: "distribution")
    #[serde(default = "default_tenant")]
    pub tenant: String,

    /// Maximum number of chunks in flight at once (default: 10)
    #[serde(default = "default_max_concurrent_chunks")]
    pub max_concurrent_chunks: usize,

    /// How many times the server may report missing chunks before the upload fails (default: 5)
    #[serde(default = "default_max_verify_attempts")]
    pub max_verify_attempts: u32,

    /// Timeout for a single chunk transfer (default: 300 seconds)
    #[serde(default = "default_chunk_timeout", with = "duration_serde")]
    pub chunk_timeout: Duration,

    /// Timeout for the single-shot symbols blob upload (default: 1800 seconds)
    #[serde(default = "default_blob_timeout", with = "duration_serde")]
    pub blob_timeout: Duration,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            tenant: default_tenant(),
            max_concurrent_chunks: default_max_concurrent_chunks(),
            max_verify_attempts: default_max_verify_attempts(),
            chunk_timeout: default_chunk_timeout(),
            blob_timeout: default_blob_timeout(),
        }
    }
}

/// Release-status polling settings
///
/// The interval is part of the backend contract; the bounds guard against a
/// release that never becomes ready.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PollConfig {
    /// Delay between two status requests (default: 2000 ms)
    #[serde(default = "default_poll_interval", with = "millis_serde")]
    pub interval: Duration,

    /// Give up after this long (default: 30 minutes, None = unbounded)
    #[serde(default = "default_poll_timeout", with = "optional_duration_serde")]
    pub timeout: Option<Duration>,

    /// Give up after this many status requests (None = unbounded)
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: default_poll_interval(),
            timeout: default_poll_timeout(),
            max_attempts: None,
        }
    }
}

/// Retry configuration for chunk transfers
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 5)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1000 ms)
    #[serde(default = "default_initial_delay", with = "millis_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 60000 ms)
    #[serde(default = "default_max_delay", with = "millis_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// Main configuration for the distribution pipeline
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// REST client settings
    #[serde(default)]
    pub http: HttpConfig,

    /// Chunked uploader settings
    #[serde(default)]
    pub upload: UploadConfig,

    /// Release-status polling settings
    #[serde(default)]
    pub poll: PollConfig,

    /// Retry settings for chunk transfers
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Config {
    /// Load a configuration from a JSON file; missing fields take their defaults
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("failed to read {}: {}", path.display(), e),
            key: None,
        })?;
        serde_json::from_str(&raw).map_err(|e| Error::Config {
            message: format!("invalid configuration in {}: {}", path.display(), e),
            key: None,
        })
    }
}

fn default_true() -> bool {
    true
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_tenant() -> String {
    "distribution".to_string()
}

fn default_max_concurrent_chunks() -> usize {
    10
}

fn default_max_verify_attempts() -> u32 {
    5
}

fn default_chunk_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_blob_timeout() -> Duration {
    Duration::from_secs(30 * 60)
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(2)
}

fn default_poll_timeout() -> Option<Duration> {
    Some(Duration::from_secs(30 * 60))
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

// Duration serialization helper (seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Duration serialization helper (milliseconds)
mod millis_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

// Optional Duration serialization helper (seconds)
mod optional_duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&d.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = Option::<u64>::deserialize(deserializer)?;
        Ok(secs.map(Duration::from_secs))
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_backend_contract() {
        let config = Config::default();
        assert_eq!(config.poll.interval, Duration::from_secs(2));
        assert_eq!(config.poll.timeout, Some(Duration::from_secs(1800)));
        assert_eq!(config.poll.max_attempts, None);
        assert_eq!(config.upload.tenant, "distribution");
        assert_eq!(config.upload.max_concurrent_chunks, 10);
        assert_eq!(config.upload.blob_timeout, Duration::from_secs(1800));
    }

    #[test]
    fn empty_json_yields_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.poll.interval, Duration::from_secs(2));
        assert_eq!(config.http.request_timeout, Duration::from_secs(60));
        assert!(config.retry.jitter);
    }

    #[test]
    fn partial_json_overrides_only_given_fields() {
        let config: Config = serde_json::from_str(
            r#"{"poll": {"interval": 250, "timeout": null, "max_attempts": 40}}"#,
        )
        .unwrap();
        assert_eq!(config.poll.interval, Duration::from_millis(250));
        assert_eq!(config.poll.timeout, None);
        assert_eq!(config.poll.max_attempts, Some(40));
        assert_eq!(config.upload.max_verify_attempts, 5);
    }

    #[test]
    fn from_json_file_reads_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("distribute.json");
        std::fs::write(&path, r#"{"upload": {"max_concurrent_chunks": 2}}"#).unwrap();

        let config = Config::from_json_file(&path).unwrap();
        assert_eq!(config.upload.max_concurrent_chunks, 2);
        assert_eq!(config.upload.tenant, "distribution");
    }

    #[test]
    fn from_json_file_reports_invalid_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = Config::from_json_file(&path).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn round_trips_through_json() {
        let config = Config::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(back.poll.interval, config.poll.interval);
        assert_eq!(back.retry.max_delay, config.retry.max_delay);
    }
}
