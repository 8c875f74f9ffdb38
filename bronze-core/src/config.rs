//! Pipeline configuration loaded from TOML.
//!
//! Every section is optional; missing sections and fields fall back to the
//! defaults below. The loaded struct is passed by value into each component
//! constructor, so nothing here is process-global.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::fetch::retry::RetryPolicy;
use crate::partition::Compression;

/// Errors from loading configuration or rule files.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("failed to parse {path}: {reason}")]
    Parse { path: String, reason: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration for both commands.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub http: HttpConfig,
    pub retry: RetryConfig,
    pub transform: TransformConfig,
    pub output: OutputConfig,
}

impl PipelineConfig {
    /// Load a config from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        config.check()?;
        Ok(config)
    }

    /// Parse a config from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: "<inline>".into(),
            reason: e.to_string(),
        })?;
        config.check()?;
        Ok(config)
    }

    fn check(&self) -> Result<(), ConfigError> {
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid("retry.max_attempts must be >= 1".into()));
        }
        let retry = &self.retry;
        if ![retry.min_delay_secs, retry.max_delay_secs, retry.multiplier]
            .iter()
            .all(|v| v.is_finite())
        {
            return Err(ConfigError::Invalid(
                "retry delays and multiplier must be finite".into(),
            ));
        }
        if retry.multiplier < 0.0 {
            return Err(ConfigError::Invalid("retry.multiplier must be non-negative".into()));
        }
        if retry.min_delay_secs < 0.0 || retry.max_delay_secs < 0.0 {
            return Err(ConfigError::Invalid("retry delays must be non-negative".into()));
        }
        if retry.min_delay_secs > retry.max_delay_secs {
            return Err(ConfigError::Invalid(
                "retry.min_delay_secs must not exceed retry.max_delay_secs".into(),
            ));
        }
        if self.http.timeout_secs == 0 {
            return Err(ConfigError::Invalid("http.timeout_secs must be >= 1".into()));
        }
        if self.transform.fields.is_empty() {
            return Err(ConfigError::Invalid("transform.fields must not be empty".into()));
        }
        Ok(())
    }
}

/// HTTP client settings for the upstream source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            user_agent: concat!("bronze-pipeline/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Seconds to a Duration, saturating instead of panicking on values a
/// Duration cannot hold.
fn secs(value: f64) -> Duration {
    if value.is_nan() || value <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(value).unwrap_or(Duration::MAX)
}

/// Retry settings for a single page request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub min_delay_secs: f64,
    pub max_delay_secs: f64,
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            min_delay_secs: 2.0,
            max_delay_secs: 10.0,
            multiplier: 1.0,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            min_delay: secs(self.min_delay_secs),
            max_delay: secs(self.max_delay_secs),
            multiplier: self.multiplier,
        }
    }
}

/// Field allowlist and metadata stamped onto each record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformConfig {
    /// Source identifier written to `_source`.
    pub source: String,
    /// Schema version written to `_schema_version`.
    pub schema_version: String,
    /// Raw fields copied into the output, in column order.
    pub fields: Vec<String>,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            source: "jsonplaceholder".into(),
            schema_version: "1.0".into(),
            fields: ["id", "userId", "title", "body"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub compression: Compression,
}
