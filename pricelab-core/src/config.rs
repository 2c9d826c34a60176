//! Pipeline configuration, loadable from TOML.
//!
//! ```toml
//! cache_dir = "./cache"
//! version = "v1"
//!
//! [api]
//! url = "https://prices.example.com/pi"
//! max_retries = 3
//! timeout_secs = 10
//!
//! [api.params]
//! interval = "1d"
//! ```

use crate::data::api::{ApiRequest, DEFAULT_MAX_RETRIES, DEFAULT_TIMEOUT};
use crate::data::schema::VersionTag;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config {path}: {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("parse config TOML: {0}")]
    Parse(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level pipeline settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Directory holding cache snapshots.
    pub cache_dir: PathBuf,
    /// Version tag the pipeline reads and writes.
    pub version: String,
    pub api: ApiConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("./cache"),
            version: "v1".to_string(),
            api: ApiConfig::default(),
        }
    }
}

/// Remote API settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub url: Option<String>,
    pub params: BTreeMap<String, String>,
    pub max_retries: u32,
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            url: None,
            params: BTreeMap::new(),
            max_retries: DEFAULT_MAX_RETRIES,
            timeout_secs: DEFAULT_TIMEOUT.as_secs(),
        }
    }
}

impl PipelineConfig {
    /// Load a config from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate a config from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.version_tag()?;
        if let Some(url) = &self.api.url {
            if url.trim().is_empty() {
                return Err(ConfigError::Invalid("api.url is empty".into()));
            }
        }
        if self.api.timeout_secs == 0 {
            return Err(ConfigError::Invalid("api.timeout_secs must be > 0".into()));
        }
        Ok(())
    }

    pub fn version_tag(&self) -> Result<VersionTag, ConfigError> {
        VersionTag::new(self.version.as_str()).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// Build an API request from the `[api]` section. `url` overrides the
    /// configured URL.
    pub fn api_request(&self, url: Option<&str>) -> Result<ApiRequest, ConfigError> {
        let url = url
            .or(self.api.url.as_deref())
            .ok_or_else(|| ConfigError::Invalid("no API url configured".into()))?;
        let mut req = ApiRequest::new(url)
            .max_retries(self.api.max_retries)
            .timeout(Duration::from_secs(self.api.timeout_secs));
        for (k, v) in &self.api.params {
            req = req.param(k.as_str(), v.as_str());
        }
        Ok(req)
    }
}
