//! powerwatch.toml configuration parser.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::parse::{parse_clock, parse_duration};
use crate::types::{DwellMinutesPolicy, FeatureSchema, LoadAfterPolicy};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PowerwatchConfig {
    pub store: StoreConfig,
    pub engine: EngineConfig,
    pub features: FeaturesConfig,
    pub classifier: ClassifierConfig,
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    #[default]
    Redb,
    Rest,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Database file for the redb backend.
    pub path: Option<PathBuf>,
    /// `host:port` of the REST backend.
    pub address: Option<String>,
    pub auth_token: Option<String>,
    pub appliance_root: String,
    pub dwell_root: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Redb,
            path: Some(PathBuf::from("powerwatch.redb")),
            address: None,
            auth_token: None,
            appliance_root: "appliances".to_string(),
            dwell_root: "dwell".to_string(),
        }
    }
}

impl StoreConfig {
    /// `host:port` of the REST backend. An `http://` prefix and trailing
    /// slashes are accepted; any other scheme is rejected.
    pub fn rest_address(&self) -> ConfigResult<String> {
        let raw = self.address.as_deref().ok_or(ConfigError::MissingField {
            backend: "rest",
            field: "address",
        })?;
        let trimmed = raw.trim().trim_end_matches('/');
        let host = match trimmed.split_once("://") {
            None => trimmed,
            Some((scheme, rest)) if scheme.eq_ignore_ascii_case("http") => rest,
            Some(_) => return Err(ConfigError::UnsupportedScheme(raw.to_string())),
        };
        if host.is_empty() || host.contains('/') {
            return Err(ConfigError::UnsupportedScheme(raw.to_string()));
        }
        Ok(host.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Minimum dwell time before a decision is attempted.
    pub threshold: String,
    /// Upper bound on every store and classifier call.
    pub call_timeout: String,
    pub poll_interval: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            threshold: "2m".to_string(),
            call_timeout: "2s".to_string(),
            poll_interval: "30s".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn threshold(&self) -> ConfigResult<Duration> {
        parse_duration(&self.threshold)
    }

    pub fn call_timeout(&self) -> ConfigResult<Duration> {
        parse_duration(&self.call_timeout)
    }

    pub fn poll_interval(&self) -> ConfigResult<Duration> {
        parse_duration(&self.poll_interval)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeaturesConfig {
    pub schema: FeatureSchema,
    pub dwell_minutes: DwellMinutesPolicy,
    pub load_after_window: LoadAfterPolicy,
    /// Start of the office window (UTC, `HH:MM`).
    pub office_start: String,
    pub office_end: String,
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            schema: FeatureSchema::Basic,
            dwell_minutes: DwellMinutesPolicy::ClampToThreshold,
            load_after_window: LoadAfterPolicy::Zero,
            office_start: "09:00".to_string(),
            office_end: "17:00".to_string(),
        }
    }
}

impl FeaturesConfig {
    pub fn office_window(&self) -> ConfigResult<(NaiveTime, NaiveTime)> {
        Ok((parse_clock(&self.office_start)?, parse_clock(&self.office_end)?))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// JSON decision-tree model file.
    pub model: PathBuf,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            model: PathBuf::from("model.json"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self { port: 8080 }
    }
}

impl PowerwatchConfig {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::parse(&content)?;
        Ok(config)
    }

    /// Parse and validate a TOML document.
    pub fn parse(content: &str) -> ConfigResult<Self> {
        let config: PowerwatchConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every string-typed value up front so a bad config fails at
    /// startup rather than on the first cycle.
    pub fn validate(&self) -> ConfigResult<()> {
        self.engine.threshold()?;
        if self.engine.call_timeout()?.is_zero() {
            return Err(ConfigError::ZeroDuration("engine.call_timeout"));
        }
        if self.engine.poll_interval()?.is_zero() {
            return Err(ConfigError::ZeroDuration("engine.poll_interval"));
        }
        self.features.office_window()?;
        match self.store.backend {
            StoreBackend::Redb if self.store.path.is_none() => Err(ConfigError::MissingField {
                backend: "redb",
                field: "path",
            }),
            StoreBackend::Rest => self.store.rest_address().map(|_| ()),
            StoreBackend::Redb => Ok(()),
        }
    }
}
