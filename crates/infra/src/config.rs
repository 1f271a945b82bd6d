//! Configuration loading and representation.
//!
//! Sources, later wins:
//! 1. built-in defaults;
//! 2. the TOML file named by `PRICEPILOT_CONFIG` (optional);
//! 3. `PRICEPILOT_*` environment overrides.
//!
//! The result is validated before use.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveTime;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use pricepilot_analytics::{AnalyticsError, ForecastPolicy, ScoringPolicy, VerdictPolicy};
use pricepilot_observability::{LogFormat, LoggingConfig};

pub const CONFIG_PATH_ENV: &str = "PRICEPILOT_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error(transparent)]
    Policy(#[from] AnalyticsError),
}

impl ConfigError {
    fn invalid(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentsConfig {
    pub default_duration_days: u32,
    /// Open experiments this many days past their review date are reported as stuck.
    pub stuck_after_days: u32,
}

impl Default for ExperimentsConfig {
    fn default() -> Self {
        Self {
            default_duration_days: 7,
            stuck_after_days: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketplaceConfig {
    pub timeout_ms: u64,
}

impl Default for MarketplaceConfig {
    fn default() -> Self {
        Self { timeout_ms: 10_000 }
    }
}

impl MarketplaceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Daily wall-clock times (`HH:MM`, configured timezone) of the batch jobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub enabled: bool,
    pub price_analysis: String,
    pub experiment_review: String,
    pub stock_alerts: String,
    pub stuck_experiments: String,
    /// First retry delay after a failed run; doubles per consecutive failure.
    pub retry_base_ms: u64,
    pub max_retries: u32,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            price_analysis: "09:30".to_string(),
            experiment_review: "10:00".to_string(),
            stock_alerts: "18:00".to_string(),
            stuck_experiments: "10:05".to_string(),
            retry_base_ms: 30_000,
            max_retries: 3,
        }
    }
}

impl ScheduleConfig {
    pub fn time_of(key: &str, raw: &str) -> Result<NaiveTime, ConfigError> {
        NaiveTime::parse_from_str(raw.trim(), "%H:%M")
            .map_err(|e| ConfigError::invalid(format!("schedule.{key}"), format!("'{raw}': {e}")))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    /// IANA timezone used for "today", "yesterday" and the job schedule.
    pub timezone: String,
    pub forecast: ForecastPolicy,
    pub scoring: ScoringPolicy,
    pub experiments: ExperimentsConfig,
    pub verdict: VerdictPolicy,
    pub marketplace: MarketplaceConfig,
    pub schedule: ScheduleConfig,
    pub logging: LoggingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            timezone: "Europe/Moscow".to_string(),
            forecast: ForecastPolicy::default(),
            scoring: ScoringPolicy::default(),
            experiments: ExperimentsConfig::default(),
            verdict: VerdictPolicy::default(),
            marketplace: MarketplaceConfig::default(),
            schedule: ScheduleConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl AppConfig {
    /// Defaults, then the optional file, then the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        let mut cfg = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::from_file(&path)?,
            Err(_) => Self::default(),
        };
        cfg.apply_env_overrides(|key| std::env::var(key).ok())?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// A missing file falls back to defaults; an unreadable or malformed one is an error.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::warn!(path = %path.display(), "config file not found; using defaults");
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    /// Apply `PRICEPILOT_*` overrides read through `lookup`.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(v) = lookup("PRICEPILOT_BIND") {
            self.server.bind = v;
        }
        if let Some(v) = lookup("PRICEPILOT_TIMEZONE") {
            self.timezone = v;
        }
        if let Some(v) = lookup("PRICEPILOT_MARKETPLACE_TIMEOUT_MS") {
            self.marketplace.timeout_ms = parse_env("PRICEPILOT_MARKETPLACE_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = lookup("PRICEPILOT_EXPERIMENT_DURATION_DAYS") {
            self.experiments.default_duration_days = parse_env("PRICEPILOT_EXPERIMENT_DURATION_DAYS", &v)?;
        }
        if let Some(v) = lookup("PRICEPILOT_STUCK_AFTER_DAYS") {
            self.experiments.stuck_after_days = parse_env("PRICEPILOT_STUCK_AFTER_DAYS", &v)?;
        }
        if let Some(v) = lookup("PRICEPILOT_SCHEDULE_ENABLED") {
            self.schedule.enabled = parse_env("PRICEPILOT_SCHEDULE_ENABLED", &v)?;
        }
        if let Some(v) = lookup("PRICEPILOT_LOG_FORMAT") {
            self.logging.format = v
                .parse::<LogFormat>()
                .map_err(|e| ConfigError::invalid("PRICEPILOT_LOG_FORMAT", e))?;
        }
        if let Some(v) = lookup("PRICEPILOT_LOG_FILTER") {
            self.logging.filter = v;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.tz()?;
        self.forecast.validate()?;
        self.scoring.validate()?;
        self.verdict.validate()?;
        if self.experiments.default_duration_days == 0 {
            return Err(ConfigError::invalid("experiments.default_duration_days", "must be >= 1"));
        }
        if self.marketplace.timeout_ms == 0 {
            return Err(ConfigError::invalid("marketplace.timeout_ms", "must be > 0"));
        }
        for (key, raw) in self.schedule_entries() {
            ScheduleConfig::time_of(key, raw)?;
        }
        Ok(())
    }

    pub fn tz(&self) -> Result<Tz, ConfigError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| ConfigError::invalid("timezone", e.to_string()))
    }

    pub fn schedule_entries(&self) -> [(&'static str, &str); 4] {
        [
            ("price_analysis", self.schedule.price_analysis.as_str()),
            ("experiment_review", self.schedule.experiment_review.as_str()),
            ("stock_alerts", self.schedule.stock_alerts.as_str()),
            ("stuck_experiments", self.schedule.stuck_experiments.as_str()),
        ]
    }
}

fn parse_env<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: core::str::FromStr,
    T::Err: core::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| ConfigError::invalid(key, format!("'{raw}': {e}")))
}
