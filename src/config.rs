//! Daemon configuration parsing and validation.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::poll::client::DEFAULT_API_URL;
use crate::{AppError, Result};

/// Accepted polling cadence, in minutes.
pub const UPDATE_MINUTES_RANGE: std::ops::RangeInclusive<u64> = 5..=1440;

fn default_api_url() -> String {
    DEFAULT_API_URL.into()
}

fn default_update_minutes() -> u64 {
    60
}

fn default_request_timeout_seconds() -> u64 {
    10
}

fn default_tick_seconds() -> u64 {
    60
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(".kerbside")
}

fn default_ipc_name() -> String {
    "kerbside".into()
}

fn default_http_port() -> u16 {
    8321
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Street address sent to the collection service.
    pub address: String,
    /// Collection service endpoint.
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Minutes between scheduled polls.
    #[serde(default = "default_update_minutes")]
    pub update_minutes: u64,
    /// Bound on a single fetch.
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
    /// Seconds between recompute ticks.
    #[serde(default = "default_tick_seconds")]
    pub tick_seconds: u64,
    /// IANA zone for window arithmetic; the host zone when absent.
    #[serde(default)]
    pub timezone: Option<String>,
    /// Directory holding the `SQLite` database.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Local socket name for `kerbside-ctl`.
    #[serde(default = "default_ipc_name")]
    pub ipc_name: String,
    /// HTTP status port; `0` disables the HTTP surface.
    #[serde(default = "default_http_port")]
    pub http_port: u16,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse and validate configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Path of the `SQLite` database file.
    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("kerbside.db")
    }

    /// Scheduled polling cadence.
    #[must_use]
    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_minutes * 60)
    }

    /// Bound on a single fetch.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    /// Recompute tick cadence.
    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_seconds)
    }

    /// Configured zone, if any.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the name is not a known IANA zone.
    pub fn zone(&self) -> Result<Option<chrono_tz::Tz>> {
        self.timezone
            .as_deref()
            .map(|name| {
                name.parse::<chrono_tz::Tz>()
                    .map_err(|err| AppError::Config(format!("unknown timezone '{name}': {err}")))
            })
            .transpose()
    }

    fn validate(&mut self) -> Result<()> {
        self.address = self.address.trim().to_owned();
        if self.address.is_empty() {
            return Err(AppError::Config("address must not be empty".into()));
        }

        if self.api_url.trim().is_empty() {
            return Err(AppError::Config("api_url must not be empty".into()));
        }

        if !UPDATE_MINUTES_RANGE.contains(&self.update_minutes) {
            return Err(AppError::Config(format!(
                "update_minutes must be between {} and {}, got {}",
                UPDATE_MINUTES_RANGE.start(),
                UPDATE_MINUTES_RANGE.end(),
                self.update_minutes
            )));
        }

        if self.request_timeout_seconds == 0 {
            return Err(AppError::Config(
                "request_timeout_seconds must be greater than zero".into(),
            ));
        }

        if self.tick_seconds == 0 {
            return Err(AppError::Config(
                "tick_seconds must be greater than zero".into(),
            ));
        }

        if self.ipc_name.trim().is_empty() {
            return Err(AppError::Config("ipc_name must not be empty".into()));
        }

        self.zone()?;
        Ok(())
    }
}
