//! Domain types for hangar configuration.
//!
//! Pure functions only: no I/O, no async, no filesystem access.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ── Config schema ────────────────────────────────────────────────────────────

/// Top-level configuration stored in `~/.hangar/config.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct HangarConfig {
    /// Remote endpoints.
    pub api: ApiConfig,
    /// Migration timing knobs.
    pub migration: MigrationTuning,
}

/// Remote endpoints used by the HTTP adapters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the control-plane API.
    pub control_plane_url: String,
    /// Base URL of the fleet (machines) API.
    pub fleet_url: String,
    /// Port the database peers listen on for coordination requests.
    pub db_port: u16,
    /// Bearer token for both APIs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            control_plane_url: "https://api.hangar.dev".to_string(),
            fleet_url: "https://fleet.hangar.dev".to_string(),
            db_port: 5500,
            token: None,
        }
    }
}

/// Timeouts and intervals for the migration pipeline. All values in seconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MigrationTuning {
    /// Per-machine start/stop barrier.
    pub wait_timeout_secs: u64,
    /// Legacy scale-to-zero convergence bound.
    pub scale_down_timeout_secs: u64,
    /// Machine lease TTL.
    pub lease_ttl_secs: u64,
    /// Database sync / election poll interval.
    pub db_poll_secs: u64,
    /// Database sync / election bound.
    pub db_timeout_secs: u64,
}

impl Default for MigrationTuning {
    fn default() -> Self {
        Self {
            wait_timeout_secs: 300,
            scale_down_timeout_secs: 3600,
            lease_ttl_secs: 13,
            db_poll_secs: 10,
            db_timeout_secs: 1200,
        }
    }
}

impl MigrationTuning {
    #[must_use]
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_timeout_secs)
    }

    #[must_use]
    pub fn scale_down_timeout(&self) -> Duration {
        Duration::from_secs(self.scale_down_timeout_secs)
    }

    #[must_use]
    pub fn lease_ttl(&self) -> Duration {
        Duration::from_secs(self.lease_ttl_secs.max(2))
    }

    /// Interval between lease refreshes: `(ttl - 1s) / 3`.
    ///
    /// Always strictly shorter than [`Self::lease_ttl`].
    #[must_use]
    pub fn lease_refresh_interval(&self) -> Duration {
        lease_refresh_interval(self.lease_ttl())
    }

    #[must_use]
    pub fn db_poll(&self) -> Duration {
        Duration::from_secs(self.db_poll_secs.max(1))
    }

    #[must_use]
    pub fn db_timeout(&self) -> Duration {
        Duration::from_secs(self.db_timeout_secs)
    }
}

/// Refresh interval for a lease of the given TTL.
#[must_use]
pub fn lease_refresh_interval(ttl: Duration) -> Duration {
    ttl.saturating_sub(Duration::from_secs(1)) / 3
}

// ── Settable keys ────────────────────────────────────────────────────────────

/// Keys accepted by `hangar config set`.
pub const CONFIG_KEYS: &[&str] = &[
    "api.control_plane_url",
    "api.fleet_url",
    "api.db_port",
    "api.token",
    "migration.wait_timeout_secs",
    "migration.scale_down_timeout_secs",
    "migration.lease_ttl_secs",
    "migration.db_poll_secs",
    "migration.db_timeout_secs",
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown setting: {key} (valid keys: {})", CONFIG_KEYS.join(", "))]
    UnknownKey { key: String },

    #[error("invalid value {value:?} for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn parse_url(key: &str, value: &str) -> Result<String, ConfigError> {
    if value.starts_with("http://") || value.starts_with("https://") {
        Ok(value.trim_end_matches('/').to_string())
    } else {
        Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            reason: "expected an http(s) URL".to_string(),
        })
    }
}

impl HangarConfig {
    /// Set one dotted key.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for unknown keys or unparsable values.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        match key {
            "api.control_plane_url" => self.api.control_plane_url = parse_url(key, value)?,
            "api.fleet_url" => self.api.fleet_url = parse_url(key, value)?,
            "api.db_port" => self.api.db_port = parse_number(key, value)?,
            "api.token" => self.api.token = Some(value.to_string()).filter(|t| !t.is_empty()),
            "migration.wait_timeout_secs" => self.migration.wait_timeout_secs = parse_number(key, value)?,
            "migration.scale_down_timeout_secs" => {
                self.migration.scale_down_timeout_secs = parse_number(key, value)?;
            }
            "migration.lease_ttl_secs" => self.migration.lease_ttl_secs = parse_number(key, value)?,
            "migration.db_poll_secs" => self.migration.db_poll_secs = parse_number(key, value)?,
            "migration.db_timeout_secs" => self.migration.db_timeout_secs = parse_number(key, value)?,
            _ => {
                return Err(ConfigError::UnknownKey {
                    key: key.to_string(),
                });
            }
        }
        Ok(())
    }
}

// ── Environment overrides ────────────────────────────────────────────────────

/// Values read from `HANGAR_*` environment variables. Unset fields keep the
/// file value.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct EnvOverrides {
    pub api_token: Option<String>,
    pub control_plane_url: Option<String>,
    pub fleet_url: Option<String>,
    pub db_port: Option<u16>,
    pub wait_timeout_secs: Option<u64>,
    pub scale_down_timeout_secs: Option<u64>,
}

impl HangarConfig {
    /// Layer environment overrides over the file configuration.
    #[must_use]
    pub fn with_overrides(mut self, env: EnvOverrides) -> Self {
        if let Some(url) = env.control_plane_url {
            self.api.control_plane_url = url;
        }
        if let Some(url) = env.fleet_url {
            self.api.fleet_url = url;
        }
        if let Some(token) = env.api_token {
            self.api.token = Some(token);
        }
        if let Some(port) = env.db_port {
            self.api.db_port = port;
        }
        if let Some(secs) = env.wait_timeout_secs {
            self.migration.wait_timeout_secs = secs;
        }
        if let Some(secs) = env.scale_down_timeout_secs {
            self.migration.scale_down_timeout_secs = secs;
        }
        self
    }
}
