use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which scheduler currently owns an application.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlatformVersion {
    /// The allocation-based scheduler.
    #[default]
    Legacy,
    /// The machines platform.
    Target,
    /// Half-migrated: neither scheduler is authoritative.
    Detached,
}

impl PlatformVersion {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Legacy => "legacy",
            Self::Target => "target",
            Self::Detached => "detached",
        }
    }
}

impl fmt::Display for PlatformVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a platform version string is not recognised.
#[derive(Debug, thiserror::Error)]
#[error("unknown platform version: {0}")]
pub struct UnknownPlatformVersion(pub String);

impl FromStr for PlatformVersion {
    type Err = UnknownPlatformVersion;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "legacy" => Ok(Self::Legacy),
            "target" => Ok(Self::Target),
            "detached" => Ok(Self::Detached),
            other => Err(UnknownPlatformVersion(other.to_string())),
        }
    }
}

/// Compact application record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppCompact {
    pub id: String,
    pub name: String,
    pub organization: String,
    pub platform_version: PlatformVersion,
    #[serde(default)]
    pub status: String,
    /// Set for clustered-database applications.
    #[serde(default)]
    pub database: bool,
}

impl AppCompact {
    #[must_use]
    pub fn is_suspended(&self) -> bool {
        self.status == "suspended"
    }
}

/// Full application record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub id: String,
    pub name: String,
    pub organization: String,
    pub platform_version: PlatformVersion,
    #[serde(default)]
    pub status: String,
    pub image: ImageDetails,
    /// Cluster coordination endpoint, present for database applications.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordination_url: Option<String>,
}

/// Image currently deployed on the legacy scheduler.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ImageDetails {
    pub registry: String,
    pub repository: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

impl ImageDetails {
    /// Full image reference, preferring the digest over the tag.
    #[must_use]
    pub fn reference(&self) -> Option<String> {
        let non_empty = |s: &Option<String>| s.as_deref().filter(|v| !v.is_empty()).map(str::to_owned);
        if let Some(digest) = non_empty(&self.digest) {
            return Some(format!("{}/{}@{digest}", self.registry, self.repository));
        }
        non_empty(&self.tag).map(|tag| format!("{}/{}:{tag}", self.registry, self.repository))
    }
}

// ── Declared configuration ────────────────────────────────────────────────────

/// The application's declared configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AppConfig {
    pub app_name: String,
    #[serde(default)]
    pub primary_region: String,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Process group name → command line.
    #[serde(default)]
    pub processes: BTreeMap<String, String>,
    #[serde(default)]
    pub services: Vec<ServiceConfig>,
    #[serde(default)]
    pub mounts: Vec<Mount>,
    #[serde(default)]
    pub checks: BTreeMap<String, CheckConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deploy: Option<DeployConfig>,
}

/// Name of the implicit process group used when none are declared.
pub const DEFAULT_PROCESS_GROUP: &str = "app";

impl AppConfig {
    /// Declared process group names, or the implicit `app` group.
    #[must_use]
    pub fn process_names(&self) -> Vec<String> {
        if self.processes.is_empty() {
            vec![DEFAULT_PROCESS_GROUP.to_string()]
        } else {
            self.processes.keys().cloned().collect()
        }
    }

    /// Process names rendered for error messages.
    #[must_use]
    pub fn format_process_names(&self) -> String {
        self.process_names()
            .iter()
            .map(|p| format!("'{p}'"))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ServiceConfig {
    pub internal_port: u16,
    #[serde(default = "default_protocol")]
    pub protocol: String,
    /// Process groups this service applies to; empty means all.
    #[serde(default)]
    pub processes: Vec<String>,
    #[serde(default)]
    pub ports: Vec<PortConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_machines_running: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_start_machines: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_stop_machines: Option<bool>,
    #[serde(default)]
    pub checks: Vec<CheckConfig>,
}

fn default_protocol() -> String {
    "tcp".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct PortConfig {
    pub port: u16,
    #[serde(default)]
    pub handlers: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct CheckConfig {
    /// `http` or `tcp`.
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grace_period_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Mount {
    pub source: String,
    pub destination: String,
    /// Process groups this mount applies to; empty means all.
    #[serde(default)]
    pub processes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct DeployConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_unavailable: Option<f64>,
}

/// Legacy autoscaler settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct AutoscaleConfig {
    pub enabled: bool,
    #[serde(default)]
    pub min_count: u32,
    #[serde(default)]
    pub max_count: u32,
    #[serde(default)]
    pub balance_regions: bool,
}

// ── Locks and releases ────────────────────────────────────────────────────────

/// Application-scoped migration lock.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppLock {
    pub lock_id: String,
    pub expiration: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Release {
    pub id: String,
    pub version: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreateReleaseRequest {
    pub platform_version: PlatformVersion,
    pub strategy: String,
    pub definition: AppConfig,
    pub image: String,
}

// ── VM sizing ─────────────────────────────────────────────────────────────────

/// Legacy VM size as reported by the control plane.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VmSize {
    pub name: String,
    #[serde(default)]
    pub cpu_cores: f32,
    pub memory_mb: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessGroupSize {
    pub name: String,
    pub vm_size: VmSize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppVmResources {
    pub default_size: VmSize,
    #[serde(default)]
    pub groups: Vec<ProcessGroupSize>,
}
