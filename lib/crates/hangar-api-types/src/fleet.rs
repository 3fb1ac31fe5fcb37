//! Machines platform (fleet API) records.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::app::CheckConfig;

// ── Metadata keys ─────────────────────────────────────────────────────────────

/// Id of the allocation a machine replaced.
pub const META_PREVIOUS_ALLOC: &str = "hangar_previous_alloc";
pub const META_RELEASE_ID: &str = "hangar_release_id";
pub const META_RELEASE_VERSION: &str = "hangar_release_version";
pub const META_PROCESS_GROUP: &str = "hangar_process_group";
pub const META_PLATFORM_VERSION: &str = "hangar_platform_version";
/// Set on machines whose volume was created by the migration.
pub const META_MIGRATED_VOLUME: &str = "hangar_migrated_volume";

// ── Machines ──────────────────────────────────────────────────────────────────

/// VM resources for one machine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Guest {
    /// `shared` or `performance`.
    pub cpu_kind: String,
    pub cpus: u32,
    pub memory_mb: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MachineMount {
    pub volume: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct MachineService {
    pub internal_port: u16,
    pub protocol: String,
    #[serde(default)]
    pub ports: Vec<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_machines_running: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autostart: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autostop: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct MachineConfig {
    pub image: String,
    pub guest: Guest,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub mounts: Vec<MachineMount>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    #[serde(default)]
    pub services: Vec<MachineService>,
    #[serde(default)]
    pub checks: BTreeMap<String, CheckConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cmd: Vec<String>,
}

/// A unit on the machines platform.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Machine {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub region: String,
    /// `created`, `started`, `stopped`, `destroyed`...
    pub state: String,
    pub config: MachineConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lease_nonce: Option<String>,
}

impl Machine {
    /// The allocation this machine replaced, if it was created by a migration.
    #[must_use]
    pub fn previous_alloc(&self) -> Option<&str> {
        self.config
            .metadata
            .get(META_PREVIOUS_ALLOC)
            .map(String::as_str)
            .filter(|s| !s.is_empty())
    }

    /// Process group recorded in the machine metadata.
    #[must_use]
    pub fn process_group(&self) -> Option<&str> {
        self.config.metadata.get(META_PROCESS_GROUP).map(String::as_str)
    }

    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        matches!(self.state.as_str(), "destroyed" | "destroying")
    }
}

/// Declarative input for launching one machine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LaunchSpec {
    pub region: String,
    pub config: MachineConfig,
    /// Create the machine stopped.
    #[serde(default)]
    pub skip_launch: bool,
}

impl LaunchSpec {
    /// State the machine is expected to reach after launch.
    #[must_use]
    pub fn expected_state(&self) -> &'static str {
        if self.skip_launch { "stopped" } else { "started" }
    }
}

/// Latest result of one health check on a machine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckStatus {
    pub name: String,
    /// `passing`, `warning` or `critical`.
    pub status: String,
    #[serde(default)]
    pub output: String,
}

impl CheckStatus {
    #[must_use]
    pub fn is_passing(&self) -> bool {
        self.status == "passing"
    }
}

/// Exclusive mutation lease on a single machine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Lease {
    pub nonce: String,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub owner: String,
}
