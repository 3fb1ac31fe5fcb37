//! Legacy scheduler (allocation) records.

use serde::{Deserialize, Serialize};

/// An allocation scheduled by the legacy scheduler.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Allocation {
    pub id: String,
    /// Process group this allocation runs.
    pub task_name: String,
    pub region: String,
    /// Release version the allocation was scheduled for.
    pub version: u64,
    /// `running`, `pending`, `complete`, `failed`...
    pub status: String,
    #[serde(default)]
    pub healthy: bool,
    /// Ids of volumes currently attached to this allocation.
    #[serde(default)]
    pub attached_volumes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_ip: Option<String>,
}

impl Allocation {
    /// First eight characters of the allocation id.
    #[must_use]
    pub fn id_short(&self) -> &str {
        self.id.get(..8).unwrap_or(&self.id)
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.status == "running"
    }
}

/// Desired count for one process group on the legacy scheduler.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroupCount {
    pub group: String,
    pub count: u32,
}
