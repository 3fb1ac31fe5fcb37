//! Persistent volume records and requests.

use serde::{Deserialize, Serialize};

/// A persistent volume as reported by the control plane.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Volume {
    pub id: String,
    pub name: String,
    pub region: String,
    pub size_gb: u32,
    /// `created`, `ready`, `pending_destroy`...
    #[serde(default)]
    pub state: String,
    /// Allocation currently holding the volume, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attached_alloc_id: Option<String>,
    /// Machine currently holding the volume, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attached_machine_id: Option<String>,
    /// Restricts the volume to the machines platform.
    #[serde(default)]
    pub machines_only: bool,
}

/// Clone an existing volume's data into a new volume.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ForkVolumeRequest {
    pub source_volume_id: String,
    pub name: String,
    pub region: String,
    pub machines_only: bool,
    /// Lock id authorising the fork while the app is locked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock_id: Option<String>,
}

/// Create a new empty volume.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreateVolumeRequest {
    pub name: String,
    pub region: String,
    pub size_gb: u32,
    pub machines_only: bool,
}
