//! Volume → mount mapping for migrated machines.
//!
//! Works out which legacy volumes need forking, where each fork is mounted,
//! and which pre-existing volumes the operator asked to reuse. No I/O.

use std::collections::{BTreeMap, BTreeSet};

use hangar_api_types::{AppConfig, Mount, Volume};

use crate::domain::error::ValidationError;
use crate::domain::inventory::Snapshot;

/// Regions that no longer accept new volumes, and their replacement.
const DEPRECATED_REGIONS: &[(&str, &str)] = &[("maa", "bom")];

/// A volume created (or reused) for the target platform, tied to the legacy
/// unit it replaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigratedVolume {
    pub volume: Volume,
    /// Full id of the allocation whose machine mounts this volume.
    pub previous_alloc: String,
    pub mount_path: String,
    /// Supplied by the operator rather than created by the migration.
    pub preexisting: bool,
}

/// What to do for one attached legacy volume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumePlan {
    pub source: Volume,
    pub alloc_id: String,
    pub group: String,
    pub mount_path: String,
    /// Region the fork is created in.
    pub region: String,
    /// Operator-supplied replacement; skip the fork when set.
    pub reuse: Option<Volume>,
}

/// Region to create a fork in.
#[must_use]
pub fn migrated_region(region: &str) -> &str {
    DEPRECATED_REGIONS
        .iter()
        .find(|(old, _)| *old == region)
        .map_or(region, |(_, new)| *new)
}

/// Mounts with an empty process list expanded to every process group.
#[must_use]
pub fn normalize_mounts(cfg: &AppConfig) -> Vec<Mount> {
    let all = cfg.process_names();
    cfg.mounts
        .iter()
        .cloned()
        .map(|mut m| {
            if m.processes.is_empty() {
                m.processes.clone_from(&all);
            }
            m
        })
        .collect()
}

/// Destination of the mount for `volume_name` in `group`.
#[must_use]
pub fn mount_path<'a>(mounts: &'a [Mount], volume_name: &str, group: &str) -> Option<&'a str> {
    mounts
        .iter()
        .find(|m| m.source == volume_name && m.processes.iter().any(|p| p == group))
        .map(|m| m.destination.as_str())
}

/// Volumes attached to an allocation in the snapshot.
#[must_use]
pub fn attached_to_snapshot(volumes: Vec<Volume>, snapshot: &Snapshot) -> Vec<Volume> {
    volumes
        .into_iter()
        .filter(|v| {
            v.attached_alloc_id
                .as_deref()
                .is_some_and(|id| snapshot.find(id).is_some())
        })
        .collect()
}

/// Whether the migration forks volumes (and therefore needs downtime).
///
/// Any attached volume counts, mounted or not: an attached volume without a
/// mount must fail planning rather than be left behind.
#[must_use]
pub fn uses_forked_volumes(attached: &[Volume]) -> bool {
    !attached.is_empty()
}

/// Parse and validate `src:dst` mappings of pre-existing volumes.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidVolumeMapping`] for malformed entries,
/// sources not attached to a running allocation, identical ends, or ids
/// mapped twice.
pub fn parse_volume_mappings(
    args: &[String],
    attached: &[Volume],
) -> Result<BTreeMap<String, String>, ValidationError> {
    let mut seen = BTreeSet::new();
    let mut mapping = BTreeMap::new();
    for arg in args {
        let bad = |reason: String| ValidationError::InvalidVolumeMapping {
            mapping: arg.clone(),
            reason,
        };
        let (src, dst) = match arg.split(':').collect::<Vec<_>>().as_slice() {
            [src, dst] => (*src, *dst),
            _ => return Err(bad("expected <source>:<destination>".to_string())),
        };
        if src.is_empty() {
            return Err(bad("source cannot be empty".to_string()));
        }
        if dst.is_empty() {
            return Err(bad("destination cannot be empty".to_string()));
        }
        if !attached.iter().any(|v| v.id == src) {
            return Err(bad(format!("source {src:?} is not attached to any running allocs")));
        }
        if src == dst {
            return Err(bad("source and destination cannot be the same".to_string()));
        }
        if !seen.insert(src.to_string()) {
            return Err(bad(format!("source {src:?} already mapped")));
        }
        if !seen.insert(dst.to_string()) {
            return Err(bad(format!("destination {dst:?} already mapped")));
        }
        mapping.insert(src.to_string(), dst.to_string());
    }
    Ok(mapping)
}

/// Plan one fork (or reuse) per attached volume.
///
/// # Errors
///
/// Returns [`ValidationError::VolumeNotRunning`] when a volume's allocation is
/// not in the snapshot and [`ValidationError::MissingMountPath`] when no mount
/// covers the volume for its allocation's group.
pub fn plan_volume_migrations(
    cfg: &AppConfig,
    snapshot: &Snapshot,
    attached: &[Volume],
    preexisting: &BTreeMap<String, Volume>,
) -> Result<Vec<VolumePlan>, ValidationError> {
    let mounts = normalize_mounts(cfg);
    attached
        .iter()
        .filter_map(|vol| vol.attached_alloc_id.as_deref().map(|id| (vol, id)))
        .map(|(vol, alloc_ref)| {
            let label = format!("{}[{}]", vol.name, vol.id);
            let alloc = snapshot
                .find(alloc_ref)
                .ok_or_else(|| ValidationError::VolumeNotRunning {
                    volume: label.clone(),
                    unit: alloc_ref.to_string(),
                })?;
            let path = mount_path(&mounts, &vol.name, &alloc.task_name).ok_or_else(|| {
                ValidationError::MissingMountPath {
                    volume: label,
                    unit: alloc.id.clone(),
                }
            })?;
            Ok(VolumePlan {
                source: vol.clone(),
                alloc_id: alloc.id.clone(),
                group: alloc.task_name.clone(),
                mount_path: path.to_string(),
                region: migrated_region(&vol.region).to_string(),
                reuse: preexisting.get(&vol.id).cloned(),
            })
        })
        .collect()
}

/// Legacy volume ids superseded by forks, grouped by volume name.
#[must_use]
pub fn replaced_volumes(plans: &[VolumePlan]) -> BTreeMap<String, Vec<String>> {
    let mut replaced: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for plan in plans {
        replaced
            .entry(plan.source.name.clone())
            .or_default()
            .push(plan.source.id.clone());
    }
    replaced
}

/// Name of the empty volume a database replica gets on the target platform.
#[must_use]
pub fn database_volume_name(source: &str) -> String {
    format!("{source}_machines")
}
