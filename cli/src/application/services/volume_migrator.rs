//! Application service: volume forks, database volumes, and their cleanup.
//!
//! Imports only from `crate::domain` and `crate::application::ports`.

use std::time::Duration;

use anyhow::{Context, Result};
use hangar_api_types::{CreateVolumeRequest, ForkVolumeRequest, Volume};
use tokio_util::sync::CancellationToken;

use crate::application::ports::{ControlPlane, ProgressReporter};
use crate::application::services::poll::Backoff;
use crate::domain::volumes::{VolumePlan, database_volume_name, migrated_region};
use crate::domain::{MigratedVolume, Milestone, RecoveryLog, Snapshot};

/// Mount path used by database replicas on the target platform.
pub const DATABASE_MOUNT_PATH: &str = "/data";

const DELETE_ATTEMPTS: u32 = 10;

/// Fork every planned volume (or adopt the operator's replacement), recording
/// each created fork in `log`.
///
/// # Errors
///
/// Returns the first fork failure. Forks created before it stay recorded
/// so rollback can delete them.
pub async fn fork_volumes(
    cp: &impl ControlPlane,
    reporter: &impl ProgressReporter,
    app: &str,
    plans: &[VolumePlan],
    lock_id: &str,
    log: &mut RecoveryLog,
) -> Result<Vec<MigratedVolume>> {
    let mut migrated = Vec::with_capacity(plans.len());
    for plan in plans {
        if let Some(existing) = &plan.reuse {
            reporter.step(&format!(
                "using existing volume {}[{}] in place of {}",
                existing.name, existing.id, plan.source.id
            ));
            migrated.push(MigratedVolume {
                volume: existing.clone(),
                previous_alloc: plan.alloc_id.clone(),
                mount_path: plan.mount_path.clone(),
                preexisting: true,
            });
            continue;
        }

        let request = ForkVolumeRequest {
            source_volume_id: plan.source.id.clone(),
            name: plan.source.name.clone(),
            region: plan.region.clone(),
            machines_only: true,
            lock_id: Some(lock_id.to_string()),
        };
        let fork = cp
            .fork_volume(app, &request)
            .await
            .map_err(|e| explain_fork_failure(e, &plan.source))?;
        log.record(Milestone::VolumeCreated {
            volume_id: fork.id.clone(),
        });
        tracing::debug!(source = %plan.source.id, fork = %fork.id, "forked volume");
        reporter.step(&format!(
            "forked volume {}[{}] into {}[{}]",
            plan.source.name, plan.source.id, fork.name, fork.id
        ));
        migrated.push(MigratedVolume {
            volume: fork,
            previous_alloc: plan.alloc_id.clone(),
            mount_path: plan.mount_path.clone(),
            preexisting: false,
        });
    }
    Ok(migrated)
}

// The fork has to land on the same host; a full host rejects the source as
// a candidate.
fn explain_fork_failure(err: anyhow::Error, source: &Volume) -> anyhow::Error {
    if err.to_string().ends_with(" is not a valid candidate") {
        return err.context(format!(
            "the host holding volume {} ({}) has no capacity for another volume; try again later or migrate the volume manually",
            source.id, source.name
        ));
    }
    err.context(format!("forking volume {} ({})", source.id, source.name))
}

/// Create an empty `<name>_machines` volume for every database volume
/// attached to a snapshot allocation. Replicas sync their data after boot.
///
/// # Errors
///
/// Returns the first creation failure; earlier volumes stay recorded.
pub async fn create_database_volumes(
    cp: &impl ControlPlane,
    reporter: &impl ProgressReporter,
    app: &str,
    attached: &[Volume],
    snapshot: &Snapshot,
    log: &mut RecoveryLog,
) -> Result<Vec<MigratedVolume>> {
    let mut created = Vec::new();
    for vol in attached.iter().filter(|v| !v.name.contains("machines")) {
        let Some(alloc) = vol.attached_alloc_id.as_deref().and_then(|id| snapshot.find(id)) else {
            continue;
        };
        let request = CreateVolumeRequest {
            name: database_volume_name(&vol.name),
            region: migrated_region(&vol.region).to_string(),
            size_gb: vol.size_gb,
            machines_only: true,
        };
        let new_vol = cp
            .create_volume(app, &request)
            .await
            .with_context(|| format!("creating volume {} in {}", request.name, request.region))?;
        log.record(Milestone::VolumeCreated {
            volume_id: new_vol.id.clone(),
        });
        reporter.step(&format!("created volume {}[{}] in {}", new_vol.name, new_vol.id, new_vol.region));
        created.push(MigratedVolume {
            volume: new_vol,
            previous_alloc: alloc.id.clone(),
            mount_path: DATABASE_MOUNT_PATH.to_string(),
            preexisting: false,
        });
    }
    Ok(created)
}

/// Delete a migration-created volume, retrying with 1s..10s delays.
///
/// # Errors
///
/// Returns the last failure after every attempt is spent.
pub async fn delete_volume_with_retry(
    cp: &impl ControlPlane,
    app: &str,
    volume_id: &str,
    lock_id: Option<&str>,
    cancel: &CancellationToken,
) -> Result<()> {
    let mut delays = Backoff::new(Duration::from_secs(1), Duration::from_secs(10), 2.0);
    let mut attempt = 1;
    loop {
        match cp.delete_volume(app, volume_id, lock_id).await {
            Ok(()) => return Ok(()),
            Err(e) if attempt >= DELETE_ATTEMPTS || cancel.is_cancelled() => {
                return Err(e).with_context(|| format!("deleting volume {volume_id}"));
            }
            Err(e) => {
                tracing::debug!(volume_id, attempt, error = %e, "volume delete failed, retrying");
                attempt += 1;
                tokio::time::sleep(delays.next_delay()).await;
            }
        }
    }
}
