//! Application service: legacy and target inventory reads.
//!
//! Imports only from `crate::domain` and `crate::application::ports`.

use anyhow::{Context, Result};
use hangar_api_types::{Allocation, Machine, Volume};

use crate::application::ports::{ControlPlane, FleetApi};
use crate::domain::Snapshot;
use crate::domain::inventory::select_current;
use crate::domain::volumes::attached_to_snapshot;

/// Running allocations of the current release.
///
/// # Errors
///
/// Returns an error if the control plane cannot list allocations.
pub async fn current_allocations(cp: &impl ControlPlane, app: &str) -> Result<Vec<Allocation>> {
    let allocs = cp
        .list_allocations(app)
        .await
        .with_context(|| format!("listing legacy allocations for {app}"))?;
    Ok(select_current(allocs))
}

/// Machines that are not destroyed.
///
/// # Errors
///
/// Returns an error if the fleet API cannot list machines.
pub async fn live_machines(fleet: &impl FleetApi, app: &str) -> Result<Vec<Machine>> {
    let machines = fleet
        .list_machines(app)
        .await
        .with_context(|| format!("listing machines for {app}"))?;
    Ok(machines.into_iter().filter(|m| !m.is_destroyed()).collect())
}

/// Take the migration snapshot: current allocations minus those a live
/// machine already replaced.
///
/// # Errors
///
/// Returns an error if either listing fails.
pub async fn take_snapshot(
    cp: &impl ControlPlane,
    fleet: &impl FleetApi,
    app: &str,
) -> Result<(Snapshot, Vec<Machine>)> {
    let allocs = cp
        .list_allocations(app)
        .await
        .with_context(|| format!("listing legacy allocations for {app}"))?;
    let machines = live_machines(fleet, app).await?;
    let snapshot = Snapshot::new(allocs, &machines);
    if !snapshot.already_migrated.is_empty() {
        tracing::info!(
            app,
            skipped = snapshot.already_migrated.len(),
            "allocations already replaced by machines"
        );
    }
    Ok((snapshot, machines))
}

/// Volumes attached to an allocation in the snapshot, with full detail.
///
/// # Errors
///
/// Returns an error if the volume listing fails.
pub async fn attached_volumes(
    cp: &impl ControlPlane,
    app: &str,
    snapshot: &Snapshot,
) -> Result<Vec<Volume>> {
    let volumes = cp
        .list_volumes(app)
        .await
        .with_context(|| format!("listing volumes for {app}"))?;
    Ok(attached_to_snapshot(volumes, snapshot))
}
