//! Application service: launch, redeploy and destroy machines.
//!
//! Imports only from `crate::domain` and `crate::application::ports`.

use std::time::Duration;

use anyhow::{Context, Result};
use hangar_api_types::{LaunchSpec, Machine};
use tokio_util::sync::CancellationToken;

use crate::application::ports::{FleetApi, ProgressReporter};
use crate::application::services::lease::LeaseSet;
use crate::application::services::poll::{self, Backoff, check_cancelled};
use crate::domain::{MigrateError, Milestone, RecoveryLog};

/// How long redeploy waits on each machine, and for what.
#[derive(Debug, Clone, Copy)]
pub struct Settle {
    pub timeout: Duration,
    /// Also wait for every health check of a started machine to pass.
    pub health_checks: bool,
}

/// Launch one machine per spec, in order, waiting for each to reach its
/// start/stop barrier before launching the next.
///
/// Each machine is recorded in `log` as soon as the launch succeeds, so a
/// failed barrier still leaves it destroyable on rollback. Returned machines
/// carry the state they settled in.
///
/// # Errors
///
/// Returns the first launch or wait failure, [`TimedOut`](crate::domain::TimedOut)
/// for a machine that misses its barrier, or an abort.
pub async fn create_units(
    fleet: &impl FleetApi,
    reporter: &impl ProgressReporter,
    app: &str,
    specs: &[LaunchSpec],
    wait: Duration,
    cancel: &CancellationToken,
    log: &mut RecoveryLog,
) -> Result<Vec<Machine>> {
    let mut created = Vec::with_capacity(specs.len());
    for spec in specs {
        check_cancelled(cancel)?;
        let mut machine = fleet
            .launch(app, spec)
            .await
            .with_context(|| format!("launching machine in {}", spec.region))?;
        log.record(Milestone::MachineCreated {
            machine_id: machine.id.clone(),
        });

        let expected = spec.expected_state();
        reporter.step(&format!(
            "created machine {} ({}), waiting for it to be {expected}",
            machine.id,
            machine.process_group().unwrap_or_default()
        ));
        wait_for(fleet, app, &machine.id, expected, wait, cancel).await?;
        machine.state = expected.to_string();
        created.push(machine);
    }
    Ok(created)
}

async fn wait_for(
    fleet: &impl FleetApi,
    app: &str,
    machine_id: &str,
    state: &str,
    wait: Duration,
    cancel: &CancellationToken,
) -> Result<()> {
    tokio::select! {
        () = cancel.cancelled() => Err(MigrateError::Aborted.into()),
        res = fleet.wait_for_state(app, machine_id, state, wait) => {
            res.with_context(|| format!("waiting for machine {machine_id} to be {state}"))
        }
    }
}

/// Push each machine's config again under its lease so routing and service
/// discovery pick the machines up, and wait for it to settle back into its
/// current state. Started machines must also pass their health checks unless
/// `settle` says otherwise.
///
/// # Errors
///
/// Returns the first update or wait failure, or
/// [`TimedOut`](crate::domain::TimedOut) when checks keep failing.
pub async fn redeploy<F: FleetApi + 'static>(
    fleet: &F,
    reporter: &impl ProgressReporter,
    app: &str,
    machines: &[Machine],
    leases: &LeaseSet<F>,
    settle: Settle,
    cancel: &CancellationToken,
) -> Result<()> {
    for machine in machines {
        check_cancelled(cancel)?;
        let nonce = leases.nonce(&machine.id).await;
        fleet
            .update(app, &machine.id, &machine.config, nonce.as_deref())
            .await
            .with_context(|| format!("updating machine {}", machine.id))?;
        let stopped = machine.state == "stopped";
        let settled = if stopped { "stopped" } else { "started" };
        wait_for(fleet, app, &machine.id, settled, settle.timeout, cancel).await?;
        if settle.health_checks && !stopped {
            reporter.step(&format!("waiting for machine {} to pass its health checks", machine.id));
            wait_for_checks(fleet, app, &machine.id, settle.timeout, cancel).await?;
        }
        reporter.step(&format!("machine {} redeployed", machine.id));
    }
    Ok(())
}

/// Poll a machine's health checks until all of them pass.
///
/// # Errors
///
/// Returns [`TimedOut`](crate::domain::TimedOut) after `limit`, an abort, or
/// the failure to read the checks.
pub async fn wait_for_checks(
    fleet: &impl FleetApi,
    app: &str,
    machine_id: &str,
    limit: Duration,
    cancel: &CancellationToken,
) -> Result<()> {
    let what = format!("machine {machine_id} to pass its health checks");
    let delays = Backoff::new(Duration::from_secs(1), Duration::from_secs(10), 1.5);
    poll::until(&what, limit, delays, cancel, || async {
        let checks = fleet
            .check_statuses(app, machine_id)
            .await
            .with_context(|| format!("reading health checks of machine {machine_id}"))?;
        let failing: Vec<&str> = checks
            .iter()
            .filter(|c| !c.is_passing())
            .map(|c| c.name.as_str())
            .collect();
        if failing.is_empty() {
            return Ok(Some(()));
        }
        tracing::debug!(app, machine_id, ?failing, "health checks not passing yet");
        Ok(None)
    })
    .await
}

/// Destroy machines by id.
///
/// # Errors
///
/// Returns the first destroy failure.
pub async fn destroy_units(fleet: &impl FleetApi, app: &str, machine_ids: &[String]) -> Result<()> {
    for id in machine_ids {
        fleet
            .destroy(app, id)
            .await
            .with_context(|| format!("destroying machine {id}"))?;
        tracing::info!(app, machine_id = %id, "machine destroyed");
    }
    Ok(())
}
