//! Application service: inspect and repair a partially migrated app.
//!
//! Every run re-derives the app's phase from the platform (platform version,
//! allocations, machines). Nothing from an earlier migration run is trusted.
//! Repairs reuse the migrator's primitives: scale-to-zero, machine destroy,
//! leased redeploy, platform flips.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use hangar_api_types::{AppCompact, Allocation, Machine, PlatformVersion};
use tokio_util::sync::CancellationToken;

use crate::application::ports::{ControlPlane, FleetApi, ProgressReporter, Prompter};
use crate::application::services::lease::LeaseSet;
use crate::application::services::poll::{self, Backoff};
use crate::application::services::{inventory, scale_down, target_units};
use crate::domain::diagnose::{
    Diagnosis, Menu, MenuOption, Transition, autodiagnose, classify, describe_lock,
    has_migration_provenance,
};
use crate::domain::inventory::count_groups;
use crate::domain::{MigrationTuning, RecoveryLog, TroubleshootError};

const RESUME_TIMEOUT: Duration = Duration::from_secs(60);

/// How a troubleshooting session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Already fully migrated.
    NothingToDo,
    /// The app now runs on this platform only.
    Converged(PlatformVersion),
    /// The operator left the menu without a repair.
    Unresolved,
}

/// Where the session was started from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Entry {
    #[default]
    Troubleshoot,
    /// Also accepts apps whose machines carry migration provenance.
    Debug,
}

pub struct Troubleshooter<'a, C, F, R>
where
    F: FleetApi + 'static,
{
    pub cp: &'a C,
    pub fleet: Arc<F>,
    pub reporter: &'a R,
    pub tuning: &'a MigrationTuning,
    pub cancel: CancellationToken,
}

// Debug entry also treats machines with provenance as a half-migrated app.
fn effective_platform(
    app: &AppCompact,
    inv: &Inventory,
    entry: Entry,
) -> Result<PlatformVersion> {
    if entry == Entry::Troubleshoot {
        return Ok(app.platform_version);
    }
    let provenance = has_migration_provenance(&inv.machines);
    match app.platform_version {
        PlatformVersion::Target if !provenance => Err(TroubleshootError::NotMigratedByTool {
            app: app.name.clone(),
        }
        .into()),
        PlatformVersion::Legacy if provenance => Ok(PlatformVersion::Detached),
        other => Ok(other),
    }
}

struct Inventory {
    legacy: Vec<Allocation>,
    machines: Vec<Machine>,
}

impl<C, F, R> Troubleshooter<'_, C, F, R>
where
    C: ControlPlane,
    F: FleetApi + 'static,
    R: ProgressReporter,
{
    /// Diagnose `app` and converge it where the state is unambiguous.
    ///
    /// # Errors
    ///
    /// Returns a [`TroubleshootError`] for states it refuses to repair, or
    /// the failing remote call.
    pub async fn run(&self, app: &str, entry: Entry, prompter: &impl Prompter) -> Result<Resolution> {
        let compact = self.cp.get_app_compact(app).await?;
        self.clear_stale_lock(app, prompter).await?;
        self.resume_if_suspended(&compact).await?;

        let inv = self.inventory(app).await?;
        let platform = effective_platform(&compact, &inv, entry)?;
        let diagnosis = classify(platform, inv.legacy.len(), inv.machines.len());
        tracing::info!(app, ?diagnosis, %platform, "troubleshooting");

        match diagnosis {
            Diagnosis::Healthy => {
                self.reporter.success("the app is fully migrated; nothing to repair");
                Ok(Resolution::NothingToDo)
            }
            Diagnosis::NotMigrated { legacy_units } => {
                Err(TroubleshootError::NotMigrated { legacy_units }.into())
            }
            Diagnosis::LegacyWithoutUnits => Err(TroubleshootError::LegacyWithoutUnits {
                app: app.to_string(),
            }
            .into()),
            Diagnosis::ResidualLegacy => {
                self.reporter
                    .info(&format!("{} legacy VM(s) are still running on a migrated app", inv.legacy.len()));
                self.drain_legacy(app, &inv.legacy).await?;
                Ok(Resolution::Converged(PlatformVersion::Target))
            }
            Diagnosis::DetachedEmpty | Diagnosis::DetachedTargetOnly => {
                self.converge(app, PlatformVersion::Target).await
            }
            Diagnosis::DetachedLegacyOnly => self.converge(app, PlatformVersion::Legacy).await,
            Diagnosis::DetachedBoth if !prompter.is_interactive() => {
                self.reporter.info(&autodiagnose(&inv.legacy, &inv.machines));
                Err(TroubleshootError::NeedsOperator.into())
            }
            Diagnosis::DetachedBoth => self.menu(app, prompter).await,
        }
    }

    async fn inventory(&self, app: &str) -> Result<Inventory> {
        Ok(Inventory {
            legacy: inventory::current_allocations(self.cp, app).await?,
            machines: inventory::live_machines(self.fleet.as_ref(), app).await?,
        })
    }

    async fn clear_stale_lock(&self, app: &str, prompter: &impl Prompter) -> Result<()> {
        let Some(lock) = self.cp.current_lock(app).await? else {
            return Ok(());
        };
        self.reporter
            .warn(&format!("app is locked ({})", describe_lock(&lock, Utc::now())));
        if !prompter.is_interactive() {
            return Err(TroubleshootError::LockedByOperator.into());
        }
        let question = "The app is locked, possibly by an interrupted migration. Remove the lock?";
        if !prompter.confirm(question, false)? {
            return Err(TroubleshootError::LockedByOperator.into());
        }
        self.cp
            .unlock_app(app, &lock.lock_id)
            .await
            .context("removing the app lock")?;
        self.reporter.success("lock removed");
        Ok(())
    }

    async fn resume_if_suspended(&self, app: &AppCompact) -> Result<()> {
        if !app.is_suspended() {
            return Ok(());
        }
        self.reporter.step("app is suspended, resuming it");
        self.cp.resume_app(&app.name).await.context("failed to unsuspend app")?;
        let delays = Backoff::new(Duration::from_secs(1), Duration::from_secs(10), 2.0);
        poll::until("the app to resume", RESUME_TIMEOUT, delays, &self.cancel, || async {
            let current = self.cp.get_app_compact(&app.name).await?;
            Ok((!current.is_suspended()).then_some(()))
        })
        .await
    }

    async fn converge(&self, app: &str, version: PlatformVersion) -> Result<Resolution> {
        self.reporter
            .step(&format!("setting the platform version to '{version}'"));
        self.cp.set_platform_version(app, version, None).await?;
        self.reporter.success(&format!("app converged to '{version}'"));
        Ok(Resolution::Converged(version))
    }

    async fn drain_legacy(&self, app: &str, legacy: &[Allocation]) -> Result<()> {
        self.reporter.step("scaling legacy VMs to zero");
        let counts = count_groups(legacy);
        // Rollback is not offered here; the log only satisfies the primitive.
        let mut scratch = RecoveryLog::new();
        scale_down::scale_to_zero(
            self.cp,
            app,
            &counts,
            None,
            self.tuning.scale_down_timeout(),
            &self.cancel,
            &mut scratch,
        )
        .await?;
        self.reporter.success("legacy VMs removed");
        Ok(())
    }

    // ── Interactive menu ──────────────────────────────────────────────────────

    async fn menu(&self, app: &str, prompter: &impl Prompter) -> Result<Resolution> {
        self.reporter
            .warn("both legacy VMs and machines exist; choose how to repair the app");
        let labels: Vec<&str> = MenuOption::ALL.iter().map(|o| o.label()).collect();
        let mut menu = Menu::new();
        loop {
            let picked = prompter.select("What would you like to do?", &labels, menu.last().index())?;
            let option = MenuOption::from_index(picked).unwrap_or(MenuOption::Exit);
            let mut transition = menu.choose(option);
            if let Transition::AwaitConfirmation(pending) = transition {
                let confirmed = prompter.confirm(pending.confirmation().unwrap_or_default(), false)?;
                transition = menu.confirm(pending, confirmed);
            }
            match transition {
                Transition::Exit => return Ok(Resolution::Unresolved),
                Transition::Prompt | Transition::AwaitConfirmation(_) => {}
                Transition::Perform(option) => {
                    let resolution = self.perform(app, option).await?;
                    if menu.after(option) == Transition::Exit {
                        return Ok(resolution);
                    }
                }
            }
        }
    }

    async fn perform(&self, app: &str, option: MenuOption) -> Result<Resolution> {
        // Fresh inventory for every action; a previous action may have changed it.
        let inv = self.inventory(app).await?;
        match option {
            MenuOption::Autodiagnose => {
                self.reporter.info(&autodiagnose(&inv.legacy, &inv.machines));
            }
            MenuOption::ListLegacy => {
                for alloc in &inv.legacy {
                    self.reporter.info(&format!(
                        "{}  {}  {}  {}  {}",
                        alloc.id_short(),
                        alloc.task_name,
                        alloc.region,
                        alloc.status,
                        if alloc.healthy { "healthy" } else { "unhealthy" }
                    ));
                }
            }
            MenuOption::ListTarget => {
                for machine in &inv.machines {
                    self.reporter.info(&format!(
                        "{}  {}  {}  {}",
                        machine.id,
                        machine.process_group().unwrap_or("-"),
                        machine.region,
                        machine.state
                    ));
                }
            }
            MenuOption::Redeploy => self.redeploy(app, &inv.machines).await?,
            MenuOption::DestroyLegacyKeepTarget => {
                self.drain_legacy(app, &inv.legacy).await?;
                return self.converge(app, PlatformVersion::Target).await;
            }
            MenuOption::DestroyTargetKeepLegacy => {
                self.reporter.step("destroying machines");
                let ids: Vec<String> = inv.machines.iter().map(|m| m.id.clone()).collect();
                target_units::destroy_units(self.fleet.as_ref(), app, &ids).await?;
                return self.converge(app, PlatformVersion::Legacy).await;
            }
            MenuOption::Exit => {}
        }
        Ok(Resolution::Unresolved)
    }

    async fn redeploy(&self, app: &str, machines: &[Machine]) -> Result<()> {
        let mut leases =
            LeaseSet::acquire(Arc::clone(&self.fleet), app, machines, self.tuning.lease_ttl()).await?;
        leases.start_refresh(self.tuning.lease_refresh_interval());
        let result = target_units::redeploy(
            self.fleet.as_ref(),
            self.reporter,
            app,
            machines,
            &leases,
            target_units::Settle {
                timeout: self.tuning.wait_timeout(),
                health_checks: true,
            },
            &self.cancel,
        )
        .await;
        leases.release_all().await;
        result?;
        self.reporter.success("machines redeployed");
        Ok(())
    }
}
