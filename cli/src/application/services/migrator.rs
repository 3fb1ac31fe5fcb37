//! Application service: the legacy → machines migration pipeline.
//!
//! [`prepare`] reads and validates everything without touching remote state.
//! [`Migrator::run`] then executes the ordered steps, appending a
//! [`Milestone`] to a [`RecoveryLog`] as each one takes effect. On failure
//! the log drives either a rollback or a hand-off to the troubleshooter.
//!
//! Imports only from `crate::domain` and `crate::application::ports`.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use hangar_api_types::{
    AppCompact, AppConfig, AutoscaleConfig, CreateReleaseRequest, LaunchSpec, Machine,
    PlatformVersion, Release, Volume,
};
use tokio_util::sync::CancellationToken;

use crate::application::ports::{
    AppConfigFile, ControlPlane, DbPeer, FleetApi, ProgressReporter, Prompter,
};
use crate::application::services::lease::{self, LeaseSet};
use crate::application::services::poll::check_cancelled;
use crate::application::services::{
    database, inventory, scale_down, target_units, volume_migrator,
};
use crate::domain::guest::{GuestMap, determine_guests};
use crate::domain::plan::PlanSummary;
use crate::domain::recovery::rollback_plan;
use crate::domain::synth::{SynthInput, apply_autoscale_policy, prep_machines_to_create};
use crate::domain::validate::{
    check_attached_volumes, check_autoscale, check_mounts, check_process_groups,
    determine_primary_region, ensure_config_for_app, ensure_not_migrated, resolve_image,
    validate_config,
};
use crate::domain::volumes::{
    VolumePlan, parse_volume_mappings, plan_volume_migrations, replaced_volumes,
    uses_forked_volumes,
};
use crate::domain::{
    MigrateError, MigratedVolume, MigrationTuning, Milestone, RecoveryLog, RecoveryState,
    RollbackAction, Snapshot, Step, is_aborted,
};

/// Release strategy recorded for the migration release.
const RELEASE_STRATEGY: &str = "immediate";

/// How to get past a deployed config the machines platform rejects.
pub const USE_LOCAL_CONFIG_HINT: &str =
    "the deployed app config is not valid for machines; save it, fix it, and rerun with --use-local-config";

// ── Preparation ───────────────────────────────────────────────────────────────

/// Operator choices for one migration.
#[derive(Debug, Clone, Default)]
pub struct MigrateOptions {
    pub app: String,
    pub primary_region: Option<String>,
    /// Carry an enabled legacy autoscaler over as standby machines instead
    /// of refusing to migrate.
    pub adopt_autoscale: bool,
    /// `source:destination` volume ids to reuse instead of forking.
    pub existing_volumes: Vec<String>,
    /// Where to save the migrated app config afterwards.
    pub config_path: Option<PathBuf>,
    /// Move on once machines start, without waiting for health checks.
    pub skip_health_checks: bool,
    /// Read the app config from this file instead of the latest release.
    pub local_config: Option<PathBuf>,
}

/// Everything the pipeline needs, read and validated up front.
#[derive(Debug, Clone)]
pub struct MigrationPlan {
    pub app: AppCompact,
    pub coordination_url: Option<String>,
    pub image: String,
    /// Declared config, with any adopted autoscale policy applied.
    pub config: AppConfig,
    pub snapshot: Snapshot,
    pub guests: GuestMap,
    pub primary_region: String,
    /// Enabled autoscaler being adopted.
    pub autoscale: Option<AutoscaleConfig>,
    pub attached_volumes: Vec<Volume>,
    pub volume_plans: Vec<VolumePlan>,
    pub config_path: Option<PathBuf>,
    pub skip_health_checks: bool,
    pub summary: PlanSummary,
}

impl MigrationPlan {
    /// Volumes are forked, so legacy units stop before machines start.
    #[must_use]
    pub fn requires_downtime(&self) -> bool {
        !self.volume_plans.is_empty()
    }

    /// Private addresses of the legacy database peers.
    #[must_use]
    pub fn legacy_addresses(&self) -> Vec<String> {
        self.snapshot
            .allocations
            .iter()
            .filter_map(|a| a.private_ip.clone())
            .collect()
    }

    fn synth_input<'a>(
        &'a self,
        release: Option<&'a Release>,
        volumes: &'a [MigratedVolume],
    ) -> SynthInput<'a> {
        SynthInput {
            config: &self.config,
            allocations: &self.snapshot.allocations,
            guests: &self.guests,
            image: &self.image,
            primary_region: &self.primary_region,
            release,
            volumes,
            autoscale: self.autoscale.as_ref(),
        }
    }
}

/// Read the app, validate every precondition, and dry-run synthesis.
///
/// Performs no remote mutation.
///
/// # Errors
///
/// Returns the first failed precondition, labelled [`Step::Validate`].
pub async fn prepare(
    cp: &impl ControlPlane,
    fleet: &impl FleetApi,
    db: &impl DbPeer,
    config_file: &impl AppConfigFile,
    opts: MigrateOptions,
) -> Result<MigrationPlan> {
    prepare_inner(cp, fleet, db, config_file, opts)
        .await
        .context(MigrateError::StepFailed(Step::Validate))
}

async fn prepare_inner(
    cp: &impl ControlPlane,
    fleet: &impl FleetApi,
    db: &impl DbPeer,
    config_file: &impl AppConfigFile,
    opts: MigrateOptions,
) -> Result<MigrationPlan> {
    let app = cp.get_app_compact(&opts.app).await?;
    ensure_not_migrated(&app.name, app.platform_version)?;
    let full = cp.get_app(&app.name).await?;
    let image = resolve_image(&full.image)?;

    let mut config = match &opts.local_config {
        Some(path) => {
            let local = config_file.read(path)?;
            ensure_config_for_app(&app.name, &local)?;
            local
        }
        None => cp.get_app_config(&app.name).await?,
    };
    if let Err(e) = validate_config(&config) {
        let err = anyhow::Error::new(e);
        return Err(if opts.local_config.is_none() {
            err.context(USE_LOCAL_CONFIG_HINT)
        } else {
            err
        });
    }

    let autoscale = cp.get_autoscale(&app.name).await?;
    check_autoscale(&app.name, autoscale.as_ref(), opts.adopt_autoscale)?;
    let autoscale = autoscale.filter(|a| a.enabled);

    let (snapshot, _) = inventory::take_snapshot(cp, fleet, &app.name).await?;
    check_process_groups(&snapshot.allocations, &config)?;
    check_attached_volumes(&app.name, &snapshot.allocations)?;
    check_mounts(&app.name, &config)?;

    let resources = cp.vm_resources(&app.name).await?;
    let guests = determine_guests(&resources.default_size, &resources.groups)?;
    let primary_region =
        determine_primary_region(opts.primary_region.as_deref(), &config, &snapshot.allocations)?;
    config.primary_region.clone_from(&primary_region);

    let attached_volumes = inventory::attached_volumes(cp, &app.name, &snapshot).await?;
    let volume_plans = if !app.database && uses_forked_volumes(&attached_volumes) {
        let mapping = parse_volume_mappings(&opts.existing_volumes, &attached_volumes)?;
        let mut preexisting = BTreeMap::new();
        for (source, destination) in &mapping {
            let volume = cp
                .get_volume(&app.name, destination)
                .await
                .with_context(|| format!("looking up volume {destination}"))?;
            preexisting.insert(source.clone(), volume);
        }
        plan_volume_migrations(&config, &snapshot, &attached_volumes, &preexisting)?
    } else {
        Vec::new()
    };

    if app.database {
        let addrs: Vec<String> = snapshot
            .allocations
            .iter()
            .filter_map(|a| a.private_ip.clone())
            .collect();
        database::check_settings(db, &addrs, snapshot.allocations.len()).await?;
    }

    if let Some(policy) = &autoscale {
        apply_autoscale_policy(&mut config, policy);
    }

    let config_path = opts.config_path.filter(|_| !app.database);
    let mut plan = MigrationPlan {
        coordination_url: full.coordination_url,
        image,
        config,
        snapshot,
        guests,
        primary_region,
        autoscale,
        attached_volumes,
        volume_plans,
        summary: PlanSummary::default(),
        config_path,
        skip_health_checks: opts.skip_health_checks,
        app,
    };

    // Surfaces unknown groups and missing guest sizes before anything changes.
    let specs = prep_machines_to_create(&plan.synth_input(None, &[]))?;
    plan.summary = summarize(&plan, &specs, config_file);
    Ok(plan)
}

fn summarize(plan: &MigrationPlan, specs: &[LaunchSpec], config_file: &impl AppConfigFile) -> PlanSummary {
    let mut summary = PlanSummary {
        app: plan.app.name.clone(),
        database: plan.app.database,
        legacy_units: plan.snapshot.allocations.len(),
        downtime: plan.requires_downtime(),
        forked_volumes: plan.volume_plans.iter().filter(|p| p.reuse.is_none()).count(),
        disables_autoscale: plan.autoscale.is_some(),
        health_checks: !plan.skip_health_checks,
        config_path: plan
            .config_path
            .as_ref()
            .map(|p| (p.clone(), config_file.exists(p))),
        ..PlanSummary::default()
    };
    summary.count_specs(specs);
    summary
}

// ── Execution ─────────────────────────────────────────────────────────────────

/// A completed migration.
#[derive(Debug)]
pub struct MigrationReport {
    pub machines: Vec<Machine>,
    pub release: Release,
    /// Legacy volume ids superseded by forks, by volume name.
    pub replaced_volumes: BTreeMap<String, Vec<String>>,
    pub log: RecoveryLog,
}

/// How a failed migration was cleaned up.
#[derive(Debug)]
pub enum Recovery {
    RolledBack,
    RollbackFailed(anyhow::Error),
    /// The operator kept the partial state to repair it interactively.
    LeftForTroubleshooter,
}

/// A failed migration, with what it had committed and how that was handled.
#[derive(Debug)]
pub struct MigrationFailure {
    pub error: anyhow::Error,
    pub log: RecoveryLog,
    pub recovery: Recovery,
}

/// Runs the pipeline against injected ports.
pub struct Migrator<'a, C, F, D, R>
where
    F: FleetApi + 'static,
{
    pub cp: &'a C,
    pub fleet: Arc<F>,
    pub db: &'a D,
    pub reporter: &'a R,
    pub tuning: &'a MigrationTuning,
    /// Fired on operator interrupt.
    pub cancel: CancellationToken,
}

impl<C, F, D, R> Migrator<'_, C, F, D, R>
where
    C: ControlPlane,
    F: FleetApi + 'static,
    D: DbPeer,
    R: ProgressReporter,
{
    /// Execute the migration. Leases are always released; on failure the
    /// app is rolled back, or unlocked and left for the troubleshooter when
    /// an interactive operator asks for that.
    ///
    /// # Errors
    ///
    /// Returns a [`MigrationFailure`] carrying the step error, the recovery
    /// log, and the recovery outcome.
    pub async fn run(
        &self,
        plan: &MigrationPlan,
        prompter: &impl Prompter,
    ) -> Result<MigrationReport, MigrationFailure> {
        let mut log = RecoveryLog::new();
        let mut leases: Option<LeaseSet<F>> = None;
        let result = self.pipeline(plan, &mut log, &mut leases).await;
        if let Some(mut held) = leases.take() {
            held.release_all().await;
        }
        match result {
            Ok((machines, release)) => Ok(MigrationReport {
                machines,
                release,
                replaced_volumes: replaced_volumes(&plan.volume_plans),
                log,
            }),
            Err(error) => {
                tracing::error!(app = %plan.app.name, error = %format!("{error:#}"), "migration failed");
                let recovery = self.recover(plan, &log, &error, prompter).await;
                Err(MigrationFailure {
                    error,
                    log,
                    recovery,
                })
            }
        }
    }

    async fn step<T>(&self, step: Step, work: impl Future<Output = Result<T>>) -> Result<T> {
        check_cancelled(&self.cancel).context(MigrateError::StepFailed(step))?;
        tracing::info!(step = %step, "migration step");
        self.reporter.step(step.describe());
        work.await.context(MigrateError::StepFailed(step))
    }

    async fn pipeline(
        &self,
        plan: &MigrationPlan,
        log: &mut RecoveryLog,
        leases: &mut Option<LeaseSet<F>>,
    ) -> Result<(Vec<Machine>, Release)> {
        let app = plan.app.name.as_str();
        let database = plan.app.database;
        let legacy_addrs = plan.legacy_addresses();

        // Nothing may change on the app before the lock is held.
        let lock = self
            .step(Step::AcquireLock, lease::acquire_app_lock(self.cp, app))
            .await?;
        log.record(Milestone::AppLocked {
            lock_id: lock.lock_id.clone(),
        });
        let lock_id = lock.lock_id.as_str();

        if let Some(policy) = &plan.autoscale {
            let disabled = AutoscaleConfig {
                enabled: false,
                ..policy.clone()
            };
            self.step(Step::DisableAutoscale, self.cp.set_autoscale(app, &disabled))
                .await?;
            log.record(Milestone::AutoscaleDisabled {
                previous: policy.clone(),
            });
        }

        if database {
            let secret_ok = self
                .step(
                    Step::DatabaseReadOnly,
                    database::ensure_coordination_secret(self.cp, app, plan.coordination_url.as_deref()),
                )
                .await?;
            if !secret_ok {
                self.reporter
                    .warn("no coordination URL is known; new replicas may not join the cluster");
            }
            self.step(
                Step::DatabaseReadOnly,
                database::set_readonly(self.db, &legacy_addrs, true),
            )
            .await?;
            log.record(Milestone::DatabaseReadOnly);
        }

        let volumes = if database {
            self.step(
                Step::DatabaseVolumes,
                volume_migrator::create_database_volumes(
                    self.cp,
                    self.reporter,
                    app,
                    &plan.attached_volumes,
                    &plan.snapshot,
                    log,
                ),
            )
            .await?
        } else if plan.volume_plans.is_empty() {
            Vec::new()
        } else {
            self.step(
                Step::ForkVolumes,
                volume_migrator::fork_volumes(
                    self.cp,
                    self.reporter,
                    app,
                    &plan.volume_plans,
                    lock_id,
                    log,
                ),
            )
            .await?
        };

        let previous = &plan.snapshot.raw_counts;
        if plan.requires_downtime() {
            self.step(
                Step::ScaleDown,
                scale_down::scale_to_zero(
                    self.cp,
                    app,
                    previous,
                    Some(lock_id),
                    self.tuning.scale_down_timeout(),
                    &self.cancel,
                    log,
                ),
            )
            .await?;
        }

        self.step(
            Step::DetachPlatform,
            self.cp
                .set_platform_version(app, PlatformVersion::Detached, Some(lock_id)),
        )
        .await?;
        log.record(Milestone::PlatformSet {
            version: PlatformVersion::Detached,
        });

        let request = CreateReleaseRequest {
            platform_version: PlatformVersion::Target,
            strategy: RELEASE_STRATEGY.to_string(),
            definition: plan.config.clone(),
            image: plan.image.clone(),
        };
        let release = self
            .step(Step::CreateRelease, self.cp.create_release(app, &request))
            .await?;
        log.record(Milestone::ReleaseCreated {
            release_id: release.id.clone(),
            version: release.version,
        });

        let specs = prep_machines_to_create(&plan.synth_input(Some(&release), &volumes))
            .context(MigrateError::StepFailed(Step::CreateUnits))?;
        let machines = self
            .step(
                Step::CreateUnits,
                target_units::create_units(
                    self.fleet.as_ref(),
                    self.reporter,
                    app,
                    &specs,
                    self.tuning.wait_timeout(),
                    &self.cancel,
                    log,
                ),
            )
            .await?;

        let mut held = self
            .step(
                Step::AcquireLeases,
                LeaseSet::acquire(Arc::clone(&self.fleet), app, &machines, self.tuning.lease_ttl()),
            )
            .await?;
        held.start_refresh(self.tuning.lease_refresh_interval());
        log.record(Milestone::LeasesAcquired {
            machines: machines.len(),
        });
        let held = leases.insert(held);

        self.step(Step::ReleaseLock, lease::release_app_lock(self.cp, app, lock_id))
            .await?;
        log.record(Milestone::AppUnlocked);

        self.step(
            Step::Redeploy,
            target_units::redeploy(
                self.fleet.as_ref(),
                self.reporter,
                app,
                &machines,
                held,
                target_units::Settle {
                    timeout: self.tuning.wait_timeout(),
                    health_checks: !plan.skip_health_checks,
                },
                &self.cancel,
            ),
        )
        .await?;
        log.record(Milestone::Redeployed);

        let machine_addrs: Vec<String> = machines.iter().filter_map(|m| m.private_ip.clone()).collect();
        if database {
            let in_region: Vec<String> = machines
                .iter()
                .filter(|m| m.region == plan.primary_region)
                .filter_map(|m| m.private_ip.clone())
                .collect();
            let all_addrs: Vec<String> = legacy_addrs.iter().chain(&machine_addrs).cloned().collect();
            self.step(Step::DatabaseSync, async {
                let uids = database::wait_for_healthy(
                    self.db,
                    &in_region,
                    self.tuning.scale_down_timeout(),
                    &self.cancel,
                )
                .await?;
                tracing::info!(?uids, "waiting for replicas to sync");
                database::wait_for_sync(
                    self.db,
                    &all_addrs,
                    &uids,
                    self.tuning.db_poll(),
                    self.tuning.db_timeout(),
                    &self.cancel,
                )
                .await?;
                database::hand_over_leadership(self.db, &legacy_addrs).await;
                anyhow::Ok(())
            })
            .await?;
        }

        if !plan.requires_downtime() {
            self.step(
                Step::ScaleDown,
                scale_down::scale_to_zero(
                    self.cp,
                    app,
                    previous,
                    None,
                    self.tuning.scale_down_timeout(),
                    &self.cancel,
                    log,
                ),
            )
            .await?;
        }

        if database {
            self.step(
                Step::DatabaseElection,
                database::wait_for_election(
                    self.db,
                    &machine_addrs,
                    self.tuning.db_poll(),
                    self.tuning.db_timeout(),
                    &self.cancel,
                ),
            )
            .await?;
            log.record(Milestone::DatabaseWritable);
        }

        self.step(
            Step::FinalizePlatform,
            self.cp.set_platform_version(app, PlatformVersion::Target, None),
        )
        .await?;
        log.record(Milestone::PlatformSet {
            version: PlatformVersion::Target,
        });

        Ok((machines, release))
    }

    // ── Recovery ──────────────────────────────────────────────────────────────

    async fn recover(
        &self,
        plan: &MigrationPlan,
        log: &RecoveryLog,
        error: &anyhow::Error,
        prompter: &impl Prompter,
    ) -> Recovery {
        if !is_aborted(error) && !log.is_empty() && prompter.is_interactive() {
            let question = "Would you like to enter interactive troubleshooting mode? If not, the migration will be rolled back.";
            match prompter.confirm(question, true) {
                Ok(true) => {
                    if let Some(lock_id) = log.state(plan.app.platform_version).app_locked {
                        if let Err(e) = lease::release_app_lock(self.cp, &plan.app.name, &lock_id).await {
                            self.reporter.warn(&format!("failed to unlock app: {e:#}"));
                        }
                    }
                    return Recovery::LeftForTroubleshooter;
                }
                Ok(false) => {}
                Err(e) => tracing::warn!(error = %e, "troubleshooting prompt failed, rolling back"),
            }
        }

        self.reporter.warn(if is_aborted(error) {
            "received abort signal, restoring the app to a stable state"
        } else {
            "an error occurred, rolling back changes"
        });
        match self.rollback(plan, log).await {
            Ok(()) => {
                self.reporter.success("successfully recovered");
                Recovery::RolledBack
            }
            Err(e) => Recovery::RollbackFailed(e),
        }
    }

    /// Undo what `log` says was committed, in rollback order.
    ///
    /// A failed action stops the remaining ones except unlock and resume,
    /// which always run.
    ///
    /// # Errors
    ///
    /// Returns the first failed action.
    pub async fn rollback(&self, plan: &MigrationPlan, log: &RecoveryLog) -> Result<()> {
        let state = log.state(plan.app.platform_version);
        let mut first_error: Option<anyhow::Error> = None;
        for action in rollback_plan(&state) {
            let always = matches!(action, RollbackAction::Unlock { .. } | RollbackAction::ResumeApp);
            if first_error.is_some() && !always {
                continue;
            }
            if let Err(e) = self.undo(plan, &state, &action).await {
                self.reporter.warn(&format!("{e:#}"));
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    async fn undo(&self, plan: &MigrationPlan, state: &RecoveryState, action: &RollbackAction) -> Result<()> {
        let app = plan.app.name.as_str();
        let lock_id = state.app_locked.as_deref();
        match action {
            RollbackAction::DestroyMachine { machine_id } => {
                self.reporter.step(&format!("removing machine {machine_id}"));
                target_units::destroy_units(self.fleet.as_ref(), app, std::slice::from_ref(machine_id)).await
            }
            RollbackAction::DeleteVolume { volume_id } => {
                self.reporter.step(&format!("removing migration-created volume {volume_id}"));
                let cleanup = CancellationToken::new();
                if let Err(e) =
                    volume_migrator::delete_volume_with_retry(self.cp, app, volume_id, lock_id, &cleanup).await
                {
                    self.reporter.warn(&format!("error removing volume {volume_id}: {e:#}"));
                }
                Ok(())
            }
            RollbackAction::DisableDatabaseReadOnly => {
                self.reporter.step("disabling database read-only mode");
                database::set_readonly(self.db, &plan.legacy_addresses(), false).await
            }
            RollbackAction::SetPlatform { version } => {
                self.reporter.step(&format!("setting platform version to '{version}'"));
                self.cp.set_platform_version(app, *version, lock_id).await
            }
            RollbackAction::RestoreCounts { counts, lock_id } => {
                self.reporter.step("restoring legacy allocations to their previous counts");
                self.cp.set_group_counts(app, counts, lock_id.as_deref()).await
            }
            RollbackAction::RestoreAutoscale { config } => {
                self.reporter.step("re-enabling legacy autoscaling");
                self.cp.set_autoscale(app, config).await
            }
            RollbackAction::Unlock { lock_id } => {
                self.reporter.step("unlocking app");
                lease::release_app_lock(self.cp, app, lock_id).await
            }
            RollbackAction::ResumeApp => match self.cp.resume_app(app).await {
                Err(e) if !format!("{e:#}").contains("not suspended") => {
                    Err(e.context("failed to unsuspend app"))
                }
                _ => Ok(()),
            },
        }
    }
}

// ── Completion ────────────────────────────────────────────────────────────────

/// Write the migrated config if a path was chosen. A failed save is reported
/// but does not fail the migration. Returns whether a file was written.
pub fn save_config(
    plan: &MigrationPlan,
    writer: &impl AppConfigFile,
    reporter: &impl ProgressReporter,
) -> bool {
    let Some(path) = &plan.config_path else {
        return false;
    };
    match writer.write(path, &plan.config) {
        Ok(()) => {
            reporter.success(&format!("saved app config to {}", path.display()));
            true
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "config save failed");
            reporter.warn(&format!(
                "failed to save the app config to {}, but the migration was successful; save it manually before deploying again",
                path.display()
            ));
            false
        }
    }
}
