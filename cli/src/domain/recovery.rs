//! Append-only record of what a migration has committed.
//!
//! Each pipeline step appends a [`Milestone`] once it has taken effect.
//! [`RecoveryLog::state`] folds the log into flags, and [`rollback_plan`]
//! turns those flags into the ordered compensating actions. Nothing here is
//! persisted; after a crash the troubleshooter re-derives state from the
//! platform instead.

use hangar_api_types::{AutoscaleConfig, PlatformVersion};

use crate::domain::inventory::GroupCounts;

/// A step that has taken effect on the remote platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Milestone {
    AppLocked { lock_id: String },
    AutoscaleDisabled { previous: AutoscaleConfig },
    DatabaseReadOnly,
    VolumeCreated { volume_id: String },
    ScaledToZero { previous: GroupCounts },
    PlatformSet { version: PlatformVersion },
    ReleaseCreated { release_id: String, version: u64 },
    MachineCreated { machine_id: String },
    LeasesAcquired { machines: usize },
    AppUnlocked,
    Redeployed,
    DatabaseWritable,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryLog {
    entries: Vec<Milestone>,
}

impl RecoveryLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, milestone: Milestone) {
        self.entries.push(milestone);
    }

    #[must_use]
    pub fn entries(&self) -> &[Milestone] {
        &self.entries
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fold the log into the current recovery flags.
    #[must_use]
    pub fn state(&self, original_platform: PlatformVersion) -> RecoveryState {
        let mut state = RecoveryState {
            platform: original_platform,
            original_platform,
            ..RecoveryState::default()
        };
        for entry in &self.entries {
            match entry {
                Milestone::AppLocked { lock_id } => state.app_locked = Some(lock_id.clone()),
                Milestone::AppUnlocked => state.app_locked = None,
                Milestone::AutoscaleDisabled { previous } => {
                    state.autoscale_disabled = Some(previous.clone());
                }
                Milestone::DatabaseReadOnly => state.database_read_only = true,
                Milestone::DatabaseWritable => state.database_read_only = false,
                Milestone::VolumeCreated { volume_id } => {
                    state.volumes_created.push(volume_id.clone());
                }
                Milestone::ScaledToZero { previous } => {
                    state.scaled_to_zero = true;
                    state.previous_counts.clone_from(previous);
                }
                Milestone::PlatformSet { version } => state.platform = *version,
                Milestone::MachineCreated { machine_id } => {
                    state.machines_created.push(machine_id.clone());
                }
                Milestone::ReleaseCreated { .. }
                | Milestone::LeasesAcquired { .. }
                | Milestone::Redeployed => {}
            }
        }
        state
    }
}

/// Committed-step flags derived from a [`RecoveryLog`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryState {
    /// Lock id while the app lock is held.
    pub app_locked: Option<String>,
    pub scaled_to_zero: bool,
    /// Group counts before scale-down.
    pub previous_counts: GroupCounts,
    pub machines_created: Vec<String>,
    pub volumes_created: Vec<String>,
    /// The legacy database leader was put in read-only mode.
    pub database_read_only: bool,
    pub autoscale_disabled: Option<AutoscaleConfig>,
    pub platform: PlatformVersion,
    pub original_platform: PlatformVersion,
}

/// One compensating action, executed in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RollbackAction {
    DestroyMachine { machine_id: String },
    DeleteVolume { volume_id: String },
    DisableDatabaseReadOnly,
    SetPlatform { version: PlatformVersion },
    RestoreCounts {
        counts: GroupCounts,
        lock_id: Option<String>,
    },
    RestoreAutoscale { config: AutoscaleConfig },
    Unlock { lock_id: String },
    ResumeApp,
}

/// Compensating actions for a recovery state: destroy machines, delete
/// created volumes, re-enable database writes, restore the platform version
/// and legacy counts, unlock, resume.
#[must_use]
pub fn rollback_plan(state: &RecoveryState) -> Vec<RollbackAction> {
    let mut plan: Vec<RollbackAction> = state
        .machines_created
        .iter()
        .map(|id| RollbackAction::DestroyMachine {
            machine_id: id.clone(),
        })
        .collect();
    plan.extend(
        state
            .volumes_created
            .iter()
            .map(|id| RollbackAction::DeleteVolume {
                volume_id: id.clone(),
            }),
    );
    if state.database_read_only {
        plan.push(RollbackAction::DisableDatabaseReadOnly);
    }
    if state.platform != state.original_platform {
        plan.push(RollbackAction::SetPlatform {
            version: state.original_platform,
        });
    }
    if state.scaled_to_zero && !state.previous_counts.is_empty() {
        plan.push(RollbackAction::RestoreCounts {
            counts: state.previous_counts.clone(),
            lock_id: state.app_locked.clone(),
        });
    }
    if let Some(config) = &state.autoscale_disabled {
        plan.push(RollbackAction::RestoreAutoscale {
            config: config.clone(),
        });
    }
    if let Some(lock_id) = &state.app_locked {
        plan.push(RollbackAction::Unlock {
            lock_id: lock_id.clone(),
        });
    }
    plan.push(RollbackAction::ResumeApp);
    plan
}
