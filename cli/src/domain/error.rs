//! Typed domain error enums.
//!
//! This module has zero imports from `crate::infra`, `crate::commands`,
//! `crate::application`, `tokio`, `std::fs`, `std::process`, or `std::net`.
//! All error types implement `thiserror::Error` and convert to `anyhow::Error`
//! via the `?` operator. Callers tell conditions apart with
//! [`is_timeout`] / [`is_already_locked`] rather than string matching.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Next action suggested to the operator after a failed or partial migration.
pub const TROUBLESHOOT_HINT: &str = "run 'hangar migrate-to-v2 troubleshoot' to inspect and repair the app";

// ── Precondition errors ───────────────────────────────────────────────────────

/// Fatal precondition failures, reported before any remote mutation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error(
        "autoscaling is enabled for '{app}'; disable it ('hangar autoscale disable') or pass --adopt-autoscale"
    )]
    AutoscaleEnabled { app: String },

    #[error("cannot migrate app {app} because alloc {unit} has {count} volumes attached")]
    MultipleVolumes {
        app: String,
        unit: String,
        count: usize,
    },

    #[error("cannot migrate app {app} because it uses multiple mounts for {processes}")]
    MultipleMounts { app: String, processes: String },

    #[error(
        "alloc {unit} has process group '{group}' that is not present in the app configuration; known process groups are: {known}"
    )]
    UnknownProcessGroup {
        unit: String,
        group: String,
        known: String,
    },

    #[error("no guest size is known for process group '{group}'")]
    MissingGuest { group: String },

    #[error("the app '{app}' is already on the machines platform")]
    AlreadyMigrated { app: String },

    #[error("app configuration is not valid for the machines platform: {reason}")]
    InvalidConfig { reason: String },

    #[error("the local app config is for '{found}', not '{app}'")]
    LocalConfigMismatch { app: String, found: String },

    #[error("volume {volume} is mounted on alloc {unit}, but has no mountpoint")]
    MissingMountPath { volume: String, unit: String },

    #[error("volume {volume} is attached to alloc {unit}, but that alloc is not running")]
    VolumeNotRunning { volume: String, unit: String },

    #[error("legacy VM size '{preset}' is incompatible with the machines platform")]
    UnknownSize { preset: String },

    #[error("failed to get image info: no tag or digest found")]
    NoImage,

    #[error("invalid volume mapping {mapping:?}: {reason}")]
    InvalidVolumeMapping { mapping: String, reason: String },

    #[error("max_wal_senders and max_replication_slots need to be set to at least {required}")]
    DatabaseSettings { required: u32 },

    #[error(
        "cannot determine a primary region: allocations run in {regions}; pass --primary-region"
    )]
    NoPrimaryRegion { regions: String },

    #[error("app '{app}' is partially migrated (platform 'detached'); {hint}", hint = TROUBLESHOOT_HINT)]
    PartiallyMigrated { app: String },
}

// ── Lock contention ───────────────────────────────────────────────────────────

/// Another migration (or operator) holds the app lock.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LockError {
    #[error("app '{app}' is already locked{}", expires_suffix(.expires_at.as_deref()))]
    AlreadyLocked {
        app: String,
        expires_at: Option<String>,
    },
}

fn expires_suffix(expires_at: Option<&str>) -> String {
    expires_at.map_or_else(String::new, |at| format!(" (lock expires at {at})"))
}

// ── Convergence timeouts ──────────────────────────────────────────────────────

/// A bounded wait exceeded its deadline.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("timed out after {}s waiting for {what}", .after.as_secs())]
pub struct TimedOut {
    pub what: String,
    pub after: Duration,
}

// ── Pipeline errors ───────────────────────────────────────────────────────────

/// Named stages of the migration pipeline, used to label failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Validate,
    AcquireLock,
    DisableAutoscale,
    DatabaseReadOnly,
    DatabaseVolumes,
    ForkVolumes,
    ScaleDown,
    DetachPlatform,
    CreateRelease,
    CreateUnits,
    AcquireLeases,
    ReleaseLock,
    Redeploy,
    DatabaseSync,
    DatabaseElection,
    FinalizePlatform,
}

impl Step {
    #[must_use]
    pub fn describe(self) -> &'static str {
        match self {
            Self::Validate => "validating preconditions",
            Self::AcquireLock => "locking the app",
            Self::DisableAutoscale => "disabling legacy autoscaling",
            Self::DatabaseReadOnly => "setting the database leader read-only",
            Self::DatabaseVolumes => "creating database volumes",
            Self::ForkVolumes => "forking volumes",
            Self::ScaleDown => "scaling legacy allocations to zero",
            Self::DetachPlatform => "enabling machine creation",
            Self::CreateRelease => "creating the migration release",
            Self::CreateUnits => "creating machines",
            Self::AcquireLeases => "acquiring machine leases",
            Self::ReleaseLock => "unlocking the app",
            Self::Redeploy => "redeploying machines",
            Self::DatabaseSync => "waiting for database replication",
            Self::DatabaseElection => "waiting for database leader election",
            Self::FinalizePlatform => "switching the platform version to target",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// Context attached to a step's error as it propagates out of the pipeline.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MigrateError {
    #[error("migration failed while {0}")]
    StepFailed(Step),

    #[error("migration aborted by operator")]
    Aborted,
}

// ── Troubleshooter errors ─────────────────────────────────────────────────────

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TroubleshootError {
    #[error("app has not been migrated to the machines platform ({legacy_units} legacy allocations running)")]
    NotMigrated { legacy_units: usize },

    #[error(
        "app '{app}' reports platform 'legacy' but has no legacy allocations; the migration stopped after scaling down and before machines were created. Restore the allocations or re-run the migration"
    )]
    LegacyWithoutUnits { app: String },

    #[error("app '{app}' is on the machines platform but was not migrated by hangar")]
    NotMigratedByTool { app: String },

    #[error("cannot troubleshoot app while it is locked")]
    LockedByOperator,

    #[error("both legacy allocations and machines exist; re-run interactively to choose a repair")]
    NeedsOperator,
}

// ── Predicates ────────────────────────────────────────────────────────────────

// anyhow context values are only reachable through `downcast_ref`, root
// errors through the source chain; check both.
fn find<T>(err: &anyhow::Error) -> Option<&T>
where
    T: std::error::Error + Send + Sync + 'static,
{
    err.downcast_ref::<T>()
        .or_else(|| err.chain().find_map(|e| e.downcast_ref::<T>()))
}

/// `true` if the error is, or wraps, a [`TimedOut`].
#[must_use]
pub fn is_timeout(err: &anyhow::Error) -> bool {
    find::<TimedOut>(err).is_some()
}

/// `true` if the error is, or wraps, a [`LockError`].
#[must_use]
pub fn is_already_locked(err: &anyhow::Error) -> bool {
    find::<LockError>(err).is_some()
}

/// `true` if the error is (or wraps) an operator abort.
///
/// A step failure is itself a [`MigrateError`] attached as context, so every
/// layer is checked rather than the first match.
#[must_use]
pub fn is_aborted(err: &anyhow::Error) -> bool {
    std::iter::once(err.downcast_ref::<MigrateError>())
        .chain(err.chain().map(|e| e.downcast_ref::<MigrateError>()))
        .flatten()
        .any(|e| *e == MigrateError::Aborted)
}

/// The pipeline step recorded on the error, if any.
#[must_use]
pub fn failed_step(err: &anyhow::Error) -> Option<Step> {
    match find::<MigrateError>(err) {
        Some(MigrateError::StepFailed(step)) => Some(*step),
        _ => None,
    }
}
