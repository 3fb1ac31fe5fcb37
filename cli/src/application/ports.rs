//! Port trait definitions for the Application layer.
//!
//! Ports are the interfaces (contracts) that infrastructure must fulfill.
//! This file imports only from `crate::domain` and the shared wire types;
//! never from `crate::infra`, `crate::commands`, or `crate::output`.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use hangar_api_types::{
    Allocation, App, AppCompact, AppConfig, AppLock, AppVmResources, AutoscaleConfig, CheckStatus,
    CreateReleaseRequest, CreateVolumeRequest, DbRole, DbSetting, ForkVolumeRequest, LaunchSpec,
    Lease, Machine, MachineConfig, PlatformVersion, Release, ReplicationStat, Volume,
};

use crate::domain::{GroupCounts, HangarConfig};

// ── Control plane ─────────────────────────────────────────────────────────────

/// Application-level operations on the control-plane API.
///
/// Implementations surface lock contention as
/// [`LockError`](crate::domain::LockError) so callers can tell it apart with
/// [`is_already_locked`](crate::domain::is_already_locked).
#[allow(async_fn_in_trait)]
pub trait ControlPlane {
    async fn get_app_compact(&self, app: &str) -> Result<AppCompact>;
    async fn get_app(&self, app: &str) -> Result<App>;
    /// The app's declared configuration as the legacy platform runs it.
    async fn get_app_config(&self, app: &str) -> Result<AppConfig>;
    /// Set the platform version. `lock_id` is required while the app is locked.
    async fn set_platform_version(
        &self,
        app: &str,
        version: PlatformVersion,
        lock_id: Option<&str>,
    ) -> Result<()>;

    /// Take the app-wide migration lock.
    async fn lock_app(&self, app: &str) -> Result<AppLock>;
    async fn unlock_app(&self, app: &str, lock_id: &str) -> Result<()>;
    /// The outstanding lock, if any.
    async fn current_lock(&self, app: &str) -> Result<Option<AppLock>>;

    async fn create_release(&self, app: &str, request: &CreateReleaseRequest) -> Result<Release>;

    async fn get_autoscale(&self, app: &str) -> Result<Option<AutoscaleConfig>>;
    async fn set_autoscale(&self, app: &str, config: &AutoscaleConfig) -> Result<()>;

    async fn list_allocations(&self, app: &str) -> Result<Vec<Allocation>>;
    /// Set the legacy scheduler's desired count for each listed group.
    async fn set_group_counts(
        &self,
        app: &str,
        counts: &GroupCounts,
        lock_id: Option<&str>,
    ) -> Result<()>;
    async fn vm_resources(&self, app: &str) -> Result<AppVmResources>;

    async fn list_volumes(&self, app: &str) -> Result<Vec<Volume>>;
    async fn get_volume(&self, app: &str, volume_id: &str) -> Result<Volume>;
    async fn fork_volume(&self, app: &str, request: &ForkVolumeRequest) -> Result<Volume>;
    async fn create_volume(&self, app: &str, request: &CreateVolumeRequest) -> Result<Volume>;
    async fn delete_volume(&self, app: &str, volume_id: &str, lock_id: Option<&str>) -> Result<()>;

    /// Names of the app's secrets; values are write-only.
    async fn list_secrets(&self, app: &str) -> Result<Vec<String>>;
    async fn set_secrets(&self, app: &str, secrets: &BTreeMap<String, String>) -> Result<()>;

    async fn resume_app(&self, app: &str) -> Result<()>;
}

// ── Fleet ─────────────────────────────────────────────────────────────────────

/// Machine operations on the fleet API.
///
/// Futures are `Send` so the lease refresher can run on a spawned task.
pub trait FleetApi: Send + Sync {
    fn list_machines(&self, app: &str) -> impl Future<Output = Result<Vec<Machine>>> + Send;

    fn launch(&self, app: &str, spec: &LaunchSpec) -> impl Future<Output = Result<Machine>> + Send;

    /// Replace a machine's config. `nonce` is the held lease, if any.
    fn update(
        &self,
        app: &str,
        machine_id: &str,
        config: &MachineConfig,
        nonce: Option<&str>,
    ) -> impl Future<Output = Result<Machine>> + Send;

    fn destroy(&self, app: &str, machine_id: &str) -> impl Future<Output = Result<()>> + Send;

    /// Block until the machine reports `state`, failing with
    /// [`TimedOut`](crate::domain::TimedOut) after `timeout`.
    fn wait_for_state(
        &self,
        app: &str,
        machine_id: &str,
        state: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Latest status of every health check on the machine.
    fn check_statuses(
        &self,
        app: &str,
        machine_id: &str,
    ) -> impl Future<Output = Result<Vec<CheckStatus>>> + Send;

    fn acquire_lease(
        &self,
        app: &str,
        machine_id: &str,
        ttl: Duration,
    ) -> impl Future<Output = Result<Lease>> + Send;

    fn refresh_lease(
        &self,
        app: &str,
        machine_id: &str,
        nonce: &str,
        ttl: Duration,
    ) -> impl Future<Output = Result<Lease>> + Send;

    fn release_lease(
        &self,
        app: &str,
        machine_id: &str,
        nonce: &str,
    ) -> impl Future<Output = Result<()>> + Send;
}

// ── Database peers ────────────────────────────────────────────────────────────

/// Per-node database cluster protocol, addressed by private network address.
#[allow(async_fn_in_trait)]
pub trait DbPeer {
    async fn role(&self, addr: &str) -> Result<DbRole>;
    async fn enable_readonly(&self, addr: &str) -> Result<()>;
    async fn disable_readonly(&self, addr: &str) -> Result<()>;
    /// Restart the node's connection router so it re-resolves the leader.
    async fn restart_router(&self, addr: &str) -> Result<()>;
    async fn failover(&self, addr: &str) -> Result<()>;
    async fn replication_stats(&self, addr: &str) -> Result<Vec<ReplicationStat>>;
    async fn settings(&self, addr: &str, names: &[&str]) -> Result<Vec<DbSetting>>;
    /// The node's database identity as reported in replication stats.
    async fn db_uid(&self, addr: &str) -> Result<String>;
}

// ── Operator interaction ──────────────────────────────────────────────────────

/// Abstracts operator prompts so services stay testable without a TTY.
pub trait Prompter {
    /// `false` under `--yes`, `CI`, or `HANGAR_YES`.
    fn is_interactive(&self) -> bool;
    /// Ask a yes/no question. Non-interactive prompters return `default`.
    ///
    /// # Errors
    ///
    /// Returns an error if the terminal prompt fails.
    fn confirm(&self, prompt: &str, default: bool) -> Result<bool>;
    /// Pick one of `items`, returning its index.
    ///
    /// # Errors
    ///
    /// Returns an error if the terminal prompt fails.
    fn select(&self, prompt: &str, items: &[&str], default: usize) -> Result<usize>;
}

// ── Progress Reporting Port ───────────────────────────────────────────────────

/// Abstracts progress reporting so services can emit events without
/// depending on the Presentation layer. Sync trait; no async needed.
pub trait ProgressReporter {
    /// Emit an in-progress step message.
    fn step(&self, message: &str);
    /// Emit a success message.
    fn success(&self, message: &str);
    /// Emit a warning message.
    fn warn(&self, message: &str);
    /// Emit plain informational output (reports, listings).
    fn info(&self, message: &str);
}

// ── Local files ───────────────────────────────────────────────────────────────

/// Tool configuration persistence.
pub trait ConfigStore {
    /// Load the config, or defaults when none is saved.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    fn load(&self) -> Result<HangarConfig>;
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    fn save(&self, config: &HangarConfig) -> Result<()>;
    /// Where the config lives.
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined.
    fn path(&self) -> Result<PathBuf>;
}

/// The app configuration file next to the operator's project.
pub trait AppConfigFile {
    fn exists(&self, path: &Path) -> bool;
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    fn read(&self, path: &Path) -> Result<AppConfig>;
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    fn write(&self, path: &Path, config: &AppConfig) -> Result<()>;
}
