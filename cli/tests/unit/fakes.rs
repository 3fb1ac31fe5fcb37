//! In-memory platform fakes shared by the unit tests.
//!
//! [`FakePlatform`] plays the control plane, the fleet API and every database
//! peer at once, so a whole migration can run against one piece of state and
//! tests can assert on what the platform looks like afterwards.

#![allow(clippy::expect_used, dead_code)]

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{Result, bail};
use chrono::{TimeDelta, Utc};
use hangar_api_types::{
    Allocation, App, AppCompact, AppConfig, AppLock, AppVmResources, AutoscaleConfig, CheckStatus,
    CreateReleaseRequest, CreateVolumeRequest, DbRole, DbSetting, ForkVolumeRequest, ImageDetails,
    LaunchSpec, Lease, Machine, MachineConfig, PlatformVersion, ProcessGroupSize, Release,
    ReplicationStat, ServiceConfig, VmSize, Volume,
};
use hangar_cli::application::ports::{
    AppConfigFile, ControlPlane, DbPeer, FleetApi, ProgressReporter, Prompter,
};
use hangar_cli::domain::{GroupCounts, LockError, TimedOut};

// ── Fixtures ──────────────────────────────────────────────────────────────────

pub const APP: &str = "web";

pub fn alloc(id: &str, group: &str, region: &str) -> Allocation {
    Allocation {
        id: id.to_string(),
        task_name: group.to_string(),
        region: region.to_string(),
        version: 3,
        status: "running".into(),
        healthy: true,
        attached_volumes: vec![],
        private_ip: None,
    }
}

pub fn app_config() -> AppConfig {
    AppConfig {
        app_name: APP.into(),
        services: vec![ServiceConfig {
            internal_port: 8080,
            protocol: "tcp".into(),
            ..ServiceConfig::default()
        }],
        ..AppConfig::default()
    }
}

pub fn volume(id: &str, name: &str, alloc_id: &str) -> Volume {
    Volume {
        id: id.to_string(),
        name: name.to_string(),
        region: "ord".into(),
        size_gb: 10,
        state: "ready".into(),
        attached_alloc_id: Some(alloc_id.to_string()),
        attached_machine_id: None,
        machines_only: false,
    }
}

fn db_uid(addr: &str) -> String {
    addr.replace([':', '.'], "")
}

// ── Platform state ────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct PlatformState {
    pub app: AppCompact,
    pub image: ImageDetails,
    pub coordination_url: Option<String>,
    pub config: AppConfig,
    pub autoscale: Option<AutoscaleConfig>,
    pub allocations: Vec<Allocation>,
    /// Allocations stopped by a scale-down, restorable by raising the count.
    pub parked: Vec<Allocation>,
    pub lock: Option<AppLock>,
    pub releases: Vec<Release>,
    pub machines: Vec<Machine>,
    /// Held lease nonce per machine id.
    pub leases: BTreeMap<String, String>,
    pub lease_releases: usize,
    pub volumes: Vec<Volume>,
    pub secrets: BTreeMap<String, String>,
    pub db_leader: Option<String>,
    pub db_readonly: bool,
    /// Every call, by port method name, in order.
    pub calls: Vec<&'static str>,
    /// Methods that fail when called.
    pub fail: BTreeSet<&'static str>,
    /// Scale-downs are accepted but allocations keep running.
    pub scale_down_stalls: bool,
    /// Every machine reports a critical health check.
    pub checks_failing: bool,
    next_id: u32,
}

impl PlatformState {
    fn next_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    pub fn live_machines(&self) -> Vec<&Machine> {
        self.machines.iter().filter(|m| !m.is_destroyed()).collect()
    }

    /// Position of the first call to `method`.
    pub fn first_call(&self, method: &str) -> Option<usize> {
        self.calls.iter().position(|c| *c == method)
    }

    pub fn called(&self, method: &str) -> bool {
        self.first_call(method).is_some()
    }

    fn check_lock(&self, lock_id: Option<&str>) -> Result<()> {
        match &self.lock {
            Some(lock) if lock_id != Some(lock.lock_id.as_str()) => bail!("app {APP} is locked"),
            _ => Ok(()),
        }
    }
}

pub struct FakePlatform {
    state: Mutex<PlatformState>,
}

impl FakePlatform {
    /// A legacy app running the given allocations.
    pub fn legacy(allocations: Vec<Allocation>) -> Self {
        Self {
            state: Mutex::new(PlatformState {
                app: AppCompact {
                    id: "app-1".into(),
                    name: APP.into(),
                    organization: "acme".into(),
                    platform_version: PlatformVersion::Legacy,
                    status: "running".into(),
                    database: false,
                },
                image: ImageDetails {
                    registry: "registry.example".into(),
                    repository: "acme/web".into(),
                    tag: Some("v3".into()),
                    digest: None,
                },
                coordination_url: None,
                config: app_config(),
                autoscale: None,
                allocations,
                parked: vec![],
                lock: None,
                releases: vec![],
                machines: vec![],
                leases: BTreeMap::new(),
                lease_releases: 0,
                volumes: vec![],
                secrets: BTreeMap::new(),
                db_leader: None,
                db_readonly: false,
                calls: vec![],
                fail: BTreeSet::new(),
                scale_down_stalls: false,
                checks_failing: false,
                next_id: 0,
            }),
        }
    }

    /// Mutate the state before a test runs.
    pub fn with(self, f: impl FnOnce(&mut PlatformState)) -> Self {
        f(&mut self.state());
        self
    }

    pub fn state(&self) -> MutexGuard<'_, PlatformState> {
        self.state.lock().expect("platform state lock")
    }

    /// A copy of the current state.
    pub fn snapshot(&self) -> PlatformState {
        self.state().clone()
    }

    /// Add a running machine directly, as an earlier migration would have.
    pub fn add_machine(&self, group: &str, previous_alloc: Option<&str>) -> String {
        let mut s = self.state();
        let n = s.next_id();
        let mut metadata = BTreeMap::from([(
            hangar_api_types::META_PROCESS_GROUP.to_string(),
            group.to_string(),
        )]);
        if let Some(alloc) = previous_alloc {
            metadata.insert(hangar_api_types::META_PREVIOUS_ALLOC.to_string(), alloc.to_string());
        }
        let id = format!("m{n}");
        s.machines.push(Machine {
            id: id.clone(),
            name: String::new(),
            region: "ord".into(),
            state: "started".into(),
            config: MachineConfig {
                image: "registry.example/acme/web:v3".into(),
                metadata,
                ..MachineConfig::default()
            },
            private_ip: Some(format!("fdaa::{n}")),
            lease_nonce: None,
        });
        id
    }

    // Journal the call and apply any injected failure.
    fn call(&self, method: &'static str) -> Result<MutexGuard<'_, PlatformState>> {
        let mut s = self.state();
        s.calls.push(method);
        if s.fail.contains(method) {
            bail!("injected failure in {method}");
        }
        Ok(s)
    }
}

// ── Control plane ─────────────────────────────────────────────────────────────

impl ControlPlane for FakePlatform {
    async fn get_app_compact(&self, app: &str) -> Result<AppCompact> {
        let s = self.call("get_app_compact")?;
        if s.app.name != app {
            bail!("app {app} not found");
        }
        Ok(s.app.clone())
    }

    async fn get_app(&self, _app: &str) -> Result<App> {
        let s = self.call("get_app")?;
        Ok(App {
            id: s.app.id.clone(),
            name: s.app.name.clone(),
            organization: s.app.organization.clone(),
            platform_version: s.app.platform_version,
            status: s.app.status.clone(),
            image: s.image.clone(),
            coordination_url: s.coordination_url.clone(),
        })
    }

    async fn get_app_config(&self, _app: &str) -> Result<AppConfig> {
        Ok(self.call("get_app_config")?.config.clone())
    }

    async fn set_platform_version(
        &self,
        _app: &str,
        version: PlatformVersion,
        lock_id: Option<&str>,
    ) -> Result<()> {
        let mut s = self.call("set_platform_version")?;
        s.check_lock(lock_id)?;
        s.app.platform_version = version;
        Ok(())
    }

    async fn lock_app(&self, app: &str) -> Result<AppLock> {
        let mut s = self.call("lock_app")?;
        if let Some(held) = &s.lock {
            return Err(LockError::AlreadyLocked {
                app: app.to_string(),
                expires_at: Some(held.expiration.to_rfc3339()),
            }
            .into());
        }
        let lock = AppLock {
            lock_id: format!("lock-{}", s.next_id()),
            expiration: Utc::now() + TimeDelta::hours(1),
        };
        s.lock = Some(lock.clone());
        Ok(lock)
    }

    async fn unlock_app(&self, _app: &str, lock_id: &str) -> Result<()> {
        let mut s = self.call("unlock_app")?;
        let current = s.lock.as_ref().map(|l| l.lock_id.clone());
        match current.as_deref() {
            Some(id) if id == lock_id => {
                s.lock = None;
                Ok(())
            }
            Some(_) => bail!("lock {lock_id} is not the current lock"),
            None => bail!("app is not locked"),
        }
    }

    async fn current_lock(&self, _app: &str) -> Result<Option<AppLock>> {
        Ok(self.call("current_lock")?.lock.clone())
    }

    async fn create_release(&self, _app: &str, request: &CreateReleaseRequest) -> Result<Release> {
        let mut s = self.call("create_release")?;
        assert_eq!(request.platform_version, PlatformVersion::Target);
        let version = s.releases.len() as u64 + 1;
        let release = Release {
            id: format!("rel-{version}"),
            version,
        };
        s.releases.push(release.clone());
        Ok(release)
    }

    async fn get_autoscale(&self, _app: &str) -> Result<Option<AutoscaleConfig>> {
        Ok(self.call("get_autoscale")?.autoscale.clone())
    }

    async fn set_autoscale(&self, _app: &str, config: &AutoscaleConfig) -> Result<()> {
        self.call("set_autoscale")?.autoscale = Some(config.clone());
        Ok(())
    }

    async fn list_allocations(&self, _app: &str) -> Result<Vec<Allocation>> {
        Ok(self.call("list_allocations")?.allocations.clone())
    }

    async fn set_group_counts(
        &self,
        _app: &str,
        counts: &GroupCounts,
        lock_id: Option<&str>,
    ) -> Result<()> {
        let mut s = self.call("set_group_counts")?;
        s.check_lock(lock_id)?;
        if s.scale_down_stalls {
            return Ok(());
        }
        for (group, &count) in counts {
            let want = count as usize;
            let running = s.allocations.iter().filter(|a| &a.task_name == group).count();
            if running > want {
                let mut excess = running - want;
                let mut kept = Vec::new();
                for a in std::mem::take(&mut s.allocations) {
                    if &a.task_name == group && excess > 0 {
                        excess -= 1;
                        s.parked.push(a);
                    } else {
                        kept.push(a);
                    }
                }
                s.allocations = kept;
            } else {
                for _ in running..want {
                    let Some(i) = s.parked.iter().position(|a| &a.task_name == group) else {
                        break;
                    };
                    let a = s.parked.remove(i);
                    s.allocations.push(a);
                }
            }
        }
        Ok(())
    }

    async fn vm_resources(&self, _app: &str) -> Result<AppVmResources> {
        let s = self.call("vm_resources")?;
        let size = VmSize {
            name: "micro-1x".into(),
            cpu_cores: 1.0,
            memory_mb: 256,
        };
        let groups = if s.config.processes.is_empty() {
            vec![]
        } else {
            s.config
                .process_names()
                .into_iter()
                .map(|name| ProcessGroupSize {
                    name,
                    vm_size: size.clone(),
                })
                .collect()
        };
        Ok(AppVmResources {
            default_size: size,
            groups,
        })
    }

    async fn list_volumes(&self, _app: &str) -> Result<Vec<Volume>> {
        Ok(self.call("list_volumes")?.volumes.clone())
    }

    async fn get_volume(&self, _app: &str, volume_id: &str) -> Result<Volume> {
        let s = self.call("get_volume")?;
        match s.volumes.iter().find(|v| v.id == volume_id) {
            Some(v) => Ok(v.clone()),
            None => bail!("volume {volume_id} not found"),
        }
    }

    async fn fork_volume(&self, _app: &str, request: &ForkVolumeRequest) -> Result<Volume> {
        let mut s = self.call("fork_volume")?;
        s.check_lock(request.lock_id.as_deref())?;
        let n = s.next_id();
        let source_size = s
            .volumes
            .iter()
            .find(|v| v.id == request.source_volume_id)
            .map_or(1, |v| v.size_gb);
        let fork = Volume {
            id: format!("vol-fork-{n}"),
            name: request.name.clone(),
            region: request.region.clone(),
            size_gb: source_size,
            state: "created".into(),
            attached_alloc_id: None,
            attached_machine_id: None,
            machines_only: request.machines_only,
        };
        s.volumes.push(fork.clone());
        Ok(fork)
    }

    async fn create_volume(&self, _app: &str, request: &CreateVolumeRequest) -> Result<Volume> {
        let mut s = self.call("create_volume")?;
        let n = s.next_id();
        let created = Volume {
            id: format!("vol-new-{n}"),
            name: request.name.clone(),
            region: request.region.clone(),
            size_gb: request.size_gb,
            state: "created".into(),
            attached_alloc_id: None,
            attached_machine_id: None,
            machines_only: request.machines_only,
        };
        s.volumes.push(created.clone());
        Ok(created)
    }

    async fn delete_volume(&self, _app: &str, volume_id: &str, lock_id: Option<&str>) -> Result<()> {
        let mut s = self.call("delete_volume")?;
        s.check_lock(lock_id)?;
        s.volumes.retain(|v| v.id != volume_id);
        Ok(())
    }

    async fn list_secrets(&self, _app: &str) -> Result<Vec<String>> {
        Ok(self.call("list_secrets")?.secrets.keys().cloned().collect())
    }

    async fn set_secrets(&self, _app: &str, secrets: &BTreeMap<String, String>) -> Result<()> {
        let mut s = self.call("set_secrets")?;
        s.secrets
            .extend(secrets.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(())
    }

    async fn resume_app(&self, _app: &str) -> Result<()> {
        let mut s = self.call("resume_app")?;
        if !s.app.is_suspended() {
            bail!("app is not suspended");
        }
        s.app.status = "running".into();
        Ok(())
    }
}

// ── Fleet ─────────────────────────────────────────────────────────────────────

impl FleetApi for FakePlatform {
    async fn list_machines(&self, _app: &str) -> Result<Vec<Machine>> {
        Ok(self.call("list_machines")?.machines.clone())
    }

    async fn launch(&self, _app: &str, spec: &LaunchSpec) -> Result<Machine> {
        let mut s = self.call("launch")?;
        let n = s.next_id();
        let machine = Machine {
            id: format!("m{n}"),
            name: String::new(),
            region: spec.region.clone(),
            state: spec.expected_state().to_string(),
            config: spec.config.clone(),
            private_ip: Some(format!("fdaa::{n}")),
            lease_nonce: None,
        };
        s.machines.push(machine.clone());
        Ok(machine)
    }

    async fn update(
        &self,
        _app: &str,
        machine_id: &str,
        config: &MachineConfig,
        nonce: Option<&str>,
    ) -> Result<Machine> {
        let mut s = self.call("update")?;
        if let Some(held) = s.leases.get(machine_id) {
            if nonce != Some(held.as_str()) {
                bail!("machine {machine_id} is leased by someone else");
            }
        }
        let Some(machine) = s.machines.iter_mut().find(|m| m.id == machine_id) else {
            bail!("machine {machine_id} not found");
        };
        machine.config = config.clone();
        Ok(machine.clone())
    }

    async fn destroy(&self, _app: &str, machine_id: &str) -> Result<()> {
        let mut s = self.call("destroy")?;
        s.leases.remove(machine_id);
        if let Some(machine) = s.machines.iter_mut().find(|m| m.id == machine_id) {
            machine.state = "destroyed".into();
        }
        Ok(())
    }

    async fn wait_for_state(
        &self,
        _app: &str,
        machine_id: &str,
        state: &str,
        timeout: Duration,
    ) -> Result<()> {
        let mut s = self.state();
        s.calls.push("wait_for_state");
        if s.fail.contains("wait_for_state") {
            return Err(TimedOut {
                what: format!("machine {machine_id} to be {state}"),
                after: timeout,
            }
            .into());
        }
        let Some(machine) = s.machines.iter_mut().find(|m| m.id == machine_id) else {
            bail!("machine {machine_id} not found");
        };
        machine.state = state.to_string();
        Ok(())
    }

    async fn check_statuses(&self, _app: &str, machine_id: &str) -> Result<Vec<CheckStatus>> {
        let s = self.call("check_statuses")?;
        if !s.machines.iter().any(|m| m.id == machine_id) {
            bail!("machine {machine_id} not found");
        }
        let status = if s.checks_failing { "critical" } else { "passing" };
        Ok(vec![CheckStatus {
            name: "http".into(),
            status: status.into(),
            output: String::new(),
        }])
    }

    async fn acquire_lease(&self, _app: &str, machine_id: &str, ttl: Duration) -> Result<Lease> {
        let mut s = self.call("acquire_lease")?;
        if s.leases.contains_key(machine_id) {
            bail!("machine {machine_id} already has a lease");
        }
        let nonce = format!("nonce-{machine_id}-{}", s.next_id());
        s.leases.insert(machine_id.to_string(), nonce.clone());
        Ok(Lease {
            nonce,
            expires_at: Utc::now() + TimeDelta::from_std(ttl).expect("ttl fits"),
            owner: "hangar".into(),
        })
    }

    async fn refresh_lease(
        &self,
        _app: &str,
        machine_id: &str,
        nonce: &str,
        ttl: Duration,
    ) -> Result<Lease> {
        let mut s = self.call("refresh_lease")?;
        if s.leases.get(machine_id).map(String::as_str) != Some(nonce) {
            bail!("lease on {machine_id} is not held");
        }
        let fresh = format!("nonce-{machine_id}-{}", s.next_id());
        s.leases.insert(machine_id.to_string(), fresh.clone());
        Ok(Lease {
            nonce: fresh,
            expires_at: Utc::now() + TimeDelta::from_std(ttl).expect("ttl fits"),
            owner: "hangar".into(),
        })
    }

    async fn release_lease(&self, _app: &str, machine_id: &str, nonce: &str) -> Result<()> {
        let mut s = self.call("release_lease")?;
        if s.leases.get(machine_id).map(String::as_str) != Some(nonce) {
            bail!("lease on {machine_id} is not held");
        }
        s.leases.remove(machine_id);
        s.lease_releases += 1;
        Ok(())
    }
}

// ── Database peers ────────────────────────────────────────────────────────────

impl DbPeer for FakePlatform {
    async fn role(&self, addr: &str) -> Result<DbRole> {
        let s = self.call("role")?;
        Ok(if s.db_leader.as_deref() == Some(addr) {
            DbRole::Leader
        } else {
            DbRole::Replica
        })
    }

    async fn enable_readonly(&self, addr: &str) -> Result<()> {
        let mut s = self.call("enable_readonly")?;
        anyhow::ensure!(s.db_leader.as_deref() == Some(addr), "{addr} is not the leader");
        s.db_readonly = true;
        Ok(())
    }

    async fn disable_readonly(&self, addr: &str) -> Result<()> {
        let mut s = self.call("disable_readonly")?;
        anyhow::ensure!(s.db_leader.as_deref() == Some(addr), "{addr} is not the leader");
        s.db_readonly = false;
        Ok(())
    }

    async fn restart_router(&self, _addr: &str) -> Result<()> {
        self.call("restart_router")?;
        Ok(())
    }

    // Leadership moves to the first live machine.
    async fn failover(&self, _addr: &str) -> Result<()> {
        let mut s = self.call("failover")?;
        let next = s
            .live_machines()
            .first()
            .and_then(|m| m.private_ip.clone());
        s.db_leader = next;
        Ok(())
    }

    async fn replication_stats(&self, _addr: &str) -> Result<Vec<ReplicationStat>> {
        let s = self.call("replication_stats")?;
        Ok(s.live_machines()
            .iter()
            .filter_map(|m| m.private_ip.as_deref())
            .map(|ip| ReplicationStat {
                name: format!("keeper_{}", db_uid(ip)),
                diff: 0,
            })
            .collect())
    }

    async fn settings(&self, _addr: &str, names: &[&str]) -> Result<Vec<DbSetting>> {
        self.call("settings")?;
        Ok(names
            .iter()
            .map(|n| DbSetting {
                name: (*n).to_string(),
                setting: "10".into(),
            })
            .collect())
    }

    async fn db_uid(&self, addr: &str) -> Result<String> {
        self.call("db_uid")?;
        Ok(db_uid(addr))
    }
}

// ── Operator and output ───────────────────────────────────────────────────────

/// Answers prompts from a script. Exhausted scripts fall back to defaults;
/// an exhausted select picks the last item (exit).
#[derive(Default)]
pub struct ScriptedPrompter {
    interactive: bool,
    confirms: Mutex<VecDeque<bool>>,
    selects: Mutex<VecDeque<usize>>,
    pub asked: Mutex<Vec<String>>,
}

impl ScriptedPrompter {
    pub fn non_interactive() -> Self {
        Self::default()
    }

    pub fn interactive(confirms: &[bool], selects: &[usize]) -> Self {
        Self {
            interactive: true,
            confirms: Mutex::new(confirms.iter().copied().collect()),
            selects: Mutex::new(selects.iter().copied().collect()),
            asked: Mutex::new(vec![]),
        }
    }

    pub fn questions(&self) -> Vec<String> {
        self.asked.lock().expect("prompt log").clone()
    }
}

impl Prompter for ScriptedPrompter {
    fn is_interactive(&self) -> bool {
        self.interactive
    }

    fn confirm(&self, prompt: &str, default: bool) -> Result<bool> {
        if !self.interactive {
            return Ok(default);
        }
        self.asked.lock().expect("prompt log").push(prompt.to_string());
        Ok(self
            .confirms
            .lock()
            .expect("confirm script")
            .pop_front()
            .unwrap_or(default))
    }

    fn select(&self, prompt: &str, items: &[&str], default: usize) -> Result<usize> {
        if !self.interactive {
            return Ok(default);
        }
        self.asked.lock().expect("prompt log").push(prompt.to_string());
        Ok(self
            .selects
            .lock()
            .expect("select script")
            .pop_front()
            .unwrap_or(items.len().saturating_sub(1)))
    }
}

/// Collects every reported line, prefixed by its kind.
#[derive(Default)]
pub struct RecordingReporter {
    lines: Mutex<Vec<String>>,
}

impl RecordingReporter {
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().expect("reporter log").clone()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines().iter().any(|l| l.contains(needle))
    }

    fn push(&self, kind: &str, message: &str) {
        self.lines
            .lock()
            .expect("reporter log")
            .push(format!("{kind}: {message}"));
    }
}

impl ProgressReporter for RecordingReporter {
    fn step(&self, message: &str) {
        self.push("step", message);
    }
    fn success(&self, message: &str) {
        self.push("ok", message);
    }
    fn warn(&self, message: &str) {
        self.push("warn", message);
    }
    fn info(&self, message: &str) {
        self.push("info", message);
    }
}

/// Keeps written app configs in memory.
#[derive(Default)]
pub struct MemoryWriter {
    pub existing: BTreeSet<PathBuf>,
    /// Files available to `read`.
    pub files: BTreeMap<PathBuf, AppConfig>,
    pub fail: bool,
    pub written: Mutex<Vec<(PathBuf, AppConfig)>>,
}

impl AppConfigFile for MemoryWriter {
    fn exists(&self, path: &Path) -> bool {
        self.existing.contains(path) || self.files.contains_key(path)
    }

    fn read(&self, path: &Path) -> Result<AppConfig> {
        match self.files.get(path) {
            Some(config) => Ok(config.clone()),
            None => bail!("cannot read {}", path.display()),
        }
    }

    fn write(&self, path: &Path, config: &AppConfig) -> Result<()> {
        if self.fail {
            bail!("permission denied");
        }
        self.written
            .lock()
            .expect("writer log")
            .push((path.to_path_buf(), config.clone()));
        Ok(())
    }
}
