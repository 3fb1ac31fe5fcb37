//! Unit synthesizer: legacy allocations (plus autoscale policy) into machine
//! launch specs.
//!
//! Pure: the same inputs always produce the same specs, in allocation order
//! followed by any standby capacity.

use std::collections::BTreeMap;

use hangar_api_types::{
    Allocation, AppConfig, AutoscaleConfig, LaunchSpec, META_MIGRATED_VOLUME, META_PLATFORM_VERSION,
    META_PREVIOUS_ALLOC, META_PROCESS_GROUP, META_RELEASE_ID, META_RELEASE_VERSION, MachineConfig,
    MachineMount, MachineService, PlatformVersion, Release,
};

use crate::domain::error::ValidationError;
use crate::domain::guest::GuestMap;
use crate::domain::validate::PRIMARY_REGION_ENV;
use crate::domain::volumes::MigratedVolume;

/// Everything the synthesizer reads.
#[derive(Debug, Clone, Copy)]
pub struct SynthInput<'a> {
    pub config: &'a AppConfig,
    pub allocations: &'a [Allocation],
    pub guests: &'a GuestMap,
    pub image: &'a str,
    pub primary_region: &'a str,
    /// Absent during the dry run before any remote mutation.
    pub release: Option<&'a Release>,
    pub volumes: &'a [MigratedVolume],
    /// Adopted autoscale policy; `None` when autoscaling was off.
    pub autoscale: Option<&'a AutoscaleConfig>,
}

/// Produce one launch spec per allocation, plus standby specs up to the
/// autoscale maximum.
///
/// With autoscale adopted, `max(N, max_count)` specs are produced; the first
/// `min(N, min_count)` start and the rest are created stopped.
///
/// # Errors
///
/// Returns [`ValidationError::UnknownProcessGroup`] when an allocation's group
/// is not declared, and [`ValidationError::MissingGuest`] when no guest size
/// exists for a group that needs a machine.
pub fn prep_machines_to_create(input: &SynthInput<'_>) -> Result<Vec<LaunchSpec>, ValidationError> {
    let known = input.config.process_names();
    let mut specs = Vec::with_capacity(input.allocations.len());

    for alloc in input.allocations {
        if !known.contains(&alloc.task_name) {
            return Err(ValidationError::UnknownProcessGroup {
                unit: alloc.id_short().to_string(),
                group: alloc.task_name.clone(),
                known: input.config.format_process_names(),
            });
        }
        let volume = input.volumes.iter().find(|v| v.previous_alloc == alloc.id);
        let config = machine_config(input, &alloc.task_name, Some(alloc), volume)?;
        specs.push(LaunchSpec {
            region: alloc.region.clone(),
            config,
            skip_launch: false,
        });
    }

    let Some(policy) = input.autoscale else {
        return Ok(specs);
    };

    let standby_groups = standby_groups(input.allocations, &known);
    let target = usize::try_from(policy.max_count).unwrap_or(usize::MAX).max(specs.len());
    let mut extra = 0usize;
    while specs.len() < target {
        let group = &standby_groups[extra % standby_groups.len()];
        let config = machine_config(input, group, None, None)?;
        specs.push(LaunchSpec {
            region: input.primary_region.to_string(),
            config,
            skip_launch: false,
        });
        extra += 1;
    }

    let startable = input
        .allocations
        .len()
        .min(usize::try_from(policy.min_count).unwrap_or(usize::MAX));
    for spec in specs.iter_mut().skip(startable) {
        spec.skip_launch = true;
    }
    Ok(specs)
}

/// Groups standby machines are spread over: those of the legacy units, or the
/// first declared group when there are none.
fn standby_groups(allocations: &[Allocation], known: &[String]) -> Vec<String> {
    let mut groups: Vec<String> = allocations.iter().map(|a| a.task_name.clone()).collect();
    groups.sort();
    groups.dedup();
    if groups.is_empty() {
        groups.extend(known.first().cloned());
    }
    groups
}

/// Apply the adopted autoscale policy to every declared service so later
/// redeploys match what was created.
pub fn apply_autoscale_policy(cfg: &mut AppConfig, policy: &AutoscaleConfig) {
    for svc in &mut cfg.services {
        svc.min_machines_running = Some(policy.min_count);
        svc.auto_start_machines = Some(true);
        svc.auto_stop_machines = Some(true);
    }
}

fn machine_config(
    input: &SynthInput<'_>,
    group: &str,
    alloc: Option<&Allocation>,
    volume: Option<&MigratedVolume>,
) -> Result<MachineConfig, ValidationError> {
    let cfg = input.config;
    let guest = input
        .guests
        .get(group)
        .cloned()
        .ok_or_else(|| ValidationError::MissingGuest {
            group: group.to_string(),
        })?;

    let mut env = cfg.env.clone();
    env.entry(PRIMARY_REGION_ENV.to_string())
        .or_insert_with(|| input.primary_region.to_string());

    let mut metadata = BTreeMap::from([
        (META_PROCESS_GROUP.to_string(), group.to_string()),
        (
            META_PLATFORM_VERSION.to_string(),
            PlatformVersion::Target.to_string(),
        ),
    ]);
    if let Some(alloc) = alloc {
        metadata.insert(META_PREVIOUS_ALLOC.to_string(), alloc.id.clone());
    }
    if let Some(release) = input.release {
        metadata.insert(META_RELEASE_ID.to_string(), release.id.clone());
        metadata.insert(META_RELEASE_VERSION.to_string(), release.version.to_string());
    }

    let mounts = volume
        .map(|v| {
            if !v.preexisting {
                metadata.insert(META_MIGRATED_VOLUME.to_string(), v.volume.id.clone());
            }
            vec![MachineMount {
                volume: v.volume.id.clone(),
                path: v.mount_path.clone(),
                name: Some(v.volume.name.clone()),
            }]
        })
        .unwrap_or_default();

    let applies = |processes: &[String]| processes.is_empty() || processes.iter().any(|p| p == group);
    let services = cfg
        .services
        .iter()
        .filter(|s| applies(&s.processes))
        .map(|s| MachineService {
            internal_port: s.internal_port,
            protocol: s.protocol.clone(),
            ports: s.ports.iter().map(|p| p.port).collect(),
            min_machines_running: s.min_machines_running,
            autostart: s.auto_start_machines,
            autostop: s.auto_stop_machines,
        })
        .collect();

    let mut checks = cfg.checks.clone();
    for (i, svc) in cfg
        .services
        .iter()
        .filter(|s| applies(&s.processes))
        .enumerate()
    {
        for (j, check) in svc.checks.iter().enumerate() {
            let mut check = check.clone();
            check.port.get_or_insert(svc.internal_port);
            checks.insert(format!("servicecheck-{i:02}-{j:02}-{}", check.kind), check);
        }
    }

    let cmd = cfg
        .processes
        .get(group)
        .map(|c| c.split_whitespace().map(str::to_owned).collect())
        .unwrap_or_default();

    Ok(MachineConfig {
        image: input.image.to_string(),
        guest,
        env,
        mounts,
        metadata,
        services,
        checks,
        cmd,
    })
}
