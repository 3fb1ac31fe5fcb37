//! Migration preconditions.
//!
//! Pure functions only: every check here runs before the app lock is taken,
//! so a failure never leaves remote state behind.

use std::collections::BTreeMap;

use hangar_api_types::{
    Allocation, AppConfig, AutoscaleConfig, CheckConfig, ImageDetails, PlatformVersion,
};

use crate::domain::error::ValidationError;

/// Env key that pins the primary region in the app configuration.
pub const PRIMARY_REGION_ENV: &str = "PRIMARY_REGION";

/// The app must still be on the legacy platform.
///
/// # Errors
///
/// Returns [`ValidationError::AlreadyMigrated`] for `target` apps and
/// [`ValidationError::PartiallyMigrated`] for `detached` ones.
pub fn ensure_not_migrated(app: &str, platform: PlatformVersion) -> Result<(), ValidationError> {
    let app = app.to_string();
    match platform {
        PlatformVersion::Legacy => Ok(()),
        PlatformVersion::Target => Err(ValidationError::AlreadyMigrated { app }),
        PlatformVersion::Detached => Err(ValidationError::PartiallyMigrated { app }),
    }
}

/// A local config must describe the app being migrated.
///
/// # Errors
///
/// Returns [`ValidationError::LocalConfigMismatch`].
pub fn ensure_config_for_app(app: &str, cfg: &AppConfig) -> Result<(), ValidationError> {
    if cfg.app_name == app {
        return Ok(());
    }
    Err(ValidationError::LocalConfigMismatch {
        app: app.to_string(),
        found: cfg.app_name.clone(),
    })
}

/// Autoscaling must be off unless the caller explicitly adopts it.
///
/// # Errors
///
/// Returns [`ValidationError::AutoscaleEnabled`].
pub fn check_autoscale(
    app: &str,
    autoscale: Option<&AutoscaleConfig>,
    adopt: bool,
) -> Result<(), ValidationError> {
    match autoscale {
        Some(cfg) if cfg.enabled && !adopt => Err(ValidationError::AutoscaleEnabled {
            app: app.to_string(),
        }),
        _ => Ok(()),
    }
}

/// Resolve the image reference the machines will run.
///
/// # Errors
///
/// Returns [`ValidationError::NoImage`] when neither digest nor tag is set.
pub fn resolve_image(image: &ImageDetails) -> Result<String, ValidationError> {
    image.reference().ok_or(ValidationError::NoImage)
}

/// Structural checks of the declared configuration against the machines
/// platform schema.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidConfig`] naming the first problem.
pub fn validate_config(cfg: &AppConfig) -> Result<(), ValidationError> {
    let invalid = |reason: String| Err(ValidationError::InvalidConfig { reason });
    if cfg.app_name.trim().is_empty() {
        return invalid("app_name is empty".to_string());
    }
    let known = cfg.process_names();
    for (name, cmd) in &cfg.processes {
        if cmd.trim().is_empty() {
            return invalid(format!("process group '{name}' has an empty command"));
        }
    }
    for (i, svc) in cfg.services.iter().enumerate() {
        if svc.internal_port == 0 {
            return invalid(format!("service #{i} has no internal_port"));
        }
        if !matches!(svc.protocol.as_str(), "tcp" | "udp") {
            return invalid(format!("service #{i} has unsupported protocol '{}'", svc.protocol));
        }
        if let Some(p) = svc.processes.iter().find(|p| !known.contains(p)) {
            return invalid(format!("service #{i} references unknown process group '{p}'"));
        }
        for check in &svc.checks {
            validate_check(&format!("service #{i}"), check).or_else(invalid)?;
        }
    }
    for mount in &cfg.mounts {
        if mount.source.is_empty() || !mount.destination.starts_with('/') {
            return invalid(format!(
                "mount '{}' needs a source and an absolute destination",
                mount.source
            ));
        }
        if let Some(p) = mount.processes.iter().find(|p| !known.contains(p)) {
            return invalid(format!("mount '{}' references unknown process group '{p}'", mount.source));
        }
    }
    for (name, check) in &cfg.checks {
        validate_check(&format!("check '{name}'"), check).or_else(invalid)?;
    }
    Ok(())
}

fn validate_check(owner: &str, check: &CheckConfig) -> Result<(), String> {
    match check.kind.as_str() {
        "tcp" => Ok(()),
        "http" if check.path.as_deref().is_some_and(|p| p.starts_with('/')) => Ok(()),
        "http" => Err(format!("{owner} is an http check without an absolute path")),
        other => Err(format!("{owner} has unknown check type '{other}'")),
    }
}

/// Every allocation's group must be declared in the app configuration.
///
/// # Errors
///
/// Returns [`ValidationError::UnknownProcessGroup`] for the first offender.
pub fn check_process_groups(allocs: &[Allocation], cfg: &AppConfig) -> Result<(), ValidationError> {
    let known = cfg.process_names();
    match allocs.iter().find(|a| !known.contains(&a.task_name)) {
        Some(alloc) => Err(ValidationError::UnknownProcessGroup {
            unit: alloc.id_short().to_string(),
            group: alloc.task_name.clone(),
            known: cfg.format_process_names(),
        }),
        None => Ok(()),
    }
}

/// No allocation may carry more than one volume.
///
/// # Errors
///
/// Returns [`ValidationError::MultipleVolumes`].
pub fn check_attached_volumes(app: &str, allocs: &[Allocation]) -> Result<(), ValidationError> {
    match allocs.iter().find(|a| a.attached_volumes.len() > 1) {
        Some(alloc) => Err(ValidationError::MultipleVolumes {
            app: app.to_string(),
            unit: alloc.id_short().to_string(),
            count: alloc.attached_volumes.len(),
        }),
        None => Ok(()),
    }
}

/// No process group may be the target of more than one mount.
///
/// # Errors
///
/// Returns [`ValidationError::MultipleMounts`] naming each offending group.
pub fn check_mounts(app: &str, cfg: &AppConfig) -> Result<(), ValidationError> {
    let all = cfg.process_names();
    let mut per_process: BTreeMap<&str, usize> = BTreeMap::new();
    for mount in &cfg.mounts {
        let processes = if mount.processes.is_empty() {
            &all
        } else {
            &mount.processes
        };
        for p in processes {
            *per_process.entry(p.as_str()).or_default() += 1;
        }
    }
    let offenders: Vec<String> = per_process
        .into_iter()
        .filter(|(_, n)| *n > 1)
        .map(|(p, n)| format!("{p} ({n})"))
        .collect();
    match offenders.as_slice() {
        [] => Ok(()),
        [one] => Err(ValidationError::MultipleMounts {
            app: app.to_string(),
            processes: format!("process {one}"),
        }),
        many => Err(ValidationError::MultipleMounts {
            app: app.to_string(),
            processes: format!("processes {}", many.join(", ")),
        }),
    }
}

/// Pick the primary region: explicit option, then `PRIMARY_REGION` in the
/// config env, then the single region shared by all allocations.
///
/// # Errors
///
/// Returns [`ValidationError::NoPrimaryRegion`] when allocations span several
/// regions (or none) and nothing else decides.
pub fn determine_primary_region(
    explicit: Option<&str>,
    cfg: &AppConfig,
    allocs: &[Allocation],
) -> Result<String, ValidationError> {
    if let Some(region) = explicit.filter(|r| !r.is_empty()) {
        return Ok(region.to_string());
    }
    if let Some(region) = cfg.env.get(PRIMARY_REGION_ENV).filter(|r| !r.is_empty()) {
        return Ok(region.clone());
    }
    if !cfg.primary_region.is_empty() {
        return Ok(cfg.primary_region.clone());
    }
    let mut regions: Vec<&str> = allocs.iter().map(|a| a.region.as_str()).collect();
    regions.sort_unstable();
    regions.dedup();
    match regions.as_slice() {
        [one] => Ok((*one).to_string()),
        many => Err(ValidationError::NoPrimaryRegion {
            regions: if many.is_empty() {
                "no regions".to_string()
            } else {
                many.join(", ")
            },
        }),
    }
}
