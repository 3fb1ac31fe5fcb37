//! Legacy VM size → machine guest mapping.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use hangar_api_types::{DEFAULT_PROCESS_GROUP, Guest, ProcessGroupSize, VmSize};
use regex::Regex;

use crate::domain::error::ValidationError;

/// Smallest memory allowance a machine accepts.
pub const MIN_MEMORY_MB: u32 = 256;

const MEMORY_PER_SHARED_CPU: u32 = 256;
const MEMORY_PER_PERFORMANCE_CPU: u32 = 2048;

/// Legacy dedicated sizes named by cores and memory (`cpu4mem4`).
static CPU_MEM_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"^cpu(\d+)mem\d+$").expect("valid regex")
});

/// Guest sizes keyed by process group.
pub type GuestMap = BTreeMap<String, Guest>;

/// Resolve a machine preset name (`shared-cpu-2x`, `performance-4x`).
#[must_use]
pub fn preset(name: &str) -> Option<Guest> {
    let (kind, rest, per_cpu) = if let Some(rest) = name.strip_prefix("shared-cpu-") {
        ("shared", rest, MEMORY_PER_SHARED_CPU)
    } else if let Some(rest) = name.strip_prefix("performance-") {
        ("performance", rest, MEMORY_PER_PERFORMANCE_CPU)
    } else {
        return None;
    };
    let cpus: u32 = rest.strip_suffix('x')?.parse().ok()?;
    let allowed: &[u32] = if kind == "shared" {
        &[1, 2, 4, 8]
    } else {
        &[1, 2, 4, 8, 16]
    };
    allowed.contains(&cpus).then(|| Guest {
        cpu_kind: kind.to_string(),
        cpus,
        memory_mb: cpus * per_cpu,
    })
}

/// Translate a legacy size name into the equivalent machine preset name.
#[must_use]
pub fn legacy_preset_name(legacy: &str) -> String {
    if let Some(caps) = CPU_MEM_RE.captures(legacy) {
        return format!("performance-{}x", &caps[1]);
    }
    legacy
        .replacen("micro", "shared-cpu", 1)
        .replacen("dedicated-cpu", "performance", 1)
}

/// Map one legacy VM size to a guest, never shrinking memory.
///
/// # Errors
///
/// Returns [`ValidationError::UnknownSize`] when no machine preset matches.
pub fn map_size(size: &VmSize) -> Result<Guest, ValidationError> {
    let name = legacy_preset_name(&size.name);
    let mut guest = preset(&name).ok_or_else(|| ValidationError::UnknownSize {
        preset: size.name.clone(),
    })?;
    guest.memory_mb = guest.memory_mb.max(size.memory_mb).max(MIN_MEMORY_MB);
    Ok(guest)
}

/// Build the per-group guest map. With no groups, the default size is used
/// for the implicit `app` group.
///
/// # Errors
///
/// Returns the first size that cannot be mapped.
pub fn determine_guests(
    default_size: &VmSize,
    groups: &[ProcessGroupSize],
) -> Result<GuestMap, ValidationError> {
    if groups.is_empty() {
        let guest = map_size(default_size)?;
        return Ok(GuestMap::from([(DEFAULT_PROCESS_GROUP.to_string(), guest)]));
    }
    groups
        .iter()
        .map(|g| Ok((g.name.clone(), map_size(&g.vm_size)?)))
        .collect()
}
