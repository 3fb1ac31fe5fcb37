//! Allocation snapshot rules.
//!
//! Pure functions only. The snapshot is taken once, before any remote
//! mutation, and is the source of truth for synthesis, scale-down and
//! rollback.

use std::collections::{BTreeMap, BTreeSet};

use hangar_api_types::{Allocation, Machine};

/// Desired count per process group.
pub type GroupCounts = BTreeMap<String, u32>;

/// Immutable view of the legacy units a migration works from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    /// Allocations still needing a machine, newest version first.
    pub allocations: Vec<Allocation>,
    /// Per-group counts of every current allocation, including those that
    /// already have a machine. Used to scale down and to restore on rollback.
    pub raw_counts: GroupCounts,
    /// Allocations skipped because a machine already replaced them.
    pub already_migrated: Vec<String>,
}

impl Snapshot {
    /// Build a snapshot from the raw allocation listing and any machines that
    /// already exist for the app.
    #[must_use]
    pub fn new(allocations: Vec<Allocation>, existing: &[Machine]) -> Self {
        let current = select_current(allocations);
        let raw_counts = count_groups(&current);

        let replaced: BTreeSet<&str> = existing.iter().filter_map(Machine::previous_alloc).collect();
        let mut already_migrated = Vec::new();
        let allocations = current
            .into_iter()
            .filter(|alloc| {
                if !replaced.contains(alloc.id.as_str()) {
                    return true;
                }
                already_migrated.push(alloc.id.clone());
                false
            })
            .collect();

        Self {
            allocations,
            raw_counts,
            already_migrated,
        }
    }

    /// Find a snapshot allocation by full or short id.
    #[must_use]
    pub fn find(&self, id: &str) -> Option<&Allocation> {
        self.allocations
            .iter()
            .find(|a| a.id == id || a.id_short() == id)
    }
}

/// Keep only running allocations of the highest running release version,
/// ordered newest first.
#[must_use]
pub fn select_current(mut allocations: Vec<Allocation>) -> Vec<Allocation> {
    allocations.sort_by(|a, b| b.version.cmp(&a.version));
    let Some(highest) = allocations
        .iter()
        .filter(|a| a.is_running())
        .map(|a| a.version)
        .max()
    else {
        return Vec::new();
    };
    allocations.retain(|a| a.is_running() && a.version == highest);
    allocations
}

/// Count allocations per process group.
#[must_use]
pub fn count_groups(allocations: &[Allocation]) -> GroupCounts {
    let mut counts = GroupCounts::new();
    for alloc in allocations {
        *counts.entry(alloc.task_name.clone()).or_default() += 1;
    }
    counts
}

/// Counts that drive every listed group to zero.
#[must_use]
pub fn zero_counts<'a>(groups: impl IntoIterator<Item = &'a String>) -> GroupCounts {
    groups.into_iter().map(|g| (g.clone(), 0)).collect()
}
