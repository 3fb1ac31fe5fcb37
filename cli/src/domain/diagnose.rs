//! Troubleshooter decision logic: state classification, the autodiagnose
//! report, and the repair menu as a finite-state machine.
//!
//! Nothing here prompts or prints. The troubleshooter service feeds operator
//! choices into [`Menu`] and executes whatever [`Transition`] comes back.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use hangar_api_types::{Allocation, AppLock, Machine, PlatformVersion};

// ── Classification ────────────────────────────────────────────────────────────

/// What the troubleshooter should do, derived only from observable inventory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Diagnosis {
    /// Target platform with no legacy allocations left.
    Healthy,
    /// Legacy platform with allocations: nothing to repair.
    NotMigrated { legacy_units: usize },
    /// Legacy platform with zero allocations: inconsistent, needs a human.
    LegacyWithoutUnits,
    /// Target platform with leftover allocations: drain them.
    ResidualLegacy,
    /// Detached with nothing on either side: converge to target.
    DetachedEmpty,
    /// Detached with only machines: converge to target.
    DetachedTargetOnly,
    /// Detached with only allocations: converge back to legacy.
    DetachedLegacyOnly,
    /// Detached with both: operator decides.
    DetachedBoth,
}

#[must_use]
pub fn classify(platform: PlatformVersion, legacy_units: usize, target_units: usize) -> Diagnosis {
    match platform {
        PlatformVersion::Legacy if legacy_units == 0 => Diagnosis::LegacyWithoutUnits,
        PlatformVersion::Legacy => Diagnosis::NotMigrated { legacy_units },
        PlatformVersion::Target if legacy_units == 0 => Diagnosis::Healthy,
        PlatformVersion::Target => Diagnosis::ResidualLegacy,
        PlatformVersion::Detached => match (legacy_units, target_units) {
            (0, 0) => Diagnosis::DetachedEmpty,
            (0, _) => Diagnosis::DetachedTargetOnly,
            (_, 0) => Diagnosis::DetachedLegacyOnly,
            _ => Diagnosis::DetachedBoth,
        },
    }
}

/// Whether any machine records a legacy allocation it replaced.
#[must_use]
pub fn has_migration_provenance(machines: &[Machine]) -> bool {
    machines.iter().any(|m| m.previous_alloc().is_some())
}

/// Human description of an app lock relative to `now`.
#[must_use]
pub fn describe_lock(lock: &AppLock, now: DateTime<Utc>) -> String {
    let remaining = lock.expiration.signed_duration_since(now);
    if remaining.num_seconds() <= 0 {
        let ago = (-remaining).num_seconds();
        format!("lock {} expired {ago}s ago", lock.lock_id)
    } else {
        format!("lock {} expires in {}s", lock.lock_id, remaining.num_seconds())
    }
}

// ── Autodiagnose ──────────────────────────────────────────────────────────────

/// Heuristic report on a half-migrated app.
#[must_use]
pub fn autodiagnose(allocs: &[Allocation], machines: &[Machine]) -> String {
    let mut groups: BTreeMap<&str, bool> = BTreeMap::new();
    for alloc in allocs {
        groups.entry(alloc.task_name.as_str()).or_insert(false);
    }
    for machine in machines {
        if let Some(group) = machine.process_group() {
            groups.insert(group, true);
        }
    }
    let missing: Vec<&str> = groups
        .iter()
        .filter(|(_, has_machine)| !**has_machine)
        .map(|(group, _)| *group)
        .collect();

    let mut report = String::from("Process group issues:\n");
    if missing.is_empty() {
        report.push_str(" * none found\n");
    }
    for group in &missing {
        let _ = writeln!(report, " * '{group}' has no machines");
    }

    report.push_str("\nVM count issues:\n");
    let surplus = allocs.len().saturating_sub(machines.len());
    if surplus > 0 {
        let _ = writeln!(report, " * {surplus} more legacy VMs than machines");
    } else {
        report.push_str(" * none found\n");
    }

    report.push_str("\nTo fix this, you can try:\n");
    if !missing.is_empty() {
        report.push_str(
            " * redeploying machines to create missing process groups,\n   then removing existing legacy VMs and switching to target\n",
        );
    } else if surplus > 0 {
        report.push_str(
            " * removing existing legacy VMs and switching to target, then scaling the app as needed\n",
        );
    } else {
        report.push_str(" * removing legacy VMs and switching to target\n");
    }
    report
}

// ── Repair menu ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuOption {
    Autodiagnose,
    ListLegacy,
    ListTarget,
    Redeploy,
    DestroyLegacyKeepTarget,
    DestroyTargetKeepLegacy,
    Exit,
}

impl MenuOption {
    pub const ALL: [Self; 7] = [
        Self::Autodiagnose,
        Self::ListLegacy,
        Self::ListTarget,
        Self::Redeploy,
        Self::DestroyLegacyKeepTarget,
        Self::DestroyTargetKeepLegacy,
        Self::Exit,
    ];

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Autodiagnose => "Autodiagnose issues",
            Self::ListLegacy => "List legacy VMs",
            Self::ListTarget => "List machines",
            Self::Redeploy => "Redeploy machines (might help with missing process groups)",
            Self::DestroyLegacyKeepTarget => "Destroy remaining legacy VMs and use machines",
            Self::DestroyTargetKeepLegacy => "Destroy existing machines and use legacy VMs",
            Self::Exit => "Exit",
        }
    }

    /// Question asked before a destructive option runs.
    #[must_use]
    pub fn confirmation(self) -> Option<&'static str> {
        match self {
            Self::DestroyLegacyKeepTarget => {
                Some("Are you sure you want to remove existing legacy VMs and switch to machines?")
            }
            Self::DestroyTargetKeepLegacy => {
                Some("Are you sure you want to remove all machines and switch back to legacy VMs?")
            }
            _ => None,
        }
    }

    /// A completed destructive repair ends the session.
    #[must_use]
    pub fn ends_session(self) -> bool {
        self.confirmation().is_some() || self == Self::Exit
    }

    #[must_use]
    pub fn index(self) -> usize {
        Self::ALL.iter().position(|o| *o == self).unwrap_or(0)
    }

    #[must_use]
    pub fn from_index(i: usize) -> Option<Self> {
        Self::ALL.get(i).copied()
    }
}

/// What the caller must do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Run the option now.
    Perform(MenuOption),
    /// Ask the operator to confirm, then call [`Menu::confirm`].
    AwaitConfirmation(MenuOption),
    /// Show the menu again.
    Prompt,
    Exit,
}

/// Menu state: the last choice, which is also the default next time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Menu {
    last: MenuOption,
}

impl Default for Menu {
    fn default() -> Self {
        Self {
            last: MenuOption::Autodiagnose,
        }
    }
}

impl Menu {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn last(&self) -> MenuOption {
        self.last
    }

    pub fn choose(&mut self, option: MenuOption) -> Transition {
        self.last = option;
        match option {
            MenuOption::Exit => Transition::Exit,
            o if o.confirmation().is_some() => Transition::AwaitConfirmation(o),
            o => Transition::Perform(o),
        }
    }

    /// Resolve a pending confirmation. Declining returns to the menu.
    pub fn confirm(&mut self, option: MenuOption, confirmed: bool) -> Transition {
        if confirmed {
            Transition::Perform(option)
        } else {
            Transition::Prompt
        }
    }

    /// Where to go once an option has run.
    #[must_use]
    pub fn after(&self, performed: MenuOption) -> Transition {
        if performed.ends_session() {
            Transition::Exit
        } else {
            Transition::Prompt
        }
    }
}
