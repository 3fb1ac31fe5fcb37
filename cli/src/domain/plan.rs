//! Human-readable migration plan shown before the operator confirms.

use std::collections::BTreeMap;
use std::path::PathBuf;

use hangar_api_types::{LaunchSpec, META_PROCESS_GROUP};

/// Facts the plan is rendered from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanSummary {
    pub app: String,
    pub database: bool,
    pub legacy_units: usize,
    /// Legacy units are stopped before machines start.
    pub downtime: bool,
    pub forked_volumes: usize,
    /// Machines to start per process group.
    pub machines: BTreeMap<String, usize>,
    /// Stopped standby machines per process group.
    pub standby: BTreeMap<String, usize>,
    pub disables_autoscale: bool,
    /// Legacy VMs are only removed once the machines pass their checks.
    pub health_checks: bool,
    /// Where the migrated configuration is written, and whether that
    /// overwrites an existing file.
    pub config_path: Option<(PathBuf, bool)>,
}

impl PlanSummary {
    /// Tally launch specs into started and standby counts per group.
    pub fn count_specs(&mut self, specs: &[LaunchSpec]) {
        for spec in specs {
            let group = spec
                .config
                .metadata
                .get(META_PROCESS_GROUP)
                .cloned()
                .unwrap_or_default();
            let bucket = if spec.skip_launch {
                &mut self.standby
            } else {
                &mut self.machines
            };
            *bucket.entry(group).or_default() += 1;
        }
    }

    /// One line per planned action, in execution order.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        let mut lines = vec!["Lock the app, preventing changes during the migration".to_string()];
        if self.disables_autoscale {
            lines.push("Disable legacy autoscaling and carry its policy over to machines".to_string());
        }
        if self.database {
            lines.push("Set the database leader read-only and create volumes for new replicas".to_string());
        }
        if self.forked_volumes > 0 {
            lines.push(format!(
                "Create clones of {} volume{} for the new machines (old volumes are kept)",
                self.forked_volumes,
                plural(self.forked_volumes)
            ));
        }
        if self.downtime {
            lines.push(self.remove_legacy_line(""));
            lines.push(
                "NOTE: because the app uses volumes there will be a short downtime while machines start"
                    .to_string(),
            );
        }
        for (group, count) in &self.machines {
            lines.push(format!("Create {count} \"{group}\" machine{}", plural(*count)));
        }
        for (group, count) in &self.standby {
            lines.push(format!(
                "Create {count} stopped \"{group}\" standby machine{}",
                plural(*count)
            ));
        }
        if self.database {
            lines.push("Wait for at least one new in-region replica to be synced".to_string());
        }
        if !self.downtime {
            lines.push(self.remove_legacy_line(if self.health_checks {
                " after the new machines pass their health checks"
            } else {
                " once the new machines have started"
            }));
        }
        lines.push("Set the app platform version to \"target\"".to_string());
        lines.push("Unlock the app".to_string());
        if let Some((path, exists)) = &self.config_path {
            let verb = if *exists { "Overwrite" } else { "Save" };
            lines.push(format!("{verb} the app config file at '{}'", path.display()));
        }
        lines
    }

    fn remove_legacy_line(&self, suffix: &str) -> String {
        format!(
            "Remove {} legacy VM{}{suffix}",
            self.legacy_units,
            plural(self.legacy_units)
        )
    }
}

fn plural(n: usize) -> &'static str {
    if n == 1 { "" } else { "s" }
}
