//! Human-readable terminal renderer.

use std::collections::BTreeMap;
use std::path::Path;

use hangar_api_types::Machine;
use owo_colors::OwoColorize as _;

use crate::domain::HangarConfig;
use crate::domain::plan::PlanSummary;
use crate::output::OutputContext;

/// Renders domain types as human-readable terminal output using `OutputContext`.
pub struct HumanRenderer<'a> {
    ctx: &'a OutputContext,
}

impl<'a> HumanRenderer<'a> {
    /// Create a new `HumanRenderer` wrapping the given output context.
    #[must_use]
    pub fn new(ctx: &'a OutputContext) -> Self {
        Self { ctx }
    }

    /// Render the CLI version information.
    pub fn render_version(&self, version: &str) {
        if self.ctx.quiet {
            return;
        }
        self.ctx.info(&format!("hangar v{version}"));
    }

    /// Render the migration plan shown before confirmation.
    pub fn render_plan(&self, plan: &PlanSummary) {
        if self.ctx.quiet {
            return;
        }
        println!();
        self.ctx.header("This migration process will do the following, in order:");
        for line in plan.lines() {
            if let Some(note) = line.strip_prefix("NOTE: ") {
                println!("     {}", note.style(self.ctx.styles.warning));
            } else {
                println!("   * {line}");
            }
        }
        println!();
    }

    /// Render the machines a migration created.
    pub fn render_machines(&self, machines: &[Machine]) {
        if self.ctx.quiet || machines.is_empty() {
            return;
        }
        println!();
        println!(
            "  {:<16} {:<12} {:<8} {}",
            "ID".style(self.ctx.styles.bold),
            "GROUP".style(self.ctx.styles.bold),
            "REGION".style(self.ctx.styles.bold),
            "STATE".style(self.ctx.styles.bold)
        );
        for m in machines {
            println!(
                "  {:<16} {:<12} {:<8} {}",
                m.id,
                m.process_group().unwrap_or("-"),
                m.region,
                m.state
            );
        }
        println!();
    }

    /// Render legacy volumes superseded by forks.
    pub fn render_replaced_volumes(&self, app: &str, replaced: &BTreeMap<String, Vec<String>>) {
        if self.ctx.quiet || replaced.is_empty() {
            return;
        }
        println!("  The following legacy volumes are no longer used by {app} and can be removed:");
        for (name, ids) in replaced {
            println!("    {}: {}", name.style(self.ctx.styles.bold), ids.join(", "));
        }
        println!();
    }

    /// Render the current hangar configuration.
    pub fn render_config(&self, config: &HangarConfig, path: &Path) {
        println!();
        println!(
            "  {}",
            format!("Configuration ({})", path.display()).style(self.ctx.styles.header)
        );
        println!();
        println!("  {:<36} {}", "api.control_plane_url:", config.api.control_plane_url);
        println!("  {:<36} {}", "api.fleet_url:", config.api.fleet_url);
        println!("  {:<36} {}", "api.db_port:", config.api.db_port);
        let token = if config.api.token.is_some() { "(set)" } else { "(not set)" };
        println!("  {:<36} {token}", "api.token:");
        let m = &config.migration;
        println!("  {:<36} {}", "migration.wait_timeout_secs:", m.wait_timeout_secs);
        println!("  {:<36} {}", "migration.scale_down_timeout_secs:", m.scale_down_timeout_secs);
        println!("  {:<36} {}", "migration.lease_ttl_secs:", m.lease_ttl_secs);
        println!("  {:<36} {}", "migration.db_poll_secs:", m.db_poll_secs);
        println!("  {:<36} {}", "migration.db_timeout_secs:", m.db_timeout_secs);
        println!();
        println!("  {}", "Environment:".style(self.ctx.styles.bold));
        for var in ["HANGAR_CONFIG", "HANGAR_LOG", "HANGAR_YES", "NO_COLOR"] {
            println!(
                "    {:<18} {}",
                format!("{var}:"),
                std::env::var(var).unwrap_or_else(|_| "(not set)".to_string())
            );
        }
        println!();
    }
}
