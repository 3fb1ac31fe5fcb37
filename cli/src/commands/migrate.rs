//! `hangar migrate-to-v2`: move an app from legacy allocations to machines.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use crate::app::{AppContext, Remotes};
use crate::application::ports::{ProgressReporter, Prompter};
use crate::application::services::migrator::{
    self, MigrateOptions, MigrationFailure, Migrator, Recovery,
};
use crate::application::services::troubleshooter::Entry;
use crate::commands::troubleshoot;
use crate::domain::error::TROUBLESHOOT_HINT;
use crate::infra::app_config::YamlAppConfigFile;
use crate::output::TerminalReporter;

/// Default file the migrated app config is written to.
const DEFAULT_CONFIG_PATH: &str = "hangar.yaml";

#[derive(Args)]
#[command(args_conflicts_with_subcommands = true, subcommand_negates_reqs = true)]
pub struct MigrateArgs {
    /// App to migrate
    #[arg(short, long, env = "HANGAR_APP", required = true)]
    pub app: Option<String>,

    /// Primary region for the new machines
    #[arg(long)]
    pub primary_region: Option<String>,

    /// Keep legacy autoscaling by creating standby machines
    #[arg(long)]
    pub adopt_autoscale: bool,

    /// Reuse existing volumes instead of forking: SOURCE_ID:DEST_ID
    #[arg(long, value_delimiter = ',')]
    pub existing_volumes: Vec<String>,

    /// Where to save the migrated app config
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Do not save the migrated app config
    #[arg(long)]
    pub no_save_config: bool,

    /// Remove legacy VMs once machines start, without waiting for health checks
    #[arg(long)]
    pub skip_health_checks: bool,

    /// Read the app config from --config instead of the latest release
    #[arg(long)]
    pub use_local_config: bool,

    #[command(subcommand)]
    pub command: Option<MigrateCommand>,
}

#[derive(Subcommand)]
pub enum MigrateCommand {
    /// Inspect and repair a partially migrated app
    Troubleshoot(troubleshoot::TroubleshootArgs),
    /// Troubleshoot an app even if it does not look half-migrated
    Debug(troubleshoot::TroubleshootArgs),
}

/// Run the migrate command.
///
/// # Errors
///
/// Returns the failed step (after rollback), or a preparation error.
pub async fn run(app: &AppContext, args: MigrateArgs) -> Result<ExitCode> {
    match args.command {
        Some(MigrateCommand::Troubleshoot(t)) => {
            return troubleshoot::run(app, &t.app, Entry::Troubleshoot).await;
        }
        Some(MigrateCommand::Debug(t)) => return troubleshoot::run(app, &t.app, Entry::Debug).await,
        None => {}
    }
    let name = args.app.context("--app is required")?;

    let cfg = app.config()?;
    let remotes = Remotes::connect(&cfg.api)?;
    let reporter = TerminalReporter::new(&app.output);
    let prompter = app.prompter();
    let config_file = YamlAppConfigFile;

    let opts = MigrateOptions {
        app: name.clone(),
        primary_region: args.primary_region,
        adopt_autoscale: args.adopt_autoscale,
        existing_volumes: args.existing_volumes,
        local_config: args.use_local_config.then(|| args.config.clone()),
        config_path: (!args.no_save_config).then_some(args.config),
        skip_health_checks: args.skip_health_checks,
    };

    reporter.step(&format!("inspecting {name}"));
    let plan = migrator::prepare(
        &remotes.control_plane,
        remotes.fleet.as_ref(),
        &remotes.db,
        &config_file,
        opts,
    )
    .await?;
    reporter.finish();

    app.renderer().render_plan(&plan.summary);
    if !prompter.confirm("Would you like to continue?", true)? {
        app.output.info("migration cancelled");
        return Ok(ExitCode::SUCCESS);
    }

    let migrator = Migrator {
        cp: &remotes.control_plane,
        fleet: Arc::clone(&remotes.fleet),
        db: &remotes.db,
        reporter: &reporter,
        tuning: &cfg.migration,
        cancel: app.cancel.clone(),
    };

    match migrator.run(&plan, &prompter).await {
        Ok(report) => {
            reporter.finish();
            tracing::info!(app = %name, release = report.release.version, "migration complete");
            app.renderer().render_machines(&report.machines);
            migrator::save_config(&plan, &config_file, &reporter);
            app.renderer()
                .render_replaced_volumes(&name, &report.replaced_volumes);
            app.output
                .success(&format!("app {name} is now running on the machines platform"));
            Ok(ExitCode::SUCCESS)
        }
        Err(failure) => handle_failure(app, &name, &reporter, failure).await,
    }
}

async fn handle_failure(
    app: &AppContext,
    name: &str,
    reporter: &TerminalReporter<'_>,
    failure: MigrationFailure,
) -> Result<ExitCode> {
    let MigrationFailure { error, recovery, .. } = failure;
    match recovery {
        Recovery::RolledBack => Err(error),
        Recovery::RollbackFailed(rollback) => {
            reporter.warn(&format!("rollback did not complete: {rollback:#}"));
            Err(error.context(format!("the app may be partially migrated; {TROUBLESHOOT_HINT}")))
        }
        Recovery::LeftForTroubleshooter => {
            app.output.error_chain(&error);
            reporter.warn("entering troubleshooting mode; the partial migration was kept");
            troubleshoot::run(app, name, Entry::Troubleshoot).await
        }
    }
}
