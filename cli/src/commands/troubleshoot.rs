//! `hangar migrate-to-v2 troubleshoot` and `debug`.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::Args;

use crate::app::{AppContext, Remotes};
use crate::application::services::troubleshooter::{Entry, Resolution, Troubleshooter};
use crate::output::TerminalReporter;

#[derive(Args)]
pub struct TroubleshootArgs {
    /// App to inspect
    #[arg(short, long, env = "HANGAR_APP")]
    pub app: String,
}

/// Run a troubleshooting session.
///
/// # Errors
///
/// Returns the troubleshooter's refusal (not migrated, locked, needs an
/// operator) or a failed repair.
pub async fn run(app: &AppContext, name: &str, entry: Entry) -> Result<ExitCode> {
    let cfg = app.config()?;
    let remotes = Remotes::connect(&cfg.api)?;
    let reporter = TerminalReporter::new(&app.output);
    let session = Troubleshooter {
        cp: &remotes.control_plane,
        fleet: Arc::clone(&remotes.fleet),
        reporter: &reporter,
        tuning: &cfg.migration,
        cancel: app.cancel.clone(),
    };

    let resolution = session.run(name, entry, &app.prompter()).await?;
    reporter.finish();
    match resolution {
        Resolution::NothingToDo => {}
        Resolution::Converged(version) => {
            tracing::info!(app = name, %version, "troubleshooter converged");
        }
        Resolution::Unresolved => {
            app.output
                .warn(&format!("{name} is still partially migrated; run troubleshoot again to repair it"));
            return Ok(ExitCode::from(2));
        }
    }
    Ok(ExitCode::SUCCESS)
}
