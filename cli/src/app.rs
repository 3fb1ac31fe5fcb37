//! Application context: unified state passed to every command handler.
//!
//! `AppContext` carries the output context, the config store, the operator
//! interrupt token and the interactivity decision, so command handlers never
//! construct these themselves.

use std::sync::Arc;

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use crate::domain::HangarConfig;
use crate::domain::config::ApiConfig;
use crate::infra::config::{YamlConfigStore, load_effective};
use crate::infra::control_plane::HttpControlPlane;
use crate::infra::db_peer::HttpDbPeer;
use crate::infra::fleet::HttpFleet;
use crate::output::{DialoguerPrompter, HumanRenderer, OutputContext};

/// Output rendering flags.
pub struct OutputFlags {
    /// Disable ANSI color output.
    pub no_color: bool,
    /// Suppress non-error output.
    pub quiet: bool,
}

/// Behaviour flags.
pub struct BehaviourFlags {
    /// Skip interactive prompts (also set by `CI` / `HANGAR_YES` env vars).
    pub yes: bool,
}

/// Flags passed from the top-level CLI to `AppContext::new`.
pub struct AppFlags {
    /// Output rendering options.
    pub output: OutputFlags,
    /// Behaviour options.
    pub behaviour: BehaviourFlags,
}

/// Unified application context passed to every command handler.
pub struct AppContext {
    /// Terminal output context (colors, quiet mode).
    pub output: OutputContext,
    /// Tool configuration store.
    pub config_store: YamlConfigStore,
    /// Fired on Ctrl-C.
    pub cancel: CancellationToken,
    /// When `true`, skip interactive prompts and use defaults.
    ///
    /// Set when `--yes` / `-y` is passed, or when the `CI` or `HANGAR_YES`
    /// environment variables are present.
    pub non_interactive: bool,
}

/// The remote adapters a migration or troubleshooting session talks to.
pub struct Remotes {
    pub control_plane: HttpControlPlane,
    pub fleet: Arc<HttpFleet>,
    pub db: HttpDbPeer,
}

impl Remotes {
    /// # Errors
    ///
    /// Returns an error if an HTTP client cannot be built.
    pub fn connect(api: &ApiConfig) -> Result<Self> {
        Ok(Self {
            control_plane: HttpControlPlane::new(&api.control_plane_url, api.token.clone())?,
            fleet: Arc::new(HttpFleet::new(&api.fleet_url, api.token.clone())?),
            db: HttpDbPeer::new(api.db_port, api.token.clone())?,
        })
    }
}

impl AppContext {
    /// Construct an `AppContext` from top-level CLI flags.
    #[must_use]
    pub fn new(flags: &AppFlags, cancel: CancellationToken) -> Self {
        let ci_env = std::env::var("CI").is_ok() || std::env::var("HANGAR_YES").is_ok();
        let non_interactive = flags.behaviour.yes || ci_env;

        Self {
            output: OutputContext::new(flags.output.no_color, flags.output.quiet),
            config_store: YamlConfigStore,
            cancel,
            non_interactive,
        }
    }

    /// Effective configuration: the config file plus `HANGAR_*` overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file or an override is invalid.
    pub fn config(&self) -> Result<HangarConfig> {
        load_effective(&self.config_store)
    }

    #[must_use]
    pub fn renderer(&self) -> HumanRenderer<'_> {
        HumanRenderer::new(&self.output)
    }

    #[must_use]
    pub fn prompter(&self) -> DialoguerPrompter {
        DialoguerPrompter::new(self.non_interactive)
    }
}
