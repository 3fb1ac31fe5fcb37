//! Infrastructure implementation of the `ConfigStore` port.

use anyhow::{Context, Result};
use std::path::PathBuf;

use crate::application::ports::ConfigStore;
use crate::domain::config::{EnvOverrides, HangarConfig};

/// Production implementation of `ConfigStore` that uses a YAML file on disk.
pub struct YamlConfigStore;

impl ConfigStore for YamlConfigStore {
    fn load(&self) -> Result<HangarConfig> {
        let path = self.path()?;
        if !path.exists() {
            return Ok(HangarConfig::default());
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        serde_yaml::from_str(&content).with_context(|| format!("cannot parse {}", path.display()))
    }

    fn save(&self, config: &HangarConfig) -> Result<()> {
        let path = self.path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("cannot create {}", parent.display()))?;
        }
        let content = serde_yaml::to_string(config).context("cannot serialize config")?;
        std::fs::write(&path, content)
            .with_context(|| format!("cannot write {}", path.display()))?;

        // May hold an API token.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))
                .with_context(|| format!("cannot set permissions on {}", path.display()))?;
        }
        Ok(())
    }

    fn path(&self) -> Result<PathBuf> {
        if let Ok(val) = std::env::var("HANGAR_CONFIG") {
            return Ok(PathBuf::from(val));
        }
        let home =
            dirs::home_dir().ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?;
        Ok(home.join(".hangar").join("config.yaml"))
    }
}

/// `HANGAR_*` environment overrides.
///
/// # Errors
///
/// Returns an error if a set variable does not parse (e.g. a non-numeric
/// `HANGAR_WAIT_TIMEOUT_SECS`).
pub fn env_overrides() -> Result<EnvOverrides> {
    envy::prefixed("HANGAR_")
        .from_env::<EnvOverrides>()
        .context("invalid HANGAR_* environment variable")
}

/// The config file with environment overrides layered on top.
///
/// # Errors
///
/// Returns an error if the file or the environment is invalid.
pub fn load_effective(store: &impl ConfigStore) -> Result<HangarConfig> {
    Ok(store.load()?.with_overrides(env_overrides()?))
}
