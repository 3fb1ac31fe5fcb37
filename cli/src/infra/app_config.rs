//! Reads and writes the app configuration file as YAML.

use std::path::Path;

use anyhow::{Context, Result};
use hangar_api_types::AppConfig;

use crate::application::ports::AppConfigFile;

pub struct YamlAppConfigFile;

impl AppConfigFile for YamlAppConfigFile {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn read(&self, path: &Path) -> Result<AppConfig> {
        let content =
            std::fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))?;
        serde_yaml::from_str(&content).with_context(|| format!("invalid app config in {}", path.display()))
    }

    fn write(&self, path: &Path, config: &AppConfig) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("cannot create {}", parent.display()))?;
        }
        let content = serde_yaml::to_string(config).context("cannot serialize app config")?;
        std::fs::write(path, content).with_context(|| format!("cannot write {}", path.display()))
    }
}
