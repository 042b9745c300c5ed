use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use plugin_api::PluginId;
use serde::Deserialize;

/// Application configuration read from `config.toml`.
///
/// ```toml
/// [cli]
/// name = "tool"
/// version = "2.0.0"
///
/// [plugins]
/// disabled = ["gantry:timing"]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub cli: CliSection,
    #[serde(default)]
    pub plugins: PluginsSection,
}

/// Overrides for the application metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CliSection {
    pub name: Option<String>,
    pub version: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PluginsSection {
    /// Plugin ids removed before dependency resolution.
    #[serde(default)]
    pub disabled: Vec<String>,
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    /// Load the platform config file, falling back to defaults when absent.
    pub fn discover() -> Result<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    /// `config.toml` in the platform configuration directory.
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("org", "gantry", "gantry").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    pub fn disabled_plugins(&self) -> impl Iterator<Item = PluginId> + '_ {
        self.plugins.disabled.iter().map(|id| PluginId::from(id.as_str()))
    }
}
