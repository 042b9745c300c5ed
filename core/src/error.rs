use std::fmt;

use plugin_api::PluginId;
use thiserror::Error;

/// Callback of a plugin that failed while building extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtensionPhase {
    Extension,
    OnExtension,
}

impl fmt::Display for ExtensionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtensionPhase::Extension => f.write_str("extension factory"),
            ExtensionPhase::OnExtension => f.write_str("onExtension callback"),
        }
    }
}

/// Errors aborting a run.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("plugin id '{0}' is registered more than once")]
    DuplicatePlugin(PluginId),

    #[error("plugin '{plugin}' depends on '{dependency}', which is not registered")]
    MissingDependency {
        plugin: PluginId,
        dependency: PluginId,
    },

    #[error("circular plugin dependency: {}", cycle_path(.cycle))]
    CircularDependency { cycle: Vec<PluginId> },

    #[error("setup of plugin '{plugin}' failed: {source}")]
    PluginSetup {
        plugin: PluginId,
        #[source]
        source: anyhow::Error,
    },

    #[error("{phase} of plugin '{plugin}' failed: {source}")]
    PluginExtension {
        plugin: PluginId,
        phase: ExtensionPhase,
        #[source]
        source: anyhow::Error,
    },

    #[error("{hook} hook failed: {source}")]
    Hook {
        hook: &'static str,
        #[source]
        source: anyhow::Error,
    },

    /// Error raised by the command runner or one of its decorators.
    #[error(transparent)]
    Command(anyhow::Error),
}

fn cycle_path(cycle: &[PluginId]) -> String {
    cycle
        .iter()
        .map(PluginId::as_str)
        .collect::<Vec<_>>()
        .join(" -> ")
}

impl CliError {
    /// The plugin an error originated from, if any.
    pub fn plugin(&self) -> Option<&PluginId> {
        match self {
            CliError::DuplicatePlugin(plugin)
            | CliError::MissingDependency { plugin, .. }
            | CliError::PluginSetup { plugin, .. }
            | CliError::PluginExtension { plugin, .. } => Some(plugin),
            CliError::CircularDependency { cycle } => cycle.first(),
            CliError::Hook { .. } | CliError::Command(_) => None,
        }
    }
}
