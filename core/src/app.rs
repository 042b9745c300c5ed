use std::sync::Arc;

use plugin_api::{ArgParser, CliEnv, CommandDef, Plugin, PluginId, Translator, Values};
use tracing::{debug, info_span, Instrument};
use uuid::Uuid;

use crate::{
    args::DefaultParser,
    config::AppConfig,
    error::CliError,
    lifecycle::{Hooks, Lifecycle},
    resolver,
};

/// A command-line application: an entry command, optional sub-commands and
/// the plugins extending them.
///
/// An `App` is a reusable template. Every call to [`App::run`] resolves the
/// plugins again and builds a fresh extension namespace and decorator chain.
pub struct App {
    env: CliEnv,
    entry: CommandDef,
    sub_commands: Vec<CommandDef>,
    plugins: Vec<Plugin>,
    disabled: Vec<PluginId>,
    parser: Arc<dyn ArgParser>,
    translator: Option<Translator>,
    hooks: Hooks,
}

impl App {
    pub fn new(entry: CommandDef) -> Self {
        Self {
            env: CliEnv::default(),
            entry,
            sub_commands: Vec::new(),
            plugins: Vec::new(),
            disabled: Vec::new(),
            parser: Arc::new(DefaultParser),
            translator: None,
            hooks: Hooks::default(),
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.env.name = Some(name.into());
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.env.version = Some(version.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.env.description = Some(description.into());
        self
    }

    pub fn sub_command(mut self, command: CommandDef) -> Self {
        self.sub_commands.push(command);
        self
    }

    pub fn plugin(mut self, plugin: Plugin) -> Self {
        self.plugins.push(plugin);
        self
    }

    pub fn plugins(mut self, plugins: impl IntoIterator<Item = Plugin>) -> Self {
        self.plugins.extend(plugins);
        self
    }

    /// Replace the argument parser.
    pub fn parser(mut self, parser: impl ArgParser + 'static) -> Self {
        self.parser = Arc::new(parser);
        self
    }

    pub fn translator<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, &Values) -> Option<String> + Send + Sync + 'static,
    {
        self.translator = Some(Arc::new(f));
        self
    }

    pub fn hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Apply metadata overrides and the disabled plugin list from `config`.
    pub fn with_config(mut self, config: &AppConfig) -> Self {
        if let Some(name) = &config.cli.name {
            self.env.name = Some(name.clone());
        }
        if let Some(version) = &config.cli.version {
            self.env.version = Some(version.clone());
        }
        if let Some(description) = &config.cli.description {
            self.env.description = Some(description.clone());
        }
        self.disabled.extend(config.disabled_plugins());
        self
    }

    pub fn env(&self) -> &CliEnv {
        &self.env
    }

    /// Registered plugins minus the disabled ones, in registration order.
    pub fn active_plugins(&self) -> Vec<Plugin> {
        self.plugins
            .iter()
            .filter(|p| !self.disabled.contains(p.id()))
            .cloned()
            .collect()
    }

    /// Run the application against `argv` (program name excluded).
    pub async fn run<I, S>(&self, argv: I) -> Result<Option<String>, CliError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let argv: Vec<String> = argv.into_iter().map(Into::into).collect();
        let span = info_span!("run", run_id = %Uuid::new_v4());
        async move {
            let active = self.active_plugins();
            if active.len() < self.plugins.len() {
                debug!(disabled = ?self.disabled, "skipping disabled plugins");
            }
            let resolved = resolver::resolve(&active)?;
            let lifecycle = Lifecycle {
                env: &self.env,
                entry: &self.entry,
                sub_commands: &self.sub_commands,
                parser: self.parser.as_ref(),
                translator: self.translator.as_ref(),
                hooks: &self.hooks,
            };
            lifecycle.execute(&resolved, argv).await
        }
        .instrument(span)
        .await
    }
}
