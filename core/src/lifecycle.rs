use std::{fmt, future::Future, sync::Arc};

use plugin_api::{
    compose, runner, ArgParser, BoxFuture, CliEnv, CommandContext, CommandDef, CommandMeta,
    CommandRunner, ExtensionContext, Extensions, ExtensionsBuilder, ParsedArgs, Plugin, Renderers,
    SetupParts, SetupRegistry, Translator,
};
use tracing::{debug, error, warn};

use crate::{
    error::{CliError, ExtensionPhase},
    render,
};

type BeforeHook = Arc<dyn Fn(Arc<CommandContext>) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;
type AfterHook = Arc<
    dyn Fn(Arc<CommandContext>, Option<String>) -> BoxFuture<'static, anyhow::Result<()>>
        + Send
        + Sync,
>;
type ErrorHook = Arc<
    dyn Fn(Arc<CommandContext>, anyhow::Error) -> BoxFuture<'static, anyhow::Result<Option<String>>>
        + Send
        + Sync,
>;

/// Run-level callbacks around command execution.
#[derive(Clone, Default)]
pub struct Hooks {
    on_before_command: Option<BeforeHook>,
    on_after_command: Option<AfterHook>,
    on_error_command: Option<ErrorHook>,
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called right before the composed command runner; failing aborts the run.
    pub fn on_before_command<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Arc<CommandContext>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.on_before_command = Some(Arc::new(
            move |ctx: Arc<CommandContext>| -> BoxFuture<'static, anyhow::Result<()>> {
                Box::pin(f(ctx))
            },
        ));
        self
    }

    /// Called with the command output after a successful run.
    pub fn on_after_command<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Arc<CommandContext>, Option<String>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.on_after_command = Some(Arc::new(
            move |ctx: Arc<CommandContext>,
                  output: Option<String>|
                  -> BoxFuture<'static, anyhow::Result<()>> { Box::pin(f(ctx, output)) },
        ));
        self
    }

    /// Called when the command fails. Returning `Ok` recovers the run with
    /// that output; returning an error fails the run with it.
    pub fn on_error_command<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Arc<CommandContext>, anyhow::Error) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Option<String>>> + Send + 'static,
    {
        self.on_error_command = Some(Arc::new(
            move |ctx: Arc<CommandContext>,
                  err: anyhow::Error|
                  -> BoxFuture<'static, anyhow::Result<Option<String>>> {
                Box::pin(f(ctx, err))
            },
        ));
        self
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("on_before_command", &self.on_before_command.is_some())
            .field("on_after_command", &self.on_after_command.is_some())
            .field("on_error_command", &self.on_error_command.is_some())
            .finish()
    }
}

/// Everything a run needs besides the resolved plugins.
pub struct Lifecycle<'a> {
    pub env: &'a CliEnv,
    pub entry: &'a CommandDef,
    pub sub_commands: &'a [CommandDef],
    pub parser: &'a dyn ArgParser,
    pub translator: Option<&'a Translator>,
    pub hooks: &'a Hooks,
}

impl Lifecycle<'_> {
    /// Drive one run over plugins already in resolved order.
    pub async fn execute(
        &self,
        plugins: &[&Plugin],
        argv: Vec<String>,
    ) -> Result<Option<String>, CliError> {
        let parts = self.setup(plugins).await?;

        let (command, path, argv) = self.route(&parts.commands, argv);
        let meta = CommandMeta {
            name: command.name.clone(),
            path,
            description: command.description.clone(),
        };
        let schema = parts.global_options.merged_with(&command.args);
        let parsed = self.parser.parse(&schema, &argv);
        if let Some(err) = &parsed.validation_error {
            warn!(command = %meta.name, %err, "argument validation failed");
        }

        let extensions = self.build_extensions(plugins, &parsed, &meta).await?;
        for plugin in plugins.iter().filter(|p| p.has_on_extension()) {
            debug!(plugin = %plugin.id(), "running onExtension");
            plugin
                .notify_extensions(extensions.clone(), meta.clone())
                .await
                .map_err(|source| CliError::PluginExtension {
                    plugin: plugin.id().clone(),
                    phase: ExtensionPhase::OnExtension,
                    source,
                })?;
        }

        let renderers = Renderers {
            header: compose(render::header_renderer(), &parts.header_decorators),
            usage: compose(render::usage_renderer(), &parts.usage_decorators),
            validation_errors: compose(
                render::validation_errors_base(),
                &parts.validation_errors_decorators,
            ),
        };
        let sub_commands = self
            .sub_commands
            .iter()
            .chain(&parts.commands)
            .map(|c| (c.name.clone(), c.description.clone()))
            .collect();

        let mut ctx = CommandContext::new(meta, self.env.clone(), renderers);
        ctx.args = schema;
        ctx.values = parsed.values;
        ctx.explicit = parsed.explicit;
        ctx.positionals = parsed.positionals;
        ctx.rest = parsed.rest;
        ctx.argv = argv;
        ctx.validation_error = parsed.validation_error.map(Arc::new);
        ctx.extensions = extensions;
        ctx.sub_commands = sub_commands;
        ctx.translator = self.translator.cloned();

        let base = command
            .runner
            .clone()
            .unwrap_or_else(|| runner(|_ctx| async { Ok(None) }));
        let composed = compose(base, &parts.command_decorators);
        self.run_command(Arc::new(ctx), composed).await
    }

    async fn setup(&self, plugins: &[&Plugin]) -> Result<SetupParts, CliError> {
        let reserved = std::iter::once(&self.entry.name)
            .chain(self.sub_commands.iter().map(|c| &c.name))
            .cloned();
        let registry = SetupRegistry::new(self.env.clone()).with_reserved_commands(reserved);
        for plugin in plugins.iter().filter(|p| p.has_setup()) {
            debug!(plugin = %plugin.id(), name = plugin.display_name(), "running setup");
            let result = plugin.run_setup(registry.open(plugin.id().clone())).await;
            registry.close();
            result.map_err(|source| CliError::PluginSetup {
                plugin: plugin.id().clone(),
                source,
            })?;
        }
        Ok(registry.into_parts())
    }

    /// Pick the sub-command named by the first token, or the entry command.
    fn route<'c>(
        &'c self,
        registered: &'c [CommandDef],
        mut argv: Vec<String>,
    ) -> (&'c CommandDef, Vec<String>, Vec<String>) {
        let selected = argv.first().and_then(|first| {
            self.sub_commands
                .iter()
                .chain(registered)
                .find(|c| c.name == *first)
        });
        match selected {
            Some(command) => {
                argv.remove(0);
                debug!(command = %command.name, "selected sub-command");
                (command, vec![command.name.clone()], argv)
            }
            None => (self.entry, Vec::new(), argv),
        }
    }

    async fn build_extensions(
        &self,
        plugins: &[&Plugin],
        parsed: &ParsedArgs,
        meta: &CommandMeta,
    ) -> Result<Extensions, CliError> {
        let mut extensions = ExtensionsBuilder::new();
        for plugin in plugins.iter().filter(|p| p.has_extension()) {
            debug!(plugin = %plugin.id(), "building extension");
            let view = ExtensionContext {
                plugin: plugin.id().clone(),
                extensions: extensions.snapshot(),
                values: parsed.values.clone(),
                explicit: parsed.explicit.clone(),
                positionals: parsed.positionals.clone(),
                meta: meta.clone(),
                env: self.env.clone(),
            };
            let built = plugin
                .build_extension(view)
                .await
                .map_err(|source| CliError::PluginExtension {
                    plugin: plugin.id().clone(),
                    phase: ExtensionPhase::Extension,
                    source,
                })?;
            if let Some(value) = built {
                extensions.insert(plugin.id().clone(), value);
            }
        }
        Ok(extensions.finish())
    }

    async fn run_command(
        &self,
        ctx: Arc<CommandContext>,
        composed: CommandRunner,
    ) -> Result<Option<String>, CliError> {
        if let Some(before) = &self.hooks.on_before_command {
            before(Arc::clone(&ctx))
                .await
                .map_err(|source| CliError::Hook {
                    hook: "onBeforeCommand",
                    source,
                })?;
        }

        match composed(Arc::clone(&ctx)).await {
            Ok(output) => {
                if let Some(after) = &self.hooks.on_after_command {
                    after(Arc::clone(&ctx), output.clone())
                        .await
                        .map_err(|source| CliError::Hook {
                            hook: "onAfterCommand",
                            source,
                        })?;
                }
                Ok(output)
            }
            Err(err) => match &self.hooks.on_error_command {
                Some(on_error) => {
                    warn!(command = %ctx.meta.name, error = %err, "command failed, running error hook");
                    on_error(ctx, err).await.map_err(CliError::Command)
                }
                None => {
                    error!(command = %ctx.meta.name, error = %err, "command failed");
                    Err(CliError::Command(err))
                }
            },
        }
    }
}
