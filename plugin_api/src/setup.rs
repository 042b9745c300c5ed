use std::{fmt, mem, sync::Arc};

use parking_lot::Mutex;
use thiserror::Error;

use crate::{
    command::{CliEnv, CommandDef},
    decorator::{CommandRunner, Decorator, Renderer, ValidationErrorsRenderer},
    plugin::PluginId,
    schema::{ArgSchema, ArgsSchema},
};

/// Rejected registration during the setup phase.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SetupError {
    #[error("global option '{0}' is already registered")]
    DuplicateGlobalOption(String),
    #[error("command '{0}' is already registered")]
    DuplicateCommand(String),
    #[error("plugin '{0}' registered outside of its setup")]
    Closed(PluginId),
}

#[derive(Default)]
struct Registry {
    /// Plugin whose setup is running; registrations from any other handle are refused.
    active: Option<PluginId>,
    reserved_commands: Vec<String>,
    global_options: ArgsSchema,
    commands: Vec<CommandDef>,
    command_decorators: Vec<Decorator<CommandRunner>>,
    header_decorators: Vec<Decorator<Renderer>>,
    usage_decorators: Vec<Decorator<Renderer>>,
    validation_errors_decorators: Vec<Decorator<ValidationErrorsRenderer>>,
}

/// Everything accumulated over the setup phase.
#[derive(Default)]
pub struct SetupParts {
    pub global_options: ArgsSchema,
    pub commands: Vec<CommandDef>,
    pub command_decorators: Vec<Decorator<CommandRunner>>,
    pub header_decorators: Vec<Decorator<Renderer>>,
    pub usage_decorators: Vec<Decorator<Renderer>>,
    pub validation_errors_decorators: Vec<Decorator<ValidationErrorsRenderer>>,
}

/// Engine side of the setup phase.
///
/// Plugins never see the registry, only the [`SetupContext`] handle opened
/// for them, so nothing registered by an earlier plugin can be dropped or
/// replaced by a later one.
pub struct SetupRegistry {
    env: CliEnv,
    inner: Arc<Mutex<Registry>>,
}

impl SetupRegistry {
    pub fn new(env: CliEnv) -> Self {
        Self {
            env,
            inner: Arc::default(),
        }
    }

    /// Command names already taken by the application itself.
    pub fn with_reserved_commands<I, S>(self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inner.lock().reserved_commands = names.into_iter().map(Into::into).collect();
        self
    }

    /// Hand out the handle for `plugin`. Handles of other plugins stop
    /// accepting registrations.
    pub fn open(&self, plugin: PluginId) -> SetupContext {
        self.inner.lock().active = Some(plugin.clone());
        SetupContext {
            plugin,
            env: self.env.clone(),
            registry: Arc::clone(&self.inner),
        }
    }

    /// End the current plugin's setup.
    pub fn close(&self) {
        self.inner.lock().active = None;
    }

    pub fn into_parts(self) -> SetupParts {
        let mut inner = self.inner.lock();
        inner.active = None;
        SetupParts {
            global_options: mem::take(&mut inner.global_options),
            commands: mem::take(&mut inner.commands),
            command_decorators: mem::take(&mut inner.command_decorators),
            header_decorators: mem::take(&mut inner.header_decorators),
            usage_decorators: mem::take(&mut inner.usage_decorators),
            validation_errors_decorators: mem::take(&mut inner.validation_errors_decorators),
        }
    }
}

/// Append-only registration handle given to a plugin's setup callback.
///
/// The handle is only live while that plugin's setup runs; afterwards every
/// registration fails with [`SetupError::Closed`].
#[derive(Clone)]
pub struct SetupContext {
    plugin: PluginId,
    env: CliEnv,
    registry: Arc<Mutex<Registry>>,
}

impl SetupContext {
    /// The plugin this handle was opened for.
    pub fn plugin_id(&self) -> &PluginId {
        &self.plugin
    }

    pub fn env(&self) -> &CliEnv {
        &self.env
    }

    /// Global options registered so far, this plugin's included.
    pub fn global_options(&self) -> ArgsSchema {
        self.registry.lock().global_options.clone()
    }

    /// Names of the commands registered so far by plugins.
    pub fn command_names(&self) -> Vec<String> {
        self.registry
            .lock()
            .commands
            .iter()
            .map(|c| c.name.clone())
            .collect()
    }

    fn with_registry<T>(
        &self,
        f: impl FnOnce(&mut Registry) -> Result<T, SetupError>,
    ) -> Result<T, SetupError> {
        let mut registry = self.registry.lock();
        if registry.active.as_ref() != Some(&self.plugin) {
            return Err(SetupError::Closed(self.plugin.clone()));
        }
        f(&mut registry)
    }

    /// Declare an option available to every command.
    pub fn add_global_option(
        &self,
        name: impl Into<String>,
        schema: ArgSchema,
    ) -> Result<(), SetupError> {
        let name = name.into();
        self.with_registry(|r| {
            if r.global_options.contains(&name) {
                return Err(SetupError::DuplicateGlobalOption(name));
            }
            r.global_options.insert(name, schema);
            Ok(())
        })
    }

    /// Register an additional sub-command.
    pub fn add_command(&self, command: CommandDef) -> Result<(), SetupError> {
        self.with_registry(|r| {
            let taken = r.reserved_commands.iter().any(|n| *n == command.name)
                || r.commands.iter().any(|c| c.name == command.name);
            if taken {
                return Err(SetupError::DuplicateCommand(command.name));
            }
            r.commands.push(command);
            Ok(())
        })
    }

    pub fn decorate_command<F>(&self, decorator: F) -> Result<(), SetupError>
    where
        F: Fn(CommandRunner) -> CommandRunner + Send + Sync + 'static,
    {
        self.with_registry(|r| {
            r.command_decorators.push(Arc::new(decorator));
            Ok(())
        })
    }

    pub fn decorate_header_renderer<F>(&self, decorator: F) -> Result<(), SetupError>
    where
        F: Fn(Renderer) -> Renderer + Send + Sync + 'static,
    {
        self.with_registry(|r| {
            r.header_decorators.push(Arc::new(decorator));
            Ok(())
        })
    }

    pub fn decorate_usage_renderer<F>(&self, decorator: F) -> Result<(), SetupError>
    where
        F: Fn(Renderer) -> Renderer + Send + Sync + 'static,
    {
        self.with_registry(|r| {
            r.usage_decorators.push(Arc::new(decorator));
            Ok(())
        })
    }

    pub fn decorate_validation_errors_renderer<F>(&self, decorator: F) -> Result<(), SetupError>
    where
        F: Fn(ValidationErrorsRenderer) -> ValidationErrorsRenderer + Send + Sync + 'static,
    {
        self.with_registry(|r| {
            r.validation_errors_decorators.push(Arc::new(decorator));
            Ok(())
        })
    }
}

impl fmt::Debug for SetupContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.registry.lock();
        f.debug_struct("SetupContext")
            .field("plugin", &self.plugin)
            .field("open", &(registry.active.as_ref() == Some(&self.plugin)))
            .field("global_options", &registry.global_options)
            .field("commands", &registry.commands.len())
            .field("command_decorators", &registry.command_decorators.len())
            .finish()
    }
}
