//! Types shared between the gantry engine and plugin authors.
//!
//! A [`Plugin`] contributes registrations during setup (global options,
//! sub-commands, decorators) and optionally an extension value that command
//! runners and later plugins read from the [`Extensions`] namespace.

pub mod command;
pub mod decorator;
pub mod extension;
pub mod plugin;
pub mod schema;
pub mod setup;

pub use command::{CliEnv, CommandContext, CommandDef, CommandMeta, Renderers, Translator};
pub use decorator::{
    compose, renderer, runner, validation_errors_renderer, BoxFuture, CommandRunner, Decorator,
    Renderer, ValidationErrorsRenderer,
};
pub use extension::{ExtensionContext, ExtensionValue, Extensions, ExtensionsBuilder};
pub use plugin::{Dependency, Plugin, PluginId};
pub use schema::{
    ArgError, ArgErrorKind, ArgKind, ArgParser, ArgSchema, ArgsSchema, ParsedArgs,
    ValidationErrors, Values,
};
pub use setup::{SetupContext, SetupError, SetupParts, SetupRegistry};
