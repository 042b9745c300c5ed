//! Argument parsing and command composition with a plugin lifecycle.
//!
//! An [`App`] declares an entry command and sub-commands; [`Plugin`]s add
//! global options, commands and decorators during setup and expose extension
//! values to command runners.

pub mod app;
pub mod args;
pub mod cli;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod render;
pub mod resolver;

pub use app::App;
pub use args::DefaultParser;
pub use config::AppConfig;
pub use error::{CliError, ExtensionPhase};
pub use lifecycle::Hooks;
pub use plugin_api::{self, CommandDef, Plugin};
pub use resolver::resolve;
