use clap::Parser;
use std::path::PathBuf;

/// Command line interface of the gantry demo binary.
///
/// Help and version flags are left to the application so they reach the
/// built-in globals plugin.
#[derive(Parser, Debug)]
#[command(author, about, disable_help_flag = true, disable_version_flag = true)]
pub struct Cli {
    /// Configuration file to use instead of the platform default.
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Start without loading any plugins.
    #[arg(long)]
    pub safe_mode: bool,
    /// Arguments forwarded to the application.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}
