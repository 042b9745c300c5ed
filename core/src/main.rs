use anyhow::{Context, Result};
use clap::Parser;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use gantry::{cli::Cli, plugin_api::ArgSchema, App, AppConfig, CommandDef};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::discover()?,
    };

    let mut app = demo_app().with_config(&config);
    if cli.safe_mode {
        warn!("safe mode enabled - not loading plugins");
    } else {
        app = app
            .plugin(gantry_globals::globals())
            .plugin(gantry_globals::timing());
    }

    if let Some(output) = app.run(cli.args).await? {
        println!("{output}");
    }
    Ok(())
}

fn demo_app() -> App {
    let greet = CommandDef::new("greet")
        .about("Print a greeting")
        .arg(
            "name",
            ArgSchema::string()
                .short('n')
                .description("Who to greet")
                .default_value("world"),
        )
        .arg("shout", ArgSchema::boolean().short('s').description("Greet loudly"))
        .handler(|ctx| async move {
            let greeting = ctx.translate("Hello, {name}!", &ctx.values);
            Ok(Some(if ctx.flag("shout") {
                greeting.to_uppercase()
            } else {
                greeting
            }))
        });

    let count = CommandDef::new("count")
        .about("Sum the given numbers")
        .arg(
            "numbers",
            ArgSchema::positional().multiple().description("Numbers to add"),
        )
        .handler(|ctx| async move { sum(&ctx.positionals).map(|total| Some(total.to_string())) });

    App::new(greet)
        .name("gantry")
        .version(env!("CARGO_PKG_VERSION"))
        .description("Demo application for the gantry command framework")
        .sub_command(count)
}

fn sum(numbers: &[String]) -> Result<f64> {
    numbers
        .iter()
        .map(|n| {
            n.parse::<f64>()
                .with_context(|| format!("'{n}' is not a number"))
        })
        .sum()
}
