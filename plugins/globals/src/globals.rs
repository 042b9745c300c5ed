use plugin_api::{runner, ArgSchema, CommandRunner, Plugin, SetupContext};

pub const GLOBALS_ID: &str = "gantry:globals";

/// `--help` and `--version` for every command. Argument validation errors
/// are rendered in place of running the command.
pub fn globals() -> Plugin {
    Plugin::new(GLOBALS_ID).name("global options").setup(setup)
}

async fn setup(ctx: SetupContext) -> anyhow::Result<()> {
    ctx.add_global_option(
        "help",
        ArgSchema::boolean()
            .short('h')
            .description("Display this help message"),
    )?;
    ctx.add_global_option(
        "version",
        ArgSchema::boolean()
            .short('v')
            .description("Display this version"),
    )?;
    ctx.decorate_command(intercept)?;
    Ok(())
}

fn intercept(next: CommandRunner) -> CommandRunner {
    runner(move |ctx| {
        let next = next.clone();
        async move {
            if ctx.flag("version") {
                let version = ctx.env.version.clone().unwrap_or_else(|| "unknown".into());
                return Ok(Some(version));
            }
            if ctx.flag("help") {
                let sections = [ctx.render_header().await?, ctx.render_usage().await?];
                return Ok(Some(join(sections)));
            }
            if ctx.validation_error.is_some() {
                let sections = [
                    ctx.render_header().await?,
                    ctx.render_validation_errors().await?,
                ];
                return Ok(Some(join(sections)));
            }
            next(ctx).await
        }
    })
}

fn join(sections: [String; 2]) -> String {
    sections
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use plugin_api::{
        compose, renderer, validation_errors_renderer, ArgError, ArgErrorKind, CliEnv,
        CommandContext, CommandMeta, Renderers, SetupParts, SetupRegistry, ValidationErrors,
    };
    use serde_json::json;
    use std::sync::Arc;

    async fn parts() -> SetupParts {
        let registry = SetupRegistry::new(CliEnv::default());
        globals()
            .run_setup(registry.open(GLOBALS_ID.into()))
            .await
            .unwrap();
        registry.into_parts()
    }

    fn context(values: serde_json::Value) -> CommandContext {
        let env = CliEnv {
            name: Some("tool".into()),
            version: Some("3.1.4".into()),
            description: None,
        };
        let renderers = Renderers {
            header: renderer(|ctx| async move { Ok(format!("== {} ==", ctx.meta.name)) }),
            usage: renderer(|_ctx| async { Ok("usage text".to_string()) }),
            validation_errors: validation_errors_renderer(|_ctx, errors| async move {
                Ok(format!("{} problem(s)", errors.len()))
            }),
        };
        let mut ctx = CommandContext::new(
            CommandMeta {
                name: "build".into(),
                ..Default::default()
            },
            env,
            renderers,
        );
        ctx.values = values.as_object().cloned().unwrap_or_default();
        ctx
    }

    async fn run(parts: &SetupParts, ctx: CommandContext) -> Option<String> {
        let base = runner(|_ctx| async { Ok(Some("ran".to_string())) });
        compose(base, &parts.command_decorators)(Arc::new(ctx))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn registers_help_and_version() {
        let parts = parts().await;
        let names: Vec<_> = parts.global_options.iter().map(|(n, _)| n).collect();
        assert_eq!(names, ["help", "version"]);
        assert_eq!(parts.command_decorators.len(), 1);
    }

    #[tokio::test]
    async fn version_short_circuits() {
        let parts = parts().await;
        let out = run(&parts, context(json!({"version": true}))).await;
        assert_eq!(out.as_deref(), Some("3.1.4"));
    }

    #[tokio::test]
    async fn help_renders_header_and_usage() {
        let parts = parts().await;
        let out = run(&parts, context(json!({"help": true}))).await;
        assert_eq!(out.as_deref(), Some("== build ==\n\nusage text"));
    }

    #[tokio::test]
    async fn validation_errors_skip_the_command() {
        let parts = parts().await;
        let mut ctx = context(json!({}));
        ctx.validation_error = Some(Arc::new(ValidationErrors(vec![ArgError::new(
            "name",
            ArgErrorKind::Required,
        )])));
        let out = run(&parts, ctx).await;
        assert_eq!(out.as_deref(), Some("== build ==\n\n1 problem(s)"));
    }

    #[tokio::test]
    async fn plain_runs_reach_the_command() {
        let parts = parts().await;
        let out = run(&parts, context(json!({"help": false}))).await;
        assert_eq!(out.as_deref(), Some("ran"));
    }
}
