use plugin_api::{
    renderer, validation_errors_renderer, ArgKind, ArgSchema, CommandContext, Renderer,
    ValidationErrors, ValidationErrorsRenderer,
};

/// Base of the header renderer chain.
pub fn header_renderer() -> Renderer {
    renderer(|ctx| async move { Ok(header(&ctx)) })
}

/// Base of the usage renderer chain.
pub fn usage_renderer() -> Renderer {
    renderer(|ctx| async move { Ok(usage(&ctx)) })
}

/// Base of the validation errors renderer chain.
pub fn validation_errors_base() -> ValidationErrorsRenderer {
    validation_errors_renderer(|_ctx, errors| async move { Ok(validation_errors(&errors)) })
}

/// `name (version)` followed by the application description.
pub fn header(ctx: &CommandContext) -> String {
    let Some(name) = &ctx.env.name else {
        return String::new();
    };
    let mut out = match &ctx.env.version {
        Some(version) => format!("{name} ({version})"),
        None => name.clone(),
    };
    if let Some(description) = &ctx.env.description {
        out.push('\n');
        out.push_str(description);
    }
    out
}

pub fn usage(ctx: &CommandContext) -> String {
    let positionals: Vec<_> = ctx
        .args
        .iter()
        .filter(|(_, a)| a.kind == ArgKind::Positional)
        .collect();
    let options: Vec<_> = ctx
        .args
        .iter()
        .filter(|(_, a)| a.kind != ArgKind::Positional)
        .collect();
    let at_entry = ctx.meta.path.is_empty();

    let mut invocation = vec![ctx.env.name.clone().unwrap_or_else(|| ctx.meta.name.clone())];
    invocation.extend(ctx.meta.path.iter().cloned());
    if at_entry && !ctx.sub_commands.is_empty() {
        invocation.push("[COMMAND]".into());
    }
    if !options.is_empty() {
        invocation.push("<OPTIONS>".into());
    }
    for (name, arg) in &positionals {
        invocation.push(if arg.multiple {
            format!("<{name}...>")
        } else {
            format!("<{name}>")
        });
    }

    let mut sections = Vec::new();
    if let Some(description) = &ctx.meta.description {
        sections.push(description.clone());
    }
    sections.push(format!("USAGE:\n  {}", invocation.join(" ")));

    if at_entry && !ctx.sub_commands.is_empty() {
        let rows = ctx
            .sub_commands
            .iter()
            .map(|(name, description)| (name.clone(), description.clone().unwrap_or_default()))
            .collect();
        sections.push(table("COMMANDS:", rows));
    }
    if !positionals.is_empty() {
        let rows = positionals
            .iter()
            .map(|(name, arg)| (name.to_string(), describe(arg)))
            .collect();
        sections.push(table("ARGUMENTS:", rows));
    }
    if !options.is_empty() {
        let rows = options
            .iter()
            .map(|(name, arg)| (option_label(name, arg), describe(arg)))
            .collect();
        sections.push(table("OPTIONS:", rows));
    }
    sections.join("\n\n")
}

pub fn validation_errors(errors: &ValidationErrors) -> String {
    errors
        .errors()
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

fn option_label(name: &str, arg: &ArgSchema) -> String {
    let mut label = match arg.short {
        Some(short) => format!("-{short}, --{name}"),
        None => format!("--{name}"),
    };
    if arg.kind == ArgKind::Boolean && arg.negatable {
        label.push_str(&format!(", --no-{name}"));
    }
    let placeholder = arg.kind.placeholder();
    if !placeholder.is_empty() {
        label.push_str(&format!(" <{placeholder}>"));
    }
    label
}

fn describe(arg: &ArgSchema) -> String {
    let mut text = arg.description.clone().unwrap_or_default();
    if let Some(default) = &arg.default {
        let shown = match default {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        text.push_str(&format!(" (default: {shown})"));
    } else if arg.required {
        text.push_str(" (required)");
    }
    text.trim().to_string()
}

fn table(title: &str, rows: Vec<(String, String)>) -> String {
    let width = rows.iter().map(|(label, _)| label.len()).max().unwrap_or(0);
    let mut lines = vec![title.to_string()];
    for (label, text) in rows {
        if text.is_empty() {
            lines.push(format!("  {label}"));
        } else {
            lines.push(format!("  {label:<width$}  {text}"));
        }
    }
    lines.join("\n")
}
