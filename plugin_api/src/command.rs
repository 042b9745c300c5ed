use std::{any::Any, collections::HashMap, fmt, future::Future, sync::Arc};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    decorator::{
        renderer, runner, validation_errors_renderer, CommandRunner, Renderer,
        ValidationErrorsRenderer,
    },
    extension::Extensions,
    schema::{ArgSchema, ArgsSchema, ValidationErrors, Values},
};

/// Metadata describing the application itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CliEnv {
    pub name: Option<String>,
    pub version: Option<String>,
    pub description: Option<String>,
}

/// Identity of the command selected for a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandMeta {
    pub name: String,
    /// Sub-command names leading to this command; empty for the entry command.
    pub path: Vec<String>,
    pub description: Option<String>,
}

/// Declaration of a command.
#[derive(Clone)]
pub struct CommandDef {
    pub name: String,
    pub description: Option<String>,
    pub args: ArgsSchema,
    pub runner: Option<CommandRunner>,
}

impl CommandDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            args: ArgsSchema::new(),
            runner: None,
        }
    }

    pub fn about(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn arg(mut self, name: impl Into<String>, schema: ArgSchema) -> Self {
        self.args.insert(name, schema);
        self
    }

    pub fn handler<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Arc<CommandContext>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Option<String>>> + Send + 'static,
    {
        self.runner = Some(runner(f));
        self
    }
}

impl fmt::Debug for CommandDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandDef")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("args", &self.args)
            .field("runner", &self.runner.is_some())
            .finish()
    }
}

/// Looks up a translation for a key; `None` falls back to the key itself.
pub type Translator = Arc<dyn Fn(&str, &Values) -> Option<String> + Send + Sync>;

/// Composed renderer chains available to a run.
#[derive(Clone)]
pub struct Renderers {
    pub header: Renderer,
    pub usage: Renderer,
    pub validation_errors: ValidationErrorsRenderer,
}

impl Renderers {
    /// Renderers producing empty text.
    pub fn blank() -> Self {
        Self {
            header: renderer(|_ctx| async { Ok(String::new()) }),
            usage: renderer(|_ctx| async { Ok(String::new()) }),
            validation_errors: validation_errors_renderer(|_ctx, _errors| async {
                Ok(String::new())
            }),
        }
    }
}

/// Read-only record handed to the command runner, its decorators and hooks.
#[derive(Clone)]
pub struct CommandContext {
    pub meta: CommandMeta,
    pub env: CliEnv,
    /// Effective schema: global options merged with the command's own args.
    pub args: ArgsSchema,
    pub values: Values,
    pub explicit: HashMap<String, bool>,
    pub positionals: Vec<String>,
    pub rest: Vec<String>,
    pub argv: Vec<String>,
    pub validation_error: Option<Arc<ValidationErrors>>,
    pub extensions: Extensions,
    /// Name and description of every sub-command, for usage text.
    pub sub_commands: Vec<(String, Option<String>)>,
    pub renderers: Renderers,
    pub translator: Option<Translator>,
}

impl CommandContext {
    pub fn new(meta: CommandMeta, env: CliEnv, renderers: Renderers) -> Self {
        Self {
            meta,
            env,
            args: ArgsSchema::new(),
            values: Values::new(),
            explicit: HashMap::new(),
            positionals: Vec::new(),
            rest: Vec::new(),
            argv: Vec::new(),
            validation_error: None,
            extensions: Extensions::new(),
            sub_commands: Vec::new(),
            renderers,
            translator: None,
        }
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Shorthand for boolean flags; absent or non-boolean values read as `false`.
    pub fn flag(&self, name: &str) -> bool {
        self.value(name).and_then(Value::as_bool).unwrap_or(false)
    }

    /// Whether `name` was supplied on the command line rather than defaulted.
    pub fn is_explicit(&self, name: &str) -> bool {
        self.explicit.get(name).copied().unwrap_or(false)
    }

    pub fn extension<T: Any + Send + Sync>(&self, id: &str) -> Option<Arc<T>> {
        self.extensions.get(id)
    }

    pub async fn render_header(self: &Arc<Self>) -> anyhow::Result<String> {
        (self.renderers.header)(Arc::clone(self)).await
    }

    pub async fn render_usage(self: &Arc<Self>) -> anyhow::Result<String> {
        (self.renderers.usage)(Arc::clone(self)).await
    }

    /// Render the validation error of this run; empty when parsing succeeded.
    pub async fn render_validation_errors(self: &Arc<Self>) -> anyhow::Result<String> {
        match &self.validation_error {
            Some(errors) => {
                (self.renderers.validation_errors)(Arc::clone(self), Arc::clone(errors)).await
            }
            None => Ok(String::new()),
        }
    }

    /// Translate `key`, interpolating `{name}` placeholders from `values`.
    pub fn translate(&self, key: &str, values: &Values) -> String {
        let text = self
            .translator
            .as_ref()
            .and_then(|t| t(key, values))
            .unwrap_or_else(|| key.to_string());
        interpolate(&text, values)
    }
}

fn interpolate(text: &str, values: &Values) -> String {
    values.iter().fold(text.to_string(), |acc, (name, value)| {
        let shown = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        acc.replace(&format!("{{{name}}}"), &shown)
    })
}

impl fmt::Debug for CommandContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandContext")
            .field("meta", &self.meta)
            .field("env", &self.env)
            .field("values", &self.values)
            .field("explicit", &self.explicit)
            .field("positionals", &self.positionals)
            .field("rest", &self.rest)
            .field("validation_error", &self.validation_error)
            .field("extensions", &self.extensions)
            .finish()
    }
}
