use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Parsed option values keyed by option name.
pub type Values = serde_json::Map<String, Value>;

/// Value type accepted by an option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArgKind {
    String,
    Number,
    Boolean,
    Positional,
    Enum(Vec<String>),
}

impl ArgKind {
    /// Placeholder shown in usage text.
    pub fn placeholder(&self) -> String {
        match self {
            ArgKind::String | ArgKind::Positional => "string".into(),
            ArgKind::Number => "number".into(),
            ArgKind::Boolean => String::new(),
            ArgKind::Enum(choices) => choices.join("|"),
        }
    }
}

/// Declaration of a single option or positional argument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArgSchema {
    pub kind: ArgKind,
    #[serde(default)]
    pub short: Option<char>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub multiple: bool,
    #[serde(default)]
    pub negatable: bool,
    #[serde(default)]
    pub default: Option<Value>,
}

impl ArgSchema {
    pub fn new(kind: ArgKind) -> Self {
        Self {
            kind,
            short: None,
            description: None,
            required: false,
            multiple: false,
            negatable: false,
            default: None,
        }
    }

    pub fn string() -> Self {
        Self::new(ArgKind::String)
    }

    pub fn number() -> Self {
        Self::new(ArgKind::Number)
    }

    pub fn boolean() -> Self {
        Self::new(ArgKind::Boolean)
    }

    pub fn positional() -> Self {
        Self::new(ArgKind::Positional)
    }

    pub fn choice<I, S>(choices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(ArgKind::Enum(choices.into_iter().map(Into::into).collect()))
    }

    pub fn short(mut self, short: char) -> Self {
        self.short = Some(short);
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn multiple(mut self) -> Self {
        self.multiple = true;
        self
    }

    pub fn negatable(mut self) -> Self {
        self.negatable = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Whether the option consumes a following token as its value.
    pub fn takes_value(&self) -> bool {
        !matches!(self.kind, ArgKind::Boolean | ArgKind::Positional)
    }
}

/// Declaration-ordered set of argument schemas.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArgsSchema {
    entries: Vec<(String, ArgSchema)>,
}

impl ArgsSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an entry, keeping the original position on replace.
    pub fn insert(&mut self, name: impl Into<String>, schema: ArgSchema) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = schema,
            None => self.entries.push((name, schema)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ArgSchema> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, s)| s)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ArgSchema)> {
        self.entries.iter().map(|(n, s)| (n.as_str(), s))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Overlay `other` on top of `self`; entries of `other` win on name clashes.
    pub fn merged_with(&self, other: &ArgsSchema) -> ArgsSchema {
        let mut merged = self.clone();
        for (name, schema) in other.iter() {
            merged.insert(name, schema.clone());
        }
        merged
    }

    /// Look up an option by its short alias.
    pub fn by_short(&self, short: char) -> Option<(&str, &ArgSchema)> {
        self.iter().find(|(_, s)| s.short == Some(short))
    }
}

/// Kind of constraint violated by a single argument.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArgErrorKind {
    #[error("is required")]
    Required,
    #[error("expects a number, got '{0}'")]
    InvalidNumber(String),
    #[error("expects one of [{}], got '{value}'", .allowed.join(", "))]
    InvalidChoice { value: String, allowed: Vec<String> },
    #[error("expects a value")]
    MissingValue,
}

/// A constraint violation for one argument.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("'{option}' {kind}")]
pub struct ArgError {
    pub option: String,
    pub kind: ArgErrorKind,
}

impl ArgError {
    pub fn new(option: impl Into<String>, kind: ArgErrorKind) -> Self {
        Self {
            option: option.into(),
            kind,
        }
    }
}

/// Aggregate of every violation found while parsing one argv.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{} argument error(s): {}", .0.len(), summary(.0))]
pub struct ValidationErrors(pub Vec<ArgError>);

fn summary(errors: &[ArgError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ValidationErrors {
    pub fn errors(&self) -> &[ArgError] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Output of an [`ArgParser`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedArgs {
    pub values: Values,
    /// Whether each declared option was supplied on the command line.
    pub explicit: HashMap<String, bool>,
    pub positionals: Vec<String>,
    /// Tokens following `--`.
    pub rest: Vec<String>,
    pub validation_error: Option<ValidationErrors>,
}

/// Turns an argv slice into values according to a schema.
pub trait ArgParser: Send + Sync {
    fn parse(&self, schema: &ArgsSchema, argv: &[String]) -> ParsedArgs;
}
