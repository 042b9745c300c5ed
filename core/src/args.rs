//! Default argument parser.
//!
//! Tokens are split by `clap_lex`, the lexer underneath clap, and then
//! matched against the run's [`ArgsSchema`]. Supports `--name value`,
//! `--name=value`, `-n value`, `-n5`, boolean flags and clusters (`-abc`),
//! `--no-flag` for negatable booleans and `--` to stop option parsing.
//! Unknown options are ignored.

use std::{collections::HashMap, ffi::OsStr};

use clap_lex::{ArgCursor, ParsedArg, RawArgs, ShortFlags};
use plugin_api::{
    ArgError, ArgErrorKind, ArgKind, ArgParser, ArgSchema, ArgsSchema, ParsedArgs,
    ValidationErrors, Values,
};
use serde_json::Value;
use tracing::trace;

#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultParser;

impl ArgParser for DefaultParser {
    fn parse(&self, schema: &ArgsSchema, argv: &[String]) -> ParsedArgs {
        let raw = RawArgs::new(argv);
        let mut cursor = raw.cursor();
        let mut state = State::new(schema);
        while let Some(arg) = raw.next(&mut cursor) {
            if arg.is_escape() {
                state.rest = raw.remaining(&mut cursor).map(lossy).collect();
                break;
            }
            if let Some((Ok(name), inline)) = arg.to_long() {
                state.long(name, inline.map(lossy), &raw, &mut cursor);
            } else if let Some(flags) = arg.to_short().filter(|f| !f.is_negative_number()) {
                state.shorts(flags, &raw, &mut cursor);
            } else {
                state.positionals.push(lossy(arg.to_value_os()));
            }
        }
        state.finish()
    }
}

struct State<'a> {
    schema: &'a ArgsSchema,
    values: Values,
    explicit: HashMap<String, bool>,
    positionals: Vec<String>,
    rest: Vec<String>,
    errors: Vec<ArgError>,
}

impl<'a> State<'a> {
    fn new(schema: &'a ArgsSchema) -> Self {
        Self {
            schema,
            values: Values::new(),
            explicit: HashMap::new(),
            positionals: Vec::new(),
            rest: Vec::new(),
            errors: Vec::new(),
        }
    }

    fn long(&mut self, name: &str, inline: Option<String>, raw: &RawArgs, cursor: &mut ArgCursor) {
        let schema = self.schema;
        let Some(arg) = schema.get(name).filter(|a| a.kind != ArgKind::Positional) else {
            match name.strip_prefix("no-").and_then(|n| Some((n, schema.get(n)?))) {
                Some((flag, arg)) if arg.kind == ArgKind::Boolean && arg.negatable => {
                    self.set(flag, arg, Value::Bool(false));
                }
                _ => trace!(option = name, "ignoring unknown option"),
            }
            return;
        };

        if arg.kind == ArgKind::Boolean {
            let on = inline.map_or(true, |v| v != "false");
            self.set(name, arg, Value::Bool(on));
            return;
        }

        match inline.or_else(|| take_value(raw, cursor)) {
            Some(value) => self.store(name, arg, value),
            None => self.fail(name, ArgErrorKind::MissingValue),
        }
    }

    fn shorts(&mut self, mut flags: ShortFlags<'_>, raw: &RawArgs, cursor: &mut ArgCursor) {
        let schema = self.schema;
        while let Some(Ok(short)) = flags.next_flag() {
            let Some((name, arg)) = schema.by_short(short) else {
                trace!(option = %short, "ignoring unknown short option");
                continue;
            };
            if arg.kind == ArgKind::Boolean {
                self.set(name, arg, Value::Bool(true));
                continue;
            }
            // The remainder of the cluster, if any, is the value: `-n5`.
            let value = match flags.next_value_os() {
                Some(attached) => Some(lossy(attached)),
                None => take_value(raw, cursor),
            };
            match value {
                Some(value) => self.store(name, arg, value),
                None => self.fail(name, ArgErrorKind::MissingValue),
            }
            return;
        }
    }

    fn store(&mut self, name: &str, arg: &ArgSchema, raw: String) {
        match convert(arg, raw) {
            Ok(value) => self.set(name, arg, value),
            Err(kind) => self.fail(name, kind),
        }
    }

    fn set(&mut self, name: &str, arg: &ArgSchema, value: Value) {
        self.explicit.insert(name.to_string(), true);
        if arg.multiple {
            let slot = self
                .values
                .entry(name.to_string())
                .or_insert_with(|| Value::Array(Vec::new()));
            if let Value::Array(items) = slot {
                items.push(value);
            }
        } else {
            self.values.insert(name.to_string(), value);
        }
    }

    fn fail(&mut self, name: &str, kind: ArgErrorKind) {
        self.explicit.insert(name.to_string(), true);
        self.errors.push(ArgError::new(name, kind));
    }

    fn assign_positionals(&mut self) {
        let schema = self.schema;
        let mut remaining = self.positionals.clone().into_iter();
        for (name, arg) in schema.iter().filter(|(_, a)| a.kind == ArgKind::Positional) {
            if arg.multiple {
                let items: Vec<Value> = remaining.by_ref().map(Value::String).collect();
                if !items.is_empty() {
                    self.explicit.insert(name.to_string(), true);
                    self.values.insert(name.to_string(), Value::Array(items));
                }
            } else if let Some(value) = remaining.next() {
                self.set(name, arg, Value::String(value));
            }
        }
    }

    fn finish(mut self) -> ParsedArgs {
        self.assign_positionals();

        let schema = self.schema;
        for (name, arg) in schema.iter() {
            if self.explicit.get(name).copied().unwrap_or(false) {
                continue;
            }
            self.explicit.insert(name.to_string(), false);
            if let Some(default) = &arg.default {
                self.values.insert(name.to_string(), default.clone());
            } else if arg.required {
                self.errors.push(ArgError::new(name, ArgErrorKind::Required));
            }
        }

        let validation_error = if self.errors.is_empty() {
            None
        } else {
            Some(ValidationErrors(self.errors))
        };
        ParsedArgs {
            values: self.values,
            explicit: self.explicit,
            positionals: self.positionals,
            rest: self.rest,
            validation_error,
        }
    }
}

/// Consume the next token as a value unless it looks like another option.
fn take_value(raw: &RawArgs, cursor: &mut ArgCursor) -> Option<String> {
    let next = raw.peek(cursor)?;
    if is_option(&next) {
        return None;
    }
    raw.next_os(cursor).map(lossy)
}

fn is_option(arg: &ParsedArg<'_>) -> bool {
    arg.is_escape() || arg.is_long() || (arg.is_short() && !arg.is_negative_number())
}

fn lossy(os: &OsStr) -> String {
    os.to_string_lossy().into_owned()
}

fn convert(arg: &ArgSchema, raw: String) -> Result<Value, ArgErrorKind> {
    match &arg.kind {
        ArgKind::Number => {
            if let Ok(int) = raw.parse::<i64>() {
                return Ok(Value::from(int));
            }
            match raw.parse::<f64>() {
                Ok(float) if float.is_finite() => Ok(Value::from(float)),
                _ => Err(ArgErrorKind::InvalidNumber(raw)),
            }
        }
        ArgKind::Enum(choices) => {
            if choices.contains(&raw) {
                Ok(Value::String(raw))
            } else {
                Err(ArgErrorKind::InvalidChoice {
                    value: raw,
                    allowed: choices.clone(),
                })
            }
        }
        ArgKind::Boolean => Ok(Value::Bool(raw != "false")),
        ArgKind::String | ArgKind::Positional => Ok(Value::String(raw)),
    }
}
