//! The dispatch state machine.
//!
//! `ExtractCommandName → SubstitutePlaceholders → LookupDescriptor →
//! RunFilterChain → ParseParameters → Invoke → RecordHistory`
//!
//! A filter rejection or a parse failure skips `Invoke` and goes straight to
//! `RecordHistory`. Every outcome, including a panicking handler, ends up as an
//! [`InvocationRecord`] in the caller's session.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Instant;

use parley_registry::{CoercionRegistry, CommandRegistry, ParseContext};
use parley_types::{
    ArgValue, Arguments, CommandDescriptor, Console, DeclaredType, DispatchFailure, FilterRequest, Handler, InvocationRecord,
    ParameterResolveFailure,
};
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::resolve::substitute;
use crate::session::SessionContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ExtractCommandName,
    SubstitutePlaceholders,
    LookupDescriptor,
    RunFilterChain,
    ParseParameters,
    Invoke,
    RecordHistory,
}

/// Everything a dispatch needs besides the caller's session and console.
pub struct Dispatcher {
    registry: CommandRegistry,
    coercion: CoercionRegistry,
    presets: HashMap<String, ArgValue>,
}

impl Dispatcher {
    /// Dispatcher over a finished registry. `presets` maps ambient type names to values.
    pub fn new(registry: CommandRegistry, coercion: CoercionRegistry, presets: HashMap<String, ArgValue>) -> Self {
        Self {
            registry,
            coercion,
            presets,
        }
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    pub fn coercion(&self) -> &CoercionRegistry {
        &self.coercion
    }

    /// Dispatch one line in `session`, writing console output to `console`.
    ///
    /// Blank lines are ignored and produce no record.
    pub fn dispatch(&self, session: &SessionContext, line: &str, console: &Console) -> Option<InvocationRecord> {
        trace!(stage = ?Stage::ExtractCommandName);
        let (name, rest) = split_command(line)?;
        let started = Instant::now();

        trace!(stage = ?Stage::SubstitutePlaceholders);
        let raw_args = substitute(rest, |variable| session.variable(variable));

        trace!(stage = ?Stage::LookupDescriptor, command = name);
        let descriptor = self.registry.find(name);
        if self.registry.is_noop(&descriptor) {
            debug!(command = name, "unknown command; dispatching no-op");
        }

        let outcome = self.run(session, &descriptor, name, &raw_args, console);
        let record = InvocationRecord::new(name, raw_args).complete(outcome, started.elapsed());
        Some(self.record(session, record))
    }

    /// Call a command with already-typed arguments, skipping parsing.
    ///
    /// Filters still run; they see the arguments rendered as JSON text.
    pub fn invoke(&self, session: &SessionContext, name: &str, values: Vec<ArgValue>) -> InvocationRecord {
        let started = Instant::now();
        let raw_args = values
            .iter()
            .map(|value| match value.to_json() {
                Value::String(text) => text,
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join(" ");
        let descriptor = self.registry.find(name);
        let command = self.command_name(&descriptor, name);

        let outcome = self
            .run_filters(session, command, &raw_args)
            .and_then(|()| invoke_handler(&descriptor, command, values));
        let record = InvocationRecord::new(name, raw_args).complete(outcome, started.elapsed());
        self.record(session, record)
    }

    fn run(
        &self,
        session: &SessionContext,
        descriptor: &Arc<CommandDescriptor>,
        name: &str,
        raw_args: &str,
        console: &Console,
    ) -> Result<Value, DispatchFailure> {
        let command = self.command_name(descriptor, name);
        self.run_filters(session, command, raw_args)?;

        trace!(stage = ?Stage::ParseParameters, strategy = %descriptor.strategy);
        let parser = self
            .registry
            .parser_for(descriptor)
            .ok_or_else(|| ParameterResolveFailure::StrategyMismatch {
                strategy: descriptor.strategy.clone(),
                reason: "strategy is not registered".to_string(),
            })?;
        let presets = |declared: &DeclaredType| self.preset(declared, console);
        let values = parser.parse(&descriptor.parameters, raw_args, &ParseContext::new(&self.coercion, &presets))?;

        invoke_handler(descriptor, command, values)
    }

    fn run_filters(&self, session: &SessionContext, command: &str, raw_args: &str) -> Result<(), DispatchFailure> {
        trace!(stage = ?Stage::RunFilterChain, command);
        let label = session.label();
        let request = FilterRequest {
            command,
            raw_args,
            session: &label,
        };
        self.registry.run_filters(&request).inspect_err(|failure| {
            debug!(command, failure = %failure, "filter chain rejected dispatch");
        })
    }

    fn record(&self, session: &SessionContext, record: InvocationRecord) -> InvocationRecord {
        trace!(stage = ?Stage::RecordHistory, command = %record.command, success = record.success);
        if let Some(failure) = &record.failure {
            debug!(command = %record.command, kind = failure.kind(), failure = %failure, "dispatch failed");
        }
        session.push_record(record.clone());
        record
    }

    /// Canonical command name; the typed name for unknown commands.
    fn command_name<'a>(&self, descriptor: &'a Arc<CommandDescriptor>, typed: &'a str) -> &'a str {
        if self.registry.is_noop(descriptor) { typed } else { &descriptor.name }
    }

    fn preset(&self, declared: &DeclaredType, console: &Console) -> Option<ArgValue> {
        match declared {
            DeclaredType::Ambient(name) if name == parley_types::CONSOLE_TYPE => Some(ArgValue::Console(console.clone())),
            DeclaredType::Ambient(name) => self.presets.get(name).cloned(),
            _ => None,
        }
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("commands", &self.registry.len())
            .field("presets", &self.presets.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Split a line into its command name and the remaining argument text.
///
/// Only the whitespace before and after the name is dropped; the argument
/// text keeps its trailing characters.
fn split_command(line: &str) -> Option<(&str, &str)> {
    let line = line.trim_start();
    if line.trim_end().is_empty() {
        return None;
    }
    Some(match line.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim_start()),
        None => (line, ""),
    })
}

fn invoke_handler(descriptor: &CommandDescriptor, command: &str, values: Vec<ArgValue>) -> Result<Value, DispatchFailure> {
    trace!(stage = ?Stage::Invoke, command);
    let Handler::Command(handler) = &descriptor.handler else {
        return Ok(Value::Null);
    };
    let arguments = Arguments::new(command, values);
    match catch_unwind(AssertUnwindSafe(|| handler(&arguments))) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(error)) => Err(DispatchFailure::handler(command, &error)),
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            warn!(command, panic = %message, "handler panicked");
            Err(DispatchFailure::HandlerInvocation {
                command: command.to_string(),
                message: format!("panicked: {message}"),
                detail: String::new(),
            })
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        return (*message).to_string();
    }
    if let Some(message) = payload.downcast_ref::<String>() {
        return message.clone();
    }
    "unknown panic payload".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionKey;
    use parley_types::{ParameterDescriptor, RAW_STRATEGY};

    #[test]
    fn command_name_is_split_from_arguments() {
        assert_eq!(split_command("  add  1 2 "), Some(("add", "1 2 ")));
        assert_eq!(split_command("ls  "), Some(("ls", "")));
        assert_eq!(split_command("ls"), Some(("ls", "")));
        assert_eq!(split_command("echo\thi"), Some(("echo", "hi")));
        assert_eq!(split_command("   "), None);
    }

    #[test]
    fn panic_payloads_become_messages() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
    }

    #[test]
    fn raw_commands_keep_trailing_whitespace() {
        let mut registry = CommandRegistry::new();
        registry.register(
            CommandDescriptor::command("say", |args| Ok(Value::String(args.str(0)?.to_string())))
                .strategy(RAW_STRATEGY)
                .param(ParameterDescriptor::positional("text", DeclaredType::Str)),
        );
        let dispatcher = Dispatcher::new(registry, CoercionRegistry::new(), HashMap::new());
        let session = SessionContext::new(SessionKey::named("t"), 5);
        let record = dispatcher.dispatch(&session, "  say  padded  ", &Console::stdout()).unwrap();
        assert_eq!(record.result, Value::String("padded  ".to_string()));
        assert_eq!(record.raw_args, "padded  ");
    }

    #[test]
    fn unknown_command_records_success() {
        let dispatcher = Dispatcher::new(CommandRegistry::new(), CoercionRegistry::new(), HashMap::new());
        let session = SessionContext::new(SessionKey::named("t"), 5);
        let record = dispatcher.dispatch(&session, "nope --flag 1", &Console::stdout()).unwrap();
        assert!(record.success);
        assert_eq!(record.command, "nope");
        assert_eq!(record.result, Value::Null);
        assert_eq!(session.history_len(), 1);
    }
}
