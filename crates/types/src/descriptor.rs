//! Command and parameter descriptors.
//!
//! A [`CommandDescriptor`] is built once at registration and shared immutably
//! afterwards. Its [`Handler`] is a tagged union over the four descriptor kinds.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Arguments, DeclaredType};

/// Flag-based parsing (`-a`, `--all value`, bundles, joint).
pub const DEFAULT_STRATEGY: &str = "default";
/// Name-value pairs without dash prefixes.
pub const POSITIONAL_STRATEGY: &str = "positional";
/// Whole argument string passed to a single string parameter.
pub const RAW_STRATEGY: &str = "raw";
/// Bracketed `[..]`, `(..)`, `{..}` literals for collection parameters.
pub const COLLECTION_STRATEGY: &str = "collection";

/// Command body: typed arguments in, JSON result out.
pub type CommandFn = Arc<dyn Fn(&Arguments) -> anyhow::Result<Value> + Send + Sync>;
/// Filter check: `Ok(false)` rejects the invocation.
pub type FilterFn = Arc<dyn Fn(&FilterRequest<'_>) -> anyhow::Result<bool> + Send + Sync>;
pub type LifecycleFn = Arc<dyn Fn() -> anyhow::Result<()> + Send + Sync>;

/// What a filter sees about the line being dispatched.
#[derive(Debug, Clone, Copy)]
pub struct FilterRequest<'a> {
    pub command: &'a str,
    /// Argument text after placeholder substitution.
    pub raw_args: &'a str,
    /// Label of the calling session.
    pub session: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DescriptorKind {
    Command,
    Filter,
    Init,
    Destroy,
}

/// Bound callable for each descriptor kind.
#[derive(Clone)]
pub enum Handler {
    Command(CommandFn),
    Filter {
        check: FilterFn,
        /// Shown to the caller when `check` returns `false`.
        rejection: String,
        /// Commands the filter applies to; empty means every command.
        scope: Vec<String>,
    },
    Init(LifecycleFn),
    Destroy(LifecycleFn),
}

impl Handler {
    pub fn kind(&self) -> DescriptorKind {
        match self {
            Self::Command(_) => DescriptorKind::Command,
            Self::Filter { .. } => DescriptorKind::Filter,
            Self::Init(_) => DescriptorKind::Init,
            Self::Destroy(_) => DescriptorKind::Destroy,
        }
    }
}

/// Metadata for one handler parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDescriptor {
    /// Position in the handler's parameter list, assigned on registration.
    #[serde(default)]
    pub index: usize,
    /// Display name for flagless parameters.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub short: Option<char>,
    #[serde(default)]
    pub long: Option<String>,
    #[serde(default)]
    pub required: bool,
    /// Literal coerced when the parameter is absent.
    #[serde(default)]
    pub default_value: Option<String>,
    /// Absorbs every remaining token as one space-joined value.
    #[serde(default)]
    pub joint: bool,
    pub declared_type: DeclaredType,
    #[serde(default)]
    pub description: Option<String>,
}

impl ParameterDescriptor {
    pub fn new(declared_type: DeclaredType) -> Self {
        Self {
            index: 0,
            name: None,
            short: None,
            long: None,
            required: false,
            default_value: None,
            joint: false,
            declared_type,
            description: None,
        }
    }

    /// Flagless parameter filled from leftover tokens.
    pub fn positional(name: impl Into<String>, declared_type: DeclaredType) -> Self {
        Self::new(declared_type).named(name)
    }

    /// Parameter bound to `--long`.
    pub fn flag(long: impl Into<String>, declared_type: DeclaredType) -> Self {
        Self::new(declared_type).long(long)
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn short(mut self, short: char) -> Self {
        self.short = Some(short);
        self
    }

    pub fn long(mut self, long: impl Into<String>) -> Self {
        self.long = Some(long.into());
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn default_value(mut self, literal: impl Into<String>) -> Self {
        self.default_value = Some(literal.into());
        self
    }

    pub fn joint(mut self) -> Self {
        self.joint = true;
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Whether the parameter is addressed by `-s` or `--long`.
    pub fn has_flag(&self) -> bool {
        self.short.is_some() || self.long.is_some()
    }

    /// Whether `name` is this parameter's long name or its short letter.
    pub fn answers_to(&self, name: &str) -> bool {
        if self.long.as_deref() == Some(name) {
            return true;
        }
        let mut chars = name.chars();
        matches!((self.short, chars.next(), chars.next()), (Some(short), Some(first), None) if short == first)
    }

    pub fn element_type(&self) -> Option<&DeclaredType> {
        self.declared_type.element()
    }

    /// Human-readable reference used in failure messages.
    pub fn label(&self) -> String {
        match (&self.long, self.short, &self.name) {
            (Some(long), _, _) => format!("--{long}"),
            (None, Some(short), _) => format!("-{short}"),
            (None, None, Some(name)) => name.clone(),
            (None, None, None) => format!("#{}", self.index),
        }
    }
}

/// A registered command, filter, init or destroy handler.
#[derive(Clone)]
pub struct CommandDescriptor {
    pub name: String,
    pub aliases: Vec<String>,
    pub category: String,
    /// Ordering key for filters, init and destroy handlers (ascending).
    pub priority: i32,
    /// Identifier of the parameter parsing strategy.
    pub strategy: String,
    pub parameters: Vec<ParameterDescriptor>,
    pub description: Option<String>,
    pub handler: Handler,
}

impl CommandDescriptor {
    fn with_handler(name: impl Into<String>, handler: Handler) -> Self {
        Self {
            name: name.into(),
            aliases: Vec::new(),
            category: "default".to_string(),
            priority: 0,
            strategy: DEFAULT_STRATEGY.to_string(),
            parameters: Vec::new(),
            description: None,
            handler,
        }
    }

    /// A command with the default strategy and category.
    pub fn command<F>(name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&Arguments) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        Self::with_handler(name, Handler::Command(Arc::new(handler)))
    }

    /// A filter guarding every command until narrowed with [`applies_to`](Self::applies_to).
    ///
    /// `rejection` is the reason recorded when `check` returns `false`.
    pub fn filter<F>(name: impl Into<String>, rejection: impl Into<String>, check: F) -> Self
    where
        F: Fn(&FilterRequest<'_>) -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        Self::with_handler(
            name,
            Handler::Filter {
                check: Arc::new(check),
                rejection: rejection.into(),
                scope: Vec::new(),
            },
        )
    }

    pub fn init<F>(name: impl Into<String>, handler: F) -> Self
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self::with_handler(name, Handler::Init(Arc::new(handler)))
    }

    pub fn destroy<F>(name: impl Into<String>, handler: F) -> Self
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self::with_handler(name, Handler::Destroy(Arc::new(handler)))
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    /// Ordering among filters and lifecycle handlers; lower runs first.
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn strategy(mut self, strategy: impl Into<String>) -> Self {
        self.strategy = strategy.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Append a parameter; its index is its position in the list.
    pub fn param(mut self, mut parameter: ParameterDescriptor) -> Self {
        parameter.index = self.parameters.len();
        self.parameters.push(parameter);
        self
    }

    /// Restrict a filter to the named command. No effect on other kinds.
    pub fn applies_to(mut self, command: impl Into<String>) -> Self {
        if let Handler::Filter { scope, .. } = &mut self.handler {
            scope.push(command.into());
        }
        self
    }

    pub fn kind(&self) -> DescriptorKind {
        self.handler.kind()
    }

    /// Whether a filter covers `command`. Always `false` for other kinds.
    pub fn filters(&self, command: &str) -> bool {
        match &self.handler {
            Handler::Filter { scope, .. } => scope.is_empty() || scope.iter().any(|name| name == command),
            _ => false,
        }
    }

    /// Parameter whose long or short flag is `name`, long names first.
    pub fn parameter_by_flag(&self, name: &str) -> Option<&ParameterDescriptor> {
        self.parameters
            .iter()
            .find(|parameter| parameter.long.as_deref() == Some(name))
            .or_else(|| self.parameters.iter().find(|parameter| parameter.answers_to(name)))
    }
}

impl fmt::Debug for CommandDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandDescriptor")
            .field("name", &self.name)
            .field("kind", &self.kind())
            .field("aliases", &self.aliases)
            .field("category", &self.category)
            .field("priority", &self.priority)
            .field("strategy", &self.strategy)
            .field("parameters", &self.parameters)
            .finish()
    }
}
