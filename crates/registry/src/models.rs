use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use parley_types::{
    CommandDescriptor, DescriptorKind, DestroyFailure, DispatchFailure, FilterRequest, Handler, InitializationFailure,
};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::parsing::{ParameterParser, ParserSet};

/// Name of the fallback descriptor returned for unknown commands.
pub const NOOP_COMMAND: &str = "noop";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
    #[error("{command}: unknown parsing strategy '{strategy}'")]
    UnknownStrategy { command: String, strategy: String },

    #[error("{command}: parameters do not fit the '{strategy}' strategy: {reason}")]
    StrategyMismatch {
        command: String,
        strategy: String,
        reason: String,
    },
}

/// Every registered command, filter, init and destroy descriptor, keyed by name.
///
/// Registering a name twice replaces the earlier descriptor. Lookups of
/// unknown names through [`CommandRegistry::find`] yield a no-op descriptor
/// instead of an error.
#[derive(Debug, Clone)]
pub struct CommandRegistry {
    entries: IndexMap<String, Arc<CommandDescriptor>>,
    aliases: HashMap<String, String>,
    parsers: ParserSet,
    noop: Arc<CommandDescriptor>,
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandRegistry {
    /// Creates an empty registry with the built-in parsing strategies.
    pub fn new() -> Self {
        Self::with_parsers(ParserSet::builtin())
    }

    /// Creates an empty registry that validates and parses with `parsers`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use parley_registry::{CommandRegistry, ParserSet, RawParser};
    ///
    /// let mut parsers = ParserSet::empty();
    /// parsers.insert("raw", RawParser);
    /// let registry = CommandRegistry::with_parsers(parsers);
    /// assert!(registry.is_empty());
    /// ```
    pub fn with_parsers(parsers: ParserSet) -> Self {
        let noop = CommandDescriptor::command(NOOP_COMMAND, |_| Ok(Value::Null)).description("Fallback for unknown commands");
        Self {
            entries: IndexMap::new(),
            aliases: HashMap::new(),
            parsers,
            noop: Arc::new(noop),
        }
    }

    /// Strategies available to registered commands.
    pub fn parsers(&self) -> &ParserSet {
        &self.parsers
    }

    /// Strategy that parses `descriptor`'s arguments.
    pub fn parser_for(&self, descriptor: &CommandDescriptor) -> Option<Arc<dyn ParameterParser>> {
        self.parsers.get(&descriptor.strategy)
    }

    /// Register a descriptor, validating its parameters against its strategy.
    pub fn try_register(&mut self, descriptor: CommandDescriptor) -> Result<(), RegistrationError> {
        if descriptor.kind() == DescriptorKind::Command {
            let parser = self
                .parsers
                .get(&descriptor.strategy)
                .ok_or_else(|| RegistrationError::UnknownStrategy {
                    command: descriptor.name.clone(),
                    strategy: descriptor.strategy.clone(),
                })?;
            parser
                .validate(&descriptor.parameters)
                .map_err(|reason| RegistrationError::StrategyMismatch {
                    command: descriptor.name.clone(),
                    strategy: descriptor.strategy.clone(),
                    reason,
                })?;
        }

        let name = descriptor.name.clone();
        if self.entries.shift_remove(&name).is_some() {
            debug!(name = %name, "replacing registered descriptor");
            self.aliases.retain(|_, target| *target != name);
        }
        for alias in &descriptor.aliases {
            self.aliases.insert(alias.clone(), name.clone());
        }
        debug!(name = %name, kind = ?descriptor.kind(), "registered descriptor");
        self.entries.insert(name, Arc::new(descriptor));
        Ok(())
    }

    /// Register a descriptor, logging and dropping it when it does not validate.
    pub fn register(&mut self, descriptor: CommandDescriptor) -> bool {
        match self.try_register(descriptor) {
            Ok(()) => true,
            Err(error) => {
                warn!(error = %error, "dropping descriptor");
                false
            }
        }
    }

    /// Registered descriptor named `name` (or aliased as `name`), of any kind.
    pub fn lookup(&self, name: &str) -> Option<Arc<CommandDescriptor>> {
        let canonical = self.aliases.get(name).map(String::as_str).unwrap_or(name);
        self.entries.get(canonical).cloned()
    }

    /// Command descriptor for `name`, or the no-op descriptor when there is none.
    pub fn find(&self, name: &str) -> Arc<CommandDescriptor> {
        match self.lookup(name) {
            Some(descriptor) if descriptor.kind() == DescriptorKind::Command => descriptor,
            _ => Arc::clone(&self.noop),
        }
    }

    /// Whether `descriptor` is the sentinel that [`find`](Self::find) returns for unknown names.
    pub fn is_noop(&self, descriptor: &Arc<CommandDescriptor>) -> bool {
        Arc::ptr_eq(descriptor, &self.noop)
    }

    /// Number of registered descriptors of every kind.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Command descriptors in registration order.
    pub fn commands(&self) -> impl Iterator<Item = &Arc<CommandDescriptor>> {
        self.entries.values().filter(|descriptor| descriptor.kind() == DescriptorKind::Command)
    }

    /// Distinct command categories in first-seen order.
    pub fn categories(&self) -> Vec<&str> {
        let mut categories: Vec<&str> = Vec::new();
        for descriptor in self.commands() {
            if !categories.contains(&descriptor.category.as_str()) {
                categories.push(&descriptor.category);
            }
        }
        categories
    }

    /// Descriptors of `kind` by ascending priority; ties keep registration order.
    pub fn by_priority(&self, kind: DescriptorKind) -> Vec<Arc<CommandDescriptor>> {
        let mut selected: Vec<_> = self.entries.values().filter(|descriptor| descriptor.kind() == kind).cloned().collect();
        selected.sort_by_key(|descriptor| descriptor.priority);
        selected
    }

    /// Filters covering `command`, in the order they run.
    pub fn filter_chain(&self, command: &str) -> Vec<Arc<CommandDescriptor>> {
        self.by_priority(DescriptorKind::Filter)
            .into_iter()
            .filter(|descriptor| descriptor.filters(command))
            .collect()
    }

    /// Run the filter chain for `request.command`, stopping at the first rejection.
    ///
    /// A filter that errors counts as a rejection carrying the error text.
    pub fn run_filters(&self, request: &FilterRequest<'_>) -> Result<(), DispatchFailure> {
        for descriptor in self.filter_chain(request.command) {
            let Handler::Filter { check, rejection, .. } = &descriptor.handler else {
                continue;
            };
            match check(request) {
                Ok(true) => {}
                Ok(false) => return Err(DispatchFailure::filter_rejection(&descriptor.name, rejection.clone())),
                Err(error) => return Err(DispatchFailure::filter_rejection(&descriptor.name, error.to_string())),
            }
        }
        Ok(())
    }

    /// Run every init handler by priority; the first failure aborts.
    pub fn init_all(&self) -> Result<(), InitializationFailure> {
        for descriptor in self.by_priority(DescriptorKind::Init) {
            let Handler::Init(handler) = &descriptor.handler else {
                continue;
            };
            info!(name = %descriptor.name, priority = descriptor.priority, "running init handler");
            handler().map_err(|error| InitializationFailure {
                name: descriptor.name.clone(),
                source: error.into(),
            })?;
        }
        Ok(())
    }

    /// Run every destroy handler by priority.
    ///
    /// Failures are logged and collected; the remaining handlers still run.
    pub fn destroy_all(&self) -> Vec<DestroyFailure> {
        let mut failures = Vec::new();
        for descriptor in self.by_priority(DescriptorKind::Destroy) {
            let Handler::Destroy(handler) = &descriptor.handler else {
                continue;
            };
            info!(name = %descriptor.name, priority = descriptor.priority, "running destroy handler");
            if let Err(error) = handler() {
                warn!(name = %descriptor.name, error = %error, "destroy handler failed");
                failures.push(DestroyFailure {
                    name: descriptor.name.clone(),
                    source: error.into(),
                });
            }
        }
        failures
    }
}
