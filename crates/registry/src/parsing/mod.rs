//! Parameter parsing strategies.
//!
//! A strategy turns the raw argument text of one invocation into the ordered
//! list of handler arguments. Every strategy is validated against a
//! descriptor's parameters when the descriptor is registered, so a mismatch is
//! reported once instead of on every call.
//!
//! Built-in strategies:
//! - `default`: short/long flags, bundled booleans, joint parameters, backfill
//! - `positional`: bare `name value` pairs
//! - `raw`: the whole argument string as one value
//! - `collection`: bracketed list, set and map literals

mod collection;
mod flags;
mod positional;
mod raw;
mod resolve;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

pub use collection::CollectionParser;
pub use flags::FlagParser;
pub use positional::PositionalParser;
pub use raw::RawParser;

use parley_types::{
    ArgValue, COLLECTION_STRATEGY, DEFAULT_STRATEGY, DeclaredType, POSITIONAL_STRATEGY, ParameterDescriptor, ParseOutcome, RAW_STRATEGY,
};

use crate::coercion::CoercionRegistry;

/// Supplies values for ambient parameter types, such as the console.
pub trait PresetSource {
    fn preset(&self, declared: &DeclaredType) -> Option<ArgValue>;
}

impl<F> PresetSource for F
where
    F: Fn(&DeclaredType) -> Option<ArgValue>,
{
    fn preset(&self, declared: &DeclaredType) -> Option<ArgValue> {
        self(declared)
    }
}

/// Preset source that never supplies anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPresets;

impl PresetSource for NoPresets {
    fn preset(&self, _declared: &DeclaredType) -> Option<ArgValue> {
        None
    }
}

/// Collaborators available to a strategy while parsing one invocation.
pub struct ParseContext<'a> {
    pub coercion: &'a CoercionRegistry,
    pub presets: &'a dyn PresetSource,
}

impl<'a> ParseContext<'a> {
    /// Bundles the coercion rules and ambient presets a strategy parses with.
    pub fn new(coercion: &'a CoercionRegistry, presets: &'a dyn PresetSource) -> Self {
        Self { coercion, presets }
    }

    pub(crate) fn preset_for(&self, parameter: &ParameterDescriptor) -> Option<ArgValue> {
        match parameter.declared_type {
            DeclaredType::Ambient(_) => self.presets.preset(&parameter.declared_type),
            _ => None,
        }
    }
}

/// A pluggable parameter parsing strategy.
pub trait ParameterParser: Send + Sync {
    /// Check that `parameters` can be served by this strategy.
    ///
    /// Returns a human-readable reason on mismatch.
    fn validate(&self, parameters: &[ParameterDescriptor]) -> Result<(), String>;

    /// Parse `raw` into one value per parameter, in declaration order.
    fn parse(&self, parameters: &[ParameterDescriptor], raw: &str, context: &ParseContext<'_>) -> ParseOutcome;
}

/// Strategies keyed by identifier.
#[derive(Clone)]
pub struct ParserSet {
    parsers: HashMap<String, Arc<dyn ParameterParser>>,
}

impl ParserSet {
    /// A set with no strategies, for embedders that register their own.
    pub fn empty() -> Self {
        Self { parsers: HashMap::new() }
    }

    /// The four built-in strategies.
    pub fn builtin() -> Self {
        let mut set = Self::empty();
        set.insert(DEFAULT_STRATEGY, FlagParser);
        set.insert(POSITIONAL_STRATEGY, PositionalParser);
        set.insert(RAW_STRATEGY, RawParser);
        set.insert(COLLECTION_STRATEGY, CollectionParser);
        set
    }

    /// Registers `parser` under `id`, replacing any strategy already there.
    ///
    /// # Arguments
    ///
    /// - `id` - identifier descriptors name in their `strategy` field
    /// - `parser` - the strategy implementation
    pub fn insert(&mut self, id: impl Into<String>, parser: impl ParameterParser + 'static) {
        self.parsers.insert(id.into(), Arc::new(parser));
    }

    /// The strategy registered under `id`.
    pub fn get(&self, id: &str) -> Option<Arc<dyn ParameterParser>> {
        self.parsers.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.parsers.contains_key(id)
    }

    /// Registered identifiers, sorted.
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.parsers.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

impl Default for ParserSet {
    fn default() -> Self {
        Self::builtin()
    }
}

impl fmt::Debug for ParserSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParserSet").field("ids", &self.ids()).finish()
    }
}

/// Shared validation: flags and long names must be unique, at most one joint parameter.
pub(crate) fn validate_flags(parameters: &[ParameterDescriptor]) -> Result<(), String> {
    let mut shorts = Vec::new();
    let mut longs = Vec::new();
    for parameter in parameters {
        if let Some(short) = parameter.short {
            if shorts.contains(&short) {
                return Err(format!("short flag -{short} is declared twice"));
            }
            shorts.push(short);
        }
        if let Some(long) = parameter.long.as_deref() {
            if longs.contains(&long) {
                return Err(format!("long flag --{long} is declared twice"));
            }
            longs.push(long);
        }
    }
    if parameters.iter().filter(|parameter| parameter.joint).count() > 1 {
        return Err("at most one joint parameter is allowed".to_string());
    }
    Ok(())
}
