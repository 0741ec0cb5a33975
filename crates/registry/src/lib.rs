//! Command registry and parameter parsing for the Parley interpreter.
//!
//! This crate owns the process-wide descriptor map, the pluggable parsing
//! strategies that turn raw argument text into handler arguments, and the
//! per-type coercion rules those strategies share.

pub mod coercion;
pub mod models;
pub mod parsing;

pub use coercion::{CoerceFn, CoercionRegistry, CollectionLiteral, FormFiller, Literal};
pub use models::{CommandRegistry, NOOP_COMMAND, RegistrationError};
pub use parsing::{
    CollectionParser, FlagParser, NoPresets, ParameterParser, ParseContext, ParserSet, PositionalParser, PresetSource, RawParser,
};
