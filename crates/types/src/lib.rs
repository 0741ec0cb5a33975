//! Shared definitions for the Parley command interpreter.
//!
//! - [`descriptor`]: command, filter, init and destroy descriptors plus their parameters
//! - [`value`]: declared parameter types and resolved argument values
//! - [`record`]: the invocation record stored in session history
//! - [`error`]: the failure taxonomy used across crates
//! - [`console`]: the output handle given to handlers

pub mod console;
pub mod descriptor;
pub mod error;
pub mod record;
pub mod value;

pub use console::{Console, ConsoleSink};
pub use descriptor::{
    COLLECTION_STRATEGY, CommandDescriptor, CommandFn, DEFAULT_STRATEGY, DescriptorKind, FilterFn, FilterRequest, Handler, LifecycleFn,
    POSITIONAL_STRATEGY, ParameterDescriptor, RAW_STRATEGY,
};
pub use error::{ArgumentError, CoercionError, DestroyFailure, DispatchFailure, InitializationFailure, ParameterResolveFailure};
pub use record::InvocationRecord;
pub use value::{AmbientValue, ArgValue, Arguments, CONSOLE_TYPE, DeclaredType};

/// Result of running a parsing strategy.
pub type ParseOutcome = Result<Vec<ArgValue>, ParameterResolveFailure>;
