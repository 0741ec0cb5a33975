//! Error taxonomy shared by the registry, the parsing pipeline and the interpreter.
//!
//! Failures that end up inside an [`InvocationRecord`](crate::InvocationRecord)
//! are `Clone` so records can be copied out of a session's history; the
//! lifecycle failures wrap the handler's error as their source instead.

use thiserror::Error;

/// Failure converting a string literal into a declared type.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CoercionError {
    #[error("'{literal}' is not a valid {expected}")]
    InvalidLiteral { expected: String, literal: String },

    #[error("a value is required for {expected}")]
    MissingValue { expected: String },

    #[error("no coercion registered for type {type_name}")]
    Unsupported { type_name: String },

    #[error("could not build {type_name}: {reason}")]
    Form { type_name: String, reason: String },
}

impl CoercionError {
    /// Create an invalid literal error.
    pub fn invalid(expected: impl Into<String>, literal: impl Into<String>) -> Self {
        Self::InvalidLiteral {
            expected: expected.into(),
            literal: literal.into(),
        }
    }

    /// Create a missing value error.
    pub fn missing(expected: impl Into<String>) -> Self {
        Self::MissingValue { expected: expected.into() }
    }

    /// Create an unsupported type error.
    pub fn unsupported(type_name: impl Into<String>) -> Self {
        Self::Unsupported { type_name: type_name.into() }
    }

    /// Create a form error, raised by form fillers that cannot build a value.
    pub fn form(type_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Form {
            type_name: type_name.into(),
            reason: reason.into(),
        }
    }
}

/// Failure turning a raw argument string into call arguments.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParameterResolveFailure {
    #[error("missing required parameter {parameter}")]
    LackRequired { parameter: String },

    #[error("invalid value for {parameter}: {source}")]
    Coercion {
        parameter: String,
        #[source]
        source: CoercionError,
    },

    #[error("incomplete command: no value for {parameter}")]
    IncompleteCommand { parameter: String },

    #[error("parser '{strategy}' cannot handle this command: {reason}")]
    StrategyMismatch { strategy: String, reason: String },
}

impl ParameterResolveFailure {
    /// Stable kind label used in history queries and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::LackRequired { .. } => "lack-required",
            Self::Coercion { .. } => "coercion-error",
            Self::IncompleteCommand { .. } => "incomplete-command",
            Self::StrategyMismatch { .. } => "strategy-mismatch",
        }
    }

    pub fn lack_required(parameter: impl Into<String>) -> Self {
        Self::LackRequired { parameter: parameter.into() }
    }

    pub fn coercion(parameter: impl Into<String>, source: CoercionError) -> Self {
        Self::Coercion {
            parameter: parameter.into(),
            source,
        }
    }

    pub fn incomplete(parameter: impl Into<String>) -> Self {
        Self::IncompleteCommand { parameter: parameter.into() }
    }
}

/// Failure recorded for a dispatched line.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DispatchFailure {
    #[error(transparent)]
    ParameterResolve(#[from] ParameterResolveFailure),

    #[error("rejected by filter {filter}: {reason}")]
    FilterRejection { filter: String, reason: String },

    #[error("{command} failed: {message}")]
    HandlerInvocation {
        command: String,
        message: String,
        /// Full error chain, shown only when failure detail is enabled.
        detail: String,
    },
}

impl DispatchFailure {
    /// Stable kind label used in history queries and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ParameterResolve(failure) => failure.kind(),
            Self::FilterRejection { .. } => "filter-rejection",
            Self::HandlerInvocation { .. } => "handler-failure",
        }
    }

    /// Extended diagnostic text, if the failure carries any.
    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::HandlerInvocation { detail, .. } if !detail.is_empty() => Some(detail),
            _ => None,
        }
    }

    pub fn filter_rejection(filter: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::FilterRejection {
            filter: filter.into(),
            reason: reason.into(),
        }
    }

    /// Wrap an error raised by a command handler.
    pub fn handler(command: impl Into<String>, error: &anyhow::Error) -> Self {
        Self::HandlerInvocation {
            command: command.into(),
            message: error.to_string(),
            detail: format!("{error:?}"),
        }
    }
}

/// An `Init` handler failed; startup must not continue.
#[derive(Debug, Error)]
#[error("init handler {name} failed: {source}")]
pub struct InitializationFailure {
    pub name: String,
    #[source]
    pub source: Box<dyn std::error::Error + Send + Sync>,
}

/// A `Destroy` handler failed; logged and collected, never fatal.
#[derive(Debug, Error)]
#[error("destroy handler {name} failed: {source}")]
pub struct DestroyFailure {
    pub name: String,
    #[source]
    pub source: Box<dyn std::error::Error + Send + Sync>,
}

/// Typed access to a handler argument failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ArgumentError {
    #[error("{command}: no argument at position {index}")]
    Missing { command: String, index: usize },

    #[error("{command}: argument {index} is {found}, expected {expected}")]
    TypeMismatch {
        command: String,
        index: usize,
        expected: &'static str,
        found: &'static str,
    },
}
