//! Declared parameter types and the resolved argument values handed to handlers.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{ArgumentError, Console};

/// Ambient type name of the console preset.
pub const CONSOLE_TYPE: &str = "console";

/// Semantic type a parameter declares.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclaredType {
    Bool,
    Int,
    Float,
    Char,
    Str,
    List(Box<DeclaredType>),
    Array(Box<DeclaredType>),
    Set(Box<DeclaredType>),
    /// String keys mapped to values of the element type.
    Map(Box<DeclaredType>),
    /// Supplied by the dispatcher (console, session, ...) rather than by text.
    Ambient(String),
    /// Resolved by a registered coercer or the form filler.
    Custom(String),
}

impl DeclaredType {
    pub fn list(element: DeclaredType) -> Self {
        Self::List(Box::new(element))
    }

    pub fn array(element: DeclaredType) -> Self {
        Self::Array(Box::new(element))
    }

    pub fn set(element: DeclaredType) -> Self {
        Self::Set(Box::new(element))
    }

    pub fn map(element: DeclaredType) -> Self {
        Self::Map(Box::new(element))
    }

    pub fn console() -> Self {
        Self::Ambient(CONSOLE_TYPE.to_string())
    }

    /// Element type of a collection.
    pub fn element(&self) -> Option<&DeclaredType> {
        match self {
            Self::List(element) | Self::Array(element) | Self::Set(element) | Self::Map(element) => Some(element),
            _ => None,
        }
    }

    pub fn is_collection(&self) -> bool {
        self.element().is_some()
    }

    pub fn is_bool(&self) -> bool {
        matches!(self, Self::Bool)
    }

    /// Value used when an optional parameter is absent and has no default.
    pub fn zero_value(&self) -> ArgValue {
        match self {
            Self::Bool => ArgValue::Bool(false),
            Self::Int => ArgValue::Int(0),
            Self::Float => ArgValue::Float(0.0),
            Self::Char => ArgValue::Char('\0'),
            _ => ArgValue::Null,
        }
    }
}

impl fmt::Display for DeclaredType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool => f.write_str("bool"),
            Self::Int => f.write_str("int"),
            Self::Float => f.write_str("float"),
            Self::Char => f.write_str("char"),
            Self::Str => f.write_str("string"),
            Self::List(element) => write!(f, "list<{element}>"),
            Self::Array(element) => write!(f, "array<{element}>"),
            Self::Set(element) => write!(f, "set<{element}>"),
            Self::Map(element) => write!(f, "map<string, {element}>"),
            Self::Ambient(name) | Self::Custom(name) => f.write_str(name),
        }
    }
}

/// Opaque preset value such as a session handle.
#[derive(Clone)]
pub struct AmbientValue(Arc<dyn Any + Send + Sync>);

impl AmbientValue {
    pub fn new<T: Any + Send + Sync>(value: Arc<T>) -> Self {
        Self(value)
    }

    /// The shared value, when it is a `T`.
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.0).downcast::<T>().ok()
    }
}

impl fmt::Debug for AmbientValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AmbientValue(..)")
    }
}

/// A resolved call argument.
#[derive(Debug, Clone)]
pub enum ArgValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Char(char),
    Str(String),
    List(Vec<ArgValue>),
    /// Insertion-ordered, without duplicates.
    Set(Vec<ArgValue>),
    Map(IndexMap<String, ArgValue>),
    /// Composite built by a custom coercer or the form filler.
    Object(Value),
    Console(Console),
    Ambient(AmbientValue),
}

impl ArgValue {
    /// Short name of the variant, used in type mismatch messages.
    pub fn type_label(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Char(_) => "char",
            Self::Str(_) => "string",
            Self::List(_) => "list",
            Self::Set(_) => "set",
            Self::Map(_) => "map",
            Self::Object(_) => "object",
            Self::Console(_) => "console",
            Self::Ambient(_) => "ambient",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            _ => None,
        }
    }

    /// Floats, with ints widened.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(value) => Some(*value),
            Self::Int(value) => Some(*value as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(value) => Some(value),
            _ => None,
        }
    }

    /// Elements of a list or set.
    pub fn as_slice(&self) -> Option<&[ArgValue]> {
        match self {
            Self::List(items) | Self::Set(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&IndexMap<String, ArgValue>> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_console(&self) -> Option<&Console> {
        match self {
            Self::Console(console) => Some(console),
            _ => None,
        }
    }

    /// JSON rendering; console and ambient handles become `null`.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Null | Self::Console(_) | Self::Ambient(_) => Value::Null,
            Self::Bool(value) => Value::Bool(*value),
            Self::Int(value) => Value::from(*value),
            Self::Float(value) => serde_json::Number::from_f64(*value).map_or(Value::Null, Value::Number),
            Self::Char(value) => Value::String(value.to_string()),
            Self::Str(value) => Value::String(value.clone()),
            Self::List(items) | Self::Set(items) => Value::Array(items.iter().map(ArgValue::to_json).collect()),
            Self::Map(map) => Value::Object(map.iter().map(|(key, value)| (key.clone(), value.to_json())).collect()),
            Self::Object(value) => value.clone(),
        }
    }
}

impl PartialEq for ArgValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(left), Self::Bool(right)) => left == right,
            (Self::Int(left), Self::Int(right)) => left == right,
            (Self::Float(left), Self::Float(right)) => left == right,
            (Self::Char(left), Self::Char(right)) => left == right,
            (Self::Str(left), Self::Str(right)) => left == right,
            (Self::List(left), Self::List(right)) | (Self::Set(left), Self::Set(right)) => left == right,
            (Self::Map(left), Self::Map(right)) => left == right,
            (Self::Object(left), Self::Object(right)) => left == right,
            (Self::Console(left), Self::Console(right)) => left.same_sink(right),
            (Self::Ambient(left), Self::Ambient(right)) => Arc::ptr_eq(&left.0, &right.0),
            _ => false,
        }
    }
}

impl From<bool> for ArgValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for ArgValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for ArgValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for ArgValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for ArgValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<Console> for ArgValue {
    fn from(console: Console) -> Self {
        Self::Console(console)
    }
}

/// Ordered arguments passed to a command handler, with typed accessors.
#[derive(Debug, Clone)]
pub struct Arguments {
    command: String,
    values: Vec<ArgValue>,
}

impl Arguments {
    pub fn new(command: impl Into<String>, values: Vec<ArgValue>) -> Self {
        Self {
            command: command.into(),
            values,
        }
    }

    /// Name of the command being invoked.
    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ArgValue> {
        self.values.get(index)
    }

    pub fn values(&self) -> &[ArgValue] {
        &self.values
    }

    pub fn into_values(self) -> Vec<ArgValue> {
        self.values
    }

    pub fn bool(&self, index: usize) -> Result<bool, ArgumentError> {
        self.typed(index, "bool", ArgValue::as_bool)
    }

    pub fn int(&self, index: usize) -> Result<i64, ArgumentError> {
        self.typed(index, "int", ArgValue::as_int)
    }

    pub fn float(&self, index: usize) -> Result<f64, ArgumentError> {
        self.typed(index, "float", ArgValue::as_float)
    }

    /// String argument at `index`.
    ///
    /// # Errors
    ///
    /// `ArgumentError` when the slot is missing or holds another type.
    pub fn str(&self, index: usize) -> Result<&str, ArgumentError> {
        self.typed(index, "string", ArgValue::as_str)
    }

    /// String argument that may be absent (`null`).
    pub fn opt_str(&self, index: usize) -> Result<Option<&str>, ArgumentError> {
        match self.value(index)? {
            ArgValue::Null => Ok(None),
            other => other.as_str().map(Some).ok_or_else(|| self.mismatch(index, "string", other)),
        }
    }

    pub fn list(&self, index: usize) -> Result<&[ArgValue], ArgumentError> {
        self.typed(index, "list", ArgValue::as_slice)
    }

    pub fn map(&self, index: usize) -> Result<&IndexMap<String, ArgValue>, ArgumentError> {
        self.typed(index, "map", ArgValue::as_map)
    }

    pub fn console(&self, index: usize) -> Result<&Console, ArgumentError> {
        self.typed(index, "console", ArgValue::as_console)
    }

    /// Downcast an ambient preset argument.
    pub fn ambient<T: Any + Send + Sync>(&self, index: usize) -> Result<Arc<T>, ArgumentError> {
        match self.value(index)? {
            ArgValue::Ambient(ambient) => ambient.downcast::<T>().ok_or_else(|| ArgumentError::TypeMismatch {
                command: self.command.clone(),
                index,
                expected: "ambient",
                found: "ambient of another type",
            }),
            other => Err(self.mismatch(index, "ambient", other)),
        }
    }

    fn value(&self, index: usize) -> Result<&ArgValue, ArgumentError> {
        self.values.get(index).ok_or_else(|| ArgumentError::Missing {
            command: self.command.clone(),
            index,
        })
    }

    fn typed<'a, T>(
        &'a self,
        index: usize,
        expected: &'static str,
        extract: impl FnOnce(&'a ArgValue) -> Option<T>,
    ) -> Result<T, ArgumentError> {
        let value = self.value(index)?;
        extract(value).ok_or_else(|| self.mismatch(index, expected, value))
    }

    fn mismatch(&self, index: usize, expected: &'static str, found: &ArgValue) -> ArgumentError {
        ArgumentError::TypeMismatch {
            command: self.command.clone(),
            index,
            expected,
            found: found.type_label(),
        }
    }
}
