//! Type coercion registry: string literal → declared type.
//!
//! Scalars use locale-independent literal rules. Collections split a
//! comma-separated literal (optionally wrapped in a bracket pair) and coerce
//! each item with the element type. Anything else goes to a registered custom
//! coercer or, failing that, to the [`FormFiller`] collaborator.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use parley_types::{ArgValue, CoercionError, DeclaredType};
use parley_util::{Bracket, is_numeric_literal, parse_bool_literal, split_entry, split_items, strip_brackets};
use serde_json::Value;

/// Raw value found for a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Literal<'a> {
    /// Flag given without a value (`--verbose`).
    Present,
    Text(&'a str),
}

/// Custom coercion for one type name.
pub type CoerceFn = Arc<dyn Fn(&str) -> Result<ArgValue, CoercionError> + Send + Sync>;

/// Builds composite values for types without a coercion rule.
///
/// `literal` is `None` when the flag was given without a value, which lets an
/// interactive implementation prompt for every field. Fillers report values
/// they cannot assemble with [`CoercionError::form`].
pub trait FormFiller: Send + Sync {
    fn fill(&self, type_name: &str, literal: Option<&str>) -> Result<Value, CoercionError>;
}

/// Per-type coercion rules.
#[derive(Clone, Default)]
pub struct CoercionRegistry {
    custom: HashMap<String, CoerceFn>,
    form_filler: Option<Arc<dyn FormFiller>>,
}

impl CoercionRegistry {
    /// Built-in rules only, with no form filler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a coercer for the type whose display name is `type_name`.
    ///
    /// Custom coercers take precedence over the built-in rules.
    pub fn register<F>(&mut self, type_name: impl Into<String>, coerce: F)
    where
        F: Fn(&str) -> Result<ArgValue, CoercionError> + Send + Sync + 'static,
    {
        self.custom.insert(type_name.into(), Arc::new(coerce));
    }

    /// Routes custom types without a coercer to `filler`.
    pub fn set_form_filler(&mut self, filler: Arc<dyn FormFiller>) {
        self.form_filler = Some(filler);
    }

    pub fn with_form_filler(mut self, filler: Arc<dyn FormFiller>) -> Self {
        self.set_form_filler(filler);
        self
    }

    /// Converts `literal` into a value of `declared`.
    ///
    /// # Returns
    ///
    /// - `Ok(value)` - the typed value
    /// - `Err(MissingValue)` - a non-boolean type given as a bare flag
    /// - `Err(InvalidLiteral)` - text that does not parse as `declared`
    /// - `Err(Unsupported)` - a custom type with neither a coercer nor a form filler
    pub fn coerce(&self, declared: &DeclaredType, literal: Literal<'_>) -> Result<ArgValue, CoercionError> {
        if let Some(custom) = self.custom.get(&declared.to_string()) {
            return match literal {
                Literal::Text(text) => custom(text),
                Literal::Present => Err(CoercionError::missing(declared.to_string())),
            };
        }

        match (declared, literal) {
            (DeclaredType::Bool, Literal::Present) => Ok(ArgValue::Bool(true)),
            (DeclaredType::Custom(name), _) => self.fill_form(name, literal),
            (DeclaredType::Ambient(name), _) => Err(CoercionError::unsupported(name.clone())),
            (_, Literal::Present) => Err(CoercionError::missing(declared.to_string())),
            (_, Literal::Text(text)) => self.coerce_text(declared, text),
        }
    }

    /// Coerce a textual literal.
    pub fn coerce_str(&self, declared: &DeclaredType, text: &str) -> Result<ArgValue, CoercionError> {
        self.coerce(declared, Literal::Text(text))
    }

    fn coerce_text(&self, declared: &DeclaredType, text: &str) -> Result<ArgValue, CoercionError> {
        match declared {
            DeclaredType::Bool => parse_bool_literal(text)
                .map(ArgValue::Bool)
                .ok_or_else(|| CoercionError::invalid("bool", text)),
            DeclaredType::Int => text
                .trim()
                .parse::<i64>()
                .map(ArgValue::Int)
                .map_err(|_| CoercionError::invalid("int", text)),
            DeclaredType::Float => parse_float(text).map(ArgValue::Float),
            DeclaredType::Char => {
                let mut chars = text.chars();
                match (chars.next(), chars.next()) {
                    (Some(character), None) => Ok(ArgValue::Char(character)),
                    _ => Err(CoercionError::invalid("char", text)),
                }
            }
            DeclaredType::Str => Ok(ArgValue::Str(text.to_string())),
            DeclaredType::List(_) | DeclaredType::Array(_) | DeclaredType::Set(_) | DeclaredType::Map(_) => {
                CollectionLiteral::from_text(text, declared).convert(declared, self)
            }
            DeclaredType::Ambient(name) => Err(CoercionError::unsupported(name.clone())),
            DeclaredType::Custom(name) => self.fill_form(name, Literal::Text(text)),
        }
    }

    fn fill_form(&self, type_name: &str, literal: Literal<'_>) -> Result<ArgValue, CoercionError> {
        let filler = self
            .form_filler
            .as_ref()
            .ok_or_else(|| CoercionError::unsupported(type_name))?;
        let literal = match literal {
            Literal::Present => None,
            Literal::Text(text) => Some(text),
        };
        match filler.fill(type_name, literal)? {
            Value::Null => Err(CoercionError::form(type_name, "no value was produced")),
            value => Ok(ArgValue::Object(value)),
        }
    }
}

impl fmt::Debug for CoercionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoercionRegistry")
            .field("custom", &self.custom.keys().collect::<Vec<_>>())
            .field("form_filler", &self.form_filler.is_some())
            .finish()
    }
}

fn parse_float(text: &str) -> Result<f64, CoercionError> {
    let trimmed = text.trim();
    if !is_numeric_literal(trimmed) {
        return Err(CoercionError::invalid("float", text));
    }
    trimmed.parse::<f64>().map_err(|_| CoercionError::invalid("float", text))
}

/// A parsed collection literal.
///
/// The same typed conversions are available whatever bracket the literal was
/// written with; for `{..}` literals the list-like conversions use the values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionLiteral {
    bracket: Bracket,
    items: Vec<String>,
}

impl CollectionLiteral {
    pub fn new(bracket: Bracket, inner: &str) -> Self {
        Self {
            bracket,
            items: split_items(inner),
        }
    }

    /// Parse `text`, with or without its surrounding brackets.
    ///
    /// Unbracketed text takes the bracket kind implied by `declared`.
    pub fn from_text(text: &str, declared: &DeclaredType) -> Self {
        match strip_brackets(text) {
            Some((bracket, inner)) => Self::new(bracket, inner),
            None => {
                let bracket = match declared {
                    DeclaredType::Set(_) => Bracket::Round,
                    DeclaredType::Map(_) => Bracket::Curly,
                    _ => Bracket::Square,
                };
                Self::new(bracket, text)
            }
        }
    }

    pub fn bracket(&self) -> Bracket {
        self.bracket
    }

    /// Unquoted items in source order.
    pub fn items(&self) -> &[String] {
        &self.items
    }

    /// Convert to whichever collection `declared` names.
    pub fn convert(&self, declared: &DeclaredType, coercion: &CoercionRegistry) -> Result<ArgValue, CoercionError> {
        match declared {
            DeclaredType::List(element) => self.to_list(element, coercion),
            DeclaredType::Array(element) => self.to_array(element, coercion),
            DeclaredType::Set(element) => self.to_set(element, coercion),
            DeclaredType::Map(element) => self.to_map(element, coercion),
            other => Err(CoercionError::invalid(other.to_string(), self.items.join(","))),
        }
    }

    /// Coerces every item with `element`, keeping order.
    pub fn to_list(&self, element: &DeclaredType, coercion: &CoercionRegistry) -> Result<ArgValue, CoercionError> {
        self.element_values(element, coercion).map(ArgValue::List)
    }

    /// Arrays share the list representation.
    pub fn to_array(&self, element: &DeclaredType, coercion: &CoercionRegistry) -> Result<ArgValue, CoercionError> {
        self.to_list(element, coercion)
    }

    /// Like [`to_list`](Self::to_list), keeping only the first of equal values.
    pub fn to_set(&self, element: &DeclaredType, coercion: &CoercionRegistry) -> Result<ArgValue, CoercionError> {
        let mut unique: Vec<ArgValue> = Vec::new();
        for value in self.element_values(element, coercion)? {
            if !unique.contains(&value) {
                unique.push(value);
            }
        }
        Ok(ArgValue::Set(unique))
    }

    /// Parses `key:value` items, coercing each value with `element`.
    pub fn to_map(&self, element: &DeclaredType, coercion: &CoercionRegistry) -> Result<ArgValue, CoercionError> {
        let mut map = IndexMap::with_capacity(self.items.len());
        for item in &self.items {
            let (key, value) = split_entry(item).ok_or_else(|| CoercionError::invalid("key:value entry", item.clone()))?;
            map.insert(key, coercion.coerce_str(element, &value)?);
        }
        Ok(ArgValue::Map(map))
    }

    fn element_values(&self, element: &DeclaredType, coercion: &CoercionRegistry) -> Result<Vec<ArgValue>, CoercionError> {
        self.items
            .iter()
            .map(|item| {
                let text = match self.bracket {
                    Bracket::Curly => split_entry(item).map(|(_, value)| value).unwrap_or_else(|| item.clone()),
                    Bracket::Square | Bracket::Round => item.clone(),
                };
                coercion.coerce_str(element, &text)
            })
            .collect()
    }
}
