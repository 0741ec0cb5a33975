//! Resolution phase shared by the token-based strategies.
//!
//! Strategies first split the argument text into a flag map and a queue of
//! leftover tokens. Resolution then walks the parameters in declaration order,
//! and finally backfills optional parameters that were not found from whatever
//! leftovers remain.

use std::collections::{HashMap, VecDeque};

use parley_types::{ArgValue, ParameterDescriptor, ParameterResolveFailure, ParseOutcome};

use super::ParseContext;
use crate::coercion::Literal;

/// Value recorded for a flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum FlagValue {
    Present,
    Text(String),
}

impl FlagValue {
    pub(crate) fn literal(&self) -> Literal<'_> {
        match self {
            Self::Present => Literal::Present,
            Self::Text(text) => Literal::Text(text),
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct Extraction {
    pub(crate) flags: HashMap<String, FlagValue>,
    pub(crate) leftovers: VecDeque<String>,
}

impl Extraction {
    /// Pop the next leftover, or all of them space-joined for a joint parameter.
    fn take(&mut self, joint: bool) -> Option<String> {
        if self.leftovers.is_empty() {
            return None;
        }
        if joint {
            let joined = self.leftovers.drain(..).collect::<Vec<_>>().join(" ");
            return Some(joined);
        }
        self.leftovers.pop_front()
    }
}

/// How parameters are looked up in the flag map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum KeyStyle {
    /// `--long` or `-s`; parameters with neither are filled from leftovers.
    Flags,
    /// Bare long names; parameters without one are filled from leftovers.
    Names,
}

enum Lookup<'e> {
    Keyed(Option<&'e FlagValue>),
    Keyless,
}

impl KeyStyle {
    fn lookup<'e>(self, parameter: &ParameterDescriptor, flags: &'e HashMap<String, FlagValue>) -> Lookup<'e> {
        match self {
            Self::Flags if parameter.has_flag() => {
                let by_long = parameter.long.as_ref().and_then(|long| flags.get(long));
                let by_short = || parameter.short.and_then(|short| flags.get(&short.to_string()));
                Lookup::Keyed(by_long.or_else(by_short))
            }
            Self::Names if parameter.long.is_some() => Lookup::Keyed(parameter.long.as_ref().and_then(|long| flags.get(long))),
            Self::Flags | Self::Names => Lookup::Keyless,
        }
    }
}

/// Resolve every parameter from `extraction`.
///
/// `prefilled` holds values a strategy already produced, keyed by position.
pub(crate) fn resolve(
    parameters: &[ParameterDescriptor],
    mut extraction: Extraction,
    style: KeyStyle,
    context: &ParseContext<'_>,
    mut prefilled: HashMap<usize, ArgValue>,
) -> ParseOutcome {
    let mut values = Vec::with_capacity(parameters.len());
    let mut backfill = Vec::new();

    for (position, parameter) in parameters.iter().enumerate() {
        if let Some(value) = prefilled.remove(&position) {
            values.push(value);
            continue;
        }
        if let Some(preset) = context.preset_for(parameter) {
            values.push(preset);
            continue;
        }

        match style.lookup(parameter, &extraction.flags) {
            Lookup::Keyed(Some(flag)) => values.push(coerce(parameter, flag.literal(), context)?),
            Lookup::Keyed(None) if parameter.required => {
                return Err(ParameterResolveFailure::lack_required(parameter.label()));
            }
            Lookup::Keyed(None) => {
                values.push(fallback(parameter, context)?);
                if !parameter.declared_type.is_bool() {
                    backfill.push(position);
                }
            }
            Lookup::Keyless => match extraction.take(parameter.joint) {
                Some(token) => values.push(coerce(parameter, Literal::Text(&token), context)?),
                None => match parameter.default_value.as_deref() {
                    Some(literal) => values.push(coerce(parameter, Literal::Text(literal), context)?),
                    None => return Err(ParameterResolveFailure::incomplete(parameter.label())),
                },
            },
        }
    }

    // The joint parameter is consulted last so it only absorbs what is left.
    backfill.sort_by_key(|&position| parameters[position].joint);
    for position in backfill {
        let parameter = &parameters[position];
        let Some(token) = extraction.take(parameter.joint) else {
            break;
        };
        values[position] = coerce(parameter, Literal::Text(&token), context)?;
    }

    Ok(values)
}

fn coerce(parameter: &ParameterDescriptor, literal: Literal<'_>, context: &ParseContext<'_>) -> Result<ArgValue, ParameterResolveFailure> {
    context
        .coercion
        .coerce(&parameter.declared_type, literal)
        .map_err(|source| ParameterResolveFailure::coercion(parameter.label(), source))
}

/// Default literal when declared, else the type's zero value.
fn fallback(parameter: &ParameterDescriptor, context: &ParseContext<'_>) -> Result<ArgValue, ParameterResolveFailure> {
    match parameter.default_value.as_deref() {
        Some(literal) => coerce(parameter, Literal::Text(literal), context),
        None => Ok(parameter.declared_type.zero_value()),
    }
}
