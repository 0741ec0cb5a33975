//! The default strategy: `-s` and `--long` flags.

use std::collections::HashMap;

use parley_types::{ParameterDescriptor, ParseOutcome};
use parley_util::{looks_like_flag, parse_bool_literal, split_arguments, strip_flag_prefix};

use tracing::debug;

use super::resolve::{Extraction, FlagValue, KeyStyle, resolve};
use super::{ParameterParser, ParseContext, validate_flags};

/// Flag-based parsing.
///
/// - `-abc` sets each of the short flags `a`, `b`, `c` to present
/// - `--name value` and `-n value` bind the next token unless it is itself a flag
/// - `--name=value` binds inline
/// - a boolean flag only consumes the next token when it is a boolean literal
/// - a joint flag takes every remaining token, space-joined
/// - everything else is a leftover, used for flagless parameters and backfill
#[derive(Debug, Clone, Copy, Default)]
pub struct FlagParser;

impl ParameterParser for FlagParser {
    fn validate(&self, parameters: &[ParameterDescriptor]) -> Result<(), String> {
        validate_flags(parameters)
    }

    fn parse(&self, parameters: &[ParameterDescriptor], raw: &str, context: &ParseContext<'_>) -> ParseOutcome {
        let extraction = extract_flags(parameters, raw);
        resolve(parameters, extraction, KeyStyle::Flags, context, HashMap::new())
    }
}

pub(crate) fn extract_flags(parameters: &[ParameterDescriptor], raw: &str) -> Extraction {
    let tokens = split_arguments(raw);
    let mut extraction = Extraction::default();
    let mut index = 0;

    while index < tokens.len() {
        let token = &tokens[index];
        index += 1;
        if !looks_like_flag(token) {
            extraction.leftovers.push_back(token.clone());
            continue;
        }

        let name = strip_flag_prefix(token);
        if name.is_empty() {
            continue;
        }
        if let Some((key, value)) = name.split_once('=')
            && !key.is_empty()
        {
            extraction.flags.insert(key.to_string(), FlagValue::Text(value.to_string()));
            continue;
        }
        if is_bundle(parameters, name) {
            for short in name.chars() {
                extraction.flags.insert(short.to_string(), FlagValue::Present);
            }
            continue;
        }

        let Some(parameter) = find_by_flag(parameters, name) else {
            // Unknown names never take a value; the next token stays a leftover.
            debug!(flag = name, "ignoring unknown flag");
            continue;
        };
        if parameter.joint {
            let rest = tokens[index..].join(" ");
            extraction.flags.insert(name.to_string(), FlagValue::Text(rest));
            break;
        }

        let next = tokens.get(index);
        let value = match next {
            Some(next) if parameter.declared_type.is_bool() => parse_bool_literal(next).map(|_| next),
            Some(next) if !looks_like_flag(next) => Some(next),
            _ => None,
        };
        match value {
            Some(value) => {
                extraction.flags.insert(name.to_string(), FlagValue::Text(value.clone()));
                index += 1;
            }
            None => {
                extraction.flags.insert(name.to_string(), FlagValue::Present);
            }
        }
    }

    extraction
}

/// Whether `name` is a run of short flags, each set to present.
///
/// A long name is never a bundle. A single character is one only when it is a
/// boolean short, so `-n value` still binds its value. Longer runs qualify when
/// every character is a registered short; a non-boolean member then fails
/// coercion with a missing value instead of swallowing the next token.
fn is_bundle(parameters: &[ParameterDescriptor], name: &str) -> bool {
    if parameters.iter().any(|parameter| parameter.long.as_deref() == Some(name)) {
        return false;
    }
    let short_of = |character: char| parameters.iter().find(|parameter| parameter.short == Some(character));
    let mut chars = name.chars();
    match (chars.next(), chars.next()) {
        (Some(only), None) => short_of(only).is_some_and(|parameter| parameter.declared_type.is_bool()),
        (Some(_), Some(_)) => name.chars().all(|character| short_of(character).is_some()),
        _ => false,
    }
}

fn find_by_flag<'p>(parameters: &'p [ParameterDescriptor], name: &str) -> Option<&'p ParameterDescriptor> {
    parameters
        .iter()
        .find(|parameter| parameter.long.as_deref() == Some(name))
        .or_else(|| parameters.iter().find(|parameter| parameter.answers_to(name)))
}
