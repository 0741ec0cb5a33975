//! `name value` pairs without dashes.

use std::collections::HashMap;

use parley_types::{ParameterDescriptor, ParseOutcome};
use parley_util::split_arguments;

use super::resolve::{Extraction, FlagValue, KeyStyle, resolve};
use super::{ParameterParser, ParseContext, validate_flags};

/// Parses `copy from a.txt to b.txt` style arguments.
///
/// A token equal to a parameter's long name binds the following token, unless
/// that token is itself a parameter name. Parameters without a long name take
/// leftovers in order.
#[derive(Debug, Clone, Copy, Default)]
pub struct PositionalParser;

impl ParameterParser for PositionalParser {
    fn validate(&self, parameters: &[ParameterDescriptor]) -> Result<(), String> {
        validate_flags(parameters)
    }

    fn parse(&self, parameters: &[ParameterDescriptor], raw: &str, context: &ParseContext<'_>) -> ParseOutcome {
        let tokens = split_arguments(raw);
        let parameter_named = |token: &str| parameters.iter().find(|parameter| parameter.long.as_deref() == Some(token));
        let mut extraction = Extraction::default();
        let mut index = 0;

        while index < tokens.len() {
            let token = &tokens[index];
            index += 1;
            let Some(parameter) = parameter_named(token) else {
                extraction.leftovers.push_back(token.clone());
                continue;
            };
            if parameter.joint {
                extraction.flags.insert(token.clone(), FlagValue::Text(tokens[index..].join(" ")));
                break;
            }
            match tokens.get(index) {
                Some(next) if parameter_named(next).is_none() => {
                    extraction.flags.insert(token.clone(), FlagValue::Text(next.clone()));
                    index += 1;
                }
                _ => {
                    extraction.flags.insert(token.clone(), FlagValue::Present);
                }
            }
        }

        resolve(parameters, extraction, KeyStyle::Names, context, HashMap::new())
    }
}
