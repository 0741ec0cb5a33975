//! Bracketed collection literals alongside ordinary flags.

use std::collections::HashMap;

use parley_types::{ParameterDescriptor, ParameterResolveFailure, ParseOutcome};
use parley_util::{find_bracket_spans, looks_like_flag, strip_flag_prefix, tokenize, unquote};

use super::flags::extract_flags;
use super::resolve::{KeyStyle, resolve};
use super::{ParameterParser, ParseContext, validate_flags};
use crate::coercion::CollectionLiteral;

/// Parses `[..]` lists, `(..)` sets and `{k:v}` maps.
///
/// A bracketed span belongs to the collection parameter whose flag immediately
/// precedes it (`--tags [a,b]` or `--tags=[a,b]`). Otherwise it goes to the
/// next unassigned collection parameter in declaration order. The text outside
/// the spans is parsed like the default strategy.
#[derive(Debug, Clone, Copy, Default)]
pub struct CollectionParser;

impl ParameterParser for CollectionParser {
    fn validate(&self, parameters: &[ParameterDescriptor]) -> Result<(), String> {
        validate_flags(parameters)?;
        if !parameters.iter().any(|parameter| parameter.declared_type.is_collection()) {
            return Err("collection parsing needs at least one collection parameter".to_string());
        }
        Ok(())
    }

    fn parse(&self, parameters: &[ParameterDescriptor], raw: &str, context: &ParseContext<'_>) -> ParseOutcome {
        let mut remainder = String::with_capacity(raw.len());
        let mut assigned: HashMap<usize, CollectionLiteral> = HashMap::new();
        let mut unassigned = Vec::new();
        let mut cursor = 0;

        for span in find_bracket_spans(raw) {
            let segment = &raw[cursor..span.start];
            let literal = CollectionLiteral::new(span.bracket, &span.inner);
            match preceding_flag(parameters, segment, &assigned) {
                Some((position, flag_start)) => {
                    remainder.push_str(&segment[..flag_start]);
                    assigned.insert(position, literal);
                }
                None => {
                    remainder.push_str(segment);
                    unassigned.push(literal);
                }
            }
            remainder.push(' ');
            cursor = span.end;
        }
        remainder.push_str(&raw[cursor..]);

        let mut pending = unassigned.into_iter();
        for (position, parameter) in parameters.iter().enumerate() {
            if parameter.declared_type.is_collection()
                && !assigned.contains_key(&position)
                && let Some(literal) = pending.next()
            {
                assigned.insert(position, literal);
            }
        }
        let surplus = pending.count();
        if surplus > 0 {
            tracing::debug!(surplus, "ignoring collection literals without a parameter");
        }

        let mut prefilled = HashMap::with_capacity(assigned.len());
        for (position, literal) in assigned {
            let parameter = &parameters[position];
            let value = literal
                .convert(&parameter.declared_type, context.coercion)
                .map_err(|source| ParameterResolveFailure::coercion(parameter.label(), source))?;
            prefilled.insert(position, value);
        }

        let extraction = extract_flags(parameters, &remainder);
        resolve(parameters, extraction, KeyStyle::Flags, context, prefilled)
    }
}

/// Position of the unassigned collection parameter named by the last token of
/// `segment`, with that token's byte offset.
fn preceding_flag(
    parameters: &[ParameterDescriptor],
    segment: &str,
    assigned: &HashMap<usize, CollectionLiteral>,
) -> Option<(usize, usize)> {
    let last = tokenize(segment).pop()?;
    if last.end != segment.trim_end().len() {
        return None;
    }
    let token = unquote(last.text);
    if !looks_like_flag(&token) {
        return None;
    }
    let name = strip_flag_prefix(&token);
    let name = name.strip_suffix('=').unwrap_or(name);
    let position = parameters
        .iter()
        .position(|parameter| parameter.long.as_deref() == Some(name))
        .or_else(|| parameters.iter().position(|parameter| parameter.answers_to(name)))?;
    let parameter = &parameters[position];
    (parameter.declared_type.is_collection() && !assigned.contains_key(&position)).then_some((position, last.start))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coercion::CoercionRegistry;
    use crate::parsing::NoPresets;
    use parley_types::{ArgValue, DeclaredType};
    use serde_json::json;

    fn parse(parameters: &[ParameterDescriptor], raw: &str) -> ParseOutcome {
        let coercion = CoercionRegistry::new();
        CollectionParser.parse(parameters, raw, &ParseContext::new(&coercion, &NoPresets))
    }

    fn tag_parameters() -> Vec<ParameterDescriptor> {
        vec![
            ParameterDescriptor::flag("name", DeclaredType::Str).short('n'),
            ParameterDescriptor::flag("tags", DeclaredType::set(DeclaredType::Str)).short('t'),
            ParameterDescriptor::flag("sizes", DeclaredType::list(DeclaredType::Int)),
            ParameterDescriptor::flag("limits", DeclaredType::map(DeclaredType::Int)),
        ]
    }

    #[test]
    fn spans_bind_to_preceding_flags() {
        let values = parse(&tag_parameters(), "--sizes [3, 1] -n box --tags (red, blue, red)").unwrap();
        assert_eq!(values[0], ArgValue::Str("box".into()));
        assert_eq!(values[1], ArgValue::Set(vec!["red".into(), "blue".into()]));
        assert_eq!(values[2], ArgValue::List(vec![ArgValue::Int(3), ArgValue::Int(1)]));
        assert_eq!(values[3], ArgValue::Null);
    }

    #[test]
    fn unflagged_spans_fill_collections_in_order() {
        let values = parse(&tag_parameters(), "(a) [1,2] {cpu:2, mem:512} -n svc").unwrap();
        assert_eq!(values[0], ArgValue::Str("svc".into()));
        assert_eq!(values[1], ArgValue::Set(vec!["a".into()]));
        assert_eq!(values[2], ArgValue::List(vec![ArgValue::Int(1), ArgValue::Int(2)]));
        assert_eq!(values[3].to_json(), json!({"cpu": 2, "mem": 512}));
    }

    #[test]
    fn inline_flag_binding() {
        let values = parse(&tag_parameters(), "--limits={a:1} -n x").unwrap();
        assert_eq!(values[3].to_json(), json!({"a": 1}));
        assert_eq!(values[0], ArgValue::Str("x".into()));
    }

    #[test]
    fn bad_element_reports_the_parameter() {
        let error = parse(&tag_parameters(), "--sizes [1, two]").unwrap_err();
        assert_eq!(error.kind(), "coercion-error");
        assert!(error.to_string().contains("--sizes"), "{error}");
    }

    #[test]
    fn requires_a_collection_parameter() {
        let parameters = [ParameterDescriptor::flag("name", DeclaredType::Str)];
        assert!(CollectionParser.validate(&parameters).is_err());
        assert!(CollectionParser.validate(&tag_parameters()).is_ok());
    }
}
