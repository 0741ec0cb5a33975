use parley_types::{ArgValue, DeclaredType, ParameterDescriptor, ParameterResolveFailure, ParseOutcome};

use super::{ParameterParser, ParseContext};

/// Hands the argument text to a single string parameter untouched.
///
/// Ambient parameters may sit alongside the string parameter and are filled
/// from presets.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawParser;

impl ParameterParser for RawParser {
    fn validate(&self, parameters: &[ParameterDescriptor]) -> Result<(), String> {
        let mut text_parameters = parameters
            .iter()
            .filter(|parameter| !matches!(parameter.declared_type, DeclaredType::Ambient(_)));
        match (text_parameters.next(), text_parameters.next()) {
            (Some(parameter), None) if parameter.declared_type == DeclaredType::Str => Ok(()),
            (Some(parameter), None) => Err(format!(
                "raw parameter {} must be a string, found {}",
                parameter.label(),
                parameter.declared_type
            )),
            _ => Err("raw parsing needs exactly one string parameter".to_string()),
        }
    }

    fn parse(&self, parameters: &[ParameterDescriptor], raw: &str, context: &ParseContext<'_>) -> ParseOutcome {
        parameters
            .iter()
            .map(|parameter| match parameter.declared_type {
                DeclaredType::Ambient(_) => context
                    .preset_for(parameter)
                    .ok_or_else(|| ParameterResolveFailure::incomplete(parameter.label())),
                _ => Ok(ArgValue::Str(raw.to_string())),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coercion::CoercionRegistry;
    use crate::parsing::NoPresets;

    #[test]
    fn passes_text_unchanged() {
        let parameters = [ParameterDescriptor::positional("script", DeclaredType::Str)];
        let coercion = CoercionRegistry::new();
        let values = RawParser
            .parse(&parameters, "  -x 'quoted'  [1,2] ", &ParseContext::new(&coercion, &NoPresets))
            .unwrap();
        assert_eq!(values, vec![ArgValue::Str("  -x 'quoted'  [1,2] ".into())]);
    }

    #[test]
    fn rejects_non_string_or_multiple_parameters() {
        assert!(RawParser.validate(&[ParameterDescriptor::positional("n", DeclaredType::Int)]).is_err());
        assert!(RawParser
            .validate(&[
                ParameterDescriptor::positional("a", DeclaredType::Str),
                ParameterDescriptor::positional("b", DeclaredType::Str),
            ])
            .is_err());
        assert!(RawParser
            .validate(&[
                ParameterDescriptor::positional("out", DeclaredType::console()),
                ParameterDescriptor::positional("text", DeclaredType::Str),
            ])
            .is_ok());
    }
}
