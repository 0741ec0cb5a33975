use std::sync::Arc;

use parley_registry::{CommandRegistry, CoercionRegistry, NoPresets, ParameterParser, ParseContext, ParserSet};
use parley_types::{
    ArgValue, COLLECTION_STRATEGY, CommandDescriptor, DeclaredType, ParameterDescriptor, ParameterResolveFailure, ParseOutcome,
};
use serde_json::Value;

/// Splits on `=` into exactly two string arguments.
struct AssignmentParser;

impl ParameterParser for AssignmentParser {
    fn validate(&self, parameters: &[ParameterDescriptor]) -> Result<(), String> {
        if parameters.len() == 2 {
            Ok(())
        } else {
            Err("assignment needs a name and a value".to_string())
        }
    }

    fn parse(&self, parameters: &[ParameterDescriptor], raw: &str, _context: &ParseContext<'_>) -> ParseOutcome {
        let (name, value) = raw
            .split_once('=')
            .ok_or_else(|| ParameterResolveFailure::incomplete(parameters[1].label()))?;
        Ok(vec![ArgValue::Str(name.trim().into()), ArgValue::Str(value.trim().into())])
    }
}

fn parse_with(registry: &CommandRegistry, command: &str, raw: &str) -> ParseOutcome {
    let descriptor = registry.find(command);
    let parser = registry.parser_for(&descriptor).expect("strategy registered");
    let coercion = CoercionRegistry::new();
    parser.parse(&descriptor.parameters, raw, &ParseContext::new(&coercion, &NoPresets))
}

#[test]
fn custom_strategy_plugs_into_the_registry() {
    let mut parsers = ParserSet::builtin();
    parsers.insert("assign", AssignmentParser);
    let mut registry = CommandRegistry::with_parsers(parsers);

    let registered = registry.register(
        CommandDescriptor::command("let", |_| Ok(Value::Null))
            .strategy("assign")
            .param(ParameterDescriptor::positional("name", DeclaredType::Str))
            .param(ParameterDescriptor::positional("value", DeclaredType::Str)),
    );
    assert!(registered);

    let values = parse_with(&registry, "let", "answer = 42").expect("parse");
    assert_eq!(values, vec![ArgValue::from("answer"), ArgValue::from("42")]);

    let error = parse_with(&registry, "let", "answer").unwrap_err();
    assert_eq!(error.kind(), "incomplete-command");
}

#[test]
fn strategy_validation_happens_at_registration() {
    let mut parsers = ParserSet::empty();
    parsers.insert("assign", AssignmentParser);
    let mut registry = CommandRegistry::with_parsers(parsers);

    let one_parameter = CommandDescriptor::command("let", |_| Ok(Value::Null))
        .strategy("assign")
        .param(ParameterDescriptor::positional("name", DeclaredType::Str));
    assert!(!registry.register(one_parameter));

    // The default strategy is not part of this set.
    assert!(!registry.register(CommandDescriptor::command("echo", |_| Ok(Value::Null))));
    assert!(registry.is_empty());
}

#[test]
fn collection_command_through_the_registry() {
    let mut registry = CommandRegistry::new();
    registry.register(
        CommandDescriptor::command("tag", |_| Ok(Value::Null))
            .strategy(COLLECTION_STRATEGY)
            .param(ParameterDescriptor::positional("target", DeclaredType::Str))
            .param(ParameterDescriptor::flag("labels", DeclaredType::list(DeclaredType::Str)).short('l')),
    );

    let values = parse_with(&registry, "tag", "-l ['a b', c] release").expect("parse");
    assert_eq!(values[0], ArgValue::from("release"));
    assert_eq!(values[1], ArgValue::List(vec![ArgValue::from("a b"), ArgValue::from("c")]));
}

#[test]
fn parser_set_lists_builtin_ids() {
    let parsers = ParserSet::builtin();
    assert_eq!(parsers.ids(), vec!["collection", "default", "positional", "raw"]);
    assert!(parsers.get("raw").is_some());
    let _shared: Arc<dyn ParameterParser> = parsers.get("default").expect("default strategy");
}
