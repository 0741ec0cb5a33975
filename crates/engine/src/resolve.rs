//! # Placeholder Substitution
//!
//! Lines may reference session variables and random values before they are
//! parsed:
//!
//! - `${name}` - the session variable `name`
//! - `${name.field.0}` - a nested field of a JSON variable (object keys, array indices)
//! - `${rand.int}` - a random 32-bit integer
//! - `${rand.int(low,high)}` - a random integer in `low..=high`
//! - `${rand.bool}` - `true` or `false`
//!
//! Placeholders that cannot be resolved are left in the line untouched.

use once_cell::sync::Lazy;
use rand::Rng;
use regex::{Captures, Regex};
use serde_json::Value;
use tracing::warn;

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$\{([^}]+)\}").expect("placeholder regex should compile"));

static RAND_RANGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^rand\.int\(\s*([+-]?\d+)\s*,\s*([+-]?\d+)\s*\)$").expect("random range regex should compile")
});

/// Substitute every placeholder in `line`, using the thread-local generator.
///
/// `lookup` returns the value of a session variable.
///
/// # Examples
///
/// ```rust
/// use parley_engine::resolve::substitute;
/// use serde_json::json;
///
/// let line = substitute("greet ${user.name} ${missing}", |name| (name == "user").then(|| json!({"name": "ada"})));
/// assert_eq!(line, "greet ada ${missing}");
/// ```
pub fn substitute<F>(line: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<Value>,
{
    substitute_with(line, lookup, &mut rand::thread_rng())
}

/// [`substitute`] with an explicit random source.
pub fn substitute_with<F, R>(line: &str, lookup: F, rng: &mut R) -> String
where
    F: Fn(&str) -> Option<Value>,
    R: Rng,
{
    if !line.contains("${") {
        return line.to_string();
    }
    PLACEHOLDER
        .replace_all(line, |captures: &Captures<'_>| {
            let expression = captures[1].trim();
            match resolve_expression(expression, &lookup, rng) {
                Some(resolved) => resolved,
                None => {
                    warn!(placeholder = %expression, "leaving unresolved placeholder");
                    captures[0].to_string()
                }
            }
        })
        .into_owned()
}

fn resolve_expression<F, R>(expression: &str, lookup: &F, rng: &mut R) -> Option<String>
where
    F: Fn(&str) -> Option<Value>,
    R: Rng,
{
    match expression {
        "rand.int" => return Some(rng.gen_range(i32::MIN..=i32::MAX).to_string()),
        "rand.bool" => return Some(rng.gen_bool(0.5).to_string()),
        _ => {}
    }
    if let Some(captures) = RAND_RANGE.captures(expression) {
        let low: i64 = captures[1].parse().ok()?;
        let high: i64 = captures[2].parse().ok()?;
        let (low, high) = if low <= high { (low, high) } else { (high, low) };
        return Some(rng.gen_range(low..=high).to_string());
    }

    resolve_variable(expression, lookup).map(|value| render(&value))
}

/// Whole-name lookup first, then `name.path` navigation.
fn resolve_variable<F>(expression: &str, lookup: &F) -> Option<Value>
where
    F: Fn(&str) -> Option<Value>,
{
    if let Some(value) = lookup(expression) {
        return Some(value);
    }
    let (name, path) = expression.split_once('.')?;
    let mut current = lookup(name)?;
    for part in path.split('.') {
        current = match current {
            Value::Object(mut map) => map.remove(part)?,
            Value::Array(mut items) => {
                let index = part.parse::<usize>().ok()?;
                if index >= items.len() {
                    return None;
                }
                items.swap_remove(index)
            }
            _ => return None,
        };
    }
    Some(current)
}

fn render(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use serde_json::json;

    fn variables(name: &str) -> Option<Value> {
        match name {
            "x" => Some(json!("hello")),
            "n" => Some(json!(42)),
            "cfg" => Some(json!({"db": {"hosts": ["a", "b"]}, "port": 5432})),
            "dotted.name" => Some(json!("whole")),
            _ => None,
        }
    }

    #[test]
    fn variables_are_substituted() {
        assert_eq!(substitute("echo ${x} ${n}", variables), "echo hello 42");
    }

    #[test]
    fn fields_navigate_json_values() {
        assert_eq!(substitute("${cfg.db.hosts.1}:${cfg.port}", variables), "b:5432");
        assert_eq!(substitute("${cfg.db}", variables), r#"{"hosts":["a","b"]}"#);
        assert_eq!(substitute("${dotted.name}", variables), "whole");
    }

    #[test]
    fn unknown_placeholders_stay_verbatim() {
        assert_eq!(substitute("echo ${nope} ${cfg.db.missing} ${cfg.db.hosts.9}", variables), "echo ${nope} ${cfg.db.missing} ${cfg.db.hosts.9}");
    }

    #[test]
    fn random_ranges_are_inclusive() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let value: i64 = substitute_with("${rand.int(1, 3)}", variables, &mut rng).parse().unwrap();
            assert!((1..=3).contains(&value));
        }
        let reversed: i64 = substitute_with("${rand.int(5,5)}", variables, &mut rng).parse().unwrap();
        assert_eq!(reversed, 5);
    }

    #[test]
    fn random_int_and_bool() {
        let mut rng = StdRng::seed_from_u64(1);
        let line = substitute_with("${rand.int} ${rand.bool}", variables, &mut rng);
        let (int, flag) = line.split_once(' ').unwrap();
        assert!(int.parse::<i32>().is_ok());
        assert!(flag == "true" || flag == "false");
    }

    #[test]
    fn lines_without_placeholders_are_untouched() {
        assert_eq!(substitute("cost $5 {x}", variables), "cost $5 {x}");
    }
}
