//! Invocation records appended to a session's history.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer, ser::SerializeMap};
use serde_json::Value;

use crate::DispatchFailure;

/// Outcome of one dispatched line or direct invocation.
#[derive(Debug, Clone, Serialize)]
pub struct InvocationRecord {
    pub command: String,
    /// Argument text after placeholder substitution.
    pub raw_args: String,
    pub started_at: DateTime<Utc>,
    #[serde(rename = "elapsed_ms", serialize_with = "serialize_millis")]
    pub elapsed: Duration,
    pub success: bool,
    /// Handler return value; `null` for void handlers and failures.
    pub result: Value,
    #[serde(serialize_with = "serialize_failure")]
    pub failure: Option<DispatchFailure>,
}

impl InvocationRecord {
    /// Open a record stamped with the current time.
    pub fn new(command: impl Into<String>, raw_args: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            raw_args: raw_args.into(),
            started_at: Utc::now(),
            elapsed: Duration::ZERO,
            success: false,
            result: Value::Null,
            failure: None,
        }
    }

    /// Finalize the record with the dispatch outcome.
    pub fn complete(mut self, outcome: Result<Value, DispatchFailure>, elapsed: Duration) -> Self {
        self.elapsed = elapsed;
        match outcome {
            Ok(result) => {
                self.success = true;
                self.result = result;
                self.failure = None;
            }
            Err(failure) => {
                self.success = false;
                self.result = Value::Null;
                self.failure = Some(failure);
            }
        }
        self
    }

    /// Text shown to the caller. Failure detail is appended when `show_detail` is set.
    pub fn render(&self, show_detail: bool) -> String {
        match &self.failure {
            None => render_value(&self.result),
            Some(failure) => match failure.detail() {
                Some(detail) if show_detail => format!("{failure}\n{detail}"),
                _ => failure.to_string(),
            },
        }
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

fn serialize_millis<S: Serializer>(elapsed: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
}

fn serialize_failure<S: Serializer>(failure: &Option<DispatchFailure>, serializer: S) -> Result<S::Ok, S::Error> {
    match failure {
        None => serializer.serialize_none(),
        Some(failure) => {
            let mut map = serializer.serialize_map(Some(2))?;
            map.serialize_entry("kind", failure.kind())?;
            map.serialize_entry("message", &failure.to_string())?;
            map.end()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ParameterResolveFailure;
    use serde_json::json;

    #[test]
    fn successful_record_renders_result() {
        let record = InvocationRecord::new("echo", "hi").complete(Ok(json!("hi")), Duration::from_millis(3));
        assert!(record.success);
        assert_eq!(record.render(false), "hi");

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["elapsed_ms"], 3);
        assert_eq!(json["failure"], Value::Null);
    }

    #[test]
    fn failed_record_serializes_kind_and_message() {
        let failure = ParameterResolveFailure::lack_required("--name").into();
        let record = InvocationRecord::new("greet", "").complete(Err(failure), Duration::ZERO);
        assert!(!record.success);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["failure"]["kind"], "lack-required");
        assert_eq!(json["failure"]["message"], "missing required parameter --name");
    }

    #[test]
    fn detail_only_rendered_on_request() {
        let error = anyhow::anyhow!("root cause").context("top level");
        let record = InvocationRecord::new("job", "").complete(Err(DispatchFailure::handler("job", &error)), Duration::ZERO);
        assert_eq!(record.render(false), "job failed: top level");
        assert!(record.render(true).contains("root cause"));
    }
}
