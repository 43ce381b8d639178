//! Run log record format.
//!
//! One JSON object per line: `{"timestamp": <secs>, "event": <name>, "data": {..}}`.
//! Readers must ignore events and fields they do not recognise.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const RUN_STARTED: &str = "run_started";
pub const ITERATION_STARTED: &str = "iteration_started";
pub const ITERATION_COMPLETED: &str = "iteration_completed";
pub const RUN_SUCCESS_STOP: &str = "run_success_stop";
pub const BEST_FUTURE_SELECTED: &str = "best_future_selected";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Seconds since the Unix epoch.
    pub timestamp: f64,
    pub event: String,
    #[serde(default = "empty_object")]
    pub data: Value,
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

impl LogRecord {
    pub fn new(timestamp: f64, event: impl Into<String>, data: Value) -> Self {
        let data = match data {
            Value::Null => empty_object(),
            other => other,
        };
        Self {
            timestamp,
            event: event.into(),
            data,
        }
    }

    pub fn is(&self, event: &str) -> bool {
        self.event == event
    }

    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }

    pub fn i64_field(&self, key: &str) -> Option<i64> {
        self.data.get(key).and_then(Value::as_i64)
    }

    pub fn f64_field(&self, key: &str) -> Option<f64> {
        self.data.get(key).and_then(Value::as_f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn null_data_becomes_empty_object() {
        let record = LogRecord::new(1.0, RUN_STARTED, Value::Null);
        assert_eq!(record.data, json!({}));
    }

    #[test]
    fn unknown_fields_are_ignored_when_parsing() {
        let line = r#"{"timestamp": 12.5, "event": "future_event", "data": {"x": 1}, "extra": true}"#;
        let record: LogRecord = serde_json::from_str(line).expect("parse");
        assert_eq!(record.event, "future_event");
        assert_eq!(record.i64_field("x"), Some(1));
    }

    #[test]
    fn missing_data_defaults_to_object() {
        let record: LogRecord =
            serde_json::from_str(r#"{"timestamp": 1.0, "event": "run_started"}"#).expect("parse");
        assert!(record.is(RUN_STARTED));
        assert_eq!(record.data, json!({}));
    }
}
