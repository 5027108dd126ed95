// src/protocol/output.rs

//! Decoding the single JSON document a worker writes to stdout.
//!
//! Workers are loosely typed: the root may be a bare array of records, an
//! object carrying the payload under a named field, or an object with an
//! `error` string. The root type is inspected first and decoding branches
//! from there.

use serde_json::{Map, Value};
use thiserror::Error;

/// Field an object-shaped document uses to report a logical failure.
pub const ERROR_FIELD: &str = "error";

#[derive(Debug, Clone, PartialEq)]
pub enum WorkerOutput {
    Records(Vec<Value>),
    Object(Map<String, Value>),
    Error(String),
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("worker exited 0 but wrote nothing to stdout")]
    Empty,

    #[error("worker stdout is not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("worker stdout must be a JSON array or object, got {0}")]
    UnexpectedShape(&'static str),

    #[error("worker output object has no '{0}' field")]
    MissingField(String),

    /// The worker reported a logical failure through the `error` field.
    #[error("{0}")]
    WorkerReported(String),
}

impl WorkerOutput {
    pub fn decode(stdout: &str) -> Result<Self, ProtocolError> {
        let text = stdout.trim();
        if text.is_empty() {
            return Err(ProtocolError::Empty);
        }

        match serde_json::from_str::<Value>(text)? {
            Value::Array(records) => Ok(WorkerOutput::Records(records)),
            Value::Object(mut obj) => match obj.remove(ERROR_FIELD) {
                Some(Value::Null) | None => Ok(WorkerOutput::Object(obj)),
                Some(Value::String(msg)) => Ok(WorkerOutput::Error(msg)),
                Some(other) => Ok(WorkerOutput::Error(other.to_string())),
            },
            Value::Null => Err(ProtocolError::UnexpectedShape("null")),
            Value::Bool(_) => Err(ProtocolError::UnexpectedShape("a boolean")),
            Value::Number(_) => Err(ProtocolError::UnexpectedShape("a number")),
            Value::String(_) => Err(ProtocolError::UnexpectedShape("a string")),
        }
    }

    /// Extract the task result.
    ///
    /// Arrays are the result as-is. Objects yield `result_field` when one is
    /// configured, or the whole object otherwise.
    pub fn into_payload(self, result_field: Option<&str>) -> Result<Value, ProtocolError> {
        match self {
            WorkerOutput::Records(records) => Ok(Value::Array(records)),
            WorkerOutput::Object(mut obj) => match result_field {
                Some(field) => obj
                    .remove(field)
                    .ok_or_else(|| ProtocolError::MissingField(field.to_string())),
                None => Ok(Value::Object(obj)),
            },
            WorkerOutput::Error(msg) => Err(ProtocolError::WorkerReported(msg)),
        }
    }
}

/// Decode + extract in one go.
pub fn parse_payload(stdout: &str, result_field: Option<&str>) -> Result<Value, ProtocolError> {
    WorkerOutput::decode(stdout)?.into_payload(result_field)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bare_array_is_the_payload() {
        let payload = parse_payload(r#"[{"symbol":"TEST","score":1.0}]"#, None).unwrap();
        assert_eq!(payload, json!([{"symbol": "TEST", "score": 1.0}]));
    }

    #[test]
    fn named_field_is_extracted_from_objects() {
        let doc = r#"{"base_symbol":"005930","similar_stocks":[{"symbol":"000660"}]}"#;
        let payload = parse_payload(doc, Some("similar_stocks")).unwrap();
        assert_eq!(payload, json!([{"symbol": "000660"}]));

        let err = parse_payload(doc, Some("image_data")).unwrap_err();
        assert!(matches!(err, ProtocolError::MissingField(f) if f == "image_data"));
    }

    #[test]
    fn error_field_wins_over_payload() {
        let doc = r#"{"error":"no price data for 2024-01","similar_stocks":[]}"#;
        let err = parse_payload(doc, Some("similar_stocks")).unwrap_err();
        assert_eq!(err.to_string(), "no price data for 2024-01");
    }

    #[test]
    fn null_error_field_is_not_an_error() {
        let output = WorkerOutput::decode(r#"{"error":null,"image_data":"iVBOR"}"#).unwrap();
        assert_eq!(
            output.into_payload(Some("image_data")).unwrap(),
            json!("iVBOR")
        );
    }

    #[test]
    fn empty_and_malformed_stdout_are_violations() {
        assert!(matches!(WorkerOutput::decode("  \n"), Err(ProtocolError::Empty)));
        assert!(matches!(
            WorkerOutput::decode("Traceback (most recent call last):"),
            Err(ProtocolError::Malformed(_))
        ));
        assert!(matches!(
            WorkerOutput::decode("42"),
            Err(ProtocolError::UnexpectedShape("a number"))
        ));
    }
}
