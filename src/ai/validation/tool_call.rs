//! Structural validation of raw tool calls

use serde_json::{Map, Value};
use tracing::debug;

use crate::types::{FlowError, Result, ToolCall, ToolCallDefect, ToolCallError};

const REQUIRED_FIELDS: [&str; 3] = ["id", "name", "input"];

/// Validates provider-returned tool calls against the `{id, name, input}` contract
#[derive(Debug, Default, Clone, Copy)]
pub struct ToolCallValidator;

impl ToolCallValidator {
    pub fn new() -> Self {
        Self
    }

    /// Validate one raw call.
    ///
    /// An `input` that arrives as a string is parsed first; a parse failure is
    /// reported as `InputParse`, never as a missing field.
    pub fn validate(&self, raw: &Value) -> std::result::Result<ToolCall, ToolCallError> {
        let object = raw
            .as_object()
            .ok_or_else(|| ToolCallError::new(ToolCallDefect::NotAnObject))?;

        let missing: Vec<&'static str> = REQUIRED_FIELDS
            .iter()
            .copied()
            .filter(|field| object.get(*field).is_none_or(Value::is_null))
            .collect();
        if !missing.is_empty() {
            return Err(ToolCallError::new(ToolCallDefect::MissingFields(missing)));
        }

        let id = string_field(object, "id")?;
        let name = string_field(object, "name")?;
        let input = match &object["input"] {
            Value::Object(map) => map.clone(),
            Value::String(embedded) => parse_embedded_input(embedded)?,
            _ => {
                return Err(ToolCallError::new(ToolCallDefect::WrongType {
                    field: "input",
                    expected: "an object",
                }));
            }
        };

        Ok(ToolCall { id, name, input })
    }

    /// Validate every call; the first defect fails the whole list
    pub fn validate_all(&self, raw: &[Value]) -> Result<Vec<ToolCall>> {
        raw.iter()
            .enumerate()
            .map(|(index, call)| {
                self.validate(call).map_err(|err| {
                    let err = err.at(index);
                    debug!(error = %err, "Rejected tool call");
                    FlowError::InvalidToolCall(err)
                })
            })
            .collect()
    }
}

fn string_field(
    object: &Map<String, Value>,
    field: &'static str,
) -> std::result::Result<String, ToolCallError> {
    match object.get(field) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.clone()),
        _ => Err(ToolCallError::new(ToolCallDefect::WrongType {
            field,
            expected: "a non-empty string",
        })),
    }
}

/// Blank argument strings stand for an empty input
fn parse_embedded_input(embedded: &str) -> std::result::Result<Map<String, Value>, ToolCallError> {
    if embedded.trim().is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str::<Value>(embedded) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(ToolCallError::new(ToolCallDefect::InputParse(format!(
            "expected an object, got {}",
            json_type(&other)
        )))),
        Err(e) => Err(ToolCallError::new(ToolCallDefect::InputParse(e.to_string()))),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn validator() -> ToolCallValidator {
        ToolCallValidator::new()
    }

    #[test]
    fn test_valid_call() {
        let call = validator()
            .validate(&json!({"id": "t1", "name": "create_shape", "input": {"x": 10}}))
            .unwrap();
        assert_eq!(call.id, "t1");
        assert_eq!(call.name, "create_shape");
        assert_eq!(call.input["x"], 10);
    }

    #[test]
    fn test_embedded_string_input_is_parsed() {
        let call = validator()
            .validate(&json!({"id": "t1", "name": "move_object", "input": "{\"objectId\": \"a\", \"x\": 5}"}))
            .unwrap();
        assert_eq!(call.input["objectId"], "a");

        let empty = validator()
            .validate(&json!({"id": "t2", "name": "get_canvas_state", "input": ""}))
            .unwrap();
        assert!(empty.input.is_empty());
    }

    #[test]
    fn test_missing_fields_are_listed() {
        let err = validator()
            .validate(&json!({"name": "create_shape"}))
            .unwrap_err();
        assert_eq!(err.missing_fields(), &["id", "input"]);

        let err = validator()
            .validate(&json!({"id": "t1", "name": null, "input": {}}))
            .unwrap_err();
        assert_eq!(err.missing_fields(), &["name"]);
    }

    #[test]
    fn test_parse_failure_is_distinct_from_missing() {
        let err = validator()
            .validate(&json!({"id": "t1", "name": "x", "input": "{not json"}))
            .unwrap_err();
        assert!(matches!(err.defect, ToolCallDefect::InputParse(_)));
        assert!(err.missing_fields().is_empty());

        let err = validator()
            .validate(&json!({"id": "t1", "name": "x", "input": "[1, 2]"}))
            .unwrap_err();
        assert!(matches!(err.defect, ToolCallDefect::InputParse(ref r) if r.contains("array")));
    }

    #[test]
    fn test_wrong_shapes() {
        let err = validator().validate(&json!("create_shape")).unwrap_err();
        assert_eq!(err.defect, ToolCallDefect::NotAnObject);

        let err = validator()
            .validate(&json!({"id": 7, "name": "x", "input": {}}))
            .unwrap_err();
        assert_eq!(
            err.defect,
            ToolCallDefect::WrongType {
                field: "id",
                expected: "a non-empty string"
            }
        );

        let err = validator()
            .validate(&json!({"id": "t1", "name": "x", "input": 42}))
            .unwrap_err();
        assert!(matches!(err.defect, ToolCallDefect::WrongType { field: "input", .. }));
    }

    #[test]
    fn test_unregistered_name_is_structurally_valid() {
        assert!(validator()
            .validate(&json!({"id": "t1", "name": "teleport_object", "input": {}}))
            .is_ok());
    }

    #[test]
    fn test_validate_all_reports_index() {
        let raw = vec![
            json!({"id": "t1", "name": "create_shape", "input": {}}),
            json!({"id": "t2", "input": {}}),
        ];
        match validator().validate_all(&raw) {
            Err(FlowError::InvalidToolCall(err)) => {
                assert_eq!(err.index, Some(1));
                assert_eq!(err.missing_fields(), &["name"]);
            }
            other => panic!("expected InvalidToolCall, got {:?}", other),
        }
        assert_eq!(validator().validate_all(&raw[..1]).unwrap().len(), 1);
    }
}
