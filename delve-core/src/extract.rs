//! Structured extraction — recovers a validated record list from model text.
//!
//! Models wrap JSON in code fences, surround it with prose, or nest the list
//! inside a container object. The extractor narrows the text down to one
//! literal, parses it with `serde_json` and validates every record against a
//! [`RecordShape`]. A value is either fully valid or rejected.

use crate::error::ExtractionError;
use crate::types::ResponseShape;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use tracing::{debug, info};

/// Maximum number of characters of offending text carried by an error.
pub const SNIPPET_CHARS: usize = 150;

/// Describes the record type a stage expects back from the model.
pub trait RecordShape: DeserializeOwned {
    /// Field of a wrapping object that holds the record list.
    const CONTAINER_FIELD: &'static str;
    /// Name reported to the provider alongside the schema.
    const SCHEMA_NAME: &'static str;
    /// Fields every record must carry as non-empty strings.
    const REQUIRED_FIELDS: &'static [&'static str];

    /// JSON schema of the wrapping object.
    fn schema() -> Value {
        let properties: Map<String, Value> = Self::REQUIRED_FIELDS
            .iter()
            .map(|field| ((*field).to_string(), json!({ "type": "string" })))
            .collect();
        json!({
            "type": "object",
            "properties": {
                Self::CONTAINER_FIELD: {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": properties,
                        "required": Self::REQUIRED_FIELDS,
                    }
                }
            },
            "required": [Self::CONTAINER_FIELD],
        })
    }

    /// Schema guidance to attach to a strict request.
    fn response_shape() -> ResponseShape {
        ResponseShape {
            name: Self::SCHEMA_NAME.to_string(),
            schema: Self::schema(),
            strict: true,
        }
    }
}

/// Extract and validate a list of `T` from stripped model output.
pub fn extract<T: RecordShape>(text: &str) -> Result<Vec<T>, ExtractionError> {
    let candidate = locate_payload(text);
    debug!(candidate = %snippet(candidate), "Parsing structured payload");

    let parsed: Value = serde_json::from_str(candidate).map_err(|e| ExtractionError::Malformed {
        reason: e.to_string(),
        snippet: snippet(candidate),
    })?;

    let items = match parsed {
        Value::Object(mut map) => match map.remove(T::CONTAINER_FIELD) {
            Some(Value::Array(items)) => items,
            Some(other) => {
                return Err(ExtractionError::Shape {
                    reason: format!(
                        "field '{}' is {}, expected an array",
                        T::CONTAINER_FIELD,
                        type_name(&other)
                    ),
                    snippet: snippet(candidate),
                });
            }
            None => Vec::new(),
        },
        Value::Array(items) => items,
        _ => Vec::new(),
    };

    let mut records = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        validate_record::<T>(index, &item).map_err(|reason| ExtractionError::Shape {
            reason,
            snippet: snippet(candidate),
        })?;
        let record = serde_json::from_value(item).map_err(|e| ExtractionError::Shape {
            reason: format!("record {index}: {e}"),
            snippet: snippet(candidate),
        })?;
        records.push(record);
    }

    info!(
        count = records.len(),
        field = T::CONTAINER_FIELD,
        "Extracted structured records"
    );
    Ok(records)
}

fn validate_record<T: RecordShape>(index: usize, item: &Value) -> Result<(), String> {
    let Some(object) = item.as_object() else {
        return Err(format!("record {index} is {}, expected an object", type_name(item)));
    };
    for field in T::REQUIRED_FIELDS {
        match object.get(*field).and_then(Value::as_str) {
            Some(value) if !value.trim().is_empty() => {}
            _ => return Err(format!("record {index} lacks non-empty string field '{field}'")),
        }
    }
    Ok(())
}

/// Narrow free text down to the most likely structured literal.
///
/// Each step only slices; nothing is rewritten before the parse attempt.
pub fn locate_payload(text: &str) -> &str {
    let mut candidate = text.trim();

    if let Some(inner) = tagged_fence(candidate) {
        candidate = inner;
    } else if let Some(inner) = any_fence(candidate)
        && inner.starts_with(['{', '['])
    {
        candidate = inner;
    }

    if !candidate.starts_with(['{', '[']) {
        if let Some(open) = candidate.find('{') {
            candidate = &candidate[open..];
        }
        if let Some(close) = candidate.rfind('}') {
            candidate = &candidate[..=close];
        }
    }

    candidate
}

fn tagged_fence(text: &str) -> Option<&str> {
    let start = text.find("```json").or_else(|| text.find("```JSON"))?;
    let body = &text[start + "```json".len()..];
    Some(fence_body(body))
}

fn any_fence(text: &str) -> Option<&str> {
    let start = text.find("```")?;
    Some(fence_body(&text[start + 3..]))
}

fn fence_body(body: &str) -> &str {
    match body.find("```") {
        Some(end) => body[..end].trim(),
        None => body.trim(),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Bounded prefix of `text` for diagnostics.
pub fn snippet(text: &str) -> String {
    text.chars().take(SNIPPET_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Deserialize)]
    struct Note {
        title: String,
        body: String,
    }

    impl RecordShape for Note {
        const CONTAINER_FIELD: &'static str = "notes";
        const SCHEMA_NAME: &'static str = "note_list";
        const REQUIRED_FIELDS: &'static [&'static str] = &["title", "body"];
    }

    fn note(title: &str, body: &str) -> Note {
        Note {
            title: title.into(),
            body: body.into(),
        }
    }

    #[test]
    fn test_plain_container_object() {
        let notes: Vec<Note> = extract(r#"{"notes":[{"title":"a","body":"b"}]}"#).unwrap();
        assert_eq!(notes, vec![note("a", "b")]);
    }

    #[test]
    fn test_bare_array() {
        let notes: Vec<Note> = extract(r#"[{"title":"a","body":"b"},{"title":"c","body":"d"}]"#).unwrap();
        assert_eq!(notes.len(), 2);
    }

    #[test]
    fn test_json_fence_with_prose() {
        let text = "Sure! Here you go:\n```json\n{\"notes\":[{\"title\":\"t\",\"body\":\"x\"}]}\n```\nAnything else?";
        let notes: Vec<Note> = extract(text).unwrap();
        assert_eq!(notes, vec![note("t", "x")]);
    }

    #[test]
    fn test_untagged_fence_used_when_it_opens_a_literal() {
        let text = "Result:\n```\n[{\"title\":\"t\",\"body\":\"x\"}]\n```";
        let notes: Vec<Note> = extract(text).unwrap();
        assert_eq!(notes.len(), 1);
    }

    #[test]
    fn test_untagged_fence_ignored_when_not_a_literal() {
        let text = "run `x`:\n```\ncargo run\n```\nthen {\"notes\":[{\"title\":\"t\",\"body\":\"x\"}]} done";
        let notes: Vec<Note> = extract(text).unwrap();
        assert_eq!(notes.len(), 1);
    }

    #[test]
    fn test_prose_around_object_is_trimmed() {
        let text = "The list is {\"notes\":[{\"title\":\"t\",\"body\":\"x\"}]} as requested.";
        assert_eq!(locate_payload(text), "{\"notes\":[{\"title\":\"t\",\"body\":\"x\"}]}");
    }

    #[test]
    fn test_truncated_literal_fails() {
        let text = r#"{"notes":[{"title":"t","body":"x"}"#;
        let err = extract::<Note>(text).unwrap_err();
        assert!(matches!(err, ExtractionError::Malformed { .. }));
    }

    #[test]
    fn test_unbalanced_literal_in_prose_fails() {
        let text = "here: {\"notes\":[{\"title\":\"t\",\"body\":\"x\"},{\"title\":\"u\"";
        assert!(extract::<Note>(text).is_err());
    }

    #[test]
    fn test_unrelated_object_is_empty() {
        let notes: Vec<Note> = extract(r#"{"other":[1,2]}"#).unwrap();
        assert!(notes.is_empty());
        let notes: Vec<Note> = extract("42").unwrap();
        assert!(notes.is_empty());
    }

    #[test]
    fn test_missing_field_is_shape_error() {
        let err = extract::<Note>(r#"{"notes":[{"title":"t"}]}"#).unwrap_err();
        match err {
            ExtractionError::Shape { reason, .. } => assert!(reason.contains("body")),
            other => panic!("expected shape error, got {other:?}"),
        }
    }

    #[test]
    fn test_blank_field_is_shape_error() {
        let err = extract::<Note>(r#"[{"title":"t","body":"  "}]"#).unwrap_err();
        assert!(matches!(err, ExtractionError::Shape { .. }));
    }

    #[test]
    fn test_container_field_not_array_is_shape_error() {
        let err = extract::<Note>(r#"{"notes":"none"}"#).unwrap_err();
        assert!(matches!(err, ExtractionError::Shape { .. }));
    }

    #[test]
    fn test_error_snippet_is_bounded() {
        let text = format!("{{\"notes\": [{}", "x".repeat(1000));
        match extract::<Note>(&text).unwrap_err() {
            ExtractionError::Malformed { snippet, .. } => {
                assert_eq!(snippet.chars().count(), SNIPPET_CHARS)
            }
            other => panic!("expected malformed, got {other:?}"),
        }
    }

    #[test]
    fn test_schema_lists_required_fields() {
        let schema = Note::schema();
        assert_eq!(schema["required"][0], "notes");
        assert_eq!(schema["properties"]["notes"]["items"]["required"][1], "body");
        let shape = Note::response_shape();
        assert_eq!(shape.name, "note_list");
        assert!(shape.strict);
    }
}
