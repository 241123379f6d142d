//! The typed extraction record and the validator that produces it from raw
//! model output.
//!
//! [`parse_extraction_result`] is a total function: it either returns a fully
//! populated [`ExtractionResult`] or a [`SchemaValidationError`] naming the
//! first offending field. There is no implicit coercion: a `total_words` of
//! `"4"` or `4.0` is a type error, not the integer 4.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// Vocabulary extracted from one piece of source text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionResult {
    /// Words in the order the model produced them; not deduplicated.
    pub words: Vec<String>,
    /// Word count as reported by the model.
    ///
    /// Only checked against `words.len()` when
    /// [`SchemaRules::enforce_word_count`] is set.
    pub total_words: u64,
    /// Proficiency level label (e.g. `"B1"`).
    pub language_level: String,
    /// Free-form explanation of the extraction.
    pub analysis: String,
}

impl ExtractionResult {
    /// Field names in declaration order.
    pub const FIELDS: [&'static str; 4] = ["words", "total_words", "language_level", "analysis"];

    /// JSON Schema for this record, in the strict form accepted by
    /// structured-output providers.
    pub fn json_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "words": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Vocabulary words extracted from the text"
                },
                "total_words": {
                    "type": "integer",
                    "description": "Number of extracted words"
                },
                "language_level": {
                    "type": "string",
                    "description": "Proficiency level of the extracted vocabulary"
                },
                "analysis": {
                    "type": "string",
                    "description": "Short explanation of the extraction"
                }
            },
            "required": Self::FIELDS,
            "additionalProperties": false
        })
    }

    /// Returns `true` if `total_words` equals the number of extracted words.
    pub fn count_matches(&self) -> bool {
        usize::try_from(self.total_words).is_ok_and(|n| n == self.words.len())
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// The class of schema violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaViolation {
    /// The output is not valid JSON.
    Malformed,
    /// The output is JSON but not an object.
    NotAnObject,
    /// A required field is absent (or `null`).
    MissingField,
    /// A field holds a value of the wrong type.
    WrongType,
    /// `language_level` is not in the configured allowed set.
    DisallowedValue,
    /// `total_words` disagrees with `words.len()` while the count is enforced.
    CountMismatch,
}

/// Raw model output did not conform to [`ExtractionResult`].
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{}", self.message())]
pub struct SchemaValidationError {
    /// Offending field path (e.g. `"total_words"`, `"words[2]"`); `None` when
    /// the document as a whole is unusable.
    pub field: Option<String>,
    /// What was expected at that location.
    pub expected: String,
    /// Violation class.
    pub kind: SchemaViolation,
    /// Extra context (parser message, observed JSON type, offending value).
    pub detail: String,
}

impl SchemaValidationError {
    fn document(kind: SchemaViolation, detail: impl Into<String>) -> Self {
        Self {
            field: None,
            expected: "a JSON object".to_string(),
            kind,
            detail: detail.into(),
        }
    }

    fn message(&self) -> String {
        let what = match self.kind {
            SchemaViolation::Malformed => "output is not valid JSON",
            SchemaViolation::NotAnObject => "output is not a JSON object",
            SchemaViolation::MissingField => "missing required field",
            SchemaViolation::WrongType => "wrong type for field",
            SchemaViolation::DisallowedValue => "value not allowed for field",
            SchemaViolation::CountMismatch => "inconsistent count in field",
        };
        match &self.field {
            Some(field) => format!("{what} '{field}': expected {}, {}", self.expected, self.detail),
            None => format!("{what}: expected {}, {}", self.expected, self.detail),
        }
    }

    fn field(
        field: impl Into<String>,
        expected: impl Into<String>,
        kind: SchemaViolation,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            field: Some(field.into()),
            expected: expected.into(),
            kind,
            detail: detail.into(),
        }
    }
}


// ---------------------------------------------------------------------------
// Validation rules
// ---------------------------------------------------------------------------

/// Optional checks layered on top of the structural schema.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaRules {
    /// When set, `language_level` must match one of these labels
    /// (ASCII case-insensitive).
    pub allowed_levels: Option<Vec<String>>,
    /// When `true`, `total_words` must equal `words.len()`.
    pub enforce_word_count: bool,
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parses raw model output into an [`ExtractionResult`].
///
/// Surrounding whitespace and a single enclosing Markdown code fence are
/// stripped before JSON parsing. Fields are checked in declaration order and
/// the first violation is returned. Unknown fields are ignored.
pub fn parse_extraction_result(
    raw: &str,
    rules: &SchemaRules,
) -> Result<ExtractionResult, SchemaValidationError> {
    let body = strip_code_fence(raw);
    let value: Value = serde_json::from_str(body)
        .map_err(|e| SchemaValidationError::document(SchemaViolation::Malformed, e.to_string()))?;
    extraction_result_from_value(&value, rules)
}

/// Validates an already-decoded JSON value.
pub fn extraction_result_from_value(
    value: &Value,
    rules: &SchemaRules,
) -> Result<ExtractionResult, SchemaValidationError> {
    let object = value.as_object().ok_or_else(|| {
        SchemaValidationError::document(
            SchemaViolation::NotAnObject,
            format!("got {}", json_type(value)),
        )
    })?;

    let words = string_array(object, "words")?;
    let total_words = non_negative_integer(object, "total_words")?;
    let language_level = string_field(object, "language_level")?;
    let analysis = string_field(object, "analysis")?;

    if let Some(allowed) = &rules.allowed_levels {
        if !allowed.iter().any(|l| l.eq_ignore_ascii_case(&language_level)) {
            return Err(SchemaValidationError::field(
                "language_level",
                format!("one of [{}]", allowed.join(", ")),
                SchemaViolation::DisallowedValue,
                format!("got \"{language_level}\""),
            ));
        }
    }

    let result = ExtractionResult {
        words,
        total_words,
        language_level,
        analysis,
    };

    if rules.enforce_word_count && !result.count_matches() {
        return Err(SchemaValidationError::field(
            "total_words",
            format!("{} (the length of 'words')", result.words.len()),
            SchemaViolation::CountMismatch,
            format!("got {}", result.total_words),
        ));
    }

    Ok(result)
}

fn required<'a>(
    object: &'a Map<String, Value>,
    field: &str,
    expected: &str,
) -> Result<&'a Value, SchemaValidationError> {
    match object.get(field) {
        Some(Value::Null) | None => Err(SchemaValidationError::field(
            field,
            expected,
            SchemaViolation::MissingField,
            "field is absent",
        )),
        Some(value) => Ok(value),
    }
}

fn wrong_type(field: impl Into<String>, expected: &str, got: &Value) -> SchemaValidationError {
    SchemaValidationError::field(
        field,
        expected,
        SchemaViolation::WrongType,
        format!("got {} {}", json_type(got), got),
    )
}

fn string_field(object: &Map<String, Value>, field: &str) -> Result<String, SchemaValidationError> {
    const EXPECTED: &str = "string";
    match required(object, field, EXPECTED)? {
        Value::String(s) => Ok(s.clone()),
        other => Err(wrong_type(field, EXPECTED, other)),
    }
}

fn non_negative_integer(
    object: &Map<String, Value>,
    field: &str,
) -> Result<u64, SchemaValidationError> {
    const EXPECTED: &str = "non-negative integer";
    let value = required(object, field, EXPECTED)?;
    value
        .as_u64()
        .ok_or_else(|| wrong_type(field, EXPECTED, value))
}

fn string_array(
    object: &Map<String, Value>,
    field: &str,
) -> Result<Vec<String>, SchemaValidationError> {
    const EXPECTED: &str = "array of strings";
    let items = match required(object, field, EXPECTED)? {
        Value::Array(items) => items,
        other => return Err(wrong_type(field, EXPECTED, other)),
    };
    items
        .iter()
        .enumerate()
        .map(|(i, item)| match item {
            Value::String(s) => Ok(s.clone()),
            other => Err(wrong_type(format!("{field}[{i}]"), "string", other)),
        })
        .collect()
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_u64() || n.is_i64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Removes one enclosing ```` ``` ```` fence (with optional info string) if the
/// trimmed input both starts and ends with one.
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(inner) = rest.strip_suffix("```") else {
        return trimmed;
    };
    // An info string ("json") is a leading tag; an object body never starts with one.
    let tag_len = inner
        .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '+')))
        .unwrap_or(inner.len());
    inner[tag_len..].trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fox() -> ExtractionResult {
        ExtractionResult {
            words: vec!["quick".into(), "brown".into(), "fox".into(), "jumps".into()],
            total_words: 4,
            language_level: "B1".into(),
            analysis: "Contains common adjectives and an irregular verb.".into(),
        }
    }

    fn parse(raw: &str) -> Result<ExtractionResult, SchemaValidationError> {
        parse_extraction_result(raw, &SchemaRules::default())
    }

    #[test]
    fn test_serialized_record_validates_to_equal_record() {
        let raw = serde_json::to_string(&fox()).unwrap();
        assert_eq!(parse(&raw).unwrap(), fox());
    }

    #[test]
    fn test_duplicates_and_order_preserved() {
        let raw = r#"{"words":["kot","ala","kot"],"total_words":3,"language_level":"A1","analysis":""}"#;
        let result = parse(raw).unwrap();
        assert_eq!(result.words, vec!["kot", "ala", "kot"]);
    }

    #[test]
    fn test_fenced_output_is_accepted() {
        let raw = format!("```json\n{}\n```", serde_json::to_string(&fox()).unwrap());
        assert_eq!(parse(&raw).unwrap(), fox());

        let bare_fence = format!("```{}```", serde_json::to_string(&fox()).unwrap());
        assert_eq!(parse(&bare_fence).unwrap(), fox());

        let pretty = serde_json::to_string_pretty(&fox()).unwrap();
        let bare_multiline = format!("```{pretty}\n```");
        assert_eq!(parse(&bare_multiline).unwrap(), fox());

        let tagged_one_line = format!("```json {}```", serde_json::to_string(&fox()).unwrap());
        assert_eq!(parse(&tagged_one_line).unwrap(), fox());

        let tagged_multiline = format!("```JSON\r\n{pretty}\r\n```");
        assert_eq!(parse(&tagged_multiline).unwrap(), fox());
    }

    #[test]
    fn test_extra_fields_ignored() {
        let raw = r#"{"words":[],"total_words":0,"language_level":"A2","analysis":"none","confidence":0.3}"#;
        assert!(parse(raw).is_ok());
    }

    #[test]
    fn test_each_missing_field_is_named() {
        for missing in ExtractionResult::FIELDS {
            let mut value = serde_json::to_value(fox()).unwrap();
            value.as_object_mut().unwrap().remove(missing);
            let err = parse(&value.to_string()).unwrap_err();
            assert_eq!(err.kind, SchemaViolation::MissingField);
            assert_eq!(err.field.as_deref(), Some(missing));
        }
    }

    #[test]
    fn test_null_counts_as_missing() {
        let raw = r#"{"words":["a"],"total_words":1,"language_level":null,"analysis":"x"}"#;
        let err = parse(raw).unwrap_err();
        assert_eq!(err.kind, SchemaViolation::MissingField);
        assert_eq!(err.field.as_deref(), Some("language_level"));
    }

    #[test]
    fn test_string_total_words_rejected() {
        let raw = r#"{"words":["a","b"],"total_words":"two","language_level":"B1","analysis":"..."}"#;
        let err = parse(raw).unwrap_err();
        assert_eq!(err.kind, SchemaViolation::WrongType);
        assert_eq!(err.field.as_deref(), Some("total_words"));
        assert_eq!(err.expected, "non-negative integer");
        assert!(err.to_string().contains("total_words"));
    }

    #[test]
    fn test_error_message_names_field_path() {
        let err = SchemaValidationError::field(
            "words[2]",
            "string",
            SchemaViolation::WrongType,
            "found integer",
        );
        assert_eq!(
            err.to_string(),
            "wrong type for field 'words[2]': expected string, found integer"
        );

        let err: Box<dyn std::error::Error> =
            Box::new(SchemaValidationError::document(SchemaViolation::NotAnObject, "found array"));
        assert_eq!(
            err.to_string(),
            "output is not a JSON object: expected a JSON object, found array"
        );
    }

    #[test]
    fn test_no_numeric_coercion() {
        for bad in [r#""4""#, "4.0", "4.5", "-1", "true"] {
            let raw = format!(
                r#"{{"words":[],"total_words":{bad},"language_level":"B1","analysis":""}}"#
            );
            let err = parse(&raw).unwrap_err();
            assert_eq!(err.field.as_deref(), Some("total_words"), "input {bad}");
            assert_eq!(err.kind, SchemaViolation::WrongType);
        }
    }

    #[test]
    fn test_non_string_word_reports_index() {
        let raw = r#"{"words":["a","b",3],"total_words":3,"language_level":"B1","analysis":""}"#;
        let err = parse(raw).unwrap_err();
        assert_eq!(err.field.as_deref(), Some("words[2]"));
        assert_eq!(err.expected, "string");
    }

    #[test]
    fn test_words_must_be_array() {
        let raw = r#"{"words":"a b","total_words":2,"language_level":"B1","analysis":""}"#;
        let err = parse(raw).unwrap_err();
        assert_eq!(err.field.as_deref(), Some("words"));
        assert_eq!(err.kind, SchemaViolation::WrongType);
    }

    #[test]
    fn test_malformed_and_non_object_output() {
        let err = parse("Sure! Here are the words: quick, brown").unwrap_err();
        assert_eq!(err.kind, SchemaViolation::Malformed);
        assert!(err.field.is_none());

        let err = parse(r#"["quick","brown"]"#).unwrap_err();
        assert_eq!(err.kind, SchemaViolation::NotAnObject);
        assert!(err.to_string().contains("array"));
    }

    #[test]
    fn test_allowed_levels() {
        let rules = SchemaRules {
            allowed_levels: Some(vec!["A1".into(), "B1".into()]),
            ..SchemaRules::default()
        };
        let raw = serde_json::to_string(&fox()).unwrap();
        assert!(parse_extraction_result(&raw, &rules).is_ok());

        let raw = raw.replace("\"B1\"", "\"b1\"");
        assert!(parse_extraction_result(&raw, &rules).is_ok());

        let raw = raw.replace("\"b1\"", "\"Intermediate\"");
        let err = parse_extraction_result(&raw, &rules).unwrap_err();
        assert_eq!(err.kind, SchemaViolation::DisallowedValue);
        assert_eq!(err.field.as_deref(), Some("language_level"));
    }

    #[test]
    fn test_word_count_trusted_by_default_enforced_on_request() {
        let mut record = fox();
        record.total_words = 7;
        let raw = serde_json::to_string(&record).unwrap();
        assert_eq!(parse(&raw).unwrap().total_words, 7);

        let rules = SchemaRules {
            enforce_word_count: true,
            ..SchemaRules::default()
        };
        let err = parse_extraction_result(&raw, &rules).unwrap_err();
        assert_eq!(err.kind, SchemaViolation::CountMismatch);
        assert_eq!(err.field.as_deref(), Some("total_words"));
    }

    #[test]
    fn test_json_schema_lists_all_fields_as_required() {
        let schema = ExtractionResult::json_schema();
        let required: Vec<&str> = schema["required"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap())
            .collect();
        assert_eq!(required, ExtractionResult::FIELDS);
        assert_eq!(schema["properties"]["total_words"]["type"], "integer");
    }
}
