use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::model::cell::{CONTENT_MAX_CHARS, HISTORY_LIMIT, INFO_MAX_CHARS};
use crate::model::wire::{CELL_KEYS, HISTORY_KEYS, TREATMENT_KEYS};
use crate::ops::dates::{MAX_EXTENSION_DAYS, parse_date};
use crate::util::unicode::{grapheme_count, truncate_graphemes};

/// Markup or script fragments that must never reach the document
static INJECTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)<\s*/?\s*[a-z!?][^>]*>?|javascript\s*:|vbscript\s*:|data\s*:\s*text/html|\bon[a-z]+\s*=",
    )
    .expect("injection pattern is valid")
});

const FLAG_KEYS: &[&str] = &[
    "isBreak",
    "isSplit",
    "isMassage",
    "isPnf",
    "isEveryOtherDay",
    "isMassage1",
    "isMassage2",
    "isPnf1",
    "isPnf2",
    "isEveryOtherDay1",
    "isEveryOtherDay2",
];

const CONTENT_KEYS: &[&str] = &["content", "content1", "content2"];

/// A structural problem found in a persisted cell
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("cell is not an object")]
    NotAnObject,
    #[error("unknown key `{0}`")]
    UnknownKey(String),
    #[error("unknown key `{key}` in {field}")]
    UnknownNestedKey { field: String, key: String },
    #[error("{field}: `{value}` is not a valid YYYY-MM-DD date")]
    InvalidDate { field: String, value: String },
    #[error("{field}: extension must be an integer between 0 and 365")]
    ExtensionOutOfRange { field: String },
    #[error("{field}: expected boolean or null")]
    NotBoolean { field: String },
    #[error("{field}: expected string")]
    NotString { field: String },
    #[error("{field}: expected object or null")]
    NotObject { field: String },
    #[error("{field}: longer than {max} characters")]
    TooLong { field: String, max: usize },
    #[error("{field}: contains markup or script")]
    Injection { field: String },
    #[error("history must be an array")]
    HistoryNotArray,
    #[error("history has {0} entries (max 10)")]
    HistoryTooLong(usize),
    #[error("split cell has non-empty `content`")]
    SplitWithContent,
}

/// Outcome of validating one cell
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<ValidationError>,
}

impl Serialize for ValidationError {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl Serialize for ValidationResult {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut s = serializer.serialize_struct("ValidationResult", 2)?;
        s.serialize_field("valid", &self.valid)?;
        s.serialize_field("errors", &self.errors)?;
        s.end()
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Check a persisted cell against the whitelist and field rules.
///
/// This is a read-only operation; see [`sanitize_cell_state`] for the
/// best-effort repair applied before every persist.
pub fn validate_cell_state(cell: &Value) -> ValidationResult {
    let mut errors = Vec::new();
    let Some(obj) = cell.as_object() else {
        return ValidationResult {
            valid: false,
            errors: vec![ValidationError::NotAnObject],
        };
    };

    for (key, value) in obj {
        if !CELL_KEYS.contains(&key.as_str()) {
            errors.push(ValidationError::UnknownKey(key.clone()));
            continue;
        }
        match key.as_str() {
            k if FLAG_KEYS.contains(&k) => check_flag(k, value, &mut errors),
            k if CONTENT_KEYS.contains(&k) => check_text(k, value, CONTENT_MAX_CHARS, &mut errors),
            "additionalInfo" => check_text(key, value, INFO_MAX_CHARS, &mut errors),
            "treatmentStartDate" | "treatmentEndDate" => check_date(key, value, &mut errors),
            "treatmentExtensionDays" => check_extension(key, value, &mut errors),
            "treatmentData1" | "treatmentData2" => check_treatment(key, value, &mut errors),
            "history" => match value.as_array() {
                Some(entries) if entries.len() > HISTORY_LIMIT => {
                    errors.push(ValidationError::HistoryTooLong(entries.len()))
                }
                Some(_) => {}
                None => errors.push(ValidationError::HistoryNotArray),
            },
            _ => {}
        }
    }

    let is_split = obj.get("isSplit").and_then(Value::as_bool).unwrap_or(false);
    let whole_content = obj.get("content").and_then(Value::as_str).unwrap_or("");
    if is_split && !whole_content.trim().is_empty() {
        errors.push(ValidationError::SplitWithContent);
    }

    ValidationResult {
        valid: errors.is_empty(),
        errors,
    }
}

fn check_flag(field: &str, value: &Value, errors: &mut Vec<ValidationError>) {
    if !matches!(value, Value::Bool(_) | Value::Null) {
        errors.push(ValidationError::NotBoolean {
            field: field.to_string(),
        });
    }
}

fn check_text(field: &str, value: &Value, max: usize, errors: &mut Vec<ValidationError>) {
    let Some(text) = value.as_str() else {
        if !value.is_null() {
            errors.push(ValidationError::NotString {
                field: field.to_string(),
            });
        }
        return;
    };
    if grapheme_count(text) > max {
        errors.push(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }
    if INJECTION.is_match(text) {
        errors.push(ValidationError::Injection {
            field: field.to_string(),
        });
    }
}

fn check_date(field: &str, value: &Value, errors: &mut Vec<ValidationError>) {
    match value {
        Value::Null => {}
        Value::String(s) if parse_date(s).is_some() => {}
        other => errors.push(ValidationError::InvalidDate {
            field: field.to_string(),
            value: match other {
                Value::String(s) => s.clone(),
                v => v.to_string(),
            },
        }),
    }
}

fn check_extension(field: &str, value: &Value, errors: &mut Vec<ValidationError>) {
    let ok = match value {
        Value::Null => true,
        Value::Number(n) => n
            .as_i64()
            .is_some_and(|n| (0..=MAX_EXTENSION_DAYS as i64).contains(&n)),
        _ => false,
    };
    if !ok {
        errors.push(ValidationError::ExtensionOutOfRange {
            field: field.to_string(),
        });
    }
}

fn check_treatment(field: &str, value: &Value, errors: &mut Vec<ValidationError>) {
    let obj = match value {
        Value::Null => return,
        Value::Object(obj) => obj,
        _ => {
            errors.push(ValidationError::NotObject {
                field: field.to_string(),
            });
            return;
        }
    };
    for (key, nested) in obj {
        let path = format!("{}.{}", field, key);
        match key.as_str() {
            "startDate" | "endDate" => check_date(&path, nested, errors),
            "extensionDays" => check_extension(&path, nested, errors),
            "additionalInfo" => check_text(&path, nested, INFO_MAX_CHARS, errors),
            _ => errors.push(ValidationError::UnknownNestedKey {
                field: field.to_string(),
                key: key.clone(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Sanitization
// ---------------------------------------------------------------------------

/// Produce a best-effort clean copy of a persisted cell.
///
/// Unknown keys are dropped, history is truncated, nested treatment objects
/// are cleaned against their own whitelist, free text is stripped of markup
/// and cut to its limit, and fields with unusable values are removed. A
/// split cell loses any whole-cell `content`. The result always passes
/// [`validate_cell_state`].
pub fn sanitize_cell_state(cell: &Value) -> Value {
    let Some(obj) = cell.as_object() else {
        return Value::Object(Map::new());
    };
    let mut out = Map::new();

    for (key, value) in obj {
        if !CELL_KEYS.contains(&key.as_str()) {
            continue;
        }
        let cleaned = match key.as_str() {
            k if FLAG_KEYS.contains(&k) => clean_flag(value),
            k if CONTENT_KEYS.contains(&k) => clean_text(value, CONTENT_MAX_CHARS),
            "additionalInfo" => clean_text(value, INFO_MAX_CHARS),
            "treatmentStartDate" | "treatmentEndDate" => clean_date(value),
            "treatmentExtensionDays" => clean_extension(value),
            "treatmentData1" | "treatmentData2" => clean_treatment(value),
            "history" => clean_history(value),
            _ => None,
        };
        if let Some(v) = cleaned {
            out.insert(key.clone(), v);
        }
    }

    if out.get("isSplit").and_then(Value::as_bool).unwrap_or(false) {
        out.remove("content");
    }

    Value::Object(out)
}

fn clean_flag(value: &Value) -> Option<Value> {
    matches!(value, Value::Bool(_) | Value::Null).then(|| value.clone())
}

/// Strip markup until none is left, then cut to `max` characters
pub fn clean_str(text: &str, max: usize) -> String {
    let mut stripped = text.to_string();
    while INJECTION.is_match(&stripped) {
        stripped = INJECTION.replace_all(&stripped, "").into_owned();
    }
    truncate_graphemes(&stripped, max)
}

fn clean_text(value: &Value, max: usize) -> Option<Value> {
    match value {
        Value::String(s) => Some(Value::String(clean_str(s, max))),
        Value::Null => Some(Value::Null),
        _ => None,
    }
}

fn clean_date(value: &Value) -> Option<Value> {
    match value {
        Value::String(s) if parse_date(s).is_some() => Some(value.clone()),
        Value::Null => Some(Value::Null),
        _ => None,
    }
}

fn clean_extension(value: &Value) -> Option<Value> {
    match value {
        Value::Null => Some(Value::Null),
        Value::Number(_) | Value::String(_) => {
            Some(Value::from(crate::ops::dates::parse_extension(value)))
        }
        _ => None,
    }
}

fn clean_treatment(value: &Value) -> Option<Value> {
    match value {
        Value::Null => Some(Value::Null),
        Value::Object(obj) => {
            let mut out = Map::new();
            for (key, nested) in obj {
                let cleaned = match key.as_str() {
                    "startDate" | "endDate" => clean_date(nested),
                    "extensionDays" => clean_extension(nested),
                    "additionalInfo" => clean_text(nested, INFO_MAX_CHARS),
                    _ => None,
                };
                if let Some(v) = cleaned
                    && TREATMENT_KEYS.contains(&key.as_str())
                {
                    out.insert(key.clone(), v);
                }
            }
            Some(Value::Object(out))
        }
        _ => None,
    }
}

fn clean_history(value: &Value) -> Option<Value> {
    let entries = value.as_array()?;
    let cleaned = entries
        .iter()
        .filter_map(Value::as_object)
        .take(HISTORY_LIMIT)
        .map(|entry| {
            let kept: Map<String, Value> = entry
                .iter()
                .filter(|(k, _)| HISTORY_KEYS.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            Value::Object(kept)
        })
        .collect();
    Some(Value::Array(cleaned))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn valid_whole() -> Value {
        json!({
            "content": "Kowalski",
            "isMassage": true,
            "isPnf": null,
            "isEveryOtherDay": false,
            "treatmentStartDate": "2024-01-15",
            "treatmentExtensionDays": 0,
            "treatmentEndDate": "2024-02-05",
            "additionalInfo": "kolano",
        })
    }

    #[test]
    fn valid_whole_cell_passes() {
        let result = validate_cell_state(&valid_whole());
        assert!(result.valid, "{:?}", result.errors);
        assert!(result.errors.is_empty());
    }

    #[test]
    fn unknown_key_is_flagged_and_sanitized_away() {
        let mut cell = valid_whole();
        cell["color"] = json!("red");
        let result = validate_cell_state(&cell);
        assert!(!result.valid);
        assert_eq!(result.errors, vec![ValidationError::UnknownKey("color".into())]);

        let clean = sanitize_cell_state(&cell);
        assert!(clean.get("color").is_none());
        assert_eq!(clean, valid_whole());
        assert!(validate_cell_state(&clean).valid);
    }

    #[test]
    fn bad_dates_are_rejected() {
        let cell = json!({
            "content": "Nowak",
            "treatmentStartDate": "2024-02-30",
            "treatmentEndDate": "15/01/2024",
        });
        let result = validate_cell_state(&cell);
        assert_eq!(result.errors.len(), 2);
        assert!(matches!(result.errors[0], ValidationError::InvalidDate { .. }));
        let clean = sanitize_cell_state(&cell);
        assert_eq!(clean, json!({"content": "Nowak"}));
    }

    #[test]
    fn extension_range_enforced() {
        for bad in [json!(-1), json!(366), json!("5"), json!(1.5)] {
            let cell = json!({"content": "A", "treatmentExtensionDays": bad});
            let result = validate_cell_state(&cell);
            assert!(!result.valid, "{} should be rejected", bad);
        }
        for good in [json!(0), json!(365), Value::Null] {
            let cell = json!({"content": "A", "treatmentExtensionDays": good});
            assert!(validate_cell_state(&cell).valid);
        }
        let clean = sanitize_cell_state(&json!({"treatmentExtensionDays": 1000}));
        assert_eq!(clean, json!({"treatmentExtensionDays": 365}));
    }

    #[test]
    fn flags_must_be_boolean_or_null() {
        let cell = json!({"content": "A", "isPnf": "yes", "isMassage1": 1});
        let result = validate_cell_state(&cell);
        assert_eq!(result.errors.len(), 2);
        let clean = sanitize_cell_state(&cell);
        assert_eq!(clean, json!({"content": "A"}));
    }

    #[test]
    fn split_with_content_is_invariant_violation() {
        let cell = json!({"isSplit": true, "content": "stray", "content1": "A", "content2": ""});
        let result = validate_cell_state(&cell);
        assert_eq!(result.errors, vec![ValidationError::SplitWithContent]);
        let clean = sanitize_cell_state(&cell);
        assert!(clean.get("content").is_none());
        assert!(validate_cell_state(&clean).valid);
    }

    #[test]
    fn text_limits_and_injection() {
        let long = "x".repeat(40);
        let cell = json!({
            "content": long,
            "additionalInfo": "<script>alert(1)</script>ok",
        });
        let result = validate_cell_state(&cell);
        assert!(result.errors.contains(&ValidationError::TooLong {
            field: "content".into(),
            max: CONTENT_MAX_CHARS
        }));
        assert!(result.errors.contains(&ValidationError::Injection {
            field: "additionalInfo".into()
        }));

        let clean = sanitize_cell_state(&cell);
        assert_eq!(clean["content"].as_str().unwrap().len(), CONTENT_MAX_CHARS);
        assert_eq!(clean["additionalInfo"], json!("alert(1)ok"));
        assert!(validate_cell_state(&clean).valid);
    }

    #[test]
    fn nested_markup_is_stripped_completely() {
        for (text, expected) in [
            ("<<a>script>alert(1)", "alert(1)"),
            ("javajavascript:script:x", "x"),
            ("on<b>click=go", "go"),
        ] {
            let clean = sanitize_cell_state(&json!({ "content": text, "additionalInfo": text }));
            assert_eq!(clean["content"], json!(expected), "content from {}", text);
            assert_eq!(clean["additionalInfo"], json!(expected), "info from {}", text);
            assert!(validate_cell_state(&clean).valid, "{} left markup behind", text);
        }
    }

    #[test]
    fn event_handler_and_javascript_urls_are_injection() {
        for text in ["x onerror=alert(1)", "javascript:void(0)", "<img src=x>"] {
            let result = validate_cell_state(&json!({ "content": text }));
            assert!(!result.valid, "{} should be flagged", text);
        }
        // Ordinary clinic notes are fine
        let result = validate_cell_state(&json!({"additionalInfo": "bark + kręgosłup, 2x/tydz."}));
        assert!(result.valid);
    }

    #[test]
    fn nested_treatment_whitelist() {
        let cell = json!({
            "isSplit": true,
            "content1": "A",
            "treatmentData1": {
                "startDate": "2024-01-15",
                "extensionDays": 2,
                "endDate": "2024-02-07",
                "note": "drop me",
            },
            "treatmentData2": "not an object",
        });
        let result = validate_cell_state(&cell);
        assert!(result.errors.contains(&ValidationError::UnknownNestedKey {
            field: "treatmentData1".into(),
            key: "note".into()
        }));
        assert!(result.errors.contains(&ValidationError::NotObject {
            field: "treatmentData2".into()
        }));

        let clean = sanitize_cell_state(&cell);
        assert_eq!(
            clean,
            json!({
                "isSplit": true,
                "content1": "A",
                "treatmentData1": {
                    "startDate": "2024-01-15",
                    "extensionDays": 2,
                    "endDate": "2024-02-07",
                },
            })
        );
        assert!(validate_cell_state(&clean).valid);
    }

    #[test]
    fn history_truncated_to_limit() {
        let entries: Vec<Value> = (0..14)
            .map(|i| json!({"oldValue": i.to_string(), "timestamp": "2024-01-15T08:00:00Z", "authorId": "u", "extra": 1}))
            .collect();
        let cell = json!({"content": "A", "history": entries});
        let result = validate_cell_state(&cell);
        assert_eq!(result.errors, vec![ValidationError::HistoryTooLong(14)]);

        let clean = sanitize_cell_state(&cell);
        let history = clean["history"].as_array().unwrap();
        assert_eq!(history.len(), HISTORY_LIMIT);
        assert!(history[0].get("extra").is_none());
        assert_eq!(history[0]["oldValue"], json!("0"));
    }

    #[test]
    fn non_object_cell() {
        let result = validate_cell_state(&json!([1, 2]));
        assert_eq!(result.errors, vec![ValidationError::NotAnObject]);
        assert_eq!(sanitize_cell_state(&json!("x")), json!({}));
    }

    #[test]
    fn errors_serialize_as_messages() {
        let result = validate_cell_state(&json!({"bogus": 1}));
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json, json!({"valid": false, "errors": ["unknown key `bogus`"]}));
    }
}
