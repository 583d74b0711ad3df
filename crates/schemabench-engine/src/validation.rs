//! Validation adapter: raw text in, validated JSON or normalized issues out.
//!
//! The rendered [`ResponseSchema::json_schema`] document is compiled with
//! `jsonschema` and every validator error is converted into a
//! [`ValidationIssue`]. Call [`validate`] on response text, or
//! [`validate_value`] on an object the provider already decoded. Code-fence
//! stripping happens before this layer.
//!
//! The outer `Result` fails only when the schema itself does not compile.

use jsonschema::error::ValidationErrorKind;
use serde_json::Value;

use schemabench_types::{BenchError, IssueCode, PathSegment, Result, ValidationIssue};

use crate::schema::ResponseSchema;

/// A validated value, or every issue found in it.
pub type Checked = std::result::Result<Value, Vec<ValidationIssue>>;

/// Parse `raw` as JSON and check it against `schema`.
///
/// Unparseable text yields exactly one `invalid_payload` issue at the root.
pub fn validate(raw: &str, schema: &ResponseSchema) -> Result<Checked> {
    match serde_json::from_str::<Value>(raw.trim()) {
        Ok(value) => validate_value(value, schema),
        Err(e) => Ok(Err(vec![ValidationIssue::invalid_payload(format!(
            "Invalid JSON: {e}"
        ))])),
    }
}

/// Check an already-parsed value, one issue per violated constraint,
/// ordered by path.
pub fn validate_value(value: Value, schema: &ResponseSchema) -> Result<Checked> {
    let document = schema.json_schema();
    let mut issues = check(&document, &value, "", schema.name)?;
    if issues.is_empty() {
        return Ok(Ok(value));
    }
    issues.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(Err(issues))
}

// ---------------------------------------------------------------------------
// Compilation
// ---------------------------------------------------------------------------

/// Run `document` against `value`. `prefix` is the pointer of `value` inside
/// the response being validated.
fn check(document: &Value, value: &Value, prefix: &str, name: &str) -> Result<Vec<ValidationIssue>> {
    let validator = jsonschema::validator_for(document).map_err(|e| BenchError::InvalidSchema {
        name: name.to_string(),
        message: e.to_string(),
    })?;

    let mut issues = Vec::new();
    for error in validator.iter_errors(value) {
        let pointer = format!("{prefix}{}", error.instance_path);
        let schema_path = error.schema_path.to_string();
        match &error.kind {
            ValidationErrorKind::AnyOf { .. } => {
                issues.extend(check_nullable(document, &schema_path, &error.instance, &pointer, name)?);
            }
            kind => issues.push(normalize(
                kind,
                document.pointer(&schema_path),
                &error.instance,
                &pointer,
                error.to_string(),
            )),
        }
    }
    Ok(issues)
}

/// `anyOf` only appears as `[inner, {"type": "null"}]`. A non-null value
/// failed the inner branch, so report that branch's errors instead of the
/// bare union failure.
fn check_nullable(
    document: &Value,
    schema_path: &str,
    instance: &Value,
    pointer: &str,
    name: &str,
) -> Result<Vec<ValidationIssue>> {
    let inner = document
        .pointer(schema_path)
        .and_then(Value::as_array)
        .and_then(|branches| branches.iter().find(|b| b["type"] != "null"));
    match inner {
        Some(inner) if !instance.is_null() => {
            let issues = check(inner, instance, pointer, name)?;
            if !issues.is_empty() {
                return Ok(issues);
            }
        }
        _ => {}
    }
    Ok(vec![ValidationIssue::new(
        pointer_to_path(pointer),
        IssueCode::InvalidUnion,
        "Value matches none of the allowed shapes",
    )])
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

/// `keyword` is the schema value of the failing keyword, when it resolves.
fn normalize(
    kind: &ValidationErrorKind,
    keyword: Option<&Value>,
    instance: &Value,
    pointer: &str,
    fallback: String,
) -> ValidationIssue {
    let mut path = pointer_to_path(pointer);
    let (code, message) = match kind {
        ValidationErrorKind::Type { .. } => {
            let expected = keyword.map(type_names).unwrap_or_else(|| "another type".to_string());
            (
                IssueCode::InvalidType,
                format!("Expected {expected}, received {}", json_type(instance)),
            )
        }
        ValidationErrorKind::Required { property } => {
            path.push(PathSegment::Key(
                property.as_str().map(str::to_string).unwrap_or_else(|| property.to_string()),
            ));
            (IssueCode::Required, "Required field is missing".to_string())
        }
        ValidationErrorKind::AdditionalProperties { unexpected } => {
            let keys = unexpected
                .iter()
                .map(|k| format!("'{k}'"))
                .collect::<Vec<_>>()
                .join(", ");
            (
                IssueCode::UnrecognizedKey,
                format!("Unrecognized key(s) in object: {keys}"),
            )
        }
        ValidationErrorKind::MinLength { limit } => (
            IssueCode::TooSmall,
            format!("String must contain at least {limit} character(s)"),
        ),
        ValidationErrorKind::MaxLength { limit } => (
            IssueCode::TooBig,
            format!("String must contain at most {limit} character(s)"),
        ),
        ValidationErrorKind::MinItems { limit } => (
            IssueCode::TooSmall,
            format!("Array must contain at least {limit} element(s)"),
        ),
        ValidationErrorKind::MaxItems { limit } => (
            IssueCode::TooBig,
            format!("Array must contain at most {limit} element(s)"),
        ),
        ValidationErrorKind::Enum { options } => match options.as_array().map(Vec::as_slice) {
            Some([only]) => (
                IssueCode::InvalidLiteral,
                format!("Invalid literal value, expected {only}"),
            ),
            Some(many) => {
                let expected = many.iter().map(quoted).collect::<Vec<_>>().join(" | ");
                (
                    IssueCode::InvalidEnumValue,
                    format!(
                        "Invalid enum value. Expected {expected}, received {}",
                        quoted(instance)
                    ),
                )
            }
            None => (IssueCode::InvalidEnumValue, fallback),
        },
        ValidationErrorKind::Constant { expected_value } => (
            IssueCode::InvalidLiteral,
            format!("Invalid literal value, expected {expected_value}"),
        ),
        _ => (IssueCode::Custom, fallback),
    };
    ValidationIssue::new(path, code, message)
}

fn type_names(keyword: &Value) -> String {
    match keyword {
        Value::String(name) => name.clone(),
        Value::Array(names) => names
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(" | "),
        other => other.to_string(),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn quoted(value: &Value) -> String {
    match value.as_str() {
        Some(s) => format!("'{s}'"),
        None => value.to_string(),
    }
}

/// Split an RFC 6901 pointer into path segments. All-digit segments are
/// array indices; the schemas never use numeric property names.
fn pointer_to_path(pointer: &str) -> Vec<PathSegment> {
    if pointer.is_empty() {
        return Vec::new();
    }
    pointer
        .trim_start_matches('/')
        .split('/')
        .map(|raw| {
            let seg = raw.replace("~1", "/").replace("~0", "~");
            match seg.parse::<usize>() {
                Ok(i) if !seg.is_empty() && seg.bytes().all(|b| b.is_ascii_digit()) => {
                    PathSegment::Index(i)
                }
                _ => PathSegment::Key(seg),
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
