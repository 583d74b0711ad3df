//! Normalized validation issues.
//!
//! Every validator-native error (parse failures, schema violations, provider
//! refusals) is reduced to a `ValidationIssue` so retry prompts, logs, and
//! persisted records all speak the same shape.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One step in the path to an offending field.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

impl From<&str> for PathSegment {
    fn from(key: &str) -> Self {
        PathSegment::Key(key.to_string())
    }
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        PathSegment::Index(index)
    }
}

/// Machine-readable kind of a validation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCode {
    /// The payload could not be parsed as JSON at all.
    InvalidPayload,
    InvalidType,
    Required,
    UnrecognizedKey,
    TooSmall,
    TooBig,
    InvalidEnumValue,
    InvalidLiteral,
    /// A nullable value matched neither branch.
    InvalidUnion,
    /// A constraint with no dedicated code.
    Custom,
    /// The provider declined to answer in the requested shape.
    Refusal,
    /// Enforced decoding returned no structured object.
    MissingStructuredOutput,
}

impl IssueCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueCode::InvalidPayload => "invalid_payload",
            IssueCode::InvalidType => "invalid_type",
            IssueCode::Required => "required",
            IssueCode::UnrecognizedKey => "unrecognized_key",
            IssueCode::TooSmall => "too_small",
            IssueCode::TooBig => "too_big",
            IssueCode::InvalidEnumValue => "invalid_enum_value",
            IssueCode::InvalidLiteral => "invalid_literal",
            IssueCode::InvalidUnion => "invalid_union",
            IssueCode::Custom => "custom",
            IssueCode::Refusal => "refusal",
            IssueCode::MissingStructuredOutput => "missing_structured_output",
        }
    }
}

impl fmt::Display for IssueCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single normalized validation failure: where, what, and which kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub path: Vec<PathSegment>,
    pub message: String,
    pub code: IssueCode,
}

impl ValidationIssue {
    pub fn new(path: Vec<PathSegment>, code: IssueCode, message: impl Into<String>) -> Self {
        Self {
            path,
            message: message.into(),
            code,
        }
    }

    /// A root-level issue for text that is not valid JSON.
    pub fn invalid_payload(message: impl Into<String>) -> Self {
        Self::new(Vec::new(), IssueCode::InvalidPayload, message)
    }

    /// Dotted path with bracketed indices, e.g. `action.actor.skills[1]`.
    /// Root-level issues render as `(root)`.
    pub fn path_string(&self) -> String {
        if self.path.is_empty() {
            return "(root)".to_string();
        }
        let mut out = String::new();
        for segment in &self.path {
            match segment {
                PathSegment::Key(key) => {
                    if !out.is_empty() {
                        out.push('.');
                    }
                    out.push_str(key);
                }
                PathSegment::Index(i) => {
                    out.push('[');
                    out.push_str(&i.to_string());
                    out.push(']');
                }
            }
        }
        out
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path_string(), self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_string_root() {
        let issue = ValidationIssue::invalid_payload("Unexpected token");
        assert_eq!(issue.path_string(), "(root)");
        assert_eq!(issue.to_string(), "(root): Unexpected token");
    }

    #[test]
    fn path_string_nested_with_index() {
        let issue = ValidationIssue::new(
            vec!["action".into(), "actor".into(), "skills".into(), 1.into()],
            IssueCode::TooSmall,
            "String must contain at least 1 character(s)",
        );
        assert_eq!(issue.path_string(), "action.actor.skills[1]");
    }

    #[test]
    fn path_string_leading_index() {
        let issue = ValidationIssue::new(vec![0.into(), "title".into()], IssueCode::Required, "x");
        assert_eq!(issue.path_string(), "[0].title");
    }

    #[test]
    fn code_serializes_snake_case() {
        let json = serde_json::to_string(&IssueCode::InvalidEnumValue).unwrap();
        assert_eq!(json, "\"invalid_enum_value\"");
        assert_eq!(IssueCode::MissingStructuredOutput.as_str(), "missing_structured_output");
    }

    #[test]
    fn issue_serde_shape() {
        let issue = ValidationIssue::new(
            vec!["skills".into(), 2.into()],
            IssueCode::InvalidType,
            "Expected string, received number",
        );
        let value = serde_json::to_value(&issue).unwrap();
        assert_eq!(value["path"], serde_json::json!(["skills", 2]));
        assert_eq!(value["code"], "invalid_type");

        let back: ValidationIssue = serde_json::from_value(value).unwrap();
        assert_eq!(back, issue);
    }
}
