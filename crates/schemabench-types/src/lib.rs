//! Shared types, errors, and execution records for the schemabench engine.
//!
//! This crate provides the foundational types used across all other schemabench crates:
//! - `BenchError`: unified error taxonomy
//! - `ValidationIssue`: normalized schema violation (path, message, code)
//! - `Attempt`, `StageRecord`, `Run`: immutable records of what was sent and received

mod issue;
mod record;

pub use issue::{IssueCode, PathSegment, ValidationIssue};
pub use record::{Attempt, Run, Stage, StageRecord};

/// Unified error type for all schemabench subsystems.
#[derive(Debug, thiserror::Error)]
pub enum BenchError {
    // === LLM Provider Errors ===
    #[error("Provider {provider} returned HTTP {status}: {message}")]
    ProviderError {
        provider: String,
        status: u16,
        message: String,
        retryable: bool,
    },

    #[error("Rate limited by {provider}, retry after {retry_after_ms}ms")]
    RateLimited {
        provider: String,
        retry_after_ms: u64,
    },

    #[error("Authentication failed for provider {provider}")]
    AuthError { provider: String },

    #[error("Request to {provider} timed out after {timeout_ms}ms")]
    RequestTimeout { provider: String, timeout_ms: u64 },

    #[error("Provider {provider} rejected the response shape ({} issue(s))", .issues.len())]
    SchemaRejected {
        provider: String,
        issues: Vec<ValidationIssue>,
        raw_response: String,
    },

    #[error("Provider '{provider}' is not registered")]
    ProviderUnavailable { provider: String },

    // === Engine Errors ===
    #[error("Internal invariant violated in scenario '{scenario}' run {run}: {message}")]
    InvariantViolation {
        scenario: String,
        run: u32,
        message: String,
    },

    #[error("Schema '{name}' does not compile: {message}")]
    InvalidSchema { name: String, message: String },

    #[error("Benchmark cancelled")]
    Cancelled,

    // === Configuration Errors ===
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // === Generic ===
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl BenchError {
    /// Returns `true` if the error is transient and the call may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BenchError::RateLimited { .. }
                | BenchError::RequestTimeout { .. }
                | BenchError::SchemaRejected { .. }
                | BenchError::ProviderError { retryable: true, .. }
        )
    }

    /// Returns `true` if no amount of retrying can succeed and the whole
    /// scenario must stop.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            BenchError::AuthError { .. } | BenchError::ProviderUnavailable { .. }
        )
    }
}

/// A convenience alias for `Result<T, BenchError>`.
pub type Result<T> = std::result::Result<T, BenchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_provider_error() {
        let err = BenchError::ProviderError {
            provider: "openai".into(),
            status: 500,
            message: "internal server error".into(),
            retryable: true,
        };
        assert_eq!(
            err.to_string(),
            "Provider openai returned HTTP 500: internal server error"
        );
    }

    #[test]
    fn error_display_auth_error() {
        let err = BenchError::AuthError {
            provider: "anthropic".into(),
        };
        assert_eq!(err.to_string(), "Authentication failed for provider anthropic");
    }

    #[test]
    fn error_display_schema_rejected_counts_issues() {
        let err = BenchError::SchemaRejected {
            provider: "openai".into(),
            issues: vec![
                ValidationIssue::new(vec![], IssueCode::Refusal, "refused"),
                ValidationIssue::invalid_payload("not json"),
            ],
            raw_response: String::new(),
        };
        assert_eq!(
            err.to_string(),
            "Provider openai rejected the response shape (2 issue(s))"
        );
    }

    #[test]
    fn error_display_invariant_violation() {
        let err = BenchError::InvariantViolation {
            scenario: "sequential_guided".into(),
            run: 4,
            message: "merged output failed validation".into(),
        };
        assert_eq!(
            err.to_string(),
            "Internal invariant violated in scenario 'sequential_guided' run 4: merged output failed validation"
        );
    }

    #[test]
    fn error_display_invalid_config() {
        let err = BenchError::InvalidConfig("no models selected".into());
        assert_eq!(err.to_string(), "Invalid configuration: no models selected");
    }

    // --- is_retryable ---

    #[test]
    fn retryable_rate_limited() {
        let err = BenchError::RateLimited {
            provider: "x".into(),
            retry_after_ms: 1000,
        };
        assert!(err.is_retryable());
    }

    #[test]
    fn retryable_provider_error_when_flagged() {
        let err = BenchError::ProviderError {
            provider: "x".into(),
            status: 503,
            message: "unavailable".into(),
            retryable: true,
        };
        assert!(err.is_retryable());
    }

    #[test]
    fn not_retryable_provider_error_when_not_flagged() {
        let err = BenchError::ProviderError {
            provider: "x".into(),
            status: 400,
            message: "bad request".into(),
            retryable: false,
        };
        assert!(!err.is_retryable());
    }

    #[test]
    fn not_retryable_auth_error() {
        let err = BenchError::AuthError {
            provider: "x".into(),
        };
        assert!(!err.is_retryable());
    }

    // --- is_fatal ---

    #[test]
    fn fatal_auth_and_missing_provider() {
        assert!(BenchError::AuthError {
            provider: "x".into()
        }
        .is_fatal());
        assert!(BenchError::ProviderUnavailable {
            provider: "x".into()
        }
        .is_fatal());
    }

    #[test]
    fn transient_errors_are_not_fatal() {
        let err = BenchError::RequestTimeout {
            provider: "x".into(),
            timeout_ms: 30_000,
        };
        assert!(!err.is_fatal());
        assert!(!BenchError::Other("boom".into()).is_fatal());
    }

    #[test]
    fn broken_schema_aborts_only_the_scenario() {
        let err = BenchError::InvalidSchema {
            name: "decision".into(),
            message: "12 is not valid under any of the schemas".into(),
        };
        assert!(!err.is_fatal());
        assert!(!err.is_retryable());
        assert!(err.to_string().starts_with("Schema 'decision' does not compile"));
    }

    // --- From impls ---

    #[test]
    fn from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: BenchError = io_err.into();
        assert!(matches!(err, BenchError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: BenchError = json_err.into();
        assert!(matches!(err, BenchError::Json(_)));
    }
}
