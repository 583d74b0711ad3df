//! Immutable execution records: attempts, stage sequences, and runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ValidationIssue;

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

/// Which slice of the response schema an attempt sequence targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// The whole response in one call (one-shot scenarios).
    Full,
    Decision,
    ActorProfile,
    ActorPrompt,
}

impl Stage {
    /// The three stages of a sequential run, in order.
    pub const SEQUENCE: [Stage; 3] = [Stage::Decision, Stage::ActorProfile, Stage::ActorPrompt];

    /// 1-based position within its run.
    pub fn number(&self) -> u32 {
        match self {
            Stage::Full | Stage::Decision => 1,
            Stage::ActorProfile => 2,
            Stage::ActorPrompt => 3,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Stage::Full => "full",
            Stage::Decision => "decision",
            Stage::ActorProfile => "actor_profile",
            Stage::ActorPrompt => "actor_prompt",
        }
    }
}

// ---------------------------------------------------------------------------
// Attempt
// ---------------------------------------------------------------------------

/// One generation call and its classified outcome.
///
/// Exactly one of `parsed_response`, a non-empty `validation_errors`, or
/// `error_message` is populated. The constructors keep it that way.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    /// 1-based index within its stage.
    pub attempt: u32,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_tokens: Option<u64>,
    pub prompt: String,
    pub raw_response: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parsed_response: Option<Value>,
    #[serde(default)]
    pub validation_errors: Vec<ValidationIssue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl Attempt {
    fn base(attempt: u32, prompt: String, raw_response: String) -> Self {
        Self {
            attempt,
            timestamp: Utc::now(),
            success: false,
            duration_ms: 0,
            input_tokens: None,
            output_tokens: None,
            prompt,
            raw_response,
            parsed_response: None,
            validation_errors: Vec::new(),
            error_message: None,
        }
    }

    /// The response parsed and validated.
    pub fn succeeded(attempt: u32, prompt: String, raw_response: String, parsed: Value) -> Self {
        Self {
            success: true,
            parsed_response: Some(parsed),
            ..Self::base(attempt, prompt, raw_response)
        }
    }

    /// The response arrived but failed parsing or validation.
    ///
    /// An empty issue list is replaced by a single root-level issue so the
    /// record is never ambiguous.
    pub fn rejected(
        attempt: u32,
        prompt: String,
        raw_response: String,
        mut issues: Vec<ValidationIssue>,
    ) -> Self {
        if issues.is_empty() {
            issues.push(ValidationIssue::invalid_payload(
                "Response rejected without details",
            ));
        }
        Self {
            validation_errors: issues,
            ..Self::base(attempt, prompt, raw_response)
        }
    }

    /// The call itself failed (transport, rate limit, provider error).
    pub fn errored(attempt: u32, prompt: String, message: impl Into<String>) -> Self {
        Self {
            error_message: Some(message.into()),
            ..Self::base(attempt, prompt, String::new())
        }
    }

    pub fn with_timing(mut self, timestamp: DateTime<Utc>, duration_ms: u64) -> Self {
        self.timestamp = timestamp;
        self.duration_ms = duration_ms;
        self
    }

    pub fn with_tokens(mut self, input: Option<u64>, output: Option<u64>) -> Self {
        self.input_tokens = input;
        self.output_tokens = output;
        self
    }

    /// Input plus output tokens, with missing counts treated as zero.
    pub fn tokens_used(&self) -> u64 {
        self.input_tokens.unwrap_or(0) + self.output_tokens.unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// StageRecord / Run
// ---------------------------------------------------------------------------

/// The attempt sequence for one stage of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: Stage,
    pub success: bool,
    pub attempts: Vec<Attempt>,
}

impl StageRecord {
    pub fn new(stage: Stage, attempts: Vec<Attempt>) -> Self {
        let success = attempts.last().is_some_and(|a| a.success);
        Self {
            stage,
            success,
            attempts,
        }
    }

    /// Retries consumed before the stage settled (0 when the first attempt won).
    pub fn retries_used(&self) -> u32 {
        (self.attempts.len() as u32).saturating_sub(1)
    }
}

/// One complete execution of a scenario's protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub run_number: u32,
    pub success: bool,
    pub stages: Vec<StageRecord>,
    pub total_duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_response: Option<Value>,
}

impl Run {
    /// Every attempt of every stage, in execution order.
    pub fn attempts(&self) -> impl Iterator<Item = &Attempt> {
        self.stages.iter().flat_map(|s| s.attempts.iter())
    }

    pub fn attempt_count(&self) -> usize {
        self.stages.iter().map(|s| s.attempts.len()).sum()
    }

    /// The retry tier at which the run succeeded: 0 for first attempt, k for
    /// success after k retries. For multi-stage runs the tier is the largest
    /// retry index any stage needed. `None` for failed runs.
    pub fn retry_tier(&self) -> Option<u32> {
        if !self.success {
            return None;
        }
        Some(
            self.stages
                .iter()
                .map(StageRecord::retries_used)
                .max()
                .unwrap_or(0),
        )
    }

    pub fn first_attempt_succeeded(&self) -> bool {
        self.retry_tier() == Some(0)
    }

    pub fn input_tokens(&self) -> u64 {
        self.attempts().map(|a| a.input_tokens.unwrap_or(0)).sum()
    }

    pub fn output_tokens(&self) -> u64 {
        self.attempts().map(|a| a.output_tokens.unwrap_or(0)).sum()
    }

    /// Tokens across all attempts, failed ones included.
    pub fn tokens_used(&self) -> u64 {
        self.attempts().map(Attempt::tokens_used).sum()
    }
}
