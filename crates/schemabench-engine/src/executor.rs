//! Attempt executor: one generation call, classified into an [`Attempt`].

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;

use schemabench_llm::{Message, ModelRef, Role};
use schemabench_types::{Attempt, BenchError, Result};

use crate::generator::{GenerationMode, GenerationParams, GenerationRequest, Generator};
use crate::prompts::schema_instruction;
use crate::schema::ResponseSchema;
use crate::validation::{validate, validate_value};

pub struct AttemptExecutor {
    generator: Arc<dyn Generator>,
    mode: GenerationMode,
    params: GenerationParams,
}

impl AttemptExecutor {
    pub fn new(generator: Arc<dyn Generator>, mode: GenerationMode, params: GenerationParams) -> Self {
        Self {
            generator,
            mode,
            params,
        }
    }

    pub fn mode(&self) -> GenerationMode {
        self.mode
    }

    /// Perform attempt number `attempt` against `schema`.
    ///
    /// Only fatal generator errors and a schema that does not compile surface
    /// as `Err`; every other outcome, including transport failures, becomes a
    /// recorded attempt.
    pub async fn execute(
        &self,
        model: &ModelRef,
        attempt: u32,
        messages: &[Message],
        schema: &ResponseSchema,
    ) -> Result<Attempt> {
        let sent = match self.mode {
            GenerationMode::Guided => with_schema_instruction(messages, schema),
            GenerationMode::Enforced => messages.to_vec(),
        };
        let prompt = render_prompt(&sent);

        let timestamp = Utc::now();
        let started = Instant::now();
        let outcome = self
            .generator
            .invoke(&GenerationRequest {
                model,
                messages: &sent,
                schema,
                mode: self.mode,
                params: self.params,
            })
            .await;
        let duration_ms = started.elapsed().as_millis() as u64;

        let record = match outcome {
            Ok(generation) => {
                let checked = match (self.mode, generation.object) {
                    (GenerationMode::Enforced, Some(object)) => validate_value(object, schema)?,
                    _ => validate(&strip_code_fence(&generation.text), schema)?,
                };
                let usage = generation.usage.unwrap_or_default();
                let record = match checked {
                    Ok(parsed) => Attempt::succeeded(attempt, prompt, generation.text, parsed),
                    Err(issues) => Attempt::rejected(attempt, prompt, generation.text, issues),
                };
                record.with_tokens(usage.input_tokens, usage.output_tokens)
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(BenchError::SchemaRejected {
                issues,
                raw_response,
                ..
            }) => Attempt::rejected(attempt, prompt, raw_response, issues),
            Err(e) => {
                tracing::warn!(
                    model = %model,
                    schema = schema.name,
                    attempt,
                    retryable = e.is_retryable(),
                    error = %e,
                    "Generation failed"
                );
                Attempt::errored(attempt, prompt, e.to_string())
            }
        };

        tracing::debug!(
            model = %model,
            schema = schema.name,
            attempt,
            success = record.success,
            issues = record.validation_errors.len(),
            duration_ms,
            "Attempt finished"
        );

        Ok(record.with_timing(timestamp, duration_ms))
    }
}

/// Insert the schema instruction as a system message right after the
/// leading system messages.
fn with_schema_instruction(messages: &[Message], schema: &ResponseSchema) -> Vec<Message> {
    let split = messages
        .iter()
        .position(|m| m.role != Role::System)
        .unwrap_or(messages.len());
    let mut out = Vec::with_capacity(messages.len() + 1);
    out.extend_from_slice(&messages[..split]);
    out.push(Message::system(schema_instruction(schema)));
    out.extend_from_slice(&messages[split..]);
    out
}

/// Verbatim transcript of what was sent: `[role]` header, content, blank line.
pub fn render_prompt(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| format!("[{}]\n{}", m.role.as_str(), m.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Remove one leading code fence (with its language tag) and one trailing
/// fence, if present.
pub fn strip_code_fence(text: &str) -> String {
    let mut lines: Vec<&str> = text.trim().lines().collect();
    if lines
        .first()
        .is_some_and(|l| l.trim_start().starts_with("```"))
    {
        lines.remove(0);
    }
    if lines.last().is_some_and(|l| l.trim() == "```") {
        lines.pop();
    }
    lines.join("\n").trim().to_string()
}
