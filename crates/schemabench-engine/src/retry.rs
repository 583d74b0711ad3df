//! Bounded retry loop around the attempt executor.
//!
//! Each stage walks `Sending -> Judging -> {Succeeded, RetryPending, Exhausted}`.
//! A failed attempt below the limit feeds its raw response and every error
//! back to the model as corrective context for the next one.

use serde_json::Value;

use schemabench_llm::{Message, ModelRef};
use schemabench_types::{Attempt, BenchError, Result, Stage, StageRecord};

use crate::cancel::CancelHandle;
use crate::events::{AttemptPosition, AttemptStatus, LogEntry, LogOutcome, ProgressEvent, ProgressObserver};
use crate::executor::{render_prompt, AttemptExecutor};
use crate::prompts::retry_instruction;
use crate::scenario::ScenarioId;
use crate::schema::ResponseSchema;

#[derive(Debug)]
enum RetryState {
    Sending { attempt: u32 },
    Judging(Attempt),
    RetryPending { next_attempt: u32 },
    Succeeded,
    Exhausted,
}

/// The settled attempt sequence of one stage.
#[derive(Debug, Clone, PartialEq)]
pub struct StageOutcome {
    pub attempts: Vec<Attempt>,
    /// Validated output of the final attempt, present only on success.
    pub output: Option<Value>,
}

impl StageOutcome {
    pub fn succeeded(&self) -> bool {
        self.output.is_some()
    }

    pub fn into_record(self, stage: Stage) -> StageRecord {
        StageRecord::new(stage, self.attempts)
    }
}

/// Where in the benchmark a retry loop runs.
#[derive(Debug, Clone, Copy)]
pub struct StageContext {
    pub scenario: ScenarioId,
    pub run: u32,
    pub stage: Stage,
}

pub struct RetryController<'a> {
    executor: &'a AttemptExecutor,
    observer: &'a dyn ProgressObserver,
    cancel: &'a CancelHandle,
    model: &'a ModelRef,
    max_retries: u32,
}

impl<'a> RetryController<'a> {
    pub fn new(
        executor: &'a AttemptExecutor,
        observer: &'a dyn ProgressObserver,
        cancel: &'a CancelHandle,
        model: &'a ModelRef,
        max_retries: u32,
    ) -> Self {
        Self {
            executor,
            observer,
            cancel,
            model,
            max_retries,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Drive one stage to success or exhaustion.
    ///
    /// Returns `Err` only for a fatal generator error, a schema that does not
    /// compile, or cancellation; the attempts recorded before any of these
    /// are discarded with the run.
    pub async fn run(
        &self,
        ctx: StageContext,
        base: &[Message],
        schema: &ResponseSchema,
    ) -> Result<StageOutcome> {
        let mut attempts: Vec<Attempt> = Vec::new();
        let mut state = RetryState::Sending { attempt: 1 };

        loop {
            state = match state {
                RetryState::Sending { attempt } => {
                    if self.cancel.is_cancelled() {
                        return Err(BenchError::Cancelled);
                    }
                    self.emit(ctx, attempt, AttemptStatus::Running, None);

                    let messages = match attempts.last() {
                        Some(failed) => build_retry_messages(base, failed),
                        None => base.to_vec(),
                    };
                    match self
                        .executor
                        .execute(self.model, attempt, &messages, schema)
                        .await
                    {
                        Ok(record) => RetryState::Judging(record),
                        Err(e) => {
                            tracing::warn!(
                                model = %self.model,
                                scenario = ctx.scenario.id(),
                                run = ctx.run,
                                stage = ctx.stage.label(),
                                attempt,
                                error = %e,
                                "Attempt could not complete, aborting scenario"
                            );
                            let log = LogEntry {
                                timestamp: chrono::Utc::now(),
                                prompt: render_prompt(&messages),
                                response: String::new(),
                                outcome: LogOutcome::Error {
                                    message: e.to_string(),
                                },
                            };
                            self.emit(ctx, attempt, AttemptStatus::Failed, Some(log));
                            return Err(e);
                        }
                    }
                }
                RetryState::Judging(record) => {
                    let attempt = record.attempt;
                    let log = LogEntry::from_attempt(&record);
                    let success = record.success;
                    attempts.push(record);

                    if success {
                        self.emit(ctx, attempt, AttemptStatus::Success, Some(log));
                        RetryState::Succeeded
                    } else if attempt < self.max_attempts() {
                        self.emit(ctx, attempt, AttemptStatus::Retrying, Some(log));
                        RetryState::RetryPending {
                            next_attempt: attempt + 1,
                        }
                    } else {
                        self.emit(ctx, attempt, AttemptStatus::Failed, Some(log));
                        RetryState::Exhausted
                    }
                }
                RetryState::RetryPending { next_attempt } => {
                    tracing::debug!(
                        scenario = ctx.scenario.id(),
                        run = ctx.run,
                        stage = ctx.stage.label(),
                        next_attempt,
                        "Retrying with corrective context"
                    );
                    RetryState::Sending {
                        attempt: next_attempt,
                    }
                }
                RetryState::Succeeded => {
                    let output = attempts.last().and_then(|a| a.parsed_response.clone());
                    return Ok(StageOutcome { attempts, output });
                }
                RetryState::Exhausted => {
                    return Ok(StageOutcome {
                        attempts,
                        output: None,
                    });
                }
            };
        }
    }

    fn emit(&self, ctx: StageContext, attempt: u32, status: AttemptStatus, log: Option<LogEntry>) {
        self.observer.on_transition(&ProgressEvent::Attempt {
            position: AttemptPosition {
                model: self.model.id(),
                scenario: ctx.scenario,
                run: ctx.run,
                stage: ctx.stage,
                attempt,
            },
            status,
            log,
        });
    }
}

/// Base context, then the failed response as an assistant turn (when there
/// was one), then a user turn listing what to fix.
pub fn build_retry_messages(base: &[Message], failed: &Attempt) -> Vec<Message> {
    let mut messages = base.to_vec();
    if !failed.raw_response.is_empty() {
        messages.push(Message::assistant(&failed.raw_response));
    }
    messages.push(Message::user(retry_instruction(failed)));
    messages
}
