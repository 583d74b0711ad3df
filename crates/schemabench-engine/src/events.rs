//! Progress reporting.
//!
//! The engine calls [`ProgressObserver::on_transition`] synchronously at each
//! transition point and never waits on observers. Implementations must return
//! quickly: [`TracingObserver`] logs, [`EventEmitter`] forwards to a
//! [`tokio::sync::broadcast`] channel, [`crate::StatusBoard`] publishes a
//! snapshot, and [`RecordingObserver`] keeps everything for tests.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use schemabench_types::{Attempt, Stage, ValidationIssue};

use crate::metrics::Summary;
use crate::scenario::{ScenarioId, Termination};

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    Running,
    Success,
    Failed,
    Retrying,
}

/// Where an attempt sits in the benchmark.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptPosition {
    pub model: String,
    pub scenario: ScenarioId,
    pub run: u32,
    pub stage: Stage,
    pub attempt: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LogOutcome {
    Valid,
    Invalid { issues: Vec<ValidationIssue> },
    Error { message: String },
}

/// What was sent, what came back, and how it was judged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub prompt: String,
    pub response: String,
    pub outcome: LogOutcome,
}

impl LogEntry {
    pub fn from_attempt(attempt: &Attempt) -> Self {
        let outcome = if attempt.success {
            LogOutcome::Valid
        } else if let Some(ref message) = attempt.error_message {
            LogOutcome::Error {
                message: message.clone(),
            }
        } else {
            LogOutcome::Invalid {
                issues: attempt.validation_errors.clone(),
            }
        };
        Self {
            timestamp: attempt.timestamp,
            prompt: attempt.prompt.clone(),
            response: attempt.raw_response.clone(),
            outcome,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    BenchmarkStarted {
        execution_id: String,
        models: Vec<String>,
        scenarios: Vec<ScenarioId>,
        runs_per_scenario: u32,
    },
    ScenarioStarted {
        model: String,
        scenario: ScenarioId,
        runs: u32,
    },
    Attempt {
        position: AttemptPosition,
        status: AttemptStatus,
        log: Option<LogEntry>,
    },
    RunCompleted {
        model: String,
        scenario: ScenarioId,
        run: u32,
        success: bool,
    },
    ScenarioCompleted {
        model: String,
        scenario: ScenarioId,
        termination: Termination,
        summary: Summary,
    },
    BenchmarkFinished {
        execution_id: String,
        termination: Termination,
    },
}

// ---------------------------------------------------------------------------
// Observer trait and implementations
// ---------------------------------------------------------------------------

pub trait ProgressObserver: Send + Sync {
    fn on_transition(&self, event: &ProgressEvent);
}

pub struct NoopObserver;

impl ProgressObserver for NoopObserver {
    fn on_transition(&self, _event: &ProgressEvent) {}
}

/// Turns transitions into structured log lines.
pub struct TracingObserver;

impl ProgressObserver for TracingObserver {
    fn on_transition(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::BenchmarkStarted {
                execution_id,
                models,
                scenarios,
                runs_per_scenario,
            } => tracing::info!(
                execution_id = %execution_id,
                models = models.len(),
                scenarios = scenarios.len(),
                runs_per_scenario,
                "Benchmark started"
            ),
            ProgressEvent::ScenarioStarted {
                model,
                scenario,
                runs,
            } => tracing::info!(model = %model, scenario = scenario.name(), runs, "Scenario started"),
            ProgressEvent::Attempt {
                position, status, ..
            } => match status {
                AttemptStatus::Running => tracing::debug!(
                    model = %position.model,
                    scenario = position.scenario.id(),
                    run = position.run,
                    stage = position.stage.label(),
                    attempt = position.attempt,
                    "Attempt running"
                ),
                AttemptStatus::Success => tracing::debug!(
                    run = position.run,
                    stage = position.stage.label(),
                    attempt = position.attempt,
                    "Attempt valid"
                ),
                other => tracing::info!(
                    model = %position.model,
                    scenario = position.scenario.id(),
                    run = position.run,
                    stage = position.stage.label(),
                    attempt = position.attempt,
                    status = ?other,
                    "Attempt failed"
                ),
            },
            ProgressEvent::RunCompleted {
                scenario,
                run,
                success,
                ..
            } => tracing::debug!(scenario = scenario.id(), run, success, "Run completed"),
            ProgressEvent::ScenarioCompleted {
                model,
                scenario,
                termination,
                summary,
            } => tracing::info!(
                model = %model,
                scenario = scenario.name(),
                termination = ?termination,
                success_rate = summary.success_rate,
                first_attempt = summary.first_attempt_success_rate,
                tokens = summary.total_tokens_used,
                "Scenario completed"
            ),
            ProgressEvent::BenchmarkFinished {
                execution_id,
                termination,
            } => tracing::info!(execution_id = %execution_id, termination = ?termination, "Benchmark finished"),
        }
    }
}

/// Event emitter wrapping a broadcast sender.
#[derive(Clone)]
pub struct EventEmitter {
    sender: tokio::sync::broadcast::Sender<ProgressEvent>,
}

impl EventEmitter {
    /// Create a new emitter with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = tokio::sync::broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all current subscribers.
    ///
    /// If there are no active receivers the event is silently dropped.
    pub fn emit(&self, event: ProgressEvent) {
        let _ = self.sender.send(event);
    }

    /// Subscribe to events. Returns a broadcast receiver.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<ProgressEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(256)
    }
}

impl ProgressObserver for EventEmitter {
    fn on_transition(&self, event: &ProgressEvent) {
        self.emit(event.clone());
    }
}

/// Forwards each event to every inner observer, in order.
pub struct FanoutObserver {
    observers: Vec<Arc<dyn ProgressObserver>>,
}

impl FanoutObserver {
    pub fn new(observers: Vec<Arc<dyn ProgressObserver>>) -> Self {
        Self { observers }
    }
}

impl ProgressObserver for FanoutObserver {
    fn on_transition(&self, event: &ProgressEvent) {
        for observer in &self.observers {
            observer.on_transition(event);
        }
    }
}

/// Keeps every event it sees.
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// `(run, stage, attempt, status)` for every attempt transition.
    pub fn attempt_transitions(&self) -> Vec<(u32, Stage, u32, AttemptStatus)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ProgressEvent::Attempt {
                    position, status, ..
                } => Some((position.run, position.stage, position.attempt, status)),
                _ => None,
            })
            .collect()
    }
}

impl ProgressObserver for RecordingObserver {
    fn on_transition(&self, event: &ProgressEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attempt_event(status: AttemptStatus) -> ProgressEvent {
        ProgressEvent::Attempt {
            position: AttemptPosition {
                model: "openai:gpt-4o-mini".into(),
                scenario: ScenarioId::SequentialGuided,
                run: 2,
                stage: Stage::ActorProfile,
                attempt: 1,
            },
            status,
            log: None,
        }
    }

    #[tokio::test]
    async fn emitter_sends_and_receives() {
        let emitter = EventEmitter::new(16);
        let mut rx = emitter.subscribe();

        emitter.on_transition(&ProgressEvent::ScenarioStarted {
            model: "openai:gpt-4o".into(),
            scenario: ScenarioId::OneShotGuided,
            runs: 3,
        });

        match rx.recv().await.unwrap() {
            ProgressEvent::ScenarioStarted { model, runs, .. } => {
                assert_eq!(model, "openai:gpt-4o");
                assert_eq!(runs, 3);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn emit_with_no_subscribers_does_not_panic() {
        let emitter = EventEmitter::new(16);
        emitter.on_transition(&attempt_event(AttemptStatus::Running));
    }

    #[test]
    fn fanout_reaches_every_observer() {
        let a = Arc::new(RecordingObserver::new());
        let b = Arc::new(RecordingObserver::new());
        let observers: Vec<Arc<dyn ProgressObserver>> = vec![a.clone(), b.clone()];
        let fanout = FanoutObserver::new(observers);

        fanout.on_transition(&attempt_event(AttemptStatus::Running));
        fanout.on_transition(&attempt_event(AttemptStatus::Success));

        assert_eq!(a.events().len(), 2);
        assert_eq!(
            b.attempt_transitions(),
            vec![
                (2, Stage::ActorProfile, 1, AttemptStatus::Running),
                (2, Stage::ActorProfile, 1, AttemptStatus::Success),
            ]
        );
    }

    #[test]
    fn log_entry_classifies_attempts() {
        let ok = Attempt::succeeded(1, "p".into(), "{}".into(), serde_json::json!({}));
        assert_eq!(LogEntry::from_attempt(&ok).outcome, LogOutcome::Valid);

        let err = Attempt::errored(1, "p".into(), "timeout");
        assert_eq!(
            LogEntry::from_attempt(&err).outcome,
            LogOutcome::Error {
                message: "timeout".into()
            }
        );

        let bad = Attempt::rejected(
            1,
            "p".into(),
            "x".into(),
            vec![ValidationIssue::invalid_payload("Invalid JSON")],
        );
        let entry = LogEntry::from_attempt(&bad);
        assert!(matches!(entry.outcome, LogOutcome::Invalid { ref issues } if issues.len() == 1));
        assert_eq!(entry.response, "x");
    }

    #[test]
    fn event_serializes_with_tag() {
        let json = serde_json::to_value(attempt_event(AttemptStatus::Retrying)).unwrap();
        assert_eq!(json["event"], "attempt");
        assert_eq!(json["status"], "retrying");
        assert_eq!(json["position"]["stage"], "actor_profile");
    }
}
