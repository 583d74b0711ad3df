//! End-to-end tests for the benchmark runner.
//!
//! Each test exercises the full stack: plan -> runner -> scenarios -> retries
//! -> executor -> validation, against a generator that answers by schema.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use schemabench_engine::{
    AbortKind, BenchConfig, BenchmarkReport, BenchmarkRunner, CancelHandle, EventEmitter,
    FanoutObserver, Generation, GenerationMode, GenerationRequest, Generator, Phase,
    ProgressEvent, ProgressObserver, PromptSet, ScenarioId, StatusBoard, Termination,
};
use schemabench_llm::ModelCatalog;
use schemabench_types::{BenchError, Result};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const FULL: &str = r#"{"recommendation":"Hire a database specialist","action":{"type":"create_actor","actor":{"title":"Database Engineer","reason":"Queries are slow and nobody owns them","skills":["PostgreSQL","Query planning","Indexing"],"prompt":"You are a senior database engineer who tunes slow queries.","model":"balanced"}}}"#;
const DECISION: &str = r#"{"recommendation":"Hire a database specialist","action":"create_actor"}"#;
const PROFILE: &str = r#"{"title":"Database Engineer","reason":"Queries are slow and nobody owns them","skills":["PostgreSQL","Query planning","Indexing"]}"#;
const PROMPT: &str = r#"{"prompt":"You are a senior database engineer who tunes slow queries.","model":"balanced"}"#;

/// Answers every request with a valid response for its schema, except that
/// every `fail_every`-th call returns prose, and providers listed in
/// `locked_out` fail authentication.
struct SchemaAwareGenerator {
    calls: AtomicUsize,
    fail_every: Option<usize>,
    locked_out: Vec<&'static str>,
}

impl SchemaAwareGenerator {
    fn reliable() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_every: None,
            locked_out: Vec::new(),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Generator for SchemaAwareGenerator {
    async fn invoke(&self, request: &GenerationRequest<'_>) -> Result<Generation> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.locked_out.contains(&request.model.provider.as_str()) {
            return Err(BenchError::AuthError {
                provider: request.model.provider.clone(),
            });
        }
        if self.fail_every.is_some_and(|k| n % k == 0) {
            return Ok(Generation::text("Sure! Here is my recommendation.").with_usage(40, 10));
        }
        let text = match request.schema.name {
            "recommendation" => FULL,
            "decision" => DECISION,
            "actor_profile" => PROFILE,
            "actor_prompt" => PROMPT,
            other => panic!("unexpected schema {other}"),
        };
        let mut generation = Generation::text(text).with_usage(200, 60);
        if request.mode == GenerationMode::Enforced {
            generation.object = Some(serde_json::from_str::<Value>(text).unwrap());
        }
        Ok(generation)
    }
}

fn plan(models: &[&str], scenarios: &[u8], runs: u32) -> schemabench_engine::BenchPlan {
    BenchConfig {
        models: models.iter().map(|m| m.to_string()).collect(),
        scenarios: scenarios.to_vec(),
        runs_per_scenario: runs,
        ..BenchConfig::default()
    }
    .resolve(&ModelCatalog::new())
    .expect("plan should resolve")
}

async fn run(
    generator: Arc<SchemaAwareGenerator>,
    observer: Arc<dyn ProgressObserver>,
    plan: &schemabench_engine::BenchPlan,
    cancel: &CancelHandle,
) -> BenchmarkReport {
    BenchmarkRunner::new(generator, PromptSet::default(), observer)
        .run(plan, cancel)
        .await
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn every_model_runs_every_scenario() {
    let generator = Arc::new(SchemaAwareGenerator::reliable());
    let board = Arc::new(StatusBoard::new(50));
    let plan = plan(&["gpt-4o-mini", "claude-haiku-4-5"], &[1, 2, 3, 4], 2);

    let report = run(generator.clone(), board.clone(), &plan, &CancelHandle::new()).await;

    assert_eq!(report.termination, Termination::Completed);
    assert_eq!(report.results.len(), 8);
    assert_eq!(report.results[0].model, "openai:gpt-4o-mini");
    assert_eq!(report.results[4].model, "anthropic:claude-haiku-4-5");
    assert_eq!(
        report.results[..4].iter().map(|r| r.scenario).collect::<Vec<_>>(),
        ScenarioId::ALL.to_vec()
    );
    for result in &report.results {
        assert_eq!(result.summary.total_runs, 2);
        assert_eq!(result.summary.success_rate, 100.0);
        assert_eq!(result.summary.first_attempt_success_rate, 100.0);
        assert!(result.estimated_cost_usd.unwrap() > 0.0);
    }
    // 2 models x (1 + 1 + 3 + 3 calls per run) x 2 runs
    assert_eq!(generator.calls(), 32);
    assert_eq!(report.total_tokens_used(), 32 * 260);

    let status = board.snapshot();
    assert_eq!(status.phase, Phase::Finished);
    assert_eq!(status.execution_id.as_deref(), Some(report.execution_id.as_str()));
    assert_eq!(status.completed_scenarios.len(), 8);
    assert_eq!(status.logs.len(), 32);
}

#[tokio::test]
async fn failures_are_retried_and_counted() {
    let generator = Arc::new(SchemaAwareGenerator {
        calls: AtomicUsize::new(0),
        fail_every: Some(2),
        locked_out: Vec::new(),
    });
    let plan = plan(&["gpt-4o-mini"], &[1], 4);

    let report = run(
        generator.clone(),
        Arc::new(schemabench_engine::NoopObserver),
        &plan,
        &CancelHandle::new(),
    )
    .await;

    let summary = &report.results[0].summary;
    // Calls alternate ok / prose: run 1 ok, run 2 prose then ok, and so on.
    assert_eq!(summary.success_rate, 100.0);
    assert!(summary.first_attempt_success_rate < 100.0);
    assert!(summary.average_attempts > 1.0);
    assert!(summary.total_input_tokens > 0);
    assert_eq!(
        summary.retry_tier_success_rates.last().copied(),
        Some(summary.success_rate)
    );
}

#[tokio::test]
async fn fatal_error_stops_remaining_models() {
    let generator = Arc::new(SchemaAwareGenerator {
        calls: AtomicUsize::new(0),
        fail_every: None,
        locked_out: vec!["anthropic"],
    });
    let plan = plan(&["gpt-4o-mini", "claude-haiku-4-5", "gemini-2.5-flash"], &[1, 3], 2);

    let report = run(
        generator.clone(),
        Arc::new(schemabench_engine::TracingObserver),
        &plan,
        &CancelHandle::new(),
    )
    .await;

    assert!(matches!(
        report.termination,
        Termination::Aborted {
            kind: AbortKind::Fatal,
            ..
        }
    ));
    // Both openai scenarios, then the first anthropic one aborted with no runs.
    assert_eq!(report.results.len(), 3);
    assert!(report.results[..2].iter().all(|r| r.termination == Termination::Completed));
    assert!(report.results[2].runs.is_empty());
    assert!(report.results.iter().all(|r| !r.model.starts_with("google")));
}

struct CancelAfterFirstScenario(CancelHandle);

impl ProgressObserver for CancelAfterFirstScenario {
    fn on_transition(&self, event: &ProgressEvent) {
        if matches!(event, ProgressEvent::ScenarioCompleted { .. }) {
            self.0.cancel();
        }
    }
}

#[tokio::test]
async fn cancellation_keeps_finished_work() {
    let cancel = CancelHandle::new();
    let emitter = EventEmitter::new(1024);
    let mut rx = emitter.subscribe();
    let observers: Vec<Arc<dyn ProgressObserver>> = vec![
        Arc::new(emitter),
        Arc::new(CancelAfterFirstScenario(cancel.clone())),
    ];
    let observer = Arc::new(FanoutObserver::new(observers));
    let plan = plan(&["gpt-4o-mini"], &[1, 2, 3], 3);

    let report = run(Arc::new(SchemaAwareGenerator::reliable()), observer, &plan, &cancel).await;

    assert_eq!(report.termination, Termination::Cancelled);
    assert_eq!(report.results.len(), 1);
    assert_eq!(report.results[0].runs.len(), 3);

    let mut last = None;
    while let Ok(event) = rx.try_recv() {
        last = Some(event);
    }
    assert!(matches!(
        last,
        Some(ProgressEvent::BenchmarkFinished {
            termination: Termination::Cancelled,
            ..
        })
    ));
}

#[tokio::test]
async fn report_survives_json() {
    let plan = plan(&["gpt-4o-mini"], &[3], 1);
    let report = run(
        Arc::new(SchemaAwareGenerator::reliable()),
        Arc::new(schemabench_engine::NoopObserver),
        &plan,
        &CancelHandle::new(),
    )
    .await;

    let json = serde_json::to_string(&report).unwrap();
    let mut restored: BenchmarkReport = serde_json::from_str(&json).unwrap();
    let original = restored.results[0].summary.clone();
    restored.results[0].recompute_summary();
    assert_eq!(restored.results[0].summary, original);
    assert_eq!(restored.results[0].runs[0].stages.len(), 3);

    let value: Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["results"][0]["scenario"], 3);
    assert_eq!(value["termination"]["status"], "completed");
}
