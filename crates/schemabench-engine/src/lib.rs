//! Benchmark orchestration engine.
//!
//! This crate drives structured-output benchmarks: schema validation, the
//! attempt executor and retry controller, the one-shot and sequential
//! scenario state machine, metrics aggregation, progress observers and the
//! shared status board, configuration resolution, and the multi-model runner.

pub mod cancel;
pub mod config;
pub mod events;
pub mod executor;
pub mod generator;
pub mod metrics;
pub mod prompts;
pub mod retry;
pub mod runner;
pub mod scenario;
pub mod schema;
pub mod status;
pub mod validation;

#[cfg(test)]
mod test_support;

pub use cancel::CancelHandle;
pub use config::{BenchConfig, BenchPlan};
pub use events::{
    AttemptPosition, AttemptStatus, EventEmitter, FanoutObserver, LogEntry, LogOutcome,
    NoopObserver, ProgressEvent, ProgressObserver, RecordingObserver, TracingObserver,
};
pub use executor::{render_prompt, strip_code_fence, AttemptExecutor};
pub use generator::{
    Generation, GenerationMode, GenerationParams, GenerationRequest, Generator, LlmGenerator,
    TokenUsage,
};
pub use metrics::{aggregate, Summary};
pub use prompts::PromptSet;
pub use retry::{build_retry_messages, RetryController, StageContext, StageOutcome};
pub use runner::{BenchmarkReport, BenchmarkRunner, ScenarioReport};
pub use scenario::{
    AbortKind, RunSettings, ScenarioEngine, ScenarioId, ScenarioResult, SchemaSet, Termination,
};
pub use schema::{
    Action, ActorModel, ActorProfileOutput, ActorPromptOutput, DecisionOutput, Recommendation,
    ResponseSchema, SchemaNode,
};
pub use status::{BenchStatus, Phase, RunProgress, StatusBoard};
pub use validation::{validate, validate_value, Checked};
