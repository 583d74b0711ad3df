//! Scenario state machine: N independent runs of a one-shot or three-stage
//! protocol in guided or enforced mode.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use schemabench_llm::{Message, ModelRef};
use schemabench_types::{BenchError, Result, Run, Stage, StageRecord};

use crate::cancel::CancelHandle;
use crate::events::{ProgressEvent, ProgressObserver};
use crate::executor::AttemptExecutor;
use crate::generator::{GenerationMode, GenerationParams, Generator};
use crate::metrics::{aggregate, Summary};
use crate::prompts::PromptSet;
use crate::retry::{RetryController, StageContext};
use crate::schema::{ActorProfileOutput, ActorPromptOutput, DecisionOutput, Recommendation, ResponseSchema};
use crate::validation::validate_value;

// ---------------------------------------------------------------------------
// Scenario identity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum ScenarioId {
    OneShotGuided,
    OneShotEnforced,
    SequentialGuided,
    SequentialEnforced,
}

impl ScenarioId {
    pub const ALL: [ScenarioId; 4] = [
        ScenarioId::OneShotGuided,
        ScenarioId::OneShotEnforced,
        ScenarioId::SequentialGuided,
        ScenarioId::SequentialEnforced,
    ];

    pub fn id(&self) -> u8 {
        match self {
            ScenarioId::OneShotGuided => 1,
            ScenarioId::OneShotEnforced => 2,
            ScenarioId::SequentialGuided => 3,
            ScenarioId::SequentialEnforced => 4,
        }
    }

    pub fn from_id(id: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.id() == id)
    }

    pub fn stage_count(&self) -> usize {
        match self {
            ScenarioId::OneShotGuided | ScenarioId::OneShotEnforced => 1,
            ScenarioId::SequentialGuided | ScenarioId::SequentialEnforced => 3,
        }
    }

    pub fn mode(&self) -> GenerationMode {
        match self {
            ScenarioId::OneShotGuided | ScenarioId::SequentialGuided => GenerationMode::Guided,
            ScenarioId::OneShotEnforced | ScenarioId::SequentialEnforced => GenerationMode::Enforced,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::OneShotGuided => "one_shot_guided",
            ScenarioId::OneShotEnforced => "one_shot_enforced",
            ScenarioId::SequentialGuided => "sequential_guided",
            ScenarioId::SequentialEnforced => "sequential_enforced",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ScenarioId::OneShotGuided => "One-shot, guided",
            ScenarioId::OneShotEnforced => "One-shot, enforced",
            ScenarioId::SequentialGuided => "Sequential, guided",
            ScenarioId::SequentialEnforced => "Sequential, enforced",
        }
    }
}

impl TryFrom<u8> for ScenarioId {
    type Error = String;

    fn try_from(id: u8) -> std::result::Result<Self, Self::Error> {
        Self::from_id(id).ok_or_else(|| format!("unknown scenario {id}, expected 1-4"))
    }
}

impl From<ScenarioId> for u8 {
    fn from(scenario: ScenarioId) -> u8 {
        scenario.id()
    }
}

impl fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.id(), self.name())
    }
}

// ---------------------------------------------------------------------------
// Settings and results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunSettings {
    pub runs_per_scenario: u32,
    pub max_retries: u32,
    pub params: GenerationParams,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            runs_per_scenario: 10,
            max_retries: 3,
            params: GenerationParams::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortKind {
    /// Authentication or missing provider. Stops the whole benchmark.
    Fatal,
    /// An internal invariant broke. Stops only the scenario.
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Termination {
    Completed,
    Aborted { kind: AbortKind, reason: String },
    Cancelled,
}

impl Termination {
    pub fn is_completed(&self) -> bool {
        matches!(self, Termination::Completed)
    }

    /// Whether nothing after this point should run.
    pub fn stops_benchmark(&self) -> bool {
        matches!(
            self,
            Termination::Cancelled
                | Termination::Aborted {
                    kind: AbortKind::Fatal,
                    ..
                }
        )
    }
}

/// The runs a scenario completed and how it ended. Runs after an abort
/// point are absent; the summary covers only what ran.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioResult {
    pub model: String,
    pub scenario: ScenarioId,
    runs: Vec<Run>,
    pub termination: Termination,
}

impl ScenarioResult {
    pub fn runs(&self) -> &[Run] {
        &self.runs
    }

    pub fn summary(&self) -> Summary {
        aggregate(&self.runs)
    }

    pub fn into_runs(self) -> Vec<Run> {
        self.runs
    }
}

/// The four schemas a scenario validates against.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaSet {
    pub full: ResponseSchema,
    pub decision: ResponseSchema,
    pub actor_profile: ResponseSchema,
    pub actor_prompt: ResponseSchema,
}

impl Default for SchemaSet {
    fn default() -> Self {
        Self {
            full: ResponseSchema::recommendation(),
            decision: ResponseSchema::decision(),
            actor_profile: ResponseSchema::actor_profile(),
            actor_prompt: ResponseSchema::actor_prompt(),
        }
    }
}

// ---------------------------------------------------------------------------
// ScenarioEngine
// ---------------------------------------------------------------------------

pub struct ScenarioEngine {
    generator: Arc<dyn Generator>,
    prompts: PromptSet,
    observer: Arc<dyn ProgressObserver>,
    schemas: SchemaSet,
}

impl ScenarioEngine {
    pub fn new(
        generator: Arc<dyn Generator>,
        prompts: PromptSet,
        observer: Arc<dyn ProgressObserver>,
    ) -> Self {
        Self {
            generator,
            prompts,
            observer,
            schemas: SchemaSet::default(),
        }
    }

    pub fn with_schemas(mut self, schemas: SchemaSet) -> Self {
        self.schemas = schemas;
        self
    }

    /// Execute `settings.runs_per_scenario` runs, one after another.
    ///
    /// Never fails: aborts and cancellation end the scenario early and are
    /// reported through [`ScenarioResult::termination`].
    pub async fn run_scenario(
        &self,
        model: &ModelRef,
        scenario: ScenarioId,
        settings: &RunSettings,
        cancel: &CancelHandle,
    ) -> ScenarioResult {
        let model_id = model.id();
        self.observer.on_transition(&ProgressEvent::ScenarioStarted {
            model: model_id.clone(),
            scenario,
            runs: settings.runs_per_scenario,
        });

        let executor = AttemptExecutor::new(self.generator.clone(), scenario.mode(), settings.params);
        let controller = RetryController::new(
            &executor,
            self.observer.as_ref(),
            cancel,
            model,
            settings.max_retries,
        );

        let mut runs = Vec::new();
        let mut termination = Termination::Completed;

        for run_number in 1..=settings.runs_per_scenario {
            if cancel.is_cancelled() {
                termination = Termination::Cancelled;
                break;
            }
            match self.execute_run(&controller, scenario, run_number).await {
                Ok(run) => {
                    self.observer.on_transition(&ProgressEvent::RunCompleted {
                        model: model_id.clone(),
                        scenario,
                        run: run_number,
                        success: run.success,
                    });
                    runs.push(run);
                }
                Err(BenchError::Cancelled) => {
                    termination = Termination::Cancelled;
                    break;
                }
                Err(e) => {
                    let kind = if e.is_fatal() {
                        AbortKind::Fatal
                    } else {
                        AbortKind::Internal
                    };
                    tracing::error!(
                        model = %model_id,
                        scenario = scenario.name(),
                        run = run_number,
                        kind = ?kind,
                        error = %e,
                        "Scenario aborted"
                    );
                    termination = Termination::Aborted {
                        kind,
                        reason: e.to_string(),
                    };
                    break;
                }
            }
        }

        let result = ScenarioResult {
            model: model_id,
            scenario,
            runs,
            termination,
        };
        self.observer.on_transition(&ProgressEvent::ScenarioCompleted {
            model: result.model.clone(),
            scenario,
            termination: result.termination.clone(),
            summary: result.summary(),
        });
        result
    }

    async fn execute_run(
        &self,
        controller: &RetryController<'_>,
        scenario: ScenarioId,
        run_number: u32,
    ) -> Result<Run> {
        let started = Instant::now();
        let (stages, final_response) = if scenario.stage_count() == 1 {
            self.run_one_shot(controller, scenario, run_number).await?
        } else {
            self.run_sequential(controller, scenario, run_number).await?
        };
        Ok(Run {
            run_number,
            success: final_response.is_some(),
            stages,
            total_duration_ms: started.elapsed().as_millis() as u64,
            final_response,
        })
    }

    async fn run_one_shot(
        &self,
        controller: &RetryController<'_>,
        scenario: ScenarioId,
        run: u32,
    ) -> Result<(Vec<StageRecord>, Option<Value>)> {
        let ctx = StageContext {
            scenario,
            run,
            stage: Stage::Full,
        };
        let outcome = controller
            .run(ctx, &self.prompts.opening(Stage::Full), &self.schemas.full)
            .await?;
        let output = outcome.output.clone();
        Ok((vec![outcome.into_record(Stage::Full)], output))
    }

    /// Decision, then profile, then prompt. Each later stage sees the
    /// validated outputs of the earlier ones as assistant turns.
    async fn run_sequential(
        &self,
        controller: &RetryController<'_>,
        scenario: ScenarioId,
        run: u32,
    ) -> Result<(Vec<StageRecord>, Option<Value>)> {
        let ctx = |stage: Stage| StageContext {
            scenario,
            run,
            stage,
        };
        let mut stages = Vec::with_capacity(3);
        let mut messages = self.prompts.opening(Stage::Decision);

        let outcome = controller
            .run(ctx(Stage::Decision), &messages, &self.schemas.decision)
            .await?;
        let output = outcome.output.clone();
        stages.push(outcome.into_record(Stage::Decision));
        let Some(decision_value) = output else {
            return Ok((stages, None));
        };
        let decision: DecisionOutput = typed(scenario, run, Stage::Decision, &decision_value)?;
        if decision.action.is_none() {
            let merged = Recommendation::without_action(decision);
            return Ok((stages, Some(self.check_merged(scenario, run, &merged)?)));
        }

        self.continue_conversation(&mut messages, &decision_value, Stage::ActorProfile);
        let outcome = controller
            .run(ctx(Stage::ActorProfile), &messages, &self.schemas.actor_profile)
            .await?;
        let output = outcome.output.clone();
        stages.push(outcome.into_record(Stage::ActorProfile));
        let Some(profile_value) = output else {
            return Ok((stages, None));
        };
        let profile: ActorProfileOutput = typed(scenario, run, Stage::ActorProfile, &profile_value)?;

        self.continue_conversation(&mut messages, &profile_value, Stage::ActorPrompt);
        let outcome = controller
            .run(ctx(Stage::ActorPrompt), &messages, &self.schemas.actor_prompt)
            .await?;
        let output = outcome.output.clone();
        stages.push(outcome.into_record(Stage::ActorPrompt));
        let Some(prompt_value) = output else {
            return Ok((stages, None));
        };
        let prompt: ActorPromptOutput = typed(scenario, run, Stage::ActorPrompt, &prompt_value)?;

        let merged = Recommendation::with_actor(decision, profile, prompt);
        Ok((stages, Some(self.check_merged(scenario, run, &merged)?)))
    }

    fn continue_conversation(&self, messages: &mut Vec<Message>, validated: &Value, next: Stage) {
        messages.push(Message::assistant(validated.to_string()));
        messages.push(Message::user(self.prompts.instruction(next)));
    }

    /// Whole-schema validation of an assembled response. Failure here means
    /// the stage schemas and the full schema disagree.
    fn check_merged(&self, scenario: ScenarioId, run: u32, merged: &Recommendation) -> Result<Value> {
        let value = serde_json::to_value(merged)?;
        validate_value(value, &self.schemas.full)?.map_err(|issues| {
            let details = issues
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            BenchError::InvariantViolation {
                scenario: scenario.name().to_string(),
                run,
                message: format!("merged response failed full-schema validation: {details}"),
            }
        })
    }
}

fn typed<T: DeserializeOwned>(scenario: ScenarioId, run: u32, stage: Stage, value: &Value) -> Result<T> {
    T::deserialize(value).map_err(|e| BenchError::InvariantViolation {
        scenario: scenario.name().to_string(),
        run,
        message: format!("validated {} output does not convert: {e}", stage.label()),
    })
}
