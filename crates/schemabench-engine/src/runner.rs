//! Benchmark runner: every selected model against every selected scenario,
//! one at a time.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use schemabench_llm::{ModelCatalog, ModelRef};
use schemabench_types::Run;

use crate::cancel::CancelHandle;
use crate::config::BenchPlan;
use crate::events::{ProgressEvent, ProgressObserver};
use crate::generator::Generator;
use crate::metrics::{aggregate, Summary};
use crate::prompts::PromptSet;
use crate::scenario::{RunSettings, ScenarioEngine, ScenarioId, ScenarioResult, Termination};

/// Persisted outcome of one scenario for one model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioReport {
    pub model: String,
    pub scenario: ScenarioId,
    pub termination: Termination,
    pub runs: Vec<Run>,
    pub summary: Summary,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_cost_usd: Option<f64>,
}

impl ScenarioReport {
    fn from_result(result: ScenarioResult, model: &ModelRef, catalog: &ModelCatalog) -> Self {
        let summary = result.summary();
        let estimated_cost_usd = catalog.estimate_cost(
            &model.model,
            summary.total_input_tokens,
            summary.total_output_tokens,
        );
        let model_id = result.model.clone();
        let scenario = result.scenario;
        let termination = result.termination.clone();
        Self {
            model: model_id,
            scenario,
            termination,
            runs: result.into_runs(),
            summary,
            estimated_cost_usd,
        }
    }

    /// Recompute the summary from the stored runs.
    pub fn recompute_summary(&mut self) {
        self.summary = aggregate(&self.runs);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkReport {
    pub execution_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub termination: Termination,
    pub settings: RunSettings,
    pub results: Vec<ScenarioReport>,
}

impl BenchmarkReport {
    pub fn total_tokens_used(&self) -> u64 {
        self.results.iter().map(|r| r.summary.total_tokens_used).sum()
    }

    pub fn estimated_cost_usd(&self) -> f64 {
        self.results.iter().filter_map(|r| r.estimated_cost_usd).sum()
    }
}

pub struct BenchmarkRunner {
    engine: ScenarioEngine,
    observer: Arc<dyn ProgressObserver>,
    catalog: ModelCatalog,
}

impl BenchmarkRunner {
    pub fn new(
        generator: Arc<dyn Generator>,
        prompts: PromptSet,
        observer: Arc<dyn ProgressObserver>,
    ) -> Self {
        Self {
            engine: ScenarioEngine::new(generator, prompts, observer.clone()),
            observer,
            catalog: ModelCatalog::new(),
        }
    }

    pub fn with_catalog(mut self, catalog: ModelCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Run the plan to completion, a fatal abort, or cancellation.
    ///
    /// A fatal abort or cancellation skips every remaining model and
    /// scenario; an internal abort skips only the rest of its own scenario.
    pub async fn run(&self, plan: &BenchPlan, cancel: &CancelHandle) -> BenchmarkReport {
        let execution_id = uuid::Uuid::new_v4().to_string();
        let started_at = Utc::now();

        self.observer.on_transition(&ProgressEvent::BenchmarkStarted {
            execution_id: execution_id.clone(),
            models: plan.models.iter().map(ModelRef::id).collect(),
            scenarios: plan.scenarios.clone(),
            runs_per_scenario: plan.settings.runs_per_scenario,
        });

        let mut results = Vec::new();
        let mut termination = Termination::Completed;

        'models: for model in &plan.models {
            for &scenario in &plan.scenarios {
                if cancel.is_cancelled() {
                    termination = Termination::Cancelled;
                    break 'models;
                }
                let result = self
                    .engine
                    .run_scenario(model, scenario, &plan.settings, cancel)
                    .await;
                let stop = result.termination.stops_benchmark();
                if stop {
                    termination = result.termination.clone();
                }
                results.push(ScenarioReport::from_result(result, model, &self.catalog));
                if stop {
                    tracing::warn!(
                        model = %model,
                        scenario = scenario.name(),
                        termination = ?termination,
                        "Stopping benchmark"
                    );
                    break 'models;
                }
            }
        }

        self.observer.on_transition(&ProgressEvent::BenchmarkFinished {
            execution_id: execution_id.clone(),
            termination: termination.clone(),
        });

        BenchmarkReport {
            execution_id,
            started_at,
            finished_at: Utc::now(),
            termination,
            settings: plan.settings,
            results,
        }
    }
}
