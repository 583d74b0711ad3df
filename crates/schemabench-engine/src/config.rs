//! Benchmark configuration and its resolution into an executable plan.

use std::path::Path;

use serde::{Deserialize, Serialize};

use schemabench_llm::{LlmClient, ModelCatalog, ModelRef};
use schemabench_types::{BenchError, Result};

use crate::generator::{GenerationMode, GenerationParams};
use crate::prompts::PromptSet;
use crate::scenario::{RunSettings, ScenarioId};

/// User-facing configuration. Every field has a default, so a config file
/// only needs the keys it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    /// Catalog ids (`gpt-4o-mini`) or explicit `provider:model` pairs.
    pub models: Vec<String>,
    /// Scenario numbers 1-4.
    pub scenarios: Vec<u8>,
    pub runs_per_scenario: u32,
    pub temperature: f32,
    pub max_tokens: u32,
    pub max_retries: u32,
    /// Log entries kept by the status board.
    pub log_capacity: usize,
    pub prompts: PromptSet,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            models: vec!["gpt-4o-mini".to_string()],
            scenarios: ScenarioId::ALL.iter().map(ScenarioId::id).collect(),
            runs_per_scenario: 10,
            temperature: 0.1,
            max_tokens: 2048,
            max_retries: 3,
            log_capacity: 200,
            prompts: PromptSet::default(),
        }
    }
}

/// A validated configuration: what will actually run.
#[derive(Debug, Clone, PartialEq)]
pub struct BenchPlan {
    pub models: Vec<ModelRef>,
    pub scenarios: Vec<ScenarioId>,
    pub settings: RunSettings,
    pub log_capacity: usize,
}

impl BenchPlan {
    /// Whether any selected scenario relies on provider-side enforcement.
    pub fn needs_enforcement(&self) -> bool {
        self.scenarios
            .iter()
            .any(|s| s.mode() == GenerationMode::Enforced)
    }

    /// Drop models `client` cannot serve: the provider is not registered, or
    /// an enforced scenario is selected and the provider cannot enforce a
    /// response schema. Fails when no model is left.
    pub fn retain_servable(&mut self, client: &LlmClient) -> Result<()> {
        let enforced = self.needs_enforcement();
        self.models.retain(|model| {
            if !client.has_provider(&model.provider) {
                tracing::warn!(model = %model, "No API key for provider, skipping model");
                return false;
            }
            if enforced && !client.supports_structured_output(&model.provider) {
                tracing::warn!(
                    model = %model,
                    "Provider cannot enforce a response schema, skipping model"
                );
                return false;
            }
            true
        });
        if self.models.is_empty() {
            return Err(BenchError::InvalidConfig(
                "none of the selected models has a usable provider".into(),
            ));
        }
        Ok(())
    }
}

impl BenchConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&text)?;
        Ok(config)
    }

    /// Drop unknown models and scenarios (with a warning each), deduplicate,
    /// and check the numeric settings.
    pub fn resolve(&self, catalog: &ModelCatalog) -> Result<BenchPlan> {
        if self.runs_per_scenario == 0 {
            return Err(BenchError::InvalidConfig(
                "runs_per_scenario must be at least 1".into(),
            ));
        }
        if self.max_tokens == 0 {
            return Err(BenchError::InvalidConfig("max_tokens must be at least 1".into()));
        }
        if !self.temperature.is_finite() || !(0.0..=2.0).contains(&self.temperature) {
            return Err(BenchError::InvalidConfig(format!(
                "temperature must be between 0 and 2, got {}",
                self.temperature
            )));
        }

        let mut models: Vec<ModelRef> = Vec::new();
        for id in &self.models {
            match catalog.resolve(id) {
                Some(model) if !models.contains(&model) => models.push(model),
                Some(_) => {}
                None => tracing::warn!(model = %id, "Skipping unknown model"),
            }
        }
        if models.is_empty() {
            return Err(BenchError::InvalidConfig("no valid models selected".into()));
        }

        let mut scenarios: Vec<ScenarioId> = Vec::new();
        for &id in &self.scenarios {
            match ScenarioId::from_id(id) {
                Some(scenario) if !scenarios.contains(&scenario) => scenarios.push(scenario),
                Some(_) => {}
                None => tracing::warn!(scenario = id, "Skipping unknown scenario"),
            }
        }
        if scenarios.is_empty() {
            return Err(BenchError::InvalidConfig("no valid scenarios selected".into()));
        }

        Ok(BenchPlan {
            models,
            scenarios,
            settings: RunSettings {
                runs_per_scenario: self.runs_per_scenario,
                max_retries: self.max_retries,
                params: GenerationParams {
                    temperature: self.temperature,
                    max_tokens: self.max_tokens,
                },
            },
            log_capacity: self.log_capacity,
        })
    }
}
