//! Prompt text: the scenario's fixed conversation opener, per-stage
//! instructions, the guided-mode schema instruction, and retry feedback.

use serde::{Deserialize, Serialize};

use schemabench_llm::Message;
use schemabench_types::{Attempt, Stage};

use crate::schema::ResponseSchema;

/// All prompt text a benchmark sends. Every field has a built-in default, so
/// a config file only needs to override what it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptSet {
    pub system: String,
    pub request: String,
    pub one_shot_instruction: String,
    pub decision_instruction: String,
    pub profile_instruction: String,
    pub prompt_instruction: String,
}

impl Default for PromptSet {
    fn default() -> Self {
        Self {
            system: "You are an organizational advisor for a small software company. \
                     You recommend how the team should respond to a problem and, when \
                     the team lacks a capability, you design a new AI actor to fill the gap."
                .into(),
            request: "Our product's database queries have become slow as usage grew. Nobody \
                      on the team has deep database experience and the on-call engineers are \
                      spending most of their time firefighting. What should we do?"
                .into(),
            one_shot_instruction: "Give your recommendation. If a new actor is needed, \
                                   include an action that creates it with a title, the reason \
                                   it is needed, 3 to 10 key skills, a system prompt that \
                                   defines it, and the model tier (fast, balanced, or \
                                   reasoning) it should run on. Otherwise set action to null."
                .into(),
            decision_instruction: "First, give your recommendation and decide whether a new \
                                   actor is needed. Set action to \"create_actor\" if so, \
                                   otherwise null."
                .into(),
            profile_instruction: "Now describe the actor to create: a short title, the \
                                  reason it is needed, and 3 to 10 key skills."
                .into(),
            prompt_instruction: "Finally, write the system prompt that defines this actor \
                                 and choose the model tier (fast, balanced, or reasoning) it \
                                 should run on."
                .into(),
        }
    }
}

impl PromptSet {
    pub fn instruction(&self, stage: Stage) -> &str {
        match stage {
            Stage::Full => &self.one_shot_instruction,
            Stage::Decision => &self.decision_instruction,
            Stage::ActorProfile => &self.profile_instruction,
            Stage::ActorPrompt => &self.prompt_instruction,
        }
    }

    /// System prompt plus the request with the opening stage's instruction.
    pub fn opening(&self, stage: Stage) -> Vec<Message> {
        vec![
            Message::system(&self.system),
            Message::user(format!("{}\n\n{}", self.request, self.instruction(stage))),
        ]
    }
}

/// Guided-mode instruction describing the expected JSON shape.
pub fn schema_instruction(schema: &ResponseSchema) -> String {
    let rendered = serde_json::to_string_pretty(&schema.json_schema())
        .unwrap_or_else(|_| schema.json_schema().to_string());
    format!(
        "Respond with a single JSON object that conforms to the JSON Schema below. \
         Output only the JSON object, with no prose and no code fences.\n\n\
         Schema \"{}\" ({}):\n{}",
        schema.name, schema.description, rendered
    )
}

/// Corrective instruction for the attempt after `failed`.
///
/// Lists every validation error as `- path: message`; for transport or
/// provider failures it names the error instead.
pub fn retry_instruction(failed: &Attempt) -> String {
    if !failed.validation_errors.is_empty() {
        let errors = failed
            .validation_errors
            .iter()
            .map(|issue| format!("- {}: {}", issue.path_string(), issue.message))
            .collect::<Vec<_>>()
            .join("\n");
        return format!(
            "Your previous response did not match the required schema. Fix every error \
             below and respond again with only the corrected JSON object.\n\nErrors:\n{errors}"
        );
    }
    let reason = failed
        .error_message
        .as_deref()
        .unwrap_or("no usable response was returned");
    format!(
        "The previous request failed ({reason}). Respond again with only a JSON object \
         that matches the required schema."
    )
}
