//! Response schemas: the full recommendation shape, its three stage slices,
//! and the typed outputs each stage produces.
//!
//! A [`SchemaNode`] tree is the single source of truth. It renders to the JSON
//! Schema document that providers enforce, prompts describe, and the
//! validation adapter compiles.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use schemabench_types::Stage;

// ---------------------------------------------------------------------------
// Schema nodes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum SchemaNode {
    String {
        min_len: Option<usize>,
        max_len: Option<usize>,
    },
    Enum(Vec<&'static str>),
    Literal(&'static str),
    Array {
        items: Box<SchemaNode>,
        min_items: Option<usize>,
        max_items: Option<usize>,
    },
    /// Every field is required; unknown keys are rejected.
    Object(Vec<Field>),
    Nullable(Box<SchemaNode>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: &'static str,
    pub description: &'static str,
    pub node: SchemaNode,
}

impl Field {
    pub fn new(name: &'static str, description: &'static str, node: SchemaNode) -> Self {
        Self {
            name,
            description,
            node,
        }
    }
}

impl SchemaNode {
    pub fn string() -> Self {
        SchemaNode::String {
            min_len: None,
            max_len: None,
        }
    }

    pub fn string_len(min_len: Option<usize>, max_len: Option<usize>) -> Self {
        SchemaNode::String { min_len, max_len }
    }

    pub fn array(items: SchemaNode, min_items: Option<usize>, max_items: Option<usize>) -> Self {
        SchemaNode::Array {
            items: Box::new(items),
            min_items,
            max_items,
        }
    }

    pub fn nullable(inner: SchemaNode) -> Self {
        SchemaNode::Nullable(Box::new(inner))
    }

    /// Render as a JSON Schema fragment compatible with strict provider modes.
    pub fn to_json_schema(&self) -> Value {
        match self {
            SchemaNode::String { min_len, max_len } => {
                let mut s = json!({ "type": "string" });
                if let Some(min) = min_len {
                    s["minLength"] = json!(min);
                }
                if let Some(max) = max_len {
                    s["maxLength"] = json!(max);
                }
                s
            }
            SchemaNode::Enum(values) => json!({ "type": "string", "enum": values }),
            SchemaNode::Literal(value) => json!({ "type": "string", "enum": [value] }),
            SchemaNode::Array {
                items,
                min_items,
                max_items,
            } => {
                let mut s = json!({ "type": "array", "items": items.to_json_schema() });
                if let Some(min) = min_items {
                    s["minItems"] = json!(min);
                }
                if let Some(max) = max_items {
                    s["maxItems"] = json!(max);
                }
                s
            }
            SchemaNode::Object(fields) => {
                let mut properties = Map::new();
                for field in fields {
                    let mut prop = field.node.to_json_schema();
                    if !field.description.is_empty() {
                        prop["description"] = json!(field.description);
                    }
                    properties.insert(field.name.to_string(), prop);
                }
                let required: Vec<&str> = fields.iter().map(|f| f.name).collect();
                json!({
                    "type": "object",
                    "properties": properties,
                    "required": required,
                    "additionalProperties": false,
                })
            }
            SchemaNode::Nullable(inner) => json!({
                "anyOf": [inner.to_json_schema(), { "type": "null" }]
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// ResponseSchema
// ---------------------------------------------------------------------------

pub const ACTOR_MODELS: [&str; 3] = ["fast", "balanced", "reasoning"];
pub const CREATE_ACTOR: &str = "create_actor";

/// A named schema the model is asked to satisfy.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseSchema {
    pub name: &'static str,
    pub description: &'static str,
    root: SchemaNode,
}

fn title_field() -> Field {
    Field::new(
        "title",
        "Short job title for the new actor",
        SchemaNode::string_len(Some(1), Some(100)),
    )
}

fn reason_field() -> Field {
    Field::new(
        "reason",
        "Why this actor is needed",
        SchemaNode::string_len(Some(10), None),
    )
}

fn skills_field() -> Field {
    Field::new(
        "skills",
        "Key skills, 3 to 10 entries",
        SchemaNode::array(SchemaNode::string_len(Some(1), None), Some(3), Some(10)),
    )
}

fn prompt_field() -> Field {
    Field::new(
        "prompt",
        "System prompt that defines the actor",
        SchemaNode::string_len(Some(20), None),
    )
}

fn model_field() -> Field {
    Field::new(
        "model",
        "Model tier the actor should run on",
        SchemaNode::Enum(ACTOR_MODELS.to_vec()),
    )
}

fn recommendation_field() -> Field {
    Field::new(
        "recommendation",
        "The recommendation in one or two sentences",
        SchemaNode::string_len(Some(1), None),
    )
}

impl ResponseSchema {
    pub fn new(name: &'static str, description: &'static str, root: SchemaNode) -> Self {
        Self {
            name,
            description,
            root,
        }
    }

    /// The complete response shape.
    pub fn recommendation() -> Self {
        let actor = SchemaNode::Object(vec![
            title_field(),
            reason_field(),
            skills_field(),
            prompt_field(),
            model_field(),
        ]);
        let action = SchemaNode::Object(vec![
            Field::new("type", "", SchemaNode::Literal(CREATE_ACTOR)),
            Field::new("actor", "The actor to create", actor),
        ]);
        Self::new(
            "recommendation",
            "A recommendation with an optional action",
            SchemaNode::Object(vec![
                recommendation_field(),
                Field::new(
                    "action",
                    "The action to take, or null",
                    SchemaNode::nullable(action),
                ),
            ]),
        )
    }

    /// Stage 1: the recommendation and whether an actor is needed.
    pub fn decision() -> Self {
        Self::new(
            "decision",
            "A recommendation and the kind of action it needs",
            SchemaNode::Object(vec![
                recommendation_field(),
                Field::new(
                    "action",
                    "\"create_actor\" if a new actor is needed, otherwise null",
                    SchemaNode::nullable(SchemaNode::Enum(vec![CREATE_ACTOR])),
                ),
            ]),
        )
    }

    /// Stage 2: who the actor is.
    pub fn actor_profile() -> Self {
        Self::new(
            "actor_profile",
            "Profile of the actor to create",
            SchemaNode::Object(vec![title_field(), reason_field(), skills_field()]),
        )
    }

    /// Stage 3: how the actor runs.
    pub fn actor_prompt() -> Self {
        Self::new(
            "actor_prompt",
            "Prompt and model tier for the actor",
            SchemaNode::Object(vec![prompt_field(), model_field()]),
        )
    }

    pub fn for_stage(stage: Stage) -> Self {
        match stage {
            Stage::Full => Self::recommendation(),
            Stage::Decision => Self::decision(),
            Stage::ActorProfile => Self::actor_profile(),
            Stage::ActorPrompt => Self::actor_prompt(),
        }
    }

    pub fn root(&self) -> &SchemaNode {
        &self.root
    }

    pub fn json_schema(&self) -> Value {
        self.root.to_json_schema()
    }

}

// ---------------------------------------------------------------------------
// Typed outputs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    CreateActor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorModel {
    Fast,
    Balanced,
    Reasoning,
}

/// Stage 1 output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DecisionOutput {
    pub recommendation: String,
    pub action: Option<ActionKind>,
}

/// Stage 2 output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActorProfileOutput {
    pub title: String,
    pub reason: String,
    pub skills: Vec<String>,
}

/// Stage 3 output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActorPromptOutput {
    pub prompt: String,
    pub model: ActorModel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Actor {
    pub title: String,
    pub reason: String,
    pub skills: Vec<String>,
    pub prompt: String,
    pub model: ActorModel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    CreateActor { actor: Actor },
}

/// The full response, whether produced in one shot or assembled from stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Recommendation {
    pub recommendation: String,
    pub action: Option<Action>,
}

impl Recommendation {
    /// Assemble from a decision that needed no action.
    pub fn without_action(decision: DecisionOutput) -> Self {
        Self {
            recommendation: decision.recommendation,
            action: None,
        }
    }

    /// Assemble from all three stage outputs, field by field.
    pub fn with_actor(
        decision: DecisionOutput,
        profile: ActorProfileOutput,
        prompt: ActorPromptOutput,
    ) -> Self {
        Self {
            recommendation: decision.recommendation,
            action: Some(Action::CreateActor {
                actor: Actor {
                    title: profile.title,
                    reason: profile.reason,
                    skills: profile.skills,
                    prompt: prompt.prompt,
                    model: prompt.model,
                },
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
