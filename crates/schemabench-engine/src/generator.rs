//! The generation seam: one call to a model with a message list and a target
//! schema. The engine only ever talks to a [`Generator`]; [`LlmGenerator`]
//! backs it with the multi-provider LLM client.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use schemabench_llm::{LlmClient, Message, ModelRef, Request, ResponseFormat};
use schemabench_types::Result;

use crate::schema::ResponseSchema;

/// How the schema reaches the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationMode {
    /// Schema described in the prompt; output parsed and validated locally.
    Guided,
    /// Schema enforced by the provider at decoding time.
    Enforced,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.1,
            max_tokens: 2048,
        }
    }
}

pub struct GenerationRequest<'a> {
    pub model: &'a ModelRef,
    pub messages: &'a [Message],
    pub schema: &'a ResponseSchema,
    pub mode: GenerationMode,
    pub params: GenerationParams,
}

/// Token counts as reported; `None` means the provider did not say.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub text: String,
    /// Decoded object when the provider enforced the schema.
    pub object: Option<Value>,
    pub usage: Option<TokenUsage>,
}

impl Generation {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            object: None,
            usage: None,
        }
    }

    pub fn with_usage(mut self, input_tokens: u64, output_tokens: u64) -> Self {
        self.usage = Some(TokenUsage {
            input_tokens: Some(input_tokens),
            output_tokens: Some(output_tokens),
        });
        self
    }
}

/// Errors must keep the taxonomy intact: `SchemaRejected` for shape
/// rejections, `AuthError`/`ProviderUnavailable` for fatal ones, anything
/// else is treated as transient.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn invoke(&self, request: &GenerationRequest<'_>) -> Result<Generation>;
}

// ---------------------------------------------------------------------------
// LlmGenerator
// ---------------------------------------------------------------------------

pub struct LlmGenerator {
    client: Arc<LlmClient>,
}

impl LlmGenerator {
    pub fn new(client: Arc<LlmClient>) -> Self {
        Self { client }
    }

    fn build_request(request: &GenerationRequest<'_>) -> Request {
        let mut req = Request::new(request.model.model.clone(), request.messages.to_vec());
        req.provider = Some(request.model.provider.clone());
        req.temperature = Some(request.params.temperature);
        req.max_tokens = Some(request.params.max_tokens);
        if request.mode == GenerationMode::Enforced {
            req.response_format = Some(ResponseFormat {
                name: request.schema.name.to_string(),
                description: request.schema.description.to_string(),
                schema: request.schema.json_schema(),
            });
        }
        req
    }
}

#[async_trait]
impl Generator for LlmGenerator {
    async fn invoke(&self, request: &GenerationRequest<'_>) -> Result<Generation> {
        let response = self.client.complete(&Self::build_request(request)).await?;
        Ok(Generation {
            text: response.text,
            object: response.structured,
            usage: response.usage.map(|u| TokenUsage {
                input_tokens: Some(u.input_tokens),
                output_tokens: Some(u.output_tokens),
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use schemabench_llm::{FinishReason, ProviderAdapter, Response, Usage};
    use schemabench_types::BenchError;
    use std::sync::Mutex;

    struct CapturingProvider {
        seen: Arc<Mutex<Vec<Request>>>,
    }

    #[async_trait]
    impl ProviderAdapter for CapturingProvider {
        async fn complete(&self, request: &Request) -> std::result::Result<Response, BenchError> {
            self.seen.lock().unwrap().push(request.clone());
            Ok(Response {
                id: "r1".into(),
                text: "{\"recommendation\":\"R\",\"action\":null}".into(),
                structured: request
                    .response_format
                    .as_ref()
                    .map(|_| serde_json::json!({"recommendation": "R", "action": null})),
                usage: Some(Usage::new(11, 7)),
                model: request.model.clone(),
                finish_reason: FinishReason::EndTurn,
            })
        }
        fn name(&self) -> &str {
            "openai"
        }
        fn default_model(&self) -> &str {
            "gpt-4o-mini"
        }
        fn supports_structured_output(&self) -> bool {
            true
        }
    }

    fn generator() -> (LlmGenerator, Arc<Mutex<Vec<Request>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut client = LlmClient::new();
        client.register_provider(CapturingProvider { seen: seen.clone() });
        (LlmGenerator::new(Arc::new(client)), seen)
    }

    #[tokio::test]
    async fn enforced_mode_sets_response_format() {
        let (generator, seen) = generator();
        let model = ModelRef::new("openai", "gpt-4o-mini");
        let schema = ResponseSchema::recommendation();
        let messages = vec![Message::user("hi")];

        let generation = generator
            .invoke(&GenerationRequest {
                model: &model,
                messages: &messages,
                schema: &schema,
                mode: GenerationMode::Enforced,
                params: GenerationParams::default(),
            })
            .await
            .unwrap();

        assert!(generation.object.is_some());
        assert_eq!(
            generation.usage,
            Some(TokenUsage {
                input_tokens: Some(11),
                output_tokens: Some(7)
            })
        );

        let requests = seen.lock().unwrap();
        let format = requests[0].response_format.as_ref().unwrap();
        assert_eq!(format.name, "recommendation");
        assert_eq!(format.schema["type"], "object");
        assert_eq!(requests[0].provider.as_deref(), Some("openai"));
        assert_eq!(requests[0].max_tokens, Some(2048));
    }

    #[tokio::test]
    async fn guided_mode_sends_plain_request() {
        let (generator, seen) = generator();
        let model = ModelRef::new("openai", "gpt-4o-mini");
        let schema = ResponseSchema::decision();
        let messages = vec![Message::system("s"), Message::user("hi")];

        let generation = generator
            .invoke(&GenerationRequest {
                model: &model,
                messages: &messages,
                schema: &schema,
                mode: GenerationMode::Guided,
                params: GenerationParams {
                    temperature: 0.0,
                    max_tokens: 512,
                },
            })
            .await
            .unwrap();

        assert!(generation.object.is_none());
        let requests = seen.lock().unwrap();
        assert!(requests[0].response_format.is_none());
        assert_eq!(requests[0].messages.len(), 2);
        assert_eq!(requests[0].max_tokens, Some(512));
    }

    #[tokio::test]
    async fn unregistered_provider_is_fatal() {
        let (generator, _) = generator();
        let model = ModelRef::new("anthropic", "claude-haiku-4-5");
        let schema = ResponseSchema::decision();
        let messages = vec![Message::user("hi")];

        let err = generator
            .invoke(&GenerationRequest {
                model: &model,
                messages: &messages,
                schema: &schema,
                mode: GenerationMode::Guided,
                params: GenerationParams::default(),
            })
            .await
            .unwrap_err();
        assert!(err.is_fatal());
    }
}
