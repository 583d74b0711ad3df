use async_trait::async_trait;
use serde_json::json;

use crate::{FinishReason, ProviderAdapter, Request, Response, Role, Usage};
use schemabench_types::BenchError;

// ---------------------------------------------------------------------------
// GeminiAdapter
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct GeminiAdapter {
    api_key: String,
    client: reqwest::Client,
    base_url: String,
    default_model: String,
}

impl GeminiAdapter {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            client: reqwest::Client::new(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            default_model: "gemini-2.5-flash".to_string(),
        }
    }

    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }

    pub fn from_env() -> Result<Self, BenchError> {
        let key = std::env::var("GOOGLE_API_KEY")
            .or_else(|_| std::env::var("GEMINI_API_KEY"))
            .map_err(|_| BenchError::AuthError {
                provider: "google".into(),
            })?;
        Ok(Self::new(key))
    }

    fn build_request_body(&self, request: &Request) -> serde_json::Value {
        let contents: Vec<serde_json::Value> = request
            .messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| {
                let role = match m.role {
                    Role::Assistant => "model",
                    _ => "user",
                };
                json!({ "role": role, "parts": [{ "text": m.content }] })
            })
            .collect();

        let mut body = json!({
            "contents": contents,
        });

        if let Some(system) = request.system_text() {
            body["systemInstruction"] = json!({ "parts": [{ "text": system }] });
        }

        let mut gen_config = json!({});
        if let Some(max_tokens) = request.max_tokens {
            gen_config["maxOutputTokens"] = json!(max_tokens);
        }
        if let Some(temp) = request.temperature {
            gen_config["temperature"] = json!(temp);
        }
        if let Some(ref format) = request.response_format {
            gen_config["responseMimeType"] = json!("application/json");
            gen_config["responseJsonSchema"] = format.schema.clone();
        }
        if gen_config.as_object().is_some_and(|o| !o.is_empty()) {
            body["generationConfig"] = gen_config;
        }

        body
    }

    fn parse_response(
        &self,
        json: serde_json::Value,
        expect_structured: bool,
    ) -> Result<Response, BenchError> {
        let candidate = json["candidates"]
            .as_array()
            .and_then(|c| c.first())
            .ok_or_else(|| BenchError::ProviderError {
                provider: "google".into(),
                status: 0,
                message: "Missing candidates in response".into(),
                retryable: true,
            })?;

        let finish_reason = match candidate["finishReason"].as_str() {
            Some("MAX_TOKENS") => FinishReason::MaxTokens,
            Some("SAFETY") | Some("RECITATION") | Some("PROHIBITED_CONTENT") => {
                FinishReason::ContentFilter
            }
            Some("STOP_SEQUENCE") => FinishReason::StopSequence,
            _ => FinishReason::EndTurn,
        };

        let text: String = candidate["content"]["parts"]
            .as_array()
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|p| p["text"].as_str())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        // In JSON mode the text body is the object; invalid JSON is left for
        // the caller's validator to report.
        let structured = if expect_structured {
            serde_json::from_str::<serde_json::Value>(&text).ok()
        } else {
            None
        };

        let usage = json.get("usageMetadata").filter(|u| u.is_object()).map(|u| {
            let input = u["promptTokenCount"].as_u64().unwrap_or(0);
            let output = u["candidatesTokenCount"].as_u64().unwrap_or(0);
            Usage {
                input_tokens: input,
                output_tokens: output,
                total_tokens: u["totalTokenCount"].as_u64().unwrap_or(input + output),
            }
        });

        Ok(Response {
            id: uuid::Uuid::new_v4().to_string(),
            text,
            structured,
            usage,
            model: String::new(),
            finish_reason,
        })
    }
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

fn map_error(status: reqwest::StatusCode, body: &str) -> BenchError {
    let status_u16 = status.as_u16();
    match status_u16 {
        429 => BenchError::RateLimited {
            provider: "google".into(),
            retry_after_ms: 1000,
        },
        401 | 403 => BenchError::AuthError {
            provider: "google".into(),
        },
        500..=599 => BenchError::ProviderError {
            provider: "google".into(),
            status: status_u16,
            message: extract_error_message(body),
            retryable: true,
        },
        _ => BenchError::ProviderError {
            provider: "google".into(),
            status: status_u16,
            message: extract_error_message(body),
            retryable: false,
        },
    }
}

fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(String::from))
        .unwrap_or_else(|| body.to_string())
}

fn transport_error(e: reqwest::Error) -> BenchError {
    BenchError::ProviderError {
        provider: "google".into(),
        status: 0,
        message: e.to_string(),
        retryable: true,
    }
}

// ---------------------------------------------------------------------------
// ProviderAdapter implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl ProviderAdapter for GeminiAdapter {
    async fn complete(&self, request: &Request) -> Result<Response, BenchError> {
        let body = self.build_request_body(request);
        let model = if request.model.is_empty() {
            &self.default_model
        } else {
            &request.model
        };

        let url = format!("{}/models/{}:generateContent", self.base_url, model);

        let resp = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = resp.status();
        let response_body = resp.text().await.map_err(transport_error)?;

        if !status.is_success() {
            return Err(map_error(status, &response_body));
        }

        let json: serde_json::Value =
            serde_json::from_str(&response_body).map_err(|e| BenchError::ProviderError {
                provider: "google".into(),
                status: status.as_u16(),
                message: format!("Failed to parse response JSON: {e}"),
                retryable: true,
            })?;

        let mut response = self.parse_response(json, request.response_format.is_some())?;
        response.model = model.to_string();
        Ok(response)
    }

    fn name(&self) -> &str {
        "google"
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    fn supports_structured_output(&self) -> bool {
        true
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
