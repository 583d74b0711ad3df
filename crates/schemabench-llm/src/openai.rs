use async_trait::async_trait;
use serde_json::json;

use crate::{FinishReason, ProviderAdapter, Request, Response, Usage};
use schemabench_types::{BenchError, IssueCode, ValidationIssue};

// ---------------------------------------------------------------------------
// OpenAiAdapter
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct OpenAiAdapter {
    api_key: String,
    client: reqwest::Client,
    base_url: String,
    default_model: String,
}

impl OpenAiAdapter {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            client: reqwest::Client::new(),
            base_url: "https://api.openai.com".to_string(),
            default_model: "gpt-4o-mini".to_string(),
        }
    }

    pub fn from_env() -> Result<Self, BenchError> {
        let key = std::env::var("OPENAI_API_KEY").map_err(|_| BenchError::AuthError {
            provider: "openai".into(),
        })?;
        Ok(Self::new(key))
    }

    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }

    fn build_request_body(&self, request: &Request) -> serde_json::Value {
        let input: Vec<serde_json::Value> = request
            .messages
            .iter()
            .map(|msg| {
                json!({
                    "role": msg.role.as_str(),
                    "content": msg.content,
                })
            })
            .collect();

        let mut body = json!({
            "model": request.model,
            "input": input,
        });

        if let Some(max_tokens) = request.max_tokens {
            body["max_output_tokens"] = json!(max_tokens);
        }

        if let Some(temp) = request.temperature {
            body["temperature"] = json!(temp);
        }

        // Structured outputs: strict json_schema text format
        if let Some(ref format) = request.response_format {
            body["text"] = json!({
                "format": {
                    "type": "json_schema",
                    "name": format.name,
                    "description": format.description,
                    "schema": format.schema,
                    "strict": true,
                }
            });
        }

        body
    }

    fn parse_response(&self, body: serde_json::Value) -> Result<Response, BenchError> {
        let id = body["id"].as_str().unwrap_or("").to_string();
        let model = body["model"].as_str().unwrap_or("").to_string();

        let finish_reason = match body["status"].as_str() {
            Some("incomplete") => match body["incomplete_details"]["reason"].as_str() {
                Some("content_filter") => FinishReason::ContentFilter,
                _ => FinishReason::MaxTokens,
            },
            _ => FinishReason::EndTurn,
        };

        let mut text_parts: Vec<String> = Vec::new();
        let mut refusal: Option<String> = None;

        if let Some(output) = body["output"].as_array() {
            for item in output.iter().filter(|i| i["type"] == "message") {
                let Some(content) = item["content"].as_array() else {
                    continue;
                };
                for block in content {
                    match block["type"].as_str() {
                        Some("output_text") => {
                            if let Some(t) = block["text"].as_str() {
                                text_parts.push(t.to_string());
                            }
                        }
                        Some("refusal") => {
                            refusal = Some(block["refusal"].as_str().unwrap_or("").to_string());
                        }
                        _ => {}
                    }
                }
            }
        }

        if let Some(reason) = refusal {
            return Err(BenchError::SchemaRejected {
                provider: "openai".into(),
                issues: vec![ValidationIssue::new(
                    Vec::new(),
                    IssueCode::Refusal,
                    format!("Model refused to answer: {reason}"),
                )],
                raw_response: reason,
            });
        }

        let usage = body.get("usage").filter(|u| u.is_object()).map(|u| {
            Usage::new(
                u["input_tokens"].as_u64().unwrap_or(0),
                u["output_tokens"].as_u64().unwrap_or(0),
            )
        });

        Ok(Response {
            id,
            text: text_parts.join(""),
            structured: None,
            usage,
            model,
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
        429 => {
            let retry_ms = serde_json::from_str::<serde_json::Value>(body)
                .ok()
                .and_then(|v| v["error"]["retry_after"].as_f64())
                .map(|s| (s * 1000.0) as u64)
                .unwrap_or(1000);
            BenchError::RateLimited {
                provider: "openai".into(),
                retry_after_ms: retry_ms,
            }
        }
        401 | 403 => BenchError::AuthError {
            provider: "openai".into(),
        },
        408 => BenchError::RequestTimeout {
            provider: "openai".into(),
            timeout_ms: 0,
        },
        500..=599 => BenchError::ProviderError {
            provider: "openai".into(),
            status: status_u16,
            message: extract_error_message(body),
            retryable: true,
        },
        _ => BenchError::ProviderError {
            provider: "openai".into(),
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
    if e.is_timeout() {
        return BenchError::RequestTimeout {
            provider: "openai".into(),
            timeout_ms: 0,
        };
    }
    BenchError::ProviderError {
        provider: "openai".into(),
        status: 0,
        message: e.to_string(),
        retryable: true,
    }
}

// ---------------------------------------------------------------------------
// ProviderAdapter implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl ProviderAdapter for OpenAiAdapter {
    async fn complete(&self, request: &Request) -> Result<Response, BenchError> {
        let body = self.build_request_body(request);

        let resp = self
            .client
            .post(format!("{}/v1/responses", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
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
                provider: "openai".into(),
                status: status.as_u16(),
                message: format!("Failed to parse response JSON: {e}"),
                retryable: true,
            })?;

        self.parse_response(json)
    }

    fn name(&self) -> &str {
        "openai"
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
