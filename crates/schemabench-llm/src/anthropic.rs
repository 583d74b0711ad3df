use async_trait::async_trait;
use serde_json::json;

use crate::{FinishReason, ProviderAdapter, Request, Response, Role, Usage};
use schemabench_types::{BenchError, IssueCode, ValidationIssue};

// ---------------------------------------------------------------------------
// AnthropicAdapter
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct AnthropicAdapter {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl AnthropicAdapter {
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: "https://api.anthropic.com".to_string(),
        }
    }

    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }

    pub fn from_env() -> Result<Self, BenchError> {
        let key = std::env::var("ANTHROPIC_API_KEY").map_err(|_| BenchError::AuthError {
            provider: "anthropic".into(),
        })?;
        Ok(Self::new(key))
    }
}

// ---------------------------------------------------------------------------
// Request translation (Unified → Anthropic JSON)
// ---------------------------------------------------------------------------

fn build_request_body(request: &Request) -> serde_json::Value {
    let messages: Vec<serde_json::Value> = request
        .messages
        .iter()
        .filter(|m| m.role != Role::System)
        .map(|m| {
            json!({
                "role": m.role.as_str(),
                "content": [{ "type": "text", "text": m.content }],
            })
        })
        .collect();

    let mut body = json!({
        "model": request.model,
        "max_tokens": request.max_tokens.unwrap_or(4096),
        "messages": messages,
    });

    if let Some(system) = request.system_text() {
        body["system"] = json!(system);
    }

    if let Some(temp) = request.temperature {
        body["temperature"] = json!(temp);
    }

    // Enforced output: one tool whose input schema is the target shape, forced
    if let Some(ref format) = request.response_format {
        body["tools"] = json!([{
            "name": format.name,
            "description": format.description,
            "input_schema": format.schema,
        }]);
        body["tool_choice"] = json!({ "type": "tool", "name": format.name });
    }

    body
}

// ---------------------------------------------------------------------------
// Response translation (Anthropic JSON → Unified Response)
// ---------------------------------------------------------------------------

fn parse_response(body: &serde_json::Value, expect_structured: bool) -> Result<Response, BenchError> {
    let id = body["id"].as_str().unwrap_or("").to_string();
    let model = body["model"].as_str().unwrap_or("").to_string();

    let stop_reason = match body["stop_reason"].as_str() {
        Some("max_tokens") => FinishReason::MaxTokens,
        Some("stop_sequence") => FinishReason::StopSequence,
        Some("tool_use") => FinishReason::ToolUse,
        Some("refusal") => FinishReason::ContentFilter,
        _ => FinishReason::EndTurn,
    };

    let mut text_parts: Vec<String> = Vec::new();
    let mut structured: Option<serde_json::Value> = None;

    if let Some(content) = body["content"].as_array() {
        for block in content {
            match block["type"].as_str() {
                Some("text") => {
                    if let Some(t) = block["text"].as_str() {
                        text_parts.push(t.to_string());
                    }
                }
                Some("tool_use") if structured.is_none() => {
                    structured = Some(block["input"].clone());
                }
                _ => {}
            }
        }
    }

    let text = text_parts.join("");

    if expect_structured && structured.is_none() {
        return Err(BenchError::SchemaRejected {
            provider: "anthropic".into(),
            issues: vec![ValidationIssue::new(
                Vec::new(),
                IssueCode::MissingStructuredOutput,
                format!("Response contained no tool_use block (stop_reason: {stop_reason:?})"),
            )],
            raw_response: text,
        });
    }

    // Tool input is the answer; keep a textual copy for the attempt record.
    let text = match (&structured, text.is_empty()) {
        (Some(obj), true) => obj.to_string(),
        _ => text,
    };

    let usage = body.get("usage").filter(|u| u.is_object()).map(|u| {
        Usage::new(
            u["input_tokens"].as_u64().unwrap_or(0),
            u["output_tokens"].as_u64().unwrap_or(0),
        )
    });

    Ok(Response {
        id,
        text,
        structured,
        usage,
        model,
        finish_reason: stop_reason,
    })
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
                provider: "anthropic".into(),
                retry_after_ms: retry_ms,
            }
        }
        401 | 403 => BenchError::AuthError {
            provider: "anthropic".into(),
        },
        500..=599 => BenchError::ProviderError {
            provider: "anthropic".into(),
            status: status_u16,
            message: extract_error_message(body),
            retryable: true,
        },
        _ => BenchError::ProviderError {
            provider: "anthropic".into(),
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
        provider: "anthropic".into(),
        status: 0,
        message: e.to_string(),
        retryable: true,
    }
}

// ---------------------------------------------------------------------------
// ProviderAdapter implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl ProviderAdapter for AnthropicAdapter {
    async fn complete(&self, request: &Request) -> Result<Response, BenchError> {
        let body = build_request_body(request);

        let resp = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
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
                provider: "anthropic".into(),
                status: status.as_u16(),
                message: format!("Failed to parse response JSON: {e}"),
                retryable: true,
            })?;

        parse_response(&json, request.response_format.is_some())
    }

    fn name(&self) -> &str {
        "anthropic"
    }

    fn default_model(&self) -> &str {
        "claude-haiku-4-5"
    }

    fn supports_structured_output(&self) -> bool {
        true
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
