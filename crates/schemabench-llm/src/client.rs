use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use schemabench_types::BenchError;

use crate::{DynProvider, ModelCatalog, ProviderAdapter, Request, Response};

// ---------------------------------------------------------------------------
// Middleware
// ---------------------------------------------------------------------------

pub trait Middleware: Send + Sync {
    fn before(&self, _request: &mut Request) {}
    fn after(&self, _request: &Request, _response: &mut Response) {}
}

// ---------------------------------------------------------------------------
// Built-in middleware: LoggingMiddleware
// ---------------------------------------------------------------------------

pub struct LoggingMiddleware;

impl Middleware for LoggingMiddleware {
    fn before(&self, request: &mut Request) {
        tracing::debug!(
            model = %request.model,
            messages = request.messages.len(),
            structured = request.response_format.is_some(),
            "LLM request"
        );
    }

    fn after(&self, _request: &Request, response: &mut Response) {
        tracing::debug!(
            model = %response.model,
            input_tokens = response.usage.map(|u| u.input_tokens),
            output_tokens = response.usage.map(|u| u.output_tokens),
            finish = ?response.finish_reason,
            "LLM response"
        );
    }
}

// ---------------------------------------------------------------------------
// Built-in middleware: CostTrackingMiddleware
// ---------------------------------------------------------------------------

/// Accumulates reported token usage. Clones share the same counters, so a
/// clone can be handed to the client and the original read afterwards.
#[derive(Clone)]
pub struct CostTrackingMiddleware {
    total_input: Arc<AtomicU64>,
    total_output: Arc<AtomicU64>,
}

impl CostTrackingMiddleware {
    pub fn new() -> Self {
        Self {
            total_input: Arc::new(AtomicU64::new(0)),
            total_output: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn total_input_tokens(&self) -> u64 {
        self.total_input.load(Ordering::Relaxed)
    }

    pub fn total_output_tokens(&self) -> u64 {
        self.total_output.load(Ordering::Relaxed)
    }
}

impl Default for CostTrackingMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

impl Middleware for CostTrackingMiddleware {
    fn after(&self, _request: &Request, response: &mut Response) {
        if let Some(usage) = response.usage {
            self.total_input
                .fetch_add(usage.input_tokens, Ordering::Relaxed);
            self.total_output
                .fetch_add(usage.output_tokens, Ordering::Relaxed);
        }
    }
}

// ---------------------------------------------------------------------------
// LlmClient
// ---------------------------------------------------------------------------

pub struct LlmClient {
    providers: HashMap<String, DynProvider>,
    model_catalog: ModelCatalog,
    middleware: Vec<Box<dyn Middleware>>,
}

impl LlmClient {
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
            model_catalog: ModelCatalog::new(),
            middleware: Vec::new(),
        }
    }

    pub fn register_provider(&mut self, provider: impl ProviderAdapter + 'static) {
        let name = provider.name().to_string();
        self.providers.insert(name, DynProvider::new(provider));
    }

    pub fn with_middleware(mut self, m: impl Middleware + 'static) -> Self {
        self.middleware.push(Box::new(m));
        self
    }

    pub fn model_catalog(&self) -> &ModelCatalog {
        &self.model_catalog
    }

    pub fn has_provider(&self, name: &str) -> bool {
        self.providers.contains_key(name)
    }

    /// Whether the named provider is registered and enforces
    /// `Request::response_format` at decoding time.
    pub fn supports_structured_output(&self, name: &str) -> bool {
        self.providers
            .get(name)
            .is_some_and(DynProvider::supports_structured_output)
    }

    /// Names of registered providers, sorted.
    pub fn provider_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub async fn complete(&self, request: &Request) -> Result<Response, BenchError> {
        let provider = self.resolve_provider(request)?;
        let mut req = request.clone();

        for m in &self.middleware {
            m.before(&mut req);
        }

        let mut resp = provider.complete(&req).await?;

        for m in &self.middleware {
            m.after(&req, &mut resp);
        }

        Ok(resp)
    }

    /// Explicit provider field first, then the catalog. No fallback: a
    /// benchmark must never silently measure a different provider.
    fn resolve_provider(&self, request: &Request) -> Result<&DynProvider, BenchError> {
        let name = match request.provider {
            Some(ref provider_name) => provider_name.as_str(),
            None => self
                .model_catalog
                .provider_for_model(&request.model)
                .ok_or_else(|| {
                    BenchError::Other(format!(
                        "No provider given and model '{}' is not in the catalog",
                        request.model
                    ))
                })?,
        };

        self.providers
            .get(name)
            .ok_or_else(|| BenchError::ProviderUnavailable {
                provider: name.to_string(),
            })
    }

    /// Create from environment variables (detect available API keys).
    pub fn from_env() -> Result<Self, BenchError> {
        let mut client = Self::new();
        let mut found_any = false;

        if let Ok(adapter) = crate::AnthropicAdapter::from_env() {
            client.register_provider(adapter);
            found_any = true;
        }

        if let Ok(adapter) = crate::OpenAiAdapter::from_env() {
            client.register_provider(adapter);
            found_any = true;
        }

        if let Ok(adapter) = crate::GeminiAdapter::from_env() {
            client.register_provider(adapter);
            found_any = true;
        }

        if !found_any {
            return Err(BenchError::InvalidConfig(
                "No LLM provider API keys found in environment".to_string(),
            ));
        }

        Ok(client)
    }
}

impl Default for LlmClient {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FinishReason, Message, Usage};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    struct MockProvider {
        name: &'static str,
        call_count: Arc<AtomicUsize>,
        usage: Option<Usage>,
    }

    impl MockProvider {
        fn named(name: &'static str) -> Self {
            Self {
                name,
                call_count: Arc::new(AtomicUsize::new(0)),
                usage: Some(Usage::new(10, 20)),
            }
        }
    }

    #[async_trait]
    impl ProviderAdapter for MockProvider {
        async fn complete(&self, request: &Request) -> Result<Response, BenchError> {
            self.call_count.fetch_add(1, Ordering::Relaxed);
            Ok(Response {
                id: format!("{}-resp", self.name),
                text: format!("Hello from {}", self.name),
                structured: None,
                usage: self.usage,
                model: request.model.clone(),
                finish_reason: FinishReason::EndTurn,
            })
        }

        fn name(&self) -> &str {
            self.name
        }

        fn default_model(&self) -> &str {
            "mock-model"
        }

        fn supports_structured_output(&self) -> bool {
            true
        }
    }

    fn make_request(model: &str, provider: Option<&str>) -> Request {
        let mut req = Request::new(model, vec![Message::user("hello")]);
        req.provider = provider.map(String::from);
        req
    }

    #[tokio::test]
    async fn register_provider_and_complete() {
        let mut client = LlmClient::new();
        client.register_provider(MockProvider::named("mock"));
        assert!(client.has_provider("mock"));

        let req = make_request("mock-model", Some("mock"));
        let resp = client.complete(&req).await.unwrap();
        assert_eq!(resp.id, "mock-resp");
        assert_eq!(resp.text, "Hello from mock");
    }

    #[test]
    fn structured_output_support_requires_registration() {
        let mut client = LlmClient::new();
        assert!(!client.supports_structured_output("mock"));
        client.register_provider(MockProvider::named("mock"));
        assert!(client.supports_structured_output("mock"));
    }

    #[tokio::test]
    async fn resolve_provider_by_model_name() {
        let mut client = LlmClient::new();
        client.register_provider(MockProvider::named("anthropic"));
        client.register_provider(MockProvider::named("openai"));

        let req = make_request("claude-haiku-4-5", None);
        let resp = client.complete(&req).await.unwrap();
        assert_eq!(resp.id, "anthropic-resp");
    }

    #[tokio::test]
    async fn middleware_before_after_called() {
        let before_count = Arc::new(AtomicUsize::new(0));
        let after_count = Arc::new(AtomicUsize::new(0));

        struct CountingMiddleware {
            before_count: Arc<AtomicUsize>,
            after_count: Arc<AtomicUsize>,
        }

        impl Middleware for CountingMiddleware {
            fn before(&self, _request: &mut Request) {
                self.before_count.fetch_add(1, Ordering::Relaxed);
            }
            fn after(&self, _request: &Request, _response: &mut Response) {
                self.after_count.fetch_add(1, Ordering::Relaxed);
            }
        }

        let mut client = LlmClient::new().with_middleware(CountingMiddleware {
            before_count: before_count.clone(),
            after_count: after_count.clone(),
        });
        client.register_provider(MockProvider::named("mock"));

        let req = make_request("mock-model", Some("mock"));
        client.complete(&req).await.unwrap();

        assert_eq!(before_count.load(Ordering::Relaxed), 1);
        assert_eq!(after_count.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn from_env_with_no_keys_returns_error() {
        std::env::remove_var("ANTHROPIC_API_KEY");
        std::env::remove_var("OPENAI_API_KEY");
        std::env::remove_var("GOOGLE_API_KEY");
        std::env::remove_var("GEMINI_API_KEY");

        let result = LlmClient::from_env();
        assert!(result.is_err());
        let err = result.err().unwrap();
        assert!(err.to_string().contains("No LLM provider API keys found"));
    }

    #[test]
    fn resolve_provider_unregistered_is_unavailable() {
        let client = LlmClient::new();
        let req = make_request("some-model", Some("openai"));
        let err = client.resolve_provider(&req).err().unwrap();
        assert!(matches!(err, BenchError::ProviderUnavailable { ref provider } if provider == "openai"));
        assert!(err.is_fatal());
    }

    #[test]
    fn resolve_provider_unknown_model_without_provider_fails() {
        let mut client = LlmClient::new();
        client.register_provider(MockProvider::named("mock"));
        let req = make_request("unknown-model", None);
        assert!(client.resolve_provider(&req).is_err());
    }

    #[tokio::test]
    async fn cost_tracking_middleware() {
        let cost = CostTrackingMiddleware::new();

        let mut client = LlmClient::new().with_middleware(cost.clone());
        client.register_provider(MockProvider::named("mock"));

        let req = make_request("mock-model", Some("mock"));
        client.complete(&req).await.unwrap();

        assert_eq!(cost.total_input_tokens(), 10);
        assert_eq!(cost.total_output_tokens(), 20);

        client.complete(&req).await.unwrap();
        assert_eq!(cost.total_input_tokens(), 20);
        assert_eq!(cost.total_output_tokens(), 40);
    }

    #[tokio::test]
    async fn cost_tracking_ignores_missing_usage() {
        let cost = CostTrackingMiddleware::new();
        let mut client = LlmClient::new().with_middleware(cost.clone());
        let mut provider = MockProvider::named("mock");
        provider.usage = None;
        client.register_provider(provider);

        client
            .complete(&make_request("mock-model", Some("mock")))
            .await
            .unwrap();
        assert_eq!(cost.total_input_tokens(), 0);
    }

    #[test]
    fn provider_names_sorted() {
        let mut client = LlmClient::new();
        client.register_provider(MockProvider::named("openai"));
        client.register_provider(MockProvider::named("anthropic"));
        assert_eq!(client.provider_names(), vec!["anthropic", "openai"]);
    }
}
