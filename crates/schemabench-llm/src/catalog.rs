use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Provider names the client knows how to reach.
pub const KNOWN_PROVIDERS: [&str; 3] = ["openai", "anthropic", "google"];

// ---------------------------------------------------------------------------
// ModelInfo / ModelCatalog
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub provider: String,
    pub context_window: usize,
    pub supports_structured_output: bool,
    /// USD per million input tokens.
    pub input_price_per_mtok: f64,
    /// USD per million output tokens.
    pub output_price_per_mtok: f64,
}

#[derive(Debug, Clone)]
pub struct ModelCatalog {
    models: BTreeMap<String, ModelInfo>,
}

impl ModelCatalog {
    pub fn new() -> Self {
        let mut models = BTreeMap::new();

        let entries: [(&str, &str, usize, f64, f64); 9] = [
            // OpenAI
            ("gpt-4o", "openai", 128_000, 2.50, 10.00),
            ("gpt-4o-mini", "openai", 128_000, 0.15, 0.60),
            ("gpt-4.1", "openai", 1_047_576, 2.00, 8.00),
            ("gpt-4.1-mini", "openai", 1_047_576, 0.40, 1.60),
            // Anthropic
            ("claude-sonnet-4-5", "anthropic", 200_000, 3.00, 15.00),
            ("claude-haiku-4-5", "anthropic", 200_000, 1.00, 5.00),
            ("claude-opus-4-1", "anthropic", 200_000, 15.00, 75.00),
            // Google
            ("gemini-2.5-pro", "google", 1_048_576, 1.25, 10.00),
            ("gemini-2.5-flash", "google", 1_048_576, 0.30, 2.50),
        ];

        for (id, provider, ctx, input, output) in entries {
            models.insert(
                id.to_string(),
                ModelInfo {
                    id: id.to_string(),
                    provider: provider.to_string(),
                    context_window: ctx,
                    supports_structured_output: true,
                    input_price_per_mtok: input,
                    output_price_per_mtok: output,
                },
            );
        }

        Self { models }
    }

    pub fn lookup(&self, model: &str) -> Option<&ModelInfo> {
        self.models.get(model)
    }

    pub fn provider_for_model(&self, model: &str) -> Option<&str> {
        self.models.get(model).map(|m| m.provider.as_str())
    }

    /// All catalog entries, ordered by id.
    pub fn models(&self) -> impl Iterator<Item = &ModelInfo> {
        self.models.values()
    }

    /// Estimated USD cost for a token split, or `None` when the model is not
    /// priced in the catalog.
    pub fn estimate_cost(&self, model: &str, input_tokens: u64, output_tokens: u64) -> Option<f64> {
        let info = self.lookup(model)?;
        Some(
            input_tokens as f64 / 1_000_000.0 * info.input_price_per_mtok
                + output_tokens as f64 / 1_000_000.0 * info.output_price_per_mtok,
        )
    }

    /// Resolve a user-supplied model identifier.
    ///
    /// Accepts a catalog id (`gpt-4o-mini`) or an explicit `provider:model`
    /// pair whose provider is one of [`KNOWN_PROVIDERS`].
    pub fn resolve(&self, id: &str) -> Option<ModelRef> {
        let id = id.trim();
        if let Some((provider, model)) = id.split_once(':') {
            if KNOWN_PROVIDERS.contains(&provider) && !model.is_empty() {
                return Some(ModelRef::new(provider, model));
            }
            return None;
        }
        self.lookup(id).map(|info| ModelRef::new(&info.provider, &info.id))
    }
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// ModelRef
// ---------------------------------------------------------------------------

/// A resolved model handle: which provider to route to and which model to ask for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelRef {
    pub provider: String,
    pub model: String,
}

impl ModelRef {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
        }
    }

    /// Canonical `provider:model` identifier.
    pub fn id(&self) -> String {
        format!("{}:{}", self.provider, self.model)
    }
}

impl fmt::Display for ModelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.provider, self.model)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
