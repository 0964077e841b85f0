//! Model configuration registry.
//!
//! Models are described in a JSON config (file or URL via
//! `ANYCRAWL_AI_CONFIG_PATH`) or assembled from provider env vars. Pricing
//! is per token so `cost = input * price_in + output * price_out`.

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Configuration for one chat-completions model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub id: String,
    /// Wire model name sent to the provider (defaults to `id`).
    #[serde(default)]
    pub model_name: Option<String>,
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    pub max_input_tokens: usize,
    pub max_output_tokens: usize,
    /// USD per input token.
    #[serde(default)]
    pub input_price: f64,
    /// USD per output token.
    #[serde(default)]
    pub output_price: f64,
}

impl ModelConfig {
    #[must_use]
    pub fn wire_name(&self) -> &str {
        self.model_name.as_deref().unwrap_or(&self.id)
    }

    #[must_use]
    pub fn call_cost(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        input_tokens as f64 * self.input_price + output_tokens as f64 * self.output_price
    }

    /// Effective input budget: 80% of the window minus the system prompt.
    #[must_use]
    pub fn input_budget(&self, system_prompt_tokens: usize) -> usize {
        let window = (self.max_input_tokens as f64 * 0.8).floor() as usize;
        window.saturating_sub(system_prompt_tokens)
    }

    /// Chunk overlap: min(200, 10% of the input window).
    #[must_use]
    pub fn chunk_overlap(&self) -> usize {
        200.min((self.max_input_tokens as f64 * 0.1) as usize)
    }
}

#[derive(Debug, Deserialize)]
struct AiConfigFile {
    #[serde(default)]
    models: Vec<ModelConfig>,
    #[serde(default)]
    default_llm_model: Option<String>,
    #[serde(default)]
    default_extract_model: Option<String>,
}

/// Registry of configured models plus the defaults for generic LLM use and
/// for extraction.
#[derive(Debug, Default)]
pub struct ModelRegistry {
    models: HashMap<String, ModelConfig>,
    default_llm: Option<String>,
    default_extract: Option<String>,
}

impl ModelRegistry {
    /// Load the registry: AI config file/URL first, then env fallbacks.
    pub async fn load(
        ai_config_path: Option<&str>,
        default_llm: Option<String>,
        default_extract: Option<String>,
    ) -> Result<Self> {
        let mut registry = Self::default();

        if let Some(path) = ai_config_path {
            let raw = if path.starts_with("http://") || path.starts_with("https://") {
                reqwest::get(path)
                    .await
                    .with_context(|| format!("fetching AI config from {path}"))?
                    .text()
                    .await
                    .context("reading AI config response")?
            } else {
                tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("reading AI config file {path}"))?
            };
            registry.merge_config(&raw)?;
        }

        if registry.models.is_empty()
            && let Some(model) = Self::model_from_env()
        {
            registry.models.insert(model.id.clone(), model);
        }

        if let Some(id) = default_llm {
            registry.default_llm = Some(id);
        }
        if let Some(id) = default_extract {
            registry.default_extract = Some(id);
        }

        Ok(registry)
    }

    fn merge_config(&mut self, raw: &str) -> Result<()> {
        let parsed: AiConfigFile = serde_json::from_str(raw).context("parsing AI config JSON")?;
        for model in parsed.models {
            if model.max_input_tokens == 0 {
                bail!("model {}: max_input_tokens must be > 0", model.id);
            }
            self.models.insert(model.id.clone(), model);
        }
        if parsed.default_llm_model.is_some() {
            self.default_llm = parsed.default_llm_model;
        }
        if parsed.default_extract_model.is_some() {
            self.default_extract = parsed.default_extract_model;
        }
        Ok(())
    }

    /// Single-model fallback from `OPENAI_API_KEY` / `OPENAI_BASE_URL` +
    /// `DEFAULT_LLM_MODEL`.
    fn model_from_env() -> Option<ModelConfig> {
        let id = std::env::var("DEFAULT_LLM_MODEL").ok()?;
        let base_url = std::env::var("OPENAI_BASE_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
        Some(ModelConfig {
            id,
            model_name: None,
            base_url,
            api_key: std::env::var("OPENAI_API_KEY").ok(),
            max_input_tokens: 128_000,
            max_output_tokens: 16_384,
            input_price: 0.0,
            output_price: 0.0,
        })
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&ModelConfig> {
        self.models.get(id)
    }

    /// Model used for schema extraction when the request names none.
    #[must_use]
    pub fn default_extract_model(&self) -> Option<&ModelConfig> {
        self.default_extract
            .as_deref()
            .or(self.default_llm.as_deref())
            .and_then(|id| self.models.get(id))
            .or_else(|| self.models.values().next())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Test/bench helper to register a model directly.
    pub fn insert(&mut self, model: ModelConfig) {
        self.models.insert(model.id.clone(), model);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(id: &str) -> ModelConfig {
        ModelConfig {
            id: id.into(),
            model_name: None,
            base_url: "https://api.test/v1".into(),
            api_key: None,
            max_input_tokens: 10_000,
            max_output_tokens: 2_000,
            input_price: 1e-6,
            output_price: 2e-6,
        }
    }

    #[test]
    fn budget_and_overlap_follow_window() {
        let m = model("m");
        assert_eq!(m.input_budget(100), 8_000 - 100);
        assert_eq!(m.chunk_overlap(), 200);

        let mut small = model("s");
        small.max_input_tokens = 1_000;
        assert_eq!(small.chunk_overlap(), 100);
    }

    #[test]
    fn call_cost_is_linear() {
        let m = model("m");
        let cost = m.call_cost(1_000, 500);
        assert!((cost - (1_000.0 * 1e-6 + 500.0 * 2e-6)).abs() < 1e-12);
    }

    #[test]
    fn registry_config_parsing() {
        let mut registry = ModelRegistry::default();
        registry
            .merge_config(
                r#"{
                    "models": [
                        {"id": "fast", "base_url": "https://api.test/v1",
                         "max_input_tokens": 8000, "max_output_tokens": 1000}
                    ],
                    "default_extract_model": "fast"
                }"#,
            )
            .unwrap();
        assert!(registry.get("fast").is_some());
        assert_eq!(registry.default_extract_model().unwrap().id, "fast");
    }

    #[test]
    fn zero_window_is_rejected() {
        let mut registry = ModelRegistry::default();
        let err = registry.merge_config(
            r#"{"models": [{"id": "bad", "base_url": "x", "max_input_tokens": 0, "max_output_tokens": 1}]}"#,
        );
        assert!(err.is_err());
    }
}
