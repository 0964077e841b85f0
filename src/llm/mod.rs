//! Schema-driven LLM extraction.
//!
//! Token-aware chunking, prompt construction from a JSON-Schema subset,
//! chunk merging and per-call cost tracking. Agents are stateless across
//! jobs; one instance is cached per model id.

pub mod agent;
pub mod chunk;
pub mod cost;
pub mod models;
pub mod prompt;
pub mod schema;
pub mod tokens;

use dashmap::DashMap;
use std::sync::Arc;

use crate::error::LlmError;
use crate::types::JsonOptions;

pub use agent::{ExtractionAgent, ExtractionInput, ExtractionOutcome};
pub use cost::{CostEntry, TokenUsage};
pub use models::{ModelConfig, ModelRegistry};

/// Entry point used by the data extractor: resolves the model for a
/// request, caches one agent per model id, and runs the extraction.
pub struct LlmExtractor {
    registry: ModelRegistry,
    agents: DashMap<String, Arc<ExtractionAgent>>,
}

impl LlmExtractor {
    #[must_use]
    pub fn new(registry: ModelRegistry) -> Self {
        Self { registry, agents: DashMap::new() }
    }

    /// Whether any model is configured at all.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        !self.registry.is_empty()
    }

    fn agent_for(&self, model_id: Option<&str>) -> Result<Arc<ExtractionAgent>, LlmError> {
        let config = match model_id {
            Some(id) => self
                .registry
                .get(id)
                .ok_or_else(|| LlmError::UnknownModel { model: id.to_string() })?,
            None => self
                .registry
                .default_extract_model()
                .ok_or_else(|| LlmError::UnknownModel { model: "<default>".to_string() })?,
        };

        let agent = self
            .agents
            .entry(config.id.clone())
            .or_insert_with(|| Arc::new(ExtractionAgent::new(config.clone())))
            .clone();
        Ok(agent)
    }

    /// Extract structured data from `content` under the request's schema.
    pub async fn extract(
        &self,
        content: &str,
        options: &JsonOptions,
        cost_limit: Option<f64>,
    ) -> Result<ExtractionOutcome, LlmError> {
        let agent = self.agent_for(options.model.as_deref())?;
        agent
            .extract(ExtractionInput {
                content: content.to_string(),
                schema: options.schema.clone(),
                schema_name: options.schema_name.clone(),
                user_prompt: options.user_prompt.clone(),
                cost_limit,
            })
            .await
    }
}
