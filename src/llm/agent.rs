//! Schema-driven extraction agent for one configured model.
//!
//! Stateless across jobs; the extractor caches one agent per model id.
//! Talks to any OpenAI-compatible chat-completions endpoint.

use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::error::LlmError;

use super::chunk::{chunk_by_lines, merge_results};
use super::cost::{CostEntry, CostLedger, TokenUsage};
use super::models::ModelConfig;
use super::prompt::build_system_prompt;
use super::schema::{self, NormalizedSchema};
use super::tokens::TokenCounter;

/// Inputs for one extraction run.
#[derive(Debug, Clone)]
pub struct ExtractionInput {
    pub content: String,
    pub schema: Value,
    pub schema_name: Option<String>,
    pub user_prompt: Option<String>,
    /// Hard USD spend cap for this run.
    pub cost_limit: Option<f64>,
}

/// Result of one extraction run.
#[derive(Debug, Clone)]
pub struct ExtractionOutcome {
    pub data: Value,
    pub tokens: TokenUsage,
    pub chunks: usize,
    pub cost: f64,
    pub calls: Vec<CostEntry>,
}

pub struct ExtractionAgent {
    model: ModelConfig,
    http: reqwest::Client,
    counter: TokenCounter,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

impl ExtractionAgent {
    #[must_use]
    pub fn new(model: ModelConfig) -> Self {
        let counter = TokenCounter::for_model(model.wire_name());
        Self { model, http: reqwest::Client::new(), counter }
    }

    #[must_use]
    pub fn model_id(&self) -> &str {
        &self.model.id
    }

    /// Run one extraction: single call when the content fits the input
    /// budget, otherwise chunked calls merged into one result.
    pub async fn extract(&self, input: ExtractionInput) -> Result<ExtractionOutcome, LlmError> {
        let normalized = schema::normalize(&input.schema);
        let system_prompt = build_system_prompt(
            &normalized.schema,
            input.schema_name.as_deref(),
            input.user_prompt.as_deref(),
        );

        let system_tokens = self.counter.count(&system_prompt);
        let budget = self.model.input_budget(system_tokens);
        let overlap = self.model.chunk_overlap();
        let content_tokens = self.counter.count(&input.content);

        let chunks = if content_tokens <= budget {
            vec![input.content.clone()]
        } else {
            chunk_by_lines(&input.content, budget, overlap, &self.counter)
        };
        debug!(
            model = %self.model.id,
            content_tokens,
            budget,
            chunk_count = chunks.len(),
            "running schema extraction"
        );

        let mut ledger = CostLedger::new(input.cost_limit);
        let mut results = Vec::with_capacity(chunks.len());
        let chunk_count = chunks.len();

        for (idx, chunk) in chunks.iter().enumerate() {
            // Worst-case projection: full chunk in, full output window out.
            let projected = self.model.call_cost(
                (self.counter.count(chunk) + system_tokens) as u64,
                self.model.max_output_tokens as u64,
            );
            ledger.check_budget(projected)?;

            let (value, usage) = self.call_model(&system_prompt, chunk).await?;
            ledger.record(CostEntry {
                call_type: if chunk_count == 1 { "extract" } else { "extract_chunk" }.to_string(),
                metadata: json!({ "chunk": idx, "chunks": chunk_count }),
                model: self.model.id.clone(),
                tokens: usage,
                cost: self.model.call_cost(usage.input, usage.output),
            });
            results.push(value);
        }

        let merged = merge_results(results);
        let pruned = schema::prune_to_schema(merged, &normalized.schema, 0);
        let data = finish(pruned, &normalized);

        Ok(ExtractionOutcome {
            data,
            tokens: ledger.total_tokens(),
            chunks: chunk_count,
            cost: ledger.total_cost(),
            calls: ledger.entries().to_vec(),
        })
    }

    async fn call_model(
        &self,
        system_prompt: &str,
        content: &str,
    ) -> Result<(Value, TokenUsage), LlmError> {
        let body = json!({
            "model": self.model.wire_name(),
            "temperature": 0,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": system_prompt },
                { "role": "user", "content": content },
            ],
        });

        let url = format!("{}/chat/completions", self.model.base_url.trim_end_matches('/'));
        let mut request = self.http.post(&url).json(&body);
        if let Some(key) = &self.model.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| LlmError::Call(format!("{e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(LlmError::Call(format!("model endpoint returned {status}: {text}")));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::BadOutput(format!("invalid chat response: {e}")))?;

        let content_out = parsed
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or_else(|| LlmError::BadOutput("empty choices".into()))?;

        let value = parse_json_output(content_out)?;

        let usage = match parsed.usage {
            Some(u) => TokenUsage::new(u.prompt_tokens, u.completion_tokens),
            None => {
                // Provider sent no usage block; count locally.
                warn!(model = %self.model.id, "no usage in response, counting tokens locally");
                TokenUsage::new(
                    (self.counter.count(system_prompt) + self.counter.count(content)) as u64,
                    self.counter.count(content_out) as u64,
                )
            }
        };

        Ok((value, usage))
    }
}

fn finish(data: Value, normalized: &NormalizedSchema) -> Value {
    if normalized.unwrap_items {
        schema::unwrap_items(data)
    } else {
        data
    }
}

/// Models occasionally fence their JSON despite `response_format`; accept
/// fenced and bare output.
fn parse_json_output(raw: &str) -> Result<Value, LlmError> {
    let trimmed = raw.trim();
    let inner = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|s| s.strip_suffix("```"))
        .map_or(trimmed, str::trim);

    serde_json::from_str(inner)
        .map_err(|e| LlmError::BadOutput(format!("model output is not valid JSON: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fenced_json_is_accepted() {
        let v = parse_json_output("```json\n{\"a\": 1}\n```").unwrap();
        assert_eq!(v, json!({"a": 1}));
        let v = parse_json_output("{\"a\": 1}").unwrap();
        assert_eq!(v, json!({"a": 1}));
    }

    #[test]
    fn garbage_output_is_an_error() {
        assert!(parse_json_output("not json at all").is_err());
    }
}
