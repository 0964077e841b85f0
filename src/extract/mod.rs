//! Unified data extraction from any engine output.
//!
//! One pipeline for both engine families: DOM facts first, then the
//! requested format outputs built concurrently over the shared cleaned
//! HTML. Failures wrap as `ExtractError` with the offending step and are
//! not retried.

pub mod dom;
pub mod html_filter;
pub mod markdown;
pub mod screenshot;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;
use url::Url;

use crate::artifacts::ArtifactStore;
use crate::engine::EngineOutput;
use crate::error::ExtractError;
use crate::llm::{LlmExtractor, TokenUsage};
use crate::types::{OutputFormat, ScrapeOptions};

pub use dom::DomSummary;

/// LLM accounting attached to a document when the json format ran.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmUsageSummary {
    pub tokens: TokenUsage,
    pub chunks: usize,
    pub cost: f64,
}

/// The single record produced for one page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedDocument {
    pub url: String,
    pub title: String,
    pub status: u16,
    pub metadata: BTreeMap<String, String>,
    #[serde(rename = "rawHtml", skip_serializing_if = "Option::is_none")]
    pub raw_html: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub markdown: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Artifact token for the stored screenshot.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_usage: Option<LlmUsageSummary>,
    /// Links discovered on the page (consumed by the crawl frontier).
    #[serde(skip)]
    pub discovered_links: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// Builds [`ExtractedDocument`]s from engine outputs.
pub struct Extractor {
    llm: Option<Arc<LlmExtractor>>,
    artifacts: Arc<ArtifactStore>,
}

impl Extractor {
    #[must_use]
    pub fn new(llm: Option<Arc<LlmExtractor>>, artifacts: Arc<ArtifactStore>) -> Self {
        Self { llm, artifacts }
    }

    /// Run the pipeline for one page.
    ///
    /// `job_id` keys stored artifacts. Runs even for non-2xx responses so
    /// failure payloads carry whatever the origin returned.
    pub async fn extract(
        &self,
        output: &EngineOutput,
        options: &ScrapeOptions,
        job_id: &str,
    ) -> Result<ExtractedDocument, ExtractError> {
        let raw_html = output.html().to_string();
        let summary = dom::summarize(&raw_html);

        let base = resolve_base(&output.final_url, summary.base_href.as_deref())
            .map_err(|e| ExtractError::new("base_url", e))?;

        let formats = &options.formats;
        let wants = |f: OutputFormat| formats.contains(&f);

        // Shared intermediate: cleaned HTML feeds both html and markdown.
        let needs_clean = wants(OutputFormat::Html) || wants(OutputFormat::Markdown);
        let cleaned = if needs_clean {
            Some(html_filter::clean_html(
                &raw_html,
                &options.include_tags,
                &options.exclude_tags,
                &base,
            )?)
        } else {
            None
        };

        let markdown_out = if wants(OutputFormat::Markdown) || options.wants_json_extraction() {
            Some(markdown::to_markdown(cleaned.as_deref().unwrap_or(&raw_html))?)
        } else {
            None
        };

        let text_out = if wants(OutputFormat::Text) { Some(dom::to_text(&raw_html)) } else { None };

        // The async formats (screenshot, json) run concurrently.
        let (screenshot_out, json_out) = tokio::try_join!(
            self.screenshot_task(output, options, job_id),
            self.json_task(options, markdown_out.as_deref()),
        )?;

        let (json, llm_usage) = match json_out {
            Some(outcome) => (
                Some(outcome.data),
                Some(LlmUsageSummary {
                    tokens: outcome.tokens,
                    chunks: outcome.chunks,
                    cost: outcome.cost,
                }),
            ),
            None => (None, None),
        };

        Ok(ExtractedDocument {
            url: output.final_url.clone(),
            title: summary.title,
            status: output.status,
            metadata: summary.metadata,
            raw_html: wants(OutputFormat::RawHtml).then_some(raw_html),
            html: cleaned.filter(|_| wants(OutputFormat::Html)),
            markdown: markdown_out.filter(|_| wants(OutputFormat::Markdown)),
            text: text_out,
            screenshot: screenshot_out,
            json,
            llm_usage,
            discovered_links: summary.links,
            timestamp: Utc::now(),
        })
    }

    async fn screenshot_task(
        &self,
        output: &EngineOutput,
        options: &ScrapeOptions,
        job_id: &str,
    ) -> Result<Option<String>, ExtractError> {
        let full_page = options.formats.contains(&OutputFormat::ScreenshotFullPage);
        let requested = full_page || options.formats.contains(&OutputFormat::Screenshot);
        if !requested {
            return Ok(None);
        }

        let Some(page) = output.page() else {
            warn!(url = %output.final_url, "screenshot requested on static engine, skipping");
            return Ok(None);
        };

        let bytes = screenshot::capture(page, full_page)
            .await
            .map_err(|e| ExtractError::with_source("screenshot", e))?;

        let token = self
            .artifacts
            .store(job_id, "jpeg", &bytes)
            .await
            .map_err(|e| ExtractError::with_source("screenshot_store", e))?;
        Ok(Some(token))
    }

    async fn json_task(
        &self,
        options: &ScrapeOptions,
        markdown: Option<&str>,
    ) -> Result<Option<crate::llm::ExtractionOutcome>, ExtractError> {
        let Some(json_options) = options.json_options.as_ref() else {
            return Ok(None);
        };
        if !options.formats.contains(&OutputFormat::Json) {
            return Ok(None);
        }

        let llm = self.llm.as_ref().ok_or_else(|| {
            ExtractError::new("json", "json extraction requested but no model is configured")
        })?;
        let content = markdown.unwrap_or_default();

        let outcome = llm
            .extract(content, json_options, None)
            .await
            .map_err(|e| ExtractError::new("json", format!("{e}")).with_kind(e.kind()))?;
        Ok(Some(outcome))
    }
}

fn resolve_base(final_url: &str, base_href: Option<&str>) -> Result<Url, String> {
    let page_url = Url::parse(final_url).map_err(|e| format!("invalid final URL: {e}"))?;
    match base_href {
        Some(href) => page_url.join(href).map_err(|e| format!("invalid base href: {e}")),
        None => Ok(page_url),
    }
}
