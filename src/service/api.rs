//! Response shapes the thin HTTP layer serializes verbatim.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::broker::JobStatus;
use crate::extract::ExtractedDocument;
use crate::types::SearchResult;

/// Outcome of a synchronous scrape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeOutcome {
    pub success: bool,
    #[serde(rename = "jobId")]
    pub job_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<ExtractedDocument>,
    /// Stable error kind when failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ScrapeOutcome {
    #[must_use]
    pub fn ok(job_id: String, data: ExtractedDocument) -> Self {
        Self { success: true, job_id, data: Some(data), error: None, message: None }
    }

    #[must_use]
    pub fn failed(
        job_id: String,
        kind: &str,
        message: String,
        data: Option<ExtractedDocument>,
    ) -> Self {
        Self {
            success: false,
            job_id,
            data,
            error: Some(kind.to_string()),
            message: Some(message),
        }
    }
}

/// `POST /v1/crawl` response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlCreated {
    pub job_id: String,
    /// Always `created`.
    pub status: String,
    pub message: String,
}

/// `GET /v1/crawl/{jobId}/status` response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlStatus {
    pub job_id: String,
    pub status: JobStatus,
    /// Unix millis.
    pub start_time: i64,
    pub expires_at: i64,
    pub credits_used: i64,
    pub total: i64,
    pub completed: i64,
    pub failed: i64,
}

/// `GET /v1/crawl/{jobId}?skip=N` response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlResults {
    pub success: bool,
    pub status: JobStatus,
    pub total: i64,
    pub completed: i64,
    #[serde(rename = "creditsUsed")]
    pub credits_used: i64,
    /// `skip` value for the next page, when one exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<i64>,
    pub data: Vec<Value>,
}

/// `POST /v1/search` response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchOutcome {
    pub success: bool,
    pub job_id: String,
    pub results: Vec<SearchResult>,
}
