//! The scheduler's unit of work.

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::types::{CrawlOptions, JobKind, ScrapeOptions, SearchOptions};

/// Search-specific request data: which SERP page this message fetches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchPageData {
    pub options: SearchOptions,
    /// 1-based page number.
    pub page: u32,
}

/// Context a queue message carries back to the processor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestUserData {
    pub job_id: String,
    pub job_uuid: String,
    pub queue_name: String,
    pub kind: JobKind,
    /// Crawl depth of this URL (seed = 0).
    #[serde(default)]
    pub depth: u32,
    /// Per-page scrape options (template for crawl pages).
    pub options: ScrapeOptions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crawl_options: Option<CrawlOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<SearchPageData>,
}

/// One queued engine request. Lifecycle: enqueued → processing → handled
/// (acked on success, requeued with backoff, or dead-lettered).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineRequest {
    pub url: String,
    /// Random identity for in-memory correlation (search aggregation).
    pub unique_key: String,
    /// Delivery attempt, 1-based.
    #[serde(default = "default_attempt")]
    pub attempt: u32,
    pub user_data: RequestUserData,
}

fn default_attempt() -> u32 {
    1
}

impl EngineRequest {
    #[must_use]
    pub fn new(url: impl Into<String>, user_data: RequestUserData) -> Self {
        let mut key_bytes = [0u8; 8];
        rand::rng().fill_bytes(&mut key_bytes);
        Self {
            url: url.into(),
            unique_key: hex::encode(key_bytes),
            attempt: 1,
            user_data,
        }
    }

    /// Copy for redelivery with the attempt counter bumped.
    #[must_use]
    pub fn with_retry(&self) -> Self {
        Self { attempt: self.attempt + 1, ..self.clone() }
    }

    /// Queue-level attempts allowed for this request.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.user_data.options.max_attempts()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Engine;

    fn request() -> EngineRequest {
        EngineRequest::new(
            "https://example.com",
            RequestUserData {
                job_id: "j".into(),
                job_uuid: "u".into(),
                queue_name: "queue:scrape:static".into(),
                kind: JobKind::Scrape,
                depth: 0,
                options: ScrapeOptions::new("https://example.com", Engine::Static),
                crawl_options: None,
                search: None,
            },
        )
    }

    #[test]
    fn unique_keys_differ() {
        assert_ne!(request().unique_key, request().unique_key);
    }

    #[test]
    fn retry_bumps_attempt_only() {
        let r = request();
        let retried = r.with_retry();
        assert_eq!(retried.attempt, 2);
        assert_eq!(retried.unique_key, r.unique_key);
        assert_eq!(retried.url, r.url);
    }

    #[test]
    fn serde_roundtrip() {
        let r = request();
        let json = serde_json::to_string(&r).unwrap();
        let back: EngineRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(back.url, r.url);
        assert_eq!(back.user_data.kind, JobKind::Scrape);
    }
}
