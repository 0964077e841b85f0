//! Synchronous scrape entry point.
//!
//! The request is still queued (admission control applies to everything);
//! the caller waits on an in-process oneshot that the worker resolves.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::debug;

use crate::error::kind;
use crate::queue::{EngineRequest, RequestUserData};
use crate::types::{JobKind, ScrapeOptions};

use super::AppContext;
use super::api::ScrapeOutcome;

/// Extra wall-clock allowance on top of the per-attempt timeouts (queue
/// wait, backoff between attempts, extraction).
const WAIT_MARGIN: Duration = Duration::from_secs(30);

pub struct ScrapeService {
    ctx: Arc<AppContext>,
}

impl ScrapeService {
    #[must_use]
    pub fn new(ctx: Arc<AppContext>) -> Self {
        Self { ctx }
    }

    /// Validate, enqueue, and wait for the inline result.
    pub async fn scrape(&self, options: ScrapeOptions) -> Result<ScrapeOutcome> {
        if let Err(message) = options.validate() {
            return Ok(ScrapeOutcome::failed(
                String::new(),
                kind::VALIDATION_ERROR,
                message,
                None,
            ));
        }

        let payload = serde_json::to_string(&options)?;
        let job = self
            .ctx
            .broker
            .create_job(JobKind::Scrape, options.engine, &options.url, payload, None, None)
            .await?;

        let (tx, rx) = oneshot::channel();
        self.ctx.scrape_waiters.insert(job.job_id.clone(), tx);

        let request = EngineRequest::new(
            options.url.clone(),
            RequestUserData {
                job_id: job.job_id.clone(),
                job_uuid: job.uuid.clone(),
                queue_name: job.job_queue_name.clone(),
                kind: JobKind::Scrape,
                depth: 0,
                options: options.clone(),
                crawl_options: None,
                search: None,
            },
        );
        self.ctx.queues.enqueue(JobKind::Scrape, options.engine, &request).await?;

        let per_attempt = Duration::from_millis(options.effective_timeout_ms());
        let wait = per_attempt * options.max_attempts() + WAIT_MARGIN;
        debug!(job_id = %job.job_id, ?wait, "waiting for scrape result");

        match tokio::time::timeout(wait, rx).await {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(_)) | Err(_) => {
                self.ctx.scrape_waiters.remove(&job.job_id);
                self.ctx
                    .broker
                    .finalize_job(&job.uuid, false, Some("worker did not respond in time"))
                    .await
                    .ok();
                Ok(ScrapeOutcome::failed(
                    job.job_id,
                    kind::INTERNAL_ERROR,
                    "worker did not respond in time".to_string(),
                    None,
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::types::{Engine, OutputFormat, ScrapeOptions};

    #[test]
    fn validation_rejects_bad_requests() {
        let mut opts = ScrapeOptions::new("not a url", Engine::Static);
        assert!(opts.validate().is_err());

        opts.url = "ftp://example.com".into();
        assert!(opts.validate().is_err());

        opts.url = "https://example.com".into();
        assert!(opts.validate().is_ok());

        opts.formats = vec![OutputFormat::Screenshot];
        assert!(opts.validate().is_err());

        opts.engine = Engine::Browser;
        assert!(opts.validate().is_ok());
    }
}
