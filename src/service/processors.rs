//! Queue processors: what a worker does with one delivered request.
//!
//! Workers delegate fetching to the engine dispatcher and extraction to
//! the extractor; these processors own the bookkeeping around them
//! (results, counters, discovery, finalization, waiter delivery).

use anyhow::anyhow;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{EngineError, kind};
use crate::extract::ExtractedDocument;
use crate::frontier::{DiscoveryStop, ScopeFilter};
use crate::queue::{EngineRequest, ProcessError, RequestProcessor, RequestUserData};
use crate::types::{CrawlOptions, JobKind, ScrapeOptions};

use super::AppContext;
use super::api::ScrapeOutcome;

/// Credits charged per page, plus the surcharge when LLM extraction ran.
const CREDITS_PER_PAGE: i64 = 1;
const CREDITS_JSON_SURCHARGE: i64 = 5;

fn credits_for(doc: &ExtractedDocument) -> i64 {
    CREDITS_PER_PAGE + if doc.json.is_some() { CREDITS_JSON_SURCHARGE } else { 0 }
}

/// Fetch + extract one page. Returns the document, whether the page counts
/// as a success, and the HTTP status; engine resources are released here.
async fn fetch_and_extract(
    ctx: &AppContext,
    options: &ScrapeOptions,
    job_id: &str,
) -> Result<(Result<ExtractedDocument, crate::error::ExtractError>, bool, u16), EngineError> {
    let output = ctx.dispatcher.run(options).await?;
    let http_ok = output.is_success_status();
    let status = output.status;

    // Non-2xx still gets one best-effort extraction so the failure payload
    // carries what the origin returned.
    let doc = ctx.extractor.extract(&output, options, job_id).await;

    let success = http_ok && doc.is_ok();
    ctx.dispatcher.finish(output, success).await;
    Ok((doc, http_ok, status))
}

// =============================================================================
// Scrape
// =============================================================================

pub struct ScrapeProcessor {
    ctx: Arc<AppContext>,
}

impl ScrapeProcessor {
    #[must_use]
    pub fn new(ctx: Arc<AppContext>) -> Self {
        Self { ctx }
    }

    fn deliver(&self, job_id: &str, outcome: ScrapeOutcome) {
        if let Some((_, waiter)) = self.ctx.scrape_waiters.remove(job_id) {
            let _ = waiter.send(outcome);
        } else {
            debug!(job_id, "no scrape waiter registered (timed out?)");
        }
    }

    async fn settle(&self, ud: &RequestUserData, outcome: ScrapeOutcome, credits: i64) {
        let success = outcome.success;
        if let Err(e) = self
            .ctx
            .broker
            .repository()
            .update_counters(&ud.job_uuid, 1, i64::from(success), i64::from(!success), credits)
            .await
        {
            warn!(job_id = %ud.job_id, "counter update failed: {e:#}");
        }
        if let Err(e) = self
            .ctx
            .broker
            .finalize_job(&ud.job_uuid, success, outcome.message.as_deref())
            .await
        {
            warn!(job_id = %ud.job_id, "terminal write failed: {e:#}");
        }
        self.deliver(&ud.job_id, outcome);
    }
}

#[async_trait]
impl RequestProcessor for ScrapeProcessor {
    fn name(&self) -> &'static str {
        "scrape"
    }

    async fn process(&self, request: &EngineRequest) -> Result<(), ProcessError> {
        let ud = &request.user_data;

        match fetch_and_extract(&self.ctx, &ud.options, &ud.job_id).await {
            Err(e) => {
                if e.is_retryable() && request.attempt < request.max_attempts() {
                    return Err(ProcessError::Retryable(anyhow!("{e}")));
                }
                let outcome = ScrapeOutcome::failed(
                    ud.job_id.clone(),
                    e.kind(),
                    e.to_string(),
                    None,
                );
                self.settle(ud, outcome, 0).await;
                Ok(())
            }
            Ok((Err(extract_err), _, _)) => {
                let outcome = ScrapeOutcome::failed(
                    ud.job_id.clone(),
                    extract_err.kind,
                    extract_err.to_string(),
                    None,
                );
                self.settle(ud, outcome, 0).await;
                Ok(())
            }
            Ok((Ok(doc), http_ok, status)) => {
                if http_ok {
                    let credits = credits_for(&doc);
                    let outcome = ScrapeOutcome::ok(ud.job_id.clone(), doc);
                    self.settle(ud, outcome, credits).await;
                } else {
                    let message = format!("request blocked: HTTP {status}");
                    let outcome = ScrapeOutcome::failed(
                        ud.job_id.clone(),
                        kind::HTTP_ERROR,
                        message,
                        Some(doc),
                    );
                    self.settle(ud, outcome, 0).await;
                }
                Ok(())
            }
        }
    }
}

// =============================================================================
// Crawl
// =============================================================================

pub struct CrawlProcessor {
    ctx: Arc<AppContext>,
}

impl CrawlProcessor {
    #[must_use]
    pub fn new(ctx: Arc<AppContext>) -> Self {
        Self { ctx }
    }

    /// Record the page row + counters, bump done, and race finalization.
    async fn complete_page(
        &self,
        ud: &RequestUserData,
        crawl: &CrawlOptions,
        url: &str,
        data: String,
        success: bool,
        credits: i64,
    ) -> Result<(), ProcessError> {
        self.ctx
            .broker
            .record_page(&ud.job_uuid, url, data, success, credits)
            .await
            .map_err(ProcessError::Fatal)?;

        self.ctx
            .progress
            .record_done(&ud.job_id, success)
            .await
            .map_err(ProcessError::Fatal)?;

        let finalized = self
            .ctx
            .progress
            .try_finalize(&ud.job_id, crawl.limit)
            .await
            .map_err(ProcessError::Fatal)?;

        if let Some(state) = finalized {
            let succeeded = state.succeeded > 0;
            info!(
                job_id = %ud.job_id,
                enqueued = state.enqueued,
                done = state.done,
                succeeded = state.succeeded,
                failed = state.failed,
                "crawl finalized"
            );
            self.ctx
                .broker
                .finalize_job(&ud.job_uuid, succeeded, None)
                .await
                .map_err(ProcessError::Fatal)?;

            let ttl = JobKind::Crawl.expiry().num_seconds();
            self.ctx.progress.expire(&ud.job_id, ttl).await.ok();
            self.ctx.frontier.expire(&ud.job_id, ttl).await.ok();
        }

        Ok(())
    }

    /// Discovery for one fetched page; admitted children are enqueued.
    async fn discover_links(
        &self,
        request: &EngineRequest,
        crawl: &CrawlOptions,
        doc: &ExtractedDocument,
    ) {
        let ud = &request.user_data;
        let Ok(page_url) = Url::parse(&doc.url) else { return };
        let Ok(seed) = Url::parse(&crawl.scrape.url) else { return };
        let Ok(filter) = ScopeFilter::new(&seed, crawl) else { return };

        let outcome = match self
            .ctx
            .frontier
            .discover(&ud.job_id, &page_url, ud.depth, &doc.discovered_links, crawl, &filter)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(job_id = %ud.job_id, "discovery failed: {e:#}");
                return;
            }
        };

        for admission in &outcome.admitted {
            let mut page_options = crawl.scrape.clone();
            page_options.url = admission.url.to_string();
            let child = EngineRequest::new(
                admission.url.as_str(),
                RequestUserData {
                    job_id: ud.job_id.clone(),
                    job_uuid: ud.job_uuid.clone(),
                    queue_name: ud.queue_name.clone(),
                    kind: JobKind::Crawl,
                    depth: admission.depth,
                    options: page_options,
                    crawl_options: Some(crawl.clone()),
                    search: None,
                },
            );
            if let Err(e) = self
                .ctx
                .queues
                .enqueue(JobKind::Crawl, crawl.scrape.engine, &child)
                .await
            {
                warn!(job_id = %ud.job_id, url = %admission.url, "enqueue failed: {e:#}");
            }
        }

        if outcome.stopped == Some(DiscoveryStop::LimitReached) {
            // Signalling condition, not a failure: the page itself still
            // completes normally, only further discovery stops.
            debug!(job_id = %ud.job_id, signal = kind::CRAWL_LIMIT_REACHED, "discovery aborted");
        }
    }
}

#[async_trait]
impl RequestProcessor for CrawlProcessor {
    fn name(&self) -> &'static str {
        "crawl"
    }

    async fn process(&self, request: &EngineRequest) -> Result<(), ProcessError> {
        let ud = &request.user_data;
        let crawl = ud
            .crawl_options
            .clone()
            .ok_or_else(|| ProcessError::Fatal(anyhow!("crawl request without crawl options")))?;

        // Cancel gate before any engine or extraction work.
        if self.ctx.broker.is_cancelled(&ud.job_id).await.unwrap_or(false) {
            return Err(ProcessError::Aborted("job cancelled"));
        }

        let mut page_options = crawl.scrape.clone();
        page_options.url = request.url.clone();

        match fetch_and_extract(&self.ctx, &page_options, &ud.job_id).await {
            Err(e) => {
                if e.is_retryable() && request.attempt < request.max_attempts() {
                    return Err(ProcessError::Retryable(anyhow!("{e}")));
                }
                let data = json!({
                    "url": request.url,
                    "error": e.kind(),
                    "message": e.to_string(),
                })
                .to_string();
                self.complete_page(ud, &crawl, &request.url, data, false, 0).await
            }
            Ok((Err(extract_err), _, _)) => {
                let data = json!({
                    "url": request.url,
                    "error": extract_err.kind,
                    "message": extract_err.to_string(),
                })
                .to_string();
                self.complete_page(ud, &crawl, &request.url, data, false, 0).await
            }
            Ok((Ok(doc), http_ok, status)) => {
                // Discovery runs before the page is counted so a racing
                // finalizer can't close the job while children are pending.
                let cancelled =
                    self.ctx.broker.is_cancelled(&ud.job_id).await.unwrap_or(false);
                if http_ok && !cancelled {
                    self.discover_links(request, &crawl, &doc).await;
                }

                let credits = if http_ok { credits_for(&doc) } else { 0 };
                let data = serde_json::to_string(&doc)
                    .map_err(|e| ProcessError::Fatal(anyhow!("serializing document: {e}")))?;

                // Non-2xx pages count as failed even with extracted content.
                let success = http_ok;
                if !success {
                    debug!(url = %request.url, status, "page failed with extractable content");
                }
                self.complete_page(ud, &crawl, &doc.url, data, success, credits)
                    .await?;

                if crawl.delay_ms > 0 {
                    tokio::time::sleep(std::time::Duration::from_millis(crawl.delay_ms)).await;
                }
                Ok(())
            }
        }
    }
}

// =============================================================================
// Search
// =============================================================================

pub struct SearchProcessor {
    ctx: Arc<AppContext>,
}

impl SearchProcessor {
    #[must_use]
    pub fn new(ctx: Arc<AppContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl RequestProcessor for SearchProcessor {
    fn name(&self) -> &'static str {
        "search"
    }

    /// SERP pages never retry through the queue: a failed page reports an
    /// empty result list so the fan-out always resolves.
    async fn process(&self, request: &EngineRequest) -> Result<(), ProcessError> {
        let ud = &request.user_data;
        let search = ud
            .search
            .as_ref()
            .ok_or_else(|| ProcessError::Fatal(anyhow!("search request without page data")))?;
        let page = search.page;

        let (results, success, error) = match self.ctx.dispatcher.run(&ud.options).await {
            Ok(output) => {
                let html = output.html().to_string();
                let ok = output.is_success_status();
                self.ctx.dispatcher.finish(output, ok).await;
                if ok {
                    (
                        crate::search::parse_results(search.options.provider, &html, page),
                        true,
                        None,
                    )
                } else {
                    (Vec::new(), false, Some(kind::HTTP_ERROR.to_string()))
                }
            }
            Err(e) => {
                warn!(url = %request.url, page, "SERP fetch failed: {e}");
                (Vec::new(), false, Some(e.kind().to_string()))
            }
        };

        let data = json!({
            "page": page,
            "query": search.options.query,
            "results": results,
            "error": error,
        })
        .to_string();
        if let Err(e) = self
            .ctx
            .broker
            .record_page(&ud.job_uuid, &request.url, data, success, i64::from(success))
            .await
        {
            warn!(job_id = %ud.job_id, "recording search page failed: {e:#}");
        }

        self.ctx.collector.report(&request.unique_key, page, results);
        Ok(())
    }
}
