//! Search harvesting: fan SERP pages through the queues and wait for the
//! aggregation to resolve.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::queue::{EngineRequest, RequestUserData, SearchPageData};
use crate::search::build_serp_url;
use crate::types::{JobKind, OutputFormat, ScrapeOptions, SearchOptions};

use super::AppContext;
use super::api::SearchOutcome;

/// Upper bound on one search fan-out's wall clock.
const SEARCH_WAIT: Duration = Duration::from_secs(120);

pub struct SearchService {
    ctx: Arc<AppContext>,
}

impl SearchService {
    #[must_use]
    pub fn new(ctx: Arc<AppContext>) -> Self {
        Self { ctx }
    }

    pub async fn search(&self, options: SearchOptions) -> Result<SearchOutcome> {
        let pages = options.effective_pages();
        let first_url = build_serp_url(&options, 1);

        let payload = serde_json::to_string(&options)?;
        let job = self
            .ctx
            .broker
            .create_job(
                JobKind::Search,
                options.engine,
                first_url.as_str(),
                payload,
                None,
                None,
            )
            .await?;

        // Build every page request first so all unique keys are known to
        // the collector before any worker can report.
        let mut requests = Vec::with_capacity(pages as usize);
        for page in 1..=pages {
            let url = build_serp_url(&options, page);
            let mut page_options = ScrapeOptions::new(url.as_str(), options.engine);
            page_options.formats = vec![OutputFormat::RawHtml];
            let request = EngineRequest::new(
                url.as_str(),
                RequestUserData {
                    job_id: job.job_id.clone(),
                    job_uuid: job.uuid.clone(),
                    queue_name: job.job_queue_name.clone(),
                    kind: JobKind::Search,
                    depth: 0,
                    options: page_options,
                    crawl_options: None,
                    search: Some(SearchPageData { options: options.clone(), page }),
                },
            );
            requests.push(request);
        }

        let keys: Vec<String> = requests.iter().map(|r| r.unique_key.clone()).collect();
        let aggregation = self.ctx.collector.register(&keys);

        for request in &requests {
            self.ctx.queues.enqueue(JobKind::Search, options.engine, request).await?;
        }

        let mut results = aggregation.wait(SEARCH_WAIT).await;
        if let Some(limit) = options.limit {
            results.truncate(limit as usize);
        }

        let succeeded = !results.is_empty();
        self.ctx
            .broker
            .finalize_job(&job.uuid, succeeded, (!succeeded).then_some("no results harvested"))
            .await
            .ok();

        info!(job_id = %job.job_id, pages, results = results.len(), "search resolved");
        Ok(SearchOutcome { success: true, job_id: job.job_id, results })
    }
}
