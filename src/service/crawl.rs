//! Crawl job lifecycle: create, status, paginated results, cancel.

use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn};
use url::Url;

use crate::broker::CancelOutcome;
use crate::frontier::ScopeFilter;
use crate::queue::{EngineRequest, RequestUserData};
use crate::types::{CrawlOptions, JobKind};

use super::AppContext;
use super::api::{CrawlCreated, CrawlResults, CrawlStatus};

pub struct CrawlService {
    ctx: Arc<AppContext>,
}

impl CrawlService {
    #[must_use]
    pub fn new(ctx: Arc<AppContext>) -> Self {
        Self { ctx }
    }

    /// Create the crawl job, admit the seed and kick off sitemap seeding.
    pub async fn create(&self, mut options: CrawlOptions) -> Result<CrawlCreated> {
        options
            .scrape
            .validate()
            .map_err(|message| anyhow::anyhow!("{}: {message}", crate::error::kind::VALIDATION_ERROR))?;
        options.clamp();
        let seed = Url::parse(&options.scrape.url)?;

        let payload = serde_json::to_string(&options)?;
        let job = self
            .ctx
            .broker
            .create_job(
                JobKind::Crawl,
                options.scrape.engine,
                seed.as_str(),
                payload,
                None,
                None,
            )
            .await?;

        self.ctx.frontier.admit_seed(&job.job_id, &seed).await?;

        let request = EngineRequest::new(
            seed.as_str(),
            RequestUserData {
                job_id: job.job_id.clone(),
                job_uuid: job.uuid.clone(),
                queue_name: job.job_queue_name.clone(),
                kind: JobKind::Crawl,
                depth: 0,
                options: options.scrape.clone(),
                crawl_options: Some(options.clone()),
                search: None,
            },
        );
        self.ctx
            .queues
            .enqueue(JobKind::Crawl, options.scrape.engine, &request)
            .await?;

        if !options.ignore_sitemap {
            self.spawn_sitemap_seeding(&job.job_id, &job.uuid, &job.job_queue_name, seed, options);
        }

        info!(job_id = %job.job_id, "crawl created");
        Ok(CrawlCreated {
            job_id: job.job_id,
            status: "created".to_string(),
            message: "crawl job created".to_string(),
        })
    }

    /// Sitemap URLs are an accelerator: admitted at depth 1 through the
    /// normal gate, in the background, best-effort.
    fn spawn_sitemap_seeding(
        &self,
        job_id: &str,
        job_uuid: &str,
        queue_name: &str,
        seed: Url,
        options: CrawlOptions,
    ) {
        let ctx = Arc::clone(&self.ctx);
        let job_id = job_id.to_string();
        let job_uuid = job_uuid.to_string();
        let queue_name = queue_name.to_string();
        let user_agent = ctx
            .settings
            .user_agent
            .clone()
            .unwrap_or_else(|| crate::engine::launcher::DEFAULT_USER_AGENT.to_string());

        tokio::spawn(async move {
            let urls = crate::frontier::sitemap::fetch_sitemap_urls(&seed, &user_agent).await;
            if urls.is_empty() {
                return;
            }

            let Ok(filter) = ScopeFilter::new(&seed, &options) else { return };
            let outcome = match ctx
                .frontier
                .admit_urls(&job_id, &urls, 1, &options, &filter)
                .await
            {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(job_id, "sitemap admission failed: {e:#}");
                    return;
                }
            };

            for admission in outcome.admitted {
                let mut page_options = options.scrape.clone();
                page_options.url = admission.url.to_string();
                let request = EngineRequest::new(
                    admission.url.as_str(),
                    RequestUserData {
                        job_id: job_id.clone(),
                        job_uuid: job_uuid.clone(),
                        queue_name: queue_name.clone(),
                        kind: JobKind::Crawl,
                        depth: admission.depth,
                        options: page_options,
                        crawl_options: Some(options.clone()),
                        search: None,
                    },
                );
                if let Err(e) = ctx
                    .queues
                    .enqueue(JobKind::Crawl, options.scrape.engine, &request)
                    .await
                {
                    warn!(job_id, "sitemap enqueue failed: {e:#}");
                }
            }
        });
    }

    pub async fn status(&self, job_id: &str) -> Result<Option<CrawlStatus>> {
        let Some(job) = self.ctx.broker.get_job(job_id).await? else {
            return Ok(None);
        };
        Ok(Some(CrawlStatus {
            job_id: job.job_id,
            status: job.status,
            start_time: job.created_at,
            expires_at: job.job_expire_at,
            credits_used: job.credits_used,
            total: job.total,
            completed: job.completed,
            failed: job.failed,
        }))
    }

    /// Paginated results; `next` follows the `skip + returned` contract.
    pub async fn results(&self, job_id: &str, skip: i64) -> Result<Option<CrawlResults>> {
        let Some(job) = self.ctx.broker.get_job(job_id).await? else {
            return Ok(None);
        };
        let Some(page) = self.ctx.broker.results(job_id, skip).await? else {
            return Ok(None);
        };

        let data = page
            .results
            .iter()
            .map(|row| {
                serde_json::from_str(&row.data)
                    .unwrap_or_else(|_| serde_json::Value::String(row.data.clone()))
            })
            .collect();

        Ok(Some(CrawlResults {
            success: true,
            status: job.status,
            total: job.total,
            completed: job.completed,
            credits_used: job.credits_used,
            next: page.next_skip,
            data,
        }))
    }

    /// Cancel; terminal jobs return `Conflict` (409 at the API layer).
    pub async fn cancel(&self, job_id: &str) -> Result<CancelOutcome> {
        self.ctx.broker.cancel(job_id).await
    }
}
