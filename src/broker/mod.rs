//! Job broker: maps user job ids to queued work and persisted results.

pub mod models;
pub mod repository;

use anyhow::{Context, Result};
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tracing::{debug, info};
use uuid::Uuid;

use crate::types::{Engine, JobKind};

pub use models::{JobResultRow, JobRow, JobStatus};
pub use repository::JobRepository;

/// Hard cap on one results page.
pub const MAX_PAGE_SIZE: i64 = 100;

/// One page of crawl/search results plus the cursor for the next one.
#[derive(Debug, Clone)]
pub struct ResultsPage {
    pub results: Vec<JobResultRow>,
    pub total: i64,
    /// `skip` for the next page; None when this page exhausts the set.
    pub next_skip: Option<i64>,
}

/// Outcome of a cancel request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    Cancelled,
    /// The job was already terminal; cancelling is a conflict.
    Conflict,
    NotFound,
}

#[derive(Clone)]
pub struct JobBroker {
    repo: JobRepository,
    redis: ConnectionManager,
}

impl JobBroker {
    #[must_use]
    pub fn new(repo: JobRepository, redis: ConnectionManager) -> Self {
        Self { repo, redis }
    }

    #[must_use]
    pub fn repository(&self) -> &JobRepository {
        &self.repo
    }

    /// Queue name for a (kind, engine) pair; one durable queue each.
    #[must_use]
    pub fn queue_name(kind: JobKind, engine: Engine) -> String {
        format!("queue:{kind}:{engine}")
    }

    /// Allocate and persist a new job row.
    pub async fn create_job(
        &self,
        kind: JobKind,
        engine: Engine,
        url: &str,
        payload: String,
        api_key_id: Option<String>,
        origin: Option<String>,
    ) -> Result<JobRow> {
        let queue = Self::queue_name(kind, engine);
        let row = repository::new_job_row(kind, &queue, url, payload, api_key_id, origin);
        self.repo.create_job(&row).await?;
        info!(job_id = %row.job_id, kind = %kind, engine = %engine, "job created");
        Ok(row)
    }

    pub async fn get_job(&self, job_id: &str) -> Result<Option<JobRow>> {
        self.repo.get_job(job_id).await
    }

    /// Record one page's outcome: append the result row and bump counters
    /// arithmetically.
    pub async fn record_page(
        &self,
        job_uuid: &str,
        url: &str,
        data: String,
        success: bool,
        credits: i64,
    ) -> Result<()> {
        let now = chrono::Utc::now().timestamp_millis();
        self.repo
            .insert_result(&JobResultRow {
                uuid: Uuid::new_v4().to_string(),
                job_uuid: job_uuid.to_string(),
                url: url.to_string(),
                data,
                status: if success { "success" } else { "failed" }.to_string(),
                created_at: now,
                updated_at: now,
            })
            .await?;

        let (completed, failed) = if success { (1, 0) } else { (0, 1) };
        self.repo
            .update_counters(job_uuid, 1, completed, failed, credits)
            .await
    }

    /// Idempotent terminal write used by the finalization winner.
    pub async fn finalize_job(
        &self,
        job_uuid: &str,
        succeeded: bool,
        error_message: Option<&str>,
    ) -> Result<bool> {
        let status = if succeeded { JobStatus::Completed } else { JobStatus::Failed };
        self.repo
            .mark_terminal(job_uuid, status, succeeded, error_message)
            .await
    }

    /// Cancel a job: terminal jobs conflict; otherwise mark cancelled and
    /// broadcast the cancel flag so in-flight workers stop admitting work.
    pub async fn cancel(&self, job_id: &str) -> Result<CancelOutcome> {
        let Some(job) = self.repo.get_job(job_id).await? else {
            return Ok(CancelOutcome::NotFound);
        };
        if job.status.is_terminal() {
            return Ok(CancelOutcome::Conflict);
        }

        let transitioned = self
            .repo
            .mark_terminal(&job.uuid, JobStatus::Cancelled, false, Some("cancelled by user"))
            .await?;
        if !transitioned {
            return Ok(CancelOutcome::Conflict);
        }

        self.set_cancel_flag(job_id).await?;
        info!(job_id, "job cancelled");
        Ok(CancelOutcome::Cancelled)
    }

    fn cancel_key(job_id: &str) -> String {
        format!("cancel:{job_id}")
    }

    pub async fn set_cancel_flag(&self, job_id: &str) -> Result<()> {
        let mut conn = self.redis.clone();
        let _: () = conn
            .set_ex(Self::cancel_key(job_id), 1, 6 * 3600)
            .await
            .context("setting cancel flag")?;
        Ok(())
    }

    /// Checked at extraction entry and every discovery admission.
    pub async fn is_cancelled(&self, job_id: &str) -> Result<bool> {
        let mut conn = self.redis.clone();
        let exists: bool = conn
            .exists(Self::cancel_key(job_id))
            .await
            .context("checking cancel flag")?;
        Ok(exists)
    }

    /// Paginated result retrieval: stable insertion order, page ≤ 100,
    /// `next = skip + returned` iff more rows remain.
    pub async fn results(&self, job_id: &str, skip: i64) -> Result<Option<ResultsPage>> {
        let Some(job) = self.repo.get_job(job_id).await? else {
            return Ok(None);
        };

        let skip = skip.max(0);
        let total = self.repo.count_results(&job.uuid).await?;
        let results = self.repo.list_results(&job.uuid, skip, MAX_PAGE_SIZE).await?;

        let returned = results.len() as i64;
        let next_skip = (skip + returned < total).then_some(skip + returned);
        debug!(job_id, skip, returned, total, "served results page");

        Ok(Some(ResultsPage { results, total, next_skip }))
    }

    /// Periodic TTL sweep.
    pub async fn evict_expired(&self) -> Result<u64> {
        self.repo.evict_expired().await
    }
}
