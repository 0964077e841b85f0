//! Typed repository over the job store.
//!
//! Runs on `sqlx`'s Any driver so one codepath serves both sqlite and
//! postgres. Numeric columns are BIGINT and timestamps unix millis, which
//! both dialects decode identically; `$N` placeholders are valid in both.

use anyhow::{Context, Result};
use sqlx::any::{AnyPoolOptions, install_default_drivers};
use sqlx::{AnyPool, Row};
use uuid::Uuid;

use super::models::{JobResultRow, JobRow, JobStatus};
use crate::types::JobKind;

const SCHEMA_SQL: &str = r"
CREATE TABLE IF NOT EXISTS jobs (
    uuid TEXT PRIMARY KEY,
    job_id TEXT NOT NULL,
    job_type TEXT NOT NULL,
    job_queue_name TEXT NOT NULL,
    job_expire_at BIGINT NOT NULL,
    url TEXT NOT NULL,
    payload TEXT NOT NULL,
    api_key_id TEXT,
    total BIGINT NOT NULL DEFAULT 0,
    completed BIGINT NOT NULL DEFAULT 0,
    failed BIGINT NOT NULL DEFAULT 0,
    credits_used BIGINT NOT NULL DEFAULT 0,
    origin TEXT,
    status TEXT NOT NULL,
    is_success BIGINT NOT NULL DEFAULT 0,
    error_message TEXT,
    created_at BIGINT NOT NULL,
    updated_at BIGINT NOT NULL
);

CREATE TABLE IF NOT EXISTS job_results (
    uuid TEXT PRIMARY KEY,
    job_uuid TEXT NOT NULL,
    url TEXT NOT NULL,
    data TEXT NOT NULL,
    status TEXT NOT NULL,
    created_at BIGINT NOT NULL,
    updated_at BIGINT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_jobs_job_id ON jobs(job_id);
CREATE INDEX IF NOT EXISTS idx_job_results_job_uuid ON job_results(job_uuid, created_at);
";

#[derive(Clone)]
pub struct JobRepository {
    pool: AnyPool,
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

impl JobRepository {
    pub async fn connect(database_url: &str) -> Result<Self> {
        install_default_drivers();
        let pool = AnyPoolOptions::new()
            .max_connections(20)
            .connect(database_url)
            .await
            .with_context(|| format!("connecting to job store at {database_url}"))?;
        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA_SQL)
            .execute(&self.pool)
            .await
            .context("applying job store schema")?;
        Ok(())
    }

    pub async fn create_job(&self, job: &JobRow) -> Result<()> {
        sqlx::query(
            "INSERT INTO jobs (uuid, job_id, job_type, job_queue_name, job_expire_at, url, \
             payload, api_key_id, total, completed, failed, credits_used, origin, status, \
             is_success, error_message, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)",
        )
        .bind(&job.uuid)
        .bind(&job.job_id)
        .bind(job.job_type.as_str())
        .bind(&job.job_queue_name)
        .bind(job.job_expire_at)
        .bind(&job.url)
        .bind(&job.payload)
        .bind(job.api_key_id.as_deref())
        .bind(job.total)
        .bind(job.completed)
        .bind(job.failed)
        .bind(job.credits_used)
        .bind(job.origin.as_deref())
        .bind(job.status.as_str())
        .bind(i64::from(job.is_success))
        .bind(job.error_message.as_deref())
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&self.pool)
        .await
        .context("inserting job row")?;
        Ok(())
    }

    pub async fn get_job(&self, job_id: &str) -> Result<Option<JobRow>> {
        let row = sqlx::query("SELECT * FROM jobs WHERE job_id = $1")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await
            .context("selecting job row")?;
        row.map(|r| job_from_row(&r)).transpose()
    }

    /// Arithmetic counter update, safe under concurrent writers.
    pub async fn update_counters(
        &self,
        uuid: &str,
        total_delta: i64,
        completed_delta: i64,
        failed_delta: i64,
        credits_delta: i64,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE jobs SET total = total + $1, completed = completed + $2, \
             failed = failed + $3, credits_used = credits_used + $4, updated_at = $5 \
             WHERE uuid = $6",
        )
        .bind(total_delta)
        .bind(completed_delta)
        .bind(failed_delta)
        .bind(credits_delta)
        .bind(now_millis())
        .bind(uuid)
        .execute(&self.pool)
        .await
        .context("updating job counters")?;
        Ok(())
    }

    /// Set-once terminal transition: writes only when the job is still
    /// pending. Returns whether this call made the transition.
    pub async fn mark_terminal(
        &self,
        uuid: &str,
        status: JobStatus,
        is_success: bool,
        error_message: Option<&str>,
    ) -> Result<bool> {
        debug_assert!(status.is_terminal());
        let result = sqlx::query(
            "UPDATE jobs SET status = $1, is_success = $2, error_message = $3, updated_at = $4 \
             WHERE uuid = $5 AND status = 'pending'",
        )
        .bind(status.as_str())
        .bind(i64::from(is_success))
        .bind(error_message)
        .bind(now_millis())
        .bind(uuid)
        .execute(&self.pool)
        .await
        .context("marking job terminal")?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn insert_result(&self, result: &JobResultRow) -> Result<()> {
        sqlx::query(
            "INSERT INTO job_results (uuid, job_uuid, url, data, status, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(&result.uuid)
        .bind(&result.job_uuid)
        .bind(&result.url)
        .bind(&result.data)
        .bind(&result.status)
        .bind(result.created_at)
        .bind(result.updated_at)
        .execute(&self.pool)
        .await
        .context("inserting job result")?;
        Ok(())
    }

    /// Page of results in insertion order (created_at, uuid as tie-break).
    pub async fn list_results(
        &self,
        job_uuid: &str,
        skip: i64,
        limit: i64,
    ) -> Result<Vec<JobResultRow>> {
        let rows = sqlx::query(
            "SELECT * FROM job_results WHERE job_uuid = $1 \
             ORDER BY created_at ASC, uuid ASC LIMIT $2 OFFSET $3",
        )
        .bind(job_uuid)
        .bind(limit)
        .bind(skip)
        .fetch_all(&self.pool)
        .await
        .context("listing job results")?;

        rows.iter().map(result_from_row).collect()
    }

    pub async fn count_results(&self, job_uuid: &str) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM job_results WHERE job_uuid = $1")
            .bind(job_uuid)
            .fetch_one(&self.pool)
            .await
            .context("counting job results")?;
        let n: i64 = row.try_get("n").context("decoding result count")?;
        Ok(n)
    }

    /// Delete jobs (and their results) whose TTL expired.
    pub async fn evict_expired(&self) -> Result<u64> {
        let now = now_millis();
        sqlx::query(
            "DELETE FROM job_results WHERE job_uuid IN \
             (SELECT uuid FROM jobs WHERE job_expire_at < $1)",
        )
        .bind(now)
        .execute(&self.pool)
        .await
        .context("evicting expired job results")?;

        let result = sqlx::query("DELETE FROM jobs WHERE job_expire_at < $1")
            .bind(now)
            .execute(&self.pool)
            .await
            .context("evicting expired jobs")?;
        Ok(result.rows_affected())
    }
}

fn job_from_row(row: &sqlx::any::AnyRow) -> Result<JobRow> {
    let job_type_raw: String = row.try_get("job_type")?;
    let status_raw: String = row.try_get("status")?;
    let job_type: JobKind = serde_json::from_value(serde_json::Value::String(job_type_raw.clone()))
        .with_context(|| format!("unknown job_type {job_type_raw}"))?;
    let status = JobStatus::parse(&status_raw)
        .with_context(|| format!("unknown status {status_raw}"))?;

    Ok(JobRow {
        uuid: row.try_get("uuid")?,
        job_id: row.try_get("job_id")?,
        job_type,
        job_queue_name: row.try_get("job_queue_name")?,
        job_expire_at: row.try_get("job_expire_at")?,
        url: row.try_get("url")?,
        payload: row.try_get("payload")?,
        api_key_id: row.try_get("api_key_id")?,
        total: row.try_get("total")?,
        completed: row.try_get("completed")?,
        failed: row.try_get("failed")?,
        credits_used: row.try_get("credits_used")?,
        origin: row.try_get("origin")?,
        status,
        is_success: row.try_get::<i64, _>("is_success")? != 0,
        error_message: row.try_get("error_message")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn result_from_row(row: &sqlx::any::AnyRow) -> Result<JobResultRow> {
    Ok(JobResultRow {
        uuid: row.try_get("uuid")?,
        job_uuid: row.try_get("job_uuid")?,
        url: row.try_get("url")?,
        data: row.try_get("data")?,
        status: row.try_get("status")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Fresh row for a newly submitted job.
#[must_use]
pub fn new_job_row(
    kind: JobKind,
    queue_name: &str,
    url: &str,
    payload: String,
    api_key_id: Option<String>,
    origin: Option<String>,
) -> JobRow {
    let now = now_millis();
    let uuid = Uuid::new_v4().to_string();
    JobRow {
        job_id: uuid.clone(),
        uuid,
        job_type: kind,
        job_queue_name: queue_name.to_string(),
        job_expire_at: now + kind.expiry().num_milliseconds(),
        url: url.to_string(),
        payload,
        api_key_id,
        total: 0,
        completed: 0,
        failed: 0,
        credits_used: 0,
        origin,
        status: JobStatus::Pending,
        is_success: false,
        error_message: None,
        created_at: now,
        updated_at: now,
    }
}
