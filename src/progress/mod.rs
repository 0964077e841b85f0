//! Redis-backed crawl progress counters and atomic finalization.
//!
//! State lives in the `crawl:{job_id}` hash. Counters move via HINCRBY;
//! the finalization predicate runs as a server-side script so exactly one
//! finalizer wins no matter how many workers race on the last page.

use anyhow::{Context, Result};
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// finalize_if: finalized == 0
///              AND ((target > 0 AND done >= target)
///                   OR (enqueued > 0 AND done >= enqueued))
/// set:         finalized = 1, finished_at = now
const FINALIZE_SCRIPT: &str = r"
local enqueued = tonumber(redis.call('HGET', KEYS[1], 'enqueued') or '0')
local done = tonumber(redis.call('HGET', KEYS[1], 'done') or '0')
local finalized = tonumber(redis.call('HGET', KEYS[1], 'finalized') or '0')
local target = tonumber(ARGV[1])
if finalized == 0 and ((target > 0 and done >= target) or (enqueued > 0 and done >= enqueued)) then
  redis.call('HSET', KEYS[1], 'finalized', 1, 'finished_at', ARGV[2])
  return 1
end
return 0
";

/// Snapshot of one crawl's counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrawlState {
    pub enqueued: u64,
    pub done: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub started_at: Option<i64>,
    pub finished_at: Option<i64>,
    pub finalized: bool,
}

#[derive(Clone)]
pub struct ProgressTracker {
    redis: ConnectionManager,
}

impl ProgressTracker {
    #[must_use]
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }

    fn key(job_id: &str) -> String {
        format!("crawl:{job_id}")
    }

    /// Initialize the hash for a new crawl. Idempotent.
    pub async fn start(&self, job_id: &str) -> Result<()> {
        let mut conn = self.redis.clone();
        let key = Self::key(job_id);
        let now = chrono::Utc::now().timestamp_millis();
        let _: bool = conn
            .hset_nx(&key, "started_at", now)
            .await
            .context("initializing crawl state")?;
        let _: bool = conn.hset_nx(&key, "finalized", 0).await.context("initializing crawl state")?;
        Ok(())
    }

    /// Atomically bump the enqueued counter; returns the new value so the
    /// frontier can enforce the admission limit.
    pub async fn incr_enqueued(&self, job_id: &str, by: u64) -> Result<u64> {
        let mut conn = self.redis.clone();
        let value: u64 = conn
            .hincr(Self::key(job_id), "enqueued", by as i64)
            .await
            .context("incrementing enqueued")?;
        Ok(value)
    }

    pub async fn enqueued(&self, job_id: &str) -> Result<u64> {
        let mut conn = self.redis.clone();
        let value: Option<u64> = conn
            .hget(Self::key(job_id), "enqueued")
            .await
            .context("reading enqueued")?;
        Ok(value.unwrap_or(0))
    }

    /// Record one page completion. Called exactly once per admitted page.
    pub async fn record_done(&self, job_id: &str, success: bool) -> Result<()> {
        let mut conn = self.redis.clone();
        let key = Self::key(job_id);
        let _: i64 = conn.hincr(&key, "done", 1).await.context("incrementing done")?;
        let field = if success { "succeeded" } else { "failed" };
        let _: i64 = conn.hincr(&key, field, 1).await.context("incrementing outcome counter")?;
        Ok(())
    }

    /// Evaluate the finalization predicate server-side. Returns the final
    /// state snapshot iff *this* caller won the transition.
    pub async fn try_finalize(&self, job_id: &str, target: u64) -> Result<Option<CrawlState>> {
        let mut conn = self.redis.clone();
        let script = redis::Script::new(FINALIZE_SCRIPT);
        let now = chrono::Utc::now().timestamp_millis();

        let won: i64 = script
            .key(Self::key(job_id))
            .arg(target)
            .arg(now)
            .invoke_async(&mut conn)
            .await
            .context("running finalize script")?;

        if won == 1 {
            debug!(job_id, "won crawl finalization");
            let state = self.snapshot(job_id).await?;
            Ok(Some(state))
        } else {
            Ok(None)
        }
    }

    pub async fn snapshot(&self, job_id: &str) -> Result<CrawlState> {
        let mut conn = self.redis.clone();
        let raw: HashMap<String, String> = conn
            .hgetall(Self::key(job_id))
            .await
            .context("reading crawl state")?;

        let get = |field: &str| raw.get(field).and_then(|v| v.parse::<u64>().ok()).unwrap_or(0);
        Ok(CrawlState {
            enqueued: get("enqueued"),
            done: get("done"),
            succeeded: get("succeeded"),
            failed: get("failed"),
            started_at: raw.get("started_at").and_then(|v| v.parse().ok()),
            finished_at: raw.get("finished_at").and_then(|v| v.parse().ok()),
            finalized: get("finalized") == 1,
        })
    }

    /// Let crawl state expire with the job TTL.
    pub async fn expire(&self, job_id: &str, ttl_secs: i64) -> Result<()> {
        let mut conn = self.redis.clone();
        let _: bool = conn
            .expire(Self::key(job_id), ttl_secs)
            .await
            .context("setting crawl state TTL")?;
        Ok(())
    }
}
