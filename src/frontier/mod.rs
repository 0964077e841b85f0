//! Crawl frontier: URL discovery, dedup, scope rules and the admission
//! limit gate.
//!
//! Dedup lives in a per-job Redis set so every worker sees the same
//! frontier. `limit` is enforced as the *final* gate through the atomic
//! enqueued counter: an admission that would exceed it is rolled back and
//! discovery stops.

pub mod scope;
pub mod sitemap;

use anyhow::{Context, Result};
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tracing::debug;
use url::Url;

use crate::progress::ProgressTracker;
use crate::types::CrawlOptions;
use crate::utils::url::{is_fetchable_url, normalize_for_dedup, resolve_discovered};

pub use scope::ScopeFilter;

/// One admitted URL with its crawl depth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admission {
    pub url: Url,
    pub depth: u32,
}

/// Why discovery stopped early, when it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryStop {
    LimitReached,
}

/// Outcome of one discovery pass.
#[derive(Debug, Default)]
pub struct DiscoveryOutcome {
    pub admitted: Vec<Admission>,
    pub stopped: Option<DiscoveryStop>,
}

#[derive(Clone)]
pub struct Frontier {
    redis: ConnectionManager,
    progress: ProgressTracker,
}

impl Frontier {
    #[must_use]
    pub fn new(redis: ConnectionManager, progress: ProgressTracker) -> Self {
        Self { redis, progress }
    }

    fn seen_key(job_id: &str) -> String {
        format!("crawl:{job_id}:seen")
    }

    /// Admit the seed URL (depth 0). Returns false when the seed was
    /// already admitted (job resubmission).
    pub async fn admit_seed(&self, job_id: &str, seed: &Url) -> Result<bool> {
        self.progress.start(job_id).await?;
        if !self.mark_seen(job_id, seed).await? {
            return Ok(false);
        }
        self.progress.incr_enqueued(job_id, 1).await?;

        // Bound the Redis footprint even for crawls that never finalize.
        let ttl = crate::types::JobKind::Crawl.expiry().num_seconds() * 2;
        self.progress.expire(job_id, ttl).await.ok();
        self.expire(job_id, ttl).await.ok();
        Ok(true)
    }

    /// Admit sitemap URLs (depth 1) through the same gate as discovery.
    pub async fn admit_urls(
        &self,
        job_id: &str,
        urls: &[Url],
        depth: u32,
        options: &CrawlOptions,
        filter: &ScopeFilter,
    ) -> Result<DiscoveryOutcome> {
        let mut outcome = DiscoveryOutcome::default();
        for url in urls {
            if depth > options.max_depth {
                break;
            }
            if !filter.admits(url) {
                continue;
            }
            match self.gate(job_id, url, options.limit).await? {
                Gate::Admitted => {
                    outcome.admitted.push(Admission { url: url.clone(), depth });
                }
                Gate::Duplicate => {}
                Gate::LimitReached => {
                    outcome.stopped = Some(DiscoveryStop::LimitReached);
                    break;
                }
            }
        }
        Ok(outcome)
    }

    /// Run discovery for one fetched page: normalize, scope, filter,
    /// dedup, depth-bound and limit-gate its outgoing links.
    pub async fn discover(
        &self,
        job_id: &str,
        page_url: &Url,
        page_depth: u32,
        links: &[String],
        options: &CrawlOptions,
        filter: &ScopeFilter,
    ) -> Result<DiscoveryOutcome> {
        let mut outcome = DiscoveryOutcome::default();

        // max_discovery_depth bounds how deep link extraction walks at all.
        if page_depth >= options.max_discovery_depth {
            return Ok(outcome);
        }

        let child_depth = page_depth + 1;
        if child_depth > options.max_depth {
            return Ok(outcome);
        }

        for raw in links {
            let Some(resolved) =
                resolve_discovered(page_url, raw, options.ignore_query_parameters)
            else {
                continue;
            };
            if !is_fetchable_url(resolved.as_str()) {
                continue;
            }
            if !filter.admits(&resolved) {
                continue;
            }

            match self.gate(job_id, &resolved, options.limit).await? {
                Gate::Admitted => {
                    outcome.admitted.push(Admission { url: resolved, depth: child_depth });
                }
                Gate::Duplicate => {}
                Gate::LimitReached => {
                    debug!(job_id, "admission limit reached, aborting discovery");
                    outcome.stopped = Some(DiscoveryStop::LimitReached);
                    break;
                }
            }
        }

        Ok(outcome)
    }

    /// Dedup + limit gate. The enqueued counter is bumped optimistically
    /// and rolled back when it would exceed the limit, so
    /// `enqueued <= limit` holds at all times.
    async fn gate(&self, job_id: &str, url: &Url, limit: u64) -> Result<Gate> {
        if !self.mark_seen(job_id, url).await? {
            return Ok(Gate::Duplicate);
        }

        let enqueued = self.progress.incr_enqueued(job_id, 1).await?;
        if enqueued > limit {
            // Undo the optimistic bump so enqueued never exceeds the limit.
            self.rollback_enqueued(job_id).await?;
            return Ok(Gate::LimitReached);
        }

        Ok(Gate::Admitted)
    }

    async fn rollback_enqueued(&self, job_id: &str) -> Result<()> {
        let mut conn = self.redis.clone();
        let _: i64 = conn
            .hincr(format!("crawl:{job_id}"), "enqueued", -1)
            .await
            .context("rolling back enqueued counter")?;
        Ok(())
    }

    async fn mark_seen(&self, job_id: &str, url: &Url) -> Result<bool> {
        let mut conn = self.redis.clone();
        let added: i64 = conn
            .sadd(Self::seen_key(job_id), normalize_for_dedup(url))
            .await
            .context("marking URL seen")?;
        Ok(added == 1)
    }

    /// Expire frontier bookkeeping with the job TTL.
    pub async fn expire(&self, job_id: &str, ttl_secs: i64) -> Result<()> {
        let mut conn = self.redis.clone();
        let _: bool = conn
            .expire(Self::seen_key(job_id), ttl_secs)
            .await
            .context("setting frontier TTL")?;
        Ok(())
    }
}

enum Gate {
    Admitted,
    Duplicate,
    LimitReached,
}
