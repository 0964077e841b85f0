//! Worker pool: one worker task per queue, bounded concurrency, retry
//! with exponential backoff, graceful shutdown via a watch channel.

use async_trait::async_trait;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::request::EngineRequest;
use super::stream::{Delivery, RedisQueue};

const READ_BLOCK_MS: usize = 2_000;
const CLAIM_IDLE_MS: usize = 60_000;
const CLAIM_EVERY: Duration = Duration::from_secs(120);

/// How one request ended, from the queue's point of view.
#[derive(Debug)]
pub enum ProcessError {
    /// Transient fault; redeliver with backoff while attempts remain.
    Retryable(anyhow::Error),
    /// Permanent fault; the failure is recorded, no redelivery.
    Fatal(anyhow::Error),
    /// Expected abort (cancelled job, admission limit); ack quietly.
    Aborted(&'static str),
}

#[async_trait]
pub trait RequestProcessor: Send + Sync {
    fn name(&self) -> &'static str;
    async fn process(&self, request: &EngineRequest) -> Result<(), ProcessError>;
}

pub struct QueueWorker {
    queue: RedisQueue,
    processor: Arc<dyn RequestProcessor>,
    concurrency: usize,
}

impl QueueWorker {
    #[must_use]
    pub fn new(queue: RedisQueue, processor: Arc<dyn RequestProcessor>, concurrency: usize) -> Self {
        Self { queue, processor, concurrency: concurrency.max(1) }
    }

    /// Run until the shutdown flag flips. In-flight requests get a bounded
    /// drain window before the worker returns.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let stream = self.queue.stream().to_string();
        info!(queue = %stream, processor = self.processor.name(), concurrency = self.concurrency, "worker starting");

        if let Err(e) = self.queue.ensure_group().await {
            error!(queue = %stream, "cannot create consumer group: {e:#}");
            return;
        }

        // Recover deliveries abandoned by a previous incarnation.
        match self.queue.claim_abandoned(0, self.concurrency * 4).await {
            Ok(recovered) if !recovered.is_empty() => {
                info!(queue = %stream, count = recovered.len(), "recovered pending deliveries");
                self.dispatch_batch(recovered).await;
            }
            Ok(_) => {}
            Err(e) => warn!(queue = %stream, "startup claim failed: {e:#}"),
        }

        let mut last_claim = tokio::time::Instant::now();
        let mut consecutive_errors = 0u32;

        loop {
            if *shutdown.borrow() {
                break;
            }

            let batch = tokio::select! {
                result = self.queue.read(self.concurrency, READ_BLOCK_MS) => result,
                _ = shutdown.changed() => continue,
            };

            match batch {
                Ok(deliveries) => {
                    consecutive_errors = 0;
                    if !deliveries.is_empty() {
                        self.dispatch_batch(deliveries).await;
                    }
                }
                Err(e) => {
                    consecutive_errors += 1;
                    let backoff = Duration::from_secs(2u64.pow(consecutive_errors.min(5)).min(30));
                    warn!(queue = %stream, consecutive_errors, "queue read failed, backing off {backoff:?}: {e:#}");
                    tokio::time::sleep(backoff).await;
                }
            }

            if last_claim.elapsed() >= CLAIM_EVERY {
                if let Err(e) = self.queue.claim_abandoned(CLAIM_IDLE_MS, self.concurrency).await {
                    debug!(queue = %stream, "periodic claim failed: {e:#}");
                }
                last_claim = tokio::time::Instant::now();
            }
        }

        info!(queue = %stream, "worker stopped");
    }

    /// Process one batch concurrently under the semaphore.
    async fn dispatch_batch(&self, deliveries: Vec<Delivery>) {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks: JoinSet<()> = JoinSet::new();

        for delivery in deliveries {
            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                error!("worker semaphore closed unexpectedly");
                break;
            };
            let queue = self.queue.clone();
            let processor = Arc::clone(&self.processor);

            tasks.spawn(async move {
                let _permit = permit;
                handle_delivery(&queue, processor.as_ref(), delivery).await;
            });
        }

        while tasks.join_next().await.is_some() {}
    }
}

async fn handle_delivery(queue: &RedisQueue, processor: &dyn RequestProcessor, delivery: Delivery) {
    let Delivery { id, request } = delivery;
    let url = request.url.clone();

    match processor.process(&request).await {
        Ok(()) => {
            debug!(%url, "request handled");
            if let Err(e) = queue.ack(&id).await {
                error!(%url, "ack failed: {e:#}");
            }
        }
        Err(ProcessError::Aborted(reason)) => {
            debug!(%url, reason, "request aborted (expected)");
            queue.ack(&id).await.ok();
        }
        Err(ProcessError::Retryable(e)) if request.attempt < request.max_attempts() => {
            let delay = retry_backoff(request.attempt);
            warn!(
                %url,
                attempt = request.attempt,
                max = request.max_attempts(),
                "retryable failure, redelivering in {delay:?}: {e:#}"
            );
            tokio::time::sleep(delay).await;
            if let Err(push_err) = queue.push(&request.with_retry()).await {
                error!(%url, "requeue failed, dead-lettering: {push_err:#}");
                queue.move_to_dead_letter(&request, &format!("{e:#}")).await.ok();
            }
            queue.ack(&id).await.ok();
        }
        Err(ProcessError::Retryable(e) | ProcessError::Fatal(e)) => {
            warn!(%url, attempt = request.attempt, "request exhausted: {e:#}");
            queue.move_to_dead_letter(&request, &format!("{e:#}")).await.ok();
            queue.ack(&id).await.ok();
        }
    }
}

/// Exponential backoff, base 1 s, ±20% jitter, capped at 30 s.
fn retry_backoff(attempt: u32) -> Duration {
    const BASE_MS: u64 = 1_000;
    const MAX_MS: u64 = 30_000;
    const JITTER: f64 = 0.2;

    let exp = BASE_MS.saturating_mul(1 << attempt.min(5));
    let jitter = rand::rng().random_range(-JITTER..=JITTER);
    let with_jitter = (exp as f64 * (1.0 + jitter)) as u64;
    Duration::from_millis(with_jitter.min(MAX_MS))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_caps() {
        let first = retry_backoff(1);
        assert!(first >= Duration::from_millis(1_600) && first <= Duration::from_millis(2_400));
        let huge = retry_backoff(20);
        assert!(huge <= Duration::from_millis(30_000));
    }
}
