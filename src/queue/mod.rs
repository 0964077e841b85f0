//! Durable request queues and the worker pool.
//!
//! One Redis stream per (kind × engine) with a consumer group; workers
//! block on reads, execute the engine adapter through their processor and
//! never extract themselves.

pub mod request;
pub mod stream;
pub mod worker;

use anyhow::Result;
use redis::aio::ConnectionManager;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::broker::JobBroker;
use crate::types::{Engine, JobKind};

pub use request::{EngineRequest, RequestUserData, SearchPageData};
pub use stream::RedisQueue;
pub use worker::{ProcessError, QueueWorker, RequestProcessor};

/// Registry of all (kind × engine) queues, plus worker spawning.
pub struct QueueManager {
    redis: ConnectionManager,
    queues: HashMap<String, RedisQueue>,
}

impl QueueManager {
    /// Create every (kind × engine) queue handle up front.
    #[must_use]
    pub fn new(redis: ConnectionManager) -> Self {
        let mut queues = HashMap::new();
        for kind in JobKind::ALL {
            for engine in Engine::ALL {
                let name = JobBroker::queue_name(kind, engine);
                queues.insert(name.clone(), RedisQueue::new(redis.clone(), name));
            }
        }
        Self { redis, queues }
    }

    #[must_use]
    pub fn queue(&self, kind: JobKind, engine: Engine) -> &RedisQueue {
        let name = JobBroker::queue_name(kind, engine);
        self.queues.get(&name).expect("all kind×engine queues are pre-registered")
    }

    #[must_use]
    pub fn queue_by_name(&self, name: &str) -> Option<&RedisQueue> {
        self.queues.get(name)
    }

    /// Enqueue a request onto its queue.
    pub async fn enqueue(&self, kind: JobKind, engine: Engine, request: &EngineRequest) -> Result<()> {
        self.queue(kind, engine).push(request).await
    }

    #[must_use]
    pub fn redis(&self) -> ConnectionManager {
        self.redis.clone()
    }

    /// Spawn one worker per queue of `kind`, all driving `processor`.
    pub fn spawn_workers(
        &self,
        kind: JobKind,
        processor: Arc<dyn RequestProcessor>,
        concurrency: usize,
        shutdown: &watch::Receiver<bool>,
    ) -> Vec<JoinHandle<()>> {
        Engine::ALL
            .iter()
            .map(|engine| {
                let queue = self.queue(kind, *engine).clone();
                let worker = QueueWorker::new(queue, Arc::clone(&processor), concurrency);
                let shutdown = shutdown.clone();
                tokio::spawn(worker.run(shutdown))
            })
            .collect()
    }
}
