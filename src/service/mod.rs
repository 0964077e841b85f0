//! Service facade: the typed surface the thin API layer calls, plus the
//! process-wide context wiring every component together.

pub mod api;
pub mod crawl;
pub mod processors;
pub mod scrape;
pub mod search;

use anyhow::{Context, Result};
use dashmap::DashMap;
use redis::aio::ConnectionManager;
use std::sync::Arc;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::artifacts::ArtifactStore;
use crate::broker::{JobBroker, JobRepository};
use crate::config::Settings;
use crate::engine::{EngineDispatcher, LaunchOptions};
use crate::extract::Extractor;
use crate::frontier::Frontier;
use crate::llm::{LlmExtractor, ModelRegistry};
use crate::progress::ProgressTracker;
use crate::proxy::ProxyRouter;
use crate::queue::QueueManager;
use crate::search::SearchCollector;
use crate::types::JobKind;

pub use api::{CrawlCreated, CrawlStatus, CrawlResults, ScrapeOutcome, SearchOutcome};
pub use crawl::CrawlService;
pub use scrape::ScrapeService;
pub use search::SearchService;

/// Drain window for in-flight work at shutdown.
pub const SHUTDOWN_DRAIN: std::time::Duration = std::time::Duration::from_secs(10);

/// Explicitly-initialized process context; constructed once in `main` and
/// passed down. No module reads ambient state after this.
pub struct AppContext {
    pub settings: Settings,
    pub broker: JobBroker,
    pub queues: Arc<QueueManager>,
    pub dispatcher: Arc<EngineDispatcher>,
    pub extractor: Arc<Extractor>,
    pub progress: ProgressTracker,
    pub frontier: Frontier,
    pub collector: Arc<SearchCollector>,
    /// In-process waiters for synchronous scrapes, keyed by job_id.
    pub scrape_waiters: DashMap<String, oneshot::Sender<ScrapeOutcome>>,
}

impl AppContext {
    pub async fn initialize(settings: Settings) -> Result<Arc<Self>> {
        let client =
            redis::Client::open(settings.redis_url.as_str()).context("parsing Redis URL")?;
        let redis: ConnectionManager = client
            .get_connection_manager()
            .await
            .context("connecting to Redis")?;

        let repo = JobRepository::connect(&settings.database_url).await?;
        repo.run_migrations().await?;
        let broker = JobBroker::new(repo, redis.clone());

        let proxy_router = Arc::new(ProxyRouter::from_config(
            settings.proxy_tiers.clone(),
            settings.proxy_rules_path.as_deref(),
        )?);

        let launch_defaults = LaunchOptions {
            headless: settings.headless,
            ignore_ssl_errors: settings.ignore_ssl_errors,
            user_agent: settings
                .user_agent
                .clone()
                .unwrap_or_else(|| crate::engine::launcher::DEFAULT_USER_AGENT.to_string()),
            proxy: None,
        };
        let dispatcher = Arc::new(EngineDispatcher::new(
            launch_defaults,
            settings.user_agent.clone(),
            settings.ignore_ssl_errors,
            settings.keep_alive,
            proxy_router,
        ));

        let registry = ModelRegistry::load(
            settings.ai_config_path.as_deref(),
            settings.default_llm_model.clone(),
            settings.default_extract_model.clone(),
        )
        .await?;
        let llm = if registry.is_empty() {
            info!("no extraction models configured; json format disabled");
            None
        } else {
            Some(Arc::new(LlmExtractor::new(registry)))
        };

        let artifacts = Arc::new(ArtifactStore::new(
            &settings.storage,
            settings.artifact_token_ttl_secs,
        )?);
        let extractor = Arc::new(Extractor::new(llm, artifacts));

        let progress = ProgressTracker::new(redis.clone());
        let frontier = Frontier::new(redis.clone(), progress.clone());
        let queues = Arc::new(QueueManager::new(redis));

        Ok(Arc::new(Self {
            settings,
            broker,
            queues,
            dispatcher,
            extractor,
            progress,
            frontier,
            collector: Arc::new(SearchCollector::new()),
            scrape_waiters: DashMap::new(),
        }))
    }

    /// Spawn the full worker fleet: one worker per (kind × engine) queue.
    pub fn spawn_workers(
        self: &Arc<Self>,
        shutdown: &watch::Receiver<bool>,
    ) -> Vec<JoinHandle<()>> {
        let concurrency = self.settings.worker_concurrency();
        let mut handles = Vec::new();

        handles.extend(self.queues.spawn_workers(
            JobKind::Scrape,
            Arc::new(processors::ScrapeProcessor::new(Arc::clone(self))),
            concurrency,
            shutdown,
        ));
        handles.extend(self.queues.spawn_workers(
            JobKind::Crawl,
            Arc::new(processors::CrawlProcessor::new(Arc::clone(self))),
            concurrency,
            shutdown,
        ));
        handles.extend(self.queues.spawn_workers(
            JobKind::Search,
            Arc::new(processors::SearchProcessor::new(Arc::clone(self))),
            concurrency,
            shutdown,
        ));

        handles
    }

    /// Graceful shutdown: flip the flag, drain workers within the window,
    /// then quiesce the engines.
    pub async fn shutdown(
        &self,
        shutdown_tx: &watch::Sender<bool>,
        workers: Vec<JoinHandle<()>>,
    ) {
        info!("shutdown requested; draining workers");
        let _ = shutdown_tx.send(true);

        let drain = async {
            for handle in workers {
                let _ = handle.await;
            }
        };
        if tokio::time::timeout(SHUTDOWN_DRAIN, drain).await.is_err() {
            warn!("drain deadline exceeded; forcing engine shutdown");
        }

        self.dispatcher.shutdown().await;
        info!("shutdown complete");
    }
}
