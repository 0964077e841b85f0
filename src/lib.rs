pub mod artifacts;
pub mod broker;
pub mod config;
pub mod engine;
pub mod error;
pub mod extract;
pub mod frontier;
pub mod llm;
pub mod progress;
pub mod proxy;
pub mod queue;
pub mod search;
pub mod service;
pub mod types;
pub mod utils;

pub use broker::{CancelOutcome, JobBroker, JobRepository, JobStatus};
pub use config::Settings;
pub use engine::{EngineContext, EngineDispatcher, EngineOutput};
pub use error::{EngineError, ExtractError, LlmError};
pub use extract::{ExtractedDocument, Extractor};
pub use frontier::{Frontier, ScopeFilter};
pub use llm::{LlmExtractor, ModelRegistry};
pub use progress::{CrawlState, ProgressTracker};
pub use proxy::ProxyRouter;
pub use queue::{EngineRequest, QueueManager};
pub use search::SearchCollector;
pub use service::{
    AppContext, CrawlService, ScrapeOutcome, ScrapeService, SearchOutcome, SearchService,
};
pub use types::{
    CrawlOptions, Engine, JobKind, JsonOptions, OutputFormat, ScopeStrategy, ScrapeOptions,
    SearchOptions, SearchProvider, SearchResult,
};
