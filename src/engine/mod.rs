//! Engine adapter layer: three rendering backends behind one contract.
//!
//! The dispatcher resolves the outbound proxy, runs the right engine, and
//! retries transient proxy faults (re-consulting the tier tracker each
//! time). Downstream stages receive an [`EngineOutput`] with the sealed
//! [`EngineContext`] capability variant.

pub mod adblock;
pub mod browser_engine;
pub mod context;
pub mod fingerprint;
pub mod launcher;
pub mod session;
pub mod static_engine;

use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

use crate::error::EngineError;
use crate::proxy::{ProxyRouter, ProxySelection};
use crate::types::{Engine, ScrapeOptions, clamp_timeout_ms};

pub use context::{EngineContext, EngineOutput};
pub use launcher::LaunchOptions;
pub use session::SessionPool;

use browser_engine::BrowserEngine;
use static_engine::StaticEngine;

/// Transient-proxy retries within one engine run.
const MAX_PROXY_RETRIES: u32 = 3;

/// Everything an engine needs to fetch one URL.
#[derive(Debug, Clone)]
pub struct FetchSpec {
    pub url: Url,
    pub engine: Engine,
    pub timeout_ms: u64,
    pub wait_for_ms: Option<u64>,
    pub proxy: Option<ProxySelection>,
}

impl FetchSpec {
    #[must_use]
    pub fn proxy_url(&self) -> Option<&str> {
        self.proxy.as_ref().map(|p| p.url.as_str())
    }
}

/// Front door for all fetching: owns the engines and the proxy router.
pub struct EngineDispatcher {
    static_engine: StaticEngine,
    browser_engine: BrowserEngine,
    sessions: Arc<SessionPool>,
    proxy_router: Arc<ProxyRouter>,
}

impl EngineDispatcher {
    #[must_use]
    pub fn new(
        launch_defaults: LaunchOptions,
        user_agent: Option<String>,
        ignore_ssl_errors: bool,
        keep_alive: bool,
        proxy_router: Arc<ProxyRouter>,
    ) -> Self {
        let sessions = Arc::new(SessionPool::new(launch_defaults));
        Self {
            static_engine: StaticEngine::new(user_agent, ignore_ssl_errors, keep_alive),
            browser_engine: BrowserEngine::new(Arc::clone(&sessions)),
            sessions,
            proxy_router,
        }
    }

    /// Fetch one URL under the request's options.
    ///
    /// Proxy resolution happens here; transient proxy faults are reported
    /// to the tier tracker and retried with a fresh selection.
    pub async fn run(&self, options: &ScrapeOptions) -> Result<EngineOutput, EngineError> {
        let url = Url::parse(&options.url)
            .map_err(|e| EngineError::Validation(format!("invalid URL {}: {e}", options.url)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(EngineError::Validation(format!(
                "unsupported scheme: {}",
                url.scheme()
            )));
        }

        let mut attempt = 0;
        loop {
            attempt += 1;

            let proxy = self
                .proxy_router
                .resolve(&url, options.proxy.as_deref(), None)
                .map_err(|e| EngineError::proxy_from_message(e.to_string()))?;

            let spec = FetchSpec {
                url: url.clone(),
                engine: options.engine,
                timeout_ms: clamp_timeout_ms(options.timeout_ms),
                wait_for_ms: options.wait_for_ms,
                proxy,
            };

            let result = match spec.engine {
                Engine::Static => self.static_engine.fetch(&spec).await,
                Engine::Browser | Engine::Stealth => self.browser_engine.fetch(&spec).await,
            };

            match result {
                Ok(output) => return Ok(output),
                Err(e) => {
                    if let (EngineError::Proxy { transient: true, .. }, Some(selection)) =
                        (&e, &spec.proxy)
                    {
                        if let Some(tier) = selection.tier {
                            let host = spec.url.host_str().unwrap_or_default();
                            self.proxy_router.report_error(host, tier);
                        }
                        if attempt < MAX_PROXY_RETRIES {
                            debug!(url = %spec.url, attempt, "transient proxy fault, retrying");
                            continue;
                        }
                    }
                    return Err(e);
                }
            }
        }
    }

    /// Release engine resources held by an output after extraction.
    ///
    /// Browser pages are closed; the session returns to the pool on success
    /// and is rotated away on failure (unless the status is one of the
    /// configured blocked codes, which keep the session).
    pub async fn finish(&self, output: EngineOutput, success: bool) {
        let status = output.status;
        if let EngineContext::Browser { page, session, .. } = output.context {
            if let Err(e) = page.close().await {
                debug!("closing page failed: {e}");
            }
            let keep = success || session::status_keeps_session(status);
            if keep {
                self.sessions.release(*session).await;
            } else {
                self.sessions.rotate(*session).await;
            }
        }
    }

    /// Drain the browser session pool (graceful shutdown).
    pub async fn shutdown(&self) {
        self.sessions.shutdown().await;
        info!("engine dispatcher shut down");
    }
}
