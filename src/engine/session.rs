//! Browser session pool with error-driven rotation.
//!
//! A session is one live browser identity (profile, cookie jar, proxy).
//! Sessions are pooled per (engine, proxy) key, health-checked on checkout
//! and discarded when a request reports a rotating error. A single request
//! may rotate through at most [`MAX_SESSION_ROTATIONS`] sessions.

use anyhow::{Context, Result};
use chromiumoxide::browser::Browser;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::types::Engine;

use super::launcher::{LaunchOptions, launch_browser};

/// Session rotations allowed within one request.
pub const MAX_SESSION_ROTATIONS: u32 = 3;

/// HTTP statuses that do *not* rotate the session (the origin is telling us
/// off deliberately; a fresh identity will not help immediately).
pub const NO_ROTATE_STATUS_CODES: &[u16] = &[401, 403, 404];

/// One pooled browser identity.
#[derive(Debug)]
pub struct BrowserSession {
    pub id: u64,
    pub engine: Engine,
    pub proxy: Option<String>,
    browser: Arc<Browser>,
    handler: JoinHandle<()>,
    user_data_dir: Option<PathBuf>,
}

impl BrowserSession {
    #[must_use]
    pub fn browser(&self) -> Arc<Browser> {
        Arc::clone(&self.browser)
    }

    /// Close the browser process and remove its profile directory.
    pub async fn dispose(mut self) {
        if let Some(browser) = Arc::get_mut(&mut self.browser) {
            if let Err(e) = browser.close().await {
                warn!(session = self.id, "failed to close browser cleanly: {e}");
            }
            let _ = browser.wait().await;
        } else {
            warn!(session = self.id, "browser still referenced, skipping graceful close");
        }
        self.handler.abort();
        if let Some(dir) = self.user_data_dir.take() {
            if let Err(e) = std::fs::remove_dir_all(&dir) {
                warn!(session = self.id, "failed to remove profile dir {}: {e}", dir.display());
            }
        }
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        self.handler.abort();
        if let Some(dir) = self.user_data_dir.take() {
            let _ = std::fs::remove_dir_all(&dir);
        }
    }
}

/// Pool of browser sessions keyed by (engine, proxy).
pub struct SessionPool {
    launch_defaults: LaunchOptions,
    sessions: DashMap<String, Arc<Mutex<VecDeque<BrowserSession>>>>,
    next_id: AtomicU64,
    /// Max idle sessions retained per key.
    max_idle_per_key: usize,
}

impl SessionPool {
    #[must_use]
    pub fn new(launch_defaults: LaunchOptions) -> Self {
        Self {
            launch_defaults,
            sessions: DashMap::new(),
            next_id: AtomicU64::new(0),
            max_idle_per_key: 4,
        }
    }

    fn key(engine: Engine, proxy: Option<&str>) -> String {
        format!("{engine}|{}", proxy.unwrap_or(""))
    }

    /// Check out a healthy session, launching a fresh one when the pool is
    /// empty or every pooled session fails its health check.
    pub async fn acquire(&self, engine: Engine, proxy: Option<&str>) -> Result<BrowserSession> {
        let key = Self::key(engine, proxy);
        let bucket = self
            .sessions
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(VecDeque::new())))
            .clone();

        loop {
            let candidate = bucket.lock().await.pop_front();
            let Some(session) = candidate else { break };

            match session.browser.version().await {
                Ok(_) => {
                    debug!(session = session.id, %key, "reusing pooled session");
                    return Ok(session);
                }
                Err(e) => {
                    warn!(session = session.id, "session failed health check: {e}");
                    session.dispose().await;
                }
            }
        }

        self.launch(engine, proxy).await
    }

    async fn launch(&self, engine: Engine, proxy: Option<&str>) -> Result<BrowserSession> {
        let opts = LaunchOptions { proxy: proxy.map(str::to_string), ..self.launch_defaults.clone() };
        let (browser, handler, user_data_dir) = launch_browser(&opts)
            .await
            .with_context(|| format!("launching {engine} session"))?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        info!(session = id, %engine, proxied = proxy.is_some(), "launched browser session");
        Ok(BrowserSession {
            id,
            engine,
            proxy: proxy.map(str::to_string),
            browser: Arc::new(browser),
            handler,
            user_data_dir: Some(user_data_dir),
        })
    }

    /// Return a session to its own (engine, proxy) bucket after use.
    pub async fn release(&self, session: BrowserSession) {
        let key = Self::key(session.engine, session.proxy.as_deref());
        let bucket = self
            .sessions
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(VecDeque::new())))
            .clone();

        let mut guard = bucket.lock().await;
        if guard.len() >= self.max_idle_per_key {
            drop(guard);
            session.dispose().await;
        } else {
            guard.push_back(session);
        }
    }

    /// Discard a session after a rotating error.
    pub async fn rotate(&self, session: BrowserSession) {
        debug!(session = session.id, "rotating session after error");
        session.dispose().await;
    }

    /// Close every pooled session (graceful shutdown path).
    pub async fn shutdown(&self) {
        for entry in self.sessions.iter() {
            let bucket = entry.value().clone();
            let mut guard = bucket.lock().await;
            while let Some(session) = guard.pop_front() {
                session.dispose().await;
            }
        }
        info!("session pool drained");
    }
}

/// Whether a captured HTTP status should keep the current session.
#[must_use]
pub fn status_keeps_session(status: u16) -> bool {
    NO_ROTATE_STATUS_CODES.contains(&status)
}
