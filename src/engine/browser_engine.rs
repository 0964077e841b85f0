//! Headless browser engines (plain and stealth) on top of the session pool.
//!
//! One fetch may rotate through up to [`MAX_SESSION_ROTATIONS`] sessions;
//! blocked status codes are answers, not errors, and keep the session.

use anyhow::Result;
use chromiumoxide::Page;
use chromiumoxide::cdp::browser_protocol::fetch::{
    AuthChallengeResponse, AuthChallengeResponseResponse, ContinueRequestParams,
    ContinueWithAuthParams, EventAuthRequired, EventRequestPaused,
};
use chromiumoxide::cdp::browser_protocol::network::{EventResponseReceived, ResourceType};
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::EngineError;
use crate::types::Engine;

use super::FetchSpec;
use super::adblock;
use super::context::{EngineContext, EngineOutput};
use super::fingerprint;
use super::session::{MAX_SESSION_ROTATIONS, SessionPool};

pub struct BrowserEngine {
    pool: Arc<SessionPool>,
}

impl BrowserEngine {
    #[must_use]
    pub fn new(pool: Arc<SessionPool>) -> Self {
        Self { pool }
    }

    /// Run one fetch, rotating the session on errors.
    pub async fn fetch(&self, spec: &FetchSpec) -> Result<EngineOutput, EngineError> {
        let mut last_error: Option<EngineError> = None;

        for rotation in 0..=MAX_SESSION_ROTATIONS {
            let session = self
                .pool
                .acquire(spec.engine, spec.proxy_url())
                .await
                .map_err(|e| EngineError::Browser { message: format!("{e:#}") })?;

            match self.try_fetch(&session, spec).await {
                Ok((page, html, status, status_text, headers, final_url)) => {
                    return Ok(EngineOutput {
                        requested_url: spec.url.to_string(),
                        final_url,
                        status,
                        status_text,
                        headers,
                        context: EngineContext::Browser {
                            page,
                            html,
                            session: Box::new(session),
                        },
                    });
                }
                Err(e) => {
                    warn!(
                        url = %spec.url,
                        rotation,
                        error = %e,
                        "browser fetch failed, rotating session"
                    );
                    self.pool.rotate(session).await;
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or(EngineError::Browser {
            message: "session rotations exhausted".to_string(),
        }))
    }

    async fn try_fetch(
        &self,
        session: &super::session::BrowserSession,
        spec: &FetchSpec,
    ) -> Result<(Page, String, u16, String, HashMap<String, String>, String), EngineError> {
        let browser = session.browser();
        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| browser_error(&e.to_string()))?;

        // Network domain on + blocklist before any navigation.
        adblock::apply(&page)
            .await
            .map_err(|e| browser_error(&format!("{e:#}")))?;

        if spec.engine == Engine::Stealth {
            let profile = fingerprint::profile_for_session(session.id);
            fingerprint::apply(&page, profile)
                .await
                .map_err(|e| browser_error(&format!("{e:#}")))?;
            install_auth_interceptor(&page).await?;
        }

        let mut responses = page
            .event_listener::<EventResponseReceived>()
            .await
            .map_err(|e| browser_error(&e.to_string()))?;

        let timeout = Duration::from_millis(spec.timeout_ms);
        let nav = tokio::time::timeout(timeout, async {
            page.goto(spec.url.as_str()).await?;
            page.wait_for_navigation().await?;
            Ok::<(), chromiumoxide::error::CdpError>(())
        })
        .await;

        match nav {
            Err(_) => {
                let _ = page.clone().close().await;
                return Err(EngineError::NavigationTimeout {
                    url: spec.url.to_string(),
                    timeout_ms: spec.timeout_ms,
                });
            }
            Ok(Err(e)) => {
                let _ = page.clone().close().await;
                return Err(browser_error(&e.to_string()));
            }
            Ok(Ok(())) => {}
        }

        if let Some(wait_ms) = spec.wait_for_ms {
            tokio::time::sleep(Duration::from_millis(wait_ms.min(spec.timeout_ms))).await;
        }

        // The document response usually arrived while we were navigating;
        // give the buffered stream a short window to surface it.
        let mut status = 200u16;
        let mut status_text = String::new();
        let mut headers = HashMap::new();
        let drain_deadline = tokio::time::Instant::now() + Duration::from_millis(500);
        while let Ok(Some(ev)) = tokio::time::timeout_at(drain_deadline, responses.next()).await {
            if ev.r#type == ResourceType::Document {
                status = ev.response.status as u16;
                status_text = ev.response.status_text.clone();
                if let Ok(serde_json::Value::Object(map)) =
                    serde_json::to_value(&ev.response.headers)
                {
                    for (name, value) in map {
                        if let serde_json::Value::String(v) = value {
                            headers.insert(name.to_ascii_lowercase(), v);
                        }
                    }
                }
                break;
            }
        }

        let html = page
            .content()
            .await
            .map_err(|e| browser_error(&format!("reading page content: {e}")))?;

        let final_url = page
            .url()
            .await
            .ok()
            .flatten()
            .unwrap_or_else(|| spec.url.to_string());

        debug!(url = %spec.url, status, bytes = html.len(), "browser fetch complete");
        Ok((page, html, status, status_text, headers, final_url))
    }
}

fn browser_error(message: &str) -> EngineError {
    // Chromium surfaces proxy faults as net:: error strings; route the
    // transient subset through the proxy classifier.
    let lowered = message.to_ascii_lowercase();
    if lowered.contains("proxy") || lowered.contains("tunnel") || lowered.contains("socks") {
        EngineError::proxy_from_message(message)
    } else {
        EngineError::Browser { message: message.to_string() }
    }
}

/// Intercept HTTP-auth challenges and cancel them so the 401 page body is
/// still captured instead of hanging on a credentials dialog.
async fn install_auth_interceptor(page: &Page) -> Result<(), EngineError> {
    page.execute(chromiumoxide::cdp::browser_protocol::fetch::EnableParams {
        handle_auth_requests: Some(true),
        ..Default::default()
    })
    .await
    .map_err(|e| browser_error(&format!("enabling fetch interception: {e}")))?;

    let mut auth_events = page
        .event_listener::<EventAuthRequired>()
        .await
        .map_err(|e| browser_error(&e.to_string()))?;
    let mut paused_events = page
        .event_listener::<EventRequestPaused>()
        .await
        .map_err(|e| browser_error(&e.to_string()))?;

    let page = page.clone();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                ev = auth_events.next() => match ev {
                    Some(ev) => {
                        let cancel = ContinueWithAuthParams {
                            request_id: ev.request_id.clone(),
                            auth_challenge_response: AuthChallengeResponse {
                                response: AuthChallengeResponseResponse::CancelAuth,
                                username: None,
                                password: None,
                            },
                        };
                        if let Err(e) = page.execute(cancel).await {
                            debug!("cancelling auth challenge failed: {e}");
                        }
                    }
                    None => break,
                },
                ev = paused_events.next() => match ev {
                    Some(ev) => {
                        let cont = ContinueRequestParams::new(ev.request_id.clone());
                        if let Err(e) = page.execute(cont).await {
                            debug!("continuing intercepted request failed: {e}");
                        }
                    }
                    None => break,
                },
            }
        }
    });

    Ok(())
}
