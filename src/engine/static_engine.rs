//! Static HTML engine: plain HTTP fetch, no JS execution.
//!
//! Accepts only textual content types; everything else is reported as an
//! HTTP error so the caller records a clean failure instead of feeding
//! binary data to the extractor.

use dashmap::DashMap;
use reqwest::Client;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use crate::error::EngineError;

use super::FetchSpec;
use super::context::{EngineContext, EngineOutput};
use super::launcher::DEFAULT_USER_AGENT;

/// Content types the static engine will parse.
const ALLOWED_MIME_TYPES: &[&str] = &["text/html", "application/xhtml+xml", "text/plain"];

pub struct StaticEngine {
    user_agent: String,
    ignore_ssl_errors: bool,
    keep_alive: bool,
    /// One client per proxy URL (empty key = direct).
    clients: DashMap<String, Client>,
}

impl StaticEngine {
    #[must_use]
    pub fn new(user_agent: Option<String>, ignore_ssl_errors: bool, keep_alive: bool) -> Self {
        Self {
            user_agent: user_agent.unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            ignore_ssl_errors,
            keep_alive,
            clients: DashMap::new(),
        }
    }

    fn client_for(&self, proxy: Option<&str>) -> Result<Client, EngineError> {
        let key = proxy.unwrap_or("").to_string();
        if let Some(client) = self.clients.get(&key) {
            return Ok(client.clone());
        }

        let mut builder = Client::builder()
            .user_agent(self.user_agent.clone())
            .redirect(reqwest::redirect::Policy::limited(10))
            .danger_accept_invalid_certs(self.ignore_ssl_errors)
            .connect_timeout(Duration::from_secs(10));

        if self.keep_alive {
            builder = builder.tcp_keepalive(Duration::from_secs(60));
        } else {
            builder = builder.pool_max_idle_per_host(0);
        }

        if let Some(proxy_url) = proxy {
            let proxy = reqwest::Proxy::all(proxy_url)
                .map_err(|e| EngineError::proxy_from_message(format!(
                    "proxy connection failed: invalid proxy {proxy_url}: {e}"
                )))?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| EngineError::Browser { message: format!("building HTTP client: {e}") })?;
        self.clients.insert(key, client.clone());
        Ok(client)
    }

    /// Fetch one URL. Non-2xx responses still return `Ok` with the body so
    /// the failure payload can carry what the origin sent.
    pub async fn fetch(&self, spec: &FetchSpec) -> Result<EngineOutput, EngineError> {
        let client = self.client_for(spec.proxy_url())?;
        let timeout = Duration::from_millis(spec.timeout_ms);

        let response = match tokio::time::timeout(timeout, client.get(spec.url.clone()).send()).await
        {
            Err(_) => {
                return Err(EngineError::NavigationTimeout {
                    url: spec.url.to_string(),
                    timeout_ms: spec.timeout_ms,
                });
            }
            Ok(Err(e)) => return Err(classify_reqwest_error(&e, spec)),
            Ok(Ok(response)) => response,
        };

        let status = response.status().as_u16();
        let status_text = response
            .status()
            .canonical_reason()
            .unwrap_or("")
            .to_string();
        let final_url = response.url().to_string();

        let mut headers = HashMap::with_capacity(response.headers().len());
        for (name, value) in response.headers() {
            if let Ok(v) = value.to_str() {
                headers.insert(name.as_str().to_string(), v.to_string());
            }
        }

        let content_type = headers.get("content-type").cloned();
        if let Some(ct) = &content_type {
            let essence = ct.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
            if !essence.is_empty() && !ALLOWED_MIME_TYPES.contains(&essence.as_str()) {
                return Err(EngineError::Http {
                    status,
                    message: format!("unsupported content type for static engine: {essence}"),
                });
            }
        }

        let body = match tokio::time::timeout(timeout, response.text()).await {
            Err(_) => {
                return Err(EngineError::NavigationTimeout {
                    url: spec.url.to_string(),
                    timeout_ms: spec.timeout_ms,
                });
            }
            Ok(Err(e)) => {
                return Err(EngineError::Http {
                    status,
                    message: format!("reading response body: {e}"),
                });
            }
            Ok(Ok(body)) => body,
        };

        debug!(url = %spec.url, status, bytes = body.len(), "static fetch complete");

        Ok(EngineOutput {
            requested_url: spec.url.to_string(),
            final_url,
            status,
            status_text,
            headers,
            context: EngineContext::Static { body, content_type },
        })
    }
}

fn classify_reqwest_error(e: &reqwest::Error, spec: &FetchSpec) -> EngineError {
    if e.is_timeout() {
        return EngineError::NavigationTimeout {
            url: spec.url.to_string(),
            timeout_ms: spec.timeout_ms,
        };
    }
    if spec.proxy_url().is_some() && e.is_connect() {
        return EngineError::proxy_from_message(format!("proxy connection failed: {e}"));
    }
    // No response at all; status 0 marks "connection-level failure".
    EngineError::Http { status: 0, message: format!("{e}") }
}
