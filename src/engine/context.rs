//! The sealed capability context engines hand to the extraction pipeline.

use chromiumoxide::Page;
use std::collections::HashMap;

use super::session::BrowserSession;

/// What a finished fetch exposes downstream. The extractor branches on the
/// variant, never on property presence.
#[derive(Debug)]
pub enum EngineContext {
    /// Static engine: the response body, no live page.
    Static { body: String, content_type: Option<String> },
    /// Browser engines: a live page (screenshots, JS state) plus the
    /// rendered HTML snapshot. The session keeps the browser alive until
    /// the dispatcher finishes the output.
    Browser { page: Page, html: String, session: Box<BrowserSession> },
}

/// Normalized result of running an engine against one URL.
#[derive(Debug)]
pub struct EngineOutput {
    pub requested_url: String,
    pub final_url: String,
    pub status: u16,
    pub status_text: String,
    pub headers: HashMap<String, String>,
    pub context: EngineContext,
}

impl EngineOutput {
    /// Raw HTML/body regardless of engine.
    #[must_use]
    pub fn html(&self) -> &str {
        match &self.context {
            EngineContext::Static { body, .. } => body,
            EngineContext::Browser { html, .. } => html,
        }
    }

    /// Live page when a browser engine produced this output.
    #[must_use]
    pub fn page(&self) -> Option<&Page> {
        match &self.context {
            EngineContext::Browser { page, .. } => Some(page),
            EngineContext::Static { .. } => None,
        }
    }

    #[must_use]
    pub fn is_success_status(&self) -> bool {
        (200..300).contains(&self.status)
    }
}
