//! Error types shared across the service.
//!
//! Errors carry a stable string *kind* (surfaced in payloads and logs) so
//! callers never depend on Rust types crossing the API boundary.

use once_cell::sync::Lazy;
use regex::Regex;

/// Stable error kind identifiers used in payloads, logs and job rows.
pub mod kind {
    pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
    pub const HTTP_ERROR: &str = "HTTP_ERROR";
    pub const NAVIGATION_TIMEOUT: &str = "NAVIGATION_TIMEOUT";
    pub const PROXY_ERROR: &str = "PROXY_ERROR";
    pub const PROXY_UNAVAILABLE: &str = "PROXY_UNAVAILABLE";
    pub const BROWSER_ERROR: &str = "BROWSER_ERROR";
    pub const EXTRACTION_ERROR: &str = "EXTRACTION_ERROR";
    pub const COST_LIMIT_EXCEEDED: &str = "COST_LIMIT_EXCEEDED";
    pub const CRAWL_LIMIT_REACHED: &str = "CRAWL_LIMIT_REACHED";
    pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
}

/// Engine-level failure raised while fetching or rendering a page.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Origin answered with a non-2xx status. The body (when available) is
    /// still extracted best-effort so the failure payload carries it.
    #[error("HTTP error {status}: {message}")]
    Http { status: u16, message: String },

    /// Navigation did not settle within the request timeout.
    #[error("navigation timed out after {timeout_ms}ms: {url}")]
    NavigationTimeout { url: String, timeout_ms: u64 },

    /// Outbound proxy failure. `transient` marks the retryable subset
    /// (connection/tunnel/auth/socks faults).
    #[error("proxy error: {message}")]
    Proxy { message: String, transient: bool },

    /// Browser/CDP-level failure (crash, closed target, protocol error).
    #[error("browser error: {message}")]
    Browser { message: String },

    /// Request shape violation detected before any I/O.
    #[error("validation error: {0}")]
    Validation(String),
}

impl EngineError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Http { .. } => kind::HTTP_ERROR,
            Self::NavigationTimeout { .. } => kind::NAVIGATION_TIMEOUT,
            Self::Proxy { .. } => kind::PROXY_ERROR,
            Self::Browser { .. } => kind::BROWSER_ERROR,
            Self::Validation(_) => kind::VALIDATION_ERROR,
        }
    }

    /// Whether a fresh session (and possibly a different proxy tier) is
    /// worth trying for this failure.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::NavigationTimeout { .. } => true,
            Self::Proxy { transient, .. } => *transient,
            _ => false,
        }
    }

    /// Classify a raw proxy failure message into the transient subset.
    pub fn proxy_from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let transient = TRANSIENT_PROXY_PATTERNS.iter().any(|p| p.is_match(&message));
        Self::Proxy { message, transient }
    }
}

/// Transient proxy fault names; anything else gives up immediately and the
/// failed-request handler records the failure.
static TRANSIENT_PROXY_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)proxy.?connection.?failed",
        r"(?i)tunnel.?connection.?failed",
        r"(?i)proxy.?auth(entication)?.?failed",
        r"(?i)socks.?connection.?failed",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static regex"))
    .collect()
});

/// Known-transient network faults that are downgraded to warnings at the
/// process-wide handler instead of triggering shutdown.
static SUPPRESSIBLE_NETWORK_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)connection reset",
        r"(?i)client.{0,10}aborted",
        r"(?i)broken pipe",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static regex"))
    .collect()
});

/// True when an unhandled fault is a known-transient network hiccup and
/// should be logged and suppressed rather than taking the process down.
pub fn is_suppressible_network_fault(message: &str) -> bool {
    SUPPRESSIBLE_NETWORK_PATTERNS.iter().any(|p| p.is_match(message))
}

/// Failure inside the extraction pipeline, tagged with the offending step.
#[derive(Debug, thiserror::Error)]
#[error("extraction failed at {step}: {message}")]
pub struct ExtractError {
    pub step: &'static str,
    pub message: String,
    /// Surfaced error kind; `EXTRACTION_ERROR` unless a sub-engine fault
    /// (e.g. the LLM cost limit) carries its own.
    pub kind: &'static str,
    #[source]
    pub source: Option<anyhow::Error>,
}

impl ExtractError {
    pub fn new(step: &'static str, message: impl Into<String>) -> Self {
        Self { step, message: message.into(), kind: kind::EXTRACTION_ERROR, source: None }
    }

    pub fn with_source(step: &'static str, source: anyhow::Error) -> Self {
        Self {
            step,
            message: format!("{source:#}"),
            kind: kind::EXTRACTION_ERROR,
            source: Some(source),
        }
    }

    #[must_use]
    pub fn with_kind(mut self, kind: &'static str) -> Self {
        self.kind = kind;
        self
    }
}

/// LLM agent failures.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("cost limit exceeded: spent {spent:.6}, next call ~{projected:.6}, limit {limit:.6}")]
    CostLimitExceeded { spent: f64, projected: f64, limit: f64 },

    #[error("model {model} is not configured")]
    UnknownModel { model: String },

    #[error("model call failed: {0}")]
    Call(String),

    #[error("model returned unparseable output: {0}")]
    BadOutput(String),
}

impl LlmError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CostLimitExceeded { .. } => kind::COST_LIMIT_EXCEEDED,
            _ => kind::INTERNAL_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_proxy_classification() {
        let e = EngineError::proxy_from_message("ERR_TUNNEL_CONNECTION_FAILED at 10.0.0.1");
        assert!(e.is_retryable());
        let e = EngineError::proxy_from_message("SOCKS connection failed");
        assert!(e.is_retryable());
        let e = EngineError::proxy_from_message("proxy returned 502 bad gateway");
        assert!(!e.is_retryable());
    }

    #[test]
    fn kinds_are_stable_strings() {
        assert_eq!(
            EngineError::Http { status: 500, message: String::new() }.kind(),
            "HTTP_ERROR"
        );
        assert_eq!(
            EngineError::NavigationTimeout { url: String::new(), timeout_ms: 1 }.kind(),
            "NAVIGATION_TIMEOUT"
        );
    }

    #[test]
    fn suppressible_faults() {
        assert!(is_suppressible_network_fault("Connection reset by peer"));
        assert!(is_suppressible_network_fault("write failed: Broken pipe"));
        assert!(!is_suppressible_network_fault("segmentation fault"));
    }
}
