//! Request kinds, engines, output formats and validated request options.
//!
//! These are the shapes the thin API layer hands to the core after
//! validation; the core never re-parses raw user input.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Default per-request timeout (overall fetch/render budget).
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
/// Request timeouts are clamped to this range.
pub const MIN_TIMEOUT_MS: u64 = 1_000;
pub const MAX_TIMEOUT_MS: u64 = 600_000;

/// Clamp a request-scoped timeout into the supported range.
#[must_use]
pub fn clamp_timeout_ms(requested: Option<u64>) -> u64 {
    requested
        .unwrap_or(DEFAULT_TIMEOUT_MS)
        .clamp(MIN_TIMEOUT_MS, MAX_TIMEOUT_MS)
}

/// The three user-facing request kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Scrape,
    Crawl,
    Search,
}

impl JobKind {
    pub const ALL: [JobKind; 3] = [JobKind::Scrape, JobKind::Crawl, JobKind::Search];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scrape => "scrape",
            Self::Crawl => "crawl",
            Self::Search => "search",
        }
    }

    /// Kind-specific job TTL (crawl jobs keep results longer).
    #[must_use]
    pub fn expiry(&self) -> chrono::Duration {
        match self {
            Self::Crawl => chrono::Duration::hours(3),
            Self::Scrape | Self::Search => chrono::Duration::hours(1),
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rendering backends. `Static` fetches and parses without executing JS;
/// `Browser` is plain headless Chromium; `Stealth` adds fingerprint
/// overrides and HTTP-auth interception.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    Static,
    Browser,
    Stealth,
}

impl Engine {
    pub const ALL: [Engine; 3] = [Engine::Static, Engine::Browser, Engine::Stealth];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Static => "static",
            Self::Browser => "browser",
            Self::Stealth => "stealth",
        }
    }

    #[must_use]
    pub fn is_browser(&self) -> bool {
        matches!(self, Self::Browser | Self::Stealth)
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Requested output formats for a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutputFormat {
    #[serde(rename = "rawHtml")]
    RawHtml,
    #[serde(rename = "html")]
    Html,
    #[serde(rename = "markdown")]
    Markdown,
    #[serde(rename = "text")]
    Text,
    #[serde(rename = "screenshot")]
    Screenshot,
    #[serde(rename = "screenshot@fullPage")]
    ScreenshotFullPage,
    #[serde(rename = "json")]
    Json,
}

impl OutputFormat {
    /// Key under which the format appears in the assembled record.
    #[must_use]
    pub fn key(&self) -> &'static str {
        match self {
            Self::RawHtml => "rawHtml",
            Self::Html => "html",
            Self::Markdown => "markdown",
            Self::Text => "text",
            Self::Screenshot | Self::ScreenshotFullPage => "screenshot",
            Self::Json => "json",
        }
    }

    #[must_use]
    pub fn needs_browser(&self) -> bool {
        matches!(self, Self::Screenshot | Self::ScreenshotFullPage)
    }
}

/// Options for the schema-driven JSON extraction step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonOptions {
    /// JSON-Schema subset constraining the model output.
    pub schema: serde_json::Value,
    /// Extra user instructions appended to the extraction prompt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_prompt: Option<String>,
    /// Optional schema name used in prompts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_name: Option<String>,
    /// Model override for this request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Validated single-page scrape request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeOptions {
    pub url: String,
    #[serde(default = "default_engine")]
    pub engine: Engine,
    /// Per-request proxy URL; wins over rules and tiers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
    #[serde(default = "default_formats")]
    pub formats: Vec<OutputFormat>,
    /// Overall fetch/render timeout in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// Queue-level attempts; clamped to 1..=3.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<u32>,
    /// Extra settle delay after navigation, in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_for_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include_tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude_tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_options: Option<JsonOptions>,
}

fn default_engine() -> Engine {
    Engine::Static
}

fn default_formats() -> Vec<OutputFormat> {
    vec![OutputFormat::Markdown]
}

impl ScrapeOptions {
    #[must_use]
    pub fn new(url: impl Into<String>, engine: Engine) -> Self {
        Self {
            url: url.into(),
            engine,
            proxy: None,
            formats: default_formats(),
            timeout_ms: None,
            retry: None,
            wait_for_ms: None,
            include_tags: Vec::new(),
            exclude_tags: Vec::new(),
            json_options: None,
        }
    }

    #[must_use]
    pub fn effective_timeout_ms(&self) -> u64 {
        clamp_timeout_ms(self.timeout_ms)
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.retry.unwrap_or(3).clamp(1, 3)
    }

    /// Whether the JSON extraction step runs for this request.
    #[must_use]
    pub fn wants_json_extraction(&self) -> bool {
        self.json_options.is_some() && self.formats.contains(&OutputFormat::Json)
    }

    /// Shape validation applied before any job is created.
    pub fn validate(&self) -> Result<(), String> {
        let url = url::Url::parse(&self.url).map_err(|e| format!("invalid url: {e}"))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(format!("unsupported scheme: {}", url.scheme()));
        }
        if self.formats.is_empty() {
            return Err("at least one output format is required".to_string());
        }
        if self.formats.iter().any(OutputFormat::needs_browser) && !self.engine.is_browser() {
            return Err("screenshot formats require a browser engine".to_string());
        }
        if self.json_options.is_some() && !self.formats.contains(&OutputFormat::Json) {
            return Err("json_options requires the json format".to_string());
        }
        Ok(())
    }
}

/// Scope strategy constraining which discovered URLs a crawl admits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScopeStrategy {
    All,
    #[default]
    SameDomain,
    SameHostname,
    SameOrigin,
}

/// Validated crawl request: a scrape template plus frontier configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlOptions {
    /// Template applied to every fetched page.
    #[serde(flatten)]
    pub scrape: ScrapeOptions,
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,
    #[serde(default = "default_max_discovery_depth")]
    pub max_discovery_depth: u32,
    #[serde(default = "default_limit")]
    pub limit: u64,
    #[serde(default)]
    pub strategy: ScopeStrategy,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include_paths: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude_paths: Vec<String>,
    #[serde(default)]
    pub ignore_sitemap: bool,
    #[serde(default)]
    pub ignore_query_parameters: bool,
    /// Politeness delay between admissions, milliseconds.
    #[serde(default)]
    pub delay_ms: u64,
    #[serde(default)]
    pub allow_external_links: bool,
    #[serde(default)]
    pub allow_subdomains: bool,
}

fn default_max_depth() -> u32 {
    10
}

fn default_max_discovery_depth() -> u32 {
    10
}

fn default_limit() -> u64 {
    10_000
}

impl CrawlOptions {
    #[must_use]
    pub fn new(scrape: ScrapeOptions) -> Self {
        Self {
            scrape,
            max_depth: default_max_depth(),
            max_discovery_depth: default_max_discovery_depth(),
            limit: default_limit(),
            strategy: ScopeStrategy::default(),
            include_paths: Vec::new(),
            exclude_paths: Vec::new(),
            ignore_sitemap: false,
            ignore_query_parameters: false,
            delay_ms: 0,
            allow_external_links: false,
            allow_subdomains: false,
        }
    }

    /// Clamp user-supplied bounds into the supported ranges.
    pub fn clamp(&mut self) {
        self.max_depth = self.max_depth.min(50);
        self.max_discovery_depth = self.max_discovery_depth.min(100);
        self.limit = self.limit.min(50_000);
        self.delay_ms = self.delay_ms.min(60_000);
    }
}

/// Search engines the orchestrator can harvest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchProvider {
    #[default]
    Google,
    Duckduckgo,
}

impl SearchProvider {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::Duckduckgo => "duckduckgo",
        }
    }
}

/// Validated search-harvest request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchOptions {
    pub query: String,
    #[serde(default)]
    pub provider: SearchProvider,
    /// Rendering engine used to fetch result pages.
    #[serde(default = "default_engine")]
    pub engine: Engine,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(default)]
    pub offset: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pages: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub safe_search: Option<bool>,
}

impl SearchOptions {
    /// Pages to harvest: derived from `limit` when set (10 results/page),
    /// else the explicit page count, else 1.
    #[must_use]
    pub fn effective_pages(&self) -> u32 {
        match self.limit {
            Some(limit) if limit > 0 => limit.div_ceil(10),
            _ => self.pages.unwrap_or(1).max(1),
        }
    }
}

/// One harvested search result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub rank: usize,
    pub title: String,
    pub url: String,
    pub snippet: String,
    /// SERP page the result came from (1-based).
    pub page: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_clamping() {
        assert_eq!(clamp_timeout_ms(None), 30_000);
        assert_eq!(clamp_timeout_ms(Some(10)), 1_000);
        assert_eq!(clamp_timeout_ms(Some(1_000_000)), 600_000);
        assert_eq!(clamp_timeout_ms(Some(5_000)), 5_000);
    }

    #[test]
    fn format_serde_names() {
        let f: OutputFormat = serde_json::from_str("\"screenshot@fullPage\"").unwrap();
        assert_eq!(f, OutputFormat::ScreenshotFullPage);
        assert_eq!(serde_json::to_string(&OutputFormat::RawHtml).unwrap(), "\"rawHtml\"");
    }

    #[test]
    fn effective_pages_prefers_limit() {
        let mut opts = SearchOptions {
            query: "rust".into(),
            provider: SearchProvider::Google,
            engine: Engine::Static,
            limit: Some(25),
            offset: 0,
            pages: Some(9),
            lang: None,
            country: None,
            safe_search: None,
        };
        assert_eq!(opts.effective_pages(), 3);
        opts.limit = None;
        assert_eq!(opts.effective_pages(), 9);
        opts.pages = None;
        assert_eq!(opts.effective_pages(), 1);
    }

    #[test]
    fn crawl_clamp_enforces_caps() {
        let mut opts = CrawlOptions::new(ScrapeOptions::new("https://example.com", Engine::Static));
        opts.max_depth = 80;
        opts.limit = 200_000;
        opts.delay_ms = 120_000;
        opts.clamp();
        assert_eq!(opts.max_depth, 50);
        assert_eq!(opts.limit, 50_000);
        assert_eq!(opts.delay_ms, 60_000);
    }
}
