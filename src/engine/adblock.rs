//! Ad and tracker blocking for the browser engines.
//!
//! Applies `Network.setBlockedURLs` with wildcard patterns built from a
//! built-in domain blocklist; requests whose URL contains any of these
//! domains are aborted by the browser before they hit the network.

use anyhow::{Context, Result};
use chromiumoxide::Page;
use chromiumoxide::cdp::browser_protocol::network::{EnableParams, SetBlockedUrLsParams};

/// Domains whose requests are aborted on browser engines.
pub const BLOCKED_DOMAINS: &[&str] = &[
    "doubleclick.net",
    "googlesyndication.com",
    "googleadservices.com",
    "google-analytics.com",
    "googletagmanager.com",
    "googletagservices.com",
    "adservice.google.com",
    "amazon-adsystem.com",
    "facebook.net",
    "connect.facebook.net",
    "scorecardresearch.com",
    "quantserve.com",
    "outbrain.com",
    "taboola.com",
    "criteo.com",
    "adnxs.com",
    "rubiconproject.com",
    "pubmatic.com",
    "moatads.com",
    "hotjar.com",
    "mixpanel.com",
    "segment.io",
];

/// Install the blocklist on a page. Must run before navigation.
pub async fn apply(page: &Page) -> Result<()> {
    page.execute(EnableParams::default())
        .await
        .context("enabling network domain")?;

    let patterns: Vec<String> = BLOCKED_DOMAINS.iter().map(|d| format!("*{d}*")).collect();
    page.execute(SetBlockedUrLsParams::new(patterns))
        .await
        .context("setting blocked URL patterns")?;

    Ok(())
}

/// Whether a URL would be blocked (used by the static engine's discovery
/// filter and in tests; the browser enforces the list natively).
#[must_use]
pub fn is_blocked(url: &str) -> bool {
    BLOCKED_DOMAINS.iter().any(|d| url.contains(d))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocklist_matches_substrings() {
        assert!(is_blocked("https://stats.google-analytics.com/collect"));
        assert!(is_blocked("https://cdn.taboola.com/libtrc/x/loader.js"));
        assert!(!is_blocked("https://example.com/analytics-dashboard"));
    }
}
