//! Per-request proxy routing.
//!
//! Resolution order, first hit wins:
//! 1. a per-request proxy supplied by the caller (validated),
//! 2. a match from the loaded rules file (`url` > `pattern` > `domain`),
//! 3. the tiered fallback list driven by the per-hostname tier tracker.
//!
//! Returns no proxy at all when neither a rule nor a tier is configured.

pub mod rules;
pub mod tiers;

use anyhow::{Context, Result};
use std::path::Path;
use tracing::debug;
use url::Url;

pub use rules::RuleSet;
pub use tiers::TierTracker;

use crate::error::kind;

/// Error raised when the rules file is unusable.
#[derive(Debug, thiserror::Error)]
#[error("{}: {message}", kind::PROXY_UNAVAILABLE)]
pub struct ProxyUnavailable {
    pub message: String,
}

/// One resolved proxy choice. `tier` is set only when the tiered fallback
/// list made the choice, so the caller can report errors back to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxySelection {
    pub url: String,
    pub tier: Option<usize>,
}

/// Routes each outbound request to at most one proxy URL.
#[derive(Debug)]
pub struct ProxyRouter {
    rules: Option<RuleSet>,
    tiers: Vec<String>,
    tracker: TierTracker,
}

impl ProxyRouter {
    #[must_use]
    pub fn new(tiers: Vec<String>, rules: Option<RuleSet>) -> Self {
        let tracker = TierTracker::new(tiers.len());
        Self { rules, tiers, tracker }
    }

    /// Build a router from the configured tier list and optional rules file.
    pub fn from_config(tiers: Vec<String>, rules_path: Option<&Path>) -> Result<Self> {
        let rules = match rules_path {
            Some(path) => {
                let set = RuleSet::load(path)
                    .with_context(|| format!("loading proxy rules from {}", path.display()))?;
                Some(set)
            }
            None => None,
        };
        Ok(Self::new(tiers, rules))
    }

    /// Resolve the proxy for one outbound request.
    ///
    /// `per_request` wins when present (after validation); then rules; then
    /// the tier tracker. `pin` forces a specific tier when the tiered list
    /// is consulted.
    pub fn resolve(
        &self,
        target: &Url,
        per_request: Option<&str>,
        pin: Option<usize>,
    ) -> Result<Option<ProxySelection>, ProxyUnavailable> {
        if let Some(raw) = per_request {
            let validated = validate_proxy_url(raw).map_err(|e| ProxyUnavailable {
                message: format!("invalid per-request proxy: {e}"),
            })?;
            return Ok(Some(ProxySelection { url: validated, tier: None }));
        }

        if let Some(rules) = &self.rules
            && let Some(proxy) = rules.lookup(target)
        {
            debug!(url = %target, proxy = %proxy, "proxy rule matched");
            return Ok(Some(ProxySelection { url: proxy.to_string(), tier: None }));
        }

        if self.tiers.is_empty() {
            return Ok(None);
        }

        let host = target.host_str().unwrap_or_default();
        let tier = self.tracker.pick(host, pin);
        Ok(Some(ProxySelection { url: self.tiers[tier].clone(), tier: Some(tier) }))
    }

    /// Report a proxy failure observed on `tier` for `host` so the tracker
    /// steers subsequent requests away from it.
    pub fn report_error(&self, host: &str, tier: usize) {
        self.tracker.record_error(host, tier);
    }

    #[must_use]
    pub fn tier_count(&self) -> usize {
        self.tiers.len()
    }
}

/// Accept http/https/socks5 proxy URLs only.
fn validate_proxy_url(raw: &str) -> Result<String> {
    let parsed = Url::parse(raw).with_context(|| format!("unparseable proxy URL: {raw}"))?;
    match parsed.scheme() {
        "http" | "https" | "socks5" | "socks5h" => Ok(parsed.to_string()),
        other => anyhow::bail!("unsupported proxy scheme: {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(u: &str) -> Url {
        Url::parse(u).unwrap()
    }

    #[test]
    fn per_request_proxy_wins() {
        let router = ProxyRouter::new(vec!["http://tier0:8080".into()], None);
        let sel = router
            .resolve(&target("https://example.com"), Some("socks5://user:pw@p:1080"), None)
            .unwrap()
            .unwrap();
        assert!(sel.url.starts_with("socks5://"));
        assert_eq!(sel.tier, None);
    }

    #[test]
    fn invalid_per_request_proxy_is_rejected() {
        let router = ProxyRouter::new(Vec::new(), None);
        let err = router
            .resolve(&target("https://example.com"), Some("ftp://nope"), None)
            .unwrap_err();
        assert!(err.to_string().contains("PROXY_UNAVAILABLE"));
    }

    #[test]
    fn no_configuration_means_no_proxy() {
        let router = ProxyRouter::new(Vec::new(), None);
        assert_eq!(router.resolve(&target("https://example.com"), None, None).unwrap(), None);
    }

    #[test]
    fn tier_fallback_is_deterministic() {
        let router = ProxyRouter::new(
            vec!["http://t0:1".into(), "http://t1:1".into(), "http://t2:1".into()],
            None,
        );
        let a = router.resolve(&target("https://example.com"), None, None).unwrap().unwrap();
        let b = router.resolve(&target("https://example.com"), None, None).unwrap().unwrap();
        assert_eq!(a.url, b.url);
    }

    #[test]
    fn pinned_tier_is_honored() {
        let router =
            ProxyRouter::new(vec!["http://t0:1".into(), "http://t1:1".into()], None);
        let sel = router
            .resolve(&target("https://example.com"), None, Some(1))
            .unwrap()
            .unwrap();
        assert_eq!(sel.tier, Some(1));
        assert_eq!(sel.url, "http://t1:1");
    }
}
