//! Proxy routing rules loaded from a JSON file.
//!
//! Each rule names a proxy plus exactly one matcher: an exact `url`, a
//! `pattern` glob over the full URL, or a `domain` glob over the hostname.
//! Precedence on lookup: url > pattern > domain.

use anyhow::{Context, Result, bail};
use regex::Regex;
use serde::Deserialize;
use std::path::Path;
use url::Url;

use crate::utils::glob;

#[derive(Debug, Deserialize)]
struct RawRule {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    pattern: Option<String>,
    #[serde(default)]
    domain: Option<String>,
    proxy: String,
}

#[derive(Debug)]
struct ExactRule {
    url: String,
    proxy: String,
}

#[derive(Debug)]
struct GlobRule {
    matcher: Regex,
    proxy: String,
}

/// Compiled rule set with precedence buckets.
#[derive(Debug, Default)]
pub struct RuleSet {
    exact: Vec<ExactRule>,
    patterns: Vec<GlobRule>,
    domains: Vec<GlobRule>,
}

impl RuleSet {
    /// Load and compile a rules file. Any malformed entry fails the whole
    /// load (`PROXY_UNAVAILABLE` at the router).
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let rules: Vec<RawRule> = serde_json::from_str(raw).context("parsing proxy rules JSON")?;

        let mut set = Self::default();
        for (idx, rule) in rules.into_iter().enumerate() {
            if rule.proxy.trim().is_empty() {
                bail!("rule #{idx}: empty proxy");
            }
            Url::parse(&rule.proxy).with_context(|| format!("rule #{idx}: invalid proxy URL"))?;

            match (rule.url, rule.pattern, rule.domain) {
                (Some(url), None, None) => {
                    set.exact.push(ExactRule { url: url.to_ascii_lowercase(), proxy: rule.proxy });
                }
                (None, Some(pattern), None) => {
                    let matcher = glob::compile(&pattern)
                        .with_context(|| format!("rule #{idx}: bad pattern glob"))?;
                    set.patterns.push(GlobRule { matcher, proxy: rule.proxy });
                }
                (None, None, Some(domain)) => {
                    let matcher = glob::compile(&domain)
                        .with_context(|| format!("rule #{idx}: bad domain glob"))?;
                    set.domains.push(GlobRule { matcher, proxy: rule.proxy });
                }
                _ => bail!("rule #{idx}: exactly one of url/pattern/domain is required"),
            }
        }

        Ok(set)
    }

    /// Find the proxy for a target URL, if any rule matches.
    #[must_use]
    pub fn lookup(&self, target: &Url) -> Option<&str> {
        let full = target.as_str().to_ascii_lowercase();
        if let Some(rule) = self.exact.iter().find(|r| r.url == full) {
            return Some(&rule.proxy);
        }

        if let Some(rule) = self.patterns.iter().find(|r| r.matcher.is_match(target.as_str())) {
            return Some(&rule.proxy);
        }

        let host = target.host_str()?;
        self.domains
            .iter()
            .find(|r| r.matcher.is_match(host))
            .map(|r| r.proxy.as_str())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.exact.len() + self.patterns.len() + self.domains.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RULES: &str = r#"[
        {"url": "https://exact.example.com/page", "proxy": "http://p-exact:8080"},
        {"pattern": "https://*.shop.example.com/*", "proxy": "http://p-pattern:8080"},
        {"domain": "*.example.org", "proxy": "http://p-domain:8080"}
    ]"#;

    fn target(u: &str) -> Url {
        Url::parse(u).unwrap()
    }

    #[test]
    fn precedence_url_over_pattern_over_domain() {
        let set = RuleSet::parse(RULES).unwrap();
        assert_eq!(
            set.lookup(&target("https://exact.example.com/page")),
            Some("http://p-exact:8080")
        );
        assert_eq!(
            set.lookup(&target("https://eu.shop.example.com/cart")),
            Some("http://p-pattern:8080")
        );
        assert_eq!(
            set.lookup(&target("https://docs.example.org/intro")),
            Some("http://p-domain:8080")
        );
        assert_eq!(set.lookup(&target("https://unrelated.net/")), None);
    }

    #[test]
    fn exact_match_is_case_insensitive() {
        let set = RuleSet::parse(RULES).unwrap();
        assert_eq!(
            set.lookup(&target("https://EXACT.example.com/page")),
            Some("http://p-exact:8080")
        );
    }

    #[test]
    fn malformed_rules_fail_the_load() {
        assert!(RuleSet::parse("not json").is_err());
        assert!(RuleSet::parse(r#"[{"proxy": "http://p:1"}]"#).is_err());
        assert!(
            RuleSet::parse(r#"[{"url": "https://a", "domain": "b", "proxy": "http://p:1"}]"#)
                .is_err()
        );
        assert!(RuleSet::parse(r#"[{"domain": "x", "proxy": "not a url"}]"#).is_err());
    }
}
