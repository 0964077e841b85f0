//! URL normalization and scoping helpers used by discovery and the proxy
//! router.

use url::Url;

/// Check if a URL is worth fetching at all.
///
/// Skips data/javascript/mailto and anything that is not http(s).
#[must_use]
pub fn is_fetchable_url(url: &str) -> bool {
    if url.is_empty() {
        return false;
    }

    if url.starts_with("data:") || url.starts_with("javascript:") || url.starts_with("mailto:") {
        return false;
    }

    match Url::parse(url) {
        Ok(parsed) => matches!(parsed.scheme(), "http" | "https"),
        Err(_) => false,
    }
}

/// Resolve a discovered href against its page URL and normalize it.
///
/// Fragments are always dropped; the query string is dropped when
/// `strip_query` is set. Returns None for unparseable or non-http targets.
#[must_use]
pub fn resolve_discovered(base: &Url, href: &str, strip_query: bool) -> Option<Url> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let mut resolved = base.join(href).ok()?;
    if !matches!(resolved.scheme(), "http" | "https") {
        return None;
    }

    resolved.set_fragment(None);
    if strip_query {
        resolved.set_query(None);
    }

    Some(resolved)
}

/// Canonical form used for dedup: lowercase host, no fragment, no trailing
/// slash on the root path.
#[must_use]
pub fn normalize_for_dedup(url: &Url) -> String {
    let mut s = url.as_str().to_string();
    if url.path() == "/" && url.query().is_none() && s.ends_with('/') {
        s.pop();
    }
    s
}

/// Multi-label public suffixes that make `last two labels` wrong. This is a
/// pragmatic subset, not a full public-suffix list; see DESIGN.md.
const MULTI_LABEL_SUFFIXES: &[&str] = &[
    "co.uk", "org.uk", "ac.uk", "gov.uk", "me.uk", "net.uk",
    "com.au", "net.au", "org.au", "edu.au", "gov.au",
    "co.jp", "ne.jp", "or.jp", "ac.jp", "go.jp",
    "com.br", "net.br", "org.br", "gov.br",
    "co.nz", "net.nz", "org.nz",
    "co.in", "net.in", "org.in", "gov.in",
    "com.cn", "net.cn", "org.cn", "gov.cn",
    "co.kr", "or.kr", "go.kr",
    "com.mx", "org.mx",
    "com.sg", "com.hk", "com.tw", "com.tr", "com.ar",
    "co.za", "org.za",
];

/// Registrable domain of a hostname: the label directly below the public
/// suffix, e.g. `blog.example.co.uk` → `example.co.uk`.
#[must_use]
pub fn registrable_domain(host: &str) -> String {
    let host = host.trim_end_matches('.').to_ascii_lowercase();

    // IP literals have no registrable domain; compare them verbatim.
    if host.parse::<std::net::IpAddr>().is_ok() {
        return host;
    }

    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() <= 2 {
        return host;
    }

    let last_two = labels[labels.len() - 2..].join(".");
    let suffix_len = if MULTI_LABEL_SUFFIXES.contains(&last_two.as_str()) { 3 } else { 2 };

    if labels.len() <= suffix_len {
        host
    } else {
        labels[labels.len() - suffix_len..].join(".")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetchable_filters_schemes() {
        assert!(is_fetchable_url("https://example.com/a"));
        assert!(!is_fetchable_url("javascript:void(0)"));
        assert!(!is_fetchable_url("mailto:x@example.com"));
        assert!(!is_fetchable_url("ftp://example.com"));
        assert!(!is_fetchable_url(""));
    }

    #[test]
    fn resolve_handles_relative_and_fragments() {
        let base = Url::parse("https://example.com/docs/index.html").unwrap();
        let r = resolve_discovered(&base, "../about?x=1#top", false).unwrap();
        assert_eq!(r.as_str(), "https://example.com/about?x=1");
        let r = resolve_discovered(&base, "../about?x=1", true).unwrap();
        assert_eq!(r.as_str(), "https://example.com/about");
        assert!(resolve_discovered(&base, "#section", false).is_none());
        assert!(resolve_discovered(&base, "javascript:void(0)", false).is_none());
    }

    #[test]
    fn registrable_domain_handles_multi_label_suffixes() {
        assert_eq!(registrable_domain("blog.example.co.uk"), "example.co.uk");
        assert_eq!(registrable_domain("www.example.com"), "example.com");
        assert_eq!(registrable_domain("example.com"), "example.com");
        assert_eq!(registrable_domain("localhost"), "localhost");
        assert_eq!(registrable_domain("127.0.0.1"), "127.0.0.1");
        assert_eq!(registrable_domain("a.b.c.example.com"), "example.com");
    }
}
