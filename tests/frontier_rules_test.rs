//! Admission rules: scope strategies, path globs, URL normalization and
//! the parts of discovery that don't need a live frontier.

use url::Url;

use anycrawl::frontier::ScopeFilter;
use anycrawl::types::{CrawlOptions, Engine, ScopeStrategy, ScrapeOptions};
use anycrawl::utils::url::{normalize_for_dedup, registrable_domain, resolve_discovered};

fn crawl(strategy: ScopeStrategy) -> CrawlOptions {
    let mut options =
        CrawlOptions::new(ScrapeOptions::new("https://example.com/docs/", Engine::Static));
    options.strategy = strategy;
    options
}

fn url(u: &str) -> Url {
    Url::parse(u).unwrap()
}

#[test]
fn every_admitted_url_passes_scope_and_filters() {
    let mut options = crawl(ScopeStrategy::SameDomain);
    options.include_paths = vec!["/docs/*".into()];
    options.exclude_paths = vec!["/docs/archive/*".into()];
    let seed = url("https://example.com/docs/");
    let filter = ScopeFilter::new(&seed, &options).unwrap();

    let candidates = [
        ("https://example.com/docs/intro", true),
        ("https://api.example.com/docs/ref", true),
        ("https://example.com/blog/post", false),
        ("https://example.com/docs/archive/2019", false),
        ("https://unrelated.io/docs/x", false),
    ];
    for (candidate, expected) in candidates {
        assert_eq!(filter.admits(&url(candidate)), expected, "{candidate}");
    }
}

#[test]
fn query_stripping_is_optional() {
    let base = url("https://example.com/list");
    let with_query = resolve_discovered(&base, "page?sort=asc&p=2", false).unwrap();
    assert_eq!(with_query.as_str(), "https://example.com/page?sort=asc&p=2");

    let stripped = resolve_discovered(&base, "page?sort=asc&p=2", true).unwrap();
    assert_eq!(stripped.as_str(), "https://example.com/page");
}

#[test]
fn dedup_normalization_is_stable() {
    let a = normalize_for_dedup(&url("https://example.com/"));
    let b = normalize_for_dedup(&url("https://example.com"));
    assert_eq!(a, b);

    let c = normalize_for_dedup(&url("https://example.com/a"));
    assert_eq!(c, "https://example.com/a");
}

#[test]
fn registrable_domain_drives_same_domain_scope() {
    assert_eq!(registrable_domain("deep.sub.example.co.uk"), "example.co.uk");

    let options = crawl(ScopeStrategy::SameDomain);
    let seed = url("https://www.example.co.uk/");
    let filter = ScopeFilter::new(&seed, &options).unwrap();
    assert!(filter.admits(&url("https://shop.example.co.uk/items")));
    assert!(!filter.admits(&url("https://example.org.uk/items")));
}

#[test]
fn depth_bounds_are_clamped_at_request_validation() {
    let mut options = crawl(ScopeStrategy::All);
    options.max_depth = 500;
    options.max_discovery_depth = 500;
    options.limit = 1_000_000;
    options.clamp();
    assert_eq!(options.max_depth, 50);
    assert_eq!(options.max_discovery_depth, 100);
    assert_eq!(options.limit, 50_000);
}
