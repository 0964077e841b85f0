//! Pure admission rules for discovered URLs.

use anyhow::{Context, Result};
use url::Url;

use crate::types::{CrawlOptions, ScopeStrategy};
use crate::utils::GlobSet;
use crate::utils::url::registrable_domain;

/// Compiled scope filter for one crawl job.
#[derive(Debug)]
pub struct ScopeFilter {
    seed: Url,
    seed_registrable: String,
    strategy: ScopeStrategy,
    include_paths: GlobSet,
    exclude_paths: GlobSet,
    allow_external_links: bool,
    allow_subdomains: bool,
}

impl ScopeFilter {
    pub fn new(seed: &Url, options: &CrawlOptions) -> Result<Self> {
        let include_paths =
            GlobSet::compile(&options.include_paths).context("compiling include_paths globs")?;
        let exclude_paths =
            GlobSet::compile(&options.exclude_paths).context("compiling exclude_paths globs")?;

        Ok(Self {
            seed_registrable: registrable_domain(seed.host_str().unwrap_or_default()),
            seed: seed.clone(),
            strategy: options.strategy,
            include_paths,
            exclude_paths,
            allow_external_links: options.allow_external_links,
            allow_subdomains: options.allow_subdomains,
        })
    }

    /// Scope strategy + include/exclude filters. Depth and limit are
    /// enforced by the frontier, not here.
    #[must_use]
    pub fn admits(&self, candidate: &Url) -> bool {
        if !self.in_scope(candidate) {
            return false;
        }

        let path = candidate.path();
        if !self.include_paths.is_empty() && !self.include_paths.matches(path) {
            return false;
        }
        if self.exclude_paths.matches(path) {
            return false;
        }

        true
    }

    fn in_scope(&self, candidate: &Url) -> bool {
        if self.allow_external_links {
            return true;
        }

        let host = candidate.host_str().unwrap_or_default();
        let seed_host = self.seed.host_str().unwrap_or_default();

        let same_registrable = registrable_domain(host) == self.seed_registrable;

        match self.strategy {
            ScopeStrategy::All => true,
            ScopeStrategy::SameDomain => same_registrable,
            ScopeStrategy::SameHostname => {
                host == seed_host || (self.allow_subdomains && same_registrable)
            }
            ScopeStrategy::SameOrigin => {
                let same_origin = candidate.scheme() == self.seed.scheme()
                    && host == seed_host
                    && candidate.port_or_known_default() == self.seed.port_or_known_default();
                same_origin || (self.allow_subdomains && same_registrable)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Engine, ScrapeOptions};

    fn options(strategy: ScopeStrategy) -> CrawlOptions {
        let mut o = CrawlOptions::new(ScrapeOptions::new("https://example.com/", Engine::Static));
        o.strategy = strategy;
        o
    }

    fn seed() -> Url {
        Url::parse("https://example.com/docs/").unwrap()
    }

    fn url(u: &str) -> Url {
        Url::parse(u).unwrap()
    }

    #[test]
    fn same_domain_accepts_registrable_matches() {
        let f = ScopeFilter::new(&seed(), &options(ScopeStrategy::SameDomain)).unwrap();
        assert!(f.admits(&url("https://example.com/a")));
        assert!(f.admits(&url("https://blog.example.com/a")));
        assert!(!f.admits(&url("https://other.org/a")));
    }

    #[test]
    fn same_hostname_rejects_subdomains_unless_allowed() {
        let mut opts = options(ScopeStrategy::SameHostname);
        let f = ScopeFilter::new(&seed(), &opts).unwrap();
        assert!(f.admits(&url("http://example.com/a")));
        assert!(!f.admits(&url("https://blog.example.com/a")));

        opts.allow_subdomains = true;
        let f = ScopeFilter::new(&seed(), &opts).unwrap();
        assert!(f.admits(&url("https://blog.example.com/a")));
    }

    #[test]
    fn same_origin_requires_scheme_host_port() {
        let f = ScopeFilter::new(&seed(), &options(ScopeStrategy::SameOrigin)).unwrap();
        assert!(f.admits(&url("https://example.com/a")));
        assert!(!f.admits(&url("http://example.com/a")));
        assert!(!f.admits(&url("https://example.com:8443/a")));
    }

    #[test]
    fn all_is_unbounded_by_origin() {
        let f = ScopeFilter::new(&seed(), &options(ScopeStrategy::All)).unwrap();
        assert!(f.admits(&url("https://completely-unrelated.net/x")));
    }

    #[test]
    fn path_globs_filter_admission() {
        let mut opts = options(ScopeStrategy::SameDomain);
        opts.include_paths = vec!["/docs/*".into()];
        opts.exclude_paths = vec!["/docs/private/*".into()];
        let f = ScopeFilter::new(&seed(), &opts).unwrap();
        assert!(f.admits(&url("https://example.com/docs/intro")));
        assert!(!f.admits(&url("https://example.com/pricing")));
        assert!(!f.admits(&url("https://example.com/docs/private/key")));
    }

    #[test]
    fn external_links_override_scope() {
        let mut opts = options(ScopeStrategy::SameOrigin);
        opts.allow_external_links = true;
        let f = ScopeFilter::new(&seed(), &opts).unwrap();
        assert!(f.admits(&url("https://elsewhere.io/page")));
    }
}
