//! SERP URL construction per search provider.

use url::Url;

use crate::types::{SearchOptions, SearchProvider};

/// Nominal results per SERP page (drives `limit` → page math).
pub const RESULTS_PER_PAGE: u32 = 10;

/// Build the request URL for one SERP page (1-based).
#[must_use]
pub fn build_serp_url(options: &SearchOptions, page: u32) -> Url {
    let page = page.max(1);
    match options.provider {
        SearchProvider::Google => google_url(options, page),
        SearchProvider::Duckduckgo => duckduckgo_url(options, page),
    }
}

fn google_url(options: &SearchOptions, page: u32) -> Url {
    let mut url = Url::parse("https://www.google.com/search").expect("static URL");
    {
        let mut qp = url.query_pairs_mut();
        qp.append_pair("q", &options.query);
        let start = (page - 1) * RESULTS_PER_PAGE + options.offset;
        if start > 0 {
            qp.append_pair("start", &start.to_string());
        }
        if let Some(lang) = &options.lang {
            qp.append_pair("hl", lang);
        }
        if let Some(country) = &options.country {
            qp.append_pair("gl", country);
        }
        if let Some(safe) = options.safe_search {
            qp.append_pair("safe", if safe { "active" } else { "off" });
        }
    }
    url
}

fn duckduckgo_url(options: &SearchOptions, page: u32) -> Url {
    let mut url = Url::parse("https://html.duckduckgo.com/html/").expect("static URL");
    {
        let mut qp = url.query_pairs_mut();
        qp.append_pair("q", &options.query);
        let offset = (page - 1) * RESULTS_PER_PAGE + options.offset;
        if offset > 0 {
            qp.append_pair("s", &offset.to_string());
        }
        if let (Some(lang), Some(country)) = (&options.lang, &options.country) {
            qp.append_pair("kl", &format!("{country}-{lang}"));
        }
        if let Some(safe) = options.safe_search {
            qp.append_pair("kp", if safe { "1" } else { "-2" });
        }
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Engine;

    fn options(provider: SearchProvider) -> SearchOptions {
        SearchOptions {
            query: "rust async".into(),
            provider,
            engine: Engine::Static,
            limit: None,
            offset: 0,
            pages: None,
            lang: Some("en".into()),
            country: Some("us".into()),
            safe_search: Some(true),
        }
    }

    #[test]
    fn google_paging_uses_start() {
        let url = build_serp_url(&options(SearchProvider::Google), 3);
        let query = url.query().unwrap();
        assert!(query.contains("q=rust+async"));
        assert!(query.contains("start=20"));
        assert!(query.contains("hl=en"));
        assert!(query.contains("safe=active"));
    }

    #[test]
    fn first_page_omits_offset() {
        let url = build_serp_url(&options(SearchProvider::Google), 1);
        assert!(!url.query().unwrap().contains("start="));
    }

    #[test]
    fn duckduckgo_uses_html_endpoint() {
        let url = build_serp_url(&options(SearchProvider::Duckduckgo), 2);
        assert!(url.as_str().starts_with("https://html.duckduckgo.com/html/"));
        assert!(url.query().unwrap().contains("s=10"));
        assert!(url.query().unwrap().contains("kl=us-en"));
    }
}
