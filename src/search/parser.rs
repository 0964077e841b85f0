//! SERP result extraction with per-provider CSS selectors.

use scraper::{Html, Selector};
use tracing::debug;

use crate::types::{SearchProvider, SearchResult};

struct SelectorSet {
    result: &'static str,
    title_link: &'static str,
    snippet: &'static str,
}

const GOOGLE: SelectorSet = SelectorSet {
    result: "div.g, div[data-sokoban-container]",
    title_link: "a h3",
    snippet: "div[data-sncf], div.VwiC3b",
};

const DUCKDUCKGO: SelectorSet = SelectorSet {
    result: "div.result, div.web-result",
    title_link: "a.result__a",
    snippet: "a.result__snippet, div.result__snippet",
};

/// Parse one SERP document into ranked results.
///
/// Lenient by design: a result without a resolvable link is skipped, a
/// missing snippet degrades to an empty string. SERP markup drifts; the
/// orchestrator treats an empty page as a completed page, not an error.
#[must_use]
pub fn parse_results(provider: SearchProvider, html: &str, page: u32) -> Vec<SearchResult> {
    let selectors = match provider {
        SearchProvider::Google => &GOOGLE,
        SearchProvider::Duckduckgo => &DUCKDUCKGO,
    };

    let document = Html::parse_document(html);
    let result_sel = Selector::parse(selectors.result).expect("static selector");
    let title_sel = Selector::parse(selectors.title_link).expect("static selector");
    let snippet_sel = Selector::parse(selectors.snippet).expect("static selector");
    let anchor_sel = Selector::parse("a[href]").expect("static selector");

    let mut results = Vec::new();
    for element in document.select(&result_sel) {
        let title_el = element.select(&title_sel).next();
        let Some(title_el) = title_el else { continue };
        let title = title_el.text().collect::<String>().trim().to_string();

        // The href lives on the title's anchor (Google nests h3 inside a).
        let href = title_el
            .value()
            .attr("href")
            .map(str::to_string)
            .or_else(|| {
                element
                    .select(&anchor_sel)
                    .next()
                    .and_then(|a| a.value().attr("href"))
                    .map(str::to_string)
            });
        let Some(href) = href else { continue };

        let url = normalize_result_url(&href);
        let Some(url) = url else { continue };

        let snippet = element
            .select(&snippet_sel)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .unwrap_or_default();

        results.push(SearchResult {
            rank: results.len() + 1,
            title,
            url,
            snippet,
            page,
        });
    }

    debug!(provider = provider.as_str(), page, count = results.len(), "parsed SERP");
    results
}

/// Unwrap redirect-style result links and reject non-http targets.
fn normalize_result_url(href: &str) -> Option<String> {
    // Google wraps results as /url?q=<target>&...
    if let Some(rest) = href.strip_prefix("/url?") {
        for pair in rest.split('&') {
            if let Some(value) = pair.strip_prefix("q=") {
                let decoded = urlencoding::decode(value).ok()?;
                return normalize_result_url(&decoded);
            }
        }
        return None;
    }

    // DuckDuckGo wraps results as //duckduckgo.com/l/?uddg=<target>
    if href.contains("duckduckgo.com/l/") {
        let query = href.split('?').nth(1)?;
        for pair in query.split('&') {
            if let Some(value) = pair.strip_prefix("uddg=") {
                let decoded = urlencoding::decode(value).ok()?;
                return normalize_result_url(&decoded);
            }
        }
        return None;
    }

    if href.starts_with("http://") || href.starts_with("https://") {
        return Some(href.to_string());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const DDG_PAGE: &str = r#"
    <div class="result">
        <a class="result__a" href="https://first.example.com/">First title</a>
        <a class="result__snippet" href="https://first.example.com/">First snippet text</a>
    </div>
    <div class="result">
        <a class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fsecond.example.com%2Fpage">Second</a>
    </div>
    <div class="result"><span>no link here</span></div>
    "#;

    #[test]
    fn duckduckgo_results_parse_and_unwrap_redirects() {
        let results = parse_results(SearchProvider::Duckduckgo, DDG_PAGE, 1);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].title, "First title");
        assert_eq!(results[0].url, "https://first.example.com/");
        assert_eq!(results[0].snippet, "First snippet text");
        assert_eq!(results[1].url, "https://second.example.com/page");
        assert_eq!(results[1].rank, 2);
    }

    #[test]
    fn google_redirect_urls_unwrap() {
        assert_eq!(
            normalize_result_url("/url?q=https%3A%2F%2Fexample.com%2Fa&sa=U"),
            Some("https://example.com/a".to_string())
        );
        assert_eq!(normalize_result_url("javascript:void(0)"), None);
    }

    #[test]
    fn empty_page_yields_no_results() {
        assert!(parse_results(SearchProvider::Google, "<html><body></body></html>", 1).is_empty());
    }
}
