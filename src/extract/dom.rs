//! Synchronous DOM parsing helpers.
//!
//! `scraper::Html` is not `Send`, so all DOM work happens inside these
//! synchronous functions; only owned data crosses await points.

use scraper::{Html, Selector};
use std::collections::BTreeMap;

/// Parsed page facts needed by the extractor and the frontier.
#[derive(Debug, Clone, Default)]
pub struct DomSummary {
    pub title: String,
    /// Every `<meta>` with a name or property and non-empty content.
    pub metadata: BTreeMap<String, String>,
    /// Raw href values of anchors, unresolved.
    pub links: Vec<String>,
    /// `<base href>` when present.
    pub base_href: Option<String>,
}

/// Parse a document and pull out title, metadata, links and base href.
#[must_use]
pub fn summarize(html: &str) -> DomSummary {
    let document = Html::parse_document(html);
    let mut summary = DomSummary::default();

    let title_sel = Selector::parse("title").expect("static selector");
    if let Some(el) = document.select(&title_sel).next() {
        summary.title = el.text().collect::<String>().trim().to_string();
    }

    let meta_sel = Selector::parse("meta").expect("static selector");
    for el in document.select(&meta_sel) {
        let key = el
            .value()
            .attr("name")
            .or_else(|| el.value().attr("property"));
        let content = el.value().attr("content").unwrap_or("");
        if let Some(key) = key
            && !content.is_empty()
        {
            summary.metadata.insert(key.to_string(), content.to_string());
        }
    }

    let anchor_sel = Selector::parse("a[href]").expect("static selector");
    for el in document.select(&anchor_sel) {
        if let Some(href) = el.value().attr("href") {
            summary.links.push(href.to_string());
        }
    }

    let base_sel = Selector::parse("base[href]").expect("static selector");
    if let Some(el) = document.select(&base_sel).next() {
        summary.base_href = el.value().attr("href").map(str::to_string);
    }

    summary
}

/// Plain-text rendering of a document: visible text nodes, whitespace
/// collapsed, script/style/noscript skipped.
#[must_use]
pub fn to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let body_sel = Selector::parse("body").expect("static selector");
    let skip_sel = Selector::parse("script, style, noscript, template").expect("static selector");

    let root_texts: Vec<String> = match document.select(&body_sel).next() {
        Some(body) => {
            let skipped: Vec<_> = body.select(&skip_sel).flat_map(|el| el.text()).collect();
            let mut all: Vec<&str> = body.text().collect();
            // scraper's text() walks into script/style too; subtract them.
            all.retain(|t| !skipped.contains(t));
            all.iter().map(|t| t.to_string()).collect()
        }
        None => document.root_element().text().map(str::to_string).collect(),
    };

    let mut out = String::new();
    for chunk in root_texts {
        let trimmed = chunk.trim();
        if trimmed.is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(trimmed);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><head>
        <title> Example Page </title>
        <base href="https://example.com/docs/">
        <meta name="description" content="A test page">
        <meta property="og:title" content="Example">
        <meta name="empty" content="">
        </head><body>
        <a href="/one">One</a>
        <a href="two.html">Two</a>
        <script>var x = "invisible";</script>
        <p>Hello <b>world</b></p>
        </body></html>"#;

    #[test]
    fn summarize_pulls_title_meta_links() {
        let s = summarize(PAGE);
        assert_eq!(s.title, "Example Page");
        assert_eq!(s.metadata.get("description").unwrap(), "A test page");
        assert_eq!(s.metadata.get("og:title").unwrap(), "Example");
        assert!(!s.metadata.contains_key("empty"));
        assert_eq!(s.links, vec!["/one", "two.html"]);
        assert_eq!(s.base_href.as_deref(), Some("https://example.com/docs/"));
    }

    #[test]
    fn text_skips_scripts_and_collapses_whitespace() {
        let text = to_text(PAGE);
        assert!(text.contains("Hello world"));
        assert!(!text.contains("invisible"));
    }
}
