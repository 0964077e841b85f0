//! Cleaned-HTML production: tag filtering and URL rewriting.
//!
//! `include_tags` narrows the document to matching subtrees (CSS
//! selectors); `exclude_tags` removes matching subtrees; relative URLs in
//! common attributes are rewritten against the page base. Cleaning is
//! idempotent, which keeps markdown conversion stable under re-cleaning.

use lol_html::html_content::Element;
use lol_html::{ElementContentHandlers, RewriteStrSettings, Selector, rewrite_str};
use scraper::Html;
use std::borrow::Cow;
use tracing::warn;
use url::Url;

use crate::error::ExtractError;

/// Tags dropped from cleaned HTML unconditionally.
const ALWAYS_EXCLUDED: &[&str] = &["script", "style", "noscript", "template", "iframe"];

/// Attributes rewritten to absolute URLs.
const URL_ATTRIBUTES: &[(&str, &str)] = &[
    ("a", "href"),
    ("img", "src"),
    ("link", "href"),
    ("source", "src"),
    ("video", "src"),
    ("audio", "src"),
];

/// Produce the cleaned HTML for the `html` format.
pub fn clean_html(
    raw_html: &str,
    include_tags: &[String],
    exclude_tags: &[String],
    base: &Url,
) -> Result<String, ExtractError> {
    let scoped = if include_tags.is_empty() {
        Cow::Borrowed(raw_html)
    } else {
        Cow::Owned(select_included(raw_html, include_tags))
    };

    rewrite(&scoped, exclude_tags, base)
        .map_err(|e| ExtractError::new("clean_html", format!("html rewrite failed: {e}")))
}

/// Keep only subtrees matching the include selectors, in document order.
fn select_included(raw_html: &str, include_tags: &[String]) -> String {
    let document = Html::parse_document(raw_html);
    let mut kept = String::new();

    for tag in include_tags {
        match scraper::Selector::parse(tag) {
            Ok(selector) => {
                for el in document.select(&selector) {
                    kept.push_str(&el.html());
                    kept.push('\n');
                }
            }
            Err(e) => warn!(selector = %tag, "ignoring invalid include selector: {e}"),
        }
    }

    kept
}

fn rewrite(
    html: &str,
    exclude_tags: &[String],
    base: &Url,
) -> Result<String, lol_html::errors::RewritingError> {
    let mut handlers: Vec<(Cow<'_, Selector>, ElementContentHandlers<'_>)> = Vec::new();

    for tag in ALWAYS_EXCLUDED.iter().copied().map(str::to_string).chain(exclude_tags.iter().cloned())
    {
        match tag.parse::<Selector>() {
            Ok(selector) => {
                handlers.push((
                    Cow::Owned(selector),
                    ElementContentHandlers::default().element(|el: &mut Element| {
                        el.remove();
                        Ok(())
                    }),
                ));
            }
            Err(e) => warn!(selector = %tag, "ignoring invalid exclude selector: {e}"),
        }
    }

    for (tag, attr) in URL_ATTRIBUTES {
        let selector = format!("{tag}[{attr}]")
            .parse::<Selector>()
            .expect("static selector");
        let base = base.clone();
        let attr_name = *attr;
        handlers.push((
            Cow::Owned(selector),
            ElementContentHandlers::default().element(move |el: &mut Element| {
                if let Some(value) = el.get_attribute(attr_name)
                    && !value.starts_with('#')
                    && !value.starts_with("data:")
                    && !value.starts_with("javascript:")
                    && !value.starts_with("mailto:")
                    && let Ok(resolved) = base.join(&value)
                {
                    el.set_attribute(attr_name, resolved.as_str())?;
                }
                Ok(())
            }),
        ));
    }

    rewrite_str(
        html,
        RewriteStrSettings { element_content_handlers: handlers, ..RewriteStrSettings::default() },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://example.com/docs/page.html").unwrap()
    }

    #[test]
    fn scripts_are_always_removed() {
        let html = r#"<p>keep</p><script>drop()</script><style>.x{}</style>"#;
        let cleaned = clean_html(html, &[], &[], &base()).unwrap();
        assert!(cleaned.contains("keep"));
        assert!(!cleaned.contains("drop()"));
        assert!(!cleaned.contains(".x{}"));
    }

    #[test]
    fn relative_urls_are_rewritten() {
        let html = r#"<a href="../about">About</a><img src="logo.png">"#;
        let cleaned = clean_html(html, &[], &[], &base()).unwrap();
        assert!(cleaned.contains(r#"href="https://example.com/about""#));
        assert!(cleaned.contains(r#"src="https://example.com/docs/logo.png""#));
    }

    #[test]
    fn include_tags_scope_the_document() {
        let html = r#"<div class="main"><p>wanted</p></div><footer>unwanted</footer>"#;
        let cleaned = clean_html(html, &["div.main".into()], &[], &base()).unwrap();
        assert!(cleaned.contains("wanted"));
        assert!(!cleaned.contains("unwanted"));
    }

    #[test]
    fn exclude_tags_remove_subtrees() {
        let html = r#"<article>body</article><nav><a href="/x">menu</a></nav>"#;
        let cleaned = clean_html(html, &[], &["nav".into()], &base()).unwrap();
        assert!(cleaned.contains("body"));
        assert!(!cleaned.contains("menu"));
    }

    #[test]
    fn cleaning_is_idempotent() {
        let html = r#"<div><a href="a.html">x</a><script>s</script></div>"#;
        let once = clean_html(html, &[], &[], &base()).unwrap();
        let twice = clean_html(&once, &[], &[], &base()).unwrap();
        assert_eq!(once, twice);
    }
}
