//! Sitemap seeding for crawls.
//!
//! Fetches `{origin}/sitemap.xml`, follows nested sitemap indexes one
//! level deep, and returns the listed URLs. Parsing is a lightweight
//! `<loc>` scan; discovered URLs still pass the normal admission gate.

use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Nested sitemaps followed from an index file.
const MAX_NESTED_SITEMAPS: usize = 3;
/// URLs taken from sitemaps, before the frontier's own limit gate.
const MAX_SITEMAP_URLS: usize = 5_000;

static LOC_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<loc>\s*([^<\s][^<]*?)\s*</loc>").expect("static regex"));

fn extract_locs(xml: &str) -> Vec<String> {
    LOC_RE
        .captures_iter(xml)
        .map(|c| c[1].trim().to_string())
        .collect()
}

fn is_sitemap_index(xml: &str) -> bool {
    xml.contains("<sitemapindex")
}

/// Fetch and flatten the sitemap for a seed's origin. Failures degrade to
/// an empty list; sitemaps are an accelerator, not a requirement.
pub async fn fetch_sitemap_urls(seed: &Url, user_agent: &str) -> Vec<Url> {
    let origin = match seed.join("/sitemap.xml") {
        Ok(u) => u,
        Err(_) => return Vec::new(),
    };

    let client = match reqwest::Client::builder()
        .user_agent(user_agent)
        .timeout(Duration::from_secs(15))
        .build()
    {
        Ok(c) => c,
        Err(_) => return Vec::new(),
    };

    let Some(body) = fetch_text(&client, origin.as_str()).await else {
        return Vec::new();
    };

    let mut pages: Vec<String> = Vec::new();
    if is_sitemap_index(&body) {
        for nested in extract_locs(&body).into_iter().take(MAX_NESTED_SITEMAPS) {
            if let Some(nested_body) = fetch_text(&client, &nested).await {
                pages.extend(extract_locs(&nested_body));
            }
        }
    } else {
        pages = extract_locs(&body);
    }

    let urls: Vec<Url> = pages
        .into_iter()
        .take(MAX_SITEMAP_URLS)
        .filter_map(|raw| Url::parse(&raw).ok())
        .filter(|u| matches!(u.scheme(), "http" | "https"))
        .collect();

    debug!(seed = %seed, count = urls.len(), "sitemap seeding complete");
    urls
}

async fn fetch_text(client: &reqwest::Client, url: &str) -> Option<String> {
    let response = client.get(url).send().await.ok()?;
    if !response.status().is_success() {
        return None;
    }
    response.text().await.ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loc_extraction_handles_whitespace() {
        let xml = r"<urlset>
            <url><loc> https://example.com/a </loc></url>
            <url><loc>https://example.com/b</loc></url>
        </urlset>";
        assert_eq!(extract_locs(xml), vec!["https://example.com/a", "https://example.com/b"]);
    }

    #[test]
    fn index_detection() {
        assert!(is_sitemap_index(r#"<sitemapindex xmlns="x"><sitemap></sitemap></sitemapindex>"#));
        assert!(!is_sitemap_index("<urlset></urlset>"));
    }
}
