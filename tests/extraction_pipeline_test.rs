//! Extraction building blocks: DOM summary, cleaned HTML, markdown
//! stability, and the format-key contract.

use url::Url;

use anycrawl::extract::dom;
use anycrawl::extract::html_filter::clean_html;
use anycrawl::extract::markdown::to_markdown;
use anycrawl::types::OutputFormat;

const PAGE: &str = r#"<html>
<head>
    <title>Pricing – Example</title>
    <meta name="description" content="Plans and pricing">
    <meta property="og:type" content="website">
    <meta name="keywords" content="">
</head>
<body>
    <nav><a href="/home">Home</a></nav>
    <article>
        <h1>Pricing</h1>
        <p>Start with the <a href="signup">free tier</a>.</p>
        <img src="/img/chart.png" alt="chart">
    </article>
    <script>trackPageView()</script>
</body>
</html>"#;

fn base() -> Url {
    Url::parse("https://example.com/pricing/").unwrap()
}

#[test]
fn dom_summary_collects_page_facts() {
    let summary = dom::summarize(PAGE);
    assert_eq!(summary.title, "Pricing – Example");
    assert_eq!(summary.metadata.get("description").unwrap(), "Plans and pricing");
    assert_eq!(summary.metadata.get("og:type").unwrap(), "website");
    assert!(!summary.metadata.contains_key("keywords"), "empty content is dropped");
    assert_eq!(summary.links, vec!["/home", "signup"]);
}

#[test]
fn cleaned_html_rewrites_urls_and_drops_scripts() {
    let cleaned = clean_html(PAGE, &[], &["nav".to_string()], &base()).unwrap();
    assert!(cleaned.contains(r#"href="https://example.com/pricing/signup""#));
    assert!(cleaned.contains(r#"src="https://example.com/img/chart.png""#));
    assert!(!cleaned.contains("trackPageView"));
    assert!(!cleaned.contains(">Home<"));
}

#[test]
fn markdown_of_cleaned_html_is_stable_under_recleaning() {
    let cleaned_once = clean_html(PAGE, &[], &[], &base()).unwrap();
    let cleaned_twice = clean_html(&cleaned_once, &[], &[], &base()).unwrap();

    let md_once = to_markdown(&cleaned_once).unwrap();
    let md_twice = to_markdown(&cleaned_twice).unwrap();
    assert_eq!(md_once, md_twice);
    assert!(md_once.contains("# Pricing"));
}

#[test]
fn text_rendering_skips_invisible_content() {
    let text = dom::to_text(PAGE);
    assert!(text.contains("Pricing"));
    assert!(text.contains("free tier"));
    assert!(!text.contains("trackPageView"));
}

#[test]
fn screenshot_formats_share_the_output_key() {
    assert_eq!(OutputFormat::Screenshot.key(), "screenshot");
    assert_eq!(OutputFormat::ScreenshotFullPage.key(), "screenshot");
    assert_eq!(OutputFormat::RawHtml.key(), "rawHtml");
    assert!(OutputFormat::Screenshot.needs_browser());
    assert!(!OutputFormat::Markdown.needs_browser());
}
