//! HTML → Markdown conversion.

use htmd::HtmlToMarkdown;

use crate::error::ExtractError;

/// Convert (cleaned) HTML to markdown and normalize blank-line runs.
pub fn to_markdown(html: &str) -> Result<String, ExtractError> {
    let converter = HtmlToMarkdown::builder()
        .skip_tags(vec!["script", "style", "noscript", "head"])
        .build();

    let markdown = converter
        .convert(html)
        .map_err(|e| ExtractError::new("markdown", format!("conversion failed: {e}")))?;

    Ok(tidy(&markdown))
}

/// Collapse runs of 3+ newlines and trim the edges.
fn tidy(markdown: &str) -> String {
    let mut out = String::with_capacity(markdown.len());
    let mut blank_run = 0usize;

    for line in markdown.lines() {
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
            out.push('\n');
        } else {
            blank_run = 0;
            out.push_str(line.trim_end());
            out.push('\n');
        }
    }

    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_basic_structure() {
        let md = to_markdown("<h1>Title</h1><p>Body with <a href=\"https://x\">link</a></p>")
            .unwrap();
        assert!(md.contains("# Title"));
        assert!(md.contains("[link](https://x)"));
    }

    #[test]
    fn blank_runs_are_collapsed() {
        let md = tidy("a\n\n\n\n\nb");
        assert_eq!(md, "a\n\nb");
    }

    #[test]
    fn conversion_is_stable() {
        let html = "<article><h2>Head</h2>\n\n<p>text</p></article>";
        let once = to_markdown(html).unwrap();
        // Converting the same cleaned HTML twice yields identical output.
        let twice = to_markdown(html).unwrap();
        assert_eq!(once, twice);
    }
}
