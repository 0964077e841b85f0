//! Minimal glob matching (`*` and `?`) compiled to anchored regexes.
//!
//! Used by proxy routing rules and crawl include/exclude path filters.
//! Matching is case-insensitive and every regex metacharacter in the
//! pattern is escaped before the wildcards are translated.

use regex::Regex;

/// Compile one glob pattern into an anchored, case-insensitive regex.
pub fn compile(pattern: &str) -> Result<Regex, regex::Error> {
    let mut re = String::with_capacity(pattern.len() + 8);
    re.push_str("(?i)^");
    for ch in pattern.chars() {
        match ch {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            other => re.push_str(&regex::escape(&other.to_string())),
        }
    }
    re.push('$');
    Regex::new(&re)
}

/// A set of compiled glob patterns; empty sets match nothing.
#[derive(Debug, Clone, Default)]
pub struct GlobSet {
    patterns: Vec<Regex>,
}

impl GlobSet {
    pub fn compile(patterns: &[String]) -> Result<Self, regex::Error> {
        let patterns = patterns
            .iter()
            .map(|p| compile(p))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    #[must_use]
    pub fn matches(&self, candidate: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(candidate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcards_translate() {
        let re = compile("*.example.com").unwrap();
        assert!(re.is_match("shop.example.com"));
        assert!(re.is_match("SHOP.EXAMPLE.COM"));
        assert!(!re.is_match("example.org"));

        let re = compile("a?c").unwrap();
        assert!(re.is_match("abc"));
        assert!(!re.is_match("abbc"));
    }

    #[test]
    fn metacharacters_are_literal() {
        let re = compile("https://example.com/path+x").unwrap();
        assert!(re.is_match("https://example.com/path+x"));
        assert!(!re.is_match("https://exampleXcom/path+x"));
    }

    #[test]
    fn empty_set_matches_nothing() {
        let set = GlobSet::default();
        assert!(!set.matches("anything"));
    }

    #[test]
    fn set_matches_any_pattern() {
        let set = GlobSet::compile(&["/blog/*".into(), "/docs/*".into()]).unwrap();
        assert!(set.matches("/blog/post-1"));
        assert!(set.matches("/docs/intro"));
        assert!(!set.matches("/pricing"));
    }
}
