//! Line-boundary chunking for inputs larger than the model budget, and the
//! merge strategy for per-chunk extraction results.

use serde_json::{Map, Value};
use std::collections::HashSet;

use super::tokens::TokenCounter;

/// Split `content` on line boundaries into chunks of at most
/// `budget_tokens`, each chunk starting with up to `overlap_tokens` worth
/// of trailing lines from its predecessor.
///
/// A single line larger than the budget becomes its own chunk rather than
/// being split mid-line.
#[must_use]
pub fn chunk_by_lines(
    content: &str,
    budget_tokens: usize,
    overlap_tokens: usize,
    counter: &TokenCounter,
) -> Vec<String> {
    if content.is_empty() {
        return Vec::new();
    }

    let budget = budget_tokens.max(1);
    let lines: Vec<&str> = content.lines().collect();

    let mut chunks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_tokens = 0usize;

    for line in &lines {
        let line_tokens = counter.count(line) + 1;

        if current_tokens + line_tokens > budget && !current.is_empty() {
            chunks.push(current.join("\n"));

            // Seed the next chunk with trailing overlap lines.
            let mut overlap: Vec<&str> = Vec::new();
            let mut overlap_count = 0usize;
            for prev in current.iter().rev() {
                let t = counter.count(prev) + 1;
                if overlap_count + t > overlap_tokens {
                    break;
                }
                overlap.push(prev);
                overlap_count += t;
            }
            overlap.reverse();

            current = overlap;
            current_tokens = overlap_count;
        }

        current.push(line);
        current_tokens += line_tokens;
    }

    if !current.is_empty() {
        chunks.push(current.join("\n"));
    }

    chunks
}

/// Merge per-chunk extraction results into one value.
///
/// Objects merge key-wise preferring the first non-empty value; arrays
/// concatenate and dedup by stringified identity; scalars keep the first
/// non-empty occurrence.
#[must_use]
pub fn merge_results(results: Vec<Value>) -> Value {
    let mut iter = results.into_iter().filter(|v| !v.is_null());
    let first = match iter.next() {
        Some(v) => v,
        None => return Value::Null,
    };
    iter.fold(first, merge_pair)
}

fn merge_pair(left: Value, right: Value) -> Value {
    match (left, right) {
        (Value::Object(l), Value::Object(r)) => {
            let mut merged = Map::with_capacity(l.len() + r.len());
            for (k, v) in l {
                merged.insert(k, v);
            }
            for (k, rv) in r {
                match merged.remove(&k) {
                    Some(lv) => {
                        merged.insert(k, merge_pair(lv, rv));
                    }
                    None => {
                        merged.insert(k, rv);
                    }
                }
            }
            Value::Object(merged)
        }
        (Value::Array(l), Value::Array(r)) => {
            let mut seen: HashSet<String> = HashSet::new();
            let mut merged = Vec::with_capacity(l.len() + r.len());
            for item in l.into_iter().chain(r) {
                let key = item.to_string();
                if seen.insert(key) {
                    merged.push(item);
                }
            }
            Value::Array(merged)
        }
        (l, r) => {
            if is_empty_value(&l) && !is_empty_value(&r) {
                r
            } else {
                l
            }
        }
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn chunks_respect_budget_and_overlap() {
        let content = (0..40).map(|i| format!("line number {i}")).collect::<Vec<_>>().join("\n");
        let counter = TokenCounter::Estimate;
        let chunks = chunk_by_lines(&content, 30, 8, &counter);
        assert!(chunks.len() > 1);
        // Overlap: each later chunk starts with a line from the previous one.
        for pair in chunks.windows(2) {
            let first_line_of_next = pair[1].lines().next().unwrap();
            assert!(pair[0].contains(first_line_of_next));
        }
    }

    #[test]
    fn single_chunk_when_within_budget() {
        let counter = TokenCounter::Estimate;
        let chunks = chunk_by_lines("short\ncontent", 1000, 10, &counter);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0], "short\ncontent");
    }

    #[test]
    fn objects_merge_preferring_non_empty() {
        let merged = merge_results(vec![
            json!({"company": "", "city": "Oslo"}),
            json!({"company": "ACME", "city": ""}),
        ]);
        assert_eq!(merged, json!({"company": "ACME", "city": "Oslo"}));
    }

    #[test]
    fn arrays_concat_and_dedup() {
        let merged = merge_results(vec![
            json!({"services": ["a", "b"]}),
            json!({"services": ["b", "c"]}),
        ]);
        assert_eq!(merged, json!({"services": ["a", "b", "c"]}));
    }

    #[test]
    fn scalars_prefer_first_non_empty() {
        let merged = merge_results(vec![json!(null), json!("value"), json!("later")]);
        assert_eq!(merged, json!("value"));
    }
}
