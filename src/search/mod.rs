//! Search orchestration: fan SERP pages out through the queues and
//! aggregate per-page results in memory.
//!
//! The aggregation map is keyed by the request's `unique_key`; each page
//! callback (success or failure) decrements the pending count and the
//! waiter resolves at zero. Failed pages complete with empty results.

pub mod engines;
pub mod parser;

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::debug;

use crate::types::SearchResult;

pub use engines::{RESULTS_PER_PAGE, build_serp_url};
pub use parser::parse_results;

/// Shared state for one in-flight search job.
pub struct SearchAggregation {
    pending: AtomicUsize,
    pages: Mutex<Vec<(u32, Vec<SearchResult>)>>,
    notify: Notify,
}

impl SearchAggregation {
    fn new(pages: usize) -> Self {
        Self {
            pending: AtomicUsize::new(pages),
            pages: Mutex::new(Vec::with_capacity(pages)),
            notify: Notify::new(),
        }
    }

    /// Record one page's outcome. Failures report an empty result list and
    /// still count toward completion.
    pub fn report(&self, page: u32, results: Vec<SearchResult>) {
        self.pages.lock().push((page, results));
        let left = self.pending.fetch_sub(1, Ordering::AcqRel).saturating_sub(1);
        debug!(page, pending_left = left, "search page reported");
        if left == 0 {
            self.notify.notify_waiters();
        }
    }

    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Wait until every page reported, then return results ordered by
    /// (page, rank) and re-ranked globally.
    pub async fn wait(&self, timeout: Duration) -> Vec<SearchResult> {
        let deadline = tokio::time::Instant::now() + timeout;
        while self.pending() > 0 {
            let notified = self.notify.notified();
            if self.pending() == 0 {
                break;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                debug!("search aggregation timed out with {} pages pending", self.pending());
                break;
            }
        }

        let mut pages = self.pages.lock().clone();
        pages.sort_by_key(|(page, _)| *page);

        let mut merged = Vec::new();
        for (_, mut results) in pages {
            merged.append(&mut results);
        }
        for (idx, result) in merged.iter_mut().enumerate() {
            result.rank = idx + 1;
        }
        merged
    }
}

/// Registry of in-flight search aggregations, keyed by unique_key.
#[derive(Default)]
pub struct SearchCollector {
    inflight: DashMap<String, Arc<SearchAggregation>>,
}

impl SearchCollector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a search fan-out and associate every page's unique_key
    /// with the shared aggregation.
    #[must_use]
    pub fn register(&self, unique_keys: &[String]) -> Arc<SearchAggregation> {
        let aggregation = Arc::new(SearchAggregation::new(unique_keys.len()));
        for key in unique_keys {
            self.inflight.insert(key.clone(), Arc::clone(&aggregation));
        }
        aggregation
    }

    /// Route one page's results to its aggregation; the key is removed so
    /// retried deliveries after completion cannot double-report.
    pub fn report(&self, unique_key: &str, page: u32, results: Vec<SearchResult>) {
        if let Some((_, aggregation)) = self.inflight.remove(unique_key) {
            aggregation.report(page, results);
        } else {
            debug!(unique_key, "search report for unknown or completed key");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(title: &str, page: u32) -> SearchResult {
        SearchResult {
            rank: 0,
            title: title.into(),
            url: format!("https://example.com/{title}"),
            snippet: String::new(),
            page,
        }
    }

    #[tokio::test]
    async fn resolves_when_all_pages_report() {
        let collector = SearchCollector::new();
        let keys = vec!["a".to_string(), "b".to_string()];
        let aggregation = collector.register(&keys);

        collector.report("b", 2, vec![result("second", 2)]);
        collector.report("a", 1, vec![result("first", 1)]);

        let results = aggregation.wait(Duration::from_secs(1)).await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].title, "first");
        assert_eq!(results[0].rank, 1);
        assert_eq!(results[1].title, "second");
        assert_eq!(results[1].rank, 2);
    }

    #[tokio::test]
    async fn failed_pages_count_with_empty_results() {
        let collector = SearchCollector::new();
        let keys = vec!["x".to_string(), "y".to_string()];
        let aggregation = collector.register(&keys);

        collector.report("x", 1, Vec::new());
        collector.report("y", 2, vec![result("only", 2)]);

        let results = aggregation.wait(Duration::from_secs(1)).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].title, "only");
    }

    #[tokio::test]
    async fn duplicate_reports_are_ignored() {
        let collector = SearchCollector::new();
        let keys = vec!["k".to_string()];
        let aggregation = collector.register(&keys);

        collector.report("k", 1, vec![result("once", 1)]);
        collector.report("k", 1, vec![result("twice", 1)]);

        let results = aggregation.wait(Duration::from_secs(1)).await;
        assert_eq!(results.len(), 1);
    }
}
