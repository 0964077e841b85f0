//! Error-driven tier tracker for the fallback proxy list.
//!
//! Per hostname it keeps a score histogram over the configured tiers and a
//! current tier index. Reported errors bump the failing tier's score by 10;
//! every pick first decays all non-current buckets by 1 (floor 0), then
//! moves to the neighbouring tier with the lowest score, ties preferring
//! the lower index.

use dashmap::DashMap;

const ERROR_PENALTY: u32 = 10;

#[derive(Debug, Clone)]
struct HostState {
    histogram: Vec<u32>,
    current: usize,
}

impl HostState {
    fn new(tiers: usize) -> Self {
        Self { histogram: vec![0; tiers], current: 0 }
    }

    fn decay_and_pick(&mut self) -> usize {
        for (idx, bucket) in self.histogram.iter_mut().enumerate() {
            if idx != self.current {
                *bucket = bucket.saturating_sub(1);
            }
        }

        let lo = self.current.saturating_sub(1);
        let hi = (self.current + 1).min(self.histogram.len() - 1);

        let mut best = lo;
        for idx in lo..=hi {
            if self.histogram[idx] < self.histogram[best] {
                best = idx;
            }
        }

        self.current = best;
        best
    }
}

/// Thread-safe tier selection state, keyed by hostname.
#[derive(Debug)]
pub struct TierTracker {
    tiers: usize,
    hosts: DashMap<String, HostState>,
}

impl TierTracker {
    #[must_use]
    pub fn new(tiers: usize) -> Self {
        Self { tiers, hosts: DashMap::new() }
    }

    /// Pick the tier for the next request to `host`. A `pin` bypasses the
    /// histogram entirely (clamped into range).
    pub fn pick(&self, host: &str, pin: Option<usize>) -> usize {
        assert!(self.tiers > 0, "tier tracker used with no tiers configured");

        if let Some(pinned) = pin {
            let pinned = pinned.min(self.tiers - 1);
            self.hosts
                .entry(host.to_string())
                .or_insert_with(|| HostState::new(self.tiers))
                .current = pinned;
            return pinned;
        }

        let mut state = self
            .hosts
            .entry(host.to_string())
            .or_insert_with(|| HostState::new(self.tiers));
        state.decay_and_pick()
    }

    /// Record a proxy failure observed on `tier` for `host`.
    pub fn record_error(&self, host: &str, tier: usize) {
        if tier >= self.tiers {
            return;
        }
        let mut state = self
            .hosts
            .entry(host.to_string())
            .or_insert_with(|| HostState::new(self.tiers));
        state.histogram[tier] = state.histogram[tier].saturating_add(ERROR_PENALTY);
    }

    /// Current tier for a host (for diagnostics).
    #[must_use]
    pub fn current(&self, host: &str) -> Option<usize> {
        self.hosts.get(host).map(|s| s.current)
    }
}
