use crate::types::{Hash, HashRateSample};
use moka::sync::Cache;
use std::sync::atomic::{AtomicU64, Ordering};

/// Aggregates the local hash rate with self-reported remote samples.
///
/// Remote samples older than `window` seconds are ignored by `total` and
/// dropped by `purge`. Reads never go through the coordinator loop.
#[derive(Debug)]
pub struct HashrateTracker {
    local: AtomicU64,
    remote: Cache<Hash, HashRateSample>,
    window: u64,
}

impl HashrateTracker {
    pub fn new(max_workers: u64, window: u64) -> Self {
        Self {
            local: AtomicU64::new(0),
            remote: Cache::builder().max_capacity(max_workers).build(),
            window,
        }
    }

    pub fn set_local(&self, rate: u64) {
        self.local.store(rate, Ordering::Relaxed);
    }

    /// Insert or replace the sample for `sample.id`.
    pub fn record(&self, sample: HashRateSample) {
        self.remote.insert(sample.id, sample);
    }

    fn is_live(&self, sample: &HashRateSample, now: u64) -> bool {
        now.saturating_sub(sample.ping) < self.window
    }

    /// Drop expired remote samples.
    pub fn purge(&self, now: u64) {
        let expired: Vec<Hash> = self
            .remote
            .iter()
            .filter(|(_, sample)| !self.is_live(sample, now))
            .map(|(id, _)| *id)
            .collect();
        for id in expired {
            tracing::trace!(id = %hex::encode(id), "dropping stale hashrate sample");
            self.remote.invalidate(&id);
        }
    }

    /// Local rate plus every live remote sample.
    pub fn total(&self, now: u64) -> u64 {
        self.remote
            .iter()
            .filter(|(_, sample)| self.is_live(sample, now))
            .fold(self.local.load(Ordering::Relaxed), |acc, (_, sample)| {
                acc.saturating_add(sample.rate)
            })
    }
}
