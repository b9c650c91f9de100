//! Counter store port and the in-process implementation
//!
//! `check_and_record` must prune, count and record as one atomic step per
//! key. Anything weaker lets concurrent requests over-admit. The same holds
//! for `increment_below` on fixed counters.

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Counter store errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CounterStoreError {
    /// Store unreachable
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Store answered with an error
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Result of an atomic check-and-record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowOutcome {
    /// Entries in the window before this request
    pub count: u32,
    /// Whether `now` was recorded
    pub admitted: bool,
    /// Oldest entry still in the window after the operation
    pub oldest_ms: Option<i64>,
}

/// Read-only view of a window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WindowSnapshot {
    /// Entries in the window
    pub count: u32,
    /// Oldest entry in the window
    pub oldest_ms: Option<i64>,
}

/// Result of an atomic increment on a fixed counter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterOutcome {
    /// Counter value after the operation
    pub count: u32,
    /// Whether the counter was incremented
    pub admitted: bool,
}

/// Window length as a signed offset. Saturates instead of wrapping.
pub(crate) fn window_span(window_ms: u64) -> i64 {
    i64::try_from(window_ms).unwrap_or(i64::MAX)
}

/// Atomic counter store collaborator
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Discard entries at or before `now_ms - window_ms`, count the rest and,
    /// if the count is below `limit`, record `now_ms`. Atomic per key.
    async fn check_and_record(
        &self,
        key: &str,
        now_ms: i64,
        window_ms: u64,
        limit: u32,
    ) -> Result<WindowOutcome, CounterStoreError>;

    /// Count entries in the window without recording
    async fn count(&self, key: &str, now_ms: i64, window_ms: u64) -> Result<WindowSnapshot, CounterStoreError>;

    /// Drop every entry of a key
    async fn clear(&self, key: &str) -> Result<(), CounterStoreError>;

    /// Increment the fixed counter at `key` if its value is below `limit`.
    /// A counter created by this call expires at `expires_at_ms`. Atomic per key.
    async fn increment_below(
        &self,
        key: &str,
        now_ms: i64,
        limit: u32,
        expires_at_ms: i64,
    ) -> Result<CounterOutcome, CounterStoreError>;

    /// Value of a fixed counter, zero when absent or expired
    async fn counter(&self, key: &str, now_ms: i64) -> Result<u32, CounterStoreError>;

    /// Whether state lives only in this process
    fn is_in_process(&self) -> bool {
        false
    }
}

#[derive(Debug, Default)]
struct Bucket {
    window_ms: u64,
    hits: VecDeque<i64>,
}

impl Bucket {
    fn prune(&mut self, now_ms: i64, window_ms: u64) {
        let cutoff = now_ms.saturating_sub(window_span(window_ms));
        while self.hits.front().is_some_and(|&t| t <= cutoff) {
            self.hits.pop_front();
        }
    }
}

#[derive(Debug)]
struct FixedCounter {
    value: u32,
    expires_at_ms: i64,
}

impl FixedCounter {
    fn is_live(&self, now_ms: i64) -> bool {
        now_ms < self.expires_at_ms
    }
}

/// In-process counter store.
///
/// Atomic per key within one process only. Running several instances
/// against separate in-process stores multiplies every limit by the
/// instance count.
///
/// Expired buckets and counters are swept at most once per sweep interval,
/// piggybacking on writes.
#[derive(Debug)]
pub struct MemoryCounterStore {
    buckets: DashMap<String, Bucket>,
    counters: DashMap<String, FixedCounter>,
    sweep_interval_ms: i64,
    last_sweep_ms: AtomicI64,
}

impl Default for MemoryCounterStore {
    fn default() -> Self {
        Self {
            buckets: DashMap::new(),
            counters: DashMap::new(),
            sweep_interval_ms: DEFAULT_SWEEP_INTERVAL.as_millis() as i64,
            last_sweep_ms: AtomicI64::new(i64::MIN),
        }
    }
}

impl MemoryCounterStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Minimum time between two sweeps
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval_ms = i64::try_from(interval.as_millis()).unwrap_or(i64::MAX);
        self
    }

    /// Number of live buckets and counters
    pub fn len(&self) -> usize {
        self.buckets.len() + self.counters.len()
    }

    /// Whether no bucket or counter exists
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty() && self.counters.is_empty()
    }

    /// Drop buckets whose entries have all aged out and expired counters.
    /// Returns how many were dropped.
    pub fn purge_expired(&self, now_ms: i64) -> usize {
        let before = self.len();
        self.buckets.retain(|_, bucket| {
            let window = bucket.window_ms;
            bucket.prune(now_ms, window);
            !bucket.hits.is_empty()
        });
        self.counters.retain(|_, counter| counter.is_live(now_ms));
        before.saturating_sub(self.len())
    }

    // Must not be called while holding an entry guard.
    fn maybe_sweep(&self, now_ms: i64) {
        let last = self.last_sweep_ms.load(Ordering::Acquire);
        if now_ms.saturating_sub(last) < self.sweep_interval_ms {
            return;
        }
        if self
            .last_sweep_ms
            .compare_exchange(last, now_ms, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        let purged = self.purge_expired(now_ms);
        if purged > 0 {
            debug!(purged, remaining = self.len(), "expired counter state swept");
        }
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn check_and_record(
        &self,
        key: &str,
        now_ms: i64,
        window_ms: u64,
        limit: u32,
    ) -> Result<WindowOutcome, CounterStoreError> {
        let outcome = {
            // The entry guard holds the shard write lock for the whole step.
            let mut bucket = self.buckets.entry(key.to_string()).or_default();
            bucket.window_ms = window_ms;
            bucket.prune(now_ms, window_ms);

            let count = bucket.hits.len() as u32;
            let admitted = count < limit;
            if admitted {
                bucket.hits.push_back(now_ms);
            }

            WindowOutcome { count, admitted, oldest_ms: bucket.hits.front().copied() }
        };

        self.maybe_sweep(now_ms);
        Ok(outcome)
    }

    async fn count(&self, key: &str, now_ms: i64, window_ms: u64) -> Result<WindowSnapshot, CounterStoreError> {
        let Some(bucket) = self.buckets.get(key) else {
            return Ok(WindowSnapshot::default());
        };
        let cutoff = now_ms.saturating_sub(window_span(window_ms));
        let live: Vec<i64> = bucket.hits.iter().copied().filter(|&t| t > cutoff).collect();
        Ok(WindowSnapshot { count: live.len() as u32, oldest_ms: live.first().copied() })
    }

    async fn clear(&self, key: &str) -> Result<(), CounterStoreError> {
        self.buckets.remove(key);
        self.counters.remove(key);
        Ok(())
    }

    async fn increment_below(
        &self,
        key: &str,
        now_ms: i64,
        limit: u32,
        expires_at_ms: i64,
    ) -> Result<CounterOutcome, CounterStoreError> {
        let outcome = {
            let mut counter = self
                .counters
                .entry(key.to_string())
                .or_insert(FixedCounter { value: 0, expires_at_ms });
            if !counter.is_live(now_ms) {
                *counter = FixedCounter { value: 0, expires_at_ms };
            }

            let admitted = counter.value < limit;
            if admitted {
                counter.value += 1;
            }
            CounterOutcome { count: counter.value, admitted }
        };

        self.maybe_sweep(now_ms);
        Ok(outcome)
    }

    async fn counter(&self, key: &str, now_ms: i64) -> Result<u32, CounterStoreError> {
        Ok(self
            .counters
            .get(key)
            .filter(|counter| counter.is_live(now_ms))
            .map_or(0, |counter| counter.value))
    }

    fn is_in_process(&self) -> bool {
        true
    }
}
