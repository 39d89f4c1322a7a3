//! Rolling window of utilization samples
//!
//! Samples arrive in timestamp order from a single producer, so the buffer
//! stays sorted and point-in-time lookups are a binary search.

use crate::models::Sample;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::VecDeque;
use std::time::Duration;

/// Default retention window (24 hours)
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

/// Hard cap on retained samples. A 24h window at a 2s interval needs 43,200.
pub const DEFAULT_MAX_SAMPLES: usize = 100_000;

/// Thread-safe, time-bounded buffer of samples
#[derive(Debug)]
pub struct RollingStore {
    samples: RwLock<VecDeque<Sample>>,
    window: chrono::Duration,
    max_samples: usize,
}

impl Default for RollingStore {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

impl RollingStore {
    pub fn new(window: Duration) -> Self {
        Self::with_capacity(window, DEFAULT_MAX_SAMPLES)
    }

    pub fn with_capacity(window: Duration, max_samples: usize) -> Self {
        let window = chrono::Duration::from_std(window).unwrap_or(chrono::Duration::MAX);
        Self {
            samples: RwLock::new(VecDeque::with_capacity(max_samples.min(10_000))),
            window,
            max_samples: max_samples.max(1),
        }
    }

    /// Append a sample and evict everything older than the window
    ///
    /// The caller supplies non-decreasing timestamps. The new sample's
    /// timestamp is the reference "now" for eviction.
    pub fn add_sample(&self, sample: Sample) {
        let cutoff = sample.timestamp.checked_sub_signed(self.window);

        let mut samples = self.samples.write();
        samples.push_back(sample);

        if let Some(cutoff) = cutoff {
            while samples.front().is_some_and(|s| s.timestamp < cutoff) {
                samples.pop_front();
            }
        }
        while samples.len() > self.max_samples {
            samples.pop_front();
        }
    }

    /// The most recent sample, if any
    pub fn latest(&self) -> Option<Sample> {
        self.samples.read().back().copied()
    }

    /// The retained sample with the greatest timestamp `<= when`
    pub fn at_or_before(&self, when: DateTime<Utc>) -> Option<Sample> {
        let samples = self.samples.read();
        let idx = samples.partition_point(|s| s.timestamp <= when);
        if idx == 0 {
            None
        } else {
            samples.get(idx - 1).copied()
        }
    }

    pub fn len(&self) -> usize {
        self.samples.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.read().is_empty()
    }

    /// Retention window
    pub fn window(&self) -> Duration {
        self.window.to_std().unwrap_or(Duration::MAX)
    }

    /// Snapshot of buffer statistics
    pub fn stats(&self) -> StoreStats {
        let samples = self.samples.read();
        StoreStats {
            entries: samples.len(),
            capacity: self.max_samples,
            oldest_timestamp: samples.front().map(|s| s.timestamp.timestamp()),
            newest_timestamp: samples.back().map(|s| s.timestamp.timestamp()),
            window_seconds: self.window.num_seconds().max(0) as u64,
        }
    }
}

/// Store statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStats {
    /// Number of retained samples
    pub entries: usize,
    /// Maximum number of samples
    pub capacity: usize,
    /// Oldest sample timestamp (Unix seconds)
    pub oldest_timestamp: Option<i64>,
    /// Newest sample timestamp (Unix seconds)
    pub newest_timestamp: Option<i64>,
    pub window_seconds: u64,
}
