//! Rolling 24-hour API call counter
//!
//! Calls are counted per hour bucket (`epoch_seconds / 3600`). A bucket is
//! kept while it is at or after the bucket containing `now - 24h`, so the
//! window covers between 24 and 25 wall-clock hours.

use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

const BUCKET_SECONDS: i64 = 3600;

/// Thread-safe hourly call counter shared by a client and its observers
#[derive(Debug, Default)]
pub struct ApiCallTracker {
    buckets: Mutex<BTreeMap<i64, u64>>,
}

fn bucket_of(ts: DateTime<Utc>) -> i64 {
    ts.timestamp().div_euclid(BUCKET_SECONDS)
}

fn cutoff_bucket(now: DateTime<Utc>) -> i64 {
    bucket_of(now - Duration::hours(24))
}

impl ApiCallTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one call now
    pub fn record(&self) {
        self.record_at(Utc::now());
    }

    /// Count one call at `ts`
    pub fn record_at(&self, ts: DateTime<Utc>) {
        let mut buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);
        *buckets.entry(bucket_of(ts)).or_insert(0) += 1;
        let cutoff = cutoff_bucket(ts);
        buckets.retain(|bucket, _| *bucket >= cutoff);
    }

    /// Calls made during the last 24 hours
    pub fn count_last_24h(&self) -> u64 {
        self.count_last_24h_at(Utc::now())
    }

    pub fn count_last_24h_at(&self, now: DateTime<Utc>) -> u64 {
        let mut buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);
        let cutoff = cutoff_bucket(now);
        buckets.retain(|bucket, _| *bucket >= cutoff);
        buckets.values().sum()
    }

    /// Copy of the current bucket map for diagnostics
    pub fn snapshot_buckets(&self) -> BTreeMap<i64, u64> {
        self.buckets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, hour, minute, 0).unwrap()
    }

    #[test]
    fn counts_calls_in_window() {
        let tracker = ApiCallTracker::new();
        tracker.record_at(at(10, 0));
        tracker.record_at(at(10, 30));
        tracker.record_at(at(11, 5));
        assert_eq!(tracker.count_last_24h_at(at(12, 0)), 3);

        let buckets = tracker.snapshot_buckets();
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets.values().copied().max(), Some(2));
    }

    #[test]
    fn old_buckets_are_pruned() {
        let tracker = ApiCallTracker::new();
        tracker.record_at(at(10, 0));
        let later = at(10, 0) + Duration::hours(26);
        assert_eq!(tracker.count_last_24h_at(later), 0);
        assert!(tracker.snapshot_buckets().is_empty());
    }

    #[test]
    fn cutoff_bucket_is_inclusive() {
        let tracker = ApiCallTracker::new();
        tracker.record_at(at(10, 0));
        // 24h30m later the cutoff bucket is still the 10:00 hour
        let later = at(10, 30) + Duration::hours(24);
        assert_eq!(tracker.count_last_24h_at(later), 1);
    }

    #[test]
    fn record_prunes_relative_to_its_own_time() {
        let tracker = ApiCallTracker::new();
        tracker.record_at(at(0, 0));
        tracker.record_at(at(0, 0) + Duration::hours(30));
        assert_eq!(tracker.snapshot_buckets().len(), 1);
    }
}
