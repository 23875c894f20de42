//! Baseline Tracker
//!
//! Keeps a per-check history of closed window rates and derives a simple
//! moving average over the lookback horizon.

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use monitor_core::{Baseline, RateWindow};

/// Rolling per-check baseline over prior windows.
///
/// History is partitioned by check name, so concurrent updates for different
/// checks never contend and updates for the same check are serialized by the
/// shard lock.
pub struct BaselineTracker {
    lookback: Duration,
    min_windows: usize,
    history: DashMap<String, VecDeque<(DateTime<Utc>, f64)>>,
}

impl BaselineTracker {
    pub fn new(lookback: Duration, min_windows: usize) -> Self {
        Self {
            lookback,
            min_windows,
            history: DashMap::new(),
        }
    }

    pub fn lookback(&self) -> Duration {
        self.lookback
    }

    pub fn min_windows(&self) -> usize {
        self.min_windows
    }

    /// Record a closed window's rate.
    ///
    /// Returns `false` when nothing was recorded: the rate is outside `[0, 1]`,
    /// or a window ending at or after `window_end` is already present.
    pub fn record(&self, check_name: &str, window_end: DateTime<Utc>, rate: f64) -> bool {
        if !(0.0..=1.0).contains(&rate) {
            tracing::warn!("Ignoring out-of-range rate {} for {}", rate, check_name);
            return false;
        }

        let mut entries = self.history.entry(check_name.to_string()).or_default();
        if let Some(&(latest, _)) = entries.back() {
            if window_end <= latest {
                return false;
            }
        }

        entries.push_back((window_end, rate));
        Self::evict(&mut entries, window_end - self.lookback);
        true
    }

    /// Record a window if it has observations. Empty windows leave history untouched.
    pub fn record_window(&self, window: &RateWindow) -> bool {
        match window.rate() {
            Some(rate) => self.record(&window.check_name, window.end, rate),
            None => false,
        }
    }

    /// Replace a check's history, e.g. from persisted state.
    ///
    /// Entries are ordered by window end with a stable sort, so equal end
    /// times keep their given order and the oldest is evicted first.
    pub fn restore(&self, check_name: &str, mut entries: Vec<(DateTime<Utc>, f64)>) {
        entries.retain(|(_, rate)| (0.0..=1.0).contains(rate));
        entries.sort_by_key(|(end, _)| *end);

        let mut history: VecDeque<_> = entries.into();
        if let Some(&(latest, _)) = history.back() {
            Self::evict(&mut history, latest - self.lookback);
        }
        self.history.insert(check_name.to_string(), history);
    }

    pub fn has_history(&self, check_name: &str) -> bool {
        self.history.contains_key(check_name)
    }

    /// End of the most recently recorded window
    pub fn latest(&self, check_name: &str) -> Option<DateTime<Utc>> {
        self.history
            .get(check_name)
            .and_then(|entries| entries.back().map(|(end, _)| *end))
    }

    /// Baseline from windows ending at or before `before` and inside the
    /// lookback horizon measured back from `before`.
    pub fn baseline(&self, check_name: &str, before: DateTime<Utc>) -> Baseline {
        let horizon = before - self.lookback;

        let (sum, count) = self
            .history
            .get(check_name)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|(end, _)| *end <= before && *end > horizon)
                    .fold((0.0, 0usize), |(sum, n), (_, rate)| (sum + rate, n + 1))
            })
            .unwrap_or((0.0, 0));

        Baseline {
            check_name: check_name.to_string(),
            rate: if count > 0 { Some(sum / count as f64) } else { None },
            window_count: count,
            min_windows: self.min_windows,
        }
    }

    /// Snapshot of a check's history, oldest first
    pub fn history(&self, check_name: &str) -> Vec<(DateTime<Utc>, f64)> {
        self.history
            .get(check_name)
            .map(|entries| entries.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Drop entries ending before `horizon`. The entry ending exactly on it is
    /// still needed to re-evaluate the latest window.
    fn evict(entries: &mut VecDeque<(DateTime<Utc>, f64)>, horizon: DateTime<Utc>) {
        while let Some(&(end, _)) = entries.front() {
            if end >= horizon {
                break;
            }
            entries.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2017, 10, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_cold_start_until_min_windows() {
        let tracker = BaselineTracker::new(Duration::days(7), 3);
        let check = "image_integrity_result";

        assert!(!tracker.baseline(check, day(10)).is_established());

        tracker.record(check, day(1), 0.9);
        tracker.record(check, day(2), 0.8);
        let baseline = tracker.baseline(check, day(3));
        assert_eq!(baseline.window_count, 2);
        assert!(!baseline.is_established());

        tracker.record(check, day(3), 0.7);
        let baseline = tracker.baseline(check, day(3));
        assert!(baseline.is_established());
        assert!((baseline.rate.unwrap() - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_baseline_excludes_windows_after_cutoff() {
        let tracker = BaselineTracker::new(Duration::days(7), 1);
        let check = "image_quality_result";
        tracker.record(check, day(1), 1.0);
        tracker.record(check, day(2), 0.0);

        // The window ending on day 2 is the one under evaluation
        let baseline = tracker.baseline(check, day(1));
        assert_eq!(baseline.window_count, 1);
        assert_eq!(baseline.rate, Some(1.0));
    }

    #[test]
    fn test_lookback_horizon_evicts_oldest_first() {
        let tracker = BaselineTracker::new(Duration::days(3), 1);
        let check = "face_detection_result";
        for d in 1..=5 {
            tracker.record(check, day(d), d as f64 / 10.0);
        }

        let history = tracker.history(check);
        assert_eq!(history.len(), 4);
        assert_eq!(history[0].0, day(2));
        assert_eq!(history[3].0, day(5));

        let baseline = tracker.baseline(check, day(5));
        assert!((baseline.rate.unwrap() - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_duplicate_and_stale_windows_rejected() {
        let tracker = BaselineTracker::new(Duration::days(7), 1);
        let check = "face_comparison_result";
        assert!(tracker.record(check, day(4), 0.99));
        assert!(!tracker.record(check, day(4), 0.10));
        assert!(!tracker.record(check, day(3), 0.10));
        assert_eq!(tracker.history(check), vec![(day(4), 0.99)]);
    }

    #[test]
    fn test_empty_window_not_recorded() {
        let tracker = BaselineTracker::new(Duration::days(7), 1);
        let window = RateWindow::empty("facial_image_integrity_result", day(1), day(2));
        assert!(!tracker.record_window(&window));
        assert!(!tracker.has_history("facial_image_integrity_result"));
    }

    #[test]
    fn test_invalid_rate_ignored() {
        let tracker = BaselineTracker::new(Duration::days(7), 1);
        assert!(!tracker.record("x", day(1), 1.5));
        assert!(!tracker.record("x", day(1), f64::NAN));
    }

    #[test]
    fn test_restore_sorts_and_trims() {
        let tracker = BaselineTracker::new(Duration::days(2), 1);
        tracker.restore(
            "image_integrity_result",
            vec![(day(5), 0.5), (day(1), 0.9), (day(4), 0.7), (day(3), 0.6)],
        );
        assert_eq!(
            tracker.history("image_integrity_result"),
            vec![(day(3), 0.6), (day(4), 0.7), (day(5), 0.5)]
        );
    }
}
