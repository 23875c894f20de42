//! Rate Aggregator
//!
//! Computes clear rates over fixed, epoch-aligned windows.

use chrono::{DateTime, Duration, Utc};
use monitor_core::{CheckOutcome, RateWindow};

/// Pure aggregation of outcomes into window clear rates
#[derive(Debug, Clone, Copy)]
pub struct RateAggregator {
    window: Duration,
}

impl RateAggregator {
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// The most recently closed window `[start, end)` as of `now`.
    ///
    /// Windows are aligned to multiples of the window size since the Unix
    /// epoch, so `now` exactly on a boundary closes the window ending at `now`.
    pub fn closed_window(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let size = self.window.num_seconds().max(1);
        let into_window = Duration::seconds(now.timestamp().rem_euclid(size))
            + Duration::nanoseconds(now.timestamp_subsec_nanos() as i64);
        let end = now - into_window;
        (end - self.window, end)
    }

    /// Count outcomes of `check_name` inside `[start, end)`.
    ///
    /// Outcomes for other checks or outside the interval are ignored, so the
    /// caller may pass an unfiltered slice.
    pub fn aggregate(
        &self,
        check_name: &str,
        outcomes: &[CheckOutcome],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> RateWindow {
        let mut window = RateWindow::empty(check_name, start, end);

        for outcome in outcomes
            .iter()
            .filter(|o| o.check_name == check_name)
            .filter(|o| o.timestamp >= start && o.timestamp < end)
        {
            window.total_count += 1;
            if outcome.status.is_pass() {
                window.pass_count += 1;
            }
        }

        window
    }
}

impl Default for RateAggregator {
    fn default() -> Self {
        Self::new(Duration::hours(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use monitor_core::CheckStatus;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2017, 10, 29, h, m, s).unwrap()
    }

    #[test]
    fn test_closed_window_alignment() {
        let agg = RateAggregator::default();

        let (start, end) = agg.closed_window(at(14, 37, 12));
        assert_eq!(start, at(13, 0, 0));
        assert_eq!(end, at(14, 0, 0));

        // Exactly on a boundary closes the window that just ended
        let (start, end) = agg.closed_window(at(14, 0, 0));
        assert_eq!(start, at(13, 0, 0));
        assert_eq!(end, at(14, 0, 0));
    }

    #[test]
    fn test_closed_window_drops_subsecond_component() {
        let agg = RateAggregator::new(Duration::minutes(15));
        let now = at(9, 20, 0) + Duration::milliseconds(750);
        let (start, end) = agg.closed_window(now);
        assert_eq!(start, at(9, 0, 0));
        assert_eq!(end, at(9, 15, 0));
    }

    #[test]
    fn test_aggregate_counts_half_open_interval() {
        let agg = RateAggregator::default();
        let (start, end) = (at(13, 0, 0), at(14, 0, 0));
        let outcomes = vec![
            CheckOutcome::new("image_integrity_result", at(13, 0, 0), CheckStatus::Clear),
            CheckOutcome::new("image_integrity_result", at(13, 30, 0), CheckStatus::Consider),
            CheckOutcome::new("image_integrity_result", at(13, 59, 59), CheckStatus::Clear),
            // End is exclusive
            CheckOutcome::new("image_integrity_result", at(14, 0, 0), CheckStatus::Consider),
            // Before start
            CheckOutcome::new("image_integrity_result", at(12, 59, 59), CheckStatus::Consider),
            // Other check
            CheckOutcome::new("face_detection_result", at(13, 10, 0), CheckStatus::Consider),
        ];

        let window = agg.aggregate("image_integrity_result", &outcomes, start, end);
        assert_eq!(window.total_count, 3);
        assert_eq!(window.pass_count, 2);
        assert!((window.rate().unwrap() - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_aggregate_without_observations() {
        let agg = RateAggregator::default();
        let window = agg.aggregate("image_quality_result", &[], at(13, 0, 0), at(14, 0, 0));
        assert_eq!(window.total_count, 0);
        assert_eq!(window.rate(), None);
    }

    #[test]
    fn test_unidentified_counts_as_failure() {
        let agg = RateAggregator::default();
        let outcomes = vec![
            CheckOutcome::new("visual_authenticity_result", at(13, 5, 0), CheckStatus::Unidentified),
            CheckOutcome::new("visual_authenticity_result", at(13, 6, 0), CheckStatus::Clear),
        ];
        let window = agg.aggregate("visual_authenticity_result", &outcomes, at(13, 0, 0), at(14, 0, 0));
        assert_eq!(window.rate(), Some(0.5));
    }
}
