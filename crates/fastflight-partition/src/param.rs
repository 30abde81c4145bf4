//! The time-series parameter contract and its implementation for
//! `TimeRangeParams`.
//!
//! `TimeSeriesParameter` is defined in this crate rather than `fastflight-core` so
//! that `fastflight-core` stays free of partitioning concerns; implementing it here
//! for `TimeRangeParams` (a type from `fastflight-core`) is legal under the orphan
//! rule because the trait itself is local to this crate.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use fastflight_core::{ErrorKind, FastFlightError, Parameter, Result, TimeRangeParams};

/// A parameter type describing a half-open `[start, end)` time range that can be
/// split into contiguous sub-ranges for parallel dispatch.
pub trait TimeSeriesParameter: Parameter + Clone + Sized {
    fn start_time(&self) -> Result<DateTime<Utc>>;
    fn end_time(&self) -> Result<DateTime<Utc>>;

    /// Builds a new instance covering `[start, end)`, otherwise identical to `self`.
    fn with_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self;

    /// An estimate of how many data points this range holds, when the backend's
    /// sampling rate is known. `None` disables the points-based branch of
    /// `optimal_partitions`.
    fn estimate_data_points(&self) -> Option<u64> {
        None
    }

    fn time_range_duration(&self) -> Result<ChronoDuration> {
        Ok(self.end_time()? - self.start_time()?)
    }

    /// `n` contiguous, equal-duration sub-parameters covering `[start, end)`; the
    /// last one absorbs any rounding remainder so its `end_time` equals the
    /// parent's.
    fn split_by_time_windows(&self, n: usize) -> Result<Vec<Self>> {
        let n = n.max(1);
        let start = self.start_time()?;
        let end = self.end_time()?;
        let total = end - start;
        let step_nanos = total.num_nanoseconds().unwrap_or(i64::MAX) / n as i64;

        let mut windows = Vec::with_capacity(n);
        let mut cursor = start;
        for i in 0..n {
            let window_end = if i == n - 1 { end } else { cursor + ChronoDuration::nanoseconds(step_nanos) };
            windows.push(self.with_range(cursor, window_end));
            cursor = window_end;
        }
        Ok(windows)
    }

    /// Contiguous sub-parameters of duration `window`, the final one truncated to
    /// the parent's `end_time`.
    fn split_by_window_size(&self, window: ChronoDuration) -> Result<Vec<Self>> {
        if window <= ChronoDuration::zero() {
            return Err(FastFlightError::new(ErrorKind::InvalidParam, "split window size must be positive"));
        }
        let start = self.start_time()?;
        let end = self.end_time()?;

        let mut windows = Vec::new();
        let mut cursor = start;
        while cursor < end {
            let window_end = std::cmp::min(cursor + window, end);
            windows.push(self.with_range(cursor, window_end));
            cursor = window_end;
        }
        Ok(windows)
    }

    /// If `estimate_data_points()` is known, split into
    /// `clamp(1, max_workers, ceil(points / target))` windows; otherwise fall back
    /// to `split_by_time_windows(min(max_workers, 8))`.
    fn optimal_partitions(&self, max_workers: usize, target_points_per_partition: u64) -> Result<Vec<Self>> {
        let max_workers = max_workers.max(1);
        match self.estimate_data_points() {
            Some(points) if target_points_per_partition > 0 => {
                let target = target_points_per_partition;
                let by_points = points.div_ceil(target).max(1) as usize;
                let n = by_points.clamp(1, max_workers);
                self.split_by_time_windows(n)
            }
            _ => self.split_by_time_windows(max_workers.min(8)),
        }
    }
}

impl TimeSeriesParameter for TimeRangeParams {
    fn start_time(&self) -> Result<DateTime<Utc>> {
        parse_rfc3339(&self.start)
    }

    fn end_time(&self) -> Result<DateTime<Utc>> {
        parse_rfc3339(&self.end)
    }

    fn with_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        TimeRangeParams {
            series_id: self.series_id.clone(),
            start: start.to_rfc3339(),
            end: end.to_rfc3339(),
            points_per_batch: self.points_per_batch,
        }
    }

    fn estimate_data_points(&self) -> Option<u64> {
        let duration = (self.end_time().ok()? - self.start_time().ok()?).num_seconds();
        if duration <= 0 {
            None
        } else {
            Some(duration as u64)
        }
    }
}

fn parse_rfc3339(s: &str) -> Result<DateTime<Utc>> {
    s.parse::<DateTime<Utc>>()
        .map_err(|e| FastFlightError::new(ErrorKind::InvalidParam, format!("invalid RFC 3339 timestamp '{s}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(start: &str, end: &str) -> TimeRangeParams {
        TimeRangeParams { series_id: "cpu.load".to_string(), start: start.to_string(), end: end.to_string(), points_per_batch: 4096 }
    }

    #[test]
    fn split_by_time_windows_covers_the_parent_range_without_gaps() {
        let p = range("2026-01-01T00:00:00Z", "2026-01-01T01:00:00Z");
        let windows = p.split_by_time_windows(3).unwrap();

        assert_eq!(windows.len(), 3);
        assert_eq!(windows[0].start_time().unwrap(), p.start_time().unwrap());
        assert_eq!(windows.last().unwrap().end_time().unwrap(), p.end_time().unwrap());
        for pair in windows.windows(2) {
            assert_eq!(pair[0].end_time().unwrap(), pair[1].start_time().unwrap());
        }
    }

    #[test]
    fn split_by_window_size_truncates_the_final_window() {
        let p = range("2026-01-01T00:00:00Z", "2026-01-01T00:00:25Z");
        let windows = p.split_by_window_size(ChronoDuration::seconds(10)).unwrap();

        assert_eq!(windows.len(), 3);
        assert_eq!((windows[2].end_time().unwrap() - windows[2].start_time().unwrap()).num_seconds(), 5);
    }

    #[test]
    fn optimal_partitions_uses_point_estimate_when_available() {
        let p = range("2026-01-01T00:00:00Z", "2026-01-01T00:16:40Z"); // 1000 seconds => 1000 points
        let windows = p.optimal_partitions(8, 250).unwrap();
        assert_eq!(windows.len(), 4); // ceil(1000/250) = 4, clamped to max_workers=8
    }

    #[test]
    fn optimal_partitions_clamps_to_max_workers() {
        let p = range("2026-01-01T00:00:00Z", "2026-01-02T00:00:00Z"); // 86400 seconds
        let windows = p.optimal_partitions(4, 100).unwrap();
        assert_eq!(windows.len(), 4);
    }
}
