use serde::{Deserialize, Serialize};

/// Nanoseconds per second.
pub const NS_PER_S: f64 = 1.0e9;

/// Convert seconds to integer nanoseconds (rounded to the nearest tick).
#[inline]
pub fn seconds_to_ns(t_s: f64) -> i64 {
    (t_s * NS_PER_S).round() as i64
}

/// Convert integer nanoseconds to seconds.
#[inline]
pub fn ns_to_seconds(t_ns: i64) -> f64 {
    t_ns as f64 / NS_PER_S
}

/// Convert a sensor timestamp in milliseconds to seconds.
///
/// Whole-millisecond stamps map exactly onto the second grid
/// (`3000 ms -> 3.0 s`).
#[inline]
pub fn ms_to_seconds(t_ms: f64) -> f64 {
    t_ms / 1000.0
}

/// Composite key `(timestamp, sensor index)` for per-frame data.
///
/// Ordering is lexicographic on `(t_ns, cam_id)`, which gives deterministic
/// time-ordered iteration when used as a `BTreeMap` key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeCamId {
    /// Capture time in nanoseconds.
    pub t_ns: i64,
    /// Camera index (single camera rigs use 0).
    pub cam_id: usize,
}

impl TimeCamId {
    pub fn new(t_ns: i64, cam_id: usize) -> Self {
        Self { t_ns, cam_id }
    }

    /// Key for a timestamp in seconds.
    pub fn from_seconds(t_s: f64, cam_id: usize) -> Self {
        Self::new(seconds_to_ns(t_s), cam_id)
    }

    pub fn seconds(&self) -> f64 {
        ns_to_seconds(self.t_ns)
    }
}

impl std::fmt::Display for TimeCamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}ns/cam{}", self.t_ns, self.cam_id)
    }
}

/// Half-open time interval `[t0, t_end)` in seconds.
///
/// Measurements with `t < t0` or `t >= t_end` lie outside the window and are
/// dropped by the ingestion code.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub t0_s: f64,
    pub t_end_s: f64,
}

impl TimeWindow {
    pub fn new(t0_s: f64, t_end_s: f64) -> Self {
        Self { t0_s, t_end_s }
    }

    /// Window spanning the minimum and maximum of an ascending timestamp list.
    ///
    /// Returns `None` for an empty slice.
    pub fn from_sorted_timestamps(sorted_s: &[f64]) -> Option<Self> {
        let first = *sorted_s.first()?;
        let last = *sorted_s.last()?;
        Some(Self::new(first, last))
    }

    #[inline]
    pub fn contains_s(&self, t_s: f64) -> bool {
        t_s >= self.t0_s && t_s < self.t_end_s
    }

    #[inline]
    pub fn contains_ns(&self, t_ns: i64) -> bool {
        t_ns >= self.t0_ns() && t_ns < self.t_end_ns()
    }

    pub fn t0_ns(&self) -> i64 {
        seconds_to_ns(self.t0_s)
    }

    pub fn t_end_ns(&self) -> i64 {
        seconds_to_ns(self.t_end_s)
    }

    pub fn duration_s(&self) -> f64 {
        self.t_end_s - self.t0_s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn time_cam_id_orders_by_time_then_camera() {
        let a = TimeCamId::new(10, 1);
        let b = TimeCamId::new(11, 0);
        let c = TimeCamId::new(10, 0);
        let mut keys = vec![a, b, c];
        keys.sort();
        assert_eq!(keys, vec![c, a, b]);

        let mut map = BTreeMap::new();
        map.insert(b, "b");
        map.insert(a, "a");
        map.insert(c, "c");
        let order: Vec<_> = map.values().copied().collect();
        assert_eq!(order, vec!["c", "a", "b"]);
    }

    #[test]
    fn seconds_round_trip_is_exact_for_nanosecond_grid() {
        let t_ns = 1_234_567_891_011;
        assert_eq!(seconds_to_ns(ns_to_seconds(t_ns)), t_ns);
        assert_eq!(TimeCamId::from_seconds(10.02, 0).t_ns, 10_020_000_000);
    }

    #[test]
    fn window_is_half_open() {
        let window = TimeWindow::from_sorted_timestamps(&[1.0, 1.5, 3.0]).unwrap();
        assert_eq!(window.t0_s, 1.0);
        assert_eq!(window.t_end_s, 3.0);
        assert!(window.contains_s(1.0));
        assert!(window.contains_s(2.999));
        assert!(!window.contains_s(3.0));
        assert!(!window.contains_s(0.999));
        assert!(window.contains_ns(seconds_to_ns(1.0)));
        assert!(!window.contains_ns(seconds_to_ns(3.0)));
    }

    #[test]
    fn empty_timestamps_have_no_window() {
        assert!(TimeWindow::from_sorted_timestamps(&[]).is_none());
    }
}
