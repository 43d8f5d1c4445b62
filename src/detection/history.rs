//! Motion history: a bounded, strictly time-ordered ring of recent readings.

use std::collections::VecDeque;

use crate::types::{SampleError, Vec3};

/// One reading as retained by the classifier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionEntry {
    pub timestamp: u64,
    /// Acceleration (g, unfiltered)
    pub acc: Vec3,
    /// Angular rate (deg/s)
    pub gyro: Vec3,
    /// |acc| (g)
    pub acc_magnitude: f64,
    /// |gyro| (deg/s)
    pub gyro_magnitude: f64,
}

impl MotionEntry {
    pub fn new(timestamp: u64, acc: Vec3, gyro: Vec3) -> Self {
        Self {
            timestamp,
            acc,
            gyro,
            acc_magnitude: acc.magnitude(),
            gyro_magnitude: gyro.magnitude(),
        }
    }
}

/// Fixed-capacity deque evicting by age and by count.
///
/// Invariant: timestamps strictly increase front to back, and
/// `newest - oldest <= window_ms`.
#[derive(Debug, Clone)]
pub struct MotionHistory {
    entries: VecDeque<MotionEntry>,
    window_ms: u64,
    capacity: usize,
}

impl MotionHistory {
    pub fn new(window_ms: u64, capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            window_ms,
            capacity,
        }
    }

    /// Append a reading, evicting entries that fell out of the window.
    ///
    /// A reading not strictly newer than the current newest is rejected and
    /// the history is left untouched.
    pub fn push(&mut self, entry: MotionEntry) -> Result<(), SampleError> {
        if let Some(newest) = self.entries.back() {
            if entry.timestamp <= newest.timestamp {
                return Err(SampleError::OutOfOrder {
                    timestamp: entry.timestamp,
                    newest: newest.timestamp,
                });
            }
        }

        self.entries.push_back(entry);

        let horizon = entry.timestamp.saturating_sub(self.window_ms);
        while self.entries.front().is_some_and(|e| e.timestamp < horizon) {
            self.entries.pop_front();
        }
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
        Ok(())
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn newest(&self) -> Option<&MotionEntry> {
        self.entries.back()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &MotionEntry> {
        self.entries.iter()
    }

    /// Peak acceleration magnitude in the window (g).
    pub fn peak_acc(&self) -> f64 {
        self.entries.iter().map(|e| e.acc_magnitude).fold(0.0, f64::max)
    }

    /// Peak angular rate magnitude in the window (deg/s).
    pub fn peak_gyro(&self) -> f64 {
        self.entries.iter().map(|e| e.gyro_magnitude).fold(0.0, f64::max)
    }

    /// Length and peak of the trailing run of entries whose angular rate
    /// exceeds `threshold_dps`.
    pub fn trailing_gyro_run(&self, threshold_dps: f64) -> (usize, f64) {
        self.entries
            .iter()
            .rev()
            .take_while(|e| e.gyro_magnitude > threshold_dps)
            .fold((0, 0.0), |(n, peak), e| (n + 1, f64::max(peak, e.gyro_magnitude)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(ts: u64, gyro: f64) -> MotionEntry {
        MotionEntry::new(ts, Vec3::new(0.0, 0.0, 1.0), Vec3::new(gyro, 0.0, 0.0))
    }

    #[test]
    fn test_evicts_by_age() {
        let mut h = MotionHistory::new(100, 64);
        for ts in (0..=300).step_by(10) {
            h.push(entry(ts, 0.0)).expect("ordered");
        }
        let oldest = h.iter().next().map(|e| e.timestamp);
        assert_eq!(oldest, Some(200));
        assert_eq!(h.len(), 11);
    }

    #[test]
    fn test_evicts_by_capacity() {
        let mut h = MotionHistory::new(10_000, 4);
        for ts in 1..=10 {
            h.push(entry(ts, 0.0)).expect("ordered");
        }
        assert_eq!(h.len(), 4);
        assert_eq!(h.newest().map(|e| e.timestamp), Some(10));
    }

    #[test]
    fn test_rejects_out_of_order_without_mutation() {
        let mut h = MotionHistory::new(1_000, 16);
        h.push(entry(50, 0.0)).expect("ordered");
        assert_eq!(
            h.push(entry(50, 0.0)),
            Err(SampleError::OutOfOrder { timestamp: 50, newest: 50 })
        );
        assert!(h.push(entry(40, 0.0)).is_err());
        assert_eq!(h.len(), 1);
    }

    #[test]
    fn test_trailing_gyro_run() {
        let mut h = MotionHistory::new(1_000, 16);
        for (ts, rate) in [(1, 400.0), (2, 10.0), (3, 350.0), (4, 500.0), (5, 320.0)] {
            h.push(entry(ts, rate)).expect("ordered");
        }
        let (run, peak) = h.trailing_gyro_run(300.0);
        assert_eq!(run, 3);
        assert_eq!(peak, 500.0);
        assert_eq!(h.peak_gyro(), 500.0);
    }
}
