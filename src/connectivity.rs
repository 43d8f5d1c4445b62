//! Connectivity Monitor
//!
//! Tracks the timestamp of the newest sample and reports whether the helmet
//! feed is still live. Pure bookkeeping: never blocks, no side effects beyond
//! its own timestamp.

use crate::config::ConnectivityConfig;

#[derive(Debug, Clone)]
pub struct ConnectivityMonitor {
    last_sample_ms: Option<u64>,
    stale_threshold_ms: u64,
}

impl ConnectivityMonitor {
    pub fn new(config: &ConnectivityConfig) -> Self {
        Self {
            last_sample_ms: None,
            stale_threshold_ms: config.stale_threshold_ms,
        }
    }

    /// Record the arrival of a sample stamped `ts` (Unix ms).
    ///
    /// Older timestamps never move the marker backwards.
    pub fn on_sample_received(&mut self, ts: u64) {
        self.last_sample_ms = Some(self.last_sample_ms.map_or(ts, |last| last.max(ts)));
    }

    /// `false` once more than the stale threshold has elapsed since the last
    /// sample, and before any sample has been seen.
    pub fn is_live(&self, now_ms: u64) -> bool {
        match self.last_sample_ms {
            Some(last) => now_ms.saturating_sub(last) <= self.stale_threshold_ms,
            None => false,
        }
    }

    pub fn last_sample_ms(&self) -> Option<u64> {
        self.last_sample_ms
    }

    /// Milliseconds since the last sample, if any.
    pub fn silence_ms(&self, now_ms: u64) -> Option<u64> {
        self.last_sample_ms.map(|last| now_ms.saturating_sub(last))
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(&ConnectivityConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_live_before_first_sample() {
        let monitor = ConnectivityMonitor::default();
        assert!(!monitor.is_live(0));
        assert!(!monitor.is_live(10_000));
        assert_eq!(monitor.silence_ms(10), None);
    }

    #[test]
    fn test_stale_threshold_boundary() {
        let mut monitor = ConnectivityMonitor::default();
        monitor.on_sample_received(1_000);

        assert!(monitor.is_live(1_000));
        assert!(monitor.is_live(6_000), "exactly 5000 ms is still live");
        assert!(!monitor.is_live(6_001));
    }

    #[test]
    fn test_late_sample_does_not_rewind() {
        let mut monitor = ConnectivityMonitor::default();
        monitor.on_sample_received(5_000);
        monitor.on_sample_received(4_000);
        assert_eq!(monitor.last_sample_ms(), Some(5_000));
    }

    #[test]
    fn test_clock_behind_sample_is_live() {
        let mut monitor = ConnectivityMonitor::default();
        monitor.on_sample_received(9_000);
        assert!(monitor.is_live(8_000));
    }
}
