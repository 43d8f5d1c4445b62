//! Sample source abstraction for helmet IMU ingestion.
//!
//! Provides a unified trait for reading raw samples from different sources:
//! pre-loaded replays (tests, synthetic rides), JSON-lines files and stdin.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::Path;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::time::{sleep, Duration};

use crate::types::RawSample;

/// Events produced by a sample source.
#[derive(Debug, Clone, PartialEq)]
pub enum SampleEvent {
    /// A sample was read.
    Sample(RawSample),
    /// Source reached end of data.
    Eof,
}

/// Where raw samples come from.
///
/// The processing loop calls [`next_sample`](SampleSource::next_sample) in a
/// `select!` with cancellation.
#[async_trait]
pub trait SampleSource: Send + 'static {
    /// Read the next sample. `Err` only on unrecoverable I/O errors.
    async fn next_sample(&mut self) -> Result<SampleEvent>;

    /// Human-readable name for logging.
    fn source_name(&self) -> &str;

    /// Latest sample the device already has, pulled once at startup.
    async fn most_recent(&mut self) -> Option<RawSample> {
        None
    }
}

// ============================================================================
// Pacing
// ============================================================================

/// Sleeps between samples in proportion to their timestamp gaps.
///
/// `speed` 1.0 is real time, 10.0 ten times faster. `None` disables pacing.
#[derive(Debug, Clone, Default)]
pub struct Pacer {
    speed: Option<f64>,
    last_ts: Option<u64>,
}

impl Pacer {
    pub fn new(speed: Option<f64>) -> Self {
        Self {
            speed: speed.filter(|s| s.is_finite() && *s > 0.0),
            last_ts: None,
        }
    }

    pub async fn wait(&mut self, timestamp: u64) {
        if let (Some(speed), Some(last)) = (self.speed, self.last_ts) {
            let gap_ms = timestamp.saturating_sub(last) as f64 / speed;
            if gap_ms >= 1.0 {
                sleep(Duration::from_millis(gap_ms as u64)).await;
            }
        }
        self.last_ts = Some(self.last_ts.map_or(timestamp, |last| last.max(timestamp)));
    }
}

// ============================================================================
// Replay Source (pre-loaded samples)
// ============================================================================

/// Replays pre-loaded samples, optionally paced by their timestamps.
pub struct ReplaySource {
    samples: std::vec::IntoIter<RawSample>,
    pacer: Pacer,
    name: String,
    last_known: Option<RawSample>,
}

impl ReplaySource {
    pub fn new(samples: Vec<RawSample>) -> Self {
        Self {
            samples: samples.into_iter(),
            pacer: Pacer::default(),
            name: "replay".to_string(),
            last_known: None,
        }
    }

    /// Sample the device reported before streaming started.
    pub fn with_last_known(mut self, sample: RawSample) -> Self {
        self.last_known = Some(sample);
        self
    }

    pub fn paced(mut self, speed: f64) -> Self {
        self.pacer = Pacer::new(Some(speed));
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Samples not yet yielded.
    pub fn remaining(&self) -> usize {
        self.samples.len()
    }
}

#[async_trait]
impl SampleSource for ReplaySource {
    async fn next_sample(&mut self) -> Result<SampleEvent> {
        match self.samples.next() {
            Some(sample) => {
                self.pacer.wait(sample.timestamp).await;
                Ok(SampleEvent::Sample(sample))
            }
            None => Ok(SampleEvent::Eof),
        }
    }

    fn source_name(&self) -> &str {
        &self.name
    }

    async fn most_recent(&mut self) -> Option<RawSample> {
        self.last_known.take()
    }
}

// ============================================================================
// JSON Lines Source (stdin / file)
// ============================================================================

/// Reads one JSON [`RawSample`] per line.
///
/// Blank lines are ignored; malformed lines are logged and skipped.
///
/// `{"acc":{"x":0,"y":0,"z":16384},"gyro":{"x":0,"y":0,"z":0},"lat":59.9,"lon":10.7,"timestamp":1700000000000}`
pub struct JsonLinesSource<R> {
    reader: R,
    line_buffer: Vec<u8>,
    pacer: Pacer,
    name: String,
    skipped: u64,
}

impl<R: AsyncBufRead + Unpin + Send + 'static> JsonLinesSource<R> {
    pub fn new(reader: R, name: impl Into<String>) -> Self {
        Self {
            reader,
            line_buffer: Vec::with_capacity(256),
            pacer: Pacer::default(),
            name: name.into(),
            skipped: 0,
        }
    }

    pub fn paced(mut self, speed: f64) -> Self {
        self.pacer = Pacer::new(Some(speed));
        self
    }

    /// Lines that could not be parsed so far.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }
}

impl JsonLinesSource<BufReader<tokio::io::Stdin>> {
    /// Used with a helmet bridge: `imu-bridge | helmet-guard --stdin`
    pub fn stdin() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), "stdin")
    }
}

impl JsonLinesSource<BufReader<tokio::fs::File>> {
    pub async fn open(path: &Path) -> Result<Self> {
        let file = tokio::fs::File::open(path)
            .await
            .with_context(|| format!("Failed to open replay file {}", path.display()))?;
        Ok(Self::new(BufReader::new(file), path.display().to_string()))
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send + 'static> SampleSource for JsonLinesSource<R> {
    async fn next_sample(&mut self) -> Result<SampleEvent> {
        loop {
            self.line_buffer.clear();
            let bytes = self.reader.read_until(b'\n', &mut self.line_buffer).await?;
            if bytes == 0 {
                return Ok(SampleEvent::Eof);
            }
            let line = match std::str::from_utf8(&self.line_buffer) {
                Ok(text) => text.trim(),
                Err(e) => {
                    self.skipped += 1;
                    tracing::warn!("[{}] Skipping line with invalid UTF-8: {}", self.name, e);
                    continue;
                }
            };
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<RawSample>(line) {
                Ok(sample) => {
                    self.pacer.wait(sample.timestamp).await;
                    return Ok(SampleEvent::Sample(sample));
                }
                Err(e) => {
                    self.skipped += 1;
                    tracing::warn!("[{}] Failed to parse sample: {}", self.name, e);
                }
            }
        }
    }

    fn source_name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Vec3;

    fn sample(ts: u64) -> RawSample {
        RawSample {
            acc: Vec3::new(0.0, 0.0, 16384.0),
            gyro: Vec3::ZERO,
            lat: 0.0,
            lon: 0.0,
            timestamp: ts,
        }
    }

    #[tokio::test]
    async fn test_replay_yields_then_eof() {
        let mut src = ReplaySource::new(vec![sample(1), sample(2)]);
        assert_eq!(src.next_sample().await.expect("ok"), SampleEvent::Sample(sample(1)));
        assert_eq!(src.remaining(), 1);
        assert_eq!(src.next_sample().await.expect("ok"), SampleEvent::Sample(sample(2)));
        assert_eq!(src.next_sample().await.expect("ok"), SampleEvent::Eof);
        assert!(src.most_recent().await.is_none());
    }

    #[tokio::test]
    async fn test_most_recent_pulled_once() {
        let mut src = ReplaySource::new(vec![]).with_last_known(sample(5));
        assert_eq!(src.most_recent().await, Some(sample(5)));
        assert_eq!(src.most_recent().await, None);
    }

    #[tokio::test]
    async fn test_json_lines_skips_malformed() {
        let input = format!(
            "{}\n\nnot json\n{}\n",
            serde_json::to_string(&sample(10)).expect("ser"),
            serde_json::to_string(&sample(20)).expect("ser"),
        );
        let mut src = JsonLinesSource::new(std::io::Cursor::new(input.into_bytes()), "test");
        let mut timestamps = Vec::new();
        while let SampleEvent::Sample(s) = src.next_sample().await.expect("ok") {
            timestamps.push(s.timestamp);
        }
        assert_eq!(timestamps, vec![10, 20]);
        assert_eq!(src.skipped(), 1);
    }

    #[tokio::test]
    async fn test_json_lines_survives_invalid_utf8() {
        let mut input = serde_json::to_vec(&sample(10)).expect("ser");
        input.extend_from_slice(b"\n\xff\xfe garbage\n");
        input.extend_from_slice(&serde_json::to_vec(&sample(20)).expect("ser"));
        input.push(b'\n');

        let mut src = JsonLinesSource::new(std::io::Cursor::new(input), "garbled");
        assert_eq!(src.next_sample().await.expect("ok"), SampleEvent::Sample(sample(10)));
        assert_eq!(src.next_sample().await.expect("ok"), SampleEvent::Sample(sample(20)));
        assert_eq!(src.next_sample().await.expect("ok"), SampleEvent::Eof);
        assert_eq!(src.skipped(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pacing_follows_timestamps() {
        let mut src = ReplaySource::new(vec![sample(0), sample(1_000), sample(3_000)]).paced(2.0);
        let start = tokio::time::Instant::now();
        while let SampleEvent::Sample(_) = src.next_sample().await.expect("ok") {}
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(1_500) && elapsed < Duration::from_millis(1_600));
    }

    #[tokio::test]
    async fn test_open_missing_file_errors() {
        assert!(JsonLinesSource::open(Path::new("/nonexistent/ride.jsonl")).await.is_err());
    }
}
