//! Gap-aware sample buffer for one channel over a bounded span.
//!
//! A `SampleBuffer` owns a contiguous sample array at a fixed interval.
//! Positions that fall inside a recorded gap hold the zero-fill value;
//! the gap boundaries are kept alongside so consumers can distinguish
//! real zeros from fill.

use super::{TimeRange, ONE_HZ_INTERVAL_MS};
use std::fmt;

/// Errors raised by buffer construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BufferError {
    /// Sample interval must be strictly positive.
    NonPositiveInterval(i64),
    /// Gap list must be sorted by start and non-overlapping.
    UnorderedGaps,
    /// A gap lies outside the buffer's span.
    GapOutOfSpan(TimeRange),
}

impl fmt::Display for BufferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BufferError::NonPositiveInterval(ms) => {
                write!(f, "Sample interval must be positive, got {} ms", ms)
            }
            BufferError::UnorderedGaps => {
                write!(f, "Gap boundaries must be sorted and non-overlapping")
            }
            BufferError::GapOutOfSpan(gap) => write!(
                f,
                "Gap [{} - {}) lies outside the buffer span",
                gap.start_ms, gap.end_ms
            ),
        }
    }
}

impl std::error::Error for BufferError {}

/// Fixed-interval sample container with recorded gap boundaries.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    samples: Vec<f64>,
    interval_ms: i64,
    start_ms: i64,
    /// Sorted, non-overlapping gap ranges inside `[start_ms, end_ms)`.
    gaps: Vec<TimeRange>,
}

impl SampleBuffer {
    /// Creates a buffer, validating interval and gap invariants.
    pub fn new(
        samples: Vec<f64>,
        interval_ms: i64,
        start_ms: i64,
        gaps: Vec<TimeRange>,
    ) -> Result<Self, BufferError> {
        if interval_ms <= 0 {
            return Err(BufferError::NonPositiveInterval(interval_ms));
        }
        let end_ms = start_ms + interval_ms * samples.len() as i64;
        let mut previous_end = start_ms;
        for gap in &gaps {
            if gap.start_ms < previous_end || gap.is_empty() {
                return Err(BufferError::UnorderedGaps);
            }
            if gap.start_ms < start_ms || gap.end_ms > end_ms {
                return Err(BufferError::GapOutOfSpan(*gap));
            }
            previous_end = gap.end_ms;
        }
        Ok(Self {
            samples,
            interval_ms,
            start_ms,
            gaps,
        })
    }

    /// Gap-free buffer over `samples.len()` points starting at `start_ms`.
    pub fn contiguous(
        samples: Vec<f64>,
        interval_ms: i64,
        start_ms: i64,
    ) -> Result<Self, BufferError> {
        Self::new(samples, interval_ms, start_ms, Vec::new())
    }

    pub fn start_ms(&self) -> i64 {
        self.start_ms
    }

    /// One past the last sample slot: `start_ms + interval_ms * len`.
    pub fn end_ms(&self) -> i64 {
        self.start_ms + self.interval_ms * self.samples.len() as i64
    }

    pub fn interval_ms(&self) -> i64 {
        self.interval_ms
    }

    /// Sample rate in Hz derived from the fixed interval.
    pub fn sample_rate(&self) -> f64 {
        ONE_HZ_INTERVAL_MS as f64 / self.interval_ms as f64
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    /// The buffer's span as a half-open range.
    pub fn span(&self) -> TimeRange {
        TimeRange::new(self.start_ms, self.end_ms())
    }

    /// Recorded gap boundaries, sorted by start.
    pub fn gap_boundaries(&self) -> &[TimeRange] {
        &self.gaps
    }

    /// Returns true if `t` falls inside a recorded gap.
    pub fn in_gap(&self, t: i64) -> bool {
        self.gaps.iter().any(|gap| gap.contains(t))
    }

    /// Returns true if the buffer fully contains `[start, end)`.
    pub fn contains_window(&self, start_ms: i64, end_ms: i64) -> bool {
        start_ms >= self.start_ms && end_ms <= self.end_ms()
    }

    /// Extracts samples over `[start_ms, end_ms)`, zero-filling slots that
    /// fall outside the buffer's span.
    ///
    /// Output slots lie on the buffer's sample grid (anchored at the buffer
    /// start, extended beyond its span as needed). Slots inside recorded
    /// gaps carry the stored zero-fill value.
    pub fn extract(&self, start_ms: i64, end_ms: i64) -> Vec<f64> {
        if end_ms <= start_ms {
            return Vec::new();
        }
        let first = div_ceil(start_ms - self.start_ms, self.interval_ms);
        let last = div_ceil(end_ms - self.start_ms, self.interval_ms);
        let mut out = Vec::with_capacity((last - first).max(0) as usize);
        for index in first..last {
            if index >= 0 && (index as usize) < self.samples.len() {
                out.push(self.samples[index as usize]);
            } else {
                out.push(0.0);
            }
        }
        out
    }

    /// Maximal gap-free segments of the buffer's span, in order.
    pub fn contiguous_segments(&self) -> Vec<TimeRange> {
        let mut segments = Vec::with_capacity(self.gaps.len() + 1);
        let mut cursor = self.start_ms;
        for gap in &self.gaps {
            if gap.start_ms > cursor {
                segments.push(TimeRange::new(cursor, gap.start_ms));
            }
            cursor = gap.end_ms;
        }
        let end = self.end_ms();
        if end > cursor {
            segments.push(TimeRange::new(cursor, end));
        }
        segments
    }
}

/// Ceiling division for i64, correct for negative numerators.
fn div_ceil(numerator: i64, denominator: i64) -> i64 {
    let quotient = numerator / denominator;
    if numerator % denominator > 0 {
        quotient + 1
    } else {
        quotient
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_buffer() -> SampleBuffer {
        // 10 samples at 1000ms starting at t=10_000, gap over [13_000, 15_000)
        let mut samples = vec![1.0; 10];
        samples[3] = 0.0;
        samples[4] = 0.0;
        SampleBuffer::new(
            samples,
            1000,
            10_000,
            vec![TimeRange::new(13_000, 15_000)],
        )
        .unwrap()
    }

    #[test]
    fn test_span_and_rate() {
        let buffer = create_test_buffer();
        assert_eq!(buffer.start_ms(), 10_000);
        assert_eq!(buffer.end_ms(), 20_000);
        assert!((buffer.sample_rate() - 1.0).abs() < 1e-12);

        let fast = SampleBuffer::contiguous(vec![0.0], 50, 0).unwrap();
        assert!((fast.sample_rate() - 20.0).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_interval_rejected() {
        assert_eq!(
            SampleBuffer::contiguous(vec![1.0], 0, 0),
            Err(BufferError::NonPositiveInterval(0))
        );
    }

    #[test]
    fn test_unordered_gaps_rejected() {
        let gaps = vec![TimeRange::new(3000, 2000)];
        assert!(SampleBuffer::new(vec![0.0; 10], 1000, 0, gaps).is_err());

        let overlapping = vec![TimeRange::new(1000, 3000), TimeRange::new(2000, 4000)];
        assert_eq!(
            SampleBuffer::new(vec![0.0; 10], 1000, 0, overlapping),
            Err(BufferError::UnorderedGaps)
        );
    }

    #[test]
    fn test_extract_interior() {
        let buffer = create_test_buffer();
        let data = buffer.extract(11_000, 13_000);
        assert_eq!(data, vec![1.0, 1.0]);
    }

    #[test]
    fn test_extract_zero_fills_outside_span() {
        let buffer = create_test_buffer();
        let data = buffer.extract(8_000, 12_000);
        assert_eq!(data, vec![0.0, 0.0, 1.0, 1.0]);

        let data = buffer.extract(19_000, 22_000);
        assert_eq!(data, vec![1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_extract_covers_gap_with_fill() {
        let buffer = create_test_buffer();
        let data = buffer.extract(12_000, 16_000);
        assert_eq!(data, vec![1.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_contiguous_segments() {
        let buffer = create_test_buffer();
        let segments = buffer.contiguous_segments();
        assert_eq!(
            segments,
            vec![
                TimeRange::new(10_000, 13_000),
                TimeRange::new(15_000, 20_000),
            ]
        );
    }

    #[test]
    fn test_in_gap() {
        let buffer = create_test_buffer();
        assert!(buffer.in_gap(13_000));
        assert!(buffer.in_gap(14_999));
        assert!(!buffer.in_gap(15_000));
        assert!(!buffer.in_gap(12_000));
    }
}
