//! Time-range algebra and gap-aware sample storage.
//!
//! All time values are Unix epoch milliseconds (`i64`). All ranges and
//! window queries in this crate are half-open: `[start, end)`.

mod buffer;
mod contiguous;

pub use buffer::{BufferError, SampleBuffer};
pub use contiguous::{common_contiguous_ranges, largest_range};

use serde::{Deserialize, Serialize};

/// Milliseconds in one calendar day.
pub const DAY_MILLIS: i64 = 86_400_000;

/// Milliseconds per second, used for sample-rate/interval conversion.
pub const ONE_HZ_INTERVAL_MS: i64 = 1_000;

/// A half-open time range `[start_ms, end_ms)` in epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start_ms: i64,
    pub end_ms: i64,
}

impl TimeRange {
    pub fn new(start_ms: i64, end_ms: i64) -> Self {
        Self { start_ms, end_ms }
    }

    /// Duration in milliseconds (zero for empty/inverted ranges).
    pub fn duration_ms(&self) -> i64 {
        (self.end_ms - self.start_ms).max(0)
    }

    pub fn is_empty(&self) -> bool {
        self.end_ms <= self.start_ms
    }

    /// Returns true if `t` falls inside the range.
    pub fn contains(&self, t: i64) -> bool {
        t >= self.start_ms && t < self.end_ms
    }

    /// Intersection of two ranges, `None` if they don't overlap.
    pub fn intersect(&self, other: &TimeRange) -> Option<TimeRange> {
        let start = self.start_ms.max(other.start_ms);
        let end = self.end_ms.min(other.end_ms);
        if start < end {
            Some(TimeRange::new(start, end))
        } else {
            None
        }
    }
}
