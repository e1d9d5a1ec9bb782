//! Windowed data access: arbitrary window queries with day-boundary
//! stitching, full-day padding, and gap-excluding linear detrend.
//!
//! All windows are half-open `[start_ms, end_ms)` epoch milliseconds.

use super::{DayContext, EngineError, NeighborSide};
use crate::channel::Channel;
use crate::timeseries::{SampleBuffer, TimeRange, DAY_MILLIS};
use std::sync::Arc;

impl DayContext {
    /// Extracts the channel's samples over `[start_ms, end_ms)`.
    ///
    /// Windows reaching before the day buffer's start or past its end are
    /// resolved through the linked previous/next day contexts and
    /// concatenated in chronological order. Failure modes:
    ///
    /// - start after end: `InvalidWindow`
    /// - no data for the channel, or the window entirely outside the day's
    ///   buffer: `NoData`
    /// - a window inside the day's span that is not fully contained (a
    ///   genuine hole): `GapInWindow`
    /// - a needed neighbor missing or lacking the channel:
    ///   `MissingNeighbor` (never a silent truncation)
    /// - neighbor sample interval differing from the day's:
    ///   `SampleRateMismatch` (never silently resampled)
    pub fn windowed_data(
        &self,
        channel: &Channel,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<f64>, EngineError> {
        if start_ms > end_ms {
            return Err(EngineError::InvalidWindow { start_ms, end_ms });
        }

        let buffer = self.channel_buffer(channel).ok_or_else(|| {
            EngineError::NoData(format!("no samples for channel=[{}]", channel))
        })?;
        let day = buffer.span();

        // Entirely outside the day's own buffer: truly absent for this day.
        if end_ms <= day.start_ms || start_ms >= day.end_ms {
            return Err(EngineError::NoData(format!(
                "window [{} - {}) entirely outside day span [{} - {}) for channel=[{}]",
                start_ms, end_ms, day.start_ms, day.end_ms, channel
            )));
        }

        if buffer.contains_window(start_ms, end_ms) {
            return Ok(buffer.extract(start_ms, end_ms));
        }

        let need_previous = start_ms < day.start_ms;
        let need_next = end_ms > day.end_ms;
        if !need_previous && !need_next {
            // Inside the span but not containable: a genuine hole.
            self.sink()
                .warn(&self.scope(channel), "gap found inside requested window");
            return Err(EngineError::GapInWindow {
                channel: channel.clone(),
            });
        }

        let previous = if need_previous {
            Some(self.require_neighbor(channel, &buffer, NeighborSide::Previous)?)
        } else {
            None
        };
        let next = if need_next {
            Some(self.require_neighbor(channel, &buffer, NeighborSide::Next)?)
        } else {
            None
        };

        // Assemble portions in chronological order.
        let current_range = TimeRange::new(start_ms.max(day.start_ms), end_ms.min(day.end_ms));
        let mut result = Vec::new();
        if let Some(previous) = &previous {
            let portion = previous.windowed_data(channel, start_ms, day.start_ms)?;
            result.extend(portion);
        }
        result.extend(self.windowed_data(channel, current_range.start_ms, current_range.end_ms)?);
        if let Some(next) = &next {
            let portion = next.windowed_data(channel, day.end_ms, end_ms)?;
            result.extend(portion);
        }
        Ok(result)
    }

    /// Resolves a needed neighbor context, verifying it has the channel and
    /// that its sample interval matches the current day's.
    fn require_neighbor(
        &self,
        channel: &Channel,
        buffer: &SampleBuffer,
        side: NeighborSide,
    ) -> Result<Arc<DayContext>, EngineError> {
        let neighbor = match side {
            NeighborSide::Previous => self.previous_day(),
            NeighborSide::Next => self.next_day(),
        };
        let neighbor = match neighbor {
            Some(neighbor) if neighbor.has_channel_data(channel) => neighbor,
            _ => {
                self.sink().warn(
                    &self.scope(channel),
                    &format!("missing {} day's data for boundary-spanning window", side),
                );
                return Err(EngineError::MissingNeighbor {
                    side,
                    channel: channel.clone(),
                });
            }
        };

        if let Some(neighbor_buffer) = neighbor.channel_buffer(channel) {
            if neighbor_buffer.interval_ms() != buffer.interval_ms() {
                self.sink().warn(
                    &self.scope(channel),
                    &format!(
                        "{} day's sample interval {} ms doesn't match current day's {} ms",
                        side,
                        neighbor_buffer.interval_ms(),
                        buffer.interval_ms()
                    ),
                );
                return Err(EngineError::SampleRateMismatch {
                    channel: channel.clone(),
                    expected_interval_ms: buffer.interval_ms(),
                    actual_interval_ms: neighbor_buffer.interval_ms(),
                });
            }
        }
        Ok(neighbor)
    }

    /// Exactly one calendar day (86400 s) of the channel's data anchored at
    /// the station-day's midnight, with internal gaps and missing leading/
    /// trailing spans zero-filled.
    pub fn padded_day_data(&self, channel: &Channel) -> Result<Vec<f64>, EngineError> {
        let buffer = self.channel_buffer(channel).ok_or_else(|| {
            EngineError::NoData(format!("no samples for channel=[{}]", channel))
        })?;
        let day_start = self.day_start_ms();
        Ok(buffer.extract(day_start, day_start + DAY_MILLIS))
    }

    /// Padded day data with a linear trend removed.
    ///
    /// The trend is an ordinary least-squares fit of sample index vs. value
    /// over only the points outside every known gap, including the gaps
    /// introduced by padding before the buffer's first real sample and
    /// after its last. Gap points keep the zero-fill value.
    pub fn detrended_padded_day_data(&self, channel: &Channel) -> Result<Vec<f64>, EngineError> {
        let buffer = self.channel_buffer(channel).ok_or_else(|| {
            EngineError::NoData(format!("no samples for channel=[{}]", channel))
        })?;
        let day_start = self.day_start_ms();
        let day_end = day_start + DAY_MILLIS;
        let mut data = buffer.extract(day_start, day_end);

        // The exclusion set covers recorded gaps plus the padding outside
        // the buffer's real span.
        let mut gaps: Vec<TimeRange> = buffer.gap_boundaries().to_vec();
        if day_start < buffer.start_ms() {
            gaps.push(TimeRange::new(day_start, buffer.start_ms()));
        }
        if day_end > buffer.end_ms() {
            gaps.push(TimeRange::new(buffer.end_ms(), day_end));
        }

        let interval = buffer.interval_ms();
        let first_slot = slot_time(&buffer, day_start);
        let excluded: Vec<bool> = (0..data.len())
            .map(|i| {
                let t = first_slot + interval * i as i64;
                gaps.iter().any(|gap| gap.contains(t))
            })
            .collect();

        if let Some((slope, intercept)) = fit_line(&data, &excluded) {
            for (i, value) in data.iter_mut().enumerate() {
                if !excluded[i] {
                    *value -= slope * i as f64 + intercept;
                }
            }
        }
        Ok(data)
    }
}

/// Timestamp of the first extraction slot at or after `start_ms` on the
/// buffer's sample grid.
fn slot_time(buffer: &SampleBuffer, start_ms: i64) -> i64 {
    let offset = start_ms - buffer.start_ms();
    let interval = buffer.interval_ms();
    let index = if offset % interval > 0 {
        offset / interval + 1
    } else {
        offset / interval
    };
    buffer.start_ms() + index * interval
}

/// Ordinary least squares over the non-excluded points only.
///
/// Returns `(slope, intercept)` in index space, or `None` when fewer than
/// two points are included or the fit is degenerate.
fn fit_line(data: &[f64], excluded: &[bool]) -> Option<(f64, f64)> {
    let mut n = 0.0;
    let mut sum_x = 0.0;
    let mut sum_y = 0.0;
    let mut sum_xx = 0.0;
    let mut sum_xy = 0.0;
    for (i, value) in data.iter().enumerate() {
        if excluded[i] {
            continue;
        }
        let x = i as f64;
        n += 1.0;
        sum_x += x;
        sum_y += value;
        sum_xx += x * x;
        sum_xy += x * value;
    }
    if n < 2.0 {
        return None;
    }
    let denominator = n * sum_xx - sum_x * sum_x;
    if denominator == 0.0 {
        return None;
    }
    let slope = (n * sum_xy - sum_x * sum_y) / denominator;
    let intercept = (sum_y - slope * sum_x) / n;
    Some((slope, intercept))
}
