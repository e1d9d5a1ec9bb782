//! Derived-channel rotation and horizontal overlap resolution.
//!
//! Rotation turns a raw horizontal pair (e.g., "00-LH1"/"00-LH2") into
//! synthetic true-north/true-east components ("00-LHND"/"00-LHED") using
//! each source channel's azimuth. Derivation is memoized: the resulting
//! buffers are inserted into the day's channel map, so a second request
//! for the same derived channel is a plain lookup.

use super::{DayContext, EngineError};
use crate::channel::{Channel, ChannelArray, ChannelKey, DERIVED_EAST_SUFFIX, DERIVED_NORTH_SUFFIX};
use crate::digest::Digest;
use crate::timeseries::{common_contiguous_ranges, largest_range, SampleBuffer};

impl DayContext {
    /// Resolves the largest mutually contiguous time range of two channels
    /// and extracts both over exactly that range.
    ///
    /// Returns the two time-aligned sample arrays and the overlap's start
    /// epoch. A gap in either channel breaks contiguity for the pair; ties
    /// between equal-duration ranges go to the earliest. Fails with
    /// `RotationInfeasible` when no contiguous range exists.
    pub fn channel_overlap(
        &self,
        channel_x: &Channel,
        channel_y: &Channel,
    ) -> Result<(Vec<f64>, Vec<f64>, i64), EngineError> {
        let buffer_x = self.channel_buffer(channel_x).ok_or_else(|| {
            EngineError::NoData(format!("no samples for channel=[{}]", channel_x))
        })?;
        let buffer_y = self.channel_buffer(channel_y).ok_or_else(|| {
            EngineError::NoData(format!("no samples for channel=[{}]", channel_y))
        })?;

        let ranges = common_contiguous_ranges(&buffer_x, &buffer_y);
        let largest = largest_range(&ranges).ok_or_else(|| {
            EngineError::RotationInfeasible(format!(
                "no contiguous overlap between channel=[{}] and channel=[{}]",
                channel_x, channel_y
            ))
        })?;

        let data_x = buffer_x.extract(largest.start_ms, largest.end_ms);
        let data_y = buffer_y.extract(largest.start_ms, largest.end_ms);
        if data_x.is_empty() || data_x.len() != data_y.len() {
            // Defensive check only; rotation proceeds on the shorter-safe
            // assumption that extraction lengths agree.
            self.sink().warn(
                &self.scope(channel_x),
                &format!(
                    "overlap extraction length mismatch: {} vs {} samples",
                    data_x.len(),
                    data_y.len()
                ),
            );
        }
        Ok((data_x, data_y, largest.start_ms))
    }

    /// Walks a channel array and derives metadata and data for any derived
    /// (`*ND`/`*ED`) members that are missing.
    ///
    /// Per-channel failures are reported through the diagnostic sink and do
    /// not abort the walk; the caller re-checks metadata/data presence
    /// afterwards. Must be called with the derivation lock held.
    pub(crate) fn ensure_rotated_channels(&self, array: &ChannelArray) {
        for channel in array.channels() {
            let prefix = match channel.derived_prefix() {
                Some(prefix) => prefix.to_string(),
                None => continue,
            };
            let location = channel.location().to_string();

            if !self.has_metadata(channel) {
                let result = self
                    .write_state()
                    .metadata
                    .synthesize_rotated_channel(&location, &prefix);
                if let Err(err) = result {
                    self.sink().error(&self.scope(channel), &err.to_string());
                    continue;
                }
            }

            // Only derive data once the metadata exists; derivation reads
            // the source azimuths from it.
            if !self.has_channel_data(channel) && self.has_metadata(channel) {
                if let Err(err) = self.derive_rotated_data(&location, &prefix) {
                    self.sink().error(&self.scope(channel), &err.to_string());
                }
            }
        }
    }

    /// Creates the derived north/east pair for `location`/`prefix` from the
    /// raw horizontal pair and inserts both into the day's channel map.
    ///
    /// Tries naming convention `{prefix}1`/`{prefix}2` first, then
    /// `{prefix}N`/`{prefix}E`; a usable pair needs data and metadata for
    /// both members. Both source channels must share one sample interval.
    /// Must be called with the derivation lock held.
    pub(crate) fn derive_rotated_data(&self, location: &str, prefix: &str) -> Result<(), EngineError> {
        let north_key = ChannelKey::new(location, format!("{}{}", prefix, DERIVED_NORTH_SUFFIX));
        let east_key = ChannelKey::new(location, format!("{}{}", prefix, DERIVED_EAST_SUFFIX));

        let (channel_1, channel_2) = self.resolve_horizontal_pair(location, prefix)?;

        let buffer_1 = self.channel_buffer(&channel_1).ok_or_else(|| {
            EngineError::NoData(format!("no samples for channel=[{}]", channel_1))
        })?;
        let buffer_2 = self.channel_buffer(&channel_2).ok_or_else(|| {
            EngineError::NoData(format!("no samples for channel=[{}]", channel_2))
        })?;
        if buffer_1.interval_ms() != buffer_2.interval_ms() {
            return Err(EngineError::SampleRateMismatch {
                channel: channel_2.clone(),
                expected_interval_ms: buffer_1.interval_ms(),
                actual_interval_ms: buffer_2.interval_ms(),
            });
        }
        let interval_ms = buffer_1.interval_ms();

        let azimuth_1 = self
            .channel_metadata(&channel_1)
            .ok_or_else(|| EngineError::MetadataMissing {
                channel: channel_1.clone(),
            })?
            .azimuth_degrees;
        let azimuth_2 = self
            .channel_metadata(&channel_2)
            .ok_or_else(|| EngineError::MetadataMissing {
                channel: channel_2.clone(),
            })?
            .azimuth_degrees;

        let (data_1, data_2, overlap_start_ms) = self.channel_overlap(&channel_1, &channel_2)?;
        let (north, east) = rotate_to_north_east(azimuth_1, azimuth_2, &data_1, &data_2);

        let north_buffer = SampleBuffer::contiguous(north, interval_ms, overlap_start_ms)?;
        let east_buffer = SampleBuffer::contiguous(east, interval_ms, overlap_start_ms)?;
        let north_digest = Digest::of_buffer(&north_buffer);
        let east_digest = Digest::of_buffer(&east_buffer);
        self.insert_channel_data(north_key, north_buffer, north_digest);
        self.insert_channel_data(east_key, east_buffer, east_digest);
        self.record_derivation();
        Ok(())
    }

    /// Finds a usable raw horizontal pair: `{prefix}1`/`{prefix}2`, falling
    /// back to `{prefix}N`/`{prefix}E`. Both members need data and
    /// metadata.
    fn resolve_horizontal_pair(
        &self,
        location: &str,
        prefix: &str,
    ) -> Result<(Channel, Channel), EngineError> {
        for (suffix_a, suffix_b) in [("1", "2"), ("N", "E")] {
            let channel_a = Channel::new(location, format!("{}{}", prefix, suffix_a));
            let channel_b = Channel::new(location, format!("{}{}", prefix, suffix_b));
            let usable = self.has_channel_data(&channel_a)
                && self.has_channel_data(&channel_b)
                && self.has_metadata(&channel_a)
                && self.has_metadata(&channel_b);
            if usable {
                return Ok((channel_a, channel_b));
            }
        }
        Err(EngineError::RotationInfeasible(format!(
            "unable to find a horizontal pair with data and metadata at location=[{}] prefix=[{}]",
            location, prefix
        )))
    }
}

/// Rotates two time-aligned horizontal traces into true-north and
/// true-east components using each trace's azimuth (degrees clockwise
/// from north).
fn rotate_to_north_east(
    azimuth_1_degrees: f64,
    azimuth_2_degrees: f64,
    data_1: &[f64],
    data_2: &[f64],
) -> (Vec<f64>, Vec<f64>) {
    let r1 = azimuth_1_degrees.to_radians();
    let r2 = azimuth_2_degrees.to_radians();
    let len = data_1.len().min(data_2.len());
    let mut north = Vec::with_capacity(len);
    let mut east = Vec::with_capacity(len);
    for i in 0..len {
        north.push(data_1[i] * r1.cos() + data_2[i] * r2.cos());
        east.push(data_1[i] * r1.sin() + data_2[i] * r2.sin());
    }
    (north, east)
}
