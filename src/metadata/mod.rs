//! Station metadata for one station-day.
//!
//! Per-channel sample rate, coordinates, azimuth, and instrument response
//! stages, plus the metadata digest bytes used in change detection. The
//! metadata map can grow during a day's scan: requesting a derived
//! (rotated) channel synthesizes metadata for it from the source
//! horizontal channel.

use crate::channel::{Channel, ChannelArray, ChannelKey, Station, DERIVED_EAST_SUFFIX, DERIVED_NORTH_SUFFIX};
use crate::digest::Digest;
use chrono::{NaiveDate, NaiveTime};
use std::collections::HashMap;
use std::fmt;

/// Errors raised by metadata lookup and synthesis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataError {
    /// No horizontal source channel exists to synthesize a derived channel from.
    NoSourceChannel { location: String, prefix: String },
}

impl fmt::Display for MetadataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataError::NoSourceChannel { location, prefix } => write!(
                f,
                "No horizontal source channel metadata at location [{}] for prefix [{}]",
                location, prefix
            ),
        }
    }
}

impl std::error::Error for MetadataError {}

/// One stage of an instrument response. Stage 0 carries the overall gain.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseStage {
    pub stage: u32,
    pub gain: f64,
    pub description: String,
}

impl ResponseStage {
    pub fn new(stage: u32, gain: f64, description: impl Into<String>) -> Self {
        Self {
            stage,
            gain,
            description: description.into(),
        }
    }
}

/// Metadata for one channel of the station.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelMetadata {
    pub sample_rate_hz: f64,
    pub latitude: f64,
    pub longitude: f64,
    /// Azimuth of positive ground motion, degrees clockwise from north.
    pub azimuth_degrees: f64,
    /// Ordered response stages; stage 0 is the overall gain.
    pub stages: Vec<ResponseStage>,
    /// Digest of the channel's metadata content.
    pub digest: Digest,
}

impl ChannelMetadata {
    /// Overall gain from stage 0, if present.
    pub fn overall_gain(&self) -> Option<f64> {
        self.stages.iter().find(|s| s.stage == 0).map(|s| s.gain)
    }
}

/// All channel metadata for one station-day.
#[derive(Debug, Clone)]
pub struct StationMetadata {
    station: Station,
    date: NaiveDate,
    channels: HashMap<ChannelKey, ChannelMetadata>,
}

impl StationMetadata {
    pub fn new(
        station: Station,
        date: NaiveDate,
        channels: HashMap<ChannelKey, ChannelMetadata>,
    ) -> Self {
        Self {
            station,
            date,
            channels,
        }
    }

    pub fn station(&self) -> &Station {
        &self.station
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    /// Epoch milliseconds of the station-day's midnight (UTC).
    pub fn day_start_ms(&self) -> i64 {
        self.date.and_time(NaiveTime::MIN).and_utc().timestamp_millis()
    }

    pub fn has_channel(&self, channel: &Channel) -> bool {
        self.channels.contains_key(channel.key())
    }

    pub fn has_channels(&self, array: &ChannelArray) -> bool {
        array.channels().iter().all(|c| self.has_channel(c))
    }

    pub fn channel_metadata(&self, channel: &Channel) -> Option<&ChannelMetadata> {
        self.channels.get(channel.key())
    }

    pub fn insert_channel(&mut self, key: ChannelKey, metadata: ChannelMetadata) {
        self.channels.insert(key, metadata);
    }

    /// Channels present in the metadata, in no particular order.
    pub fn channels(&self) -> impl Iterator<Item = Channel> + '_ {
        self.channels
            .keys()
            .map(|key| Channel::new(key.location.clone(), key.code.clone()))
    }

    /// Synthesizes metadata for the derived pair `{prefix}ND`/`{prefix}ED`
    /// at the given location.
    ///
    /// The source is the `{prefix}1` horizontal if present, else
    /// `{prefix}N`. Derived azimuths are fixed at 0 (north) and 90 (east);
    /// sample rate, coordinates, and response stages carry over. The
    /// derived digest mixes the source digest with the derived code so it
    /// is stable across runs.
    pub fn synthesize_rotated_channel(
        &mut self,
        location: &str,
        prefix: &str,
    ) -> Result<(), MetadataError> {
        let source = self
            .channels
            .get(&ChannelKey::new(location, format!("{}1", prefix)))
            .or_else(|| self.channels.get(&ChannelKey::new(location, format!("{}N", prefix))))
            .cloned()
            .ok_or_else(|| MetadataError::NoSourceChannel {
                location: location.to_string(),
                prefix: prefix.to_string(),
            })?;

        for (suffix, azimuth) in [(DERIVED_NORTH_SUFFIX, 0.0), (DERIVED_EAST_SUFFIX, 90.0)] {
            let code = format!("{}{}", prefix, suffix);
            let key = ChannelKey::new(location, code.clone());
            if self.channels.contains_key(&key) {
                continue;
            }
            let mut bytes = source.digest.as_bytes().to_vec();
            bytes.extend_from_slice(code.as_bytes());
            let derived = ChannelMetadata {
                sample_rate_hz: source.sample_rate_hz,
                latitude: source.latitude,
                longitude: source.longitude,
                azimuth_degrees: azimuth,
                stages: source.stages.clone(),
                digest: Digest::of_bytes(&bytes),
            };
            self.channels.insert(key, derived);
        }
        Ok(())
    }
}
