//! Day context: the per-station-day cache engine.
//!
//! A `DayContext` owns one station-day's channel data (gap-aware sample
//! buffers plus content digests) and the station metadata, and answers the
//! queries every metric computation relies on: arbitrary window extraction
//! that may span into the neighboring days, full-day padding and
//! detrending, derived-channel rotation, and digest-based change
//! detection.
//!
//! ## Concurrency
//!
//! Window, padding, and detrend queries are read-only and may run
//! unsynchronized from any number of metric workers. Digest checks and
//! rotation derivation mutate shared state (the channel map and metadata
//! can grow) and serialize on a single per-context mutex, so any synthetic
//! channel is derived at most once and two workers can't both decide
//! "digest changed" for the same request.
//!
//! ## Neighbor lifetime
//!
//! `previous`/`next` are non-owning weak references, set by the scan
//! orchestrator before boundary-spanning queries and cleared once the
//! day's metric pass completes. A context never manages its neighbors'
//! lifetimes.

mod digest_cache;
mod rotation;
mod window;

use crate::channel::{Channel, ChannelArray, ChannelKey, Station};
use crate::diag::DiagnosticSink;
use crate::digest::Digest;
use crate::metadata::{ChannelMetadata, MetadataError, StationMetadata};
use crate::store::{MetricStore, MetricValueIdentifier};
use crate::timeseries::{BufferError, SampleBuffer};
use chrono::NaiveDate;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

/// Which neighbor day a boundary-spanning query needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NeighborSide {
    Previous,
    Next,
}

impl fmt::Display for NeighborSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NeighborSide::Previous => write!(f, "previous"),
            NeighborSide::Next => write!(f, "next"),
        }
    }
}

/// Errors raised by day-context queries.
///
/// `NoData`, `GapInWindow`, and `MissingNeighbor` form the unavailable-data
/// class: the affected channel's metric is skipped and other channels
/// proceed. `SampleRateMismatch` is an inconsistency and never yields a
/// partial or resampled result. `RotationInfeasible` is typed distinctly so
/// the orchestrator can mark just the derived channel unavailable.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    /// Window start is after its end.
    InvalidWindow { start_ms: i64, end_ms: i64 },
    /// No data exists that could satisfy the request.
    NoData(String),
    /// A boundary-spanning query needed a neighbor day that is not linked
    /// or has no data for the channel.
    MissingNeighbor { side: NeighborSide, channel: Channel },
    /// The window falls inside the day's span but crosses a genuine hole.
    GapInWindow { channel: Channel },
    /// Sample intervals differ across a day boundary or a rotation pair.
    SampleRateMismatch {
        channel: Channel,
        expected_interval_ms: i64,
        actual_interval_ms: i64,
    },
    /// No metadata exists for the channel.
    MetadataMissing { channel: Channel },
    /// No valid horizontal pair or no contiguous overlap to rotate from.
    RotationInfeasible(String),
    /// A sample-buffer invariant was violated while building derived data.
    Timeseries(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::InvalidWindow { start_ms, end_ms } => {
                write!(f, "Invalid window [{} - {}]: start > end", start_ms, end_ms)
            }
            EngineError::NoData(msg) => write!(f, "No data: {}", msg),
            EngineError::MissingNeighbor { side, channel } => {
                write!(f, "Missing {} day's data for channel=[{}]", side, channel)
            }
            EngineError::GapInWindow { channel } => {
                write!(f, "Gap found in data for channel=[{}]", channel)
            }
            EngineError::SampleRateMismatch {
                channel,
                expected_interval_ms,
                actual_interval_ms,
            } => write!(
                f,
                "Sample interval mismatch for channel=[{}]: expected {} ms, got {} ms",
                channel, expected_interval_ms, actual_interval_ms
            ),
            EngineError::MetadataMissing { channel } => {
                write!(f, "Metadata not found for channel=[{}]", channel)
            }
            EngineError::RotationInfeasible(msg) => write!(f, "Cannot rotate: {}", msg),
            EngineError::Timeseries(msg) => write!(f, "Timeseries error: {}", msg),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<BufferError> for EngineError {
    fn from(err: BufferError) -> Self {
        EngineError::Timeseries(err.to_string())
    }
}

impl From<MetadataError> for EngineError {
    fn from(err: MetadataError) -> Self {
        EngineError::RotationInfeasible(err.to_string())
    }
}

/// A channel's ingested buffer and its content digest.
#[derive(Debug, Clone)]
pub(crate) struct ChannelRecord {
    pub(crate) buffer: Arc<SampleBuffer>,
    pub(crate) digest: Digest,
}

/// Mutable per-day state: the channel map (grows on rotation, never
/// shrinks) and the station metadata (grows on rotation synthesis).
pub(crate) struct DayState {
    pub(crate) metadata: StationMetadata,
    pub(crate) channels: HashMap<ChannelKey, ChannelRecord>,
}

/// One station-day's data, metadata, and cache machinery.
pub struct DayContext {
    station: Station,
    date: NaiveDate,
    day_start_ms: i64,
    state: RwLock<DayState>,
    /// Serializes digest checks and rotation derivation; both must see a
    /// consistent channel map while deciding whether to derive.
    derivation: Mutex<()>,
    derivation_count: AtomicUsize,
    store: Option<Arc<dyn MetricStore>>,
    sink: Arc<dyn DiagnosticSink>,
    previous: RwLock<Option<Weak<DayContext>>>,
    next: RwLock<Option<Weak<DayContext>>>,
}

impl DayContext {
    /// Builds a day context from ingested channel buffers and metadata.
    ///
    /// `store` is `None` when operating from a detached/offline source;
    /// digest checks then always report "changed".
    pub fn new(
        metadata: StationMetadata,
        channel_data: HashMap<ChannelKey, (SampleBuffer, Digest)>,
        store: Option<Arc<dyn MetricStore>>,
        sink: Arc<dyn DiagnosticSink>,
    ) -> Self {
        let station = metadata.station().clone();
        let date = metadata.date();
        let day_start_ms = metadata.day_start_ms();
        let channels = channel_data
            .into_iter()
            .map(|(key, (buffer, digest))| {
                (
                    key,
                    ChannelRecord {
                        buffer: Arc::new(buffer),
                        digest,
                    },
                )
            })
            .collect();
        Self {
            station,
            date,
            day_start_ms,
            state: RwLock::new(DayState { metadata, channels }),
            derivation: Mutex::new(()),
            derivation_count: AtomicUsize::new(0),
            store,
            sink,
            previous: RwLock::new(None),
            next: RwLock::new(None),
        }
    }

    pub fn station(&self) -> &Station {
        &self.station
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    /// Epoch milliseconds of this station-day's midnight (UTC).
    pub fn day_start_ms(&self) -> i64 {
        self.day_start_ms
    }

    pub(crate) fn store(&self) -> Option<&Arc<dyn MetricStore>> {
        self.store.as_ref()
    }

    pub(crate) fn sink(&self) -> &Arc<dyn DiagnosticSink> {
        &self.sink
    }

    /// Diagnostic context string for a channel-scoped report.
    pub(crate) fn scope(&self, channel: &Channel) -> String {
        format!(
            "station=[{}] date=[{}] channel=[{}]",
            self.station, self.date, channel
        )
    }

    pub(crate) fn read_state(&self) -> RwLockReadGuard<'_, DayState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn write_state(&self) -> RwLockWriteGuard<'_, DayState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn lock_derivation(&self) -> MutexGuard<'_, ()> {
        self.derivation.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// How many rotation derivations this context has performed. A second
    /// request for an already-derived channel must not increase this.
    pub fn derivation_count(&self) -> usize {
        self.derivation_count.load(Ordering::Relaxed)
    }

    pub(crate) fn record_derivation(&self) {
        self.derivation_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Whether sample data exists for the channel.
    pub fn has_channel_data(&self, channel: &Channel) -> bool {
        self.read_state().channels.contains_key(channel.key())
    }

    /// Whether sample data exists for every channel of the array.
    pub fn has_channel_array_data(&self, array: &ChannelArray) -> bool {
        let state = self.read_state();
        array
            .channels()
            .iter()
            .all(|c| state.channels.contains_key(c.key()))
    }

    /// Whether a full three-component set exists at the location for the
    /// given band+instrument prefix, trying `Z/1/2` then `Z/N/E`.
    pub fn has_three_component_set(&self, location: &str, band: &str) -> bool {
        let numeric = ChannelArray::triple(
            location,
            &format!("{}Z", band),
            &format!("{}1", band),
            &format!("{}2", band),
        );
        if self.has_channel_array_data(&numeric) {
            return true;
        }
        let named = ChannelArray::triple(
            location,
            &format!("{}Z", band),
            &format!("{}N", band),
            &format!("{}E", band),
        );
        self.has_channel_array_data(&named)
    }

    /// Whether a raw horizontal pair with data exists at the location for
    /// the given band+instrument prefix, trying `1/2` then `N/E`.
    pub fn has_horizontal_pair(&self, location: &str, band: &str) -> bool {
        [("1", "2"), ("N", "E")].iter().any(|(a, b)| {
            self.has_channel_array_data(&ChannelArray::pair(
                location,
                &format!("{}{}", band, a),
                &format!("{}{}", band, b),
            ))
        })
    }

    /// The channel's sample buffer, if data exists.
    pub fn channel_buffer(&self, channel: &Channel) -> Option<Arc<SampleBuffer>> {
        self.read_state()
            .channels
            .get(channel.key())
            .map(|record| Arc::clone(&record.buffer))
    }

    /// The channel's content digest, if data exists.
    pub fn channel_digest(&self, channel: &Channel) -> Option<Digest> {
        self.read_state()
            .channels
            .get(channel.key())
            .map(|record| record.digest)
    }

    /// Channel keys currently present in the data map, sorted for
    /// deterministic iteration.
    pub fn channel_keys(&self) -> Vec<ChannelKey> {
        let state = self.read_state();
        let mut keys: Vec<ChannelKey> = state.channels.keys().cloned().collect();
        keys.sort_by(|a, b| (&a.location, &a.code).cmp(&(&b.location, &b.code)));
        keys
    }

    /// Channels present in the day's metadata, sorted for deterministic
    /// iteration.
    pub fn metadata_channels(&self) -> Vec<Channel> {
        let state = self.read_state();
        let mut channels: Vec<Channel> = state.metadata.channels().collect();
        channels.sort_by(|a, b| {
            (a.location(), a.code()).cmp(&(b.location(), b.code()))
        });
        channels
    }

    /// Whether metadata exists for the channel.
    pub fn has_metadata(&self, channel: &Channel) -> bool {
        self.read_state().metadata.has_channel(channel)
    }

    /// Whether metadata exists for every channel of the array.
    pub fn has_metadata_array(&self, array: &ChannelArray) -> bool {
        self.read_state().metadata.has_channels(array)
    }

    /// A clone of the channel's metadata, if present.
    pub fn channel_metadata(&self, channel: &Channel) -> Option<ChannelMetadata> {
        self.read_state().metadata.channel_metadata(channel).cloned()
    }

    /// Previously stored metric value for the identifier.
    ///
    /// Returns `None` (with a warning) when no store connection exists.
    pub fn metric_value(&self, id: &MetricValueIdentifier) -> Option<f64> {
        match &self.store {
            Some(store) if store.connected() => store.get_value(id),
            _ => {
                self.sink.warn(
                    &self.scope(&id.channel),
                    "metric_value: value store is not connected",
                );
                None
            }
        }
    }

    /// Links the previous day's context (non-owning).
    pub fn set_previous(&self, previous: Weak<DayContext>) {
        *self.previous.write().unwrap_or_else(PoisonError::into_inner) = Some(previous);
    }

    /// Links the next day's context (non-owning).
    pub fn set_next(&self, next: Weak<DayContext>) {
        *self.next.write().unwrap_or_else(PoisonError::into_inner) = Some(next);
    }

    /// Clears both neighbor links so the context can be collected once the
    /// orchestrator drops it.
    pub fn clear_neighbors(&self) {
        *self.previous.write().unwrap_or_else(PoisonError::into_inner) = None;
        *self.next.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Upgraded previous-day context, if linked and still alive.
    pub fn previous_day(&self) -> Option<Arc<DayContext>> {
        self.previous
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .and_then(Weak::upgrade)
    }

    /// Upgraded next-day context, if linked and still alive.
    pub fn next_day(&self) -> Option<Arc<DayContext>> {
        self.next
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .and_then(Weak::upgrade)
    }

    /// Inserts a derived channel's buffer and digest. Entries are only ever
    /// added, never replaced or removed.
    pub(crate) fn insert_channel_data(&self, key: ChannelKey, buffer: SampleBuffer, digest: Digest) {
        let mut state = self.write_state();
        state.channels.entry(key).or_insert(ChannelRecord {
            buffer: Arc::new(buffer),
            digest,
        });
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;
    use crate::diag::CaptureSink;
    use crate::metadata::ResponseStage;
    use crate::store::MemoryStore;
    use crate::timeseries::TimeRange;

    pub(crate) const TEST_DAY_START_MS: i64 = 1_714_521_600_000; // 2024-05-01T00:00:00Z

    pub(crate) fn test_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
    }

    pub(crate) fn channel_meta(azimuth: f64, sample_rate_hz: f64) -> ChannelMetadata {
        ChannelMetadata {
            sample_rate_hz,
            latitude: 34.9459,
            longitude: -106.4572,
            azimuth_degrees: azimuth,
            stages: vec![ResponseStage::new(0, 3.43e9, "overall gain")],
            digest: Digest::of_bytes(format!("meta az={} sr={}", azimuth, sample_rate_hz).as_bytes()),
        }
    }

    pub(crate) struct ContextBuilder {
        date: NaiveDate,
        metadata: HashMap<ChannelKey, ChannelMetadata>,
        data: HashMap<ChannelKey, (SampleBuffer, Digest)>,
        store: Option<Arc<dyn MetricStore>>,
        sink: Arc<CaptureSink>,
    }

    impl ContextBuilder {
        pub(crate) fn new() -> Self {
            Self {
                date: test_date(),
                metadata: HashMap::new(),
                data: HashMap::new(),
                store: None,
                sink: Arc::new(CaptureSink::new()),
            }
        }

        pub(crate) fn date(mut self, date: NaiveDate) -> Self {
            self.date = date;
            self
        }

        pub(crate) fn store(mut self, store: Arc<MemoryStore>) -> Self {
            self.store = Some(store);
            self
        }

        pub(crate) fn meta(mut self, location: &str, code: &str, azimuth: f64, rate: f64) -> Self {
            self.metadata
                .insert(ChannelKey::new(location, code), channel_meta(azimuth, rate));
            self
        }

        pub(crate) fn buffer(mut self, location: &str, code: &str, buffer: SampleBuffer) -> Self {
            let digest = Digest::of_buffer(&buffer);
            self.data
                .insert(ChannelKey::new(location, code), (buffer, digest));
            self
        }

        pub(crate) fn sink(&self) -> Arc<CaptureSink> {
            Arc::clone(&self.sink)
        }

        pub(crate) fn build(self) -> Arc<DayContext> {
            let metadata = StationMetadata::new(Station::new("IU", "ANMO"), self.date, self.metadata);
            Arc::new(DayContext::new(metadata, self.data, self.store, self.sink))
        }
    }

    /// Full-day gap-free buffer at the given interval, constant value.
    pub(crate) fn day_buffer(start_ms: i64, interval_ms: i64, value: f64) -> SampleBuffer {
        let len = (crate::timeseries::DAY_MILLIS / interval_ms) as usize;
        SampleBuffer::contiguous(vec![value; len], interval_ms, start_ms).unwrap()
    }

    /// Buffer with explicit gaps, filled with `value` outside them.
    pub(crate) fn gapped_buffer(
        start_ms: i64,
        interval_ms: i64,
        len: usize,
        value: f64,
        gaps: Vec<TimeRange>,
    ) -> SampleBuffer {
        let mut samples = vec![value; len];
        for (i, sample) in samples.iter_mut().enumerate() {
            let t = start_ms + interval_ms * i as i64;
            if gaps.iter().any(|g| g.contains(t)) {
                *sample = 0.0;
            }
        }
        SampleBuffer::new(samples, interval_ms, start_ms, gaps).unwrap()
    }
}
