//! Station-day seismic data access and change detection.
//!
//! The crate caches one station-day of trace data and metadata as a
//! [`engine::DayContext`], serves arbitrary time windows across day
//! boundaries through weakly-linked neighbor days, synthesizes
//! horizontal-rotation channels on demand, and gates metric computation
//! on SHA-256 content digests compared against a value store.
//!
//! A scan drives a [`scan::DayWindow`] forward through the archive,
//! running [`metrics::Metric`] implementations over each resident day.

pub mod channel;
pub mod diag;
pub mod digest;
pub mod engine;
pub mod metadata;
pub mod metrics;
pub mod scan;
pub mod store;
pub mod timeseries;

pub use channel::{Channel, ChannelArray, ChannelKey, Station};
pub use digest::Digest;
pub use engine::{DayContext, EngineError};
pub use metadata::{ChannelMetadata, StationMetadata};
pub use metrics::{run_metric, scan_channels, AvailabilityMetric, Metric, ScanSummary};
pub use scan::DayWindow;
pub use store::{MemoryStore, MetricStore, MetricValueIdentifier};
pub use timeseries::{SampleBuffer, TimeRange, DAY_MILLIS};
