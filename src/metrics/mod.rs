//! Metric consumer contract and the availability metric.
//!
//! A metric declares a name, a version, and whether it can be computed
//! from metadata alone; the runner drives the shared digest-check ->
//! compute -> submit flow against one day context. Failures stay local to
//! a (channel, day, metric) triple: a channel that can't be computed is
//! logged and skipped while the rest of the scan proceeds.

use crate::channel::Channel;
use crate::engine::{DayContext, EngineError};
use crate::store::MetricValueIdentifier;
use crate::timeseries::DAY_MILLIS;

/// Capability contract every metric implements.
///
/// New metrics are new implementations of this trait with the same narrow
/// surface; the digest/consumer protocol never varies per metric.
pub trait Metric: Send + Sync {
    /// Stable name used in value-store identifiers.
    fn name(&self) -> &'static str;

    /// Bumped when the metric's algorithm changes enough to invalidate
    /// stored results. Mixed into the change-detection digest, so a bump
    /// forces recomputation against any previously stored value.
    fn version(&self) -> u64;

    /// Whether the metric is computable from metadata alone. Only such
    /// metrics receive a digest (and thus run) for channels without data.
    fn metadata_only(&self) -> bool {
        false
    }

    /// One-line human description.
    fn description(&self) -> &'static str {
        ""
    }

    /// Computes the metric value for one channel.
    fn compute(&self, channel: &Channel, context: &DayContext) -> Result<f64, EngineError>;
}

/// Percentage of expected samples actually present in the day's trace.
///
/// Expected count comes from the metadata sample rate over a full day;
/// actual count is the number of non-gap sample slots. A channel with no
/// data at all scores 0 rather than failing, so coverage holes are
/// recorded as results.
#[derive(Debug, Default, Clone, Copy)]
pub struct AvailabilityMetric;

impl Metric for AvailabilityMetric {
    fn name(&self) -> &'static str {
        "AvailabilityMetric"
    }

    fn version(&self) -> u64 {
        1
    }

    fn metadata_only(&self) -> bool {
        true
    }

    fn description(&self) -> &'static str {
        "Returns a percentage of expected samples in the trace"
    }

    fn compute(&self, channel: &Channel, context: &DayContext) -> Result<f64, EngineError> {
        let metadata =
            context
                .channel_metadata(channel)
                .ok_or_else(|| EngineError::MetadataMissing {
                    channel: channel.clone(),
                })?;

        let expected = metadata.sample_rate_hz * (DAY_MILLIS / 1000) as f64;
        if expected <= 0.0 {
            return Err(EngineError::NoData(format!(
                "expected sample count is zero for channel=[{}]",
                channel
            )));
        }

        let buffer = match context.channel_buffer(channel) {
            Some(buffer) => buffer,
            None => return Ok(0.0),
        };

        // Compare rates loosely; archive headers round sample rates to a
        // handful of decimal places.
        let data_rate = buffer.sample_rate();
        if (data_rate - metadata.sample_rate_hz).abs() > metadata.sample_rate_hz * 1e-4 {
            context.sink().error(
                &context.scope(channel),
                &format!(
                    "sample rate mismatch: metadata {} Hz vs data {} Hz",
                    metadata.sample_rate_hz, data_rate
                ),
            );
            return Ok(0.0);
        }

        let actual: i64 = buffer
            .contiguous_segments()
            .iter()
            .map(|segment| segment.duration_ms() / buffer.interval_ms())
            .sum();

        let availability = 100.0 * actual as f64 / expected;
        if availability >= 101.0 {
            context.sink().warn(
                &context.scope(channel),
                &format!("availability {:.2}% exceeds 100%", availability),
            );
        }
        Ok(availability)
    }
}

/// Channels worth scanning on this day: continuous seismic channels
/// present in the metadata, excluding derived components (those are
/// requested explicitly by the metrics that need them).
pub fn scan_channels(context: &DayContext) -> Vec<Channel> {
    context
        .metadata_channels()
        .into_iter()
        .filter(|channel| channel.is_continuous() && !channel.is_derived())
        .collect()
}

/// Outcome counts for one metric pass over a set of channels.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScanSummary {
    /// Values computed and submitted to the store.
    pub computed: usize,
    /// Channels skipped because their digest was unchanged or
    /// uncomputable.
    pub skipped: usize,
    /// Channels whose computation failed.
    pub failed: usize,
}

/// Runs one metric over the given channels of a day context.
///
/// Per channel: digest check, then compute, then submit the value with the
/// digest it was computed under. Any failure is reported through the
/// context's diagnostic sink and counted; remaining channels proceed.
pub fn run_metric(
    metric: &dyn Metric,
    context: &DayContext,
    channels: &[Channel],
    force_update: bool,
) -> ScanSummary {
    let mut summary = ScanSummary::default();
    for channel in channels {
        let id = MetricValueIdentifier::new(
            context.date(),
            metric.name(),
            context.station().clone(),
            channel.clone(),
        );
        let digest = match context.digest_changed_channel(
            channel,
            &id,
            metric.version(),
            force_update,
            metric.metadata_only(),
        ) {
            Some(digest) => digest,
            None => {
                log::debug!("{}: digest unchanged, skipping channel=[{}]", metric.name(), channel);
                summary.skipped += 1;
                continue;
            }
        };

        match metric.compute(channel, context) {
            Ok(value) => {
                if let Some(store) = context.store() {
                    store.put_value(&id, value, digest);
                }
                summary.computed += 1;
            }
            Err(err) => {
                context.sink().error(&context.scope(channel), &err.to_string());
                summary.failed += 1;
            }
        }
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testutil::*;
    use crate::store::{MemoryStore, MetricStore};
    use crate::timeseries::TimeRange;
    use std::sync::Arc;

    const D: i64 = TEST_DAY_START_MS;

    #[test]
    fn test_availability_full_day() {
        let context = ContextBuilder::new()
            .meta("00", "LHZ", 0.0, 1.0)
            .buffer("00", "LHZ", day_buffer(D, 1000, 1.0))
            .build();
        let value = AvailabilityMetric
            .compute(&Channel::new("00", "LHZ"), &context)
            .unwrap();
        assert!((value - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_availability_counts_gaps_as_missing() {
        // A 2-hour gap in a 1 Hz day trace: 22/24 of the samples remain.
        let gap = TimeRange::new(D + 3_600_000, D + 3 * 3_600_000);
        let len = 86_400;
        let buffer = gapped_buffer(D, 1000, len, 1.0, vec![gap]);
        let context = ContextBuilder::new()
            .meta("00", "LHZ", 0.0, 1.0)
            .buffer("00", "LHZ", buffer)
            .build();

        let value = AvailabilityMetric
            .compute(&Channel::new("00", "LHZ"), &context)
            .unwrap();
        let expected = 100.0 * 22.0 / 24.0;
        assert!((value - expected).abs() < 1e-9);
    }

    #[test]
    fn test_availability_no_data_scores_zero() {
        let context = ContextBuilder::new().meta("00", "LHZ", 0.0, 1.0).build();
        let value = AvailabilityMetric
            .compute(&Channel::new("00", "LHZ"), &context)
            .unwrap();
        assert_eq!(value, 0.0);
    }

    #[test]
    fn test_run_metric_submits_and_then_skips() {
        let store = Arc::new(MemoryStore::online());
        let context = ContextBuilder::new()
            .store(Arc::clone(&store))
            .meta("00", "LHZ", 0.0, 1.0)
            .buffer("00", "LHZ", day_buffer(D, 1000, 1.0))
            .build();
        let channels = vec![Channel::new("00", "LHZ")];

        let first = run_metric(&AvailabilityMetric, &context, &channels, false);
        assert_eq!(
            first,
            ScanSummary {
                computed: 1,
                skipped: 0,
                failed: 0
            }
        );
        let id = MetricValueIdentifier::new(
            test_date(),
            "AvailabilityMetric",
            context.station().clone(),
            channels[0].clone(),
        );
        assert!((store.get_value(&id).unwrap() - 100.0).abs() < 1e-9);

        // Nothing changed: the digest now matches the stored one.
        let second = run_metric(&AvailabilityMetric, &context, &channels, false);
        assert_eq!(
            second,
            ScanSummary {
                computed: 0,
                skipped: 1,
                failed: 0
            }
        );
    }

    #[test]
    fn test_scan_channels_filters_metadata() {
        let context = ContextBuilder::new()
            .meta("00", "LHZ", 0.0, 1.0)
            .meta("00", "BH1", 35.0, 20.0)
            .meta("00", "VMU", 0.0, 0.1)
            .meta("00", "LHND", 0.0, 1.0)
            .build();

        let channels = scan_channels(&context);
        let codes: Vec<&str> = channels.iter().map(|c| c.code()).collect();
        // Sorted, continuous only, derived components excluded.
        assert_eq!(codes, vec!["BH1", "LHZ"]);
    }

    #[test]
    fn test_run_metric_channel_failures_are_local() {
        // One channel without metadata digests to None and is skipped;
        // the healthy channel still computes.
        let store = Arc::new(MemoryStore::online());
        let context = ContextBuilder::new()
            .store(store)
            .meta("00", "LHZ", 0.0, 1.0)
            .buffer("00", "LHZ", day_buffer(D, 1000, 1.0))
            .buffer("00", "BHZ", day_buffer(D, 50, 1.0))
            .build();
        let channels = vec![Channel::new("00", "BHZ"), Channel::new("00", "LHZ")];

        let summary = run_metric(&AvailabilityMetric, &context, &channels, false);
        assert_eq!(summary.computed, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failed, 0);
    }
}
