//! Digest-based change detection.
//!
//! Before computing a metric, the consumer asks whether the content digest
//! for its channel(s) differs from the one stored alongside the previous
//! result. `Some(digest)` means "compute and submit this digest with the
//! result"; `None` means nothing needs to be (or can be) computed.

use super::{DayContext, EngineError};
use crate::channel::{Channel, ChannelArray};
use crate::digest::Digest;
use crate::store::MetricValueIdentifier;

impl DayContext {
    /// Single-channel convenience wrapper around [`DayContext::digest_changed`].
    pub fn digest_changed_channel(
        &self,
        channel: &Channel,
        id: &MetricValueIdentifier,
        version: u64,
        force_update: bool,
        metadata_only: bool,
    ) -> Option<Digest> {
        let array = ChannelArray::single(channel.clone());
        self.digest_changed(&array, id, version, force_update, metadata_only)
    }

    /// Decides whether a metric over `array` needs recomputation.
    ///
    /// `version` is the requesting metric's algorithm version; it is mixed
    /// into the digest, so bumping it invalidates every stored result for
    /// that metric. `force_update` returns the new digest even when it
    /// matches the stored one. `metadata_only` marks the requesting metric
    /// as computable from metadata alone (the availability class); only
    /// such metrics receive a digest when no sample data exists.
    ///
    /// Returns `None` when metadata is absent (even after attempting
    /// rotation synthesis), when data is absent for a data-requiring
    /// metric, or when the stored digest shows nothing changed. With no
    /// store connection, always returns the new digest so detached scans
    /// recompute everything.
    ///
    /// Serialized with rotation derivation on the per-context derivation
    /// lock, so two concurrent callers cannot both decide "changed" for
    /// the same request and a derived channel is built at most once.
    pub fn digest_changed(
        &self,
        array: &ChannelArray,
        id: &MetricValueIdentifier,
        version: u64,
        force_update: bool,
        metadata_only: bool,
    ) -> Option<Digest> {
        let _guard = self.lock_derivation();

        // Metadata is required to digest anything. A derived channel
        // (e.g., "00-LHND") may be seeing its first request; try to
        // synthesize its metadata and data before giving up.
        if !self.has_metadata_array(array) {
            self.ensure_rotated_channels(array);
        } else if array.channels().iter().any(|c| c.is_derived() && !self.has_channel_data(c)) {
            self.ensure_rotated_channels(array);
        }

        if !self.has_metadata_array(array) {
            if let Some(channel) = array.channels().first() {
                self.sink().warn(
                    &self.scope(channel),
                    "no metadata to compute a digest for this channel array",
                );
            }
            return None;
        }

        let has_data = self.has_channel_array_data(array);
        if !has_data && !metadata_only {
            return None;
        }

        let content_digest = match self.array_digest(array) {
            Ok(digest) => digest,
            Err(err) => {
                if let Some(channel) = array.channels().first() {
                    self.sink().warn(&self.scope(channel), &err.to_string());
                }
                return None;
            }
        };
        let version_digest = Digest::of_bytes(&version.to_le_bytes());
        let new_digest = Digest::combine([&content_digest, &version_digest]);

        // No store, or an unreachable one: recompute unconditionally
        // rather than blocking on the backend.
        let store = match self.store() {
            Some(store) if store.connected() => store,
            _ => return Some(new_digest),
        };

        match store.get_digest(id) {
            None => Some(new_digest),
            Some(old_digest) if old_digest == new_digest => {
                if force_update {
                    log::info!(
                        "digest_changed: {} digests equal but forceUpdate is set, recomputing",
                        id
                    );
                    Some(new_digest)
                } else {
                    None
                }
            }
            Some(_) if !has_data && !force_update => {
                // A previous result exists but there is nothing to
                // recompute it from now.
                log::info!("digest_changed: {} entry found but no data to recompute", id);
                None
            }
            Some(_) => Some(new_digest),
        }
    }

    /// Combined digest for the array: per channel in array order, the
    /// metadata digest followed by the data digest when data exists.
    ///
    /// Metadata-only metrics on channels lacking data still receive a
    /// defined (data-less) digest.
    pub(crate) fn array_digest(&self, array: &ChannelArray) -> Result<Digest, EngineError> {
        let mut parts: Vec<Digest> = Vec::with_capacity(array.len() * 2);
        for channel in array.channels() {
            let metadata = self
                .channel_metadata(channel)
                .ok_or_else(|| EngineError::MetadataMissing {
                    channel: channel.clone(),
                })?;
            parts.push(metadata.digest);
            if let Some(data_digest) = self.channel_digest(channel) {
                parts.push(data_digest);
            }
        }
        Ok(Digest::combine(parts.iter()))
    }
}
