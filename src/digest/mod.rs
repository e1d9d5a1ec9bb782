//! Content digests for change detection.
//!
//! A digest is a fixed 32-byte SHA-256 hash over a sample buffer's bytes
//! and/or channel metadata. Equality is byte-for-byte; combining multiple
//! digests is deterministic and depends on input order, so a channel
//! array's combined digest changes whenever any member's data, metadata,
//! or position changes.

use crate::timeseries::SampleBuffer;
use serde::{Deserialize, Serialize};
use sha2::{Digest as Sha2Digest, Sha256};
use std::fmt;

/// Byte length of a digest (SHA-256).
pub const DIGEST_LEN: usize = 32;

/// Fixed-size content hash.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Digest {
    #[serde(with = "base64_bytes")]
    bytes: [u8; DIGEST_LEN],
}

impl Digest {
    pub fn from_bytes(bytes: [u8; DIGEST_LEN]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.bytes
    }

    /// Hashes an arbitrary byte slice.
    pub fn of_bytes(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        Self {
            bytes: hasher.finalize().into(),
        }
    }

    /// Digest of a sample buffer: interval, start epoch, gap boundaries,
    /// and every sample's byte representation, in order.
    ///
    /// Gap boundaries are part of the content: reclassifying a zero-valued
    /// span as a gap changes the digest even when the samples are
    /// unchanged, so dependent metrics recompute.
    pub fn of_buffer(buffer: &SampleBuffer) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(buffer.interval_ms().to_le_bytes());
        hasher.update(buffer.start_ms().to_le_bytes());
        for gap in buffer.gap_boundaries() {
            hasher.update(gap.start_ms.to_le_bytes());
            hasher.update(gap.end_ms.to_le_bytes());
        }
        for sample in buffer.samples() {
            hasher.update(sample.to_le_bytes());
        }
        Self {
            bytes: hasher.finalize().into(),
        }
    }

    /// Combines member digests into one, order-dependent.
    pub fn combine<'a>(parts: impl IntoIterator<Item = &'a Digest>) -> Self {
        let mut hasher = Sha256::new();
        for part in parts {
            hasher.update(part.bytes);
        }
        Self {
            bytes: hasher.finalize().into(),
        }
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.bytes {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// Serde helper module for base64 encoding/decoding of digest bytes.
mod base64_bytes {
    use super::DIGEST_LEN;
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8; DIGEST_LEN], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; DIGEST_LEN], D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let decoded = STANDARD.decode(&s).map_err(serde::de::Error::custom)?;
        decoded
            .try_into()
            .map_err(|_| serde::de::Error::custom("digest must be 32 bytes"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeseries::SampleBuffer;

    #[test]
    fn test_buffer_digest_deterministic() {
        let a = SampleBuffer::contiguous(vec![1.0, 2.0, 3.0], 1000, 0).unwrap();
        let b = SampleBuffer::contiguous(vec![1.0, 2.0, 3.0], 1000, 0).unwrap();
        assert_eq!(Digest::of_buffer(&a), Digest::of_buffer(&b));

        let changed = SampleBuffer::contiguous(vec![1.0, 2.0, 4.0], 1000, 0).unwrap();
        assert_ne!(Digest::of_buffer(&a), Digest::of_buffer(&changed));
    }

    #[test]
    fn test_buffer_digest_covers_gap_boundaries() {
        use crate::timeseries::TimeRange;

        // Same samples, but one buffer records the zero span as a gap; the
        // digests must differ so change detection sees the reclassification.
        let plain = SampleBuffer::contiguous(vec![1.0, 0.0, 0.0, 1.0], 1000, 0).unwrap();
        let gapped = SampleBuffer::new(
            vec![1.0, 0.0, 0.0, 1.0],
            1000,
            0,
            vec![TimeRange::new(1000, 3000)],
        )
        .unwrap();
        assert_ne!(Digest::of_buffer(&plain), Digest::of_buffer(&gapped));
    }

    #[test]
    fn test_combine_is_order_dependent() {
        let x = Digest::of_bytes(b"x");
        let y = Digest::of_bytes(b"y");
        assert_ne!(Digest::combine([&x, &y]), Digest::combine([&y, &x]));
        assert_eq!(Digest::combine([&x, &y]), Digest::combine([&x, &y]));
    }

    #[test]
    fn test_serde_base64_round_trip() {
        let digest = Digest::of_bytes(b"some channel data");
        let json = serde_json::to_string(&digest).unwrap();
        let back: Digest = serde_json::from_str(&json).unwrap();
        assert_eq!(digest, back);
    }
}
