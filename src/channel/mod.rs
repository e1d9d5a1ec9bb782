//! Core identity types for station-day scanning.
//!
//! These types provide strongly-typed identifiers for channel lookup:
//! - `Station`: Network + station pair (e.g., "IU_ANMO")
//! - `ChannelKey`: Location + channel code, used as a genuine map key
//! - `Channel`: A channel key in the context of one station
//! - `ChannelArray`: Ordered 1-3 channel group sharing a location
//!
//! ## Derived channels
//!
//! Channel codes ending in `ND` or `ED` name synthetic rotated components
//! (e.g., "LHND"/"LHED" derived from "LH1"/"LH2"). They never arrive from
//! ingestion; the engine derives them on demand and inserts them into the
//! day's channel map under these keys.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Suffix naming a derived north component (e.g., "LHND").
pub const DERIVED_NORTH_SUFFIX: &str = "ND";
/// Suffix naming a derived east component (e.g., "LHED").
pub const DERIVED_EAST_SUFFIX: &str = "ED";

/// Network and station identifier (e.g., "IU" / "ANMO").
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Station {
    pub network: String,
    pub name: String,
}

impl Station {
    pub fn new(network: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            network: network.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for Station {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.network, self.name)
    }
}

/// Location code plus channel code, e.g., ("00", "LHZ").
///
/// Used as the key of the day's channel-data map. Lookup is exact key
/// equality; there is no substring matching, so "00-LH1" can never collide
/// with "10-00-LH1".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelKey {
    pub location: String,
    pub code: String,
}

impl ChannelKey {
    pub fn new(location: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            code: code.into(),
        }
    }

    /// Returns true if this key names a derived (rotated) component.
    pub fn is_derived(&self) -> bool {
        self.code.ends_with(DERIVED_NORTH_SUFFIX) || self.code.ends_with(DERIVED_EAST_SUFFIX)
    }

    /// Recovers the band+instrument prefix of a derived code.
    ///
    /// Returns `None` for codes that are not derived (e.g., "LHZ").
    pub fn derived_prefix(&self) -> Option<&str> {
        self.code
            .strip_suffix(DERIVED_NORTH_SUFFIX)
            .or_else(|| self.code.strip_suffix(DERIVED_EAST_SUFFIX))
            .filter(|prefix| !prefix.is_empty())
    }
}

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.location, self.code)
    }
}

/// A channel identified by location and code.
///
/// Equality is by value; channels are immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Channel {
    key: ChannelKey,
}

impl Channel {
    pub fn new(location: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            key: ChannelKey::new(location, code),
        }
    }

    pub fn key(&self) -> &ChannelKey {
        &self.key
    }

    pub fn location(&self) -> &str {
        &self.key.location
    }

    pub fn code(&self) -> &str {
        &self.key.code
    }

    /// Returns true if the code names a derived (rotated) component.
    pub fn is_derived(&self) -> bool {
        self.key.is_derived()
    }

    /// Band+instrument prefix for a derived code ("LHND" -> "LH").
    pub fn derived_prefix(&self) -> Option<&str> {
        self.key.derived_prefix()
    }

    /// Returns true for channels carrying continuous waveform data worth
    /// scanning (long-period through high-rate seismic bands).
    ///
    /// Administrative channels such as "VMU" or "LDO" return false.
    pub fn is_continuous(&self) -> bool {
        let mut chars = self.key.code.chars();
        let band = match chars.next() {
            Some(c) => c,
            None => return false,
        };
        let instrument = match chars.next() {
            Some(c) => c,
            None => return false,
        };
        matches!(band, 'L' | 'B' | 'H' | 'V') && matches!(instrument, 'H' | 'N')
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key)
    }
}

/// Ordered group of 1-3 channels sharing a location code.
///
/// Groups the horizontal pair or three-component set evaluated together by a
/// single metric. Iteration order is insertion order; digest combination
/// depends on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelArray {
    channels: Vec<Channel>,
}

impl ChannelArray {
    /// Single-channel array.
    pub fn single(channel: Channel) -> Self {
        Self {
            channels: vec![channel],
        }
    }

    /// Horizontal pair at one location.
    pub fn pair(location: &str, code_a: &str, code_b: &str) -> Self {
        Self {
            channels: vec![Channel::new(location, code_a), Channel::new(location, code_b)],
        }
    }

    /// Three-component set at one location.
    pub fn triple(location: &str, code_a: &str, code_b: &str, code_c: &str) -> Self {
        Self {
            channels: vec![
                Channel::new(location, code_a),
                Channel::new(location, code_b),
                Channel::new(location, code_c),
            ],
        }
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_key_display() {
        let key = ChannelKey::new("00", "LHZ");
        assert_eq!(key.to_string(), "00-LHZ");
    }

    #[test]
    fn test_exact_key_equality() {
        // Substring-style collisions must not be possible with map keys.
        let a = ChannelKey::new("00", "LH1");
        let b = ChannelKey::new("10", "LH1");
        assert_ne!(a, b);
        assert_eq!(a, ChannelKey::new("00", "LH1"));
    }

    #[test]
    fn test_derived_prefix() {
        assert_eq!(Channel::new("00", "LHND").derived_prefix(), Some("LH"));
        assert_eq!(Channel::new("00", "HHED").derived_prefix(), Some("HH"));
        assert_eq!(Channel::new("00", "LHZ").derived_prefix(), None);
        assert!(Channel::new("00", "LHND").is_derived());
        assert!(!Channel::new("00", "LHZ").is_derived());
    }

    #[test]
    fn test_continuous_classification() {
        assert!(Channel::new("00", "LHZ").is_continuous());
        assert!(Channel::new("00", "BH1").is_continuous());
        assert!(Channel::new("20", "HNE").is_continuous());
        assert!(!Channel::new("00", "VMU").is_continuous());
        assert!(!Channel::new("00", "LDO").is_continuous());
    }

    #[test]
    fn test_channel_array_order() {
        let array = ChannelArray::triple("00", "LHZ", "LH1", "LH2");
        let codes: Vec<&str> = array.channels().iter().map(|c| c.code()).collect();
        assert_eq!(codes, vec!["LHZ", "LH1", "LH2"]);
    }
}
