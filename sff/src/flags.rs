/*!
Alarm/warning flag and cable length decoding.

Flag bytes pack four levels per nibble: starting at the nibble's lowest bit
they are warning low, warning high, alarm low, alarm high. Per-channel flag
fields hold two channels per byte, high nibble first.
*/

use crate::layout::{CHANNEL_COUNT, MAX_CABLE_LEN};
use serde::{Deserialize, Serialize};

/// Which half of a flag byte to decode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Nibble {
    /// Bits 3..0
    Low,
    /// Bits 7..4
    High,
}

impl Nibble {
    fn shift(self) -> u8 {
        match self {
            Self::Low => 0,
            Self::High => 4,
        }
    }
}

/// Alarm and warning levels of one monitored quantity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagLevels {
    pub alarm_high: bool,
    pub alarm_low: bool,
    pub warn_high: bool,
    pub warn_low: bool,
}

impl FlagLevels {
    /// Decode one nibble of a flag byte
    pub fn decode(byte: u8, nibble: Nibble) -> Self {
        let bits = byte >> nibble.shift();
        Self {
            warn_low: bits & 0x1 != 0,
            warn_high: bits & 0x2 != 0,
            alarm_low: bits & 0x4 != 0,
            alarm_high: bits & 0x8 != 0,
        }
    }

    /// Decode per-channel flags from a two-byte field.
    ///
    /// The module stores channels in the order 2, 1, 4, 3 in bit terms, so
    /// reading byte 0 high, byte 0 low, byte 1 high, byte 1 low yields
    /// channels 1 through 4 in order.
    pub fn decode_channels(data: [u8; 2]) -> [Self; CHANNEL_COUNT] {
        [
            Self::decode(data[0], Nibble::High),
            Self::decode(data[0], Nibble::Low),
            Self::decode(data[1], Nibble::High),
            Self::decode(data[1], Nibble::Low),
        ]
    }

    /// Whether any alarm or warning is raised
    pub fn any(&self) -> bool {
        self.alarm_high || self.alarm_low || self.warn_high || self.warn_low
    }
}

/// Decoded single-byte cable length
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "meters", rename_all = "snake_case")]
pub enum CableLength {
    /// Raw value 0, the module does not specify this length
    NotSpecified,
    /// Length in meters
    Length(u32),
    /// Raw value 255, the cable is longer than the encoding can express
    ExceedsMax { at_least: u32 },
}

impl CableLength {
    /// Decode a raw length byte with the field's meter multiplier
    pub fn decode(raw: u8, multiplier: u32) -> Self {
        match raw {
            0 => Self::NotSpecified,
            MAX_CABLE_LEN => Self::ExceedsMax {
                at_least: u32::from(MAX_CABLE_LEN - 1) * multiplier,
            },
            n => Self::Length(u32::from(n) * multiplier),
        }
    }

    pub fn is_specified(&self) -> bool {
        !matches!(self, Self::NotSpecified)
    }

    /// Signed encoding used by older consumers: zero when not specified,
    /// negative when longer than representable
    pub fn as_signed(&self) -> i64 {
        match *self {
            Self::NotSpecified => 0,
            Self::Length(meters) => i64::from(meters),
            Self::ExceedsMax { at_least } => -i64::from(at_least),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_decoding() {
        let flags = FlagLevels::decode(0b1001_0000, Nibble::High);
        assert!(flags.alarm_high);
        assert!(!flags.alarm_low);
        assert!(!flags.warn_high);
        assert!(flags.warn_low);

        let flags = FlagLevels::decode(0b1001_0110, Nibble::Low);
        assert!(!flags.alarm_high);
        assert!(flags.alarm_low);
        assert!(flags.warn_high);
        assert!(!flags.warn_low);

        assert!(!FlagLevels::decode(0x0F, Nibble::High).any());
    }

    #[test]
    fn test_channel_flag_order() {
        // Channel 1 alarm high, channel 2 warn low, channel 3 alarm low, channel 4 warn high
        let flags = FlagLevels::decode_channels([0b1000_0001, 0b0100_0010]);
        assert!(flags[0].alarm_high && !flags[0].warn_low);
        assert!(flags[1].warn_low && !flags[1].alarm_high);
        assert!(flags[2].alarm_low && flags[2].any());
        assert!(flags[3].warn_high);
        assert_eq!(flags.iter().filter(|f| f.any()).count(), 4);
    }

    #[test]
    fn test_cable_length_decoding() {
        assert_eq!(CableLength::decode(0, 1000), CableLength::NotSpecified);
        assert_eq!(CableLength::decode(3, 1000), CableLength::Length(3000));
        assert_eq!(CableLength::decode(50, 2), CableLength::Length(100));
        assert_eq!(
            CableLength::decode(0xFF, 2),
            CableLength::ExceedsMax { at_least: 508 }
        );
    }

    #[test]
    fn test_cable_length_signed_encoding() {
        assert_eq!(CableLength::NotSpecified.as_signed(), 0);
        assert_eq!(CableLength::decode(10, 1).as_signed(), 10);
        assert_eq!(CableLength::decode(0xFF, 1).as_signed(), -254);
        assert!(!CableLength::decode(0, 1).is_specified());
        assert!(CableLength::decode(0xFF, 1).is_specified());
    }
}
