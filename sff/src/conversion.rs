/*!
Fixed-point to engineering unit conversions.

All monitored quantities are stored as big-endian 16-bit values. The scale
factors are the ones defined by SFF-8636 / SFF-8472 and are applied exactly.
*/

use serde::{Deserialize, Serialize};

/// Conversion applied to a raw 16-bit sensor value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SensorKind {
    /// Degrees Celsius, signed, 1/256 °C per count
    Temperature,
    /// Supply voltage in volts, 100 µV per count
    Vcc,
    /// Laser bias current in mA, 2 µA per count
    TxBias,
    /// Optical power in mW, 0.1 µW per count
    Power,
}

impl SensorKind {
    /// The conversion function for this kind
    pub fn conversion(self) -> fn(u16) -> f64 {
        conversion(self)
    }

    /// Convert a raw value
    pub fn convert(self, raw: u16) -> f64 {
        conversion(self)(raw)
    }

    /// Engineering unit of converted values
    pub fn unit(self) -> &'static str {
        match self {
            Self::Temperature => "C",
            Self::Vcc => "V",
            Self::TxBias => "mA",
            Self::Power => "mW",
        }
    }
}

/// Select the conversion function by sensor kind
pub fn conversion(kind: SensorKind) -> fn(u16) -> f64 {
    match kind {
        SensorKind::Temperature => temperature,
        SensorKind::Vcc => vcc,
        SensorKind::TxBias => tx_bias,
        SensorKind::Power => power,
    }
}

/// Render degrees Celsius from a signed 8.8 fixed-point value
pub fn temperature(raw: u16) -> f64 {
    (raw as i16) as f64 / 256.0
}

/// Render Vcc in volts
pub fn vcc(raw: u16) -> f64 {
    raw as f64 / 10000.0
}

/// Render TX bias in mA
pub fn tx_bias(raw: u16) -> f64 {
    raw as f64 * 2.0 / 1000.0
}

/// Render optical power in mW
pub fn power(raw: u16) -> f64 {
    raw as f64 * 0.1 / 1000.0
}

/// Assemble a big-endian 16-bit value from the first two bytes of `data`
pub fn be_u16(data: &[u8]) -> Option<u16> {
    match data {
        [hi, lo, ..] => Some(u16::from_be_bytes([*hi, *lo])),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temperature_conversion() {
        assert_eq!(temperature(0x1900), 25.0);
        assert_eq!(temperature(0x0080), 0.5);
        assert_eq!(temperature(0xFF00), -1.0);
        assert_eq!(temperature(0x8000), -128.0);
    }

    #[test]
    fn test_vcc_conversion() {
        assert_eq!(vcc(0x8000), 3.2768);
        assert_eq!(vcc(33000), 3.3);
        assert_eq!(vcc(0), 0.0);
    }

    #[test]
    fn test_tx_bias_conversion() {
        assert_eq!(tx_bias(0x1388), 10.0);
        assert_eq!(tx_bias(1), 0.002);
        assert_eq!(tx_bias(0xFFFF), 131.07);
    }

    #[test]
    fn test_power_conversion() {
        assert_eq!(power(0x2710), 1.0);
        assert_eq!(power(0), 0.0);
    }

    #[test]
    fn test_conversion_by_kind() {
        assert_eq!(conversion(SensorKind::Temperature)(0x1900), 25.0);
        assert_eq!(SensorKind::Vcc.convert(0x8000), 3.2768);
        assert_eq!(SensorKind::TxBias.conversion()(0x1388), 10.0);
        assert_eq!(SensorKind::Power.unit(), "mW");
    }

    #[test]
    fn test_be_u16() {
        assert_eq!(be_u16(&[0x19, 0x00]), Some(0x1900));
        assert_eq!(be_u16(&[0x12, 0x34, 0x56]), Some(0x1234));
        assert_eq!(be_u16(&[0x12]), None);
    }
}
