/*!
Report structures composed by the driver for management queries.
*/

use crate::flags::{CableLength, FlagLevels};
use serde::{Deserialize, Serialize};

/// Transceiver form factor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransceiverType {
    Sfp,
    Qsfp,
}

/// Vendor identity strings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Vendor {
    pub name: String,
    pub oui: String,
    pub part_number: String,
    pub rev: String,
    pub serial_number: String,
    pub date_code: String,
}

/// One monitored value together with its alarm/warning flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Sensor {
    pub value: f64,
    pub flags: FlagLevels,
}

/// Module-wide sensors
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalSensors {
    pub temp: Sensor,
    pub vcc: Sensor,
}

/// Per-channel sensors. QSFP modules do not report TX power.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelSensors {
    pub rx_pwr: Sensor,
    pub tx_bias: Sensor,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub channel: usize,
    pub sensors: ChannelSensors,
}

/// Alarm and warning thresholds of one monitored quantity
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ThresholdLevels {
    pub alarm_high: f64,
    pub alarm_low: f64,
    pub warn_high: f64,
    pub warn_low: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AlarmThreshold {
    pub temp: ThresholdLevels,
    pub vcc: ThresholdLevels,
    pub rx_pwr: ThresholdLevels,
    pub tx_bias: ThresholdLevels,
}

/// Supported link lengths per media type, in meters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cable {
    pub single_mode: CableLength,
    pub om3: CableLength,
    pub om2: CableLength,
    pub om1: CableLength,
    pub copper: CableLength,
}

impl Cable {
    /// Whether any media type has a length specified
    pub fn any_specified(&self) -> bool {
        [self.single_mode, self.om3, self.om2, self.om1, self.copper]
            .iter()
            .any(CableLength::is_specified)
    }
}

/// Everything known about the transceiver in one port.
///
/// Sections the module cannot provide are `None` (or, for channels, empty);
/// a partial report is still a valid report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransceiverInfo {
    pub port: String,
    pub present: bool,
    pub transceiver: TransceiverType,
    pub flat_memory: bool,
    pub dom_supported: Option<bool>,
    pub sensor: Option<GlobalSensors>,
    pub vendor: Option<Vendor>,
    pub cable: Option<Cable>,
    pub thresholds: Option<AlarmThreshold>,
    pub channels: Vec<Channel>,
}

impl TransceiverInfo {
    /// Report with identity fields only; sections are filled in by the driver
    pub fn new(port: impl Into<String>, transceiver: TransceiverType, present: bool) -> Self {
        Self {
            port: port.into(),
            present,
            transceiver,
            flat_memory: false,
            dom_supported: None,
            sensor: None,
            vendor: None,
            cable: None,
            thresholds: None,
            channels: Vec::new(),
        }
    }
}
