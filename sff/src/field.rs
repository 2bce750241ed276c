/*!
Field address registry.

Maps logical EEPROM fields to their physical page, offset and length. Each
module family carries its own static table; a family never consults the
other's table. Upper-page entries are declared with the absolute EEPROM
address used in the SFF documents (128-255) and stored page-relative.
*/

use crate::conversion::SensorKind;
use crate::error::{Result, SffError};
use crate::layout::PAGE_SIZE;
use serde::{Deserialize, Serialize};

macro_rules! sff_fields {
    ($($(#[$doc:meta])* $variant:ident => $name:literal,)+) => {
        /// Logical transceiver EEPROM fields
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
        pub enum SffField {
            $($(#[$doc])* $variant,)+
        }

        impl SffField {
            /// Every field in catalog order
            pub const ALL: &'static [SffField] = &[$(SffField::$variant,)+];

            /// Name as written in the SFF documents
            pub fn as_str(self) -> &'static str {
                match self {
                    $(SffField::$variant => $name,)+
                }
            }
        }
    };
}

sff_fields! {
    // Shared QSFP and SFP fields
    /// Type of transceiver
    Identifier => "IDENTIFIER",
    /// Support flags for upper pages
    Status => "STATUS",
    TemperatureAlarms => "TEMPERATURE_ALARMS",
    VccAlarms => "VCC_ALARMS",
    ChannelRxPwrAlarms => "CHANNEL_RX_PWR_ALARMS",
    ChannelTxBiasAlarms => "CHANNEL_TX_BIAS_ALARMS",
    Temperature => "TEMPERATURE",
    Vcc => "VCC",
    ChannelRxPwr => "CHANNEL_RX_PWR",
    ChannelTxBias => "CHANNEL_TX_BIAS",
    PowerControl => "POWER_CONTROL",
    EthernetCompliance => "ETHERNET_COMPLIANCE",
    ExtendedIdentifier => "EXTENDED_IDENTIFIER",
    PageSelectByte => "PAGE_SELECT_BYTE",
    /// Single mode length, in km
    LengthSmKm => "LENGTH_SM_KM",
    /// Single mode length in 100m units (SFP only)
    LengthSm => "LENGTH_SM",
    LengthOm3 => "LENGTH_OM3",
    LengthOm2 => "LENGTH_OM2",
    LengthOm1 => "LENGTH_OM1",
    LengthCopper => "LENGTH_COPPER",
    VendorName => "VENDOR_NAME",
    /// IEEE company ID of the vendor
    VendorOui => "VENDOR_OUI",
    PartNumber => "PART_NUMBER",
    RevisionNumber => "REVISION_NUMBER",
    VendorSerialNumber => "VENDOR_SERIAL_NUMBER",
    /// Manufacturing date code
    MfgDate => "MFG_DATE",
    DiagnosticMonitoringType => "DIAGNOSTIC_MONITORING_TYPE",
    TemperatureThresh => "TEMPERATURE_THRESH",
    VccThresh => "VCC_THRESH",
    RxPwrThresh => "RX_PWR_THRESH",
    TxBiasThresh => "TX_BIAS_THRESH",

    // SFP A0h fields
    ExtIdentifier => "EXT_IDENTIFIER",
    ConnectorType => "CONNECTOR_TYPE",
    TransceiverCode => "TRANSCEIVER_CODE",
    EncodingCode => "ENCODING_CODE",
    SignallingRate => "SIGNALLING_RATE",
    RateIdentifier => "RATE_IDENTIFIER",
    TransceiverCapability => "TRANSCEIVER_CAPABILITY",
    Wavelength => "WAVELENGTH",
    CheckCodeBaseId => "CHECK_CODE_BASEID",
    EnabledOptions => "ENABLED_OPTIONS",
    UpperBitRateMargin => "UPPER_BIT_RATE_MARGIN",
    LowerBitRateMargin => "LOWER_BIT_RATE_MARGIN",
    EnhancedOptions => "ENHANCED_OPTIONS",
    SffCompliance => "SFF_COMPLIANCE",
    CheckCodeExtendedOpt => "CHECK_CODE_EXTENDED_OPT",
    VendorEeprom => "VENDOR_EEPROM",

    // SFP A2h diagnostic fields
    AlarmThresholdValues => "ALARM_THRESHOLD_VALUES",
    ExternalCalibration => "EXTERNAL_CALIBRATION",
    CheckCodeDmi => "CHECK_CODE_DMI",
    Diagnostics => "DIAGNOSTICS",
    StatusControl => "STATUS_CONTROL",
    AlarmWarnFlags => "ALARM_WARN_FLAGS",
    ExtendedStatusControl => "EXTENDED_STATUS_CONTROL",
    VendorMemAddress => "VENDOR_MEM_ADDRESS",
    UserEeprom => "USER_EEPROM",
    VendorControl => "VENDOR_CONTROL",
}

impl SffField {
    /// Parse a field from its SFF name (case-insensitive)
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|field| field.as_str().eq_ignore_ascii_case(name))
    }

    /// Fixed-point encoding of the field's 16-bit values, if it holds any
    pub fn sensor_kind(self) -> Option<SensorKind> {
        match self {
            Self::Temperature | Self::TemperatureThresh => Some(SensorKind::Temperature),
            Self::Vcc | Self::VccThresh => Some(SensorKind::Vcc),
            Self::ChannelRxPwr | Self::RxPwrThresh => Some(SensorKind::Power),
            Self::ChannelTxBias | Self::TxBiasThresh => Some(SensorKind::TxBias),
            _ => None,
        }
    }

    /// Whether the field is a space-padded ASCII string
    pub fn is_text(self) -> bool {
        matches!(
            self,
            Self::VendorName
                | Self::PartNumber
                | Self::RevisionNumber
                | Self::VendorSerialNumber
                | Self::MfgDate
        )
    }

    /// Whether the field holds alarm/warning thresholds (page 3)
    pub fn is_threshold(self) -> bool {
        matches!(
            self,
            Self::TemperatureThresh | Self::VccThresh | Self::RxPwrThresh | Self::TxBiasThresh
        )
    }

    /// Whether the field is an alarm/warning flag bitfield
    pub fn is_flags(self) -> bool {
        matches!(
            self,
            Self::TemperatureAlarms
                | Self::VccAlarms
                | Self::ChannelRxPwrAlarms
                | Self::ChannelTxBiasAlarms
        )
    }
}

impl std::fmt::Display for SffField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// EEPROM pages held by the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Page {
    /// Lower 128 bytes, always accessible
    Lower,
    /// Upper page 00h, identity and vendor data
    Page0,
    /// Upper page 03h, alarm and warning thresholds
    Page3,
}

impl Page {
    pub const ALL: [Page; 3] = [Page::Lower, Page::Page0, Page::Page3];

    /// Index into per-page arrays
    pub fn index(self) -> usize {
        match self {
            Self::Lower => 0,
            Self::Page0 => 1,
            Self::Page3 => 2,
        }
    }

    /// Value written to the page select register to map this page
    pub fn select_value(self) -> Option<u8> {
        match self {
            Self::Lower => None,
            Self::Page0 => Some(0),
            Self::Page3 => Some(3),
        }
    }
}

/// Physical location of a field inside one page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldLocation {
    pub page: Page,
    pub offset: usize,
    pub length: usize,
}

impl FieldLocation {
    /// Location on the lower page
    pub const fn lower(offset: usize, length: usize) -> Self {
        Self {
            page: Page::Lower,
            offset,
            length,
        }
    }

    /// Location on an upper page, given its absolute EEPROM address (128-255)
    pub const fn upper(page: Page, address: usize, length: usize) -> Self {
        Self {
            page,
            offset: address - PAGE_SIZE,
            length,
        }
    }

    /// One past the last byte of the field
    pub fn end(&self) -> usize {
        self.offset + self.length
    }

    /// Check the location fits inside a single page
    pub fn fits_page(&self) -> bool {
        self.end() <= PAGE_SIZE
    }
}

/// Transceiver form factor families with distinct memory maps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModuleFamily {
    Qsfp,
    Sfp,
}

impl ModuleFamily {
    /// The static field table of this family
    pub fn field_map(self) -> &'static FieldMap {
        match self {
            Self::Qsfp => &QSFP_FIELDS,
            Self::Sfp => &SFP_FIELDS,
        }
    }
}

/// Immutable per-family field table
#[derive(Debug)]
pub struct FieldMap {
    family: ModuleFamily,
    fields: &'static [(SffField, FieldLocation)],
    cable_multipliers: &'static [(SffField, u32)],
}

impl FieldMap {
    pub fn family(&self) -> ModuleFamily {
        self.family
    }

    /// Look up a field, failing if it is not part of this family's table
    pub fn locate(&self, field: SffField) -> Result<FieldLocation> {
        self.fields
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, location)| *location)
            .ok_or(SffError::UnknownField {
                field,
                family: self.family,
            })
    }

    /// Whether the table defines the field
    pub fn contains(&self, field: SffField) -> bool {
        self.fields.iter().any(|(f, _)| *f == field)
    }

    /// Multiplier turning a raw cable length byte into meters
    pub fn cable_multiplier(&self, field: SffField) -> Option<u32> {
        self.cable_multipliers
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, multiplier)| *multiplier)
    }

    /// All (field, location) entries
    pub fn iter(&self) -> impl Iterator<Item = (SffField, FieldLocation)> + '_ {
        self.fields.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Look up a field in the table of the given family
pub fn locate(family: ModuleFamily, field: SffField) -> Result<FieldLocation> {
    family.field_map().locate(field)
}

// As per SFF-8436, QSFP+ 10 Gbs 4X PLUGGABLE TRANSCEIVER
const QSFP_TABLE: &[(SffField, FieldLocation)] = &[
    // Base page values, including alarms and sensors
    (SffField::Identifier, FieldLocation::lower(0, 1)),
    (SffField::Status, FieldLocation::lower(1, 2)),
    (SffField::TemperatureAlarms, FieldLocation::lower(6, 1)),
    (SffField::VccAlarms, FieldLocation::lower(7, 1)),
    (SffField::ChannelRxPwrAlarms, FieldLocation::lower(9, 2)),
    (SffField::ChannelTxBiasAlarms, FieldLocation::lower(11, 2)),
    (SffField::Temperature, FieldLocation::lower(22, 2)),
    (SffField::Vcc, FieldLocation::lower(26, 2)),
    (SffField::ChannelRxPwr, FieldLocation::lower(34, 8)),
    (SffField::ChannelTxBias, FieldLocation::lower(42, 8)),
    (SffField::PowerControl, FieldLocation::lower(93, 1)),
    (SffField::PageSelectByte, FieldLocation::lower(127, 1)),
    // Page 0 values, including vendor info
    (SffField::ExtendedIdentifier, FieldLocation::upper(Page::Page0, 129, 1)),
    (SffField::EthernetCompliance, FieldLocation::upper(Page::Page0, 131, 1)),
    (SffField::LengthSmKm, FieldLocation::upper(Page::Page0, 142, 1)),
    (SffField::LengthOm3, FieldLocation::upper(Page::Page0, 143, 1)),
    (SffField::LengthOm2, FieldLocation::upper(Page::Page0, 144, 1)),
    (SffField::LengthOm1, FieldLocation::upper(Page::Page0, 145, 1)),
    (SffField::LengthCopper, FieldLocation::upper(Page::Page0, 146, 1)),
    (SffField::VendorName, FieldLocation::upper(Page::Page0, 148, 16)),
    (SffField::VendorOui, FieldLocation::upper(Page::Page0, 165, 3)),
    (SffField::PartNumber, FieldLocation::upper(Page::Page0, 168, 16)),
    (SffField::RevisionNumber, FieldLocation::upper(Page::Page0, 184, 2)),
    (SffField::VendorSerialNumber, FieldLocation::upper(Page::Page0, 196, 16)),
    (SffField::MfgDate, FieldLocation::upper(Page::Page0, 212, 8)),
    (SffField::DiagnosticMonitoringType, FieldLocation::upper(Page::Page0, 220, 1)),
    // Page 3 values, including alarm and warning threshold values
    (SffField::TemperatureThresh, FieldLocation::upper(Page::Page3, 128, 8)),
    (SffField::VccThresh, FieldLocation::upper(Page::Page3, 144, 8)),
    (SffField::RxPwrThresh, FieldLocation::upper(Page::Page3, 176, 8)),
    (SffField::TxBiasThresh, FieldLocation::upper(Page::Page3, 184, 8)),
];

const QSFP_CABLE_MULTIPLIERS: &[(SffField, u32)] = &[
    (SffField::LengthSmKm, 1000),
    (SffField::LengthOm3, 2),
    (SffField::LengthOm2, 1),
    (SffField::LengthOm1, 1),
    (SffField::LengthCopper, 1),
];

// As per SFF-8472, serial ID area at A0h. The A2h diagnostics device has
// no page in the three-page cache model and is not mapped.
const SFP_TABLE: &[(SffField, FieldLocation)] = &[
    (SffField::Identifier, FieldLocation::lower(0, 1)),
    (SffField::ExtIdentifier, FieldLocation::lower(1, 1)),
    (SffField::ConnectorType, FieldLocation::lower(2, 1)),
    (SffField::TransceiverCode, FieldLocation::lower(3, 8)),
    (SffField::EncodingCode, FieldLocation::lower(11, 1)),
    (SffField::SignallingRate, FieldLocation::lower(12, 1)),
    (SffField::RateIdentifier, FieldLocation::lower(13, 1)),
    (SffField::LengthSmKm, FieldLocation::lower(14, 1)),
    (SffField::LengthSm, FieldLocation::lower(15, 1)),
    (SffField::LengthOm2, FieldLocation::lower(16, 1)),
    (SffField::LengthOm1, FieldLocation::lower(17, 1)),
    (SffField::LengthCopper, FieldLocation::lower(18, 1)),
    (SffField::LengthOm3, FieldLocation::lower(19, 1)),
    (SffField::VendorName, FieldLocation::lower(20, 16)),
    (SffField::TransceiverCapability, FieldLocation::lower(36, 1)),
    (SffField::VendorOui, FieldLocation::lower(37, 3)),
    (SffField::PartNumber, FieldLocation::lower(40, 16)),
    (SffField::RevisionNumber, FieldLocation::lower(56, 4)),
    (SffField::Wavelength, FieldLocation::lower(60, 2)),
    (SffField::CheckCodeBaseId, FieldLocation::lower(63, 1)),
    (SffField::EnabledOptions, FieldLocation::lower(64, 2)),
    (SffField::UpperBitRateMargin, FieldLocation::lower(66, 1)),
    (SffField::LowerBitRateMargin, FieldLocation::lower(67, 1)),
    (SffField::VendorSerialNumber, FieldLocation::lower(68, 16)),
    (SffField::MfgDate, FieldLocation::lower(84, 8)),
    (SffField::DiagnosticMonitoringType, FieldLocation::lower(92, 1)),
    (SffField::EnhancedOptions, FieldLocation::lower(93, 1)),
    (SffField::SffCompliance, FieldLocation::lower(94, 1)),
    (SffField::CheckCodeExtendedOpt, FieldLocation::lower(95, 1)),
    (SffField::VendorEeprom, FieldLocation::lower(96, 32)),
];

const SFP_CABLE_MULTIPLIERS: &[(SffField, u32)] = &[
    (SffField::LengthSmKm, 1000),
    (SffField::LengthSm, 100),
    (SffField::LengthOm2, 10),
    (SffField::LengthOm1, 10),
    (SffField::LengthOm3, 10),
    (SffField::LengthCopper, 1),
];

pub static QSFP_FIELDS: FieldMap = FieldMap {
    family: ModuleFamily::Qsfp,
    fields: QSFP_TABLE,
    cable_multipliers: QSFP_CABLE_MULTIPLIERS,
};

pub static SFP_FIELDS: FieldMap = FieldMap {
    family: ModuleFamily::Sfp,
    fields: SFP_TABLE,
    cable_multipliers: SFP_CABLE_MULTIPLIERS,
};
