/*!
# SFF Transceiver EEPROM Access

This crate exposes typed, validated access to the EEPROM of pluggable QSFP/SFP
transceivers as laid out by SFF-8436/SFF-8636 (QSFP) and SFF-8472 (SFP).

## Core Types

- [`SffField`] - Logical EEPROM field identifiers
- [`FieldLocation`] - Physical (page, offset, length) of a field
- [`PageCache`] - Cached EEPROM pages with presence/staleness tracking
- [`QsfpModule`] - Thread-safe QSFP driver on top of a [`ModuleTransport`]
- [`TransceiverInfo`] - Composed report for a port

## Modules

- [`field`] - Field address registry (one static table per module family)
- [`conversion`] - Fixed-point to engineering unit conversions
- [`flags`] - Alarm/warning flag and cable length decoding
- [`cache`] - In-memory page cache
- [`transport`] - Transport capability and an in-memory EEPROM
- [`module`] - The QSFP driver
- [`report`] - Report structures
- [`error`] - Error types
*/

pub mod cache;
pub mod conversion;
pub mod error;
pub mod field;
pub mod flags;
pub mod module;
pub mod report;
pub mod transport;

// Re-export commonly used types
pub use cache::PageCache;
pub use conversion::SensorKind;
pub use error::{Result, SffError};
pub use field::{FieldLocation, FieldMap, ModuleFamily, Page, SffField};
pub use flags::{CableLength, FlagLevels, Nibble};
pub use module::{DetectOutcome, ModuleOptions, QsfpModule};
pub use report::{ThresholdLevels, TransceiverInfo, TransceiverType};
pub use transport::{MemoryTransport, ModuleTransport};

/// Version information for the sff library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// EEPROM layout constants
pub mod layout {
    /// Size of one EEPROM page in bytes
    pub const PAGE_SIZE: usize = 128;

    /// Number of optical channels on a QSFP module
    pub const CHANNEL_COUNT: usize = 4;

    /// Raw cable length value meaning "longer than can be represented"
    pub const MAX_CABLE_LEN: u8 = 255;

    /// Two-wire device address of the module EEPROM (A0h in 8-bit notation)
    pub const EEPROM_ADDRESS: u8 = 0x50;

    /// Lower-page offset of the page select register
    pub const PAGE_SELECT_OFFSET: u8 = 127;

    /// Bus offset at which the selected upper page starts
    pub const UPPER_PAGE_OFFSET: u8 = 128;
}
