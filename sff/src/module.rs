/*!
QSFP transceiver driver.

[`QsfpModule`] owns the page cache and the transport of one port behind a
single mutex. Every public method takes the lock itself and releases it on
all exit paths; the helpers that do the work are methods of the locked
state, so they cannot be reached without holding the lock.

Lifecycle per port: absent → (detect: present) → stale → (refresh) → fresh.
A failed refresh leaves the module stale; detecting absence from any state
makes it absent again.
*/

use crate::cache::{PageBuffer, PageCache};
use crate::conversion::{be_u16, SensorKind};
use crate::error::{Result, SffError};
use crate::field::{FieldLocation, Page, SffField, QSFP_FIELDS};
use crate::flags::{CableLength, FlagLevels, Nibble};
use crate::layout::{
    CHANNEL_COUNT, EEPROM_ADDRESS, PAGE_SELECT_OFFSET, PAGE_SIZE, UPPER_PAGE_OFFSET,
};
use crate::report::{
    AlarmThreshold, Cable, Channel, ChannelSensors, GlobalSensors, Sensor, ThresholdLevels,
    TransceiverInfo, TransceiverType, Vendor,
};
use crate::transport::ModuleTransport;
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

// IDENTIFIER value of a module that does not declare its type (SFF-8024)
const IDENTIFIER_UNKNOWN: u8 = 0x00;

// Second byte of STATUS
const STATUS_DATA_NOT_READY: u8 = 1 << 0;
const STATUS_FLAT_MEM: u8 = 1 << 2;

// POWER_CONTROL bits
const POWER_OVERRIDE: u8 = 1 << 0;
const HIGH_POWER_OVERRIDE: u8 = 1 << 2;

// EXTENDED_IDENTIFIER power classes
const EXT_ID_SHIFT: u8 = 6;
const EXT_ID_MASK: u8 = 0xc0;
const EXT_ID_HI_POWER_MASK: u8 = 0x03;

// DIAGNOSTIC_MONITORING_TYPE: temperature / supply voltage monitoring implemented
const DOM_TEMP_MONITORING: u8 = 1 << 5;
const DOM_VCC_MONITORING: u8 = 1 << 4;

/// Per-port driver behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleOptions {
    /// Read upper page 3 (alarm/warning thresholds) on refresh
    pub read_thresholds: bool,
    /// Force high power mode on modules that declare a power class above 1
    pub power_override: bool,
}

impl Default for ModuleOptions {
    fn default() -> Self {
        Self {
            read_thresholds: true,
            power_override: true,
        }
    }
}

/// Result of sampling the presence signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DetectOutcome {
    Inserted,
    Removed,
    Unchanged,
}

/// Thread-safe driver for the QSFP module in one port
#[derive(Debug)]
pub struct QsfpModule<T> {
    name: String,
    options: ModuleOptions,
    state: Mutex<ModuleState<T>>,
}

#[derive(Debug)]
struct ModuleState<T> {
    cache: PageCache,
    transport: T,
    // Set on insertion, cleared once the power override has been applied
    needs_customize: bool,
}

impl<T: ModuleTransport> QsfpModule<T> {
    /// Create a driver with default options; the module starts absent and stale
    pub fn new(name: impl Into<String>, transport: T) -> Self {
        Self::with_options(name, transport, ModuleOptions::default())
    }

    pub fn with_options(name: impl Into<String>, transport: T, options: ModuleOptions) -> Self {
        Self {
            name: name.into(),
            options,
            state: Mutex::new(ModuleState {
                cache: PageCache::new(),
                transport,
                needs_customize: false,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Presence as last seen by [`detect`](Self::detect)
    pub fn is_present(&self) -> bool {
        self.lock().cache.is_present()
    }

    /// Whether cached data can be served (present and refreshed)
    pub fn is_usable(&self) -> bool {
        self.lock().cache.is_usable()
    }

    pub fn is_flat_memory(&self) -> bool {
        self.lock().cache.is_flat_memory()
    }

    /// Sample the presence signal and update the cache state
    pub fn detect(&self) -> DetectOutcome {
        let outcome = self.lock().detect();
        self.log_presence(outcome);
        outcome
    }

    /// Re-read the module's pages into the cache
    pub fn refresh(&self) -> Result<()> {
        self.lock().refresh(&self.options).map_err(|e| {
            warn!("Port {}: error reading transceiver data: {}", self.name, e);
            e
        })
    }

    /// Apply configuration writes (power class override) to the module.
    ///
    /// The cache is not touched; the effect shows up after the next refresh.
    /// Returns whether anything was written.
    pub fn customize(&self) -> Result<bool> {
        let written = self.lock().customize(&self.options)?;
        if written {
            info!("Port {}: QSFP set to override low power", self.name);
        }
        Ok(written)
    }

    /// One cycle of the periodic refresh path: detect, refresh when present,
    /// and customize once after each insertion
    pub fn poll(&self) -> Result<DetectOutcome> {
        let mut state = self.lock();
        let outcome = state.detect();
        self.log_presence(outcome);

        if state.cache.is_present() {
            state.refresh(&self.options).map_err(|e| {
                warn!("Port {}: error reading transceiver data: {}", self.name, e);
                e
            })?;
        }
        if state.needs_customize && state.cache.is_usable() {
            if state.customize(&self.options)? {
                info!("Port {}: QSFP set to override low power", self.name);
            }
            state.needs_customize = false;
        }
        Ok(outcome)
    }

    /// Raw bytes of a field
    pub fn field_value(&self, field: SffField) -> Result<Vec<u8>> {
        self.lock().field_bytes(field)
    }

    /// Copy of one cached page
    pub fn page(&self, page: Page) -> Result<PageBuffer> {
        let state = self.lock();
        state.ensure_usable()?;
        state.cache.page(page)
    }

    /// A two-byte sensor value converted with `kind`
    pub fn sensor(&self, field: SffField, kind: SensorKind) -> Result<f64> {
        self.lock().sensor(field, kind)
    }

    /// The per-channel values of a channel sensor field
    pub fn channel_sensors(
        &self,
        field: SffField,
        kind: SensorKind,
    ) -> Result<[f64; CHANNEL_COUNT]> {
        self.lock().channel_sensors(field, kind)
    }

    /// Alarm/warning thresholds from page 3
    pub fn thresholds(&self, field: SffField, kind: SensorKind) -> Result<ThresholdLevels> {
        self.lock().thresholds(field, kind)
    }

    /// Flags of a module-wide alarm byte
    pub fn flags(&self, field: SffField) -> Result<FlagLevels> {
        self.lock().flags(field)
    }

    /// Flags of each channel from a per-channel alarm field
    pub fn channel_flags(&self, field: SffField) -> Result<[FlagLevels; CHANNEL_COUNT]> {
        self.lock().channel_flags(field)
    }

    /// A vendor string with the trailing padding removed
    pub fn string(&self, field: SffField) -> Result<String> {
        self.lock().string(field)
    }

    /// Vendor IEEE company ID as uppercase hex
    pub fn vendor_oui(&self) -> Result<String> {
        self.lock().vendor_oui()
    }

    pub fn cable_length(&self, field: SffField) -> Result<CableLength> {
        self.lock().cable_length(field)
    }

    /// Whether the module implements diagnostic monitoring
    pub fn dom_supported(&self) -> Result<bool> {
        self.lock().dom_supported()
    }

    /// Compose the full report. Sections the module cannot provide are left
    /// out; only a stale cache fails the whole report.
    pub fn transceiver_info(&self) -> Result<TransceiverInfo> {
        self.lock().transceiver_info(&self.name)
    }

    fn lock(&self) -> MutexGuard<'_, ModuleState<T>> {
        // Every mutation leaves the cache consistent (at worst stale)
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn log_presence(&self, outcome: DetectOutcome) {
        match outcome {
            DetectOutcome::Inserted => info!("Port {}: QSFP status changed to present", self.name),
            DetectOutcome::Removed => info!("Port {}: QSFP status changed to absent", self.name),
            DetectOutcome::Unchanged => {}
        }
    }
}

impl<T: ModuleTransport> ModuleState<T> {
    fn detect(&mut self) -> DetectOutcome {
        let present = self.transport.is_present();
        match (self.cache.is_present(), present) {
            (false, true) => {
                self.cache.set_present(true);
                self.cache.mark_stale();
                self.needs_customize = true;
                DetectOutcome::Inserted
            }
            (true, false) => {
                self.cache.set_present(false);
                DetectOutcome::Removed
            }
            _ => DetectOutcome::Unchanged,
        }
    }

    fn refresh(&mut self, options: &ModuleOptions) -> Result<()> {
        if !self.cache.is_present() {
            return Err(SffError::NotPresent);
        }
        self.cache.mark_stale();

        let lower = self.read_page(Page::Lower)?;
        let status = QSFP_FIELDS.locate(SffField::Status)?;
        let status_flags = lower[status.end() - 1];
        if status_flags & STATUS_DATA_NOT_READY != 0 {
            return Err(SffError::DataNotReady);
        }
        let flat_mem = status_flags & STATUS_FLAT_MEM != 0;

        // Flat memory modules expose their upper 128 bytes without paging
        if !flat_mem {
            self.select_page(Page::Page0)?;
        }
        let page0 = self.read_page(Page::Page0)?;
        let page3 = if !flat_mem && options.read_thresholds {
            self.select_page(Page::Page3)?;
            Some(self.read_page(Page::Page3)?)
        } else {
            None
        };

        self.cache.write(Page::Lower, &lower);
        self.cache.write(Page::Page0, &page0);
        match page3 {
            Some(page3) => self.cache.write(Page::Page3, &page3),
            None => self.cache.invalidate_page(Page::Page3),
        }
        self.cache.set_flat_memory(flat_mem);
        self.cache.mark_fresh();
        debug!("refreshed transceiver pages (flat memory: {})", flat_mem);
        Ok(())
    }

    fn read_page(&mut self, page: Page) -> Result<PageBuffer> {
        let offset = match page {
            Page::Lower => 0,
            Page::Page0 | Page::Page3 => UPPER_PAGE_OFFSET,
        };
        let data = self.transport.read(EEPROM_ADDRESS, offset, PAGE_SIZE)?;
        data.as_slice().try_into().map_err(|_| {
            SffError::transport(format!(
                "short read of {:?} page: {} of {} bytes",
                page,
                data.len(),
                PAGE_SIZE
            ))
        })
    }

    fn select_page(&mut self, page: Page) -> Result<()> {
        if let Some(value) = page.select_value() {
            self.transport.write(EEPROM_ADDRESS, PAGE_SELECT_OFFSET, &[value])?;
        }
        Ok(())
    }

    fn customize(&mut self, options: &ModuleOptions) -> Result<bool> {
        if !self.cache.is_usable() {
            return Ok(false);
        }

        let ext_id = self.field_byte(SffField::ExtendedIdentifier)?;
        let eth_compliance = self.field_byte(SffField::EthernetCompliance)?;
        let pwr_ctrl = self.field_byte(SffField::PowerControl)?;
        debug!(
            "QSFP Ext ID {:#x} Ether Compliance {:#x} Power Control {:#x}",
            ext_id, eth_compliance, pwr_ctrl
        );

        let high_power_level = ext_id & EXT_ID_HI_POWER_MASK;
        let power_level = (ext_id & EXT_ID_MASK) >> EXT_ID_SHIFT;
        if (high_power_level == 0 && power_level == 0) || !options.power_override {
            return Ok(false);
        }

        let mut power = POWER_OVERRIDE;
        if high_power_level > 0 {
            power |= HIGH_POWER_OVERRIDE;
        }

        let location = QSFP_FIELDS.locate(SffField::PowerControl)?;
        if location.page != Page::Lower {
            return Err(SffError::invalid_layout(
                "POWER_CONTROL must be on the lower page",
            ));
        }
        if location.length != 1 {
            return Err(SffError::invalid_layout("POWER_CONTROL must be one byte"));
        }
        let offset = u8::try_from(location.offset)
            .map_err(|_| SffError::invalid_layout("POWER_CONTROL offset out of range"))?;
        self.transport.write(EEPROM_ADDRESS, offset, &[power])?;
        Ok(true)
    }

    fn ensure_usable(&self) -> Result<()> {
        if self.cache.is_usable() {
            Ok(())
        } else {
            Err(SffError::StaleData)
        }
    }

    fn read(&self, field: SffField) -> Result<(FieldLocation, Vec<u8>)> {
        self.ensure_usable()?;
        let location = QSFP_FIELDS.locate(field)?;
        let bytes = self.cache.read_location(&location)?;
        Ok((location, bytes))
    }

    fn field_bytes(&self, field: SffField) -> Result<Vec<u8>> {
        self.read(field).map(|(_, bytes)| bytes)
    }

    fn field_byte(&self, field: SffField) -> Result<u8> {
        self.field_bytes(field)?
            .first()
            .copied()
            .ok_or_else(|| SffError::invalid_layout(format!("{} has zero length", field)))
    }

    fn check_kind(field: SffField, kind: SensorKind) -> Result<()> {
        match field.sensor_kind() {
            Some(expected) if expected == kind => Ok(()),
            Some(expected) => Err(SffError::unsupported(
                field,
                format!("encoded as {:?}, not {:?}", expected, kind),
            )),
            None => Err(SffError::unsupported(field, "not a sensor field")),
        }
    }

    fn sensor(&self, field: SffField, kind: SensorKind) -> Result<f64> {
        Self::check_kind(field, kind)?;
        let bytes = self.field_bytes(field)?;
        if bytes.len() != 2 {
            return Err(SffError::unsupported(field, "not a single 16-bit sensor"));
        }
        let raw = be_u16(&bytes).ok_or_else(|| SffError::unsupported(field, "short sensor"))?;
        Ok(kind.convert(raw))
    }

    fn channel_sensors(&self, field: SffField, kind: SensorKind) -> Result<[f64; CHANNEL_COUNT]> {
        Self::check_kind(field, kind)?;
        let bytes = self.field_bytes(field)?;
        if bytes.len() != 2 * CHANNEL_COUNT {
            return Err(SffError::unsupported(field, "not a per-channel sensor"));
        }
        let mut values = [0.0; CHANNEL_COUNT];
        for (value, pair) in values.iter_mut().zip(bytes.chunks_exact(2)) {
            *value = kind.convert(u16::from_be_bytes([pair[0], pair[1]]));
        }
        Ok(values)
    }

    fn thresholds(&self, field: SffField, kind: SensorKind) -> Result<ThresholdLevels> {
        if !field.is_threshold() {
            return Err(SffError::unsupported(field, "not a threshold field"));
        }
        Self::check_kind(field, kind)?;
        self.ensure_usable()?;
        if self.cache.is_flat_memory() {
            return Err(SffError::ThresholdsUnavailable);
        }
        let bytes = match self.field_bytes(field) {
            Err(SffError::PageUnavailable(_)) => return Err(SffError::ThresholdsUnavailable),
            other => other?,
        };
        let values: Vec<f64> = bytes
            .chunks_exact(2)
            .map(|pair| kind.convert(u16::from_be_bytes([pair[0], pair[1]])))
            .collect();
        match values.as_slice() {
            [alarm_high, alarm_low, warn_high, warn_low, ..] => Ok(ThresholdLevels {
                alarm_high: *alarm_high,
                alarm_low: *alarm_low,
                warn_high: *warn_high,
                warn_low: *warn_low,
            }),
            _ => Err(SffError::unsupported(field, "threshold block shorter than 8 bytes")),
        }
    }

    fn flags(&self, field: SffField) -> Result<FlagLevels> {
        if !field.is_flags() {
            return Err(SffError::unsupported(field, "not a flag field"));
        }
        match self.field_bytes(field)?.as_slice() {
            [byte] => Ok(FlagLevels::decode(*byte, Nibble::High)),
            _ => Err(SffError::unsupported(field, "per-channel flag field")),
        }
    }

    fn channel_flags(&self, field: SffField) -> Result<[FlagLevels; CHANNEL_COUNT]> {
        if !field.is_flags() {
            return Err(SffError::unsupported(field, "not a flag field"));
        }
        match self.field_bytes(field)?.as_slice() {
            [first, second] => Ok(FlagLevels::decode_channels([*first, *second])),
            _ => Err(SffError::unsupported(field, "not a per-channel flag field")),
        }
    }

    fn string(&self, field: SffField) -> Result<String> {
        if !field.is_text() {
            return Err(SffError::unsupported(field, "not a text field"));
        }
        // Serial ID strings are only defined once the module declares its type
        if self.field_byte(SffField::Identifier)? == IDENTIFIER_UNKNOWN {
            return Err(SffError::unsupported(field, "module provides no serial ID data"));
        }
        let bytes = self.field_bytes(field)?;
        let end = bytes
            .iter()
            .rposition(|b| *b != b' ' && *b != 0)
            .map_or(0, |i| i + 1);
        Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
    }

    fn vendor_oui(&self) -> Result<String> {
        Ok(hex::encode_upper(self.field_bytes(SffField::VendorOui)?))
    }

    fn cable_length(&self, field: SffField) -> Result<CableLength> {
        let multiplier = QSFP_FIELDS
            .cable_multiplier(field)
            .ok_or_else(|| SffError::unsupported(field, "not a cable length field"))?;
        let raw = self.field_byte(field)?;
        Ok(CableLength::decode(raw, multiplier))
    }

    fn dom_supported(&self) -> Result<bool> {
        let dom_type = self.field_byte(SffField::DiagnosticMonitoringType)?;
        Ok(dom_type & (DOM_TEMP_MONITORING | DOM_VCC_MONITORING) != 0)
    }

    fn global_sensors(&self) -> Result<GlobalSensors> {
        Ok(GlobalSensors {
            temp: Sensor {
                value: self.sensor(SffField::Temperature, SensorKind::Temperature)?,
                flags: self.flags(SffField::TemperatureAlarms)?,
            },
            vcc: Sensor {
                value: self.sensor(SffField::Vcc, SensorKind::Vcc)?,
                flags: self.flags(SffField::VccAlarms)?,
            },
        })
    }

    fn vendor(&self) -> Result<Vendor> {
        Ok(Vendor {
            name: self.string(SffField::VendorName)?,
            oui: self.vendor_oui()?,
            part_number: self.string(SffField::PartNumber)?,
            rev: self.string(SffField::RevisionNumber)?,
            serial_number: self.string(SffField::VendorSerialNumber)?,
            date_code: self.string(SffField::MfgDate)?,
        })
    }

    fn cable(&self) -> Result<Option<Cable>> {
        let cable = Cable {
            single_mode: self.cable_length(SffField::LengthSmKm)?,
            om3: self.cable_length(SffField::LengthOm3)?,
            om2: self.cable_length(SffField::LengthOm2)?,
            om1: self.cable_length(SffField::LengthOm1)?,
            copper: self.cable_length(SffField::LengthCopper)?,
        };
        Ok(cable.any_specified().then_some(cable))
    }

    fn alarm_thresholds(&self) -> Result<AlarmThreshold> {
        Ok(AlarmThreshold {
            temp: self.thresholds(SffField::TemperatureThresh, SensorKind::Temperature)?,
            vcc: self.thresholds(SffField::VccThresh, SensorKind::Vcc)?,
            rx_pwr: self.thresholds(SffField::RxPwrThresh, SensorKind::Power)?,
            tx_bias: self.thresholds(SffField::TxBiasThresh, SensorKind::TxBias)?,
        })
    }

    fn channels(&self) -> Result<Vec<Channel>> {
        let rx_pwr = self.channel_sensors(SffField::ChannelRxPwr, SensorKind::Power)?;
        let rx_pwr_flags = self.channel_flags(SffField::ChannelRxPwrAlarms)?;
        let tx_bias = self.channel_sensors(SffField::ChannelTxBias, SensorKind::TxBias)?;
        let tx_bias_flags = self.channel_flags(SffField::ChannelTxBiasAlarms)?;

        Ok((0..CHANNEL_COUNT)
            .map(|channel| Channel {
                channel,
                sensors: ChannelSensors {
                    rx_pwr: Sensor {
                        value: rx_pwr[channel],
                        flags: rx_pwr_flags[channel],
                    },
                    tx_bias: Sensor {
                        value: tx_bias[channel],
                        flags: tx_bias_flags[channel],
                    },
                },
            })
            .collect())
    }

    fn transceiver_info(&self, name: &str) -> Result<TransceiverInfo> {
        self.ensure_usable()?;

        let mut info = TransceiverInfo::new(name, TransceiverType::Qsfp, self.cache.is_present());
        info.flat_memory = self.cache.is_flat_memory();
        info.dom_supported = section(name, "dom", self.dom_supported());
        info.sensor = section(name, "sensor", self.global_sensors());
        info.vendor = section(name, "vendor", self.vendor());
        info.cable = section(name, "cable", self.cable()).flatten();
        info.thresholds = section(name, "thresholds", self.alarm_thresholds());
        info.channels = section(name, "channels", self.channels()).unwrap_or_default();
        Ok(info)
    }
}

fn section<S>(port: &str, name: &str, result: Result<S>) -> Option<S> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            debug!("Port {}: {} section unavailable: {}", port, name, e);
            None
        }
    }
}
