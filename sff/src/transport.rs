/*!
Transport capability to a transceiver's low-speed bus.

The [`ModuleTransport`] trait abstracts the physical link to the module: raw
reads and writes of byte ranges at a two-wire device address, plus the
electrical presence signal. The driver in [`crate::module`] only ever talks
to a `ModuleTransport`, so it runs unchanged against real hardware or
against [`MemoryTransport`], an in-memory EEPROM with SFF page selection.
*/

use crate::cache::PageBuffer;
use crate::error::{Result, SffError};
use crate::field::Page;
use crate::layout::{EEPROM_ADDRESS, PAGE_SELECT_OFFSET, PAGE_SIZE};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::trace;

/// Byte-level access to one transceiver module.
///
/// Offsets follow the bus view of the EEPROM: 0..127 is the lower page and
/// 128..255 is whichever upper page the page select register (lower byte
/// 127) currently maps. Blocking and timeouts are the implementation's
/// concern.
pub trait ModuleTransport: Send {
    /// Sample the module presence signal
    fn is_present(&mut self) -> bool;

    /// Read `length` bytes starting at `offset`
    fn read(&mut self, address: u8, offset: u8, length: usize) -> Result<Vec<u8>>;

    /// Write `data` starting at `offset`
    fn write(&mut self, address: u8, offset: u8, data: &[u8]) -> Result<()>;
}

impl<T: ModuleTransport + ?Sized> ModuleTransport for Box<T> {
    fn is_present(&mut self) -> bool {
        (**self).is_present()
    }

    fn read(&mut self, address: u8, offset: u8, length: usize) -> Result<Vec<u8>> {
        (**self).read(address, offset, length)
    }

    fn write(&mut self, address: u8, offset: u8, data: &[u8]) -> Result<()> {
        (**self).write(address, offset, data)
    }
}

/// A write issued through a [`MemoryTransport`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRecord {
    pub address: u8,
    pub offset: u8,
    pub data: Vec<u8>,
}

#[derive(Debug)]
struct EepromState {
    present: bool,
    lower: PageBuffer,
    upper: BTreeMap<u8, PageBuffer>,
    selected_page: u8,
    fail_reads: bool,
    fail_writes: bool,
    writes: Vec<WriteRecord>,
    reads: usize,
}

/// In-memory module EEPROM.
///
/// Cloning yields another handle to the same EEPROM, so a test (or a file
/// watcher) can keep changing contents, presence and faults while a driver
/// owns its own handle.
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    state: Arc<Mutex<EepromState>>,
}

impl MemoryTransport {
    /// Create an absent module with a zeroed lower page and no upper pages
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(EepromState {
                present: false,
                lower: [0; PAGE_SIZE],
                upper: BTreeMap::new(),
                selected_page: 0,
                fail_reads: false,
                fail_writes: false,
                writes: Vec::new(),
                reads: 0,
            })),
        }
    }

    /// Create a present module from a raw image: lower page, upper page 0,
    /// and optionally upper page 3, concatenated. Upper page 0 is required
    /// because every refresh reads it.
    pub fn from_image(image: &[u8]) -> Result<Self> {
        let transport = Self::new();
        transport.load_image(image)?;
        transport.set_present(true);
        Ok(transport)
    }

    /// Replace the EEPROM contents from a raw image (256 or 384 bytes)
    pub fn load_image(&self, image: &[u8]) -> Result<()> {
        if image.len() != 2 * PAGE_SIZE && image.len() != 3 * PAGE_SIZE {
            return Err(SffError::transport(format!(
                "EEPROM image must be 256 or 384 bytes, got {}",
                image.len()
            )));
        }
        let mut pages = image.chunks_exact(PAGE_SIZE).map(to_page);
        let mut state = self.lock();
        state.upper.clear();
        if let Some(lower) = pages.next() {
            state.lower = lower;
        }
        for (number, page) in [0u8, 3].into_iter().zip(pages) {
            state.upper.insert(number, page);
        }
        Ok(())
    }

    pub fn set_present(&self, present: bool) {
        self.lock().present = present;
    }

    /// Replace the lower page
    pub fn set_lower(&self, data: &PageBuffer) {
        self.lock().lower = *data;
    }

    /// Replace (or add) an upper page by its page select value
    pub fn set_upper(&self, page_number: u8, data: &PageBuffer) {
        self.lock().upper.insert(page_number, *data);
    }

    /// Overwrite bytes of a page at a page-relative offset
    pub fn poke(&self, page: Page, offset: usize, bytes: &[u8]) -> Result<()> {
        let end = offset
            .checked_add(bytes.len())
            .filter(|end| *end <= PAGE_SIZE)
            .ok_or_else(|| {
                SffError::transport(format!(
                    "poke of {} bytes at offset {} runs past the {:?} page",
                    bytes.len(),
                    offset,
                    page
                ))
            })?;
        let mut state = self.lock();
        let buffer = match page.select_value() {
            None => &mut state.lower,
            Some(number) => state.upper.entry(number).or_insert([0; PAGE_SIZE]),
        };
        buffer[offset..end].copy_from_slice(bytes);
        Ok(())
    }

    /// Make every subsequent read fail
    pub fn fail_reads(&self, fail: bool) {
        self.lock().fail_reads = fail;
    }

    /// Make every subsequent write fail
    pub fn fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    /// All successful writes so far
    pub fn writes(&self) -> Vec<WriteRecord> {
        self.lock().writes.clone()
    }

    /// Number of successful reads so far
    pub fn read_count(&self) -> usize {
        self.lock().reads
    }

    /// Page currently mapped into the upper half
    pub fn selected_page(&self) -> u8 {
        self.lock().selected_page
    }

    fn lock(&self) -> MutexGuard<'_, EepromState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl EepromState {
    fn check_access(&self, address: u8, offset: u8, length: usize) -> Result<()> {
        if !self.present {
            return Err(SffError::transport("no module present"));
        }
        if address != EEPROM_ADDRESS {
            return Err(SffError::transport(format!("no ack from address {:#04x}", address)));
        }
        let end = usize::from(offset).checked_add(length);
        if end.map_or(true, |end| end > 2 * PAGE_SIZE) {
            return Err(SffError::transport(format!(
                "access of {} bytes at offset {} runs past the EEPROM",
                length, offset
            )));
        }
        Ok(())
    }

    fn read_byte(&self, offset: usize) -> Result<u8> {
        if offset == usize::from(PAGE_SELECT_OFFSET) {
            return Ok(self.selected_page);
        }
        if offset < PAGE_SIZE {
            return Ok(self.lower[offset]);
        }
        self.upper
            .get(&self.selected_page)
            .map(|page| page[offset - PAGE_SIZE])
            .ok_or_else(|| {
                SffError::transport(format!("upper page {} not implemented", self.selected_page))
            })
    }
}

impl ModuleTransport for MemoryTransport {
    fn is_present(&mut self) -> bool {
        self.lock().present
    }

    fn read(&mut self, address: u8, offset: u8, length: usize) -> Result<Vec<u8>> {
        let mut state = self.lock();
        state.check_access(address, offset, length)?;
        if state.fail_reads {
            return Err(SffError::transport("injected read fault"));
        }
        let start = usize::from(offset);
        let data = (start..start + length)
            .map(|i| state.read_byte(i))
            .collect::<Result<Vec<u8>>>()?;
        state.reads += 1;
        trace!("eeprom read {} bytes at {}", length, offset);
        Ok(data)
    }

    fn write(&mut self, address: u8, offset: u8, data: &[u8]) -> Result<()> {
        let mut state = self.lock();
        state.check_access(address, offset, data.len())?;
        if state.fail_writes {
            return Err(SffError::transport("injected write fault"));
        }
        for (i, byte) in data.iter().enumerate() {
            let target = usize::from(offset) + i;
            if target == usize::from(PAGE_SELECT_OFFSET) {
                state.selected_page = *byte;
            } else if target < PAGE_SIZE {
                state.lower[target] = *byte;
            } else {
                let selected = state.selected_page;
                let page = state.upper.get_mut(&selected).ok_or_else(|| {
                    SffError::transport(format!("upper page {} not implemented", selected))
                })?;
                page[target - PAGE_SIZE] = *byte;
            }
        }
        state.writes.push(WriteRecord {
            address,
            offset,
            data: data.to_vec(),
        });
        trace!("eeprom write {} bytes at {}", data.len(), offset);
        Ok(())
    }
}

fn to_page(chunk: &[u8]) -> PageBuffer {
    let mut page = [0; PAGE_SIZE];
    page.copy_from_slice(chunk);
    page
}
