/*!
In-memory EEPROM page cache.

Holds the three 128-byte pages of a module together with its presence,
staleness and flat-memory state. Pure data structure: no transport, no I/O.
*/

use crate::error::{Result, SffError};
use crate::field::{FieldLocation, Page};
use crate::layout::PAGE_SIZE;

/// One 128-byte EEPROM page
pub type PageBuffer = [u8; PAGE_SIZE];

/// Cached pages plus module cache state
#[derive(Debug, Clone)]
pub struct PageCache {
    pages: [PageBuffer; 3],
    loaded: [bool; 3],
    present: bool,
    dirty: bool,
    flat_mem: bool,
}

impl PageCache {
    /// Create an empty cache: zeroed pages, absent, stale
    pub fn new() -> Self {
        Self {
            pages: [[0; PAGE_SIZE]; 3],
            loaded: [false; 3],
            present: false,
            dirty: true,
            flat_mem: false,
        }
    }

    /// Copy `length` bytes at `offset` out of a page
    pub fn read_bytes(&self, page: Page, offset: usize, length: usize) -> Result<Vec<u8>> {
        let end = offset
            .checked_add(length)
            .filter(|end| *end <= PAGE_SIZE)
            .ok_or(SffError::OutOfBounds {
                page,
                offset,
                length,
            })?;
        if !self.loaded[page.index()] {
            return Err(SffError::PageUnavailable(page));
        }
        Ok(self.pages[page.index()][offset..end].to_vec())
    }

    /// Copy the bytes of a field location
    pub fn read_location(&self, location: &FieldLocation) -> Result<Vec<u8>> {
        self.read_bytes(location.page, location.offset, location.length)
    }

    /// Copy of a whole page
    pub fn page(&self, page: Page) -> Result<PageBuffer> {
        if !self.loaded[page.index()] {
            return Err(SffError::PageUnavailable(page));
        }
        Ok(self.pages[page.index()])
    }

    /// Replace the full contents of one page
    pub fn write(&mut self, page: Page, data: &PageBuffer) {
        self.pages[page.index()] = *data;
        self.loaded[page.index()] = true;
    }

    /// Forget a page's contents so reads of it fail until the next write
    pub fn invalidate_page(&mut self, page: Page) {
        self.loaded[page.index()] = false;
    }

    pub fn is_loaded(&self, page: Page) -> bool {
        self.loaded[page.index()]
    }

    pub fn mark_stale(&mut self) {
        self.dirty = true;
    }

    pub fn mark_fresh(&mut self) {
        self.dirty = false;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn set_present(&mut self, present: bool) {
        self.present = present;
    }

    pub fn is_present(&self) -> bool {
        self.present
    }

    pub fn set_flat_memory(&mut self, flat_mem: bool) {
        self.flat_mem = flat_mem;
    }

    pub fn is_flat_memory(&self) -> bool {
        self.flat_mem
    }

    /// Data may be served only from a present module with fresh pages
    pub fn is_usable(&self) -> bool {
        self.present && !self.dirty
    }
}

impl Default for PageCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(byte: u8) -> PageBuffer {
        [byte; PAGE_SIZE]
    }

    #[test]
    fn test_new_cache_state() {
        let cache = PageCache::new();
        assert!(!cache.is_present());
        assert!(cache.is_dirty());
        assert!(!cache.is_usable());
        assert!(!cache.is_flat_memory());
        for page in Page::ALL {
            assert!(!cache.is_loaded(page));
        }
    }

    #[test]
    fn test_read_bytes_bounds() {
        let mut cache = PageCache::new();
        cache.write(Page::Lower, &filled(0x11));

        assert_eq!(cache.read_bytes(Page::Lower, 120, 8).unwrap(), vec![0x11; 8]);
        assert_eq!(
            cache.read_bytes(Page::Lower, 121, 8),
            Err(SffError::OutOfBounds { page: Page::Lower, offset: 121, length: 8 })
        );
        assert!(cache.read_bytes(Page::Lower, usize::MAX, 2).is_err());
        assert_eq!(cache.read_bytes(Page::Lower, 128, 0).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_read_unloaded_page() {
        let mut cache = PageCache::new();
        cache.write(Page::Lower, &filled(0));
        assert_eq!(
            cache.read_bytes(Page::Page3, 0, 8),
            Err(SffError::PageUnavailable(Page::Page3))
        );

        cache.write(Page::Page3, &filled(3));
        assert!(cache.read_bytes(Page::Page3, 0, 8).is_ok());
        cache.invalidate_page(Page::Page3);
        assert!(cache.page(Page::Page3).is_err());
    }

    #[test]
    fn test_reads_are_copies() {
        let mut cache = PageCache::new();
        let mut data = filled(0);
        data[5] = 0xAB;
        cache.write(Page::Page0, &data);

        let mut copy = cache.read_bytes(Page::Page0, 5, 1).unwrap();
        copy[0] = 0xFF;
        assert_eq!(cache.read_bytes(Page::Page0, 5, 1).unwrap(), vec![0xAB]);
        assert_eq!(cache.page(Page::Page0).unwrap()[5], 0xAB);
    }

    #[test]
    fn test_usability_transitions() {
        let mut cache = PageCache::new();
        cache.set_present(true);
        assert!(!cache.is_usable());
        cache.mark_fresh();
        assert!(cache.is_usable());
        cache.set_present(false);
        assert!(!cache.is_usable());
        cache.set_present(true);
        cache.mark_stale();
        assert!(!cache.is_usable());
    }

    #[test]
    fn test_read_location() {
        let mut cache = PageCache::new();
        let mut data = filled(b' ');
        data[20..24].copy_from_slice(b"ACME");
        cache.write(Page::Page0, &data);

        let location = FieldLocation::upper(Page::Page0, 148, 16);
        let bytes = cache.read_location(&location).unwrap();
        assert_eq!(&bytes[..4], b"ACME");
        assert_eq!(bytes.len(), 16);
    }
}
