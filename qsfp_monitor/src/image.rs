/*!
File-backed EEPROM transport.

An image file holds the lower page, upper page 0 and optionally upper page 3
concatenated (256 or 384 bytes). The module counts as plugged in while
the file exists; the file is read again on every insertion, so replacing it
while absent emulates swapping modules.
*/

use sff::{MemoryTransport, ModuleTransport, SffError};
use std::path::PathBuf;
use tracing::{debug, warn};

/// Transport reading a module's EEPROM from an image file
#[derive(Debug)]
pub struct ImageTransport {
    path: PathBuf,
    eeprom: MemoryTransport,
    loaded: bool,
}

impl ImageTransport {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            eeprom: MemoryTransport::new(),
            loaded: false,
        }
    }

    fn load(&self) -> sff::Result<()> {
        let image = std::fs::read(&self.path).map_err(|e| {
            SffError::transport(format!("failed to read {}: {}", self.path.display(), e))
        })?;
        self.eeprom.load_image(&image)?;
        debug!("Loaded {} byte EEPROM image from {}", image.len(), self.path.display());
        Ok(())
    }
}

#[cfg(test)]
impl ImageTransport {
    /// Handle to the emulated EEPROM, including its write log
    fn eeprom(&self) -> MemoryTransport {
        self.eeprom.clone()
    }
}

impl ModuleTransport for ImageTransport {
    fn is_present(&mut self) -> bool {
        if !self.path.exists() {
            self.loaded = false;
            self.eeprom.set_present(false);
            return false;
        }
        if !self.loaded {
            // An unreadable image looks like an absent module until it is fixed
            if let Err(e) = self.load() {
                warn!("Ignoring EEPROM image {}: {}", self.path.display(), e);
                return false;
            }
            self.loaded = true;
            self.eeprom.set_present(true);
        }
        true
    }

    fn read(&mut self, address: u8, offset: u8, length: usize) -> sff::Result<Vec<u8>> {
        self.eeprom.read(address, offset, length)
    }

    fn write(&mut self, address: u8, offset: u8, data: &[u8]) -> sff::Result<()> {
        self.eeprom.write(address, offset, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sff::layout::{EEPROM_ADDRESS, PAGE_SIZE};
    use std::path::Path;

    fn write_image(path: &Path, lower: u8, page0: u8) {
        let mut image = vec![lower; PAGE_SIZE];
        image.extend_from_slice(&[page0; PAGE_SIZE]);
        std::fs::write(path, image).unwrap();
    }

    #[test]
    fn test_presence_follows_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("port.bin");
        let mut transport = ImageTransport::new(&path);

        assert!(!transport.is_present());
        assert!(transport.read(EEPROM_ADDRESS, 0, 1).is_err());

        write_image(&path, 0x0D, 0x20);
        assert!(transport.is_present());
        assert_eq!(transport.read(EEPROM_ADDRESS, 0, 2).unwrap(), vec![0x0D, 0x0D]);
        assert_eq!(transport.read(EEPROM_ADDRESS, 128, 1).unwrap(), vec![0x20]);

        std::fs::remove_file(&path).unwrap();
        assert!(!transport.is_present());
        assert!(transport.read(EEPROM_ADDRESS, 0, 1).is_err());
    }

    #[test]
    fn test_reload_on_reinsertion_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("port.bin");
        write_image(&path, 0x11, 0x00);
        let mut transport = ImageTransport::new(&path);
        assert!(transport.is_present());

        // Changes while present are not picked up
        write_image(&path, 0x22, 0x00);
        assert!(transport.is_present());
        assert_eq!(transport.read(EEPROM_ADDRESS, 0, 1).unwrap(), vec![0x11]);

        std::fs::remove_file(&path).unwrap();
        assert!(!transport.is_present());
        write_image(&path, 0x33, 0x00);
        assert!(transport.is_present());
        assert_eq!(transport.read(EEPROM_ADDRESS, 0, 1).unwrap(), vec![0x33]);
    }

    #[test]
    fn test_bad_image_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("port.bin");
        std::fs::write(&path, [0u8; 100]).unwrap();
        let mut transport = ImageTransport::new(&path);
        assert!(!transport.is_present());

        // A lower page without upper page 0 can never be refreshed
        std::fs::write(&path, [0u8; PAGE_SIZE]).unwrap();
        assert!(!transport.is_present());

        write_image(&path, 0x01, 0x02);
        assert!(transport.is_present());
    }

    #[test]
    fn test_writes_reach_eeprom() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("port.bin");
        write_image(&path, 0, 0);
        let mut transport = ImageTransport::new(&path);
        assert!(transport.is_present());

        transport.write(EEPROM_ADDRESS, 93, &[0x05]).unwrap();
        assert_eq!(transport.read(EEPROM_ADDRESS, 93, 1).unwrap(), vec![0x05]);
        assert_eq!(transport.eeprom().writes().len(), 1);
        // The image file itself is never modified
        assert_eq!(std::fs::read(&path).unwrap()[93], 0);
    }
}
