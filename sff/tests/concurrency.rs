use sff::layout::PAGE_SIZE;
use sff::{DetectOutcome, MemoryTransport, Page, QsfpModule, SensorKind, SffError, SffField};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

// Neither pattern sets the data-not-ready or flat memory status bits
const PATTERNS: [u8; 2] = [0xAA, 0x88];

fn patterned_eeprom(byte: u8) -> MemoryTransport {
    let eeprom = MemoryTransport::new();
    eeprom.set_lower(&[byte; PAGE_SIZE]);
    eeprom.set_upper(0, &[byte; PAGE_SIZE]);
    eeprom.set_upper(3, &[byte; PAGE_SIZE]);
    eeprom.set_present(true);
    eeprom
}

#[test]
fn concurrent_refresh_never_exposes_torn_pages() {
    let eeprom = patterned_eeprom(PATTERNS[0]);
    let module = Arc::new(QsfpModule::new("eth1/1/1", eeprom.clone()));
    assert_eq!(module.detect(), DetectOutcome::Inserted);
    module.refresh().unwrap();

    let running = Arc::new(AtomicBool::new(true));

    let refresher = {
        let module = Arc::clone(&module);
        let running = Arc::clone(&running);
        thread::spawn(move || {
            let mut cycles = 0usize;
            while running.load(Ordering::Relaxed) {
                let byte = PATTERNS[cycles % PATTERNS.len()];
                eeprom.set_lower(&[byte; PAGE_SIZE]);
                eeprom.set_upper(0, &[byte; PAGE_SIZE]);
                module.refresh().unwrap();
                cycles += 1;
            }
            cycles
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let module = Arc::clone(&module);
            thread::spawn(move || {
                for _ in 0..2000 {
                    // Byte 127 reads back the page select register
                    match module.page(Page::Lower) {
                        Ok(lower) => {
                            let first = lower[0];
                            assert!(PATTERNS.contains(&first));
                            assert!(lower[..127].iter().all(|b| *b == first), "torn lower page");
                        }
                        Err(SffError::StaleData) => {}
                        Err(e) => panic!("unexpected error: {}", e),
                    }
                    if let Ok(vendor) = module.field_value(SffField::VendorName) {
                        assert!(vendor.iter().all(|b| *b == vendor[0]), "torn vendor name");
                    }
                }
            })
        })
        .collect();

    for reader in readers {
        reader.join().unwrap();
    }
    running.store(false, Ordering::Relaxed);
    let cycles = refresher.join().unwrap();
    assert!(cycles > 0);
    assert!(module.is_usable());
}

#[test]
fn ports_are_independent() {
    let first = patterned_eeprom(PATTERNS[0]);
    let second = patterned_eeprom(PATTERNS[1]);
    let ports = Arc::new([
        QsfpModule::new("eth1/1/1", first.clone()),
        QsfpModule::new("eth1/2/1", second.clone()),
    ]);

    let handles: Vec<_> = (0..ports.len())
        .map(|index| {
            let ports = Arc::clone(&ports);
            thread::spawn(move || {
                for _ in 0..200 {
                    ports[index].poll().unwrap();
                    let lower = ports[index].page(Page::Lower).unwrap();
                    assert_eq!(lower[0], PATTERNS[index]);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    // Removing one module leaves the other port untouched
    second.set_present(false);
    assert_eq!(ports[1].poll().unwrap(), DetectOutcome::Removed);
    assert!(!ports[1].is_usable());
    assert!(ports[0].is_usable());
    assert_eq!(ports[0].page(Page::Page0).unwrap()[0], PATTERNS[0]);
    // 0xAA declares a high power class: one override write per insertion
    assert_eq!(first.writes().iter().filter(|w| w.offset == 93).count(), 1);
}

#[test]
fn readers_see_stale_during_failed_refresh() {
    let eeprom = patterned_eeprom(0x00);
    eeprom.poke(Page::Lower, 22, &[0x19, 0x00]).unwrap();
    let module = Arc::new(QsfpModule::new("eth1/1/1", eeprom.clone()));
    module.poll().unwrap();
    assert_eq!(module.sensor(SffField::Temperature, SensorKind::Temperature).unwrap(), 25.0);

    eeprom.fail_reads(true);
    let failing = {
        let module = Arc::clone(&module);
        thread::spawn(move || module.refresh())
    };
    assert!(failing.join().unwrap().is_err());
    assert_eq!(
        module.sensor(SffField::Temperature, SensorKind::Temperature),
        Err(SffError::StaleData)
    );

    eeprom.fail_reads(false);
    module.refresh().unwrap();
    assert_eq!(module.sensor(SffField::Temperature, SensorKind::Temperature).unwrap(), 25.0);
}
