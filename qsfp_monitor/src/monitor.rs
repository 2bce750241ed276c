/*!
Periodic transceiver refresh service.

A single refresher thread walks every port once per interval: it samples
presence, refreshes the page cache and composes the report, then publishes a
[`PortSnapshot`] over a bounded channel. Refresh failures are logged and
reported in the snapshot; the next cycle simply tries again.
*/

use chrono::Local;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use serde::Serialize;
use sff::{ModuleTransport, QsfpModule, TransceiverInfo};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use crate::config::MonitorConfig;

// Granularity at which the refresher notices a stop request while idle
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// State of one port after a refresh cycle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortSnapshot {
    pub port: String,
    pub timestamp: String,
    pub present: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<TransceiverInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Counters reported when the refresher stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MonitorStats {
    pub cycles: u64,
    pub refresh_errors: u64,
    pub dropped_snapshots: u64,
}

/// Refreshes a set of ports in the background
pub struct TransceiverMonitor<T> {
    ports: Vec<Arc<QsfpModule<T>>>,
    interval: Duration,
    channel_capacity: usize,
    running: Arc<AtomicBool>,
}

impl<T: ModuleTransport + 'static> TransceiverMonitor<T> {
    pub fn new(ports: Vec<Arc<QsfpModule<T>>>, config: &MonitorConfig) -> Self {
        Self {
            ports,
            interval: Duration::from_millis(config.refresh_interval_ms),
            channel_capacity: config.channel_capacity.max(1),
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Get a reference to the running flag for external control
    pub fn get_running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn ports(&self) -> &[Arc<QsfpModule<T>>] {
        &self.ports
    }

    /// Start the refresher thread. It runs until the running flag is cleared
    /// or the receiver is dropped.
    pub fn start(&self) -> (JoinHandle<MonitorStats>, Receiver<PortSnapshot>) {
        let (snapshot_tx, snapshot_rx) = bounded::<PortSnapshot>(self.channel_capacity);
        let ports = self.ports.clone();
        let running = Arc::clone(&self.running);
        let interval = self.interval;

        info!("🔄 Refreshing {} port(s) every {:?}", ports.len(), interval);
        let handle = thread::spawn(move || refresher_thread(ports, interval, snapshot_tx, running));
        (handle, snapshot_rx)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Ask the refresher thread to stop after its current cycle
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

fn refresher_thread<T: ModuleTransport>(
    ports: Vec<Arc<QsfpModule<T>>>,
    interval: Duration,
    snapshot_tx: Sender<PortSnapshot>,
    running: Arc<AtomicBool>,
) -> MonitorStats {
    let mut stats = MonitorStats::default();

    'cycles: while running.load(Ordering::SeqCst) {
        let cycle_start = Instant::now();

        for module in &ports {
            let snapshot = snapshot(module);
            if snapshot.error.is_some() {
                stats.refresh_errors += 1;
            }
            match snapshot_tx.try_send(snapshot) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    error!("Snapshot channel full, dropping update for port {}", module.name());
                    stats.dropped_snapshots += 1;
                }
                Err(TrySendError::Disconnected(_)) => {
                    info!("Snapshot receiver dropped - stopping refresher");
                    break 'cycles;
                }
            }
        }
        stats.cycles += 1;

        while running.load(Ordering::SeqCst) {
            let elapsed = cycle_start.elapsed();
            if elapsed >= interval {
                break;
            }
            thread::sleep((interval - elapsed).min(STOP_POLL_INTERVAL));
        }
    }

    info!("📈 Refresher final stats:");
    info!("   Cycles: {}", stats.cycles);
    info!("   Refresh errors: {}", stats.refresh_errors);
    info!("   Dropped snapshots: {}", stats.dropped_snapshots);
    stats
}

/// Poll one port and capture the outcome. Errors never escape: they are
/// logged, recorded in the snapshot and retried on the next cycle.
pub fn snapshot<T: ModuleTransport>(module: &QsfpModule<T>) -> PortSnapshot {
    let timestamp = Local::now().to_rfc3339();
    let result = module.poll().and_then(|_| {
        if module.is_present() {
            module.transceiver_info().map(Some)
        } else {
            Ok(None)
        }
    });

    let (info, error) = match result {
        Ok(info) => (info, None),
        Err(e) => {
            // Bus faults clear up on a later cycle; anything else needs attention
            if e.is_retryable() {
                warn!("⚠️ Port {}: refresh failed: {}", module.name(), e);
            } else {
                error!("❌ Port {}: unusable transceiver data: {}", module.name(), e);
            }
            (None, Some(e.to_string()))
        }
    };

    PortSnapshot {
        port: module.name().to_string(),
        timestamp,
        present: module.is_present(),
        info,
        error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sff::layout::PAGE_SIZE;
    use sff::{MemoryTransport, Page};

    fn eeprom(vendor: &str) -> MemoryTransport {
        let eeprom = MemoryTransport::new();
        eeprom.set_upper(0, &[b' '; PAGE_SIZE]);
        eeprom.set_upper(3, &[0; PAGE_SIZE]);
        eeprom.poke(Page::Lower, 0, &[0x0D]).unwrap();
        eeprom.poke(Page::Page0, 20, vendor.as_bytes()).unwrap();
        eeprom.poke(Page::Lower, 22, &[0x19, 0x00]).unwrap();
        eeprom.set_present(true);
        eeprom
    }

    fn config(refresh_interval_ms: u64) -> MonitorConfig {
        MonitorConfig {
            refresh_interval_ms,
            channel_capacity: 16,
            pretty: false,
        }
    }

    #[test]
    fn test_snapshot_reports_each_port() {
        let absent = MemoryTransport::new();
        let monitor = TransceiverMonitor::new(
            vec![
                Arc::new(QsfpModule::new("eth1/1/1", eeprom("ACME"))),
                Arc::new(QsfpModule::new("eth1/2/1", absent)),
            ],
            &config(100),
        );

        let snapshots: Vec<PortSnapshot> =
            monitor.ports().iter().map(|module| snapshot(module)).collect();
        assert_eq!(snapshots.len(), 2);

        let info = snapshots[0].info.as_ref().unwrap();
        assert!(snapshots[0].present);
        assert_eq!(info.vendor.as_ref().unwrap().name, "ACME");
        assert_eq!(info.sensor.unwrap().temp.value, 25.0);
        assert!(snapshots[0].error.is_none());

        assert!(!snapshots[1].present);
        assert!(snapshots[1].info.is_none());
        assert!(snapshots[1].error.is_none());
    }

    #[test]
    fn test_refresh_errors_are_reported_not_raised() {
        let faulty = eeprom("ACME");
        faulty.fail_reads(true);
        let module = Arc::new(QsfpModule::new("eth1/1/1", faulty.clone()));

        let failed = snapshot(&module);
        assert!(failed.present);
        assert!(failed.info.is_none());
        assert!(failed.error.as_ref().unwrap().contains("injected read fault"));

        faulty.fail_reads(false);
        let recovered = snapshot(&module);
        assert!(recovered.error.is_none());
        assert!(recovered.info.is_some());
    }

    #[test]
    fn test_refresher_thread_publishes_and_stops() {
        let monitor = TransceiverMonitor::new(
            vec![Arc::new(QsfpModule::new("eth1/1/1", eeprom("ACME")))],
            &config(10),
        );
        let (handle, snapshots) = monitor.start();

        for _ in 0..3 {
            let snapshot = snapshots.recv_timeout(Duration::from_secs(5)).unwrap();
            assert_eq!(snapshot.port, "eth1/1/1");
            assert!(snapshot.info.is_some());
        }

        assert!(monitor.is_running());
        monitor.stop();
        assert!(!monitor.is_running());
        let stats = handle.join().unwrap();
        assert!(stats.cycles >= 3);
        assert_eq!(stats.refresh_errors, 0);
    }

    #[test]
    fn test_refresher_stops_when_receiver_dropped() {
        let monitor = TransceiverMonitor::new(
            vec![Arc::new(QsfpModule::new("eth1/1/1", eeprom("ACME")))],
            &config(1),
        );
        let (handle, snapshots) = monitor.start();
        drop(snapshots);
        let stats = handle.join().unwrap();
        assert!(stats.cycles <= 1);
    }

    #[test]
    fn test_snapshot_serialization() {
        let module = QsfpModule::new("eth1/2/1", MemoryTransport::new());
        let json = serde_json::to_value(snapshot(&module)).unwrap();
        assert_eq!(json["port"], "eth1/2/1");
        assert_eq!(json["present"], false);
        assert!(json.get("info").is_none());
        assert!(json.get("error").is_none());
    }
}
