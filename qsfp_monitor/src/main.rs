/*!
# QSFP Monitor

Inspection CLI and periodic refresh service for QSFP transceivers whose
EEPROM contents are provided as image files.

## Usage

### One-shot report
```bash
qsfp-monitor info --image eth1-1-1.bin
```

### Single field
```bash
qsfp-monitor field --image eth1-1-1.bin VENDOR_NAME
```

### Periodic refresh of all configured ports
```bash
qsfp-monitor --config qsfp-monitor.toml monitor
```

Reports are printed to stdout as JSON; logs go to stderr.
*/

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use sff::layout::PAGE_SIZE;
use sff::{ModuleOptions, Page, QsfpModule, SffError, SffField};
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn, Level};

mod config;
mod image;
mod monitor;

use config::AppConfig;
use image::ImageTransport;
use monitor::TransceiverMonitor;

#[derive(Parser)]
#[command(name = "qsfp-monitor")]
#[command(about = "QSFP transceiver EEPROM inspection and refresh service")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, default_value = "qsfp-monitor.toml")]
    config: PathBuf,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Read a module once and print its transceiver report
    Info {
        /// EEPROM image file
        #[arg(short, long)]
        image: PathBuf,

        /// Port name used in the report
        #[arg(short, long, default_value = "eth1/1/1")]
        name: String,
    },

    /// Print the raw and decoded value of one field
    Field {
        /// EEPROM image file
        #[arg(short, long)]
        image: PathBuf,

        /// Field name, e.g. VENDOR_NAME
        field: String,
    },

    /// Hex dump of the cached pages
    Dump {
        /// EEPROM image file
        #[arg(short, long)]
        image: PathBuf,
    },

    /// Refresh all configured ports until Ctrl+C
    Monitor,

    /// Generate configuration file
    Config {
        /// Output path for configuration file
        #[arg(short, long, default_value = "qsfp-monitor.toml")]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr to keep stdout clean for JSON
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .init();

    match cli.command {
        Commands::Info { image, name } => {
            let config = load_config_or_default(&cli.config);
            let module = read_module(&name, &image, config.module)?;
            let report = module.transceiver_info()?;
            print_json(&serde_json::to_value(report)?, true)
        }

        Commands::Field { image, field } => {
            let config = load_config_or_default(&cli.config);
            let field = SffField::from_name(&field)
                .with_context(|| format!("Unknown field {}", field))?;
            let module = read_module("cli", &image, config.module)?;
            print_json(&describe_field(&module, field)?, true)
        }

        Commands::Dump { image } => {
            let config = load_config_or_default(&cli.config);
            let module = read_module("cli", &image, config.module)?;
            dump_pages(&module);
            Ok(())
        }

        Commands::Monitor => {
            let config = AppConfig::load_from_file(&cli.config)?;
            run_monitor(config)
        }

        Commands::Config { output } => generate_config_file(output),
    }
}

/// Load the configuration, falling back to defaults when it is missing
fn load_config_or_default(path: &Path) -> AppConfig {
    if !path.exists() {
        return AppConfig::new();
    }
    AppConfig::load_from_file(path).unwrap_or_else(|e| {
        warn!("⚠️ Failed to load config, using defaults: {:#}", e);
        AppConfig::new()
    })
}

/// Run one detect/refresh/customize cycle against an image file
fn read_module(
    name: &str,
    image: &Path,
    options: ModuleOptions,
) -> Result<QsfpModule<ImageTransport>> {
    if !image.exists() {
        bail!("EEPROM image not found: {}", image.display());
    }
    let module = QsfpModule::with_options(name, ImageTransport::new(image), options);
    module
        .poll()
        .with_context(|| format!("Failed to read transceiver from {}", image.display()))?;
    if !module.is_present() {
        bail!("No usable transceiver in {}", image.display());
    }
    Ok(module)
}

/// Raw bytes of a field plus its decoded value where the field has one
fn describe_field(module: &QsfpModule<ImageTransport>, field: SffField) -> Result<Value> {
    let raw = module.field_value(field)?;

    let decoded = if field.is_text() {
        match module.string(field) {
            Ok(text) => Some(json!(text)),
            Err(SffError::UnsupportedField { .. }) => None,
            Err(e) => return Err(e.into()),
        }
    } else if field.is_threshold() {
        let kind = field.sensor_kind().context("threshold field without a sensor kind")?;
        match module.thresholds(field, kind) {
            Ok(levels) => Some(serde_json::to_value(levels)?),
            Err(SffError::ThresholdsUnavailable) => None,
            Err(e) => return Err(e.into()),
        }
    } else if let Some(kind) = field.sensor_kind() {
        if raw.len() == 2 {
            Some(json!({ "value": module.sensor(field, kind)?, "unit": kind.unit() }))
        } else {
            Some(json!({ "values": module.channel_sensors(field, kind)?, "unit": kind.unit() }))
        }
    } else if field.is_flags() {
        if raw.len() == 1 {
            Some(serde_json::to_value(module.flags(field)?)?)
        } else {
            Some(serde_json::to_value(module.channel_flags(field)?)?)
        }
    } else if field == SffField::VendorOui {
        Some(json!(module.vendor_oui()?))
    } else if let Ok(length) = module.cable_length(field) {
        Some(serde_json::to_value(length)?)
    } else {
        None
    };

    Ok(json!({
        "field": field.as_str(),
        "raw": hex::encode_upper(&raw),
        "decoded": decoded,
    }))
}

fn dump_pages(module: &QsfpModule<ImageTransport>) {
    for page in Page::ALL {
        let data = match module.page(page) {
            Ok(data) => data,
            Err(e) => {
                info!("Skipping {:?} page: {}", page, e);
                continue;
            }
        };
        println!("{:?}:", page);
        for (row, chunk) in data.chunks(16).enumerate() {
            let base = match page {
                Page::Lower => 0,
                Page::Page0 | Page::Page3 => PAGE_SIZE,
            };
            println!("  {:02x}: {}", base + row * 16, hex::encode(chunk));
        }
    }
}

/// Run the refresh service for every configured port
fn run_monitor(config: AppConfig) -> Result<()> {
    if config.ports.is_empty() {
        bail!("No ports configured");
    }

    let ports = config
        .ports
        .iter()
        .map(|port| {
            Arc::new(QsfpModule::with_options(
                port.name.clone(),
                ImageTransport::new(&port.image),
                config.module,
            ))
        })
        .collect();
    let monitor = TransceiverMonitor::new(ports, &config.monitor);

    // Set up Ctrl+C handler
    let running = monitor.get_running_flag();
    ctrlc::set_handler(move || {
        eprintln!("\n🛑 Received Ctrl+C, shutting down gracefully...");
        running.store(false, Ordering::SeqCst);
    })?;

    info!("🚀 Monitoring {} port(s)", monitor.ports().len());
    let (handle, snapshots) = monitor.start();

    let mut result = Ok(());
    while monitor.is_running() {
        match snapshots.recv_timeout(Duration::from_millis(100)) {
            Ok(snapshot) => {
                result = serde_json::to_value(snapshot)
                    .map_err(anyhow::Error::from)
                    .and_then(|value| print_json(&value, config.monitor.pretty));
                if result.is_err() {
                    break;
                }
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => continue,
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
        }
    }

    // Output failures stop the refresher too
    monitor.stop();
    handle
        .join()
        .map_err(|_| anyhow::anyhow!("Refresher thread panicked"))?;
    info!("✅ Monitor stopped");
    result
}

fn print_json(value: &Value, pretty: bool) -> Result<()> {
    let text = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{}", text);
    Ok(())
}

/// Generate a default configuration file
fn generate_config_file(output_path: PathBuf) -> Result<()> {
    let config = AppConfig::new();
    config.save_to_file(&output_path)?;

    println!("✅ Generated configuration file: {}", output_path.display());
    println!("📝 Edit the port list, then run:");
    println!("   qsfp-monitor --config {} monitor", output_path.display());

    Ok(())
}
