//! punchsync CLI
//!
//! Attendance reconciliation and punch forwarding for biometric terminals.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use punchsync::{
    config::Config,
    core::{reconcile_link, AttendanceSession, DateRange},
    device::{DeviceLink, FileDevice},
    export::{default_file_name, export_sessions, ExportFormat},
    sync::{FileWatermarkStore, SyncScheduler, WatermarkStore},
    HttpDispatcher, VERSION,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "punchsync")]
#[command(version = VERSION)]
#[command(about = "Attendance reconciliation and punch forwarding for biometric terminals", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct DeviceArgs {
    /// Terminal address (overrides config)
    #[arg(long)]
    address: Option<String>,

    /// Terminal port (overrides config)
    #[arg(long)]
    port: Option<u16>,

    /// Attendance dump to read punches from (overrides config)
    #[arg(long)]
    dump: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to the device and forward punches in the background
    Start {
        #[command(flatten)]
        device: DeviceArgs,

        /// Poll interval in seconds
        #[arg(long)]
        interval: Option<u64>,

        /// Collector endpoint (overrides config)
        #[arg(long)]
        collector_url: Option<String>,

        /// Collector API key (overrides config)
        #[arg(long)]
        api_key: Option<String>,

        /// Also serve the reporting API on this port (requires server feature)
        #[arg(long)]
        serve: Option<u16>,
    },

    /// Reconcile punches into daily attendance sessions
    Sessions {
        #[command(flatten)]
        device: DeviceArgs,

        /// First day to include (YYYY-MM-DD)
        #[arg(long)]
        start: Option<NaiveDate>,

        /// Last day to include (YYYY-MM-DD), defaults to the start date
        #[arg(long)]
        end: Option<NaiveDate>,

        /// Output format (table, csv, json or jsonl)
        #[arg(long, default_value = "table")]
        format: String,

        /// Output file for csv/json/jsonl exports
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Show the persisted sync watermark and configuration summary
    Status,

    /// Forget the sync watermark so every admissible punch is sent again
    ResetWatermark,

    /// Show configuration
    Config {
        /// Write the effective configuration to the config file
        #[arg(long)]
        init: bool,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("punchsync=info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = Config::load().unwrap_or_else(|e| {
        eprintln!("Warning: Could not load configuration ({e}), using defaults");
        Config::default()
    });

    match cli.command {
        Commands::Start {
            device,
            interval,
            collector_url,
            api_key,
            serve,
        } => {
            device.apply(&mut config);
            if let Some(secs) = interval {
                config.sync.poll_interval = Duration::from_secs(secs);
            }
            if let Some(url) = collector_url {
                config.collector.url = url;
            }
            if let Some(key) = api_key {
                config.collector.api_key = key;
            }
            cmd_start(config, serve).await;
        }
        Commands::Sessions {
            device,
            start,
            end,
            format,
            output,
        } => {
            device.apply(&mut config);
            cmd_sessions(config, start, end, &format, output).await;
        }
        Commands::Status => cmd_status(&config),
        Commands::ResetWatermark => cmd_reset_watermark(&config),
        Commands::Config { init } => cmd_config(&config, init),
    }
}

impl DeviceArgs {
    fn apply(self, config: &mut Config) {
        if let Some(address) = self.address {
            config.device.address = address;
        }
        if let Some(port) = self.port {
            config.device.port = port;
        }
        if let Some(dump) = self.dump {
            config.device.dump_path = Some(dump);
        }
    }
}

/// Connect the link to the configured device or exit.
async fn connect_device(config: &Config) -> DeviceLink {
    let Some(dump_path) = config.device.dump_path.clone() else {
        eprintln!("Error: No device source configured.");
        eprintln!("Pass --dump <FILE> or set device.dump_path in {:?}", Config::config_path());
        std::process::exit(1);
    };

    let timezone = match config.device.timezone() {
        Ok(tz) => tz,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let terminal = FileDevice::new(dump_path, timezone);
    let target = config.device_target();
    let link = DeviceLink::new();

    match link.connect(&terminal, &target).await {
        Ok(users) => {
            println!("Connected to {}", target.endpoint());
            println!("  Users loaded: {users}");
            link
        }
        Err(e) => {
            eprintln!("Error connecting to device: {e}");
            std::process::exit(1);
        }
    }
}

async fn cmd_start(config: Config, serve: Option<u16>) {
    println!("punchsync v{VERSION}");
    println!();

    if let Err(e) = config.ensure_directories() {
        eprintln!("Warning: Could not create directories: {e}");
    }

    let link = connect_device(&config).await;

    let dispatcher = match HttpDispatcher::new(config.gateway_config()) {
        Ok(dispatcher) => dispatcher,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let store = match config.watermark_store() {
        Ok(store) => store,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };
    let scheduler_config = config.scheduler_config();

    println!("  Collector: {}", dispatcher.url());
    println!("  Poll interval: {}s", scheduler_config.poll_interval.as_secs());
    println!("  Allowed days: {}", scheduler_config.policy);
    println!("  Watermark file: {:?}", store.path());
    println!(
        "  Last sync: {}",
        store
            .load()
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "never".to_string())
    );

    let scheduler = SyncScheduler::new(
        scheduler_config,
        Arc::new(store),
        Arc::new(dispatcher),
        link.clone(),
    );
    let monitor = scheduler.monitor();
    let handle = scheduler.spawn();

    #[cfg(feature = "server")]
    let server_shutdown = match serve {
        Some(port) => {
            let state = punchsync::server::ServerState::new(link.clone(), monitor.clone());
            match punchsync::server::run(punchsync::server::ServerConfig::new(port), state).await {
                Ok((addr, shutdown)) => {
                    println!("  Reporting API: http://{addr}");
                    Some(shutdown)
                }
                Err(e) => {
                    eprintln!("Warning: Could not start reporting server: {e}");
                    None
                }
            }
        }
        None => None,
    };

    #[cfg(not(feature = "server"))]
    if serve.is_some() {
        eprintln!("Warning: --serve flag ignored (server feature not enabled at compile time)");
    }

    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let shutdown = Arc::new(Notify::new());
    ctrlc_handler(Arc::clone(&shutdown));
    shutdown.notified().await;

    println!();
    println!("Stopping sync...");
    handle.stop().await;

    #[cfg(feature = "server")]
    if let Some(tx) = server_shutdown {
        let _ = tx.send(());
    }

    link.disconnect().await;

    println!();
    println!("{}", monitor.summary());
}

async fn cmd_sessions(
    config: Config,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    format: &str,
    output: Option<PathBuf>,
) {
    let range = match (start, end) {
        (Some(start), end) => Some(DateRange::new(start, end.unwrap_or(start))),
        (None, Some(end)) => Some(DateRange::day(end)),
        (None, None) => None,
    };

    let link = connect_device(&config).await;
    let result = reconcile_link(&link, range).await;
    link.disconnect().await;

    let sessions = match result {
        Ok(sessions) => sessions,
        Err(e) => {
            eprintln!("Error retrieving attendance records: {e}");
            std::process::exit(1);
        }
    };

    if sessions.is_empty() {
        println!("No records found");
        return;
    }

    if format == "table" {
        print_table(&sessions);
        return;
    }

    let export_format: ExportFormat = match format.parse() {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };
    let path = output
        .unwrap_or_else(|| config.export_path.join(default_file_name(range, export_format)));

    match export_sessions(&sessions, &path, export_format) {
        Ok(path) => println!("Exported {} records to {:?}", sessions.len(), path),
        Err(e) => {
            eprintln!("Error exporting records: {e}");
            std::process::exit(1);
        }
    }
}

fn print_table(sessions: &[AttendanceSession]) {
    println!(
        "{:<10} {:<24} {:<10} {:<19} {:<19} {:>8}",
        "User ID", "Name", "Date", "Check In", "Check Out", "Hours"
    );
    for session in sessions {
        let fmt = |t: Option<chrono::DateTime<chrono::FixedOffset>>| {
            t.map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| "-".to_string())
        };
        println!(
            "{:<10} {:<24} {:<10} {:<19} {:<19} {:>8}",
            session.user_id,
            session.user_name,
            session.date,
            fmt(session.check_in),
            fmt(session.check_out),
            session
                .duration_hours
                .map(|h| format!("{h:.2}"))
                .unwrap_or_else(|| "N/A".to_string())
        );
    }
    println!();
    println!("Retrieved {} records", sessions.len());
}

fn cmd_status(config: &Config) {
    let store = config
        .watermark_store()
        .unwrap_or_else(|_| FileWatermarkStore::new(config.watermark_path()));

    println!("punchsync Status");
    println!("================");
    println!();
    println!("Device: {}", config.device_target().endpoint());
    if let Some(ref dump) = config.device.dump_path {
        println!("  Dump file: {dump:?}");
    }
    println!("Collector: {}", config.collector.url);
    println!("Poll interval: {}s", config.sync.poll_interval.as_secs());
    println!("Allowed days: {}", config.sync.allowed_days);
    println!();
    println!("Watermark file: {:?}", store.path());
    match store.load() {
        Some(watermark) => println!("Last sync time: {}", watermark.to_rfc3339()),
        None => println!("Last sync time: never (all admissible punches will be sent)"),
    }
}

fn cmd_reset_watermark(config: &Config) {
    let store = FileWatermarkStore::new(config.watermark_path());
    if let Err(e) = store.clear() {
        eprintln!("Error clearing watermark: {e}");
        std::process::exit(1);
    }
    println!("Watermark cleared. The next sync will resend every admissible punch.");
}

fn cmd_config(config: &Config, init: bool) {
    if init {
        if let Err(e) = config.save() {
            eprintln!("Error saving configuration: {e}");
            std::process::exit(1);
        }
        println!("Configuration written to {:?}", Config::config_path());
        println!();
    }

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(config).unwrap_or_else(|_| "Error".to_string())
    );
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(shutdown: Arc<Notify>) {
    if let Err(e) = ctrlc::set_handler(move || {
        shutdown.notify_one();
    }) {
        eprintln!("Error setting Ctrl+C handler: {e}");
        std::process::exit(1);
    }
}
