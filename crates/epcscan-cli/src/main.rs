use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use epcscan_core::sim::{SimulatedReader, SimulatedRegistry};
use epcscan_core::{
    ChannelStatusSink, ChannelTagSink, ReaderSession, RetryConfig, SessionConfig,
};
use epcscan_types::{SessionState, TagRead, Transport};

#[derive(Parser)]
#[command(name = "epcscan")]
#[command(author, version, about = "CLI for handheld RFID reader sessions", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List readers the registry can discover
    Devices {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Run a scan session until interrupted
    Scan {
        /// Duplicate suppression window in milliseconds
        #[arg(long, default_value = "2000")]
        window_ms: u64,

        /// Tag poller interval in milliseconds
        #[arg(long, default_value = "300")]
        poll_ms: u64,

        /// Fallback transmit power index when the reader's power table
        /// cannot be queried
        #[arg(long, default_value = "30")]
        power_index: u16,

        /// Connection attempts before giving up
        #[arg(long, default_value = "3")]
        attempts: u32,

        /// Stop automatically after this many seconds (0 = run until
        /// Ctrl-C)
        #[arg(short, long, default_value = "0")]
        duration: u64,
    },
}

/// Workstation registry: one simulated USB dock and one paired
/// Bluetooth sled. A hardware-backed registry slots in here once a
/// driver binding exists.
fn build_registry() -> (Arc<SimulatedRegistry>, Arc<SimulatedReader>) {
    let usb = SimulatedReader::new("RFD40-USB-0", Transport::Usb);
    let bt = SimulatedReader::new("RFD40-BT-0", Transport::Bluetooth);
    let registry = Arc::new(SimulatedRegistry::with_readers(vec![
        Arc::clone(&usb),
        bt,
    ]));
    (registry, usb)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.quiet {
        EnvFilter::new("warn")
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Devices { format } => list_devices(&format).await,
        Commands::Scan {
            window_ms,
            poll_ms,
            power_index,
            attempts,
            duration,
        } => {
            let config = SessionConfig::builder()
                .dedup_window(Duration::from_millis(window_ms))
                .poll_interval(Duration::from_millis(poll_ms))
                .fallback_power_index(power_index)
                .retry(RetryConfig::for_connect().max_attempts(attempts))
                .build();
            run_scan(config, duration, cli.quiet).await
        }
    }
}

async fn list_devices(format: &str) -> Result<()> {
    use epcscan_core::DeviceRegistry;

    let (registry, _) = build_registry();
    let devices = registry.list_devices().await?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&devices)?),
        _ => {
            if devices.is_empty() {
                println!("No readers found");
            }
            for device in devices {
                println!("{device}");
            }
        }
    }
    Ok(())
}

async fn run_scan(config: SessionConfig, duration: u64, quiet: bool) -> Result<()> {
    let (registry, usb) = build_registry();

    let (tag_sink, mut tags) = ChannelTagSink::new();
    let (status_sink, mut statuses) = ChannelStatusSink::new();
    let session = ReaderSession::new(registry, config, Arc::new(tag_sink), Arc::new(status_sink))?;

    // Status lines go to the terminal as they arrive.
    let status_printer = tokio::spawn(async move {
        while let Some(update) = statuses.recv().await {
            let marker = if update.ok { "ok" } else { "!!" };
            println!("[{marker}] {}", update.message);
        }
    });
    let tag_printer = tokio::spawn(async move {
        let mut count: u64 = 0;
        while let Some(tag) = tags.recv().await {
            count += 1;
            println!("{count:>6}  {tag}");
        }
    });

    session.start().await?;
    if session.state() != SessionState::Scanning {
        // The failure detail already went out as a status line.
        session.shutdown().await?;
        status_printer.abort();
        tag_printer.abort();
        anyhow::bail!("could not start scanning");
    }

    // The simulated reader sees a passing tag population; remove this
    // feeder when a hardware registry is wired in.
    let feeder = tokio::spawn(feed_tags(usb));

    if duration > 0 {
        tokio::time::sleep(Duration::from_secs(duration)).await;
    } else {
        if !quiet {
            tracing::info!("scanning, press Ctrl-C to stop");
        }
        tokio::signal::ctrl_c().await?;
    }

    feeder.abort();
    session.stop().await?;
    if !quiet {
        tracing::info!("tags reported this scan: {}", session.tags_reported());
    }
    session.shutdown().await?;

    status_printer.abort();
    tag_printer.abort();
    Ok(())
}

/// Push a rotating set of EPCs into the simulated reader, with repeats
/// inside the dedup window to exercise suppression.
async fn feed_tags(reader: Arc<SimulatedReader>) {
    let epcs = [
        "E28011700000020F12340001",
        "E28011700000020F12340002",
        "E28011700000020F12340003",
        "E28011700000020F12340004",
    ];
    let mut ticker = tokio::time::interval(Duration::from_millis(700));
    let mut i = 0usize;
    loop {
        ticker.tick().await;
        let epc = epcs[i % epcs.len()];
        reader.push_tags(vec![TagRead::new(epc), TagRead::new(epc)]);
        i += 1;
    }
}
