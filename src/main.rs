// src/main.rs
//! GPS MQTT Tracker - publishes modem fixes to an MQTT broker

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use gps_mqtt_tracker::{
    config::TrackerConfig,
    ingest::{self, JsonFileStore},
    session::{self, Publisher},
    ModemDriver, Tracker, TrackerSettings,
};
use log::{error, info, LevelFilter};
use std::{io::Read, path::PathBuf, time::Duration};
use tokio::sync::mpsc;

#[derive(Parser)]
#[command(name = "gps-mqtt-tracker", version, about = "Publish GNSS modem fixes over MQTT/TLS")]
struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Poll the modem and publish fixes (default)
    Run(RunArgs),
    /// Store one published record, as the cloud ingestion handler would
    Ingest(IngestArgs),
}

#[derive(Args, Default)]
struct RunArgs {
    /// Config file (defaults to ~/.config/gps-mqtt-tracker/config.json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Modem AT serial port
    #[arg(short, long)]
    port: Option<String>,

    /// Broker host name
    #[arg(short, long)]
    endpoint: Option<String>,

    #[arg(long)]
    device_id: Option<String>,
}

#[derive(Args)]
struct IngestArgs {
    /// JSON file holding the stored records
    #[arg(short, long)]
    store: PathBuf,

    /// Event file; read from stdin when omitted
    #[arg(long)]
    event: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { LevelFilter::Debug } else { LevelFilter::Info };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    match cli.command.unwrap_or(Command::Run(RunArgs::default())) {
        Command::Run(args) => run(args).await,
        Command::Ingest(args) => ingest_event(args),
    }
}

async fn run(args: RunArgs) -> anyhow::Result<()> {
    let mut config = TrackerConfig::load(args.config.as_deref())?;
    if let Some(port) = args.port {
        config.update_serial(port);
    }
    if let Some(endpoint) = args.endpoint {
        config.update_endpoint(endpoint);
    }
    if let Some(device_id) = args.device_id {
        config.device_id = device_id;
    }
    config.validate()?;
    let settings = TrackerSettings::from_config(&config)?;

    if let Err(e) = session::check_credentials(&config.broker) {
        error!("{}", e);
        std::process::exit(1);
    }

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let event_logger = tokio::spawn(session::log_events(events_rx));

    let mut mqtt = session::start(&config.broker, events_tx)?;

    let driver = match ModemDriver::open(&config.serial) {
        Ok(driver) => driver,
        Err(e) => {
            mqtt.shutdown().await?;
            return Err(e).with_context(|| format!("modem unavailable on {}", config.serial.port));
        }
    };

    info!(
        "Publishing fixes from {} as {} every {}s",
        config.serial.port, config.device_id, config.publish_interval_secs
    );
    let tracker = Tracker::new(driver, mqtt, settings);
    let result = tracker.run(shutdown_signal()).await;

    // the sender lives in the network task, which has stopped by now
    let _ = tokio::time::timeout(Duration::from_secs(1), event_logger).await;

    result.map_err(Into::into)
}

fn ingest_event(args: IngestArgs) -> anyhow::Result<()> {
    let raw = match &args.event {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read event {}", path.display()))?,
        None => {
            let mut raw = String::new();
            std::io::stdin().read_to_string(&mut raw).context("failed to read event from stdin")?;
            raw
        }
    };
    let event: serde_json::Value = serde_json::from_str(&raw).context("event is not valid JSON")?;

    let mut store = JsonFileStore::open(&args.store)?;
    let response = ingest::handle_event(&event, &mut store);
    println!("{}", serde_json::to_string_pretty(&response)?);

    if !response.is_success() {
        std::process::exit(1);
    }
    Ok(())
}

/// Resolves on Ctrl+C, or SIGTERM on Unix
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
