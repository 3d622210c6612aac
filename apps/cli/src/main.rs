use std::path::PathBuf;
use std::sync::mpsc::RecvTimeoutError;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use dongle_core::{ProtocolCommand, Session, SessionConfig};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about = "XInput dongle probe (Pure Rust)", long_about = None)]
struct Args {
    /// Session configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write the default configuration to this path and exit
    #[arg(long)]
    dump_config: Option<PathBuf>,

    /// Read the standard configuration with this id
    #[arg(long)]
    read_config: Option<u8>,

    /// Read the LED configuration with this id
    #[arg(long)]
    read_led: Option<u8>,

    /// Seconds to listen for messages
    #[arg(long, default_value_t = 3)]
    wait_secs: u64,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let args = Args::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(if args.verbose {
                    tracing::Level::DEBUG.into()
                } else {
                    tracing::Level::INFO.into()
                })
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    if let Err(e) = run(&args) {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<()> {
    if let Some(path) = &args.dump_config {
        SessionConfig::default().save_to_file(path)?;
        info!("Wrote default configuration to {}", path.display());
        return Ok(());
    }

    let config = match &args.config {
        Some(path) => SessionConfig::load_from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => SessionConfig::default(),
    };

    info!("Starting dongle probe (nusb backend)...");
    let session = Session::open(config).context("opening dongle")?;

    session.send(ProtocolCommand::GetDongleVersion)?;
    session.send(ProtocolCommand::GetDeviceInfo)?;
    if let Some(config_id) = args.read_config {
        session.send(ProtocolCommand::ReadConfig { config_id })?;
    }
    if let Some(config_id) = args.read_led {
        session.send(ProtocolCommand::ReadLedConfig { config_id })?;
    }

    let deadline = Instant::now() + Duration::from_secs(args.wait_secs);
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        match session.recv_timeout(remaining) {
            Ok(message) => println!("{message}"),
            Err(RecvTimeoutError::Timeout) => break,
            Err(RecvTimeoutError::Disconnected) => {
                warn!("Dongle went away");
                break;
            }
        }
    }

    session.close()?;
    Ok(())
}
