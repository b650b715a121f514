//! Tactus Audio Player (tactus-ap) - Main entry point
//!
//! Plays a single audio file end to end: resolves the stream, opens the
//! decode context, and hands it to the scheduler, which keeps the cpal
//! output fed until the stream completes.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tactus_ap::audio::{CpalOutput, DecodeContext};
use tactus_ap::config::PlayerConfig;
use tactus_ap::playback::Scheduler;
use tactus_common::{event_channel, PlaybackEvent};

/// Command-line arguments for tactus-ap
#[derive(Parser, Debug)]
#[command(name = "tactus-ap")]
#[command(about = "Tactus audio player")]
#[command(version)]
struct Args {
    /// Audio file to play
    #[arg(required_unless_present = "list_devices")]
    file: Option<PathBuf>,

    /// Start position in seconds
    #[arg(short, long)]
    seek: Option<f64>,

    /// Output device name (overrides the config file)
    #[arg(short, long, env = "TACTUS_DEVICE")]
    device: Option<String>,

    /// Configuration file path
    #[arg(short, long, env = "TACTUS_CONFIG")]
    config: Option<PathBuf>,

    /// List available output devices and exit
    #[arg(long)]
    list_devices: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config =
        PlayerConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    // Initialize tracing: environment filter wins, config level otherwise
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("tactus_ap={}", config.logging.level).into());
    let registry = tracing_subscriber::registry().with(filter);
    match &config.logging.file {
        Some(path) => {
            let file = std::fs::File::create(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(Arc::new(file))
                        .with_ansi(false),
                )
                .init();
        }
        None => registry.with(tracing_subscriber::fmt::layer()).init(),
    }

    if args.list_devices {
        for name in CpalOutput::list_devices().context("Failed to enumerate audio devices")? {
            println!("{}", name);
        }
        return Ok(());
    }

    let Some(file) = args.file else {
        bail!("no audio file given");
    };

    let device = args.device.or_else(|| config.audio.device.clone());

    // Resolve the stream and open its decode context
    let mut context =
        DecodeContext::acquire(&file).context("Failed to acquire decode context")?;
    context.open().context("Failed to open decoder")?;
    let params = context.params().clone();

    info!(
        "Playing {} ({}Hz, {} channels)",
        file.display(),
        params.sample_rate,
        params.channels
    );

    let output = Arc::new(
        CpalOutput::new(device, params.sample_rate, config.audio.buffer_size)
            .context("Failed to open audio output")?,
    );
    output.set_volume(config.audio.volume);
    output.start().context("Failed to start audio output")?;

    let (event_tx, mut event_rx) = event_channel();
    let scheduler = Scheduler::new(output.clone(), event_tx);
    scheduler
        .initialize(Box::new(context), params)
        .context("Failed to initialize scheduler")?;
    scheduler.start(args.seek).context("Failed to start playback")?;

    loop {
        tokio::select! {
            event = event_rx.recv() => match event {
                Some(PlaybackEvent::StreamCompleted { .. }) => {
                    info!("Playback finished");
                    break;
                }
                Some(PlaybackEvent::DecodeFailed { detail, .. }) => {
                    warn!("Decode failure during playback: {}", detail);
                }
                Some(_) => {}
                None => break,
            },
            _ = signal::ctrl_c() => {
                info!("Interrupted, stopping playback");
                break;
            }
        }
    }

    scheduler.stop();
    let _ = output.stop();
    Ok(())
}
