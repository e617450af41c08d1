use anyhow::{Context, Result};
use chatpad::backends::VirtualConsole;
use chatpad::listener::TraceListener;
use chatpad::{Config, Coordinator, Device, ShutdownCause, TranscriptStream};
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};

/// Let a chat room play a handheld console.
#[derive(Debug, Parser)]
#[command(name = "chatpad", version, about)]
struct Args {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Program image to load (overrides `device.rom`).
    #[arg(long)]
    rom: Option<PathBuf>,

    /// Chat transcript to poll (overrides `stream.transcript`).
    #[arg(long)]
    transcript: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `chatpad=trace` (overrides `log.level`).
    #[arg(long)]
    log_level: Option<String>,
}

impl Args {
    fn into_config(self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => Config::default(),
        };
        if let Some(rom) = self.rom {
            config.device.rom = rom;
        }
        if let Some(transcript) = self.transcript {
            config.stream.transcript = transcript;
        }
        if let Some(level) = self.log_level {
            config.log.level = level;
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Args::parse().into_config()?;
    chatpad::logger::init(&config.log.level)?;

    if !config.device.rom.exists() {
        anyhow::bail!("ROM file not found at {}", config.device.rom.display());
    }

    let rom = config.device.rom.clone();
    let factory = move || -> chatpad::Result<Box<dyn Device>> {
        Ok(Box::new(VirtualConsole::open(&rom)?.with_listener(TraceListener)))
    };
    let stream = Box::new(TranscriptStream::new(&config.stream.transcript));

    info!(
        rom = %config.device.rom.display(),
        transcript = %config.stream.transcript.display(),
        "starting chatpad"
    );
    let mut coordinator = Coordinator::start(&config, factory, stream)
        .await
        .context("startup failed")?;

    match coordinator.run_until_shutdown().await {
        Ok(ShutdownCause::Interrupt) => info!("stopped by operator"),
        Ok(ShutdownCause::Signalled) => info!("stopped"),
        Err(e) => {
            error!(error = %e, "error during execution");
            return Err(e.into());
        }
    }
    Ok(())
}
