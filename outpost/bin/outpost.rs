#![deny(clippy::pedantic, clippy::all, clippy::nursery)]
#![allow(clippy::must_use_candidate)]

#[cfg(not(any(target_os = "macos", unix)))]
compile_error!("Only macos and unix are currently supported");

use std::path::PathBuf;

use clap::Parser;
use outpost::{Outpost, locate_config};
use outpost_common::{logging, tracing};

/// Deliver queued email notifications through SMTP providers
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Configuration file (defaults to `OUTPOST_CONFIG`, then
    /// ./outpost.config.ron, then /etc/outpost/outpost.config.ron)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run a single polling cycle, wait for it to finish and exit
    #[arg(long)]
    once: bool,
}

fn install_panic_hook() {
    let default_hook = std::panic::take_hook();

    std::panic::set_hook(Box::new(move |info| {
        tracing::error!("Stopped abnormally: {info}");
        default_hook(info);
    }));
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    logging::init();
    install_panic_hook();

    let config_path = locate_config(args.config)?;
    let service = Outpost::load(&config_path)?.open().await?;

    if args.once {
        service.drain().await.map(|_| ())
    } else {
        service.serve().await
    }
}
