use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod replay;

/// Framebuffer capture and detiling tool
#[derive(Parser)]
#[command(name = "fbtap", version, about)]
struct Args {
    /// Capture configuration (JSON)
    #[arg(long, global = true, env = "FBTAP_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Feed the framebuffer dumps listed in a manifest through a capture session
    Replay {
        /// Manifest listing the frames, in trigger order
        manifest: PathBuf,

        /// Write the newest linear capture to this file
        #[arg(long)]
        raw_out: Option<PathBuf>,

        /// Bytes per export read
        #[arg(long, default_value_t = replay::DEFAULT_CHUNK)]
        chunk: usize,

        /// Print the status report as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // RUST_LOG=debug for per-page and detiling detail
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    info!("fbtap v{}", env!("CARGO_PKG_VERSION"));

    let result = match args.command {
        Command::Replay { manifest, raw_out, chunk, json } => {
            let opts = replay::Options {
                manifest,
                config: args.config,
                raw_out,
                chunk,
                json,
            };
            replay::run(opts).await
        }
    };

    if let Err(e) = &result {
        error!("Fatal error: {:#}", e);
    }
    result
}
