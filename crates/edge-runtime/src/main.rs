//! # Edge Runtime
//!
//! `edge-runtime serve` runs the session relay in front of the backend.
//! `edge-runtime manifest <dir>` writes the service worker precache manifest
//! for a front-end build.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;

/// Habit tracker edge: session relay and service worker tooling
#[derive(Parser, Debug)]
#[command(name = "edge-runtime")]
#[command(about = "BFF session relay and precache manifest generator")]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the session relay (default)
    Serve {
        /// JSON config file; environment variables override it
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Generate the precache manifest for a build output directory
    Manifest {
        /// Build output directory
        #[arg(default_value = ".output/public")]
        dir: PathBuf,

        /// Output file (stdout when omitted)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    edge_runtime::init_tracing()?;

    match args.command.unwrap_or(Command::Serve { config: None }) {
        Command::Serve { config } => {
            let config = edge_runtime::load_config(config.as_deref())?;
            edge_runtime::serve(config).await
        }
        Command::Manifest { dir, out } => {
            let report = edge_runtime::write_manifest(&dir, out.as_deref())?;
            info!(
                count = report.count(),
                total_bytes = report.total_size,
                skipped = report.skipped.len(),
                "Precache manifest generated"
            );
            Ok(())
        }
    }
}
