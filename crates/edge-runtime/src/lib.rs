//! # Edge Runtime
//!
//! Wiring for the `edge-runtime` binary: configuration loading, logging
//! setup, the relay server and manifest generation.
//!
//! ## Startup Sequence
//!
//! 1. Install the tracing subscriber (`RUST_LOG`, default `info`)
//! 2. Load configuration (optional JSON file, then environment)
//! 3. Validate and start the session relay
//! 4. Serve until Ctrl+C

use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use dk_01_session_relay::{EdgeRelayService, RelayConfig};
use dk_02_offline_cache::{ManifestBuilder, ManifestReport};

/// Install the global fmt subscriber.
pub fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        // stdout carries manifest output
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to install tracing subscriber")?;
    Ok(())
}

/// Load configuration from the process environment.
pub fn load_config(file: Option<&Path>) -> Result<RelayConfig> {
    load_config_with(file, |key| std::env::var(key).ok())
}

/// Defaults, then `file` (JSON), then `lookup` overrides.
pub fn load_config_with<F>(file: Option<&Path>, lookup: F) -> Result<RelayConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = match file {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("invalid config file {}", path.display()))?
        }
        None => RelayConfig::default(),
    };

    config
        .apply_overrides(lookup)
        .context("invalid environment override")?;
    config.validate().context("invalid relay configuration")?;
    Ok(config)
}

/// Run the relay until Ctrl+C.
pub async fn serve(config: RelayConfig) -> Result<()> {
    info!("===========================================");
    info!("  Dopamine Kick Edge v{}", env!("CARGO_PKG_VERSION"));
    info!("  Backend: {}", config.backend_url);
    info!("===========================================");

    let service = EdgeRelayService::new(config).context("failed to build relay")?;
    service
        .start(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                return;
            }
            info!("Shutdown signal received");
        })
        .await
        .context("relay server failed")?;
    Ok(())
}

/// Scan `dir` and write the manifest JSON to `out`, or stdout when `None`.
pub fn write_manifest(dir: &Path, out: Option<&Path>) -> Result<ManifestReport> {
    if !dir.is_dir() {
        anyhow::bail!("{} does not exist. Run the front-end build first.", dir.display());
    }

    let report = ManifestBuilder::new()
        .scan(dir)
        .with_context(|| format!("failed to scan {}", dir.display()))?;
    let json = report.manifest.to_json_pretty()?;

    match out {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("failed to write {}", path.display()))?;
            info!(
                path = %path.display(),
                count = report.count(),
                "Precache manifest written"
            );
        }
        None => println!("{}", json),
    }
    Ok(report)
}
