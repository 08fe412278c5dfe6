//! # almanac-daemon
//!
//! The almanac plugin host.
//!
//! This daemon is responsible for:
//! - Scanning the local plugin cache
//! - Syncing the configured remote plugin repositories
//! - Installing and launching autostart plugins
//! - Cancelling running plugin scripts on shutdown
//!
//! ## Configuration
//!
//! The daemon reads configuration from `$XDG_CONFIG_HOME/almanac/config.toml`.
//!
//! ## Running
//!
//! ```bash
//! # Start the daemon
//! cargo run --bin almanac-daemon
//!
//! # With debug logging
//! RUST_LOG=debug cargo run --bin almanac-daemon
//! ```

use almanac_daemon::config::Config;
use almanac_daemon::launcher::PluginLauncher;
use almanac_plugins::PluginRepository;
use anyhow::Result;
use std::sync::Arc;
use tokio::task;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let loaded = Config::load_default();
    let config = loaded.as_ref().cloned().unwrap_or_default();

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.daemon.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!("Starting almanac-daemon v{}", env!("CARGO_PKG_VERSION"));
    match &loaded {
        Ok(_) => info!("Loaded configuration from default path"),
        Err(e) => warn!("Failed to load config, using defaults: {:#}", e),
    }

    let launcher = {
        let config = config.clone();
        Arc::new(task::spawn_blocking(move || PluginLauncher::from_config(&config)).await??)
    };

    // Repository I/O blocks, keep it off the async workers
    let syncer = Arc::clone(&launcher);
    match task::spawn_blocking(move || syncer.sync()).await? {
        Ok(()) => info!("Plugin repositories synced"),
        Err(e) => warn!("Plugin sync: {:#}", e),
    }

    for repo in launcher.aggregate().repositories() {
        let synced = chrono::DateTime::from_timestamp_millis(repo.last_updated())
            .filter(|_| repo.last_updated() >= 0)
            .map(|at| at.to_rfc3339())
            .unwrap_or_else(|| "never".to_string());
        info!("Repository {} (last synced: {})", repo.url(), synced);
    }

    let entries = {
        let launcher = Arc::clone(&launcher);
        task::spawn_blocking(move || launcher.list_plugins()).await?
    };
    for entry in &entries {
        info!(
            "Plugin: {} v{} from {} (installed: {})",
            entry.name, entry.version, entry.source, entry.installed
        );
    }

    let mut running = Vec::new();
    for name in &config.plugins.autostart {
        let launcher = Arc::clone(&launcher);
        let plugin = name.clone();
        let launched = task::spawn_blocking(move || {
            launcher.install(&plugin)?;
            launcher.launch(&plugin, Vec::new())
        })
        .await?;

        match launched {
            Ok(Some(process)) => running.push(process),
            Ok(None) => warn!("Autostart plugin {} could not be launched", name),
            Err(e) => warn!("Autostart of {} failed: {:#}", name, e),
        }
    }

    info!("Daemon startup complete ({} plugin(s) running)", running.len());
    info!("Press Ctrl+C to stop");

    tokio::signal::ctrl_c().await?;

    info!("Shutting down...");

    // cancel() blocks until each script acknowledges
    task::spawn_blocking(move || {
        for process in &running {
            if process.cancel() {
                info!("Cancelled plugin process {}", process.label());
            }
        }
    })
    .await?;

    info!("Daemon stopped");
    Ok(())
}
