use dotenv::dotenv;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

mod config;
mod error;
mod notes;
mod sync;
mod watch;

use config::SyncConfig;
use sync::SyncEngine;
use watch::{EventCoalescer, VaultWatcher};

#[tokio::main]
async fn main() {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("vault-sync v{}", env!("CARGO_PKG_VERSION"));

    let config = match SyncConfig::load().and_then(|c| c.validate().map(|_| c)) {
        Ok(config) => config,
        Err(e) => {
            log::error!("[CONFIG] {}", e);
            std::process::exit(1);
        }
    };
    log::info!(
        "[CONFIG] Syncing {} -> {}",
        config.vault_notes_path.display(),
        config.astro_notes_path.display()
    );

    let engine = SyncEngine::new(&config);
    if let Err(e) = engine.initial_sync().await {
        log::error!("[SYNC] Initial sync failed: {}", e);
        std::process::exit(1);
    }
    let indexed = engine.index().len();
    log::info!("[SYNC] Engine {} with {} notes indexed", engine.state(), indexed);

    let (tx, rx) = mpsc::unbounded_channel();
    let _watcher = match VaultWatcher::start(&config.vault_notes_path, &config.vault_images_path, tx) {
        Ok(watcher) => watcher,
        Err(e) => {
            log::error!("[WATCH] Failed to start watcher: {}", e);
            std::process::exit(1);
        }
    };

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        log::info!("Received Ctrl+C, shutting down...");
        signal_token.cancel();
    });

    engine
        .run(rx, EventCoalescer::new(config.coalescer_config()), shutdown)
        .await;

    log::info!("Shutdown complete");
}
