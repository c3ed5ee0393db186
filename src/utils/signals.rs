//! Signal handling for graceful shutdown and settings reload

use signal_hook::consts::{SIGHUP, SIGINT, SIGTERM};
use signal_hook_tokio::Signals;
use futures::stream::StreamExt;
use tracing::{error, info};

/// Wait for shutdown signals (SIGTERM, SIGINT)
pub async fn shutdown_signal() {
    let mut signals = match Signals::new([SIGTERM, SIGINT]) {
        Ok(signals) => signals,
        Err(e) => {
            error!("Failed to register shutdown signal handler: {}", e);
            return std::future::pending().await;
        }
    };

    if let Some(signal) = signals.next().await {
        info!("Received signal: {}", signal);
    }
}

/// Call `on_reload` every time SIGHUP arrives
pub async fn reload_signal<F>(mut on_reload: F)
where
    F: FnMut(),
{
    let mut signals = match Signals::new([SIGHUP]) {
        Ok(signals) => signals,
        Err(e) => {
            error!("Failed to register reload signal handler: {}", e);
            return;
        }
    };

    while signals.next().await.is_some() {
        info!("Received SIGHUP, reloading settings");
        on_reload();
    }
}
