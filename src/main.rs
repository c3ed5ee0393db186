//! USB AutoLocker - lock the session when the USB security key is removed
//!
//! This is the main entry point for the usb-autolocker daemon.

use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use usb_autolocker::{
    config::Config,
    countdown::CountdownCoordinator,
    device::{UsbBus, UsbHotplug},
    services::{check_lock_available, SessionLocker},
    state::{AppSettings, AppState},
    api::create_router,
    tasks::{notice_task, spawn_countdown, CountdownOptions},
    utils::{reload_signal, shutdown_signal},
    watcher::{PresenceWatcher, WatcherOptions},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    // Initialize tracing with appropriate log level
    tracing_subscriber::fmt()
        .with_env_filter(format!("usb_autolocker={},tower_http=info", config.log_level()))
        .init();

    info!("Starting usb-autolocker v{}", env!("CARGO_PKG_VERSION"));

    // Load persisted settings and apply command line overrides
    let settings_path = config.settings_path();
    let mut settings = AppSettings::load_or_default(&settings_path);
    config.apply_overrides(&mut settings);

    let pattern = match settings.pattern() {
        Ok(pattern) => pattern,
        Err(e) => {
            let fallback = AppSettings::default();
            warn!("{}; watching the default device instead", e);
            settings.device_vid = fallback.device_vid;
            settings.device_pid = fallback.device_pid;
            settings.pattern()?
        }
    };
    info!("Configuration: device={}, countdown={}s, enabled={}",
          pattern, settings.countdown_seconds, settings.enabled);

    // A missing lock tool is logged at startup, not fatal
    let locker = config.locker();
    if let Err(e) = check_lock_available(&locker) {
        warn!("{}", e);
    }
    info!("Lock command: {}", locker.describe());

    // Start the countdown coordinator and the notice renderer
    let options = CountdownOptions {
        lock_policy: config.lock_policy(),
        ..CountdownOptions::default()
    };
    let (countdown, countdown_task) = spawn_countdown(
        CountdownCoordinator::new(settings.countdown_seconds, settings.enabled),
        Arc::new(locker),
        options,
    );
    tokio::spawn(notice_task(countdown.subscribe_notices()));

    // Presence watcher feeding the coordinator
    let usb = Arc::new(UsbBus);
    let watcher = PresenceWatcher::new(
        usb.clone(),
        Arc::new(UsbHotplug),
        Arc::new(countdown.sender()),
        pattern,
        WatcherOptions::default(),
    );

    let state = Arc::new(AppState::new(
        settings,
        Some(settings_path),
        countdown.clone(),
        watcher,
        usb,
        config.port,
        config.host.clone(),
    ));
    if let Err(e) = state.start_watcher() {
        error!("{}", e);
        std::process::exit(1);
    }

    let _keyboard = start_keyboard_listener(&config, &state);

    // Settings reload on SIGHUP
    let reload_state = Arc::clone(&state);
    tokio::spawn(reload_signal(move || {
        let state = Arc::clone(&reload_state);
        tokio::task::spawn_blocking(move || {
            if let Err(e) = state.reload_settings() {
                warn!("{}", e);
            }
        });
    }));

    // Binding fails when another instance already owns the port
    let addr = config.address();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Cannot bind {} ({}); is another instance running?", addr, e);
            let _ = state.stop_watcher();
            std::process::exit(1);
        }
    };

    info!("Control API running on http://{}", addr);
    info!("Endpoints:");
    info!("  POST /enable      - Enable auto-lock");
    info!("  POST /disable     - Disable auto-lock");
    info!("  POST /toggle      - Toggle auto-lock");
    info!("  GET  /settings    - Show settings");
    info!("  PUT  /settings    - Change device or countdown");
    info!("  POST /reload      - Reload the settings file");
    info!("  GET  /devices     - List attached USB devices");
    info!("  POST /key-release - Report a key release (double Shift cancels)");
    info!("  GET  /status      - Check current status and countdown");
    info!("  GET  /health      - Health check");

    // Create HTTP router with all endpoints
    let app = create_router(Arc::clone(&state));
    let server = axum::serve(listener, app);

    tokio::select! {
        result = server => {
            if let Err(e) = result {
                error!("Server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received");
        }
    }

    let stop_state = Arc::clone(&state);
    if let Err(e) = tokio::task::spawn_blocking(move || stop_state.stop_watcher()).await? {
        warn!("{}", e);
    }
    countdown.shutdown();
    if tokio::time::timeout(Duration::from_secs(2), countdown_task).await.is_err() {
        warn!("Countdown coordinator did not stop in time");
    }

    info!("Shutdown complete");
    Ok(())
}

#[cfg(feature = "keyboard")]
fn start_keyboard_listener(
    config: &Config,
    state: &AppState,
) -> Option<usb_autolocker::input::InputListener> {
    use usb_autolocker::input::{gesture_forwarder, InputCancelSource, KeyboardPoller};

    if !config.keyboard {
        return None;
    }
    match KeyboardPoller::default().subscribe(gesture_forwarder(state.countdown.sender())) {
        Ok(listener) => Some(listener),
        Err(e) => {
            warn!("{}; use POST /key-release to cancel instead", e);
            None
        }
    }
}

#[cfg(not(feature = "keyboard"))]
fn start_keyboard_listener(config: &Config, _state: &AppState) -> Option<()> {
    if config.keyboard {
        warn!("Built without the `keyboard` feature; use POST /key-release to cancel instead");
    }
    None
}
