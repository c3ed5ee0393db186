//! Configuration and CLI argument handling

use std::{path::PathBuf, time::Duration};

use clap::Parser;

use crate::{
    services::{CommandLocker, LockRetryPolicy},
    state::AppSettings,
};

/// CLI argument parsing structure
#[derive(Debug, Parser)]
#[command(name = "usb-autolocker")]
#[command(about = "Locks the session when a designated USB security key is removed")]
#[command(version)]
pub struct Config {
    /// Settings file (defaults to the user config directory)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Port for the local control API
    #[arg(short, long, default_value = "20554")]
    pub port: u16,

    /// Host address to bind to
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Override the watched vendor id, e.g. VID_1050
    #[arg(long)]
    pub vendor_id: Option<String>,

    /// Override the watched product id, e.g. PID_0407
    #[arg(long)]
    pub product_id: Option<String>,

    /// Override the countdown length in seconds (1-30)
    #[arg(long)]
    pub countdown: Option<u32>,

    /// Start with auto-lock disabled
    #[arg(long)]
    pub disabled: bool,

    /// Lock command with its arguments as one quoted string, e.g. "xdg-screensaver lock"
    #[arg(long, value_name = "COMMAND")]
    pub lock_command: Option<String>,

    /// Extra attempts when the lock command fails
    #[arg(long, default_value = "0")]
    pub lock_retries: u32,

    /// Delay between lock attempts in milliseconds
    #[arg(long, default_value = "1000")]
    pub lock_retry_delay_ms: u64,

    /// Listen for the double-Shift cancel gesture system-wide
    #[arg(long)]
    pub keyboard: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Config {
    /// Parse configuration from command line arguments
    pub fn parse() -> Self {
        Parser::parse()
    }

    /// Get the server address as a formatted string
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Get the appropriate log level based on verbose flag
    pub fn log_level(&self) -> &'static str {
        if self.verbose { "debug" } else { "info" }
    }

    pub fn settings_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(AppSettings::default_path)
    }

    /// Apply command line overrides on top of persisted settings
    pub fn apply_overrides(&self, settings: &mut AppSettings) {
        if let Some(vendor) = &self.vendor_id {
            settings.device_vid = vendor.clone();
        }
        if let Some(product) = &self.product_id {
            settings.device_pid = product.clone();
        }
        if let Some(seconds) = self.countdown {
            settings.set_countdown_seconds(seconds);
        }
        if self.disabled {
            settings.enabled = false;
        }
    }

    pub fn locker(&self) -> CommandLocker {
        self.lock_command
            .as_deref()
            .and_then(CommandLocker::from_command_line)
            .unwrap_or_else(CommandLocker::platform_default)
    }

    pub fn lock_policy(&self) -> LockRetryPolicy {
        LockRetryPolicy {
            retries: self.lock_retries,
            delay: Duration::from_millis(self.lock_retry_delay_ms),
        }
    }
}
