//! USB AutoLocker - locks the session when a USB security key is removed
//!
//! A presence watcher turns device events into clean removal/insertion
//! transitions; a countdown coordinator arms on removal, can be cancelled by
//! re-inserting the key or double-pressing Shift, and locks the session when
//! the countdown runs out.

pub mod config;
pub mod error;
pub mod device;
pub mod watcher;
pub mod countdown;
pub mod input;
pub mod services;
pub mod state;
pub mod tasks;
pub mod api;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use state::AppState;
pub use api::create_router;
pub use utils::signals::shutdown_signal;
