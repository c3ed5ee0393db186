//! State management module
//!
//! Persisted settings, the published countdown snapshot and the shared
//! application state used by the HTTP handlers.

pub mod app_state;
pub mod countdown_status;
pub mod settings;

// Re-export main types
pub use app_state::{AppState, SettingsChange, SettingsUpdate};
pub use countdown_status::CountdownStatus;
pub use settings::AppSettings;
