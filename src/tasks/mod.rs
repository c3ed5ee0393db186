//! Background tasks module
//!
//! This module contains background tasks that run alongside the HTTP server.

pub mod countdown;
pub mod notices;

// Re-export main functions
pub use countdown::{spawn_countdown, CountdownOptions};
pub use notices::notice_task;
