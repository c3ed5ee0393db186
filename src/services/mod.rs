//! External system operations
//!
//! This module wraps the OS-level lock action behind [`SessionLocker`].

pub mod lock;

pub use lock::{check_lock_available, CommandLocker, LockRetryPolicy, SessionLocker};
