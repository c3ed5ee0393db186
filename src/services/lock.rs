//! Session lock command

use std::{
    env,
    path::{Path, PathBuf},
    time::Duration,
};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::LockError;

/// Opaque "lock the current session" capability
#[async_trait]
pub trait SessionLocker: Send + Sync {
    async fn lock(&self) -> Result<(), LockError>;

    /// Human readable description for logs and status
    fn describe(&self) -> String;
}

/// What to do when locking fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockRetryPolicy {
    /// Extra attempts after the first failure; zero means log and give up
    pub retries: u32,
    pub delay: Duration,
}

impl Default for LockRetryPolicy {
    fn default() -> Self {
        Self {
            retries: 0,
            delay: Duration::from_secs(1),
        }
    }
}

/// Locks by running an external program
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLocker {
    program: String,
    args: Vec<String>,
}

impl CommandLocker {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self { program: program.into(), args }
    }

    /// Build from one whitespace-separated string, program first
    pub fn from_command_line(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self::new(program, parts.collect()))
    }

    /// The usual lock command for the current OS
    pub fn platform_default() -> Self {
        if cfg!(target_os = "windows") {
            Self::new("rundll32.exe", vec!["user32.dll,LockWorkStation".to_string()])
        } else if cfg!(target_os = "macos") {
            Self::new("pmset", vec!["displaysleepnow".to_string()])
        } else {
            Self::new("loginctl", vec!["lock-session".to_string()])
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

#[async_trait]
impl SessionLocker for CommandLocker {
    async fn lock(&self) -> Result<(), LockError> {
        info!("Executing session lock: {}", self.describe());

        let output = Command::new(&self.program)
            .args(&self.args)
            .output()
            .await
            .map_err(|source| LockError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(LockError::Failed {
                status: output.status.to_string(),
                stderr,
            });
        }

        info!("Session lock command executed");
        Ok(())
    }

    fn describe(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

/// Check that the lock program can be found, so a missing tool shows up at startup
pub fn check_lock_available(locker: &CommandLocker) -> Result<PathBuf, String> {
    let found = resolve_program(locker.program())
        .ok_or_else(|| format!("lock command `{}` was not found on PATH", locker.program()))?;
    debug!("Lock command resolved to {}", found.display());
    Ok(found)
}

fn resolve_program(program: &str) -> Option<PathBuf> {
    let direct = Path::new(program);
    if direct.components().count() > 1 {
        return direct.is_file().then(|| direct.to_path_buf());
    }

    let path = env::var_os("PATH")?;
    env::split_paths(&path).find_map(|dir| {
        let candidate = dir.join(program);
        if candidate.is_file() {
            return Some(candidate);
        }
        let with_exe = dir.join(format!("{}.exe", program));
        with_exe.is_file().then_some(with_exe)
    })
}
