//! Session configuration file, defaults and environment overrides.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use vault_session_lock::LockPolicy;

/// Env var overriding [`SessionConfig::lock_after_secs`].
pub const ENV_LOCK_AFTER_SECS: &str = "VAULT_SESSION_LOCK_AFTER_SECS";
/// Env var overriding [`SessionConfig::lock_after_global_secs`].
pub const ENV_LOCK_AFTER_GLOBAL_SECS: &str = "VAULT_SESSION_LOCK_AFTER_GLOBAL_SECS";

const MIN_TICK_INTERVAL_MS: u64 = 100;

/// Timeouts and policy flags injected into the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    /// Local inactivity timeout; 0 disables.
    pub lock_after_secs: u64,
    /// Global (OS input) inactivity timeout; 0 disables.
    pub lock_after_global_secs: u64,
    /// Clipboard auto-clear countdown; `None` disables.
    pub clipboard_clear_secs: Option<u32>,
    /// Clear an owned clipboard on shutdown.
    pub clipboard_clear_on_exit: bool,
    /// Lock requests exit the application instead.
    pub exit_instead_of_lock: bool,
    /// Save modified documents before locking.
    pub auto_save_on_lock: bool,
    /// Save modified documents on close without asking.
    pub auto_save_on_close: bool,
    /// Lock when the workstation locks.
    pub lock_on_session_lock: bool,
    /// Lock before the system suspends.
    pub lock_on_suspend: bool,
    /// Lock when another user session becomes active.
    pub lock_on_user_switch: bool,
    /// Lock when the main window is minimized.
    pub lock_on_minimize: bool,
    /// Credential prompts per open or unlock.
    pub max_credential_attempts: u32,
    /// Field resolver worker threads.
    pub resolver_workers: usize,
    /// Cadence the host calls `tick` at.
    pub tick_interval_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            lock_after_secs: 300,
            lock_after_global_secs: 0,
            clipboard_clear_secs: Some(12),
            clipboard_clear_on_exit: true,
            exit_instead_of_lock: false,
            auto_save_on_lock: true,
            auto_save_on_close: false,
            lock_on_session_lock: true,
            lock_on_suspend: true,
            lock_on_user_switch: true,
            lock_on_minimize: false,
            max_credential_attempts: 3,
            resolver_workers: 2,
            tick_interval_ms: 1_000,
        }
    }
}

impl SessionConfig {
    /// Loads and validates a JSON config file.
    ///
    /// A missing file yields the defaults.
    ///
    /// # Errors
    /// - [`ConfigError::Read`] for I/O failures other than not-found.
    /// - [`ConfigError::Parse`] for malformed JSON or unknown keys.
    /// - [`ConfigError::Invalid`] when validation fails.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match fs::read_to_string(path) {
            Ok(raw) => Self::from_json(&raw),
            Err(error) if error.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "Config file missing; using defaults");
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Parses and validates JSON text.
    ///
    /// # Errors
    /// [`ConfigError::Parse`] or [`ConfigError::Invalid`].
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.resolver_workers == 0 {
            return Err(ConfigError::Invalid(
                "resolver_workers must be at least 1".to_string(),
            ));
        }
        if self.tick_interval_ms < MIN_TICK_INTERVAL_MS {
            return Err(ConfigError::Invalid(format!(
                "tick_interval_ms must be at least {MIN_TICK_INTERVAL_MS}"
            )));
        }
        if self.max_credential_attempts == 0 {
            return Err(ConfigError::Invalid(
                "max_credential_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Applies timeout overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_with(|key| std::env::var(key).ok());
    }

    /// Applies timeout overrides read through `lookup`.
    ///
    /// Values that do not parse as seconds are ignored with a warning.
    pub fn apply_overrides_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(secs) = parse_override(&lookup, ENV_LOCK_AFTER_SECS) {
            self.lock_after_secs = secs;
        }
        if let Some(secs) = parse_override(&lookup, ENV_LOCK_AFTER_GLOBAL_SECS) {
            self.lock_after_global_secs = secs;
        }
    }

    /// Policy for timer, signal and user lock requests.
    pub fn lock_policy(&self) -> LockPolicy {
        LockPolicy {
            exit_instead_of_lock: self.exit_instead_of_lock,
            save_modified: self.auto_save_on_lock,
        }
    }
}

fn parse_override(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<u64> {
    let raw = lookup(key)?;
    match raw.trim().parse::<u64>() {
        Ok(value) => Some(value),
        Err(error) => {
            warn!(key, value = %raw, error = %error, "Ignoring invalid config override");
            None
        }
    }
}

/// Configuration error type.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file exists but could not be read.
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        /// File that failed.
        path: PathBuf,
        /// Underlying I/O failure.
        source: std::io::Error,
    },
    /// Config text is not valid.
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    /// A value is out of range.
    #[error("invalid config: {0}")]
    Invalid(String),
}
