//! Session configuration
//!
//! A [`GpgConfig`] is assembled once (defaults, config file, environment)
//! and cloned into every session. Nothing here is mutated after a session
//! starts, so concurrent sessions never share mutable state.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default program name, resolved through `PATH`
pub const DEFAULT_COMMAND: &str = "gpg";

/// Default whole-session timeout in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Environment variable that turns on per-chunk I/O logging
pub const DEBUG_ENV: &str = "GPGMUX_DEBUG";

/// Flags every invocation carries unless the default args already name them
pub const REQUIRED_FLAGS: &[&str] = &["--no-tty", "--quiet"];

/// Configuration for driving the external `gpg` binary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GpgConfig {
    /// Program to execute
    pub command: String,
    /// Arguments placed before everything else
    pub default_args: Vec<String>,
    /// Passed as `--homedir` when set
    pub homedir: Option<PathBuf>,
    /// Whole-session deadline in milliseconds
    pub timeout_ms: u64,
    /// Log every I/O chunk and status event
    pub debug_io: bool,
}

impl Default for GpgConfig {
    fn default() -> Self {
        Self {
            command: DEFAULT_COMMAND.to_string(),
            default_args: Vec::new(),
            homedir: None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            debug_io: debug_env_enabled(),
        }
    }
}

impl GpgConfig {
    /// Session deadline as a [`Duration`]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Copy of this config with a different program
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = command.into();
        self
    }

    /// Copy of this config with different leading arguments
    pub fn with_default_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.default_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Copy of this config pointing at another keyring directory
    pub fn with_homedir(mut self, homedir: impl Into<PathBuf>) -> Self {
        self.homedir = Some(homedir.into());
        self
    }

    /// Copy of this config with another deadline
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Arguments shared by every invocation:
    /// `<default-args> [--homedir <dir>] --no-tty --quiet`.
    pub fn base_args(&self) -> Vec<String> {
        let mut args = self.default_args.clone();
        if let Some(homedir) = &self.homedir {
            args.push("--homedir".to_string());
            args.push(homedir.to_string_lossy().into_owned());
        }
        for flag in REQUIRED_FLAGS {
            if !self.default_args.iter().any(|a| a == flag) {
                args.push((*flag).to_string());
            }
        }
        args
    }
}

/// Whether [`DEBUG_ENV`] asks for verbose I/O logging
pub fn debug_env_enabled() -> bool {
    std::env::var(DEBUG_ENV)
        .map(|v| is_truthy(&v))
        .unwrap_or(false)
}

fn is_truthy(value: &str) -> bool {
    !matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "" | "0" | "false" | "no" | "off"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GpgConfig::default();
        assert_eq!(config.command, "gpg");
        assert!(config.default_args.is_empty());
        assert!(config.homedir.is_none());
        assert_eq!(config.timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_base_args_appends_required_flags() {
        let config = GpgConfig::default().with_default_args(["--batch"]);
        assert_eq!(config.base_args(), vec!["--batch", "--no-tty", "--quiet"]);
    }

    #[test]
    fn test_base_args_does_not_duplicate_flags() {
        let config = GpgConfig::default().with_default_args(["--quiet", "--no-tty"]);
        assert_eq!(config.base_args(), vec!["--quiet", "--no-tty"]);
    }

    #[test]
    fn test_base_args_homedir_before_flags() {
        let config = GpgConfig::default().with_homedir("/tmp/keys");
        assert_eq!(
            config.base_args(),
            vec!["--homedir", "/tmp/keys", "--no-tty", "--quiet"]
        );
    }

    #[test]
    fn test_with_timeout() {
        let config = GpgConfig::default().with_timeout(Duration::from_millis(250));
        assert_eq!(config.timeout_ms, 250);
    }

    #[test]
    fn test_truthy_values() {
        assert!(is_truthy("1"));
        assert!(is_truthy("yes"));
        assert!(is_truthy("TRUE"));
        assert!(!is_truthy("0"));
        assert!(!is_truthy("off"));
        assert!(!is_truthy(""));
    }
}
