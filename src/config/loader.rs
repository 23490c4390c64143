//! Configuration loading
//!
//! Embedded defaults, then optional files, then environment.

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat, Source};

use super::AppConfig;

/// Embedded default configuration (compiled into binary)
pub const DEFAULT_CONFIG: &str = include_str!("../../config/default.toml");

/// Load configuration from files and environment
pub fn load_config() -> Result<AppConfig> {
    build(File::with_name("config/local").required(false))
}

fn build(local: impl Source + Send + Sync + 'static) -> Result<AppConfig> {
    let config = Config::builder()
        // 1. Embedded defaults (always available)
        .add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml))
        // 2. Local overrides (optional)
        .add_source(local)
        // 3. Environment variables (highest priority)
        // GPGMUX_GPG__TIMEOUT_MS=30000 sets gpg.timeout_ms
        .add_source(
            Environment::with_prefix("GPGMUX")
                .prefix_separator("_")
                .separator("__")
                .list_separator(" ")
                .with_list_parse_key("gpg.default_args")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    config
        .try_deserialize()
        .context("Failed to deserialize configuration")
}
