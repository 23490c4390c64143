//! Application configuration
//!
//! One [`AppConfig`] is loaded at startup (see [`loader`]) and the `gpg`
//! section is handed to the client as an immutable snapshot.

use gpgmux_gpg::GpgConfig;
use serde::{Deserialize, Serialize};

pub mod loader;

pub use loader::load_config;

/// Top-level configuration file layout
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub gpg: GpgConfig,
}
