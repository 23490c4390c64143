//! gpgmux - GnuPG from the command line, driven through gpgmux sessions
//!
//! CLI entry point.

#![forbid(unsafe_code)]

use anyhow::Result;
use clap::Parser;
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod cli;
mod config;

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    // stdout carries ciphertext and plaintext; logs go to stderr
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter().into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = cli::Cli::parse();
    debug!("gpgmux v{}", env!("CARGO_PKG_VERSION"));

    cli::run(cli).await
}

/// Filter used when `RUST_LOG` is unset. `GPGMUX_DEBUG` raises the library
/// crates to debug so the per-chunk I/O events get through.
fn default_filter() -> &'static str {
    if gpgmux_core::config::debug_env_enabled() {
        "gpgmux=info,gpgmux_core=debug,gpgmux_gpg=debug"
    } else {
        "gpgmux=info,gpgmux_core=info,gpgmux_gpg=info"
    }
}
