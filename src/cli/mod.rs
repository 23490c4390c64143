//! CLI module for gpgmux
//!
//! Subcommands:
//! - `encrypt`, `decrypt`, `symmetric`: stdin to stdout through gpg
//! - `list-keys`: keyring listing, one line per key
//! - `version`: installed GnuPG version

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use gpgmux_gpg::{Gpg, GpgConfig};

use crate::config;

pub mod crypt;
pub mod keys;
pub mod passphrase;

/// GnuPG operations with enforced deadlines
#[derive(Parser, Debug)]
#[command(name = "gpgmux")]
#[command(about = "Run gpg operations with passphrase handling and timeouts")]
#[command(version)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Overrides applied on top of the loaded configuration
#[derive(Args, Debug, Default)]
pub struct GlobalArgs {
    /// Keyring directory passed to gpg as --homedir
    #[arg(long, global = true)]
    pub homedir: Option<PathBuf>,

    /// Whole-operation deadline in milliseconds
    #[arg(long, global = true)]
    pub timeout_ms: Option<u64>,

    /// gpg program to run
    #[arg(long = "gpg", global = true, value_name = "PATH")]
    pub gpg_command: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Encrypt stdin to one or more recipients
    Encrypt(crypt::EncryptArgs),
    /// Decrypt stdin
    Decrypt,
    /// Encrypt stdin with a passphrase
    Symmetric(crypt::SymmetricArgs),
    /// List keys in the keyring
    ListKeys(keys::ListArgs),
    /// Show the installed GnuPG version
    Version,
}

impl GlobalArgs {
    /// Apply command-line overrides to the loaded configuration
    pub fn apply(&self, mut config: GpgConfig) -> GpgConfig {
        if let Some(homedir) = &self.homedir {
            config = config.with_homedir(homedir);
        }
        if let Some(ms) = self.timeout_ms {
            config = config.with_timeout(Duration::from_millis(ms));
        }
        if let Some(command) = &self.gpg_command {
            config = config.with_command(command);
        }
        config
    }
}

/// Run the CLI command
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let Some(command) = cli.command else {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        cmd.print_help()?;
        println!();
        return Ok(());
    };

    let app = config::load_config().context("Failed to load configuration")?;
    let gpg = Gpg::new(cli.global.apply(app.gpg));

    match command {
        Commands::Encrypt(args) => crypt::encrypt(&gpg, args).await,
        Commands::Decrypt => crypt::decrypt(&gpg).await,
        Commands::Symmetric(args) => crypt::symmetric(&gpg, args).await,
        Commands::ListKeys(args) => keys::list(&gpg, args).await,
        Commands::Version => keys::version(&gpg).await,
    }
}
