//! list-keys / version subcommands

use anyhow::{Context, Result};
use clap::Args;
use gpgmux_gpg::{Capabilities, Gpg, Key, KeyKind, Validity};

#[derive(Args, Debug)]
pub struct ListArgs {
    /// List secret keys instead of public keys
    #[arg(long)]
    pub secret: bool,

    /// Print the listing as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn list(gpg: &Gpg, args: ListArgs) -> Result<()> {
    let keys = if args.secret {
        gpg.list_secret_keys().await
    } else {
        gpg.list_public_keys().await
    }
    .context("Failed to list keys")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&keys)?);
    } else {
        for key in &keys {
            println!("{}", summary(key));
        }
    }
    Ok(())
}

pub async fn version(gpg: &Gpg) -> Result<()> {
    let version = gpg.version().await.context("Failed to query gpg version")?;
    println!("{}", version.raw);
    Ok(())
}

/// One-line description: `pub 1A2B3C4D5E6F7081 2023-11-14 [SC] ultimate Alice <...>`
pub fn summary(key: &Key) -> String {
    let kind = match key.kind {
        KeyKind::Public => "pub",
        KeyKind::Secret => "sec",
    };
    format!(
        "{kind} {} {} [{}] {} {}",
        key.key_id,
        key.created.format("%Y-%m-%d"),
        usage_letters(&key.capabilities),
        validity_name(key.validity),
        key.display_name().unwrap_or("(no user id)"),
    )
}

fn usage_letters(caps: &Capabilities) -> String {
    let usage = if caps.usable.is_empty() { caps.own } else { caps.usable };
    let mut letters = String::new();
    for (set, letter) in [
        (usage.sign, 'S'),
        (usage.certify, 'C'),
        (usage.encrypt, 'E'),
        (usage.authenticate, 'A'),
    ] {
        if set {
            letters.push(letter);
        }
    }
    if caps.disabled {
        letters.push('D');
    }
    letters
}

fn validity_name(validity: Validity) -> &'static str {
    match validity {
        Validity::Unknown => "unknown",
        Validity::Invalid => "invalid",
        Validity::Disabled => "disabled",
        Validity::Revoked => "revoked",
        Validity::Expired => "expired",
        Validity::Never => "never",
        Validity::Marginal => "marginal",
        Validity::Full => "full",
        Validity::Ultimate => "ultimate",
    }
}
