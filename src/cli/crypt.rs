//! encrypt / decrypt / symmetric subcommands

use anyhow::{Context, Result};
use clap::Args;
use gpgmux_gpg::{EncryptOptions, Gpg, PassphraseProvider};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use super::passphrase::CliPassphrase;

#[derive(Args, Debug)]
pub struct EncryptArgs {
    /// Recipient key id, fingerprint or email (repeatable)
    #[arg(short = 'r', long = "recipient", required = true)]
    pub recipients: Vec<String>,

    /// Also sign with the default key
    #[arg(long)]
    pub sign: bool,

    /// ASCII-armored output
    #[arg(short = 'a', long)]
    pub armor: bool,

    /// Trust recipient keys without ownertrust
    #[arg(long)]
    pub always_trust: bool,
}

#[derive(Args, Debug)]
pub struct SymmetricArgs {
    /// Also sign with the default key
    #[arg(long)]
    pub sign: bool,

    /// ASCII-armored output
    #[arg(short = 'a', long)]
    pub armor: bool,
}

pub async fn encrypt(gpg: &Gpg, args: EncryptArgs) -> Result<()> {
    let input = read_stdin().await?;
    let recipients: Vec<&str> = args.recipients.iter().map(String::as_str).collect();
    let options = EncryptOptions {
        always_trust: args.always_trust,
        armor: args.armor,
    };
    let provider = CliPassphrase::from_env();
    let signer = args.sign.then_some(&provider as &dyn PassphraseProvider);

    let output = gpg
        .encrypt_with(&input, &recipients, signer, options)
        .await
        .context("Encryption failed")?;
    write_stdout(&output).await
}

pub async fn decrypt(gpg: &Gpg) -> Result<()> {
    let input = read_stdin().await?;
    let provider = CliPassphrase::from_env();

    let output = gpg
        .decrypt(&input, &provider)
        .await
        .context("Decryption failed")?;
    write_stdout(&output).await
}

pub async fn symmetric(gpg: &Gpg, args: SymmetricArgs) -> Result<()> {
    let input = read_stdin().await?;
    let provider = CliPassphrase::from_env().confirmed();
    let options = EncryptOptions {
        armor: args.armor,
        ..Default::default()
    };

    let output = gpg
        .encrypt_symmetric_with(&input, args.sign, &provider, options)
        .await
        .context("Symmetric encryption failed")?;
    write_stdout(&output).await
}

async fn read_stdin() -> Result<Vec<u8>> {
    let mut input = Vec::new();
    tokio::io::stdin()
        .read_to_end(&mut input)
        .await
        .context("Failed to read stdin")?;
    Ok(input)
}

async fn write_stdout(data: &[u8]) -> Result<()> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(data).await.context("Failed to write stdout")?;
    stdout.flush().await?;
    Ok(())
}
