//! GnuPG operations
//!
//! [`Gpg`] turns each operation into exactly one
//! [`Session`](gpgmux_core::Session). The configuration is an immutable
//! snapshot shared by every call; per-call overrides produce a new client.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use gpgmux_core::{Error, GpgConfig, PassphraseProvider, Result, Session};
use tracing::{debug, info};

use crate::keylist::{parse_keylist, Key};
use crate::version::Version;

/// Output and trust options for encryption
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EncryptOptions {
    /// Pass `--trust-model always`, for keyrings without ownertrust
    pub always_trust: bool,
    /// ASCII-armored output
    pub armor: bool,
}

/// Client for the external `gpg` binary
#[derive(Debug, Clone)]
pub struct Gpg {
    config: Arc<GpgConfig>,
}

impl Default for Gpg {
    fn default() -> Self {
        Self::new(GpgConfig::default())
    }
}

impl Gpg {
    pub fn new(config: GpgConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &GpgConfig {
        &self.config
    }

    /// Same client with a different session deadline
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self::new(self.config.as_ref().clone().with_timeout(timeout))
    }

    /// Same client against another keyring directory
    pub fn with_homedir(&self, homedir: impl Into<PathBuf>) -> Self {
        Self::new(self.config.as_ref().clone().with_homedir(homedir))
    }

    /// Encrypt `data` to `recipients`. Signing happens when `sign` carries
    /// the provider for the signing key's passphrase.
    pub async fn encrypt(
        &self,
        data: &[u8],
        recipients: &[&str],
        sign: Option<&dyn PassphraseProvider>,
    ) -> Result<Vec<u8>> {
        self.encrypt_with(data, recipients, sign, EncryptOptions::default())
            .await
    }

    /// [`encrypt`](Self::encrypt) with explicit options
    pub async fn encrypt_with(
        &self,
        data: &[u8],
        recipients: &[&str],
        sign: Option<&dyn PassphraseProvider>,
        options: EncryptOptions,
    ) -> Result<Vec<u8>> {
        let args = encrypt_args(recipients, sign.is_some(), options)?;
        info!(
            recipients = recipients.len(),
            sign = sign.is_some(),
            bytes = data.len(),
            "encrypting"
        );

        let mut session = Session::new(&self.config, args).input(data);
        if let Some(provider) = sign {
            session = session.passphrase_provider(provider);
        }
        session.run().await
    }

    /// Decrypt `data`, asking `provider` for any passphrase gpg needs
    pub async fn decrypt(&self, data: &[u8], provider: &dyn PassphraseProvider) -> Result<Vec<u8>> {
        info!(bytes = data.len(), "decrypting");
        Session::new(&self.config, ["--decrypt"])
            .input(data)
            .passphrase_provider(provider)
            .run()
            .await
    }

    /// Passphrase-only encryption, optionally signed
    pub async fn encrypt_symmetric(
        &self,
        data: &[u8],
        sign: bool,
        provider: &dyn PassphraseProvider,
    ) -> Result<Vec<u8>> {
        self.encrypt_symmetric_with(data, sign, provider, EncryptOptions::default())
            .await
    }

    /// [`encrypt_symmetric`](Self::encrypt_symmetric) with explicit options;
    /// `always_trust` only matters when signing
    pub async fn encrypt_symmetric_with(
        &self,
        data: &[u8],
        sign: bool,
        provider: &dyn PassphraseProvider,
        options: EncryptOptions,
    ) -> Result<Vec<u8>> {
        info!(sign, bytes = data.len(), "encrypting symmetrically");
        Session::new(&self.config, symmetric_args(sign, options))
            .input(data)
            .passphrase_provider(provider)
            .run()
            .await
    }

    pub async fn list_public_keys(&self) -> Result<Vec<Key>> {
        self.list_keys("--list-public-keys").await
    }

    pub async fn list_secret_keys(&self) -> Result<Vec<Key>> {
        self.list_keys("--list-secret-keys").await
    }

    async fn list_keys(&self, which: &str) -> Result<Vec<Key>> {
        let output = Session::new(&self.config, ["--with-colons", which])
            .run()
            .await?;
        let keys = parse_keylist(&String::from_utf8_lossy(&output))?;
        debug!(listing = which, keys = keys.len(), "keyring listed");
        Ok(keys)
    }

    /// First public key whose id, fingerprint, or user id matches `query`
    pub async fn find_key(&self, query: &str) -> Result<Option<Key>> {
        let keys = self.list_public_keys().await?;
        Ok(keys.into_iter().find(|key| key.matches(query)))
    }

    pub async fn version(&self) -> Result<Version> {
        let output = Session::new(&self.config, ["--version"]).run().await?;
        Version::parse(&String::from_utf8_lossy(&output))
    }
}

/// Arguments for public-key encryption. Fails before anything is spawned
/// when there is no usable recipient.
pub fn encrypt_args(recipients: &[&str], sign: bool, options: EncryptOptions) -> Result<Vec<String>> {
    if recipients.is_empty() {
        return Err(Error::InvalidInput("at least one recipient is required".into()));
    }
    if let Some(blank) = recipients.iter().position(|r| r.trim().is_empty()) {
        return Err(Error::InvalidInput(format!("recipient #{} is empty", blank + 1)));
    }

    let mut args = vec!["--encrypt".to_string()];
    for recipient in recipients {
        args.push("--recipient".into());
        args.push(recipient.trim().to_string());
    }
    if sign {
        args.push("--sign".into());
    }
    push_options(&mut args, options);
    Ok(args)
}

/// Arguments for symmetric encryption
pub fn symmetric_args(sign: bool, options: EncryptOptions) -> Vec<String> {
    let mut args = vec!["--symmetric".to_string()];
    if sign {
        args.push("--sign".into());
    }
    push_options(&mut args, options);
    args
}

fn push_options(args: &mut Vec<String>, options: EncryptOptions) {
    if options.armor {
        args.push("--armor".into());
    }
    if options.always_trust {
        args.extend(["--trust-model".to_string(), "always".to_string()]);
    }
}
