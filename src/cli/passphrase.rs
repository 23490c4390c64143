//! Passphrases for CLI operations
//!
//! `GPGMUX_PASSPHRASE` wins when set; otherwise the user is prompted on the
//! terminal, once per request gpg makes.

use gpgmux_gpg::{PassphraseProvider, PassphraseRequest, SecretString};
use inquire::{Password, PasswordDisplayMode};
use secrecy::ExposeSecret;
use tracing::warn;

/// Environment variable holding a passphrase for non-interactive use
pub const PASSPHRASE_ENV: &str = "GPGMUX_PASSPHRASE";

pub struct CliPassphrase {
    preset: Option<SecretString>,
    confirm: bool,
}

impl CliPassphrase {
    pub fn from_env() -> Self {
        let preset = std::env::var(PASSPHRASE_ENV)
            .ok()
            .map(SecretString::from)
            .filter(|secret| !secret.expose_secret().is_empty());
        Self {
            preset,
            confirm: false,
        }
    }

    /// Ask twice when prompting, for passphrases that are being chosen
    pub fn confirmed(mut self) -> Self {
        self.confirm = true;
        self
    }

    fn prompt(&self, request: &PassphraseRequest) -> Option<SecretString> {
        let message = format!("Passphrase for {request}:");
        let mut prompt =
            Password::new(&message).with_display_mode(PasswordDisplayMode::Hidden);
        if !self.confirm {
            prompt = prompt.without_confirmation();
        }

        match prompt.prompt() {
            Ok(secret) => Some(SecretString::from(secret)),
            Err(e) => {
                warn!(request = %request, error = %e, "passphrase prompt failed");
                None
            }
        }
    }
}

impl PassphraseProvider for CliPassphrase {
    fn provide(&self, request: &PassphraseRequest) -> Option<SecretString> {
        match &self.preset {
            Some(secret) => Some(SecretString::from(secret.expose_secret().to_owned())),
            None => self.prompt(request),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preset_answers_every_request() {
        let provider = CliPassphrase {
            preset: Some(SecretString::from("from-env")),
            confirm: false,
        };
        for request in [
            PassphraseRequest::Symmetric,
            PassphraseRequest::Key {
                sub_key_id: "89ABCDEF".into(),
            },
        ] {
            let secret = provider.provide(&request).unwrap();
            assert_eq!(secret.expose_secret(), "from-env");
        }
    }
}
