//! Passphrase requests and the providers that answer them

use std::collections::HashMap;
use std::fmt;

use secrecy::{ExposeSecret, SecretString};

/// A passphrase the child asked for on the status channel
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PassphraseRequest {
    /// Secret key passphrase; `sub_key_id` is the last 8 hex digits of the subkey
    Key {
        /// Short (8 character) subkey id
        sub_key_id: String,
    },
    /// Passphrase for symmetric encryption or decryption
    Symmetric,
}

impl fmt::Display for PassphraseRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key { sub_key_id } => write!(f, "key {sub_key_id}"),
            Self::Symmetric => write!(f, "symmetric encryption"),
        }
    }
}

/// Supplies secrets on demand while a session runs.
///
/// Called synchronously from the session loop, once per request, in the
/// order the child issues them.
///
/// Returning `None` aborts the session with
/// [`Error::NoPassphrase`](crate::Error::NoPassphrase). An empty secret is
/// treated exactly like `None`: there is currently no way to hand the child
/// an empty passphrase.
#[cfg_attr(test, mockall::automock)]
pub trait PassphraseProvider: Send + Sync {
    /// Return the secret for `request`, or `None` if there is none
    fn provide(&self, request: &PassphraseRequest) -> Option<SecretString>;
}

impl<F> PassphraseProvider for F
where
    F: Fn(&PassphraseRequest) -> Option<SecretString> + Send + Sync,
{
    fn provide(&self, request: &PassphraseRequest) -> Option<SecretString> {
        self(request)
    }
}

/// Answers every request with the same secret
pub struct StaticPassphrase(SecretString);

impl StaticPassphrase {
    /// Wrap a secret
    pub fn new(secret: impl Into<String>) -> Self {
        Self(SecretString::from(secret.into()))
    }
}

impl PassphraseProvider for StaticPassphrase {
    fn provide(&self, _request: &PassphraseRequest) -> Option<SecretString> {
        Some(SecretString::from(self.0.expose_secret().to_owned()))
    }
}

/// Secrets looked up by short subkey id, plus an optional symmetric secret
#[derive(Default)]
pub struct PassphraseMap {
    keys: HashMap<String, SecretString>,
    symmetric: Option<SecretString>,
}

impl PassphraseMap {
    /// Empty map; every request fails until entries are added
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the passphrase for a key. Only the last 8 characters of
    /// `key_id` are kept, matching what the status channel reports.
    pub fn with_key(mut self, key_id: &str, secret: impl Into<String>) -> Self {
        self.keys.insert(
            short_key_id(key_id).to_ascii_uppercase(),
            SecretString::from(secret.into()),
        );
        self
    }

    /// Register the symmetric passphrase
    pub fn with_symmetric(mut self, secret: impl Into<String>) -> Self {
        self.symmetric = Some(SecretString::from(secret.into()));
        self
    }
}

impl PassphraseProvider for PassphraseMap {
    fn provide(&self, request: &PassphraseRequest) -> Option<SecretString> {
        let secret = match request {
            PassphraseRequest::Key { sub_key_id } => {
                self.keys.get(&sub_key_id.to_ascii_uppercase())
            }
            PassphraseRequest::Symmetric => self.symmetric.as_ref(),
        }?;
        Some(SecretString::from(secret.expose_secret().to_owned()))
    }
}

/// Trailing 8 characters of a key id (the whole id if shorter)
pub fn short_key_id(key_id: &str) -> &str {
    key_id
        .char_indices()
        .rev()
        .nth(7)
        .map_or(key_id, |(start, _)| &key_id[start..])
}
