//! gpgmux GnuPG operations
//!
//! High-level calls on top of `gpgmux-core` sessions:
//! - [`Gpg`]: encrypt, decrypt, symmetric encryption, keyring listings, version
//! - [`keylist`]: `--with-colons` listing parser
//! - [`version`]: `--version` banner parser

#![forbid(unsafe_code)]

pub mod client;
pub mod keylist;
pub mod version;

pub use client::{encrypt_args, symmetric_args, EncryptOptions, Gpg};
pub use keylist::{
    parse_keylist, Capabilities, Key, KeyKind, Subkey, Usage, UserId, Validity,
};
pub use version::Version;

pub use gpgmux_core::{
    Error, ErrorKind, GpgConfig, PassphraseMap, PassphraseProvider, PassphraseRequest, Result,
    SecretString, StaticPassphrase,
};
