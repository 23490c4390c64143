//! Error types for gpgmux-core

use std::time::Duration;

use thiserror::Error;

use crate::passphrase::PassphraseRequest;

/// Error type shared by every gpgmux operation
#[derive(Debug, Error)]
pub enum Error {
    /// The session deadline passed while waiting for I/O or for the child to exit
    #[error("timeout after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// The passphrase provider had no usable secret for a request
    #[error("no passphrase available for {0}")]
    NoPassphrase(PassphraseRequest),

    /// A keyring listing record could not be parsed
    #[error("parse error on line {line}: {reason}")]
    Parse {
        /// 1-based line number in the listing
        line: usize,
        /// What was wrong with the record
        reason: String,
    },

    /// The child exited unsuccessfully
    #[error("gpg exited with {}: {}", describe_code(.code), .stderr.trim())]
    ExitStatus {
        /// Exit code, `None` when the child was killed by a signal
        code: Option<i32>,
        /// Everything the child wrote to stderr
        stderr: String,
    },

    /// The child could not be started
    #[error("failed to spawn {command}: {source}")]
    Spawn {
        /// Program that was being launched
        command: String,
        /// Underlying OS error
        #[source]
        source: std::io::Error,
    },

    /// Caller supplied arguments that cannot produce a valid invocation
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// IO error on one of the session descriptors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

fn describe_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "a signal".to_string(),
    }
}

/// Coarse classification of [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Deadline exceeded
    Timeout,
    /// Passphrase provider had nothing to offer
    NoPassphrase,
    /// Malformed keyring listing
    Parse,
    /// Non-zero exit, spawn or descriptor failure, bad input
    Other,
}

impl Error {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::NoPassphrase(_) => ErrorKind::NoPassphrase,
            Self::Parse { .. } => ErrorKind::Parse,
            Self::ExitStatus { .. } | Self::Spawn { .. } | Self::InvalidInput(_) | Self::Io(_) => {
                ErrorKind::Other
            }
        }
    }

    /// Shorthand for building a [`Error::Parse`]
    pub fn parse(line: usize, reason: impl Into<String>) -> Self {
        Self::Parse {
            line,
            reason: reason.into(),
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
