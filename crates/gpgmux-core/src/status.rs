//! Status channel protocol
//!
//! gpg reports progress on `--status-fd` as newline-terminated records and
//! reads answers from `--command-fd`. Only passphrase requests need an
//! answer here:
//!
//! ```text
//! [GNUPG:] NEED_PASSPHRASE <sub_key_id> <key_id> <algo> <length>
//! [GNUPG:] NEED_PASSPHRASE_SYM <cipher> <s2k_mode> <s2k_hash>
//! ```
//!
//! Every other record is ignored.

use std::io::Write;

use secrecy::ExposeSecret;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::mux::ChunkSink;
use crate::passphrase::{short_key_id, PassphraseProvider, PassphraseRequest};

/// Prefix gpg puts in front of every status record
pub const STATUS_PREFIX: &str = "[GNUPG:] ";

/// Keyring passphrase request keyword
pub const NEED_PASSPHRASE: &str = "NEED_PASSPHRASE";

/// Symmetric passphrase request keyword
pub const NEED_PASSPHRASE_SYM: &str = "NEED_PASSPHRASE_SYM";

/// Recognize a passphrase request in one complete status line
pub fn parse_status_line(line: &str) -> Option<PassphraseRequest> {
    let record = line.strip_prefix(STATUS_PREFIX).unwrap_or(line);
    let mut tokens = record.split_whitespace();
    match tokens.next()? {
        NEED_PASSPHRASE_SYM => Some(PassphraseRequest::Symmetric),
        NEED_PASSPHRASE => tokens.next().map(|sub_key_id| PassphraseRequest::Key {
            sub_key_id: short_key_id(sub_key_id).to_string(),
        }),
        _ => None,
    }
}

/// Status channel reader that answers passphrase requests on the command
/// channel.
///
/// Chunks may split records anywhere; incomplete trailing bytes are kept
/// until the next chunk. Requests are answered one at a time, in order,
/// before any later bytes are looked at.
pub struct StatusParser<'a> {
    provider: &'a dyn PassphraseProvider,
    command: Box<dyn Write + Send + 'a>,
    pending: Vec<u8>,
    debug_io: bool,
    answered: usize,
}

impl<'a> StatusParser<'a> {
    /// Parser answering through `command` with secrets from `provider`
    pub fn new(provider: &'a dyn PassphraseProvider, command: Box<dyn Write + Send + 'a>) -> Self {
        Self {
            provider,
            command,
            pending: Vec::new(),
            debug_io: false,
            answered: 0,
        }
    }

    /// Log every status record at debug level
    pub fn debug_io(mut self, enabled: bool) -> Self {
        self.debug_io = enabled;
        self
    }

    /// Number of passphrase requests answered so far
    pub fn answered(&self) -> usize {
        self.answered
    }

    fn handle_line(&mut self, raw: &[u8]) -> Result<()> {
        let line = String::from_utf8_lossy(raw);
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            return Ok(());
        }
        if self.debug_io {
            debug!(record = %line, "status record");
        }
        match parse_status_line(line) {
            Some(request) => self.answer(request),
            None => {
                trace!(record = %line, "ignoring status record");
                Ok(())
            }
        }
    }

    fn answer(&mut self, request: PassphraseRequest) -> Result<()> {
        debug!(request = %request, "passphrase requested");
        let secret = self
            .provider
            .provide(&request)
            .filter(|secret| !secret.expose_secret().is_empty())
            .ok_or_else(|| Error::NoPassphrase(request.clone()))?;

        self.command.write_all(secret.expose_secret().as_bytes())?;
        self.command.write_all(b"\n")?;
        self.command.flush()?;
        self.answered += 1;
        debug!(request = %request, "passphrase sent");
        Ok(())
    }
}

impl ChunkSink for StatusParser<'_> {
    fn on_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        self.pending.extend_from_slice(chunk);
        let Some(last_newline) = self.pending.iter().rposition(|&b| b == b'\n') else {
            return Ok(());
        };
        let remainder = self.pending.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.pending, remainder);
        for line in complete.split(|&b| b == b'\n') {
            self.handle_line(line)?;
        }
        Ok(())
    }

    fn on_eof(&mut self) -> Result<()> {
        if !self.pending.is_empty() {
            debug!(
                bytes = self.pending.len(),
                "status channel closed inside a record, discarding"
            );
            self.pending.clear();
        }
        Ok(())
    }
}
