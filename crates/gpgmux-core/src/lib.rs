//! gpgmux Core - gpg subprocess engine
//!
//! This crate runs the external `gpg` binary as a library call:
//! - Session: spawns one child, wires its descriptors, guarantees cleanup
//! - Mux: single-task readiness loop over stdin/stdout/stderr/status pipes
//! - Status: `--status-fd` parser that answers passphrase requests on `--command-fd`
//! - Config: immutable per-session configuration snapshot
//!
//! Every blocking step of a session shares one deadline. A session that
//! fails for any reason interrupts its child before the error is returned.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod deadline;
pub mod error;
pub mod mux;
pub mod passphrase;
pub mod session;
pub mod status;

pub use config::GpgConfig;
pub use deadline::Deadline;
pub use error::{Error, ErrorKind, Result};
pub use mux::{ChunkSink, Multiplexer, ReadOutcome, StreamId};
pub use passphrase::{PassphraseMap, PassphraseProvider, PassphraseRequest, StaticPassphrase};
pub use session::Session;
pub use status::{parse_status_line, StatusParser};

pub use secrecy::SecretString;
