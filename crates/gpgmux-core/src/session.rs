//! Subprocess session
//!
//! One [`Session`] is one gpg invocation, start to finish:
//!
//! 1. wire stdin/stdout/stderr, plus the status channel (child fd 3) and
//!    command channel (child fd 4) when a passphrase provider is given
//! 2. spawn, then close the parent's copies of the child-side pipe ends
//! 3. run the [`Multiplexer`] until every stream is done
//! 4. wait for exit within the same deadline
//!
//! Any failure after spawn interrupts the child before the error is
//! returned. Sessions are single-shot: `run` consumes them.

use std::io;
use std::os::fd::{OwnedFd, RawFd};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use command_fds::{CommandFdExt, FdMapping};
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::net::unix::pipe;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::config::GpgConfig;
use crate::deadline::Deadline;
use crate::error::{Error, Result};
use crate::mux::{Multiplexer, StreamId};
use crate::passphrase::PassphraseProvider;
use crate::status::StatusParser;

/// Descriptor number of the status channel inside the child
pub const STATUS_FD: RawFd = 3;

/// Descriptor number of the command channel inside the child
pub const COMMAND_FD: RawFd = 4;

/// How long an interrupted child gets before it is killed outright
pub const INTERRUPT_GRACE: Duration = Duration::from_millis(250);

/// One gpg invocation
pub struct Session<'a> {
    config: GpgConfig,
    args: Vec<String>,
    input: Option<&'a [u8]>,
    provider: Option<&'a dyn PassphraseProvider>,
}

/// Parent ends of the session pipes, before they join the event loop
struct ParentPipes {
    stdin: Option<io::PipeWriter>,
    stdout: io::PipeReader,
    stderr: io::PipeReader,
    status: Option<(io::PipeReader, io::PipeWriter)>,
}

impl<'a> Session<'a> {
    /// Session running `config.command` with the operation arguments `args`
    pub fn new<I, S>(config: &GpgConfig, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            config: config.clone(),
            args: args.into_iter().map(Into::into).collect(),
            input: None,
            provider: None,
        }
    }

    /// Bytes to feed on the child's stdin; without this stdin is `/dev/null`
    pub fn input(mut self, data: &'a [u8]) -> Self {
        self.input = Some(data);
        self
    }

    /// Answer passphrase requests from `provider`; enables the status and
    /// command channels
    pub fn passphrase_provider(mut self, provider: &'a dyn PassphraseProvider) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Full argument vector passed to the program
    pub fn command_line(&self) -> Vec<String> {
        let mut argv = self.config.base_args();
        if self.provider.is_some() {
            argv.extend([
                "--status-fd".to_string(),
                STATUS_FD.to_string(),
                "--command-fd".to_string(),
                COMMAND_FD.to_string(),
            ]);
        }
        argv.extend(self.args.iter().cloned());
        argv
    }

    /// Run the child to completion and return everything it wrote to stdout
    pub async fn run(self) -> Result<Vec<u8>> {
        let deadline = Deadline::after(self.config.timeout());
        let (mut child, pipes) = self.spawn()?;

        match self.drive(&mut child, pipes, deadline).await {
            Ok(stdout) => Ok(stdout),
            Err(err) => {
                warn!(command = %self.config.command, error = %err, "gpg session failed");
                terminate(&mut child).await;
                Err(err)
            }
        }
    }

    fn spawn(&self) -> Result<(Child, ParentPipes)> {
        let argv = self.command_line();
        debug!(command = %self.config.command, args = ?argv, "spawning gpg");

        // The command owns the child-side ends; it is dropped before this
        // returns so our copies are closed and EOF can propagate.
        let mut cmd = Command::new(&self.config.command);
        cmd.args(&argv).kill_on_drop(true);

        let (stdout, child_stdout) = io::pipe()?;
        let (stderr, child_stderr) = io::pipe()?;
        cmd.stdout(Stdio::from(child_stdout))
            .stderr(Stdio::from(child_stderr));

        let stdin = match self.input {
            Some(_) => {
                let (child_stdin, stdin) = io::pipe()?;
                cmd.stdin(Stdio::from(child_stdin));
                Some(stdin)
            }
            None => {
                cmd.stdin(Stdio::null());
                None
            }
        };

        let status = match self.provider {
            Some(_) => {
                let (status_reader, child_status) = io::pipe()?;
                let (child_command, command_writer) = io::pipe()?;
                cmd.fd_mappings(vec![
                    FdMapping {
                        parent_fd: OwnedFd::from(child_status),
                        child_fd: STATUS_FD,
                    },
                    FdMapping {
                        parent_fd: OwnedFd::from(child_command),
                        child_fd: COMMAND_FD,
                    },
                ])
                .map_err(|e| Error::Io(io::Error::other(e.to_string())))?;
                Some((status_reader, command_writer))
            }
            None => None,
        };

        let child = cmd.spawn().map_err(|source| Error::Spawn {
            command: self.config.command.clone(),
            source,
        })?;
        debug!(pid = ?child.id(), "gpg started");

        Ok((
            child,
            ParentPipes {
                stdin,
                stdout,
                stderr,
                status,
            },
        ))
    }

    async fn drive(
        &self,
        child: &mut Child,
        pipes: ParentPipes,
        deadline: Deadline,
    ) -> Result<Vec<u8>> {
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();

        {
            let mut mux = Multiplexer::new(deadline).debug_io(self.config.debug_io);
            if let (Some(writer), Some(input)) = (pipes.stdin, self.input) {
                mux.register_writer(
                    StreamId::Stdin,
                    pipe::Sender::from_owned_fd(OwnedFd::from(writer))?,
                    input,
                );
            }
            mux.register_reader(
                StreamId::Stdout,
                pipe::Receiver::from_owned_fd(OwnedFd::from(pipes.stdout))?,
                &mut stdout,
            );
            mux.register_reader(
                StreamId::Stderr,
                pipe::Receiver::from_owned_fd(OwnedFd::from(pipes.stderr))?,
                &mut stderr,
            );
            if let (Some((status, command)), Some(provider)) = (pipes.status, self.provider) {
                let parser = StatusParser::new(provider, Box::new(command))
                    .debug_io(self.config.debug_io);
                mux.register_reader(
                    StreamId::Status,
                    pipe::Receiver::from_owned_fd(OwnedFd::from(status))?,
                    parser,
                );
            }
            mux.run().await?;
        }

        let stderr = String::from_utf8_lossy(&stderr).into_owned();
        if !stderr.trim().is_empty() {
            warn!(stderr = %stderr.trim_end(), "gpg wrote to stderr");
        }

        let status = wait_for_exit(child, deadline).await?;
        if !status.success() {
            return Err(Error::ExitStatus {
                code: status.code(),
                stderr,
            });
        }

        debug!(bytes = stdout.len(), "gpg finished");
        Ok(stdout)
    }
}

async fn wait_for_exit(child: &mut Child, deadline: Deadline) -> Result<ExitStatus> {
    match tokio::time::timeout_at(deadline.instant(), child.wait()).await {
        Ok(status) => Ok(status?),
        Err(_) => Err(deadline.timeout_error()),
    }
}

/// Interrupt the child, then kill it if it has not exited after
/// [`INTERRUPT_GRACE`]. A child that already exited is left alone.
async fn terminate(child: &mut Child) {
    let Some(pid) = child.id() else {
        return;
    };

    match i32::try_from(pid) {
        Ok(raw) => match kill(Pid::from_raw(raw), Signal::SIGINT) {
            Ok(()) => debug!(pid, "sent SIGINT to gpg"),
            Err(Errno::ESRCH) => return,
            Err(e) => warn!(pid, error = %e, "failed to interrupt gpg"),
        },
        Err(_) => warn!(pid, "pid out of range, skipping SIGINT"),
    }

    if tokio::time::timeout(INTERRUPT_GRACE, child.wait())
        .await
        .is_ok()
    {
        return;
    }

    warn!(pid, "gpg ignored SIGINT, killing");
    if let Err(e) = child.kill().await {
        warn!(pid, error = %e, "failed to kill gpg");
    }
}
