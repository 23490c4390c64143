//! Descriptor multiplexer
//!
//! Drives every pipe of one child process from a single task: the input
//! feed on stdin and the readers on stdout, stderr and the status channel.
//! Each turn of the loop waits, bounded by the session deadline, until any
//! registered pipe is ready, then hands exactly that pipe to its handler.
//! Because no pipe is ever waited on in isolation, a child that fills one
//! pipe while we are busy with another cannot deadlock the session.
//!
//! One wake dispatches one stream. Readiness on the other pipes is not
//! consumed by that wake: the next turn polls every registration again and
//! sees it, so several ready streams are served over consecutive turns
//! rather than lost.

use std::fmt;
use std::io;

use futures::future::select_all;
use tokio::net::unix::pipe;
use tracing::{debug, trace};

use crate::deadline::Deadline;
use crate::error::{Error, Result};

/// Bytes read (or offered for writing) per readiness event
pub const CHUNK_SIZE: usize = 8192;

/// Identity of a registered stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamId {
    /// Child standard input
    Stdin,
    /// Child standard output
    Stdout,
    /// Child standard error
    Stderr,
    /// gpg status channel
    Status,
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Stdin => "stdin",
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
            Self::Status => "status",
        };
        f.write_str(name)
    }
}

/// Result of one non-blocking read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// This many bytes were read
    Data(usize),
    /// Readiness was spurious, nothing to read yet
    WouldBlock,
    /// The writer closed its end
    Eof,
}

/// Consumer of the bytes arriving on one read stream
pub trait ChunkSink {
    /// Called with each chunk, in arrival order
    fn on_chunk(&mut self, chunk: &[u8]) -> Result<()>;

    /// Called once when the stream reaches end of file
    fn on_eof(&mut self) -> Result<()> {
        Ok(())
    }
}

impl ChunkSink for Vec<u8> {
    fn on_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        self.extend_from_slice(chunk);
        Ok(())
    }
}

impl<T: ChunkSink + ?Sized> ChunkSink for &mut T {
    fn on_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        (**self).on_chunk(chunk)
    }

    fn on_eof(&mut self) -> Result<()> {
        (**self).on_eof()
    }
}

enum Handler<'a> {
    Read {
        pipe: pipe::Receiver,
        sink: Box<dyn ChunkSink + Send + 'a>,
    },
    Write {
        pipe: pipe::Sender,
        input: &'a [u8],
        written: usize,
    },
}

impl Handler<'_> {
    fn waiter(&self) -> Waiter<'_> {
        match self {
            Self::Read { pipe, .. } => Waiter::Read(pipe),
            Self::Write { pipe, .. } => Waiter::Write(pipe),
        }
    }
}

/// Borrow of just the pipe, so pending waits never hold a handler
enum Waiter<'p> {
    Read(&'p pipe::Receiver),
    Write(&'p pipe::Sender),
}

impl Waiter<'_> {
    async fn ready(self) -> io::Result<()> {
        match self {
            Self::Read(pipe) => pipe.readable().await,
            Self::Write(pipe) => pipe.writable().await,
        }
    }
}

struct Registration<'a> {
    id: StreamId,
    handler: Handler<'a>,
}

/// What a handler wants after servicing a readiness event
enum Progress {
    Continue,
    Finished,
}

/// Readiness loop over a set of registered pipes
pub struct Multiplexer<'a> {
    registrations: Vec<Registration<'a>>,
    deadline: Deadline,
    buf: Vec<u8>,
    debug_io: bool,
}

impl<'a> Multiplexer<'a> {
    /// Empty multiplexer bound to `deadline`
    pub fn new(deadline: Deadline) -> Self {
        Self {
            registrations: Vec::new(),
            deadline,
            buf: vec![0; CHUNK_SIZE],
            debug_io: false,
        }
    }

    /// Log every chunk moved through the loop
    pub fn debug_io(mut self, enabled: bool) -> Self {
        self.debug_io = enabled;
        self
    }

    /// Register a read stream whose chunks go to `sink`
    pub fn register_reader(
        &mut self,
        id: StreamId,
        pipe: pipe::Receiver,
        sink: impl ChunkSink + Send + 'a,
    ) {
        self.registrations.push(Registration {
            id,
            handler: Handler::Read {
                pipe,
                sink: Box::new(sink),
            },
        });
    }

    /// Register a write stream that is fed `input` and then closed
    pub fn register_writer(&mut self, id: StreamId, pipe: pipe::Sender, input: &'a [u8]) {
        self.registrations.push(Registration {
            id,
            handler: Handler::Write {
                pipe,
                input,
                written: 0,
            },
        });
    }

    /// Streams still registered
    pub fn active(&self) -> Vec<StreamId> {
        self.registrations.iter().map(|r| r.id).collect()
    }

    /// Run until every stream is finished.
    ///
    /// Fails with [`Error::Timeout`] once the deadline passes, or with the
    /// first handler error. Remaining pipes are closed on every exit path.
    pub async fn run(mut self) -> Result<()> {
        while !self.registrations.is_empty() {
            if self.deadline.is_expired() {
                return Err(self.deadline.timeout_error());
            }

            let index = {
                let waits: Vec<_> = self
                    .registrations
                    .iter()
                    .map(|registration| Box::pin(registration.handler.waiter().ready()))
                    .collect();
                match tokio::time::timeout_at(self.deadline.instant(), select_all(waits)).await {
                    Ok((result, index, _pending)) => {
                        result?;
                        index
                    }
                    Err(_) => return Err(self.deadline.timeout_error()),
                }
            };

            if let Progress::Finished = self.dispatch(index)? {
                let finished = self.registrations.remove(index);
                debug!(stream = %finished.id, "stream closed");
            }
        }
        Ok(())
    }

    fn dispatch(&mut self, index: usize) -> Result<Progress> {
        let debug_io = self.debug_io;
        let buf = &mut self.buf;
        let registration = &mut self.registrations[index];
        let id = registration.id;

        match &mut registration.handler {
            Handler::Read { pipe, sink } => match read_chunk(pipe, buf)? {
                ReadOutcome::Data(n) => {
                    if debug_io {
                        debug!(stream = %id, bytes = n, "read chunk");
                    }
                    sink.on_chunk(&buf[..n])?;
                    Ok(Progress::Continue)
                }
                ReadOutcome::WouldBlock => {
                    trace!(stream = %id, "spurious wakeup");
                    Ok(Progress::Continue)
                }
                ReadOutcome::Eof => {
                    sink.on_eof()?;
                    Ok(Progress::Finished)
                }
            },
            Handler::Write {
                pipe,
                input,
                written,
            } => {
                if *written >= input.len() {
                    return Ok(Progress::Finished);
                }
                let end = (*written + CHUNK_SIZE).min(input.len());
                match pipe.try_write(&input[*written..end]) {
                    Ok(n) => {
                        *written += n;
                        if debug_io {
                            debug!(stream = %id, bytes = n, total = *written, "wrote chunk");
                        }
                        if *written >= input.len() {
                            Ok(Progress::Finished)
                        } else {
                            Ok(Progress::Continue)
                        }
                    }
                    Err(e) if is_retryable(&e) => Ok(Progress::Continue),
                    Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                        debug!(
                            stream = %id,
                            unwritten = input.len() - *written,
                            "child closed its input early"
                        );
                        Ok(Progress::Finished)
                    }
                    Err(e) => Err(Error::Io(e)),
                }
            }
        }
    }
}

/// Non-blocking read of at most one chunk
pub fn read_chunk(pipe: &pipe::Receiver, buf: &mut [u8]) -> io::Result<ReadOutcome> {
    match pipe.try_read(buf) {
        Ok(0) => Ok(ReadOutcome::Eof),
        Ok(n) => Ok(ReadOutcome::Data(n)),
        Err(e) if is_retryable(&e) => Ok(ReadOutcome::WouldBlock),
        Err(e) => Err(e),
    }
}

fn is_retryable(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::os::fd::OwnedFd;
    use std::thread;
    use std::time::{Duration, Instant};

    use super::*;

    fn receiver(reader: std::io::PipeReader) -> pipe::Receiver {
        pipe::Receiver::from_owned_fd(OwnedFd::from(reader)).unwrap()
    }

    fn sender(writer: std::io::PipeWriter) -> pipe::Sender {
        pipe::Sender::from_owned_fd(OwnedFd::from(writer)).unwrap()
    }

    fn pattern(seed: u8, len: usize) -> Vec<u8> {
        (0..len)
            .map(|i| seed.wrapping_add((i % 251) as u8))
            .collect()
    }

    struct Failing;

    impl ChunkSink for Failing {
        fn on_chunk(&mut self, _chunk: &[u8]) -> Result<()> {
            Err(Error::InvalidInput("rejected".to_string()))
        }
    }

    #[tokio::test]
    async fn test_drains_three_large_streams() {
        let sizes = [70_000usize, 150_000, 96_001];
        let mut sinks: Vec<Vec<u8>> = vec![Vec::new(); 3];
        let mut expected = Vec::new();
        let mut receivers = Vec::new();
        let mut writers = Vec::new();

        for (i, size) in sizes.iter().enumerate() {
            let (reader, mut writer) = std::io::pipe().unwrap();
            let data = pattern(i as u8 * 40, *size);
            expected.push(data.clone());
            receivers.push(receiver(reader));
            let delay = Duration::from_millis(30 * (sizes.len() - i) as u64);
            writers.push(thread::spawn(move || {
                thread::sleep(delay);
                for piece in data.chunks(10_000) {
                    writer.write_all(piece).unwrap();
                    thread::sleep(Duration::from_millis(2));
                }
            }));
        }

        {
            let mut mux = Multiplexer::new(Deadline::after(Duration::from_secs(10)));
            let ids = [StreamId::Stdout, StreamId::Stderr, StreamId::Status];
            for ((id, pipe), sink) in ids.into_iter().zip(receivers).zip(sinks.iter_mut()) {
                mux.register_reader(id, pipe, sink);
            }
            mux.run().await.unwrap();
        }

        for writer in writers {
            writer.join().unwrap();
        }
        for (sink, expected) in sinks.iter().zip(&expected) {
            assert_eq!(sink.len(), expected.len());
            assert_eq!(sink, expected);
        }
    }

    #[tokio::test]
    async fn test_streams_ready_together_are_all_served() {
        let mut sinks: Vec<Vec<u8>> = vec![Vec::new(); 3];
        let mut expected = Vec::new();
        let mut receivers = Vec::new();

        // Everything is written and closed before the loop starts
        for i in 0..3u8 {
            let (reader, mut writer) = std::io::pipe().unwrap();
            let data = pattern(i * 60, 4000 + i as usize * 1000);
            writer.write_all(&data).unwrap();
            drop(writer);
            expected.push(data);
            receivers.push(receiver(reader));
        }

        {
            let mut mux = Multiplexer::new(Deadline::after(Duration::from_secs(5)));
            let ids = [StreamId::Stdout, StreamId::Stderr, StreamId::Status];
            for ((id, pipe), sink) in ids.into_iter().zip(receivers).zip(sinks.iter_mut()) {
                mux.register_reader(id, pipe, sink);
            }
            mux.run().await.unwrap();
        }

        assert_eq!(sinks, expected);
    }

    #[tokio::test]
    async fn test_feeds_input_while_draining_output() {
        // Echo thread: everything written to `to_child` comes back on `from_child`.
        let (mut child_in, to_child) = std::io::pipe().unwrap();
        let (from_child, mut child_out) = std::io::pipe().unwrap();
        let echo = thread::spawn(move || {
            let mut buf = [0u8; 4096];
            loop {
                let n = child_in.read(&mut buf).unwrap();
                if n == 0 {
                    break;
                }
                child_out.write_all(&buf[..n]).unwrap();
            }
        });

        let input = pattern(7, 300_000);
        let mut output = Vec::<u8>::new();
        {
            let mut mux = Multiplexer::new(Deadline::after(Duration::from_secs(10)));
            mux.register_writer(StreamId::Stdin, sender(to_child), &input);
            mux.register_reader(StreamId::Stdout, receiver(from_child), &mut output);
            mux.run().await.unwrap();
        }

        echo.join().unwrap();
        assert_eq!(output, input);
    }

    #[tokio::test]
    async fn test_empty_input_closes_immediately() {
        let (mut child_in, to_child) = std::io::pipe().unwrap();
        let mut mux = Multiplexer::new(Deadline::after(Duration::from_secs(5)));
        mux.register_writer(StreamId::Stdin, sender(to_child), b"");
        mux.run().await.unwrap();

        let mut rest = Vec::new();
        child_in.read_to_end(&mut rest).unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn test_times_out_when_stream_stays_open() {
        let (reader, _writer_kept_open) = std::io::pipe().unwrap();
        let mut sink = Vec::<u8>::new();
        let mut mux = Multiplexer::new(Deadline::after(Duration::from_millis(300)));
        mux.register_reader(StreamId::Stdout, receiver(reader), &mut sink);

        let started = Instant::now();
        let err = mux.run().await.unwrap_err();
        let elapsed = started.elapsed();

        assert!(matches!(err, Error::Timeout(_)));
        assert!(elapsed >= Duration::from_millis(290), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(800), "{elapsed:?}");
    }

    #[tokio::test]
    async fn test_expired_deadline_fails_without_io() {
        let (reader, mut writer) = std::io::pipe().unwrap();
        writer.write_all(b"ready data").unwrap();
        let mut sink = Vec::<u8>::new();
        {
            let mut mux = Multiplexer::new(Deadline::after(Duration::ZERO));
            mux.register_reader(StreamId::Stdout, receiver(reader), &mut sink);
            assert!(matches!(mux.run().await, Err(Error::Timeout(_))));
        }
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_handler_error_propagates() {
        let (reader, mut writer) = std::io::pipe().unwrap();
        writer.write_all(b"boom").unwrap();
        let mut mux = Multiplexer::new(Deadline::after(Duration::from_secs(5)));
        mux.register_reader(StreamId::Status, receiver(reader), Failing);

        let err = mux.run().await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_broken_stdin_is_not_fatal() {
        let (child_in, to_child) = std::io::pipe().unwrap();
        drop(child_in);
        let input = pattern(1, 50_000);
        let mut mux = Multiplexer::new(Deadline::after(Duration::from_secs(5)));
        mux.register_writer(StreamId::Stdin, sender(to_child), &input);
        assert_eq!(mux.active(), vec![StreamId::Stdin]);
        mux.run().await.unwrap();
    }

    #[tokio::test]
    async fn test_no_registrations_completes() {
        let mux = Multiplexer::new(Deadline::after(Duration::from_secs(1)));
        assert!(mux.active().is_empty());
        mux.run().await.unwrap();
    }
}
