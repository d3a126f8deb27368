//! Per-connection session: banner, command replies and periodic pushes.
//!
//! One session owns one client stream for its whole life. A single task
//! drives it, so replies and pushes reach the socket in program order:
//!
//! ```text
//! Accepted -> BannerSent -> Running -> Closing -> Closed
//!                              ^  |
//!                              +--+  one step per push interval
//! ```
//!
//! Each step polls the stream once for a command (without waiting for
//! data), writes the next push line, then waits one interval.

use crate::clock::Clock;
use crate::command::{self, Outcome};
use crate::config::SessionSettings;
use crate::message;
use bytes::BytesMut;
use std::future::poll_fn;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::Poll;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Accepted,
    BannerSent,
    Running,
    Closing,
    Closed,
}

/// Result of a single non-blocking read attempt.
#[derive(Debug, PartialEq, Eq)]
pub enum ReadOutcome {
    /// This many bytes were placed at the front of the buffer.
    Data(usize),
    /// Nothing to read right now.
    WouldBlock,
    /// The peer closed its write side.
    Closed,
}

/// Why a session ended.
#[derive(Debug)]
pub enum Disconnect {
    /// The client sent `exit`.
    Exit,
    /// The peer went away (EOF, reset, broken pipe).
    PeerClosed,
    /// The server is shutting down.
    Shutdown,
    /// Any other I/O failure.
    Failed(io::Error),
}

impl Disconnect {
    /// True for every ending that is not a fault.
    pub fn is_normal(&self) -> bool {
        !matches!(self, Disconnect::Failed(_))
    }
}

impl From<io::Error> for Disconnect {
    fn from(e: io::Error) -> Self {
        if is_peer_gone(&e) {
            Disconnect::PeerClosed
        } else {
            Disconnect::Failed(e)
        }
    }
}

impl std::fmt::Display for Disconnect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Disconnect::Exit => write!(f, "client sent exit"),
            Disconnect::PeerClosed => write!(f, "peer closed the connection"),
            Disconnect::Shutdown => write!(f, "server shutting down"),
            Disconnect::Failed(e) => write!(f, "I/O failure: {}", e),
        }
    }
}

/// Error kinds that mean the other side is gone rather than a local fault.
fn is_peer_gone(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::UnexpectedEof
            | io::ErrorKind::WriteZero
    )
}

/// Poll the stream exactly once for readable data.
///
/// Returns `WouldBlock` instead of waiting when no bytes are buffered.
pub async fn try_read<S>(stream: &mut S, buf: &mut [u8]) -> io::Result<ReadOutcome>
where
    S: AsyncRead + Unpin,
{
    poll_fn(|cx| {
        let mut read_buf = ReadBuf::new(&mut *buf);
        match Pin::new(&mut *stream).poll_read(cx, &mut read_buf) {
            Poll::Pending => Poll::Ready(Ok(ReadOutcome::WouldBlock)),
            Poll::Ready(Ok(())) if read_buf.filled().is_empty() => {
                Poll::Ready(Ok(ReadOutcome::Closed))
            }
            Poll::Ready(Ok(())) => Poll::Ready(Ok(ReadOutcome::Data(read_buf.filled().len()))),
            Poll::Ready(Err(e)) if e.kind() == io::ErrorKind::WouldBlock => {
                Poll::Ready(Ok(ReadOutcome::WouldBlock))
            }
            Poll::Ready(Err(e)) => Poll::Ready(Err(e)),
        }
    })
    .await
}

/// One client connection.
pub struct Session<S> {
    stream: S,
    peer: SocketAddr,
    settings: SessionSettings,
    clock: Arc<dyn Clock>,
    read_buf: BytesMut,
    counter: u64,
    state: SessionState,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap a freshly accepted stream.
    pub fn new(
        stream: S,
        peer: SocketAddr,
        settings: SessionSettings,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let read_buf = BytesMut::zeroed(settings.read_buffer_size.max(1));
        Self {
            stream,
            peer,
            settings,
            clock,
            read_buf,
            counter: 0,
            state: SessionState::Accepted,
        }
    }

    /// Run the session to completion and close the stream.
    ///
    /// The stream is shut down exactly once, whichever way the session ends.
    pub async fn run(mut self, shutdown: CancellationToken) -> Disconnect {
        let reason = match self.serve(&shutdown).await {
            Ok(()) => Disconnect::Exit,
            Err(reason) => reason,
        };

        self.transition(SessionState::Closing);
        if let Err(e) = self.stream.shutdown().await {
            debug!(peer = %self.peer, error = %e, "Shutdown of client stream failed");
        }
        self.transition(SessionState::Closed);

        reason
    }

    /// Banner, then steps until `exit`, disconnect, error or shutdown.
    ///
    /// `Ok(())` means the client asked to leave.
    async fn serve(&mut self, shutdown: &CancellationToken) -> Result<(), Disconnect> {
        let banner = message::banner(&self.settings.title, self.clock.now());
        self.write(&banner).await?;
        self.transition(SessionState::BannerSent);

        self.transition(SessionState::Running);
        loop {
            if let Some(Outcome::Terminate(_)) = self.poll_command().await? {
                return Ok(());
            }

            self.push().await?;

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => return Err(Disconnect::Shutdown),
                _ = tokio::time::sleep(self.settings.interval) => {}
            }
        }
    }

    /// Take whatever the client sent since the last step and answer it.
    async fn poll_command(&mut self) -> Result<Option<Outcome>, Disconnect> {
        let n = match try_read(&mut self.stream, &mut self.read_buf).await? {
            ReadOutcome::WouldBlock => return Ok(None),
            ReadOutcome::Closed => return Err(Disconnect::PeerClosed),
            ReadOutcome::Data(n) => n,
        };

        let line = match std::str::from_utf8(&self.read_buf[..n]) {
            Ok(text) => text.trim(),
            Err(e) => {
                debug!(peer = %self.peer, error = %e, "Ignoring undecodable input");
                return Ok(None);
            }
        };
        if line.is_empty() {
            return Ok(None);
        }

        trace!(peer = %self.peer, command = line, "Processing command");
        let outcome = command::interpret(line, self.clock.as_ref());
        let reply = message::response(outcome.text());
        self.write(&reply).await?;
        Ok(Some(outcome))
    }

    /// Write the next status line.
    async fn push(&mut self) -> Result<(), Disconnect> {
        self.counter += 1;
        let line = message::push(self.clock.now(), self.counter, self.peer);
        self.write(&line).await?;
        trace!(peer = %self.peer, counter = self.counter, "Pushed status line");
        Ok(())
    }

    async fn write(&mut self, data: &[u8]) -> Result<(), Disconnect> {
        self.stream.write_all(data).await?;
        self.stream.flush().await?;
        Ok(())
    }

    fn transition(&mut self, next: SessionState) {
        trace!(peer = %self.peer, from = ?self.state, to = ?next, "Session state");
        self.state = next;
    }

    /// Number of push lines written so far.
    #[cfg(test)]
    pub fn counter(&self) -> u64 {
        self.counter
    }
}
