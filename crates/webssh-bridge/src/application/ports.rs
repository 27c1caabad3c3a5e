//! Capabilities the bridge consumes.
//!
//! The bridge never touches a socket or an SSH library directly.  It works
//! against these traits; the infrastructure layer implements them with
//! tokio-tungstenite and russh, and the tests implement them with recording
//! doubles.
//!
//! Both external resources are split into halves so that each pump direction
//! owns exactly one side:
//!
//! ```text
//!                 outbound pump                     inbound pump
//! ShellOutput ──────────────────► FrameSink   FrameSource ──────────────► ShellInput
//! (remote stdout)                 (text frames)  (text + control frames)  (stdin + resize)
//! ```
//!
//! No locks are needed: a read side and a write side are never shared
//! between directions.

use async_trait::async_trait;
use webssh_core::{Frame, TerminalSize};

use crate::application::error::{SessionError, TransportError};
use crate::domain::target::RemoteTarget;

// ── Duplex channel ────────────────────────────────────────────────────────────

/// Write half of the browser channel.
#[async_trait]
pub trait FrameSink: Send {
    /// Sends one frame.  Deadlines are applied by the caller.
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError>;

    /// Closes the channel.
    ///
    /// Calling `close` on an already closed sink is a no-op that returns
    /// `Ok(())`.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Read half of the browser channel.
#[async_trait]
pub trait FrameSource: Send {
    /// Waits for the next frame in arrival order.
    ///
    /// A clean closure by the peer is reported as [`TransportError::Closed`].
    async fn recv(&mut self) -> Result<Frame, TransportError>;
}

/// One upgraded browser connection, already split into its two halves.
pub struct ChannelHalves {
    pub sink: Box<dyn FrameSink>,
    pub source: Box<dyn FrameSource>,
}

impl ChannelHalves {
    pub fn new(sink: impl FrameSink + 'static, source: impl FrameSource + 'static) -> Self {
        Self {
            sink: Box::new(sink),
            source: Box::new(source),
        }
    }
}

impl std::fmt::Debug for ChannelHalves {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelHalves").finish_non_exhaustive()
    }
}

// ── Remote session ────────────────────────────────────────────────────────────

/// Receives the remote shell's stderr stream.
///
/// With a pseudo-terminal the server normally merges stderr into stdout, so
/// this only sees output from servers that keep the streams apart.
pub type StderrSink = Box<dyn FnMut(&[u8]) + Send>;

/// Dials and authenticates remote sessions.
#[async_trait]
pub trait SessionConnector: Send + Sync {
    /// Connects to `target`, authenticates, and opens one session channel.
    ///
    /// # Errors
    ///
    /// [`SessionError::Dial`] or [`SessionError::HostKeyRejected`] for
    /// connection failures, [`SessionError::Auth`] for a rejected credential.
    async fn open(&self, target: &RemoteTarget) -> Result<Box<dyn RemoteSession>, SessionError>;
}

/// An authenticated session whose shell has not been split into streams yet.
#[async_trait]
pub trait RemoteSession: Send {
    /// Routes the shell's stderr to `sink`.  Must be called before
    /// [`RemoteSession::into_io`].
    fn attach_stderr(&mut self, sink: StderrSink);

    /// Requests a pseudo-terminal of `size` and starts the login shell on it.
    ///
    /// Called exactly once, before any stdin or stdout traffic.
    async fn start_shell(&mut self, size: TerminalSize) -> Result<(), SessionError>;

    /// Splits a started session into its stream halves and closer.
    ///
    /// # Errors
    ///
    /// [`SessionError::NotStarted`] if [`RemoteSession::start_shell`] has not
    /// succeeded.
    fn into_io(self: Box<Self>) -> Result<ShellIo, SessionError>;

    /// Closes the session and its transport.  Idempotent.
    async fn close(&mut self) -> Result<(), SessionError>;
}

/// The parts of a running remote shell.
pub struct ShellIo {
    pub output: Box<dyn ShellOutput>,
    pub input: Box<dyn ShellInput>,
    pub closer: Box<dyn SessionCloser>,
}

/// The shell's stdout.
#[async_trait]
pub trait ShellOutput: Send {
    /// Reads the next chunk of output into `buf`.
    ///
    /// Returns `Ok(0)` at clean end of stream.  Suspends until data is
    /// available; never returns `Ok(0)` spuriously.
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, SessionError>;
}

/// The shell's stdin plus the terminal-size control.
#[async_trait]
pub trait ShellInput: Send {
    /// Writes `bytes` to stdin in full.
    async fn write(&mut self, bytes: &[u8]) -> Result<(), SessionError>;

    /// Propagates new terminal dimensions to the remote pseudo-terminal.
    async fn resize(&mut self, size: TerminalSize) -> Result<(), SessionError>;
}

/// Tears down a running remote shell.
#[async_trait]
pub trait SessionCloser: Send {
    /// Closes the session channel and its transport, reporting both errors
    /// if both fail.  A second call is a no-op that returns `Ok(())`.
    async fn close(&mut self) -> Result<(), SessionError>;
}
