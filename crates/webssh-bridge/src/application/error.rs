//! Error taxonomy for the bridge.
//!
//! | Error              | Raised by                  | Effect                           |
//! |--------------------|----------------------------|----------------------------------|
//! | [`SetupError`]     | the factory, before pumps  | connection attempt abandoned     |
//! | [`TransportError`] | a duplex channel half      | fatal to its direction           |
//! | [`SessionError`]   | a remote session part      | fatal to its direction           |
//! | [`BridgeError`]    | a pump                     | root cause of a failed teardown  |
//!
//! Nothing after setup is reported to the client in-band; the client simply
//! observes the WebSocket closing.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use webssh_core::MalformedControl;

/// Failure of one half of the browser-facing duplex channel.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The peer closed the channel, or it was already closed locally.
    #[error("channel closed")]
    Closed,

    /// An operation did not complete within its deadline.
    #[error("channel operation timed out after {0:?}")]
    Timeout(Duration),

    /// Any other framing or socket error.
    #[error("channel error: {0}")]
    Io(String),
}

/// Reasons a pair of close errors is reported together.
#[derive(Debug, Error)]
pub enum CloseError {
    #[error("failed to close session: {0}")]
    Session(String),

    #[error("failed to close transport: {0}")]
    Transport(String),

    #[error("failed to close session: {session} & failed to close transport: {transport}")]
    Both { session: String, transport: String },
}

impl CloseError {
    /// Combines the outcome of closing the session channel and the transport
    /// underneath it.  Returns `None` when both closed cleanly.
    pub fn from_parts(session: Option<String>, transport: Option<String>) -> Option<Self> {
        match (session, transport) {
            (None, None) => None,
            (Some(session), None) => Some(CloseError::Session(session)),
            (None, Some(transport)) => Some(CloseError::Transport(transport)),
            (Some(session), Some(transport)) => Some(CloseError::Both { session, transport }),
        }
    }
}

/// Failure of the remote session or one of its parts.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Network-level connect or key-exchange failure.
    #[error("failed to dial {address}: {reason}")]
    Dial { address: String, reason: String },

    /// The host key was not accepted by the configured policy.
    #[error("host key of {address} rejected by policy (fingerprint SHA256:{fingerprint})")]
    HostKeyRejected { address: String, fingerprint: String },

    /// The private key file could not be read or decrypted.
    #[error("failed to load identity file {path}: {reason}")]
    IdentityFile { path: PathBuf, reason: String },

    /// The server rejected the credential.
    #[error("authentication rejected for user {user}")]
    Auth { user: String },

    /// The pseudo-terminal request failed.
    #[error("failed to request pty: {0}")]
    Pty(String),

    /// The shell request failed.
    #[error("failed to start shell: {0}")]
    Shell(String),

    /// A window-change request failed after the shell started.
    #[error("failed to resize pty: {0}")]
    Resize(String),

    /// The shell was never started, so its streams do not exist.
    #[error("shell has not been started")]
    NotStarted,

    /// Reading stdout or writing stdin failed.
    #[error("session I/O failed: {0}")]
    Io(String),

    /// The session is closed.
    #[error("session closed")]
    Closed,

    /// Closing the session channel and/or its transport failed.
    #[error(transparent)]
    Close(#[from] CloseError),
}

impl SessionError {
    /// `true` for the setup failures that occur before a session exists.
    pub fn is_dial_error(&self) -> bool {
        matches!(
            self,
            SessionError::Dial { .. } | SessionError::HostKeyRejected { .. }
        )
    }
}

/// A failure before the bridge reached the running state.
///
/// These are reported to the caller of the factory, which still owns the
/// browser channel and is responsible for closing it.
#[derive(Debug, Error)]
pub enum SetupError {
    /// The initial resize message did not arrive.
    #[error("failed to read initial resize message: {0}")]
    InitialFrame(#[source] TransportError),

    /// The first frame was terminal data instead of a resize.
    #[error("expected a binary resize message as the first frame")]
    UnexpectedInitialFrame,

    /// The initial resize message did not decode.
    #[error("malformed initial resize message: {0}")]
    InitialResize(#[source] MalformedControl),

    /// Dialing or authenticating to the remote host failed.
    #[error("failed to open remote session: {0}")]
    Open(#[source] SessionError),

    /// The pseudo-terminal or shell could not be started.
    #[error("failed to start remote shell: {0}")]
    Shell(#[source] SessionError),

    /// The gateway is shutting down.
    #[error("setup cancelled")]
    Cancelled,
}

/// Why a pump direction failed.  The first one recorded is the root cause.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// A control frame did not decode.  Never retried.
    #[error("malformed control message: {0}")]
    MalformedControl(#[from] MalformedControl),

    /// The browser channel failed.
    #[error(transparent)]
    Channel(#[from] TransportError),

    /// The remote session failed.
    #[error(transparent)]
    Session(SessionError),

    /// The remote side rejected a resize and the policy makes that fatal.
    #[error("resize rejected: {0}")]
    Resize(#[source] SessionError),
}

// ── Tests ─────────────────────────────────────────────────────────────────────
