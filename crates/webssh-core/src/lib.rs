//! # webssh-core
//!
//! Shared library for webssh-bridge containing the control-message codec,
//! the frame tags used on the browser-facing channel, and the value types
//! that describe a remote shell session.
//!
//! It has zero dependencies on sockets, async runtimes or SSH libraries, so
//! everything here can be unit tested without a network.
//!
//! # Architecture overview
//!
//! webssh-bridge exposes an interactive shell on a remote host to a browser
//! terminal.  The browser talks WebSocket; the remote host talks SSH.  The
//! bridge pumps bytes between the two and interprets a tiny control protocol
//! that carries terminal resizes.
//!
//! This crate is the shared foundation.  It defines:
//!
//! - **`protocol`** – What travels over the browser channel.  Every frame is
//!   tagged either as raw terminal bytes (text frames) or as a control message
//!   (binary frames).  The only control message is a resize, encoded as JSON.
//!
//! - **`domain`** – Pure value types: terminal dimensions and modes, login
//!   credentials, and the host-identity verification policy.

pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `webssh_core::TerminalSize` instead of the full module path.
pub use domain::credential::Credential;
pub use domain::host_key::HostKeyPolicy;
pub use domain::terminal::{TerminalMode, TerminalSize, TERMINAL_MODES, TERMINAL_TYPE};
pub use protocol::frame::{Frame, FrameKind};
pub use protocol::resize::{decode_resize, encode_resize, MalformedControl, ResizeMessage};
