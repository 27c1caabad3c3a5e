//! Application layer for webssh-bridge.
//!
//! The application layer owns the bridge lifecycle: it knows *what* to do
//! with frames and shell streams, but delegates *how* bytes move to the
//! infrastructure layer through the traits in [`ports`].
//!
//! # Responsibilities
//!
//! - Reading the initial resize and starting the remote shell (`factory`)
//! - Pumping both directions and tearing down exactly once (`bridge`)
//! - Defining the error types every layer reports with (`error`)
//!
//! # What does NOT belong here?
//!
//! - Opening sockets or dialing SSH (that is infrastructure)
//! - WebSocket framing (handled by tokio-tungstenite)

pub mod bridge;
pub mod error;
pub mod factory;
pub mod ports;
pub mod teardown;

pub use bridge::{Bridge, BridgeHandle, BridgeReport, BridgeState};
pub use error::{BridgeError, CloseError, SessionError, SetupError, TransportError};
pub use factory::{BridgeFactory, SetupFailure};
pub use ports::{
    ChannelHalves, FrameSink, FrameSource, RemoteSession, SessionCloser, SessionConnector,
    ShellInput, ShellIo, ShellOutput, StderrSink,
};
pub use teardown::{Direction, Termination};
