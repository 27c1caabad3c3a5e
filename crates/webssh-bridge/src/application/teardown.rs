//! The shared stop signal for one bridge.
//!
//! Both pump directions watch the same [`CancellationToken`].  Whichever
//! direction ends first records why in a set-once slot and cancels the token;
//! the other direction sees the cancellation at its next suspension point and
//! exits without recording anything.  An external close request cancels the
//! token directly and leaves the slot empty.

use std::sync::OnceLock;

use tokio_util::sync::CancellationToken;

use crate::application::error::BridgeError;

/// Which pump a termination came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Remote stdout to browser.
    Outbound,
    /// Browser to remote stdin.
    Inbound,
}

/// Why a bridge stopped.
#[derive(Debug)]
pub enum Termination {
    /// The remote shell's output ended cleanly.
    RemoteEnded,
    /// The browser closed the channel cleanly.
    ClientClosed,
    /// Someone outside the bridge asked it to close.
    CloseRequested,
    /// A pump failed.
    Failed {
        direction: Direction,
        error: BridgeError,
    },
}

impl Termination {
    /// `true` unless a pump failed.
    pub fn is_clean(&self) -> bool {
        !matches!(self, Termination::Failed { .. })
    }
}

/// Single-fire stop signal shared by the two pumps.
pub struct TeardownSignal {
    token: CancellationToken,
    cause: OnceLock<Termination>,
}

impl TeardownSignal {
    pub fn new(token: CancellationToken) -> Self {
        Self {
            token,
            cause: OnceLock::new(),
        }
    }

    /// Records `cause` if nothing was recorded before, then stops both pumps.
    ///
    /// Returns `true` if this call supplied the root cause.
    pub fn trigger(&self, cause: Termination) -> bool {
        let first = self.cause.set(cause).is_ok();
        self.token.cancel();
        first
    }

    /// `true` once either pump ended or a close was requested.
    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves when the signal fires.
    pub async fn stopped(&self) {
        self.token.cancelled().await;
    }

    /// The recorded root cause, or [`Termination::CloseRequested`] if the
    /// bridge was stopped from outside.
    pub fn into_cause(self) -> Termination {
        self.cause
            .into_inner()
            .unwrap_or(Termination::CloseRequested)
    }
}
