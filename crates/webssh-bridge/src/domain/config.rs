//! Gateway configuration types.
//!
//! [`GatewayConfig`] is the single source of truth for all runtime settings.
//! It is assembled once at startup from the command line and the optional
//! TOML file (see `infrastructure::config_file`) and then shared read-only
//! with every connection task.  Nothing in the process mutates it afterwards.

use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use webssh_core::HostKeyPolicy;

use crate::domain::target::RemoteTarget;

/// Path on which WebSocket upgrades are accepted by default.
pub const DEFAULT_WS_PATH: &str = "/web-socket/ssh";

/// Deadline for the initial resize message, each outbound frame write, and
/// each close handshake.
pub const DEFAULT_MESSAGE_WAIT: Duration = Duration::from_secs(10);

/// Size of each read from the remote shell's output.
pub const DEFAULT_CHUNK_SIZE: usize = 512;

/// What the inbound pump does when the remote side rejects a resize.
///
/// A rejected resize does not affect the byte streams, so by default it is
/// logged and the session carries on.  Deployments that prefer a hard failure
/// can select [`ResizeFailurePolicy::Terminate`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResizeFailurePolicy {
    /// Log the failure at `warn` and keep pumping.
    #[default]
    LogAndContinue,
    /// Treat the failure as fatal to the inbound direction.
    Terminate,
}

/// Per-bridge tunables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeSettings {
    /// Bound on the initial resize read, on each outbound frame write, and on
    /// each close during teardown.
    pub message_wait: Duration,

    /// Maximum number of bytes read from the remote shell per text frame.
    pub chunk_size: usize,

    /// Reaction to a resize the remote side rejects.
    pub resize_failure: ResizeFailurePolicy,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            message_wait: DEFAULT_MESSAGE_WAIT,
            chunk_size: DEFAULT_CHUNK_SIZE,
            resize_failure: ResizeFailurePolicy::default(),
        }
    }
}

/// All runtime configuration for the gateway.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Address and port the WebSocket server binds to.
    pub bind_addr: SocketAddr,

    /// Request path that is upgraded to a bridge; other paths get a 404.
    pub ws_path: String,

    /// The SSH endpoint and login every bridge uses.
    pub target: RemoteTarget,

    /// How the remote host's identity is verified.  Always explicit.
    pub host_key_policy: HostKeyPolicy,

    /// Per-bridge tunables.
    pub bridge: BridgeSettings,

    /// Fallback `tracing` filter used when `RUST_LOG` is not set.
    pub log_level: String,
}

// ── Tests ─────────────────────────────────────────────────────────────────────
