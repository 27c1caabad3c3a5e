//! Infrastructure layer for webssh-bridge.
//!
//! The infrastructure layer handles all I/O: accepting WebSocket connections
//! from browsers, dialing the SSH server, and reading the config file.
//!
//! # Responsibilities
//!
//! - Binding a TCP listener and performing the WebSocket upgrade
//! - Adapting WebSocket messages to frames (`ws_channel`)
//! - Dialing, authenticating and driving the russh session (`ssh_session`)
//! - Spawning and tracking per-connection Tokio tasks (`ws_server`)
//! - Loading and merging configuration (`config_file`)
//!
//! # What does NOT belong here?
//!
//! - Pump and teardown logic (that is the application layer)
//! - Resize message parsing (that is `webssh-core`)

pub mod config_file;
pub mod ssh_session;
pub mod ws_channel;
pub mod ws_server;

pub use config_file::{load as load_config_file, resolve as resolve_config, ConfigError, ConfigOverrides, FileConfig};
pub use ssh_session::SshConnector;
pub use ws_channel::{accept_channel, split_socket};
pub use ws_server::{run_server, serve_listener};
