//! webssh-bridge library crate.
//!
//! A gateway that lets a browser terminal drive a shell on a remote host:
//! each WebSocket connection is bridged to its own SSH session with a
//! pseudo-terminal.
//!
//! # Architecture
//!
//! ```text
//! Browser (xterm.js over WebSocket)
//!         ↕  text frames = terminal bytes, binary frames = resize JSON
//! [webssh-bridge]
//!   ├── domain/           GatewayConfig, BridgeSettings, RemoteTarget
//!   ├── application/      BridgeFactory, Bridge pumps, ports, errors
//!   └── infrastructure/
//!         ├── ws_server    accept loop + per-connection tasks
//!         ├── ws_channel   tokio-tungstenite adapter for the frame ports
//!         ├── ssh_session  russh adapter for the session ports
//!         └── config_file  TOML file + CLI override resolution
//!         ↕
//! SSH server (russh client, one session per browser connection)
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O and no async.
//! - `application` depends on `domain`, `webssh-core`, and the port traits.
//! - `infrastructure` depends on everything plus tokio, tungstenite and russh.

/// Domain layer: configuration and target types.
pub mod domain;

/// Application layer: bridge lifecycle and pumping.
pub mod application;

/// Infrastructure layer: WebSocket server, SSH client, config loading.
pub mod infrastructure;
