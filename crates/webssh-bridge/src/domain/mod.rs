//! Domain layer for webssh-bridge.
//!
//! Pure configuration types with no dependencies on I/O, networking, or
//! external frameworks.  Everything the gateway needs to know before it
//! accepts its first connection lives here, resolved once at startup.
//!
//! # What does NOT belong here?
//!
//! - Any `tokio`, `TcpStream`, WebSocket or SSH types
//! - File I/O or environment variable reading
//! - Anything that could block or fail due to external state

pub mod config;
pub mod target;

pub use config::{BridgeSettings, GatewayConfig, ResizeFailurePolicy};
pub use target::RemoteTarget;
