//! Domain value types shared by every layer of the bridge.

pub mod credential;
pub mod host_key;
pub mod terminal;
