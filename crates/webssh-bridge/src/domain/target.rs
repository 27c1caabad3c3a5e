//! The remote endpoint every bridge connects to.

use webssh_core::Credential;

/// Where and as whom the gateway logs in.
///
/// One target is configured per gateway process; every accepted browser
/// connection gets its own session on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTarget {
    /// `host:port` of the SSH server.
    pub address: String,
    /// Login user name.
    pub user: String,
    /// Secret used to authenticate `user`.
    pub credential: Credential,
}

impl RemoteTarget {
    /// Builds a target from a host name and port.
    pub fn new(host: &str, port: u16, user: impl Into<String>, credential: Credential) -> Self {
        Self {
            address: format!("{host}:{port}"),
            user: user.into(),
            credential,
        }
    }
}
