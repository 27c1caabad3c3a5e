//! TOML configuration file and command-line override resolution.
//!
//! The file is optional.  When it exists it is the base, and every value given
//! on the command line (or through its environment variable) overrides the
//! matching field:
//!
//! ```toml
//! host = "10.0.0.5"
//! port = 22
//! user = "ops"
//! identity_file = "/etc/webssh/id_ed25519"
//! listen = 8080
//! host_key_fingerprints = ["SHA256:Zx3…"]
//! resize_failure = "log_and_continue"
//! ```
//!
//! [`resolve`] turns the merged values into a [`GatewayConfig`] or explains
//! which required setting is missing.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use webssh_core::{Credential, HostKeyPolicy};

use crate::domain::config::{
    BridgeSettings, GatewayConfig, ResizeFailurePolicy, DEFAULT_WS_PATH,
};
use crate::domain::target::RemoteTarget;

/// Default WebSocket listen port.
pub const DEFAULT_LISTEN_PORT: u16 = 8080;

/// Default SSH port.
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Default `tracing` filter.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Error type for configuration loading and resolution.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file exists but could not be read.
    #[error("I/O error reading config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// A required setting was given neither in the file nor on the command line.
    #[error("missing required setting `{0}`")]
    Missing(&'static str),

    /// Neither a password nor an identity file was configured.
    #[error("no credential configured: set a password or an identity file")]
    NoCredential,

    /// Neither trusted fingerprints nor the insecure opt-in was configured.
    #[error(
        "no host key policy configured: list host key fingerprints or opt into \
         insecure_accept_any_host_key"
    )]
    NoHostKeyPolicy,

    /// A setting has a value that cannot be used.
    #[error("invalid value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

// ── File schema ───────────────────────────────────────────────────────────────

/// Contents of the configuration file.  Every field is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub identity_file: Option<PathBuf>,
    pub passphrase: Option<String>,
    pub bind: Option<IpAddr>,
    pub listen: Option<u16>,
    pub ws_path: Option<String>,
    #[serde(default)]
    pub host_key_fingerprints: Vec<String>,
    #[serde(default)]
    pub insecure_accept_any_host_key: bool,
    pub message_wait_secs: Option<u64>,
    pub resize_failure: Option<ResizeFailurePolicy>,
    pub log_level: Option<String>,
}

/// Reads the configuration file at `path`.
///
/// Returns `Ok(None)` if the file does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] if the file exists but cannot be read, and
/// [`ConfigError::Parse`] if it is not valid TOML for [`FileConfig`].
pub fn load(path: &Path) -> Result<Option<FileConfig>, ConfigError> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    toml::from_str(&text)
        .map(Some)
        .map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
}

// ── Resolution ────────────────────────────────────────────────────────────────

/// Values given on the command line.  `None` / empty means "not given".
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub identity_file: Option<PathBuf>,
    pub passphrase: Option<String>,
    pub bind: Option<IpAddr>,
    pub listen: Option<u16>,
    pub ws_path: Option<String>,
    pub host_key_fingerprints: Vec<String>,
    pub insecure_accept_any_host_key: bool,
    pub message_wait_secs: Option<u64>,
    pub resize_failure: Option<ResizeFailurePolicy>,
    pub log_level: Option<String>,
}

/// Merges command-line values over the file and validates the result.
///
/// # Errors
///
/// Returns a [`ConfigError`] naming the first missing or invalid setting.
pub fn resolve(
    overrides: ConfigOverrides,
    file: Option<FileConfig>,
) -> Result<GatewayConfig, ConfigError> {
    let file = file.unwrap_or_default();

    let host = overrides
        .host
        .or(file.host)
        .filter(|h| !h.is_empty())
        .ok_or(ConfigError::Missing("host"))?;
    let user = overrides
        .user
        .or(file.user)
        .filter(|u| !u.is_empty())
        .ok_or(ConfigError::Missing("user"))?;
    let port = overrides.port.or(file.port).unwrap_or(DEFAULT_SSH_PORT);

    let credential = resolve_credential(
        overrides.password.or(file.password),
        overrides.identity_file.or(file.identity_file),
        overrides.passphrase.or(file.passphrase),
    )?;

    let host_key_policy = if overrides.insecure_accept_any_host_key
        || file.insecure_accept_any_host_key
    {
        HostKeyPolicy::InsecureAcceptAny
    } else {
        let fingerprints = if overrides.host_key_fingerprints.is_empty() {
            file.host_key_fingerprints
        } else {
            overrides.host_key_fingerprints
        };
        if fingerprints.is_empty() {
            return Err(ConfigError::NoHostKeyPolicy);
        }
        HostKeyPolicy::Fingerprints(fingerprints)
    };

    let ws_path = overrides
        .ws_path
        .or(file.ws_path)
        .unwrap_or_else(|| DEFAULT_WS_PATH.to_string());
    if !ws_path.starts_with('/') {
        return Err(ConfigError::Invalid {
            field: "ws_path",
            reason: format!("{ws_path:?} must start with '/'"),
        });
    }

    let message_wait = match overrides.message_wait_secs.or(file.message_wait_secs) {
        Some(0) => {
            return Err(ConfigError::Invalid {
                field: "message_wait_secs",
                reason: "must be at least 1".to_string(),
            })
        }
        Some(secs) => Duration::from_secs(secs),
        None => BridgeSettings::default().message_wait,
    };

    let bind = overrides
        .bind
        .or(file.bind)
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
    let listen = overrides.listen.or(file.listen).unwrap_or(DEFAULT_LISTEN_PORT);

    Ok(GatewayConfig {
        bind_addr: SocketAddr::new(bind, listen),
        ws_path,
        target: RemoteTarget::new(&host, port, user, credential),
        host_key_policy,
        bridge: BridgeSettings {
            message_wait,
            resize_failure: overrides
                .resize_failure
                .or(file.resize_failure)
                .unwrap_or_default(),
            ..BridgeSettings::default()
        },
        log_level: overrides
            .log_level
            .or(file.log_level)
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
    })
}

/// A password wins over an identity file.
fn resolve_credential(
    password: Option<String>,
    identity_file: Option<PathBuf>,
    passphrase: Option<String>,
) -> Result<Credential, ConfigError> {
    match (password.filter(|p| !p.is_empty()), identity_file) {
        (Some(password), _) => Ok(Credential::Password(password)),
        (None, Some(path)) => Ok(Credential::IdentityFile {
            path,
            passphrase: passphrase.filter(|p| !p.is_empty()),
        }),
        (None, None) => Err(ConfigError::NoCredential),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
