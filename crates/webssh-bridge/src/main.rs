//! webssh-bridge: WebSocket-to-SSH gateway, entry point.
//!
//! This binary accepts WebSocket connections from browser terminals and gives
//! each one its own interactive shell on a single configured SSH host.
//!
//! # Usage
//!
//! ```text
//! webssh-bridge [OPTIONS]
//!
//! Options:
//!   -b, --bind <ADDR>                 Address to bind [default: 0.0.0.0]
//!   -l, --listen <PORT>               WebSocket listen port [default: 8080]
//!   -t, --host <HOST>                 SSH server host
//!   -p, --port <PORT>                 SSH server port [default: 22]
//!   -u, --user <USER>                 SSH login user
//!   -s, --password <PASSWORD>         SSH password
//!   -i, --identity-file <PATH>        SSH private key file
//!   -c, --config <PATH>               Config file [default: ./config.toml]
//!       --host-key-fingerprint <FP>   Trusted host key (repeatable)
//!       --insecure-accept-any-host-key
//! ```
//!
//! # Environment variable overrides
//!
//! Every option can also be given through a `WEBSSH_*` variable (for example
//! `WEBSSH_PASSWORD`).  A value on the command line wins over the variable,
//! and either wins over the config file.
//!
//! The log filter comes from `RUST_LOG` when set, otherwise from
//! `--log-level` / `log_level` in the file (default `info`).

use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use webssh_bridge::application::BridgeFactory;
use webssh_bridge::domain::GatewayConfig;
use webssh_bridge::infrastructure::{
    load_config_file, resolve_config, run_server, ConfigOverrides, SshConnector,
};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// WebSocket-to-SSH gateway for browser terminals.
#[derive(Debug, Parser)]
#[command(
    name = "webssh-bridge",
    about = "Bridges browser WebSocket terminals to an interactive SSH shell",
    version
)]
struct Cli {
    /// IP address to bind the WebSocket server to [default: 0.0.0.0].
    #[arg(short = 'b', long, env = "WEBSSH_BIND")]
    bind: Option<IpAddr>,

    /// WebSocket listen port [default: 8080].
    #[arg(short = 'l', long, env = "WEBSSH_LISTEN")]
    listen: Option<u16>,

    /// Host name or IP address of the SSH server.
    #[arg(short = 't', long, env = "WEBSSH_HOST")]
    host: Option<String>,

    /// SSH server port [default: 22].
    #[arg(short = 'p', long, env = "WEBSSH_PORT")]
    port: Option<u16>,

    /// SSH login user.
    #[arg(short = 'u', long, env = "WEBSSH_USER")]
    user: Option<String>,

    /// SSH password.  Takes precedence over an identity file.
    #[arg(short = 's', long, env = "WEBSSH_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Private key file for public-key authentication.
    #[arg(short = 'i', long, env = "WEBSSH_IDENTITY_FILE")]
    identity_file: Option<PathBuf>,

    /// Passphrase for the identity file.
    #[arg(long, env = "WEBSSH_PASSPHRASE", hide_env_values = true)]
    passphrase: Option<String>,

    /// TOML config file.  Ignored if it does not exist.
    #[arg(short = 'c', long, default_value = "./config.toml", env = "WEBSSH_CONFIG")]
    config: PathBuf,

    /// SHA-256 fingerprint of a trusted host key; may be repeated.
    #[arg(long = "host-key-fingerprint", env = "WEBSSH_HOST_KEY_FINGERPRINTS", value_delimiter = ',')]
    host_key_fingerprints: Vec<String>,

    /// Accept any host key.  Only for fully trusted networks.
    #[arg(long, env = "WEBSSH_INSECURE_ACCEPT_ANY_HOST_KEY")]
    insecure_accept_any_host_key: bool,

    /// Deadline in seconds for the initial resize, each frame write, and each
    /// close [default: 10].
    #[arg(long, env = "WEBSSH_MESSAGE_WAIT_SECS")]
    message_wait_secs: Option<u64>,

    /// Request path accepted for WebSocket upgrades [default: /web-socket/ssh].
    #[arg(long, env = "WEBSSH_WS_PATH")]
    ws_path: Option<String>,

    /// Log filter used when `RUST_LOG` is not set [default: info].
    #[arg(long, env = "WEBSSH_LOG_LEVEL")]
    log_level: Option<String>,
}

impl Cli {
    /// Loads the config file named by `--config` and merges the command line
    /// over it.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be parsed, or if a
    /// required setting is missing from both sources.
    fn into_gateway_config(self) -> anyhow::Result<GatewayConfig> {
        let file = load_config_file(&self.config)?;
        let overrides = ConfigOverrides {
            host: self.host,
            port: self.port,
            user: self.user,
            password: self.password,
            identity_file: self.identity_file,
            passphrase: self.passphrase,
            bind: self.bind,
            listen: self.listen,
            ws_path: self.ws_path,
            host_key_fingerprints: self.host_key_fingerprints,
            insecure_accept_any_host_key: self.insecure_accept_any_host_key,
            message_wait_secs: self.message_wait_secs,
            resize_failure: None,
            log_level: self.log_level,
        };
        resolve_config(overrides, file)
            .with_context(|| format!("invalid configuration (file: {})", self.config.display()))
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Cli::parse().into_gateway_config()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    info!(
        bind = %config.bind_addr,
        path = %config.ws_path,
        target = %config.target.address,
        user = %config.target.user,
        method = config.target.credential.method(),
        "webssh-bridge starting"
    );
    if config.host_key_policy.is_insecure() {
        tracing::warn!("host key verification is disabled");
    }

    let connector = SshConnector::new(config.host_key_policy.clone());
    let factory = BridgeFactory::new(
        Arc::new(connector),
        config.target.clone(),
        config.bridge.clone(),
    );

    let shutdown = CancellationToken::new();
    let on_signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C, shutting down");
                on_signal.cancel();
            }
            Err(e) => tracing::error!("failed to listen for Ctrl+C signal: {e}"),
        }
    });

    run_server(&config, factory, shutdown).await?;

    info!("webssh-bridge stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
