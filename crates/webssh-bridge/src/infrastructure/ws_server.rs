//! WebSocket server: accept loop and per-connection task management.
//!
//! This module is responsible for:
//!
//! 1. Binding a TCP listener on the configured address.
//! 2. Accepting incoming TCP connections from browsers.
//! 3. Upgrading each connection on the configured path to a WebSocket.
//! 4. Handing the channel to the [`BridgeFactory`], which reads the initial
//!    size, opens the remote shell and runs the bridge to completion.
//! 5. On shutdown, refusing new connections and waiting for every live bridge
//!    to close.
//!
//! Each browser connection runs in its own Tokio task and gets a child of the
//! shutdown token, so cancelling the root token closes every bridge.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::application::bridge::BridgeReport;
use crate::application::factory::BridgeFactory;
use crate::domain::config::GatewayConfig;
use crate::infrastructure::ws_channel::accept_channel;

// ── Public API ────────────────────────────────────────────────────────────────

/// Binds `config.bind_addr` and serves until `shutdown` is cancelled.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot be bound (e.g., the port is
/// already in use or the process lacks permission to bind).
pub async fn run_server(
    config: &GatewayConfig,
    factory: BridgeFactory,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind WebSocket listener on {}", config.bind_addr))?;

    serve_listener(listener, &config.ws_path, factory, shutdown).await
}

/// Runs the accept loop on an already bound listener.
///
/// Returns after `shutdown` is cancelled and every bridge started by this
/// loop has closed.
///
/// # Errors
///
/// Currently infallible once the listener is bound; accept errors are logged
/// and the loop continues.
pub async fn serve_listener(
    listener: TcpListener,
    ws_path: &str,
    factory: BridgeFactory,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let local = listener.local_addr().context("listener has no local address")?;
    info!("WebSocket gateway listening on ws://{local}{ws_path}");

    let ws_path: Arc<str> = Arc::from(ws_path);
    let tracker = TaskTracker::new();

    loop {
        let (stream, peer) = tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                info!("shutdown requested; stopping accept loop");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    // Transient (e.g. too many open file descriptors).
                    error!("accept error: {e}");
                    continue;
                }
            },
        };

        debug!("new browser connection from {peer}");
        if let Err(e) = stream.set_nodelay(true) {
            debug!("set_nodelay failed for {peer}: {e}");
        }

        let factory = factory.clone();
        let ws_path = Arc::clone(&ws_path);
        let token = shutdown.child_token();
        tracker.spawn(async move {
            handle_connection(stream, peer, &ws_path, &factory, token).await;
        });
    }

    tracker.close();
    if !tracker.is_empty() {
        info!(bridges = tracker.len(), "waiting for open bridges to close");
    }
    tracker.wait().await;
    Ok(())
}

// ── Per-connection handler ────────────────────────────────────────────────────

/// Wraps [`run_connection`] and logs the outcome.
async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    ws_path: &str,
    factory: &BridgeFactory,
    shutdown: CancellationToken,
) {
    match run_connection(stream, peer, ws_path, factory, shutdown).await {
        Ok(report) if report.cause.is_clean() => {
            info!(bridge = %report.id, "connection {peer} closed normally")
        }
        Ok(report) => warn!(bridge = %report.id, "connection {peer} closed after failure"),
        Err(e) => warn!("connection {peer} ended: {e:#}"),
    }
}

/// Upgrades the connection and runs one bridge on it.
///
/// # Errors
///
/// Returns an error if the WebSocket handshake fails or times out, or if the
/// bridge could not be set up.
async fn run_connection(
    stream: TcpStream,
    peer: SocketAddr,
    ws_path: &str,
    factory: &BridgeFactory,
    shutdown: CancellationToken,
) -> anyhow::Result<BridgeReport> {
    let wait = factory.settings().message_wait;
    let channel = timeout(wait, accept_channel(stream, ws_path))
        .await
        .with_context(|| format!("WebSocket handshake with {peer} timed out"))?
        .with_context(|| format!("WebSocket handshake failed with {peer}"))?;

    info!("WebSocket session established: {peer}");

    let report = factory
        .serve(channel, Some(peer), shutdown)
        .await
        .with_context(|| format!("session {peer}: bridge setup failed"))?;
    Ok(report)
}
