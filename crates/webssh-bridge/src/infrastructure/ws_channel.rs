//! tokio-tungstenite adapter for the frame ports.
//!
//! A WebSocket connection is upgraded with [`accept_channel`] and split into
//! a [`WsFrameSink`] and a [`WsFrameSource`], one per pump direction.
//!
//! | WebSocket message | Frame                 |
//! |-------------------|-----------------------|
//! | `Text`            | [`Frame::Terminal`]   |
//! | `Binary`          | [`Frame::Control`]    |
//! | `Ping` / `Pong`   | skipped (tungstenite answers pings itself) |
//! | `Close` / EOF     | [`TransportError::Closed`] |
//!
//! WebSocket text must be valid UTF-8, but shell output is an arbitrary byte
//! stream read in fixed-size chunks.  The sink therefore carries an incomplete
//! multi-byte sequence at the end of one chunk over to the next frame, and
//! replaces bytes that can never be valid with U+FFFD.

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::{error::ProtocolError, Error as WsError, Message};
use tokio_tungstenite::{accept_hdr_async, WebSocketStream};
use tracing::{debug, warn};
use webssh_core::{Frame, FrameKind};

use crate::application::error::TransportError;
use crate::application::ports::{ChannelHalves, FrameSink, FrameSource};

// ── Upgrade ───────────────────────────────────────────────────────────────────

/// Performs the WebSocket upgrade on `stream` and splits the result.
///
/// Requests for any path other than `path` are refused with HTTP 404 during
/// the handshake.
///
/// # Errors
///
/// Returns the tungstenite error if the handshake fails or was refused.
pub async fn accept_channel<S>(stream: S, path: &str) -> Result<ChannelHalves, WsError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let expected = path.to_owned();
    let check_path = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        if req.uri().path() == expected {
            return Ok(resp);
        }
        warn!(path = %req.uri().path(), "refusing upgrade for unknown path");
        let mut refusal = ErrorResponse::new(Some("not found".to_string()));
        *refusal.status_mut() = StatusCode::NOT_FOUND;
        Err(refusal)
    };

    let ws = accept_hdr_async(stream, check_path).await?;
    Ok(split_socket(ws))
}

/// Splits an established WebSocket into frame-port halves.
pub fn split_socket<S>(ws: WebSocketStream<S>) -> ChannelHalves
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = ws.split();
    ChannelHalves::new(
        WsFrameSink {
            inner: tx,
            carry: Utf8Carry::default(),
            closed: false,
        },
        WsFrameSource { inner: rx },
    )
}

// ── Sink ──────────────────────────────────────────────────────────────────────

/// Write half of a WebSocket browser channel.
pub struct WsFrameSink<S> {
    inner: SplitSink<WebSocketStream<S>, Message>,
    carry: Utf8Carry,
    closed: bool,
}

#[async_trait]
impl<S> FrameSink for WsFrameSink<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        let msg = match frame.kind() {
            FrameKind::Text => Message::Text(self.carry.push(frame.payload())),
            FrameKind::Binary => Message::Binary(frame.into_payload()),
        };
        self.inner.send(msg).await.map_err(map_ws_error)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        if let Some(tail) = self.carry.finish() {
            // Best effort: the peer may already be gone.
            if let Err(e) = self.inner.send(Message::Text(tail)).await {
                debug!("dropping incomplete UTF-8 tail on close: {e}");
            }
        }

        match self.inner.close().await {
            Ok(()) => Ok(()),
            Err(e) => match map_ws_error(e) {
                TransportError::Closed => Ok(()),
                other => Err(other),
            },
        }
    }
}

// ── Source ────────────────────────────────────────────────────────────────────

/// Read half of a WebSocket browser channel.
pub struct WsFrameSource<S> {
    inner: SplitStream<WebSocketStream<S>>,
}

#[async_trait]
impl<S> FrameSource for WsFrameSource<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn recv(&mut self) -> Result<Frame, TransportError> {
        loop {
            match self.inner.next().await {
                Some(Ok(Message::Text(text))) => return Ok(Frame::Terminal(text.into_bytes())),
                Some(Ok(Message::Binary(bytes))) => return Ok(Frame::Control(bytes)),
                Some(Ok(Message::Close(_))) | None => return Err(TransportError::Closed),
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => continue,
                Some(Err(e)) => return Err(map_ws_error(e)),
            }
        }
    }
}

fn map_ws_error(e: WsError) -> TransportError {
    match e {
        WsError::ConnectionClosed
        | WsError::AlreadyClosed
        | WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake) => TransportError::Closed,
        other => TransportError::Io(other.to_string()),
    }
}

// ── UTF-8 carry ───────────────────────────────────────────────────────────────

/// Turns a chunked byte stream into UTF-8 strings without splitting
/// characters.
#[derive(Debug, Default)]
pub(crate) struct Utf8Carry {
    pending: Vec<u8>,
}

impl Utf8Carry {
    /// Decodes `bytes` after whatever was left over from the previous call.
    ///
    /// A trailing incomplete sequence (at most three bytes) is kept for the
    /// next call; invalid sequences become U+FFFD.
    pub(crate) fn push(&mut self, bytes: &[u8]) -> String {
        let mut input = std::mem::take(&mut self.pending);
        input.extend_from_slice(bytes);

        let mut out = String::with_capacity(input.len());
        let mut rest = input.as_slice();
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    out.push_str(valid);
                    break;
                }
                Err(e) => {
                    let (valid, tail) = rest.split_at(e.valid_up_to());
                    out.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        Some(bad) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &tail[bad..];
                        }
                        None => {
                            self.pending = tail.to_vec();
                            break;
                        }
                    }
                }
            }
        }
        out
    }

    /// Flushes a leftover incomplete sequence, lossily.
    pub(crate) fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let tail = std::mem::take(&mut self.pending);
        Some(String::from_utf8_lossy(&tail).into_owned())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
