//! Codec for the resize control message.
//!
//! Wire format (the entire payload of one binary WebSocket frame):
//!
//! ```json
//! {"rows":24,"columns":80}
//! ```
//!
//! Both fields are required and must be strictly positive integers.  Unknown
//! fields are ignored.  The legacy field names `high` and `width`, sent by
//! older browser front-ends, are accepted as aliases for `rows` and `columns`.
//!
//! Decoding never produces a partial or defaulted value: any parse failure or
//! out-of-range dimension is a [`MalformedControl`] error.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::trace;

use crate::domain::terminal::TerminalSize;

/// A control payload that could not be decoded into a [`ResizeMessage`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MalformedControl {
    /// The payload is not a JSON object with integer `rows` and `columns`.
    #[error("unparseable resize message: {0}")]
    Unparseable(String),

    /// A dimension was zero, negative, or too large for a terminal.
    #[error("invalid {field} in resize message: {value}")]
    InvalidDimension { field: &'static str, value: i64 },
}

/// A request to set the terminal to a new size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizeMessage {
    size: TerminalSize,
}

impl ResizeMessage {
    /// Wraps a validated terminal size.
    pub fn new(size: TerminalSize) -> Self {
        Self { size }
    }

    /// The requested dimensions.
    pub fn size(&self) -> TerminalSize {
        self.size
    }

    /// Requested number of rows.
    pub fn rows(&self) -> u32 {
        self.size.rows()
    }

    /// Requested number of columns.
    pub fn columns(&self) -> u32 {
        self.size.columns()
    }
}

impl From<TerminalSize> for ResizeMessage {
    fn from(size: TerminalSize) -> Self {
        Self::new(size)
    }
}

/// Shape of the JSON object on the wire.
///
/// Dimensions are read as `i64` so that negative values are reported as
/// invalid dimensions rather than as generic parse failures.
#[derive(Serialize, Deserialize)]
struct WireResize {
    #[serde(alias = "high")]
    rows: i64,
    #[serde(alias = "width")]
    columns: i64,
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Decodes the payload of a control frame into a [`ResizeMessage`].
///
/// # Errors
///
/// Returns [`MalformedControl::Unparseable`] if the bytes are not a JSON
/// object with integer `rows` and `columns` fields, and
/// [`MalformedControl::InvalidDimension`] if either value is not in
/// `1..=u32::MAX`.
///
/// # Examples
///
/// ```rust
/// use webssh_core::decode_resize;
///
/// let msg = decode_resize(br#"{"rows":24,"columns":80}"#).unwrap();
/// assert_eq!((msg.rows(), msg.columns()), (24, 80));
/// assert!(decode_resize(br#"{"rows":0,"columns":80}"#).is_err());
/// ```
pub fn decode_resize(payload: &[u8]) -> Result<ResizeMessage, MalformedControl> {
    let wire: WireResize = serde_json::from_slice(payload)
        .map_err(|e| MalformedControl::Unparseable(e.to_string()))?;

    let rows = dimension("rows", wire.rows)?;
    let columns = dimension("columns", wire.columns)?;
    trace!(rows, columns, "decoded resize message");

    // dimension() has already rejected zero, so the size is always valid.
    TerminalSize::new(rows, columns)
        .map(ResizeMessage::new)
        .ok_or(MalformedControl::InvalidDimension {
            field: "rows",
            value: wire.rows,
        })
}

/// Encodes a [`ResizeMessage`] as the JSON payload of a control frame.
pub fn encode_resize(msg: &ResizeMessage) -> Vec<u8> {
    let wire = WireResize {
        rows: i64::from(msg.rows()),
        columns: i64::from(msg.columns()),
    };
    // Serializing two integers into a Vec cannot fail.
    serde_json::to_vec(&wire).unwrap_or_default()
}

fn dimension(field: &'static str, value: i64) -> Result<u32, MalformedControl> {
    match u32::try_from(value) {
        Ok(v) if v > 0 => Ok(v),
        _ => Err(MalformedControl::InvalidDimension { field, value }),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
