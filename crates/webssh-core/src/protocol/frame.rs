//! Frames exchanged with the browser over the duplex channel.
//!
//! The browser channel carries two kinds of frame:
//!
//! | Tag    | Meaning                      | Payload                        |
//! |--------|------------------------------|--------------------------------|
//! | text   | raw terminal bytes           | forwarded verbatim             |
//! | binary | control message (resize)     | decoded with [`decode_resize`] |
//!
//! [`decode_resize`]: crate::protocol::resize::decode_resize

/// The tag of a frame, independent of its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Raw terminal bytes.
    Text,
    /// A control message.
    Binary,
}

/// One discrete message on the browser channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Terminal bytes: keystrokes from the browser, or shell output to it.
    Terminal(Vec<u8>),
    /// A control message payload.
    Control(Vec<u8>),
}

impl Frame {
    /// Returns the wire tag of this frame.
    pub fn kind(&self) -> FrameKind {
        match self {
            Frame::Terminal(_) => FrameKind::Text,
            Frame::Control(_) => FrameKind::Binary,
        }
    }

    /// Borrows the payload bytes.
    pub fn payload(&self) -> &[u8] {
        match self {
            Frame::Terminal(bytes) | Frame::Control(bytes) => bytes,
        }
    }

    /// Consumes the frame and returns its payload.
    pub fn into_payload(self) -> Vec<u8> {
        match self {
            Frame::Terminal(bytes) | Frame::Control(bytes) => bytes,
        }
    }
}
