//! Protocol module containing the frame tags and the resize control codec.

pub mod frame;
pub mod resize;

pub use frame::{Frame, FrameKind};
pub use resize::{decode_resize, encode_resize, MalformedControl, ResizeMessage};
