//! # execmux protocol
//!
//! Message model, wire frames, and codec for execmux stream channels.

#![warn(missing_docs)]

/// Channel messages (binary data, text barrier, close)
pub mod message;

/// Frame structure and serialization
pub mod frame;

/// Length-prefixed frame codec for async streams
pub mod codec;

/// Connection open handshake
pub mod handshake;

/// Error types for protocol operations
pub mod error;

pub use codec::MessageCodec;
pub use error::ProtocolError;
pub use frame::{Frame, FrameKind};
pub use handshake::Handshake;
pub use message::{close_code, Message, MessageKind};
