//! Channel messages

use bytes::Bytes;
use std::fmt;

/// Close status codes carried by [`Message::Close`]
pub mod close_code {
    /// Normal closure
    pub const NORMAL: u16 = 1000;
    /// Endpoint going away
    pub const GOING_AWAY: u16 = 1001;
    /// Close frame carried no status
    pub const NO_STATUS: u16 = 1005;
}

/// Kind of a channel message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Opaque payload chunk
    Binary,
    /// Text message, used as an end-of-stream barrier
    Text,
    /// Close message
    Close,
}

/// A single message on a channel connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Opaque payload chunk
    Binary(Bytes),
    /// Text message; a zero-length one is the end-of-stream barrier
    Text(String),
    /// Close message
    Close {
        /// Close status code
        code: u16,
        /// Human readable reason
        reason: String,
    },
}

impl Message {
    /// Create a binary message
    pub fn binary(payload: impl Into<Bytes>) -> Self {
        Self::Binary(payload.into())
    }

    /// Create a text message
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// Create the zero-length text barrier
    pub fn barrier() -> Self {
        Self::Text(String::new())
    }

    /// Create a close message with a status code and reason
    pub fn close(code: u16, reason: impl Into<String>) -> Self {
        Self::Close {
            code,
            reason: reason.into(),
        }
    }

    /// Create a normal-closure close message
    pub fn close_normal() -> Self {
        Self::close(close_code::NORMAL, "")
    }

    /// Get the message kind
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Binary(_) => MessageKind::Binary,
            Self::Text(_) => MessageKind::Text,
            Self::Close { .. } => MessageKind::Close,
        }
    }

    /// Size of the message body in bytes
    pub fn payload_len(&self) -> usize {
        match self {
            Self::Binary(payload) => payload.len(),
            Self::Text(text) => text.len(),
            Self::Close { reason, .. } => 2 + reason.len(),
        }
    }

    /// Check if this is a text message
    pub fn is_barrier(&self) -> bool {
        matches!(self, Self::Text(_))
    }

    /// Check if this is a close message
    pub fn is_close(&self) -> bool {
        matches!(self, Self::Close { .. })
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Binary => write!(f, "binary"),
            Self::Text => write!(f, "text"),
            Self::Close => write!(f, "close"),
        }
    }
}
