//! Connection open handshake
//!
//! A dialing client names the operation and the channel endpoint token in a
//! single `HELLO` frame before any channel message is exchanged.

use crate::{Frame, FrameKind, ProtocolError};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Open handshake sent by the dialing side
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handshake {
    /// Operation the channel belongs to
    pub operation: String,
    /// Endpoint token allocated by the remote side for this channel
    pub secret: String,
}

impl Handshake {
    /// Create a new handshake
    pub fn new(operation: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            secret: secret.into(),
        }
    }

    /// Wrap the handshake in a `HELLO` frame
    pub fn to_frame(&self) -> Result<Frame, ProtocolError> {
        let payload = rmp_serde::to_vec(self)?;
        Ok(Frame::hello(Bytes::from(payload)))
    }

    /// Extract a handshake from a `HELLO` frame
    pub fn from_frame(frame: &Frame) -> Result<Self, ProtocolError> {
        if frame.kind != FrameKind::HELLO {
            return Err(ProtocolError::InvalidFrame);
        }
        Ok(rmp_serde::from_slice(&frame.payload)?)
    }
}
