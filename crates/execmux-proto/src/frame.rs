//! Frame structure and serialization

use crate::message::close_code;
use crate::{Message, ProtocolError};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

/// Frame kind tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameKind(pub u8);

impl FrameKind {
    /// Binary data
    pub const BINARY: Self = Self(1);
    /// Text (barrier)
    pub const TEXT: Self = Self(2);
    /// Close
    pub const CLOSE: Self = Self(3);
    /// Open handshake, only valid as the first frame of a connection
    pub const HELLO: Self = Self(4);

    /// Check if the kind is one this codec understands
    pub fn is_known(self) -> bool {
        (Self::BINARY.0..=Self::HELLO.0).contains(&self.0)
    }
}

/// Protocol frame structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    /// Frame kind
    pub kind: FrameKind,
    /// Frame payload
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame
    pub fn new(kind: FrameKind, payload: Bytes) -> Self {
        Self { kind, payload }
    }

    /// Create a handshake frame
    pub fn hello(payload: Bytes) -> Self {
        Self::new(FrameKind::HELLO, payload)
    }

    /// Build the frame that carries `message`
    pub fn from_message(message: &Message) -> Self {
        match message {
            Message::Binary(payload) => Self::new(FrameKind::BINARY, payload.clone()),
            Message::Text(text) => Self::new(FrameKind::TEXT, Bytes::from(text.clone())),
            Message::Close { code, reason } => {
                let mut buf = BytesMut::with_capacity(2 + reason.len());
                buf.put_u16(*code);
                buf.put_slice(reason.as_bytes());
                Self::new(FrameKind::CLOSE, buf.freeze())
            }
        }
    }

    /// Convert the frame back into a message
    pub fn into_message(self) -> Result<Message, ProtocolError> {
        match self.kind {
            FrameKind::BINARY => Ok(Message::Binary(self.payload)),
            FrameKind::TEXT => String::from_utf8(self.payload.to_vec())
                .map(Message::Text)
                .map_err(|_| ProtocolError::InvalidText),
            FrameKind::CLOSE => {
                let mut payload = self.payload;
                if payload.is_empty() {
                    return Ok(Message::close(close_code::NO_STATUS, ""));
                }
                if payload.len() < 2 {
                    return Err(ProtocolError::InvalidFrame);
                }
                let code = payload.get_u16();
                let reason =
                    String::from_utf8(payload.to_vec()).map_err(|_| ProtocolError::InvalidText)?;
                Ok(Message::Close { code, reason })
            }
            FrameKind::HELLO => Err(ProtocolError::UnexpectedHandshake),
            FrameKind(other) => Err(ProtocolError::UnknownFrameKind(other)),
        }
    }

    /// Serialize frame to MessagePack bytes
    pub fn to_msgpack(&self) -> Result<Vec<u8>, ProtocolError> {
        Ok(rmp_serde::to_vec(self)?)
    }

    /// Deserialize frame from MessagePack bytes
    pub fn from_msgpack(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let frame: Self = rmp_serde::from_slice(bytes)?;
        if !frame.kind.is_known() {
            return Err(ProtocolError::UnknownFrameKind(frame.kind.0));
        }
        Ok(frame)
    }

    /// Get the payload size
    pub fn payload_size(&self) -> usize {
        self.payload.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_frame_kinds_known() {
        assert!(FrameKind::BINARY.is_known());
        assert!(FrameKind::HELLO.is_known());
        assert!(!FrameKind(0).is_known());
        assert!(!FrameKind(9).is_known());
    }

    #[test]
    fn test_barrier_frame_is_empty() {
        let frame = Frame::from_message(&Message::barrier());
        assert_eq!(frame.kind, FrameKind::TEXT);
        assert_eq!(frame.payload_size(), 0);
        assert_eq!(frame.into_message().unwrap(), Message::barrier());
    }

    #[test]
    fn test_close_frame_layout() {
        let frame = Frame::from_message(&Message::close(close_code::NORMAL, "done"));
        assert_eq!(frame.kind, FrameKind::CLOSE);
        assert_eq!(&frame.payload[..2], &[0x03, 0xE8]);
        assert_eq!(&frame.payload[2..], b"done");
    }

    #[test]
    fn test_empty_close_frame_has_no_status() {
        let frame = Frame::new(FrameKind::CLOSE, Bytes::new());
        assert_eq!(
            frame.into_message().unwrap(),
            Message::close(close_code::NO_STATUS, "")
        );
    }

    #[test]
    fn test_truncated_close_frame() {
        let frame = Frame::new(FrameKind::CLOSE, Bytes::from_static(&[0x03]));
        assert!(matches!(frame.into_message(), Err(ProtocolError::InvalidFrame)));
    }

    #[test]
    fn test_text_frame_must_be_utf8() {
        let frame = Frame::new(FrameKind::TEXT, Bytes::from_static(&[0xFF, 0xFE]));
        assert!(matches!(frame.into_message(), Err(ProtocolError::InvalidText)));
    }

    #[test]
    fn test_hello_is_not_a_message() {
        let frame = Frame::hello(Bytes::from_static(b"x"));
        assert!(matches!(frame.into_message(), Err(ProtocolError::UnexpectedHandshake)));
    }

    #[test]
    fn test_unknown_kind_rejected_on_decode() {
        let frame = Frame::new(FrameKind(42), Bytes::from_static(b"x"));
        let bytes = frame.to_msgpack().unwrap();
        assert!(matches!(
            Frame::from_msgpack(&bytes),
            Err(ProtocolError::UnknownFrameKind(42))
        ));
    }

    proptest! {
        #[test]
        fn test_binary_payload_survives_msgpack(
            payload in prop::collection::vec(any::<u8>(), 0..1024)
        ) {
            let message = Message::binary(payload.clone());
            let bytes = Frame::from_message(&message).to_msgpack().unwrap();
            let decoded = Frame::from_msgpack(&bytes).unwrap().into_message().unwrap();

            prop_assert_eq!(decoded, Message::Binary(Bytes::from(payload)));
        }
    }
}
