//! Length-prefixed frame codec for async streams
//!
//! Every frame is written as a 4-byte big-endian length followed by the
//! MessagePack encoding of [`Frame`].

use crate::{Frame, Message, ProtocolError};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Maximum frame size (16MB)
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

const LENGTH_PREFIX: usize = 4;
const READ_CHUNK: usize = 8192;

/// Codec for reading and writing channel messages over a byte stream
#[derive(Debug)]
pub struct MessageCodec {
    /// Bytes received but not yet decoded
    read_buf: BytesMut,
    /// Maximum frame size allowed
    max_frame_size: usize,
}

impl Default for MessageCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageCodec {
    /// Create a codec with the default frame size limit
    pub fn new() -> Self {
        Self::with_max_frame_size(MAX_FRAME_SIZE)
    }

    /// Create a codec with a custom frame size limit
    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self {
            read_buf: BytesMut::with_capacity(READ_CHUNK),
            max_frame_size,
        }
    }

    /// Frame size limit in bytes
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Encode a frame with its length prefix
    pub fn encode_frame(&self, frame: &Frame) -> Result<Bytes, ProtocolError> {
        let frame_bytes = frame.to_msgpack()?;

        if frame_bytes.len() > self.max_frame_size {
            return Err(ProtocolError::FrameTooLarge {
                size: frame_bytes.len(),
                max: self.max_frame_size,
            });
        }

        let mut buf = BytesMut::with_capacity(LENGTH_PREFIX + frame_bytes.len());
        buf.put_u32(frame_bytes.len() as u32);
        buf.put_slice(&frame_bytes);

        Ok(buf.freeze())
    }

    /// Encode a message with its length prefix
    pub fn encode_message(&self, message: &Message) -> Result<Bytes, ProtocolError> {
        self.encode_frame(&Frame::from_message(message))
    }

    /// Write a frame and flush the writer
    pub async fn write_frame<W>(&self, writer: &mut W, frame: &Frame) -> Result<(), ProtocolError>
    where
        W: AsyncWrite + Unpin,
    {
        let encoded = self.encode_frame(frame)?;
        writer
            .write_all(&encoded)
            .await
            .map_err(|e| ProtocolError::Serialization(format!("Write error: {}", e)))?;
        writer
            .flush()
            .await
            .map_err(|e| ProtocolError::Serialization(format!("Flush error: {}", e)))?;
        Ok(())
    }

    /// Write a message and flush the writer
    pub async fn write_message<W>(
        &self,
        writer: &mut W,
        message: &Message,
    ) -> Result<(), ProtocolError>
    where
        W: AsyncWrite + Unpin,
    {
        self.write_frame(writer, &Frame::from_message(message)).await
    }

    /// Read the next frame; `Ok(None)` on a clean end of stream
    pub async fn read_frame<R>(&mut self, reader: &mut R) -> Result<Option<Frame>, ProtocolError>
    where
        R: AsyncRead + Unpin,
    {
        loop {
            if let Some(frame) = self.try_decode_frame()? {
                return Ok(Some(frame));
            }

            let mut chunk = [0u8; READ_CHUNK];
            let n = reader
                .read(&mut chunk)
                .await
                .map_err(|e| ProtocolError::Serialization(format!("Read error: {}", e)))?;

            if n == 0 {
                // EOF between frames is clean, inside one is not
                if self.read_buf.is_empty() {
                    return Ok(None);
                }
                return Err(ProtocolError::InvalidFrame);
            }

            self.read_buf.extend_from_slice(&chunk[..n]);
        }
    }

    /// Read the next message; `Ok(None)` on a clean end of stream
    pub async fn read_message<R>(&mut self, reader: &mut R) -> Result<Option<Message>, ProtocolError>
    where
        R: AsyncRead + Unpin,
    {
        match self.read_frame(reader).await? {
            Some(frame) => frame.into_message().map(Some),
            None => Ok(None),
        }
    }

    /// Try to decode one frame from the buffered bytes
    pub fn try_decode_frame(&mut self) -> Result<Option<Frame>, ProtocolError> {
        if self.read_buf.len() < LENGTH_PREFIX {
            return Ok(None);
        }

        let frame_len = (&self.read_buf[..LENGTH_PREFIX]).get_u32() as usize;

        if frame_len > self.max_frame_size {
            return Err(ProtocolError::FrameTooLarge {
                size: frame_len,
                max: self.max_frame_size,
            });
        }

        if self.read_buf.len() < LENGTH_PREFIX + frame_len {
            return Ok(None);
        }

        self.read_buf.advance(LENGTH_PREFIX);
        let frame_data = self.read_buf.split_to(frame_len);

        Frame::from_msgpack(&frame_data).map(Some)
    }

    /// Number of buffered, undecoded bytes
    pub fn buffer_size(&self) -> usize {
        self.read_buf.len()
    }
}
