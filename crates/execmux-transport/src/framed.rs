//! Connections over byte streams
//!
//! Wraps any `AsyncRead + AsyncWrite` stream (TCP, Unix socket, TLS stream,
//! in-memory duplex) into a [`Connection`] using [`MessageCodec`] framing.

use crate::{Connection, MessageSink, MessageSource, Result, TransportError};
use async_trait::async_trait;
use execmux_proto::codec::MAX_FRAME_SIZE;
use execmux_proto::{Handshake, Message, MessageCodec, ProtocolError};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tracing::debug;

/// Read half of a framed connection
pub struct FramedSource<R> {
    reader: R,
    codec: MessageCodec,
}

/// Write half of a framed connection
pub struct FramedSink<W> {
    writer: W,
    codec: MessageCodec,
}

#[async_trait]
impl<R> MessageSource for FramedSource<R>
where
    R: AsyncRead + Unpin + Send,
{
    async fn recv(&mut self) -> Result<Message> {
        match self.codec.read_message(&mut self.reader).await? {
            Some(message) => Ok(message),
            None => Err(TransportError::Closed),
        }
    }
}

#[async_trait]
impl<W> MessageSink for FramedSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, message: Message) -> Result<()> {
        self.codec.write_message(&mut self.writer, &message).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.writer.shutdown().await?;
        Ok(())
    }
}

fn build<S>(reader: ReadHalf<S>, writer: WriteHalf<S>, codec: MessageCodec) -> Connection
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let max_frame_size = codec.max_frame_size();
    Connection::new(
        Box::new(FramedSource { reader, codec }),
        Box::new(FramedSink {
            writer,
            codec: MessageCodec::with_max_frame_size(max_frame_size),
        }),
    )
}

/// Wrap an established stream without a handshake
pub fn connect<S>(stream: S) -> Connection
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    connect_with_max_frame_size(stream, MAX_FRAME_SIZE)
}

/// Wrap an established stream with a custom frame size limit
pub fn connect_with_max_frame_size<S>(stream: S, max_frame_size: usize) -> Connection
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (reader, writer) = tokio::io::split(stream);
    build(reader, writer, MessageCodec::with_max_frame_size(max_frame_size))
}

/// Send the open handshake on a fresh stream and wrap it
pub async fn dial<S>(stream: S, handshake: &Handshake) -> Result<Connection>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (reader, mut writer) = tokio::io::split(stream);
    let codec = MessageCodec::new();

    codec.write_frame(&mut writer, &handshake.to_frame()?).await?;
    debug!(operation = %handshake.operation, "Sent channel handshake");

    Ok(build(reader, writer, codec))
}

/// Read the open handshake from a fresh stream and wrap it
pub async fn accept<S>(stream: S) -> Result<(Handshake, Connection)>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    accept_with_max_frame_size(stream, MAX_FRAME_SIZE).await
}

/// Read the open handshake with a custom frame size limit
pub async fn accept_with_max_frame_size<S>(
    stream: S,
    max_frame_size: usize,
) -> Result<(Handshake, Connection)>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (mut reader, writer) = tokio::io::split(stream);
    let mut codec = MessageCodec::with_max_frame_size(max_frame_size);

    let frame = codec
        .read_frame(&mut reader)
        .await?
        .ok_or(TransportError::Closed)?;
    let handshake = Handshake::from_frame(&frame).map_err(|e| match e {
        ProtocolError::InvalidFrame => {
            TransportError::Connection("Expected handshake as first frame".to_string())
        }
        other => TransportError::Protocol(other),
    })?;
    debug!(operation = %handshake.operation, "Accepted channel handshake");

    // Bytes read past the handshake stay in the codec buffer
    Ok((handshake, build(reader, writer, codec)))
}
