//! Connection handle and transport halves
//!
//! A [`Connection`] is a cheap, cloneable handle over one message transport.
//! The read half and the write half are guarded independently, so one
//! inbound pump and one outbound pump can use the same connection at the
//! same time. Closing the connection cancels any read or write in flight.

use crate::{Result, TransportError};
use async_trait::async_trait;
use bytes::Bytes;
use execmux_proto::Message;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

/// Unique identifier of a connection
pub type ConnectionId = Uuid;

/// Read half of a message transport
#[async_trait]
pub trait MessageSource: Send {
    /// Receive the next message; an error ends the stream
    async fn recv(&mut self) -> Result<Message>;

    /// Stop accepting messages from the peer
    async fn close(&mut self) {}
}

/// Write half of a message transport
#[async_trait]
pub trait MessageSink: Send {
    /// Send one message
    async fn send(&mut self, message: Message) -> Result<()>;

    /// Shut the transport down
    async fn close(&mut self) -> Result<()>;
}

struct Inner {
    id: ConnectionId,
    source: Mutex<Box<dyn MessageSource>>,
    sink: Mutex<Box<dyn MessageSink>>,
    shutdown: CancellationToken,
    closed: AtomicBool,
}

/// Handle to a full-duplex message connection
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

impl Connection {
    /// Create a connection from its two transport halves
    pub fn new(source: Box<dyn MessageSource>, sink: Box<dyn MessageSink>) -> Self {
        Self {
            inner: Arc::new(Inner {
                id: Uuid::new_v4(),
                source: Mutex::new(source),
                sink: Mutex::new(sink),
                shutdown: CancellationToken::new(),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Get the connection ID
    pub fn id(&self) -> ConnectionId {
        self.inner.id
    }

    /// Check if [`close`](Self::close) has been called
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Resolves once the connection has been closed locally
    pub async fn closed(&self) {
        self.inner.shutdown.cancelled().await
    }

    /// Receive the next message
    pub async fn next_message(&self) -> Result<Message> {
        if self.inner.shutdown.is_cancelled() {
            return Err(TransportError::Closed);
        }

        let mut source = self.inner.source.lock().await;
        tokio::select! {
            biased;
            _ = self.inner.shutdown.cancelled() => Err(TransportError::Closed),
            message = source.recv() => message,
        }
    }

    /// Send one message
    pub async fn send(&self, message: Message) -> Result<()> {
        if self.inner.shutdown.is_cancelled() {
            return Err(TransportError::Closed);
        }

        let mut sink = self.inner.sink.lock().await;
        tokio::select! {
            biased;
            _ = self.inner.shutdown.cancelled() => Err(TransportError::Closed),
            result = sink.send(message) => result,
        }
    }

    /// Send a binary payload
    pub async fn send_binary(&self, payload: Bytes) -> Result<()> {
        self.send(Message::Binary(payload)).await
    }

    /// Send the zero-length text barrier
    pub async fn send_barrier(&self) -> Result<()> {
        self.send(Message::barrier()).await
    }

    /// Send a normal-closure close message
    ///
    /// This only tells the peer we are done; the connection stays open
    /// until [`close`](Self::close) is called.
    pub async fn send_close(&self) -> Result<()> {
        self.send(Message::close_normal()).await
    }

    /// Close the connection
    ///
    /// Only the first call reaches the transport. Later calls return
    /// [`TransportError::AlreadyClosed`].
    pub async fn close(&self) -> Result<()> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Err(TransportError::AlreadyClosed);
        }

        self.inner.shutdown.cancel();

        let result = self.inner.sink.lock().await.close().await;
        self.inner.source.lock().await.close().await;

        debug!(connection = %self.inner.id, "Connection closed");
        result
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.inner.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}
