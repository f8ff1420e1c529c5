//! In-process connection pairs
//!
//! Two connections wired back to back over bounded channels. Whatever one
//! end sends, the other receives. Closing one end makes the peer's reads
//! fail once the buffered messages are drained, and its writes fail at once.

use crate::{Connection, MessageSink, MessageSource, Result, TransportError};
use async_trait::async_trait;
use execmux_proto::Message;
use tokio::sync::mpsc;

/// Read half of an in-process connection
#[derive(Debug)]
pub struct MemorySource {
    rx: mpsc::Receiver<Message>,
}

/// Write half of an in-process connection
#[derive(Debug)]
pub struct MemorySink {
    tx: Option<mpsc::Sender<Message>>,
}

#[async_trait]
impl MessageSource for MemorySource {
    async fn recv(&mut self) -> Result<Message> {
        self.rx.recv().await.ok_or(TransportError::Closed)
    }

    async fn close(&mut self) {
        self.rx.close();
    }
}

#[async_trait]
impl MessageSink for MemorySink {
    async fn send(&mut self, message: Message) -> Result<()> {
        let tx = self.tx.as_ref().ok_or(TransportError::Closed)?;
        tx.send(message).await.map_err(|_| TransportError::Closed)
    }

    async fn close(&mut self) -> Result<()> {
        self.tx.take();
        Ok(())
    }
}

/// Create the raw halves of two connected ends
///
/// Each end is a `(source, sink)` tuple. `capacity` is the number of
/// messages buffered per direction before a sender waits.
pub fn halves(
    capacity: usize,
) -> ((MemorySource, MemorySink), (MemorySource, MemorySink)) {
    let capacity = capacity.max(1);
    let (a_tx, b_rx) = mpsc::channel(capacity);
    let (b_tx, a_rx) = mpsc::channel(capacity);

    (
        (MemorySource { rx: a_rx }, MemorySink { tx: Some(a_tx) }),
        (MemorySource { rx: b_rx }, MemorySink { tx: Some(b_tx) }),
    )
}

/// Create two connected connections
pub fn pair(capacity: usize) -> (Connection, Connection) {
    let ((a_source, a_sink), (b_source, b_sink)) = halves(capacity);
    (
        Connection::new(Box::new(a_source), Box::new(a_sink)),
        Connection::new(Box::new(b_source), Box::new(b_sink)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[tokio::test]
    async fn test_peer_close_ends_reads_after_drain() {
        let (local, remote) = pair(4);

        remote.send_binary(Bytes::from("last words")).await.unwrap();
        remote.close().await.unwrap();

        assert_eq!(
            local.next_message().await.unwrap(),
            Message::binary(&b"last words"[..])
        );
        assert!(matches!(
            local.next_message().await,
            Err(TransportError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_peer_close_fails_writes() {
        let (local, remote) = pair(4);
        remote.close().await.unwrap();

        let result = local.send_binary(Bytes::from("nobody listening")).await;
        assert!(matches!(result, Err(TransportError::Closed)));
    }

    #[tokio::test]
    async fn test_zero_capacity_is_clamped() {
        let (local, remote) = pair(0);
        local.send_barrier().await.unwrap();
        assert_eq!(remote.next_message().await.unwrap(), Message::barrier());
    }
}
