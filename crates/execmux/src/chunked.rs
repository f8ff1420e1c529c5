//! Reader-to-chunk adapter
//!
//! A background task reads the local source and hands complete chunks to
//! the consumer over a bounded queue. A chunk is emitted once the buffer
//! has no room for another full read, and whatever is left is flushed when
//! the source ends or fails. The queue closing is the only end-of-input
//! signal; read errors are logged, not returned.

use crate::config::StreamConfig;
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Lazy sequence of byte chunks read from a local source
///
/// Dropping the reader stops the background task and drops the source.
#[derive(Debug)]
pub struct ChunkedReader {
    rx: mpsc::Receiver<Bytes>,
    task: JoinHandle<()>,
}

impl ChunkedReader {
    /// Start reading `reader` in the background
    pub fn spawn<R>(reader: R, config: &StreamConfig) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let (tx, rx) = mpsc::channel(config.effective_queue_depth());
        let task = tokio::spawn(produce(
            reader,
            tx,
            config.effective_buffer_size(),
            config.effective_read_size(),
        ));

        Self { rx, task }
    }

    /// Get the next chunk; `None` once the source is exhausted
    pub async fn next_chunk(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }
}

impl Drop for ChunkedReader {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn produce<R>(mut reader: R, tx: mpsc::Sender<Bytes>, buffer_size: usize, read_size: usize)
where
    R: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(buffer_size);

    loop {
        let offset = buf.len();
        buf.resize(offset + read_size, 0);

        let n = match reader.read(&mut buf[offset..]).await {
            Ok(0) => {
                buf.truncate(offset);
                break;
            }
            Ok(n) => n,
            Err(e) => {
                debug!("Local source read failed: {}", e);
                buf.truncate(offset);
                break;
            }
        };
        buf.truncate(offset + n);

        if buf.len() + read_size >= buffer_size {
            let chunk = buf.split().freeze();
            buf.reserve(buffer_size);
            if tx.send(chunk).await.is_err() {
                // Consumer went away
                return;
            }
        }
    }

    if !buf.is_empty() {
        let _ = tx.send(buf.freeze()).await;
    }
}
