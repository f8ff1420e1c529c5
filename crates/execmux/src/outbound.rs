//! Local reader to connection pump
//!
//! An outbound pump drains a local reader through a [`ChunkedReader`] and
//! sends every chunk as one binary message. It stops when the reader is
//! exhausted, when a send fails, or when its cancellation token fires, and
//! then acts on its [`EndOfInput`] policy. The pump never closes the
//! connection.

use crate::chunked::ChunkedReader;
use crate::config::StreamConfig;
use crate::signal::{completion, CompletionSignal};
use crate::LocalReader;
use async_trait::async_trait;
use execmux_transport::Connection;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// What an outbound pump sends once the local reader is exhausted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EndOfInput {
    /// Send nothing; the peer notices when the connection goes away
    #[default]
    Nothing,
    /// Send the zero-length text barrier
    Barrier,
    /// Send the barrier, then a normal-closure close message
    BarrierThenClose,
}

/// Why an outbound pump stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboundExit {
    /// The local reader was exhausted or failed
    EndOfInput,
    /// The cancellation token fired
    Cancelled,
    /// Sending to the connection failed
    TransportFailed,
}

/// Pluggable local-to-remote pump logic
#[async_trait]
pub trait OutboundStrategy: Send + Sync {
    /// Move bytes from `reader` to `connection` until done
    async fn run(&self, connection: &Connection, reader: LocalReader) -> OutboundExit;
}

/// Stock outbound pump
#[derive(Debug, Clone, Default)]
pub struct OutboundPump {
    config: StreamConfig,
    end_of_input: EndOfInput,
    close_on_error: bool,
    cancel: Option<CancellationToken>,
}

impl OutboundPump {
    /// Create a pump that sends nothing after EOF
    pub fn new(config: StreamConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    /// Pump used by the symmetric mirror
    ///
    /// Sends the barrier after EOF, and a close message if the connection
    /// fails mid-stream.
    pub fn mirror() -> Self {
        Self {
            end_of_input: EndOfInput::Barrier,
            close_on_error: true,
            ..Default::default()
        }
    }

    /// Pump used for console attachment
    ///
    /// Like [`mirror`](Self::mirror), but also sends a close message after
    /// the barrier.
    pub fn console() -> Self {
        Self {
            end_of_input: EndOfInput::BarrierThenClose,
            close_on_error: true,
            ..Default::default()
        }
    }

    /// Set the chunking configuration
    pub fn with_config(mut self, config: StreamConfig) -> Self {
        self.config = config;
        self
    }

    /// Set what is sent after EOF
    pub fn with_end_of_input(mut self, end_of_input: EndOfInput) -> Self {
        self.end_of_input = end_of_input;
        self
    }

    /// Stop the pump when `cancel` fires
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Get the end-of-input policy
    pub fn end_of_input(&self) -> EndOfInput {
        self.end_of_input
    }

    /// Drain `reader` into `connection`
    pub async fn run(&self, connection: &Connection, reader: LocalReader) -> OutboundExit {
        let cancel = self.cancel.clone().unwrap_or_default();
        let mut chunks = ChunkedReader::spawn(reader, &self.config);
        let mut sent = 0usize;

        let exit = loop {
            let chunk = tokio::select! {
                biased;
                _ = cancel.cancelled() => break OutboundExit::Cancelled,
                chunk = chunks.next_chunk() => chunk,
            };
            let Some(chunk) = chunk else {
                break OutboundExit::EndOfInput;
            };

            let len = chunk.len();
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => break OutboundExit::Cancelled,
                result = connection.send_binary(chunk) => result,
            };
            if let Err(e) = result {
                debug!(connection = %connection.id(), "Outbound send failed: {}", e);
                break OutboundExit::TransportFailed;
            }
            sent += len;
        };

        // Stop the reader task before anything else goes out
        drop(chunks);
        debug!(connection = %connection.id(), bytes = sent, "Outbound pump stopped: {:?}", exit);

        match exit {
            OutboundExit::EndOfInput => self.finish(connection, &cancel).await,
            OutboundExit::TransportFailed if self.close_on_error => {
                let result = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return exit,
                    result = connection.send_close() => result,
                };
                if let Err(e) = result {
                    debug!(connection = %connection.id(), "Could not send close message: {}", e);
                }
            }
            _ => {}
        }

        exit
    }

    async fn finish(&self, connection: &Connection, cancel: &CancellationToken) {
        if self.end_of_input == EndOfInput::Nothing {
            return;
        }

        // The peer may never drain its buffer
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(connection = %connection.id(), "Cancelled before end-of-input barrier");
                return;
            }
            result = connection.send_barrier() => result,
        };
        if let Err(e) = result {
            warn!(connection = %connection.id(), "Failed to send end-of-input barrier: {}", e);
            return;
        }
        debug!(connection = %connection.id(), "Sent end-of-input barrier");

        if self.end_of_input == EndOfInput::BarrierThenClose {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                result = connection.send_close() => result,
            };
            if let Err(e) = result {
                warn!(connection = %connection.id(), "Failed to send close message: {}", e);
            }
        }
    }
}

#[async_trait]
impl OutboundStrategy for OutboundPump {
    async fn run(&self, connection: &Connection, reader: LocalReader) -> OutboundExit {
        OutboundPump::run(self, connection, reader).await
    }
}

/// Run an outbound pump on its own task
///
/// With no reader there is nothing to send and the returned signal has
/// already fired.
pub fn send_stream(
    connection: Connection,
    reader: Option<LocalReader>,
    pump: OutboundPump,
) -> CompletionSignal {
    let Some(reader) = reader else {
        return CompletionSignal::done();
    };

    let (done, signal) = completion();
    tokio::spawn(async move {
        pump.run(&connection, reader).await;
        done.fire();
    });
    signal
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use execmux_proto::Message;
    use execmux_transport::{memory, TransportError};
    use std::io::Cursor;
    use std::time::Duration;
    use tokio::time::timeout;

    fn reader(data: &'static [u8]) -> LocalReader {
        Box::new(Cursor::new(data))
    }

    #[tokio::test]
    async fn test_default_pump_sends_data_only() {
        let (local, remote) = memory::pair(8);

        let exit = OutboundPump::default().run(&local, reader(b"hello")).await;
        assert_eq!(exit, OutboundExit::EndOfInput);

        assert_eq!(
            remote.next_message().await.unwrap(),
            Message::binary(&b"hello"[..])
        );
        local.close().await.unwrap();
        assert!(matches!(
            remote.next_message().await,
            Err(TransportError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_mirror_pump_sends_barrier() {
        let (local, remote) = memory::pair(8);

        OutboundPump::mirror().run(&local, reader(b"ls\n")).await;

        assert_eq!(
            remote.next_message().await.unwrap(),
            Message::binary(&b"ls\n"[..])
        );
        assert_eq!(remote.next_message().await.unwrap(), Message::barrier());
        assert!(!local.is_closed());
    }

    #[tokio::test]
    async fn test_console_pump_sends_barrier_then_close() {
        let (local, remote) = memory::pair(8);

        OutboundPump::console().run(&local, reader(b"")).await;

        assert_eq!(remote.next_message().await.unwrap(), Message::barrier());
        assert_eq!(remote.next_message().await.unwrap(), Message::close_normal());
    }

    #[tokio::test]
    async fn test_cancellation_stops_blocked_pump() {
        let (local, _remote) = memory::pair(8);
        let (_client, stdin) = tokio::io::duplex(64);
        let cancel = CancellationToken::new();

        let pump = OutboundPump::default().with_cancellation(cancel.clone());
        let task = tokio::spawn(async move { pump.run(&local, Box::new(stdin)).await });

        tokio::task::yield_now().await;
        cancel.cancel();

        let exit = timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
        assert_eq!(exit, OutboundExit::Cancelled);
    }

    #[tokio::test]
    async fn test_cancellation_stops_blocked_barrier() {
        let (local, remote) = memory::pair(1);
        // Fill the only slot so the barrier has nowhere to go
        local.send_binary(Bytes::from("queued")).await.unwrap();

        let cancel = CancellationToken::new();
        let pump = OutboundPump::mirror().with_cancellation(cancel.clone());
        let conn = local.clone();
        let task = tokio::spawn(async move { pump.run(&conn, reader(b"")).await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!task.is_finished());

        cancel.cancel();
        let exit = timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
        assert_eq!(exit, OutboundExit::EndOfInput);

        assert_eq!(
            remote.next_message().await.unwrap(),
            Message::binary(&b"queued"[..])
        );
        local.close().await.unwrap();
        assert!(remote.next_message().await.is_err());
    }

    #[tokio::test]
    async fn test_send_failure_stops_pump() {
        let (local, remote) = memory::pair(1);
        remote.close().await.unwrap();

        let exit = OutboundPump::default().run(&local, reader(b"lost")).await;
        assert_eq!(exit, OutboundExit::TransportFailed);
    }

    #[tokio::test]
    async fn test_large_input_keeps_order() {
        let (local, remote) = memory::pair(4);
        let data: Vec<u8> = (0..400_000u32).map(|i| (i % 253) as u8).collect();
        let expected = data.clone();

        let signal = send_stream(
            local,
            Some(Box::new(Cursor::new(data))),
            OutboundPump::default(),
        );

        let mut received = Vec::new();
        while received.len() < expected.len() {
            match remote.next_message().await.unwrap() {
                Message::Binary(payload) => received.extend_from_slice(&payload),
                other => panic!("unexpected message: {:?}", other),
            }
        }
        assert_eq!(received, expected);
        timeout(Duration::from_secs(1), signal.wait()).await.unwrap();
    }

    #[tokio::test]
    async fn test_send_stream_without_reader_is_done() {
        let (local, remote) = memory::pair(1);
        let signal = send_stream(local.clone(), None, OutboundPump::mirror());
        assert!(signal.is_done());

        // Nothing, not even a barrier, was sent
        local.send_binary(Bytes::from("marker")).await.unwrap();
        assert_eq!(
            remote.next_message().await.unwrap(),
            Message::binary(&b"marker"[..])
        );
    }
}
