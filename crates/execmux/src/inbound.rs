//! Connection to local writer pump

use crate::signal::{completion, CompletionSignal};
use crate::LocalWriter;
use async_trait::async_trait;
use execmux_proto::Message;
use execmux_transport::Connection;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Why an inbound pump stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundExit {
    /// Reading from the connection failed or the peer went away
    TransportEnded,
    /// The peer sent a close message
    Closed,
    /// The peer sent a text barrier
    Barrier,
    /// Writing to the local writer failed
    WriteFailed,
}

/// Pluggable remote-to-local pump logic
#[async_trait]
pub trait InboundStrategy: Send + Sync {
    /// Move payloads from `connection` to `writer` until done
    async fn run(&self, connection: &Connection, writer: Option<LocalWriter>) -> InboundExit;
}

/// Stock inbound pump
///
/// Binary payloads go to the writer verbatim, or are dropped when there is
/// no writer. Any text message, a close message, or a read error ends the
/// stream. The writer is shut down on exit; the connection is left open.
#[derive(Debug, Clone, Copy, Default)]
pub struct InboundPump;

impl InboundPump {
    /// Create the stock pump
    pub fn new() -> Self {
        Self
    }

    /// Drain `connection` into `writer`
    pub async fn run(&self, connection: &Connection, mut writer: Option<LocalWriter>) -> InboundExit {
        let mut received = 0usize;

        let exit = loop {
            let payload = match connection.next_message().await {
                Ok(Message::Binary(payload)) => payload,
                Ok(Message::Text(text)) => {
                    if !text.is_empty() {
                        debug!(connection = %connection.id(), "Non-empty text message treated as barrier");
                    }
                    break InboundExit::Barrier;
                }
                Ok(Message::Close { code, reason }) => {
                    debug!(connection = %connection.id(), code, "Peer closed the stream: {}", reason);
                    break InboundExit::Closed;
                }
                Err(e) => {
                    debug!(connection = %connection.id(), "Inbound stream ended: {}", e);
                    break InboundExit::TransportEnded;
                }
            };

            received += payload.len();
            let Some(out) = writer.as_mut() else {
                continue;
            };

            let written = async {
                out.write_all(&payload).await?;
                out.flush().await
            };
            if let Err(e) = written.await {
                warn!(connection = %connection.id(), "Dropping inbound stream, local write failed: {}", e);
                break InboundExit::WriteFailed;
            }
        };

        if let Some(mut out) = writer {
            if let Err(e) = out.shutdown().await {
                debug!("Local writer shutdown failed: {}", e);
            }
        }

        debug!(connection = %connection.id(), bytes = received, "Inbound pump stopped: {:?}", exit);
        exit
    }
}

#[async_trait]
impl InboundStrategy for InboundPump {
    async fn run(&self, connection: &Connection, writer: Option<LocalWriter>) -> InboundExit {
        InboundPump::run(self, connection, writer).await
    }
}

/// Run the stock inbound pump on its own task
pub fn recv_stream(connection: Connection, writer: Option<LocalWriter>) -> CompletionSignal {
    let (done, signal) = completion();
    tokio::spawn(async move {
        InboundPump.run(&connection, writer).await;
        done.fire();
    });
    signal
}
