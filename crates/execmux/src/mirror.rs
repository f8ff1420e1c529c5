//! Paired pumps over one connection
//!
//! A mirror runs an outbound pump (local reader to remote) and an inbound
//! pump (remote to local writer) on the same connection at once. The
//! connection stays open when both finish; closing it is up to the caller,
//! which lets a console be re-attached over the same connection.

use crate::inbound::{InboundPump, InboundStrategy};
use crate::outbound::{OutboundPump, OutboundStrategy};
use crate::signal::{completion, CompletionSignal};
use crate::{LocalReader, LocalWriter};
use execmux_transport::Connection;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Completion signals of a running mirror
#[derive(Debug, Clone)]
pub struct MirrorHandle {
    /// Fires once the local reader has been forwarded to the remote side
    pub read_done: CompletionSignal,
    /// Fires once the remote side has stopped feeding the local writer
    pub write_done: CompletionSignal,
}

impl MirrorHandle {
    /// Wait for both directions to finish
    pub async fn wait(&self) {
        self.read_done.wait().await;
        self.write_done.wait().await;
    }

    /// Check if both directions have finished
    pub fn is_done(&self) -> bool {
        self.read_done.is_done() && self.write_done.is_done()
    }
}

/// Mirror with pluggable pump logic
#[derive(Clone)]
pub struct Mirror {
    outbound: Arc<dyn OutboundStrategy>,
    inbound: Arc<dyn InboundStrategy>,
}

impl Default for Mirror {
    fn default() -> Self {
        Self::new(Arc::new(OutboundPump::mirror()), Arc::new(InboundPump))
    }
}

impl Mirror {
    /// Create a mirror from explicit strategies
    pub fn new(outbound: Arc<dyn OutboundStrategy>, inbound: Arc<dyn InboundStrategy>) -> Self {
        Self { outbound, inbound }
    }

    /// Mirror for console attachment
    pub fn console() -> Self {
        Self::new(Arc::new(OutboundPump::console()), Arc::new(InboundPump))
    }

    /// Replace the outbound strategy
    pub fn with_outbound(mut self, outbound: Arc<dyn OutboundStrategy>) -> Self {
        self.outbound = outbound;
        self
    }

    /// Replace the inbound strategy
    pub fn with_inbound(mut self, inbound: Arc<dyn InboundStrategy>) -> Self {
        self.inbound = inbound;
        self
    }

    /// Start both pumps on `connection`
    pub fn start(&self, connection: &Connection, writer: LocalWriter, reader: LocalReader) -> MirrorHandle {
        let (read_complete, read_done) = completion();
        let (write_complete, write_done) = completion();

        let outbound = Arc::clone(&self.outbound);
        let out_conn = connection.clone();
        tokio::spawn(async move {
            let exit = outbound.run(&out_conn, reader).await;
            debug!(connection = %out_conn.id(), "Mirror read side done: {:?}", exit);
            read_complete.fire();
        });

        let inbound = Arc::clone(&self.inbound);
        let in_conn = connection.clone();
        tokio::spawn(async move {
            let exit = inbound.run(&in_conn, Some(writer)).await;
            debug!(connection = %in_conn.id(), "Mirror write side done: {:?}", exit);
            write_complete.fire();
        });

        MirrorHandle {
            read_done,
            write_done,
        }
    }
}

impl fmt::Debug for Mirror {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mirror").finish_non_exhaustive()
    }
}

/// Mirror `connection` with the stock pumps
pub fn mirror(connection: &Connection, writer: LocalWriter, reader: LocalReader) -> MirrorHandle {
    Mirror::default().start(connection, writer, reader)
}

/// Mirror `connection` for console attachment
///
/// On local EOF the remote side gets the barrier followed by a close
/// message.
pub fn console_mirror(connection: &Connection, writer: LocalWriter, reader: LocalReader) -> MirrorHandle {
    Mirror::console().start(connection, writer, reader)
}
