//! Connection-to-connection forwarding
//!
//! Every message read from one side is sent to the other unchanged. When
//! either direction stops, both connections are closed, the other direction
//! is awaited, and the combined signal fires.

use crate::signal::{completion, CompletionSignal};
use execmux_transport::{Connection, TransportError};
use tracing::{debug, info, warn};

async fn forward(from: Connection, to: Connection) -> usize {
    let mut forwarded = 0usize;

    loop {
        let message = match from.next_message().await {
            Ok(message) => message,
            Err(e) => {
                debug!(from = %from.id(), "Proxy read ended: {}", e);
                break;
            }
        };

        let is_close = message.is_close();
        if let Err(e) = to.send(message).await {
            debug!(to = %to.id(), "Proxy write ended: {}", e);
            break;
        }
        forwarded += 1;

        if is_close {
            debug!(from = %from.id(), "Forwarded close message");
            break;
        }
    }

    forwarded
}

async fn close_quietly(connection: &Connection) {
    match connection.close().await {
        Ok(()) | Err(TransportError::AlreadyClosed) => {}
        Err(e) => warn!(connection = %connection.id(), "Failed to close proxied connection: {}", e),
    }
}

/// Forward messages between `source` and `target` in both directions
///
/// Takes ownership of both connections; they are closed when forwarding
/// ends.
pub fn proxy(source: Connection, target: Connection) -> CompletionSignal {
    let (done, signal) = completion();

    let mut send = tokio::spawn(forward(source.clone(), target.clone()));
    let mut recv = tokio::spawn(forward(target.clone(), source.clone()));

    tokio::spawn(async move {
        // Closing both sides unblocks whichever direction is still running
        let (sent, received) = tokio::select! {
            result = &mut send => {
                debug!("Proxy stopped forwarding source to target");
                close_quietly(&source).await;
                close_quietly(&target).await;
                (result.unwrap_or(0), recv.await.unwrap_or(0))
            }
            result = &mut recv => {
                debug!("Proxy stopped forwarding target to source");
                close_quietly(&source).await;
                close_quietly(&target).await;
                (send.await.unwrap_or(0), result.unwrap_or(0))
            }
        };

        info!(
            source = %source.id(),
            target = %target.id(),
            sent,
            received,
            "Proxy finished"
        );
        done.fire();
    });

    signal
}
