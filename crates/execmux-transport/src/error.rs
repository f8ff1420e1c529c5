//! Transport error types

use execmux_proto::ProtocolError;
use std::io;
use thiserror::Error;

/// Transport-specific errors
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection could not be established
    #[error("Connection error: {0}")]
    Connection(String),

    /// Connection is closed, locally or by the peer
    #[error("Connection closed")]
    Closed,

    /// Connection was already closed by an earlier call
    #[error("Connection already closed")]
    AlreadyClosed,

    /// Timeout error
    #[error("Operation timed out")]
    Timeout,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Protocol error
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),
}
