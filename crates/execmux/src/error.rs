//! Error types for exec sessions
//!
//! Only setup failures surface here. Failures inside a running pump end
//! that pump and are logged; they never reach the caller.

use crate::Channel;
use execmux_transport::TransportError;
use thiserror::Error;

/// Main error type for execmux operations
#[derive(Debug, Error)]
pub enum ExecError {
    /// Malformed or missing argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Remote side lacks a required capability
    #[error("Not supported: {0}")]
    NotSupported(String),

    /// A channel connection could not be opened
    #[error("Failed to open channel {channel}: {source}")]
    ChannelOpen {
        /// Channel that failed
        channel: Channel,
        /// Underlying transport failure
        #[source]
        source: TransportError,
    },

    /// Operation metadata is malformed
    #[error("Invalid operation metadata: {0}")]
    Metadata(String),

    /// Transport errors outside channel setup
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

impl From<serde_json::Error> for ExecError {
    fn from(err: serde_json::Error) -> Self {
        Self::Metadata(format!("JSON error: {}", err))
    }
}
