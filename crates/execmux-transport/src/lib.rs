//! # execmux transport
//!
//! Message-oriented, full-duplex connections that carry one logical channel
//! each, plus the openers that establish them.

#![warn(missing_docs)]

/// Connection handle and transport halves
pub mod connection;

/// In-process connection pairs
pub mod memory;

/// Connections over byte streams
pub mod framed;

/// Connection openers
pub mod opener;

/// Transport error types
pub mod error;

pub use connection::{Connection, ConnectionId, MessageSink, MessageSource};
pub use error::TransportError;
pub use opener::{ConnectionOpener, OpenerConfig, TcpOpener};

/// Result type alias for transport operations
pub type Result<T> = std::result::Result<T, TransportError>;
