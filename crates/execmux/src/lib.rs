//! # execmux
//!
//! Stream mirroring and multiplexing for remote command execution and
//! console attachment.
//!
//! A remote exec session is carried over up to four logical channels
//! (control, stdin, stdout, stderr), each backed by its own message
//! connection. This crate provides the pieces that bridge those connections
//! to local I/O: a chunked reader, outbound and inbound pumps, a symmetric
//! mirror for TTY-style sessions, a connection-to-connection proxy, and the
//! coordinator that wires a whole exec session together and tears it down.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub use execmux_proto as proto;
pub use execmux_transport as transport;

use tokio::io::{AsyncRead, AsyncWrite};

/// Error types for exec sessions
pub mod error;

/// Stream and session configuration
pub mod config;

/// Single-fire completion notifications
pub mod signal;

/// Reader-to-chunk adapter
pub mod chunked;

/// Local reader to connection pump
pub mod outbound;

/// Connection to local writer pump
pub mod inbound;

/// Paired pumps over one connection
pub mod mirror;

/// Connection-to-connection forwarding
pub mod proxy;

/// Logical channels and operation metadata
pub mod channel;

/// Exec session coordination
pub mod exec;

pub use channel::{Channel, ChannelMap};
pub use chunked::ChunkedReader;
pub use config::{SessionConfig, StreamConfig};
pub use error::ExecError;
pub use exec::{ControlHandler, ExecArgs, ExecCommand, ExecCoordinator, ExecSession, SessionState};
pub use inbound::{recv_stream, InboundExit, InboundPump, InboundStrategy};
pub use mirror::{console_mirror, mirror, Mirror, MirrorHandle};
pub use outbound::{send_stream, EndOfInput, OutboundExit, OutboundPump, OutboundStrategy};
pub use proxy::proxy;
pub use signal::{completion, Completion, CompletionSignal};

/// Local byte source, such as a process's stdin
pub type LocalReader = Box<dyn AsyncRead + Send + Unpin>;

/// Local byte sink, such as a process's stdout
pub type LocalWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Result type alias for execmux operations
pub type Result<T> = std::result::Result<T, ExecError>;
