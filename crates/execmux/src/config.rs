//! Stream and session configuration

use crate::outbound::EndOfInput;

/// Smallest chunk buffer the reader adapter will use (128 KiB)
pub const MIN_BUFFER_SIZE: usize = 128 * 1024;

/// Default size of a single read from a local source (128 KiB)
pub const DEFAULT_READ_SIZE: usize = 128 * 1024;

/// Capability a remote side must advertise to run exec sessions
pub const EXEC_CAPABILITY: &str = "container_exec";

/// Chunking configuration for outbound streams
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    /// Requested chunk buffer size; raised to [`MIN_BUFFER_SIZE`] if smaller
    pub buffer_size: usize,
    /// Maximum bytes requested from the source per read
    pub read_size: usize,
    /// Chunks buffered between the reader task and the pump
    pub queue_depth: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            buffer_size: MIN_BUFFER_SIZE,
            read_size: DEFAULT_READ_SIZE,
            queue_depth: 1,
        }
    }
}

impl StreamConfig {
    /// Set the requested chunk buffer size
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    /// Set the per-read size
    pub fn with_read_size(mut self, read_size: usize) -> Self {
        self.read_size = read_size;
        self
    }

    /// Set the chunk queue depth
    pub fn with_queue_depth(mut self, queue_depth: usize) -> Self {
        self.queue_depth = queue_depth;
        self
    }

    /// Per-read size actually used (at least one byte)
    pub fn effective_read_size(&self) -> usize {
        self.read_size.max(1)
    }

    /// Chunk buffer size actually used
    ///
    /// Never below [`MIN_BUFFER_SIZE`], and always large enough for one
    /// full read.
    pub fn effective_buffer_size(&self) -> usize {
        self.buffer_size
            .max(MIN_BUFFER_SIZE)
            .max(self.effective_read_size())
    }

    /// Queue depth actually used (at least one chunk)
    pub fn effective_queue_depth(&self) -> usize {
        self.queue_depth.max(1)
    }
}

/// Exec session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Chunking for the stdin stream
    pub stream: StreamConfig,
    /// What a non-interactive stdin pump sends after local EOF
    /// (default: the barrier, so the remote command sees its input end)
    pub stdin_end: EndOfInput,
    /// Capability checked before any channel is opened
    pub required_capability: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            stream: StreamConfig::default(),
            stdin_end: EndOfInput::Barrier,
            required_capability: Some(EXEC_CAPABILITY.to_string()),
        }
    }
}

impl SessionConfig {
    /// Set the stdin stream configuration
    pub fn with_stream(mut self, stream: StreamConfig) -> Self {
        self.stream = stream;
        self
    }

    /// Set what a non-interactive stdin pump sends after local EOF
    pub fn with_stdin_end(mut self, stdin_end: EndOfInput) -> Self {
        self.stdin_end = stdin_end;
        self
    }

    /// Set or clear the required capability
    pub fn with_required_capability(mut self, capability: Option<String>) -> Self {
        self.required_capability = capability;
        self
    }
}
